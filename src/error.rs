//! Error types for lumirise.

use thiserror::Error;

use crate::alarm::{AlarmState, AlarmTrigger};

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("illegal transition: no entry for ({from}, {trigger})")]
    IllegalTransition {
        from: AlarmState,
        trigger: AlarmTrigger,
    },

    #[error("not connected to the broker")]
    NotConnected,

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("state machine disposed")]
    Disposed,

    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

pub type Result<T> = std::result::Result<T, Error>;
