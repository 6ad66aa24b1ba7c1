//! Interruption detector: compares observed dimmer state against the state
//! the executor last commanded, and publishes categorized events when they
//! diverge — a human on the physical switch, or a device that went away.
//!
//! Detection fires only while enabled *and* an expected state is armed.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::monitor::DimmerState;

/// Observed-vs-expected brightness deviations within this band are ignored;
/// device telemetry rounds commanded values.
const BRIGHTNESS_TOLERANCE_PERCENT: u8 = 2;

const INTERRUPTION_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionReason {
    ManualPowerOn,
    ManualPowerOff,
    ManualBrightnessAdjustment,
    DeviceDisconnected,
    StatusConfirmationTimeout,
    Unknown,
}

impl fmt::Display for InterruptionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterruptionReason::ManualPowerOn => "manual power-on",
            InterruptionReason::ManualPowerOff => "manual power-off",
            InterruptionReason::ManualBrightnessAdjustment => "manual brightness adjustment",
            InterruptionReason::DeviceDisconnected => "device disconnected",
            InterruptionReason::StatusConfirmationTimeout => "status confirmation timeout",
            InterruptionReason::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct InterruptionEvent {
    pub reason: InterruptionReason,
    pub expected_state: Option<DimmerState>,
    pub actual_state: Option<DimmerState>,
    pub message: String,
    pub detected_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

pub struct InterruptionDetector {
    expected: Mutex<Option<DimmerState>>,
    enabled: AtomicBool,
    tx: broadcast::Sender<InterruptionEvent>,
}

impl InterruptionDetector {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(INTERRUPTION_CHANNEL_CAPACITY);
        Self {
            expected: Mutex::new(None),
            enabled: AtomicBool::new(false),
            tx,
        }
    }

    /// Update the comparison baseline to the most recent commanded state.
    pub fn set_expected_state(&self, state: DimmerState) {
        *self.expected.lock().unwrap() = Some(state);
    }

    pub fn clear_expected_state(&self) {
        *self.expected.lock().unwrap() = None;
    }

    pub fn enable_detection(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable_detection(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Stream of interruption events. Non-replaying.
    pub fn interruptions(&self) -> broadcast::Receiver<InterruptionEvent> {
        self.tx.subscribe()
    }

    /// Evaluate one observed state change against the armed baseline.
    pub fn observe(&self, actual: DimmerState) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        let expected = *self.expected.lock().unwrap();
        let Some(expected) = expected else { return };

        if let Some((reason, message)) = classify(&expected, &actual) {
            warn!(reason = %reason, "interruption detected: {message}");
            let _ = self.tx.send(InterruptionEvent {
                reason,
                expected_state: Some(expected),
                actual_state: Some(actual),
                message,
                detected_at: Utc::now(),
            });
        }
    }

    /// Report an interruption observed outside the state comparison, e.g. a
    /// broker disconnect or a device that never confirmed a command. Gated
    /// the same way as [`observe`](Self::observe).
    pub fn report(&self, reason: InterruptionReason, message: impl Into<String>) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        let expected = *self.expected.lock().unwrap();
        if expected.is_none() {
            return;
        }
        let message = message.into();
        warn!(reason = %reason, "interruption reported: {message}");
        let _ = self.tx.send(InterruptionEvent {
            reason,
            expected_state: expected,
            actual_state: None,
            message,
            detected_at: Utc::now(),
        });
    }

    /// Feed the detector from a monitor's state-change stream. The task ends
    /// when the stream closes.
    pub fn watch(
        self: &Arc<Self>,
        mut states: broadcast::Receiver<DimmerState>,
    ) -> JoinHandle<()> {
        let detector = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match states.recv().await {
                    Ok(state) => detector.observe(state),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "state-change stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for InterruptionDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Rules evaluated in fixed order: power-off, then brightness deviation,
/// then power-on.
fn classify(
    expected: &DimmerState,
    actual: &DimmerState,
) -> Option<(InterruptionReason, String)> {
    if expected.is_on && !actual.is_on {
        return Some((
            InterruptionReason::ManualPowerOff,
            "device reported OFF while ON was expected".to_string(),
        ));
    }
    if expected.is_on && actual.is_on {
        let deviation = expected
            .brightness_percent
            .abs_diff(actual.brightness_percent);
        if deviation > BRIGHTNESS_TOLERANCE_PERCENT {
            return Some((
                InterruptionReason::ManualBrightnessAdjustment,
                format!(
                    "device brightness {}% deviates from commanded {}%",
                    actual.brightness_percent, expected.brightness_percent
                ),
            ));
        }
        return None;
    }
    if !expected.is_on && actual.is_on {
        return Some((
            InterruptionReason::ManualPowerOn,
            "device reported ON while OFF was expected".to_string(),
        ));
    }
    None
}

// ===========================================================================
// Tests
// ===========================================================================
