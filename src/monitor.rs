//! Dimmer state monitor: translates the device's two status dialects into a
//! stream of [`DimmerState`] values and caches the latest one.
//!
//! Dialects:
//! - power topic: plain `ON` / `OFF` text, case-insensitive;
//! - result topic: JSON `{"POWER":"ON","Dimmer":<0..100>}`.
//!
//! Malformed result payloads are logged at warning level and discarded
//! without touching the cached state.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::TopicSettings;
use crate::mqtt::{MqttMessage, MqttSession};

/// Brightness assumed when the device reports ON and no prior state exists.
const DEFAULT_ON_BRIGHTNESS: u8 = 50;

const STATE_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// DimmerState
// ---------------------------------------------------------------------------

/// Authoritative device state. Equality is by `(is_on, brightness_percent)`
/// only; the observation timestamp never participates.
#[derive(Debug, Clone, Copy)]
pub struct DimmerState {
    pub is_on: bool,
    pub brightness_percent: u8,
    pub updated_at: DateTime<Utc>,
}

impl DimmerState {
    pub fn new(is_on: bool, brightness_percent: u8) -> Self {
        Self {
            is_on,
            brightness_percent,
            updated_at: Utc::now(),
        }
    }
}

impl PartialEq for DimmerState {
    fn eq(&self, other: &Self) -> bool {
        self.is_on == other.is_on && self.brightness_percent == other.brightness_percent
    }
}

impl Eq for DimmerState {}

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

/// Power topic dialect: `ON` (any case) means on; anything else means off.
/// On an ON, brightness carries over from the prior state, defaulting to 50
/// when none exists; an OFF forces brightness to 0.
fn parse_power_status(payload: &[u8], prior: Option<&DimmerState>) -> DimmerState {
    let text = String::from_utf8_lossy(payload);
    if text.trim().eq_ignore_ascii_case("on") {
        let brightness = prior
            .map(|p| p.brightness_percent)
            .unwrap_or(DEFAULT_ON_BRIGHTNESS);
        DimmerState::new(true, brightness)
    } else {
        DimmerState::new(false, 0)
    }
}

#[derive(Debug, Deserialize)]
struct ResultPayload {
    #[serde(rename = "POWER")]
    power: String,
    #[serde(rename = "Dimmer")]
    dimmer: u8,
}

/// Result topic dialect: JSON with required `POWER` and `Dimmer` fields.
fn parse_result_status(payload: &[u8]) -> Result<DimmerState, String> {
    let msg: ResultPayload =
        serde_json::from_slice(payload).map_err(|e| format!("bad result json: {e}"))?;
    if msg.dimmer > 100 {
        return Err(format!("Dimmer out of range: {}", msg.dimmer));
    }
    Ok(DimmerState::new(
        msg.power.eq_ignore_ascii_case("on"),
        msg.dimmer,
    ))
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct DimmerMonitor<S: MqttSession> {
    session: Arc<S>,
    shared: Arc<MonitorShared>,
    task: tokio::sync::Mutex<Option<(JoinHandle<()>, CancellationToken)>>,
}

struct MonitorShared {
    power_topic: String,
    result_topic: String,
    current: Mutex<Option<DimmerState>>,
    tx: broadcast::Sender<DimmerState>,
}

impl MonitorShared {
    /// Update the cache; emit only when `(is_on, brightness)` changed.
    fn apply(&self, next: DimmerState) {
        let mut current = self.current.lock().unwrap();
        let changed = current.as_ref() != Some(&next);
        *current = Some(next);
        drop(current);
        if changed {
            let _ = self.tx.send(next);
        }
    }
}

impl<S: MqttSession> DimmerMonitor<S> {
    pub fn new(session: Arc<S>, topics: &TopicSettings) -> Self {
        let (tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            session,
            shared: Arc::new(MonitorShared {
                power_topic: topics.power_status.clone(),
                result_topic: topics.brightness_status.clone(),
                current: Mutex::new(None),
                tx,
            }),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Subscribe to both status topics and begin ingesting. Idempotent. A
    /// `NotConnected` subscribe is tolerated: the supervisor records the
    /// topics and replays them once the broker is reachable.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }

        for topic in [&self.shared.power_topic, &self.shared.result_topic] {
            if let Err(e) = self.session.subscribe(topic).await {
                warn!(topic = %topic, "status subscribe deferred: {e}");
            }
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(ingest_loop(
            self.session.messages(),
            Arc::clone(&self.shared),
            cancel.clone(),
        ));
        *task = Some((handle, cancel));
        debug!(
            power = %self.shared.power_topic,
            result = %self.shared.result_topic,
            "dimmer monitor started"
        );
    }

    /// Stop ingesting and release the status subscriptions.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        let Some((handle, cancel)) = task.take() else {
            return;
        };
        cancel.cancel();
        let _ = handle.await;

        for topic in [&self.shared.power_topic, &self.shared.result_topic] {
            if let Err(e) = self.session.unsubscribe(topic).await {
                debug!(topic = %topic, "status unsubscribe skipped: {e}");
            }
        }
        debug!("dimmer monitor stopped");
    }

    /// Latest cached state, if any status has been observed yet.
    pub fn current_state(&self) -> Option<DimmerState> {
        *self.shared.current.lock().unwrap()
    }

    /// Stream of state changes. Non-replaying; emits only on actual change.
    pub fn state_changes(&self) -> broadcast::Receiver<DimmerState> {
        self.shared.tx.subscribe()
    }
}

async fn ingest_loop(
    mut rx: broadcast::Receiver<MqttMessage>,
    shared: Arc<MonitorShared>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Ok(msg) if msg.topic == shared.power_topic => {
                    let prior = *shared.current.lock().unwrap();
                    shared.apply(parse_power_status(&msg.payload, prior.as_ref()));
                }
                Ok(msg) if msg.topic == shared.result_topic => {
                    match parse_result_status(&msg.payload) {
                        Ok(state) => shared.apply(state),
                        Err(e) => warn!(topic = %msg.topic, "{e}"),
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "status stream lagged; skipping");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::testing::FakeSession;
    use std::time::Duration;

    const POWER_TOPIC: &str = "stat/dimmer/POWER";
    const RESULT_TOPIC: &str = "stat/dimmer/RESULT";

    fn test_topics() -> TopicSettings {
        TopicSettings {
            power_command: "cmnd/dimmer/power".into(),
            power_status: POWER_TOPIC.into(),
            brightness_command: "cmnd/dimmer/dimmer".into(),
            brightness_status: RESULT_TOPIC.into(),
        }
    }

    async fn recv(
        rx: &mut broadcast::Receiver<DimmerState>,
    ) -> Result<DimmerState, tokio::time::error::Elapsed> {
        tokio::time::timeout(Duration::from_millis(500), async {
            rx.recv().await.unwrap()
        })
        .await
    }

    // -- Equality -------------------------------------------------------------

    #[test]
    fn equality_ignores_timestamp() {
        let mut a = DimmerState::new(true, 40);
        let b = DimmerState::new(true, 40);
        a.updated_at = a.updated_at - chrono::Duration::hours(1);
        assert_eq!(a, b);
        assert_ne!(DimmerState::new(true, 40), DimmerState::new(true, 41));
        assert_ne!(DimmerState::new(true, 40), DimmerState::new(false, 40));
    }

    // -- Power dialect ---------------------------------------------------------

    #[test]
    fn power_on_without_prior_defaults_to_50() {
        let state = parse_power_status(b"ON", None);
        assert!(state.is_on);
        assert_eq!(state.brightness_percent, 50);
    }

    #[test]
    fn power_on_carries_prior_brightness() {
        let prior = DimmerState::new(false, 0);
        let state = parse_power_status(b"ON", Some(&prior));
        assert!(state.is_on);
        assert_eq!(state.brightness_percent, 0);

        let prior = DimmerState::new(true, 73);
        let state = parse_power_status(b"on", Some(&prior));
        assert_eq!(state.brightness_percent, 73);
    }

    #[test]
    fn power_off_forces_brightness_zero() {
        let prior = DimmerState::new(true, 80);
        let state = parse_power_status(b"OFF", Some(&prior));
        assert!(!state.is_on);
        assert_eq!(state.brightness_percent, 0);
    }

    #[test]
    fn power_dialect_is_case_insensitive_and_trims() {
        assert!(parse_power_status(b"  on \n", None).is_on);
        assert!(parse_power_status(b"On", None).is_on);
        assert!(!parse_power_status(b"oFf", None).is_on);
    }

    #[test]
    fn power_unknown_text_means_off() {
        assert!(!parse_power_status(b"TOGGLE", None).is_on);
        assert!(!parse_power_status(b"", None).is_on);
    }

    // -- Result dialect ----------------------------------------------------------

    #[test]
    fn result_parses_power_and_dimmer() {
        let state = parse_result_status(br#"{"POWER":"ON","Dimmer":42}"#).unwrap();
        assert!(state.is_on);
        assert_eq!(state.brightness_percent, 42);

        let state = parse_result_status(br#"{"POWER":"off","Dimmer":0}"#).unwrap();
        assert!(!state.is_on);
    }

    #[test]
    fn result_extra_fields_are_ignored() {
        let state =
            parse_result_status(br#"{"POWER":"ON","Dimmer":10,"Fade":"OFF"}"#).unwrap();
        assert_eq!(state.brightness_percent, 10);
    }

    #[test]
    fn result_missing_field_is_rejected() {
        assert!(parse_result_status(br#"{"POWER":"ON"}"#).is_err());
        assert!(parse_result_status(br#"{"Dimmer":10}"#).is_err());
    }

    #[test]
    fn result_malformed_json_is_rejected() {
        assert!(parse_result_status(b"not json").is_err());
        assert!(parse_result_status(br#"{"POWER":"ON","Dimmer":"high"}"#).is_err());
    }

    #[test]
    fn result_out_of_range_dimmer_is_rejected() {
        assert!(parse_result_status(br#"{"POWER":"ON","Dimmer":150}"#).is_err());
    }

    // -- Monitor ingestion ----------------------------------------------------------

    #[tokio::test]
    async fn start_subscribes_to_both_status_topics() {
        let fake = FakeSession::new();
        let monitor = DimmerMonitor::new(Arc::clone(&fake), &test_topics());
        monitor.start().await;

        let subs = fake.subscribed();
        assert!(subs.contains(&POWER_TOPIC.to_string()));
        assert!(subs.contains(&RESULT_TOPIC.to_string()));
        monitor.stop().await;
    }

    #[tokio::test]
    async fn emits_only_on_actual_change() {
        let fake = FakeSession::new();
        let monitor = DimmerMonitor::new(Arc::clone(&fake), &test_topics());
        monitor.start().await;
        let mut rx = monitor.state_changes();

        fake.inject(RESULT_TOPIC, br#"{"POWER":"ON","Dimmer":40}"#);
        let first = recv(&mut rx).await.unwrap();
        assert_eq!(first, DimmerState::new(true, 40));

        // Same (is_on, brightness): cache refreshes but nothing is emitted.
        fake.inject(RESULT_TOPIC, br#"{"POWER":"ON","Dimmer":40}"#);
        fake.inject(RESULT_TOPIC, br#"{"POWER":"ON","Dimmer":41}"#);
        let second = recv(&mut rx).await.unwrap();
        assert_eq!(second.brightness_percent, 41);

        monitor.stop().await;
    }

    #[tokio::test]
    async fn malformed_result_leaves_cache_untouched() {
        let fake = FakeSession::new();
        let monitor = DimmerMonitor::new(Arc::clone(&fake), &test_topics());
        monitor.start().await;
        let mut rx = monitor.state_changes();

        fake.inject(RESULT_TOPIC, br#"{"POWER":"ON","Dimmer":40}"#);
        recv(&mut rx).await.unwrap();

        fake.inject(RESULT_TOPIC, b"{broken");
        fake.inject(RESULT_TOPIC, br#"{"POWER":"ON"}"#);
        assert!(recv(&mut rx).await.is_err(), "no emission expected");
        assert_eq!(monitor.current_state().unwrap(), DimmerState::new(true, 40));

        monitor.stop().await;
    }

    #[tokio::test]
    async fn power_dialect_updates_cache_through_monitor() {
        let fake = FakeSession::new();
        let monitor = DimmerMonitor::new(Arc::clone(&fake), &test_topics());
        monitor.start().await;
        let mut rx = monitor.state_changes();

        fake.inject(RESULT_TOPIC, br#"{"POWER":"ON","Dimmer":70}"#);
        recv(&mut rx).await.unwrap();

        fake.inject(POWER_TOPIC, b"OFF");
        assert_eq!(recv(&mut rx).await.unwrap(), DimmerState::new(false, 0));

        // ON carries the prior brightness (0 after the OFF).
        fake.inject(POWER_TOPIC, b"ON");
        assert_eq!(recv(&mut rx).await.unwrap(), DimmerState::new(true, 0));

        monitor.stop().await;
    }

    #[tokio::test]
    async fn stop_releases_subscriptions() {
        let fake = FakeSession::new();
        let monitor = DimmerMonitor::new(Arc::clone(&fake), &test_topics());
        monitor.start().await;
        assert_eq!(fake.subscribed().len(), 2);

        monitor.stop().await;
        assert!(fake.subscribed().is_empty());
    }

    #[tokio::test]
    async fn messages_on_other_topics_are_ignored() {
        let fake = FakeSession::new();
        let monitor = DimmerMonitor::new(Arc::clone(&fake), &test_topics());
        monitor.start().await;
        let mut rx = monitor.state_changes();

        fake.inject("tele/dimmer/SENSOR", br#"{"POWER":"ON","Dimmer":40}"#);
        assert!(recv(&mut rx).await.is_err());
        assert!(monitor.current_state().is_none());

        monitor.stop().await;
    }
}
