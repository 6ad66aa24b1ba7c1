//! MQTT connection supervisor: owns the single broker session, converges to
//! connected with jittered exponential backoff, replays subscriptions on
//! every reconnect, and queues commands written while offline.
//!
//! All broker-facing I/O of the service flows through [`MqttSupervisor`].
//! Keep-alive pinging is delegated to rumqttc's event loop; a missed ping
//! surfaces as a poll error, which the supervisor treats as connection loss.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MqttSettings;
use crate::error::{Error, Result};

/// Queued commands older than this are dropped at dequeue time.
const QUEUE_ENTRY_TTL: Duration = Duration::from_secs(5 * 60);

/// Ceiling for draining background tasks and disconnecting on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Backoff never drops below this, whatever the configured base delay.
const MIN_BACKOFF: Duration = Duration::from_millis(500);

const CONNECTION_CHANNEL_CAPACITY: usize = 64;
const MESSAGE_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// One observed connection transition, including connect failures.
#[derive(Debug, Clone)]
pub struct MqttConnectionState {
    pub is_connected: bool,
    pub attempt_number: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A message delivered on a subscribed topic.
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Session seam
// ---------------------------------------------------------------------------

/// The narrow broker interface the rest of the pipeline talks to. The
/// production implementor is [`MqttSupervisor`]; tests substitute a fake.
pub trait MqttSession: Send + Sync + 'static {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = Result<()>> + Send;
    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<()>> + Send;
    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<()>> + Send;
    fn messages(&self) -> broadcast::Receiver<MqttMessage>;
    fn is_connected(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Offline queue entries
// ---------------------------------------------------------------------------

struct QueuedPublish {
    topic: String,
    payload: Vec<u8>,
    enqueued_at: Instant,
}

impl QueuedPublish {
    fn is_stale(&self) -> bool {
        self.enqueued_at.elapsed() > QUEUE_ENTRY_TTL
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

pub struct MqttSupervisor {
    inner: Arc<SupervisorInner>,
    eventloop: tokio::sync::Mutex<Option<EventLoop>>,
    tasks: tokio::sync::Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

struct SupervisorInner {
    client: AsyncClient,
    settings: MqttSettings,
    connected: AtomicBool,
    disconnect_requested: AtomicBool,
    consecutive_failures: AtomicU32,
    subscriptions: Mutex<HashSet<String>>,
    queue: Mutex<VecDeque<QueuedPublish>>,
    conn_tx: broadcast::Sender<MqttConnectionState>,
    msg_tx: broadcast::Sender<MqttMessage>,
    drain_wake: Notify,
    resume: Notify,
    cancel: CancellationToken,
}

impl MqttSupervisor {
    pub fn new(settings: MqttSettings) -> Self {
        let mut options =
            MqttOptions::new(&settings.client_id, &settings.server, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(2)));
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, 32);
        let (conn_tx, _) = broadcast::channel(CONNECTION_CHANNEL_CAPACITY);
        let (msg_tx, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(SupervisorInner {
                client,
                settings,
                connected: AtomicBool::new(false),
                disconnect_requested: AtomicBool::new(false),
                consecutive_failures: AtomicU32::new(0),
                subscriptions: Mutex::new(HashSet::new()),
                queue: Mutex::new(VecDeque::new()),
                conn_tx,
                msg_tx,
                drain_wake: Notify::new(),
                resume: Notify::new(),
                cancel: CancellationToken::new(),
            }),
            eventloop: tokio::sync::Mutex::new(Some(eventloop)),
            tasks: tokio::sync::Mutex::new(None),
        }
    }

    /// Begin (or resume) the convergence loop. Idempotent; returns once the
    /// background tasks are running, not once the broker is reachable.
    pub async fn connect(&self) -> Result<()> {
        self.inner.disconnect_requested.store(false, Ordering::SeqCst);
        self.inner.consecutive_failures.store(0, Ordering::SeqCst);
        // notify_one stores a permit, so a resume issued before the loop
        // reaches its wait point is not lost.
        self.inner.resume.notify_one();

        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            return Ok(());
        }
        let Some(eventloop) = self.eventloop.lock().await.take() else {
            return Ok(());
        };

        info!(
            server = %self.inner.settings.server,
            port = self.inner.settings.port,
            client_id = %self.inner.settings.client_id,
            "mqtt supervisor starting"
        );

        let sup = tokio::spawn(supervisor_loop(eventloop, Arc::clone(&self.inner)));
        let drain = tokio::spawn(drain_loop(Arc::clone(&self.inner)));
        *tasks = Some((sup, drain));
        Ok(())
    }

    /// Stop converging, clear the offline queue, and disconnect gracefully.
    /// Idempotent; `connect` restarts the loop.
    pub async fn disconnect(&self) {
        self.inner.disconnect_requested.store(true, Ordering::SeqCst);
        let was_connected = self.inner.connected.swap(false, Ordering::SeqCst);
        self.inner.queue.lock().unwrap().clear();

        if let Err(e) = self.inner.client.disconnect().await {
            debug!("graceful mqtt disconnect failed: {e}");
        }
        if was_connected {
            self.inner.emit_connection(false, None);
        }
        info!("mqtt disconnect requested");
    }

    /// Disconnect, cancel background work, and wait up to 10 s for it to
    /// drain. The supervisor cannot be restarted afterwards.
    pub async fn shutdown(&self) {
        self.disconnect().await;
        self.inner.cancel.cancel();

        let mut tasks = self.tasks.lock().await;
        if let Some((sup, drain)) = tasks.take() {
            let joined = async {
                let _ = sup.await;
                let _ = drain.await;
            };
            if tokio::time::timeout(SHUTDOWN_GRACE, joined).await.is_err() {
                warn!("mqtt background tasks did not drain within the shutdown grace period");
            }
        }
    }

    /// Stream of connection transitions. Non-replaying.
    pub fn connection_states(&self) -> broadcast::Receiver<MqttConnectionState> {
        self.inner.conn_tx.subscribe()
    }

    #[cfg(test)]
    fn queue_len(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }

    #[cfg(test)]
    fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().unwrap().len()
    }
}

impl MqttSession for MqttSupervisor {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.inner.publish_inner(topic, payload, true).await
    }

    /// Record the subscription for replay on every reconnect, then subscribe
    /// live if the session is up.
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .insert(topic.to_string());
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.inner.client.subscribe(topic, QoS::AtLeastOnce).await?;
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.inner.subscriptions.lock().unwrap().remove(topic);
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.inner.client.unsubscribe(topic).await?;
        Ok(())
    }

    fn messages(&self) -> broadcast::Receiver<MqttMessage> {
        self.inner.msg_tx.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}

impl SupervisorInner {
    async fn publish_inner(
        &self,
        topic: &str,
        payload: Vec<u8>,
        enqueue_on_disconnect: bool,
    ) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            if enqueue_on_disconnect {
                self.enqueue(topic, payload);
            }
            return Err(Error::NotConnected);
        }

        let deadline = Duration::from_millis(self.settings.command_timeout_ms);
        let send = self
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload.clone());
        match tokio::time::timeout(deadline, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                // A request-channel failure means the session is gone.
                self.connected.store(false, Ordering::SeqCst);
                if enqueue_on_disconnect {
                    self.enqueue(topic, payload);
                }
                Err(Error::Client(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    fn enqueue(&self, topic: &str, payload: Vec<u8>) {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= self.settings.command_queue_depth {
            warn!(
                topic,
                depth = queue.len(),
                "offline command queue full; dropping command"
            );
            return;
        }
        queue.push_back(QueuedPublish {
            topic: topic.to_string(),
            payload,
            enqueued_at: Instant::now(),
        });
        debug!(topic, "command queued while offline");
    }

    fn emit_connection(&self, is_connected: bool, last_error: Option<String>) {
        let _ = self.conn_tx.send(MqttConnectionState {
            is_connected,
            attempt_number: self.consecutive_failures.load(Ordering::SeqCst),
            last_error,
            updated_at: Utc::now(),
        });
    }

    /// Broker acknowledged the session: replay the recorded subscription set
    /// before waking the queue drain, so queued commands never race ahead of
    /// missing subscriptions.
    async fn on_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.emit_connection(true, None);

        let topics: Vec<String> = self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .collect();
        for topic in &topics {
            if let Err(e) = self.client.subscribe(topic, QoS::AtLeastOnce).await {
                error!(topic = %topic, "re-subscribe failed: {e}");
            }
        }
        info!(subscriptions = topics.len(), "mqtt connected");

        self.drain_wake.notify_one();
    }

    /// Connection dropped or a connect attempt failed: emit the transition,
    /// then back off (or halt once the attempt limit is exhausted).
    async fn on_connection_lost(&self, error: String) {
        self.connected.store(false, Ordering::SeqCst);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        self.emit_connection(false, Some(error.clone()));
        warn!(failures, "mqtt connection lost: {error}");

        let max = self.settings.max_reconnection_attempts;
        if max > 0 && failures >= max {
            error!(
                attempts = failures,
                "reconnection attempt limit reached; supervisor halted until the next connect()"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = self.resume.notified() => {}
            }
            return;
        }

        let delay = jittered(backoff_delay(failures, &self.settings));
        debug!(delay_ms = delay.as_millis() as u64, "reconnect backoff");
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    async fn drain_queue(&self) {
        loop {
            if !self.connected.load(Ordering::SeqCst)
                || self.disconnect_requested.load(Ordering::SeqCst)
            {
                return;
            }
            let entry = self.queue.lock().unwrap().pop_front();
            let Some(entry) = entry else { return };

            if entry.is_stale() {
                warn!(topic = %entry.topic, "dropping stale queued command");
                continue;
            }

            // enqueue_on_disconnect=false so a failure cannot double-queue.
            match self
                .publish_inner(&entry.topic, entry.payload.clone(), false)
                .await
            {
                Ok(()) => debug!(topic = %entry.topic, "queued command delivered"),
                Err(e) => {
                    warn!(topic = %entry.topic, "queued publish failed, re-enqueueing: {e}");
                    self.queue.lock().unwrap().push_front(entry);
                    return; // wait for the next reconnect
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Background loops
// ---------------------------------------------------------------------------

async fn supervisor_loop(mut eventloop: EventLoop, inner: Arc<SupervisorInner>) {
    loop {
        if inner.cancel.is_cancelled() {
            break;
        }
        if inner.disconnect_requested.load(Ordering::SeqCst) {
            tokio::select! {
                biased;
                _ = inner.cancel.cancelled() => break,
                _ = inner.resume.notified() => continue,
            }
        }

        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => break,
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    inner.on_connected().await;
                }
                Ok(Event::Incoming(Packet::Publish(p))) => {
                    let _ = inner.msg_tx.send(MqttMessage {
                        topic: p.topic.clone(),
                        payload: p.payload.to_vec(),
                    });
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    inner.on_connection_lost("broker requested disconnect".into()).await;
                }
                Ok(_) => {}
                Err(e) => {
                    inner.on_connection_lost(e.to_string()).await;
                }
            }
        }
    }
    debug!("mqtt supervisor loop exiting");
}

async fn drain_loop(inner: Arc<SupervisorInner>) {
    loop {
        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => break,
            _ = inner.drain_wake.notified() => {}
        }
        inner.drain_queue().await;
    }
    debug!("mqtt queue drain loop exiting");
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// `min(maxDelay, baseDelay * multiplier^(failures - 1))`, floored at 500 ms.
fn backoff_delay(failures: u32, settings: &MqttSettings) -> Duration {
    let base = settings.reconnection_delay_ms as f64
        * settings
            .backoff_multiplier
            .powi(failures.saturating_sub(1) as i32);
    let capped = base.min(settings.max_reconnection_delay_ms as f64);
    Duration::from_millis(capped as u64).max(MIN_BACKOFF)
}

/// Uniform jitter factor in [0.8, 1.2].
fn jittered(delay: Duration) -> Duration {
    delay.mul_f64(0.8 + 0.4 * fastrand::f64())
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// In-process stand-in for the broker session: records publishes and
    /// subscriptions, and lets tests inject incoming messages.
    pub(crate) struct FakeSession {
        pub(crate) connected: AtomicBool,
        published: Mutex<Vec<(String, Vec<u8>)>>,
        subscribed: Mutex<Vec<String>>,
        msg_tx: broadcast::Sender<MqttMessage>,
    }

    impl FakeSession {
        pub(crate) fn new() -> Arc<Self> {
            let (msg_tx, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
            Arc::new(Self {
                connected: AtomicBool::new(true),
                published: Mutex::new(Vec::new()),
                subscribed: Mutex::new(Vec::new()),
                msg_tx,
            })
        }

        /// Simulate a message arriving from the device.
        pub(crate) fn inject(&self, topic: &str, payload: &[u8]) {
            let _ = self.msg_tx.send(MqttMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            });
        }

        pub(crate) fn published(&self) -> Vec<(String, Vec<u8>)> {
            self.published.lock().unwrap().clone()
        }

        /// Payloads published on one topic, as strings, in order.
        pub(crate) fn published_on(&self, topic: &str) -> Vec<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t == topic)
                .map(|(_, p)| String::from_utf8_lossy(p).into_owned())
                .collect()
        }

        pub(crate) fn subscribed(&self) -> Vec<String> {
            self.subscribed.lock().unwrap().clone()
        }
    }

    impl MqttSession for FakeSession {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
            if !self.connected.load(Ordering::SeqCst) {
                return Err(Error::NotConnected);
            }
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload));
            Ok(())
        }

        async fn subscribe(&self, topic: &str) -> Result<()> {
            self.subscribed.lock().unwrap().push(topic.to_string());
            Ok(())
        }

        async fn unsubscribe(&self, topic: &str) -> Result<()> {
            self.subscribed.lock().unwrap().retain(|t| t != topic);
            Ok(())
        }

        fn messages(&self) -> broadcast::Receiver<MqttMessage> {
            self.msg_tx.subscribe()
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MqttSettings;

    fn test_settings() -> MqttSettings {
        MqttSettings {
            server: "127.0.0.1".into(),
            port: 1883,
            client_id: "lumirise-test".into(),
            username: None,
            password: None,
            keep_alive_secs: 60,
            reconnection_delay_ms: 1000,
            max_reconnection_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            max_reconnection_attempts: 0,
            command_timeout_ms: 5000,
            status_confirmation_timeout_ms: 10_000,
            command_queue_depth: 3,
        }
    }

    /// Supervisor without `connect()`: the event loop is never polled, so the
    /// session stays down and offline semantics can be exercised directly.
    fn offline_supervisor() -> MqttSupervisor {
        MqttSupervisor::new(test_settings())
    }

    // -- Offline publish / queue ---------------------------------------------

    #[tokio::test]
    async fn publish_while_disconnected_errors_and_queues() {
        let sup = offline_supervisor();
        let err = sup.publish("cmnd/dimmer/power", b"x".to_vec()).await;
        assert!(matches!(err, Err(Error::NotConnected)));
        assert_eq!(sup.queue_len(), 1);
    }

    #[tokio::test]
    async fn offline_queue_drops_new_entries_on_overflow() {
        let sup = offline_supervisor();
        for i in 0..5 {
            let _ = sup
                .publish("cmnd/dimmer/dimmer", format!("{i}").into_bytes())
                .await;
        }
        // Capacity is 3; entries 4 and 5 were dropped.
        assert_eq!(sup.queue_len(), 3);
        let queue = sup.inner.queue.lock().unwrap();
        let payloads: Vec<_> = queue
            .iter()
            .map(|q| String::from_utf8_lossy(&q.payload).into_owned())
            .collect();
        assert_eq!(payloads, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn queue_preserves_fifo_order() {
        let sup = offline_supervisor();
        let _ = sup.publish("x", b"first".to_vec()).await;
        let _ = sup.publish("x", b"second".to_vec()).await;
        let queue = sup.inner.queue.lock().unwrap();
        assert_eq!(queue.front().unwrap().payload, b"first");
        assert_eq!(queue.back().unwrap().payload, b"second");
    }

    #[test]
    fn queued_entry_staleness() {
        let fresh = QueuedPublish {
            topic: "x".into(),
            payload: vec![],
            enqueued_at: Instant::now(),
        };
        assert!(!fresh.is_stale());

        let stale = QueuedPublish {
            topic: "x".into(),
            payload: vec![],
            enqueued_at: Instant::now() - Duration::from_secs(6 * 60),
        };
        assert!(stale.is_stale());
    }

    #[tokio::test]
    async fn disconnect_clears_queue() {
        let sup = offline_supervisor();
        let _ = sup.publish("x", b"a".to_vec()).await;
        let _ = sup.publish("x", b"b".to_vec()).await;
        assert_eq!(sup.queue_len(), 2);

        sup.disconnect().await;
        assert_eq!(sup.queue_len(), 0);
    }

    // -- Subscriptions --------------------------------------------------------

    #[tokio::test]
    async fn subscribe_while_disconnected_errors_but_records() {
        let sup = offline_supervisor();
        let err = sup.subscribe("stat/dimmer/POWER").await;
        assert!(matches!(err, Err(Error::NotConnected)));
        // Still recorded for replay on the next successful connect.
        assert_eq!(sup.subscription_count(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_removes_from_replay_set() {
        let sup = offline_supervisor();
        let _ = sup.subscribe("stat/dimmer/POWER").await;
        let _ = sup.subscribe("stat/dimmer/RESULT").await;
        assert_eq!(sup.subscription_count(), 2);

        let _ = sup.unsubscribe("stat/dimmer/POWER").await;
        assert_eq!(sup.subscription_count(), 1);
    }

    // -- Backoff ---------------------------------------------------------------

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let s = test_settings();
        assert_eq!(backoff_delay(1, &s), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2, &s), Duration::from_millis(2000));
        assert_eq!(backoff_delay(3, &s), Duration::from_millis(4000));
        // 1000 * 2^9 = 512000 > cap
        assert_eq!(backoff_delay(10, &s), Duration::from_millis(30_000));
    }

    #[test]
    fn backoff_floors_at_half_second() {
        let mut s = test_settings();
        s.reconnection_delay_ms = 10;
        assert_eq!(backoff_delay(1, &s), MIN_BACKOFF);
    }

    #[test]
    fn jitter_stays_in_band() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let d = jittered(base);
            assert!(d >= Duration::from_millis(800), "jitter below band: {d:?}");
            assert!(d <= Duration::from_millis(1200), "jitter above band: {d:?}");
        }
    }

    // -- Connection events ------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn connection_lost_emits_disconnected_event_with_error() {
        let sup = offline_supervisor();
        let mut rx = sup.connection_states();

        sup.inner.connected.store(true, Ordering::SeqCst);
        tokio::time::timeout(
            Duration::from_secs(5),
            sup.inner.on_connection_lost("connection reset".into()),
        )
        .await
        .unwrap();

        let ev = rx.try_recv().unwrap();
        assert!(!ev.is_connected);
        assert_eq!(ev.attempt_number, 1);
        assert_eq!(ev.last_error.as_deref(), Some("connection reset"));
        assert!(!sup.is_connected());
    }

    // -- Fake session sanity -----------------------------------------------------

    #[tokio::test]
    async fn fake_session_round_trip() {
        let fake = testing::FakeSession::new();
        let mut rx = fake.messages();

        fake.publish("cmnd/dimmer/power", b"{\"POWER\":\"ON\"}".to_vec())
            .await
            .unwrap();
        assert_eq!(
            fake.published_on("cmnd/dimmer/power"),
            vec!["{\"POWER\":\"ON\"}"]
        );

        fake.inject("stat/dimmer/POWER", b"ON");
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, "stat/dimmer/POWER");
        assert_eq!(msg.payload, b"ON");
    }
}
