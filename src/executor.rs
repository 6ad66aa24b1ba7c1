//! Alarm executor: wires the state machine, command publisher, interruption
//! detector, and state monitor together to run one end-to-end wake-up ramp.
//!
//! The composition for one trigger:
//! power on → seed start brightness → linear ramp, with the detector's
//! expected state recalibrated on every published step. An interruption
//! event routes to `ManualOverride` and cancels the ramp; the state-machine
//! mutex guarantees that exactly one of completion and interruption wins.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::alarm::{AlarmDefinition, AlarmMachine, AlarmState, AlarmStore, AlarmTrigger};
use crate::command::DimmerCommander;
use crate::detector::{InterruptionDetector, InterruptionEvent, InterruptionReason};
use crate::error::{Error, Result};
use crate::monitor::{DimmerMonitor, DimmerState};
use crate::mqtt::MqttSession;

pub struct AlarmExecutor<S: MqttSession> {
    session: Arc<S>,
    store: Arc<AlarmStore>,
    monitor: Arc<DimmerMonitor<S>>,
    detector: Arc<InterruptionDetector>,
    commander: Arc<DimmerCommander<S>>,
    /// If the device has reported nothing at all after this long, the run is
    /// flagged as running open-loop.
    status_confirmation_timeout: Duration,
    active: Mutex<HashSet<Uuid>>,
}

impl<S: MqttSession> AlarmExecutor<S> {
    pub fn new(
        session: Arc<S>,
        store: Arc<AlarmStore>,
        monitor: Arc<DimmerMonitor<S>>,
        detector: Arc<InterruptionDetector>,
        commander: Arc<DimmerCommander<S>>,
        status_confirmation_timeout: Duration,
    ) -> Self {
        Self {
            session,
            store,
            monitor,
            detector,
            commander,
            status_confirmation_timeout,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Run one alarm end to end. Returns the terminal state, or `None` when
    /// the alarm is unknown, disabled, or already executing.
    pub async fn execute(
        &self,
        alarm_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<AlarmState>> {
        let Some(stored) = self.store.get(alarm_id) else {
            warn!(alarm = %alarm_id, "unknown alarm; skipping");
            return Ok(None);
        };
        if !stored.definition.enabled {
            info!(alarm = %alarm_id, name = %stored.definition.name, "alarm disabled; skipping");
            return Ok(None);
        }

        // Per-id lease: concurrent executions of the same alarm are rejected.
        if !self.active.lock().unwrap().insert(alarm_id) {
            warn!(alarm = %alarm_id, "execution already in flight; skipping");
            return Ok(None);
        }
        let result = self.run(stored.definition, cancel).await;
        self.active.lock().unwrap().remove(&alarm_id);
        result.map(Some)
    }

    async fn run(&self, def: AlarmDefinition, cancel: &CancellationToken) -> Result<AlarmState> {
        if !self.session.is_connected() {
            warn!(alarm = %def.id, "broker not connected at trigger time; commands will queue");
        }
        self.monitor.start().await;

        let start = def.start_brightness_percent;
        // A start above the target degrades to a constant-brightness segment.
        let target = def.target_brightness_percent.max(start);
        let duration = def.clamped_ramp_duration();

        info!(
            alarm = %def.id,
            name = %def.name,
            start,
            target,
            duration_secs = duration.as_secs(),
            "alarm triggered"
        );

        let machine = Arc::new(AlarmMachine::new(def.id));
        machine.fire(AlarmTrigger::SchedulerTrigger, None)?;
        machine.fire(AlarmTrigger::Start, None)?;

        // Interruption events fire ManualOverride and stop the ramp. The
        // subscription is scoped to this execution.
        let ramp_cancel = cancel.child_token();
        let forwarder = spawn_override_forwarder(
            self.detector.interruptions(),
            Arc::clone(&machine),
            ramp_cancel.clone(),
        );
        let watchdog = self.spawn_confirmation_watchdog();

        self.detector.set_expected_state(DimmerState::new(true, start));
        self.detector.enable_detection();

        let outcome = self.drive(start, target, duration, &ramp_cancel).await;

        match &outcome {
            Ok(()) => {
                if machine.state() == AlarmState::Running {
                    machine.try_fire(AlarmTrigger::Complete, None);
                }
            }
            Err(Error::Cancelled) => {
                // A cancellation caused by an interruption already moved the
                // machine out of Running; only a caller-driven cancellation
                // is an error.
                if machine.state() == AlarmState::Running {
                    machine.try_fire(AlarmTrigger::Error, Some("execution cancelled".into()));
                }
            }
            Err(e) => {
                machine.try_fire(AlarmTrigger::Error, Some(e.to_string()));
            }
        }

        // Teardown ordering matters: release the interruption subscription
        // first, then disarm detection, so no late event can leak into a
        // later alarm.
        forwarder.abort();
        let _ = forwarder.await;
        watchdog.abort();
        self.detector.disable_detection();
        self.detector.clear_expected_state();

        let final_state = machine.state();
        machine.dispose();
        info!(alarm = %def.id, name = %def.name, state = %final_state, "alarm execution finished");
        Ok(final_state)
    }

    async fn drive(
        &self,
        start: u8,
        target: u8,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.commander.turn_on().await?;
        self.commander.set_brightness(start).await?;

        let detector = Arc::clone(&self.detector);
        self.commander
            .ramp_brightness(start, target, duration, cancel, move |value| {
                detector.set_expected_state(DimmerState::new(true, value));
            })
            .await
    }

    /// Flags a device that never reported any status while a run is active.
    fn spawn_confirmation_watchdog(&self) -> JoinHandle<()> {
        let monitor = Arc::clone(&self.monitor);
        let detector = Arc::clone(&self.detector);
        let timeout = self.status_confirmation_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if monitor.current_state().is_none() {
                detector.report(
                    InterruptionReason::StatusConfirmationTimeout,
                    format!("no device status observed within {}s", timeout.as_secs()),
                );
            }
        })
    }
}

fn spawn_override_forwarder(
    mut events: broadcast::Receiver<InterruptionEvent>,
    machine: Arc<AlarmMachine>,
    ramp_cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ev) => {
                    let message = format!("{}: {}", ev.reason, ev.message);
                    if machine
                        .try_fire(AlarmTrigger::ManualOverride, Some(message))
                        .is_some()
                    {
                        ramp_cancel.cancel();
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "interruption stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

// ===========================================================================
// Tests
// ===========================================================================
