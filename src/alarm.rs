//! Alarm domain types: the per-alarm lifecycle state machine, resolved
//! alarm definitions, weekly schedules, and the in-memory alarm store.
//!
//! ## Lifecycle state machine
//!
//! ```text
//! Idle ──[SchedulerTrigger]──▶ Triggered ──[Start]──▶ Running
//!  ▲                              │                      │
//!  │◀───────[Cancel]──────────────┘     ┌────────────────┼────────────────┐
//!  │                             [ManualOverride]    [Complete]        [Error]
//!  │                                    ▼                ▼                ▼
//!  │◀──[Reset]── Interrupted        Completed         Failed ──[Reset]──▶ Idle
//! ```
//!
//! `Fire` enforces the table; `TryFire` degrades an illegal transition to a
//! warning log so the completion path and the interruption path can race
//! without surfacing spurious errors.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Capacity of the per-machine transition broadcast channel.
const TRANSITION_CHANNEL_CAPACITY: usize = 64;

/// Ramp duration bounds: one second to a full day.
pub const MIN_RAMP_DURATION: Duration = Duration::from_secs(1);
pub const MAX_RAMP_DURATION: Duration = Duration::from_secs(24 * 3600);

// ---------------------------------------------------------------------------
// States and triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmState {
    Idle,
    Triggered,
    Running,
    Paused,
    Completed,
    Interrupted,
    Failed,
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlarmState::Idle => "idle",
            AlarmState::Triggered => "triggered",
            AlarmState::Running => "running",
            AlarmState::Paused => "paused",
            AlarmState::Completed => "completed",
            AlarmState::Interrupted => "interrupted",
            AlarmState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmTrigger {
    SchedulerTrigger,
    Start,
    Cancel,
    ManualOverride,
    Complete,
    Error,
    Reset,
    Pause,
    Resume,
}

impl fmt::Display for AlarmTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlarmTrigger::SchedulerTrigger => "scheduler-trigger",
            AlarmTrigger::Start => "start",
            AlarmTrigger::Cancel => "cancel",
            AlarmTrigger::ManualOverride => "manual-override",
            AlarmTrigger::Complete => "complete",
            AlarmTrigger::Error => "error",
            AlarmTrigger::Reset => "reset",
            AlarmTrigger::Pause => "pause",
            AlarmTrigger::Resume => "resume",
        };
        f.write_str(s)
    }
}

/// The legal transition table. Pairs not listed here are illegal.
const TRANSITIONS: &[(AlarmState, AlarmTrigger, AlarmState)] = &[
    (AlarmState::Idle, AlarmTrigger::SchedulerTrigger, AlarmState::Triggered),
    (AlarmState::Idle, AlarmTrigger::Pause, AlarmState::Paused),
    (AlarmState::Triggered, AlarmTrigger::Start, AlarmState::Running),
    (AlarmState::Triggered, AlarmTrigger::Cancel, AlarmState::Idle),
    (AlarmState::Running, AlarmTrigger::ManualOverride, AlarmState::Interrupted),
    (AlarmState::Running, AlarmTrigger::Complete, AlarmState::Completed),
    (AlarmState::Running, AlarmTrigger::Error, AlarmState::Failed),
    (AlarmState::Interrupted, AlarmTrigger::Reset, AlarmState::Idle),
    (AlarmState::Completed, AlarmTrigger::Reset, AlarmState::Idle),
    (AlarmState::Failed, AlarmTrigger::Reset, AlarmState::Idle),
    (AlarmState::Paused, AlarmTrigger::Resume, AlarmState::Idle),
];

fn lookup(from: AlarmState, trigger: AlarmTrigger) -> Option<AlarmState> {
    TRANSITIONS
        .iter()
        .find(|(s, t, _)| *s == from && *t == trigger)
        .map(|(_, _, to)| *to)
}

// ---------------------------------------------------------------------------
// Transition events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AlarmStateTransition {
    pub alarm_id: Uuid,
    pub previous_state: AlarmState,
    pub new_state: AlarmState,
    pub trigger: AlarmTrigger,
    pub at: DateTime<Utc>,
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

struct MachineInner {
    state: AlarmState,
    disposed: bool,
}

/// Thread-safe lifecycle machine for one alarm.
///
/// One mutex covers both the table lookup and the state write, so two racing
/// callers cannot both observe a legal transition and both transition.
pub struct AlarmMachine {
    alarm_id: Uuid,
    inner: Mutex<MachineInner>,
    tx: broadcast::Sender<AlarmStateTransition>,
}

impl AlarmMachine {
    pub fn new(alarm_id: Uuid) -> Self {
        let (tx, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self {
            alarm_id,
            inner: Mutex::new(MachineInner {
                state: AlarmState::Idle,
                disposed: false,
            }),
            tx,
        }
    }

    pub fn alarm_id(&self) -> Uuid {
        self.alarm_id
    }

    pub fn state(&self) -> AlarmState {
        self.inner.lock().unwrap().state
    }

    /// Attempt a transition. Fails with `IllegalTransition` (state unchanged)
    /// if the `(current, trigger)` pair is not in the table.
    pub fn fire(&self, trigger: AlarmTrigger, message: Option<String>) -> Result<AlarmState> {
        let mut inner = self.inner.lock().unwrap();
        if inner.disposed {
            return Err(Error::Disposed);
        }
        let Some(next) = lookup(inner.state, trigger) else {
            return Err(Error::IllegalTransition {
                from: inner.state,
                trigger,
            });
        };
        let previous = inner.state;
        inner.state = next;

        info!(
            alarm = %self.alarm_id,
            from = %previous,
            to = %next,
            trigger = %trigger,
            "alarm transition"
        );

        // Send while still holding the lock so observers see transitions in
        // the order they happened.
        let _ = self.tx.send(AlarmStateTransition {
            alarm_id: self.alarm_id,
            previous_state: previous,
            new_state: next,
            trigger,
            at: Utc::now(),
            message,
        });

        Ok(next)
    }

    /// Like [`fire`](Self::fire), but an illegal transition is logged at
    /// warning level instead of surfacing. Used on the execution path where
    /// completion and interruption legitimately race.
    pub fn try_fire(&self, trigger: AlarmTrigger, message: Option<String>) -> Option<AlarmState> {
        match self.fire(trigger, message) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(alarm = %self.alarm_id, trigger = %trigger, "ignored: {e}");
                None
            }
        }
    }

    pub fn can_fire(&self, trigger: AlarmTrigger) -> bool {
        lookup(self.inner.lock().unwrap().state, trigger).is_some()
    }

    /// Triggers legal from the current state.
    pub fn permitted_triggers(&self) -> Vec<AlarmTrigger> {
        let state = self.inner.lock().unwrap().state;
        TRANSITIONS
            .iter()
            .filter(|(s, _, _)| *s == state)
            .map(|(_, t, _)| *t)
            .collect()
    }

    /// Stream of transitions, in fire order. Non-replaying.
    pub fn transitions(&self) -> broadcast::Receiver<AlarmStateTransition> {
        self.tx.subscribe()
    }

    /// Further `fire` calls fail with `Disposed`.
    pub fn dispose(&self) {
        self.inner.lock().unwrap().disposed = true;
    }
}

// ---------------------------------------------------------------------------
// Alarm definition + schedule
// ---------------------------------------------------------------------------

/// A resolved alarm, frozen for the duration of one execution.
#[derive(Debug, Clone)]
pub struct AlarmDefinition {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub start_brightness_percent: u8,
    pub target_brightness_percent: u8,
    pub ramp_duration: Duration,
    pub time_zone: Tz,
}

impl AlarmDefinition {
    /// Ramp duration clamped to the supported range.
    pub fn clamped_ramp_duration(&self) -> Duration {
        self.ramp_duration.clamp(MIN_RAMP_DURATION, MAX_RAMP_DURATION)
    }
}

/// When an alarm fires: a wall-clock time on a set of weekdays, interpreted
/// in the alarm's time zone.
#[derive(Debug, Clone)]
pub struct WeeklySchedule {
    pub time: NaiveTime,
    pub weekdays: HashSet<Weekday>,
}

#[derive(Debug, Clone)]
pub struct StoredAlarm {
    pub definition: AlarmDefinition,
    pub schedule: WeeklySchedule,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory alarm registry, seeded from configuration at startup.
pub struct AlarmStore {
    alarms: Mutex<HashMap<Uuid, StoredAlarm>>,
}

impl AlarmStore {
    pub fn new(alarms: Vec<StoredAlarm>) -> Self {
        Self {
            alarms: Mutex::new(
                alarms
                    .into_iter()
                    .map(|a| (a.definition.id, a))
                    .collect(),
            ),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<StoredAlarm> {
        self.alarms.lock().unwrap().get(&id).cloned()
    }

    /// Snapshot of all alarms, for the scheduler tick.
    pub fn all(&self) -> Vec<StoredAlarm> {
        self.alarms.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alarms.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.lock().unwrap().is_empty()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
