//! Thin alarm scheduler: a tick loop that fires due alarms into the
//! executor. Intended to be `tokio::spawn`-ed from main.
//!
//! Every tick it computes "now" in each alarm's IANA zone and dispatches
//! alarms whose weekday and wall-clock `HH:MM` match, at most once per
//! `(alarm, minute)` pair. The executor is the retry authority's boundary:
//! a failed or interrupted alarm simply waits for its next occurrence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::alarm::{AlarmStore, WeeklySchedule};
use crate::executor::AlarmExecutor;
use crate::mqtt::MqttSession;

/// How often the scheduler evaluates the alarm table. Well under a minute,
/// so no due minute is ever skipped.
const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Run the scheduler loop until cancelled.
pub async fn run<S: MqttSession>(
    executor: Arc<AlarmExecutor<S>>,
    store: Arc<AlarmStore>,
    cancel: CancellationToken,
) {
    let mut fired: HashMap<Uuid, String> = HashMap::new();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);

    info!(
        alarms = store.len(),
        tick_secs = TICK_INTERVAL.as_secs(),
        "scheduler started"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = Utc::now();
        for alarm in store.all() {
            if !alarm.definition.enabled {
                continue;
            }
            let local = now.with_timezone(&alarm.definition.time_zone);
            if !is_due(&alarm.schedule, &local) {
                continue;
            }

            let key = minute_key(&local);
            if fired.get(&alarm.definition.id) == Some(&key) {
                continue; // already dispatched in this minute
            }
            fired.insert(alarm.definition.id, key);

            info!(
                alarm = %alarm.definition.id,
                name = %alarm.definition.name,
                "alarm due; dispatching"
            );

            let executor = Arc::clone(&executor);
            let cancel = cancel.clone();
            let id = alarm.definition.id;
            let name = alarm.definition.name.clone();
            tokio::spawn(async move {
                match executor.execute(id, &cancel).await {
                    Ok(Some(state)) => {
                        info!(alarm = %id, name = %name, state = %state, "alarm finished")
                    }
                    Ok(None) => {}
                    Err(e) => error!(alarm = %id, name = %name, "alarm execution failed: {e}"),
                }
            });
        }
    }

    info!("scheduler stopped");
}

/// Whether the schedule matches this local instant's weekday and `HH:MM`.
fn is_due(schedule: &WeeklySchedule, local: &DateTime<Tz>) -> bool {
    schedule.weekdays.contains(&local.weekday())
        && local.hour() == schedule.time.hour()
        && local.minute() == schedule.time.minute()
}

fn minute_key(local: &DateTime<Tz>) -> String {
    local.format("%Y-%m-%d %H:%M").to_string()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone, Weekday};

    fn weekday_0630() -> WeeklySchedule {
        WeeklySchedule {
            time: NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
            weekdays: [Weekday::Mon, Weekday::Fri].into_iter().collect(),
        }
    }

    // 2026-08-03 is a Monday.
    fn monday(h: u32, m: u32, s: u32) -> DateTime<Tz> {
        chrono_tz::UTC.with_ymd_and_hms(2026, 8, 3, h, m, s).unwrap()
    }

    #[test]
    fn due_when_weekday_and_minute_match() {
        let schedule = weekday_0630();
        assert!(is_due(&schedule, &monday(6, 30, 0)));
        // Any second within the minute counts.
        assert!(is_due(&schedule, &monday(6, 30, 59)));
    }

    #[test]
    fn not_due_on_wrong_minute() {
        let schedule = weekday_0630();
        assert!(!is_due(&schedule, &monday(6, 29, 59)));
        assert!(!is_due(&schedule, &monday(6, 31, 0)));
        assert!(!is_due(&schedule, &monday(7, 30, 0)));
    }

    #[test]
    fn not_due_on_unlisted_weekday() {
        let schedule = weekday_0630();
        // 2026-08-04 is a Tuesday.
        let tuesday = chrono_tz::UTC.with_ymd_and_hms(2026, 8, 4, 6, 30, 0).unwrap();
        assert!(!is_due(&schedule, &tuesday));
    }

    #[test]
    fn due_respects_the_alarm_time_zone() {
        let schedule = weekday_0630();
        // 04:30 UTC is 06:30 in Berlin (CEST) on that Monday.
        let utc_instant = chrono_tz::UTC.with_ymd_and_hms(2026, 8, 3, 4, 30, 0).unwrap();
        let berlin = utc_instant.with_timezone(&chrono_tz::Europe::Berlin);
        assert!(is_due(&schedule, &berlin));
        assert!(!is_due(&schedule, &utc_instant));
    }

    #[test]
    fn minute_key_is_stable_within_a_minute() {
        assert_eq!(minute_key(&monday(6, 30, 1)), minute_key(&monday(6, 30, 58)));
        assert_ne!(minute_key(&monday(6, 30, 0)), minute_key(&monday(6, 31, 0)));
    }
}
