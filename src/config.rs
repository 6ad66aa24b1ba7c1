//! TOML configuration loading and validation: broker settings, dimmer
//! behavior, topic paths, and the alarm table.

use anyhow::{bail, Context, Result};
use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use crate::alarm::{AlarmDefinition, StoredAlarm, WeeklySchedule, MAX_RAMP_DURATION, MIN_RAMP_DURATION};

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mqtt: MqttSettings,
    #[serde(default)]
    pub dimmer: DimmerSettings,
    #[serde(default)]
    pub topics: TopicSettings,
    #[serde(default)]
    pub alarms: Vec<AlarmEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttSettings {
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_reconnection_delay_ms")]
    pub reconnection_delay_ms: u64,
    #[serde(default = "default_max_reconnection_delay_ms")]
    pub max_reconnection_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// 0 means retry forever.
    #[serde(default)]
    pub max_reconnection_attempts: u32,

    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default = "default_status_confirmation_timeout_ms")]
    pub status_confirmation_timeout_ms: u64,
    #[serde(default = "default_command_queue_depth")]
    pub command_queue_depth: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DimmerSettings {
    /// Hardware floor: the dimmer flickers below this output level.
    #[serde(default = "default_minimum_brightness_percent")]
    pub minimum_brightness_percent: u8,
    #[serde(default = "default_ramp_step_delay_ms")]
    pub ramp_step_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicSettings {
    #[serde(default = "default_power_command")]
    pub power_command: String,
    #[serde(default = "default_power_status")]
    pub power_status: String,
    #[serde(default = "default_brightness_command")]
    pub brightness_command: String,
    #[serde(default = "default_brightness_status")]
    pub brightness_status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlarmEntry {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Wall-clock fire time, `HH:MM`, local to `time_zone`.
    pub time: String,
    /// Weekday names: `mon`, `tue`, ... (chrono accepts full names too).
    pub weekdays: Vec<String>,
    #[serde(default = "default_start_brightness")]
    pub start_brightness_percent: u8,
    #[serde(default = "default_target_brightness")]
    pub target_brightness_percent: u8,
    #[serde(default = "default_ramp_duration_secs")]
    pub ramp_duration_secs: u64,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

fn default_server() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    1883
}
fn default_client_id() -> String {
    "lumirise".to_string()
}
fn default_keep_alive_secs() -> u64 {
    60
}
fn default_reconnection_delay_ms() -> u64 {
    1000
}
fn default_max_reconnection_delay_ms() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_command_timeout_ms() -> u64 {
    5000
}
fn default_status_confirmation_timeout_ms() -> u64 {
    10_000
}
fn default_command_queue_depth() -> usize {
    20
}
fn default_minimum_brightness_percent() -> u8 {
    20
}
fn default_ramp_step_delay_ms() -> u64 {
    100
}
fn default_power_command() -> String {
    "cmnd/dimmer/power".to_string()
}
fn default_power_status() -> String {
    "stat/dimmer/POWER".to_string()
}
fn default_brightness_command() -> String {
    "cmnd/dimmer/dimmer".to_string()
}
fn default_brightness_status() -> String {
    "stat/dimmer/RESULT".to_string()
}
fn default_true() -> bool {
    true
}
fn default_start_brightness() -> u8 {
    20
}
fn default_target_brightness() -> u8 {
    100
}
fn default_ramp_duration_secs() -> u64 {
    1800
}
fn default_time_zone() -> String {
    "UTC".to_string()
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            server: default_server(),
            port: default_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive_secs(),
            reconnection_delay_ms: default_reconnection_delay_ms(),
            max_reconnection_delay_ms: default_max_reconnection_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_reconnection_attempts: 0,
            command_timeout_ms: default_command_timeout_ms(),
            status_confirmation_timeout_ms: default_status_confirmation_timeout_ms(),
            command_queue_depth: default_command_queue_depth(),
        }
    }
}

impl Default for DimmerSettings {
    fn default() -> Self {
        Self {
            minimum_brightness_percent: default_minimum_brightness_percent(),
            ramp_step_delay_ms: default_ramp_step_delay_ms(),
        }
    }
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            power_command: default_power_command(),
            power_status: default_power_status(),
            brightness_command: default_brightness_command(),
            brightness_status: default_brightness_status(),
        }
    }
}

// ---------------------------------------------------------------------------
// Load + resolve
// ---------------------------------------------------------------------------

/// Read and parse a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    Ok(config)
}

impl Config {
    /// Resolve the alarm table into stored alarms, validating every entry
    /// and rejecting overlapping ramp windows on shared weekdays.
    pub fn build_alarms(&self) -> Result<Vec<StoredAlarm>> {
        let mut alarms = Vec::with_capacity(self.alarms.len());
        for entry in &self.alarms {
            alarms.push(resolve_alarm(entry)?);
        }
        check_overlaps(&alarms)?;
        Ok(alarms)
    }
}

fn resolve_alarm(entry: &AlarmEntry) -> Result<StoredAlarm> {
    if entry.start_brightness_percent > 100 || entry.target_brightness_percent > 100 {
        bail!(
            "alarm '{}': brightness percentages must be within 0..=100",
            entry.name
        );
    }

    let time = NaiveTime::parse_from_str(&entry.time, "%H:%M")
        .with_context(|| format!("alarm '{}': bad time '{}' (want HH:MM)", entry.name, entry.time))?;

    let mut weekdays = std::collections::HashSet::new();
    for day in &entry.weekdays {
        let weekday: Weekday = day
            .parse()
            .map_err(|_| anyhow::anyhow!("alarm '{}': unknown weekday '{day}'", entry.name))?;
        weekdays.insert(weekday);
    }
    if weekdays.is_empty() {
        bail!("alarm '{}': at least one weekday is required", entry.name);
    }

    let time_zone: Tz = entry
        .time_zone
        .parse()
        .map_err(|_| anyhow::anyhow!("alarm '{}': unknown time zone '{}'", entry.name, entry.time_zone))?;

    let ramp_duration = Duration::from_secs(entry.ramp_duration_secs)
        .clamp(MIN_RAMP_DURATION, MAX_RAMP_DURATION);

    Ok(StoredAlarm {
        definition: AlarmDefinition {
            id: Uuid::new_v4(),
            name: entry.name.clone(),
            enabled: entry.enabled,
            start_brightness_percent: entry.start_brightness_percent,
            target_brightness_percent: entry.target_brightness_percent,
            ramp_duration,
            time_zone,
        },
        schedule: WeeklySchedule { time, weekdays },
    })
}

/// Only one ramp may run on the dimmer at a time: enabled alarms sharing a
/// weekday must not have overlapping `[time, time + ramp_duration)` windows.
fn check_overlaps(alarms: &[StoredAlarm]) -> Result<()> {
    use chrono::Timelike;

    let enabled: Vec<&StoredAlarm> = alarms.iter().filter(|a| a.definition.enabled).collect();
    for (i, a) in enabled.iter().enumerate() {
        for b in &enabled[i + 1..] {
            if a.schedule.weekdays.is_disjoint(&b.schedule.weekdays) {
                continue;
            }
            let a_start = (a.schedule.time.hour() * 60 + a.schedule.time.minute()) as u64;
            let b_start = (b.schedule.time.hour() * 60 + b.schedule.time.minute()) as u64;
            let a_end = a_start + a.definition.ramp_duration.as_secs().div_ceil(60).max(1);
            let b_end = b_start + b.definition.ramp_duration.as_secs().div_ceil(60).max(1);
            if a_start < b_end && b_start < a_end {
                bail!(
                    "alarms '{}' and '{}' have overlapping ramp windows on a shared weekday",
                    a.definition.name,
                    b.definition.name
                );
            }
        }
    }
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
