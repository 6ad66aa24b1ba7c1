//! Dimmer command publisher: semantic operations (power, brightness, linear
//! ramp) translated into broker publications with correct ordering and
//! hardware-aware clamping.
//!
//! One mutex serializes every public operation, so ramp steps and ad-hoc
//! commands never interleave on the wire. The same mutex guards the last
//! commanded brightness, which the ramp consults to collapse duplicate
//! steps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{DimmerSettings, TopicSettings};
use crate::error::{Error, Result};
use crate::mqtt::MqttSession;

// ---------------------------------------------------------------------------
// Commander
// ---------------------------------------------------------------------------

pub struct DimmerCommander<S: MqttSession> {
    session: Arc<S>,
    power_topic: String,
    brightness_topic: String,
    /// Below this floor the hardware flickers; writes under it become power-off.
    minimum_brightness_percent: u8,
    step_delay: Duration,
    lock: Mutex<CommanderState>,
}

struct CommanderState {
    last_commanded: Option<u8>,
}

impl<S: MqttSession> DimmerCommander<S> {
    pub fn new(session: Arc<S>, topics: &TopicSettings, dimmer: &DimmerSettings) -> Self {
        Self {
            session,
            power_topic: topics.power_command.clone(),
            brightness_topic: topics.brightness_command.clone(),
            minimum_brightness_percent: dimmer.minimum_brightness_percent,
            step_delay: Duration::from_millis(dimmer.ramp_step_delay_ms.max(1)),
            lock: Mutex::new(CommanderState {
                last_commanded: None,
            }),
        }
    }

    pub async fn turn_on(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.publish_power(true).await
    }

    pub async fn turn_off(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.publish_power(false).await
    }

    /// Command an absolute brightness. Values under the hardware floor turn
    /// the dimmer off instead.
    pub async fn set_brightness(&self, percent: u8) -> Result<()> {
        ensure_percent(percent, "percent")?;
        let mut guard = self.lock.lock().await;
        self.apply_brightness(&mut guard, percent).await
    }

    /// Linear ramp from `start` to `target` over `duration`.
    ///
    /// Steps are spaced `ramp_step_delay_ms` apart; a step is only published
    /// when its rounded value differs from the last commanded one, and every
    /// published value is reported through `progress`. Cancellation is
    /// honored between steps and during the inter-step sleep.
    pub async fn ramp_brightness<F>(
        &self,
        start: u8,
        target: u8,
        duration: Duration,
        cancel: &CancellationToken,
        mut progress: F,
    ) -> Result<()>
    where
        F: FnMut(u8),
    {
        ensure_percent(start, "start")?;
        ensure_percent(target, "target")?;

        let mut guard = self.lock.lock().await;
        let steps = total_steps(duration, self.step_delay);
        debug!(start, target, steps, "ramp begin");

        for k in 0..steps {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let value = step_value(start, target, k, steps);
            if guard.last_commanded != Some(value) {
                self.session
                    .publish(&self.brightness_topic, value.to_string().into_bytes())
                    .await?;
                guard.last_commanded = Some(value);
                progress(value);
            }

            if k + 1 < steps {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(self.step_delay) => {}
                }
            }
        }

        // Rounding can leave the wire short of the target; close the gap.
        if guard.last_commanded != Some(target) && !cancel.is_cancelled() {
            self.apply_brightness(&mut guard, target).await?;
            progress(target);
        }

        debug!(target, "ramp complete");
        Ok(())
    }

    async fn apply_brightness(&self, state: &mut CommanderState, percent: u8) -> Result<()> {
        if percent < self.minimum_brightness_percent {
            debug!(
                percent,
                floor = self.minimum_brightness_percent,
                "below hardware floor; turning off instead"
            );
            return self.publish_power(false).await;
        }
        self.session
            .publish(&self.brightness_topic, percent.to_string().into_bytes())
            .await?;
        state.last_commanded = Some(percent);
        Ok(())
    }

    async fn publish_power(&self, on: bool) -> Result<()> {
        let payload = serde_json::json!({ "POWER": if on { "ON" } else { "OFF" } });
        self.session
            .publish(&self.power_topic, payload.to_string().into_bytes())
            .await
    }
}

// ---------------------------------------------------------------------------
// Ramp math
// ---------------------------------------------------------------------------

fn ensure_percent(value: u8, name: &str) -> Result<()> {
    if value > 100 {
        return Err(Error::InvalidArgument(format!(
            "{name} must be within 0..=100, got {value}"
        )));
    }
    Ok(())
}

/// `max(1, ceil(duration / step_delay))`.
fn total_steps(duration: Duration, step_delay: Duration) -> u64 {
    let ratio = duration.as_secs_f64() / step_delay.as_secs_f64();
    ratio.ceil().max(1.0) as u64
}

/// Brightness commanded at step `k` of `steps`, clamped to [0, 100].
fn step_value(start: u8, target: u8, k: u64, steps: u64) -> u8 {
    if steps <= 1 {
        return target;
    }
    let fraction = k as f64 / (steps - 1) as f64;
    let value = start as f64 + (target as f64 - start as f64) * fraction;
    value.round().clamp(0.0, 100.0) as u8
}

// ===========================================================================
// Tests
// ===========================================================================
