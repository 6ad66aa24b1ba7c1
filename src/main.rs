//! Service entry point: reads config, brings up the MQTT supervisor, dimmer
//! monitor, interruption detector, and command publisher, then runs the
//! alarm scheduler until SIGINT/SIGTERM.
//!
//! Lifecycle notes:
//! - supervisor, monitor, and detector are process-wide singletons
//! - broker loss while a ramp is armed is reported as a device interruption
//! - shutdown cancels the scheduler, stops the monitor, and gives the
//!   supervisor up to 10 s to drain and disconnect gracefully

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lumirise::alarm::AlarmStore;
use lumirise::command::DimmerCommander;
use lumirise::config;
use lumirise::detector::{InterruptionDetector, InterruptionReason};
use lumirise::executor::AlarmExecutor;
use lumirise::monitor::DimmerMonitor;
use lumirise::mqtt::MqttSupervisor;
use lumirise::scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // ── Structured logging ──────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "lumirise.toml".to_string());
    let cfg = config::load(&config_path)?;
    let alarms = cfg.build_alarms()?;
    if alarms.is_empty() {
        warn!("no alarms configured");
    }
    let store = Arc::new(AlarmStore::new(alarms));
    info!(alarms = store.len(), config = %config_path, "configuration loaded");

    // ── MQTT supervisor ─────────────────────────────────────────────
    let supervisor = Arc::new(MqttSupervisor::new(cfg.mqtt.clone()));
    supervisor.connect().await?;

    // ── Dimmer monitor + interruption detector ──────────────────────
    let monitor = Arc::new(DimmerMonitor::new(Arc::clone(&supervisor), &cfg.topics));
    monitor.start().await;

    let detector = Arc::new(InterruptionDetector::new());
    let _detector_feed = detector.watch(monitor.state_changes());

    // Broker loss while detection is armed counts as a device interruption.
    {
        let mut conn_rx = supervisor.connection_states();
        let detector = Arc::clone(&detector);
        tokio::spawn(async move {
            loop {
                match conn_rx.recv().await {
                    Ok(ev) if !ev.is_connected => {
                        detector.report(
                            InterruptionReason::DeviceDisconnected,
                            ev.last_error
                                .unwrap_or_else(|| "broker connection lost".to_string()),
                        );
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ── Executor + scheduler ────────────────────────────────────────
    let commander = Arc::new(DimmerCommander::new(
        Arc::clone(&supervisor),
        &cfg.topics,
        &cfg.dimmer,
    ));
    let executor = Arc::new(AlarmExecutor::new(
        Arc::clone(&supervisor),
        Arc::clone(&store),
        Arc::clone(&monitor),
        Arc::clone(&detector),
        commander,
        Duration::from_millis(cfg.mqtt.status_confirmation_timeout_ms),
    ));

    let cancel = CancellationToken::new();
    let scheduler_task = tokio::spawn(scheduler::run(
        Arc::clone(&executor),
        Arc::clone(&store),
        cancel.clone(),
    ));

    // ── Signal handling ─────────────────────────────────────────────
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    let exit_reason = tokio::select! {
        _ = &mut ctrl_c => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };

    // ── Graceful shutdown ───────────────────────────────────────────
    warn!(signal = exit_reason, "shutting down");
    cancel.cancel();
    let _ = scheduler_task.await;
    monitor.stop().await;
    supervisor.shutdown().await;

    info!("shutdown complete");
    Ok(())
}
