//! Periodic whole-catalog sync plus on-demand triggers.
//!
//! Only one scheduler may be registered per process at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::app::{Result, TubeshelfError};
use crate::store::Store;
use crate::sync::{SyncOrchestrator, SyncReport, SyncSummary};

static REGISTERED: AtomicBool = AtomicBool::new(false);

/// Parse interval string like "1h", "30m", "6h", "1d"
pub fn parse_interval(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        scaled(hours, 3600, "hours")
    } else if let Some(minutes) = s.strip_suffix('m') {
        scaled(minutes, 60, "minutes")
    } else if let Some(days) = s.strip_suffix('d') {
        scaled(days, 86400, "days")
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>()
            .map_err(|_| format!("Invalid seconds: {}", secs))
    } else {
        s.parse::<u64>()
            .map_err(|_| format!("Invalid interval: {}. Use format like '1h', '30m', '1d'", s))
    }
}

fn scaled(value: &str, unit_secs: u64, unit: &str) -> std::result::Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| format!("Invalid {}: {}", unit, value))?
        .checked_mul(unit_secs)
        .ok_or_else(|| format!("Interval too large: {} {}", value, unit))
}

/// Format interval for display
pub fn format_interval(secs: u64) -> String {
    if secs >= 86400 && secs % 86400 == 0 {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub update_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            update_on_start: false,
        }
    }
}

/// Releases the process-wide registration when dropped.
struct Registration;

impl Registration {
    fn acquire() -> Result<Self> {
        REGISTERED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| Registration)
            .map_err(|_| TubeshelfError::SchedulerAlreadyRegistered)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        REGISTERED.store(false, Ordering::SeqCst);
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Register the periodic trigger and spawn its loop on the current runtime.
    pub fn start<S>(
        orchestrator: SyncOrchestrator<S>,
        config: SchedulerConfig,
    ) -> Result<SchedulerHandle<S>>
    where
        S: Store + Send + Sync + 'static,
    {
        if config.interval_secs == 0 {
            return Err(TubeshelfError::Config(
                "scheduler interval must be positive".into(),
            ));
        }

        let registration = Registration::acquire()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(
            "Scheduler started (interval: {})",
            format_interval(config.interval_secs)
        );

        let task = tokio::spawn(run_loop(
            orchestrator.clone(),
            config,
            shutdown_rx,
            registration,
        ));

        Ok(SchedulerHandle {
            orchestrator,
            shutdown_tx,
            task: Some(task),
        })
    }

    pub fn is_registered() -> bool {
        REGISTERED.load(Ordering::SeqCst)
    }
}

async fn run_loop<S>(
    orchestrator: SyncOrchestrator<S>,
    config: SchedulerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
    // Held until the loop exits, so a new scheduler cannot overlap this one
    _registration: Registration,
) where
    S: Store + Send + Sync + 'static,
{
    let mut timer = interval(Duration::from_secs(config.interval_secs));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if !config.update_on_start {
        // The first tick completes immediately
        timer.tick().await;
    }

    loop {
        tokio::select! {
            _ = timer.tick() => {
                tracing::info!("Running scheduled sync...");
                if let Err(e) = orchestrator.sync_catalog().await {
                    tracing::error!("Scheduled sync failed: {}", e);
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Scheduler shutting down...");
}

pub struct SchedulerHandle<S> {
    orchestrator: SyncOrchestrator<S>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl<S: Store + Send + Sync + 'static> SchedulerHandle<S> {
    /// Sync the whole catalog now, with the same semantics as a scheduled tick.
    pub async fn trigger_all(&self) -> Result<SyncSummary> {
        tracing::info!("Running manual sync...");
        self.orchestrator.sync_catalog().await
    }

    /// Sync a single source now; its failure is returned to the caller.
    pub async fn trigger_source(&self, source_id: i64) -> Result<SyncReport> {
        self.orchestrator.sync_source_by_id(source_id).await
    }

    /// Stop the periodic loop and wait for it to release the registration.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Scheduler task join error: {}", e);
            }
        }
    }

    /// Keep the scheduler running until SIGINT.
    pub async fn run_until_ctrl_c(self) -> Result<()> {
        tokio::signal::ctrl_c().await?;
        self.shutdown().await;
        Ok(())
    }
}

impl<S> Drop for SchedulerHandle<S> {
    fn drop(&mut self) {
        // The loop releases the registration once it observes this
        let _ = self.shutdown_tx.send(true);
    }
}
