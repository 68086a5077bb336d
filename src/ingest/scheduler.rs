// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::errors::PipelineError;
use crate::orchestrator::Pipeline;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval: Duration,
    /// Run once right away instead of waiting a full interval.
    pub run_immediately: bool,
}

impl SchedulerCfg {
    pub fn every_minutes(minutes: u64) -> Self {
        Self {
            interval: Duration::from_secs(minutes.max(1) * 60),
            run_immediately: true,
        }
    }
}

/// Spawn the periodic pipeline trigger. Runs never overlap: a tick that fires
/// while a run is in progress is delayed, not queued. Cancelling `cancel`
/// stops the loop and interrupts the current run at its next stage boundary.
pub fn spawn_scheduler(
    pipeline: Arc<Pipeline>,
    cfg: SchedulerCfg,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = if cfg.run_immediately {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + cfg.interval
        };
        let mut ticker = tokio::time::interval_at(start, cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            target: "scheduler",
            interval_secs = cfg.interval.as_secs(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match pipeline.run(&cancel).await {
                Ok(summary) => tracing::debug!(
                    target: "scheduler",
                    run_id = summary.run_id,
                    submitted = summary.totals.submitted,
                    "scheduled run done"
                ),
                Err(PipelineError::NoActiveSources) => {
                    tracing::warn!(target: "scheduler", "no active sources; waiting for next tick")
                }
                Err(e) => tracing::error!(target: "scheduler", error = %e, "scheduled run failed"),
            }
        }
        tracing::info!(target: "scheduler", "scheduler stopped");
    })
}
