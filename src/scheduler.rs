//! # Campaign Scheduler
//!
//! Periodically dispatches every pending campaign whose scheduled time has
//! passed. Each tick works on a snapshot of due campaign ids; a failure on one
//! campaign never stops the others. Running two schedulers against the same
//! database is safe because every dispatch goes through the atomic claim.

use chrono::Utc;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{Duration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use crate::config::SchedulerConfig;
use crate::dispatch::{CampaignDispatcher, DispatchError};
use crate::error::RepositoryError;

/// Counts from one scheduler tick.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TickReport {
    /// Campaigns in the due snapshot
    pub due: usize,
    pub completed: usize,
    /// Dispatched, but some recipients were not reached
    pub incomplete: usize,
    /// Inactive device or no recipients; left pending for a later tick
    pub rejected: usize,
    /// Aborted after the claim, or a storage fault before it
    pub failed: usize,
    /// Claimed elsewhere, no longer pending, or deleted since the snapshot
    pub skipped: usize,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to load due campaigns: {0}")]
    Snapshot(#[source] RepositoryError),
    #[error("tick aborted, messaging gateway is misconfigured: {0}")]
    GatewayMisconfigured(String),
}

#[derive(Clone)]
pub struct CampaignScheduler {
    config: SchedulerConfig,
    dispatcher: CampaignDispatcher,
    batch_size: u64,
}

impl CampaignScheduler {
    pub fn new(config: SchedulerConfig, dispatcher: CampaignDispatcher) -> Self {
        let batch_size = config.batch_size.max(1);
        Self {
            config,
            dispatcher,
            batch_size,
        }
    }

    /// Override the number of campaigns taken per tick (primarily for tests).
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run the scheduler loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_interval_seconds = self.config.tick_interval_seconds,
            "Starting campaign scheduler"
        );
        let tick_interval = Duration::from_secs(self.config.tick_interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Campaign scheduler shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "Scheduler tick failed");
                    }
                    histogram!("campaign_scheduler_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Campaign scheduler stopped");
    }

    /// Dispatch every campaign that is due now.
    #[instrument(skip(self), fields(batch_size = self.batch_size))]
    pub async fn tick(&self) -> Result<TickReport, SchedulerError> {
        let due_ids = self
            .dispatcher
            .campaigns()
            .due_campaign_ids(Utc::now(), self.batch_size)
            .await
            .map_err(SchedulerError::Snapshot)?;

        let mut report = TickReport {
            due: due_ids.len(),
            ..TickReport::default()
        };

        if due_ids.is_empty() {
            debug!("No due campaigns");
            return Ok(report);
        }

        for campaign_id in due_ids {
            match self.dispatcher.dispatch(campaign_id, None).await {
                Ok(dispatch) if dispatch.is_completed() => report.completed += 1,
                Ok(_) => report.incomplete += 1,
                Err(
                    DispatchError::ClaimLost(_)
                    | DispatchError::NotPending { .. }
                    | DispatchError::NotFound(_),
                ) => {
                    debug!(campaign_id = %campaign_id, "Campaign skipped");
                    report.skipped += 1;
                }
                Err(DispatchError::GatewayMisconfigured(reason)) => {
                    counter!("campaign_scheduler_ticks_aborted_total").increment(1);
                    return Err(SchedulerError::GatewayMisconfigured(reason));
                }
                Err(
                    err @ (DispatchError::DeviceInactive(_) | DispatchError::NoRecipients(_)),
                ) => {
                    warn!(campaign_id = %campaign_id, error = %err, "Campaign not dispatchable; left pending");
                    report.rejected += 1;
                }
                Err(err @ DispatchError::Aborted { .. }) => {
                    error!(campaign_id = %campaign_id, error = %err, "Campaign dispatch aborted");
                    report.failed += 1;
                }
                Err(err) => {
                    error!(campaign_id = %campaign_id, error = %err, "Campaign dispatch failed before claim");
                    report.failed += 1;
                }
            }
        }

        info!(
            due = report.due,
            completed = report.completed,
            incomplete = report.incomplete,
            rejected = report.rejected,
            failed = report.failed,
            skipped = report.skipped,
            "Scheduler tick completed"
        );

        Ok(report)
    }
}
