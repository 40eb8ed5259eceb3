//! Campaign Dispatch Engine
//!
//! Sends one campaign's message to its frozen recipient set. A dispatch checks
//! its preconditions without touching storage, atomically claims the campaign
//! (`pending` → `in_progress`), records one delivery per recipient and then
//! reconciles the campaign status from the successful delivery count.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::error::{RepositoryError, snippet};
use crate::gateway::{GatewayError, MessageGateway, OutboundMessage, SendOutcome};
use crate::models::{CampaignStatus, DeliveryStatus, DeviceStatus, contact};
use crate::repositories::{CampaignRepository, DeliveryRecorder};

const DELIVERY_ERROR_CHARS: usize = 200;

/// Summary of one dispatch run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DispatchReport {
    pub campaign_id: Uuid,
    /// Status after reconciliation: `completed`, or `in_progress` when some sends failed
    pub status: CampaignStatus,
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DispatchReport {
    pub fn is_completed(&self) -> bool {
        self.status == CampaignStatus::Completed
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("campaign {0} not found")]
    NotFound(Uuid),
    #[error("campaign {id} is {status}, not pending")]
    NotPending { id: Uuid, status: CampaignStatus },
    #[error("device of campaign {0} is not active")]
    DeviceInactive(Uuid),
    #[error("campaign {0} has no recipients")]
    NoRecipients(Uuid),
    #[error("messaging gateway is misconfigured: {0}")]
    GatewayMisconfigured(String),
    #[error("campaign {0} was claimed by another dispatcher")]
    ClaimLost(Uuid),
    #[error(transparent)]
    Store(#[from] RepositoryError),
    #[error("dispatch of campaign {id} aborted: {reason}")]
    Aborted { id: Uuid, reason: String },
}

impl DispatchError {
    /// Metric label for the outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            DispatchError::NotFound(_) => "not_found",
            DispatchError::NotPending { .. } => "not_pending",
            DispatchError::DeviceInactive(_) => "device_inactive",
            DispatchError::NoRecipients(_) => "no_recipients",
            DispatchError::GatewayMisconfigured(_) => "gateway_misconfigured",
            DispatchError::ClaimLost(_) => "claim_lost",
            DispatchError::Store(_) => "store_error",
            DispatchError::Aborted { .. } => "aborted",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct DeliveryTally {
    delivered: usize,
    failed: usize,
}

impl DeliveryTally {
    fn add(&mut self, status: DeliveryStatus) {
        match status {
            DeliveryStatus::Success => self.delivered += 1,
            DeliveryStatus::Failed => self.failed += 1,
        }
    }
}

#[derive(Clone)]
pub struct CampaignDispatcher {
    campaigns: CampaignRepository,
    deliveries: DeliveryRecorder,
    gateway: Arc<dyn MessageGateway>,
    config: DispatchConfig,
}

impl CampaignDispatcher {
    pub fn new(
        db: sea_orm::DatabaseConnection,
        gateway: Arc<dyn MessageGateway>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            campaigns: CampaignRepository::new(db.clone()),
            deliveries: DeliveryRecorder::new(db),
            gateway,
            config,
        }
    }

    pub fn campaigns(&self) -> &CampaignRepository {
        &self.campaigns
    }

    /// Dispatch `campaign_id`, sending `message_override` instead of the
    /// campaign message when it is non-blank.
    #[instrument(skip(self, message_override), fields(campaign_id = %campaign_id))]
    pub async fn dispatch(
        &self,
        campaign_id: Uuid,
        message_override: Option<String>,
    ) -> Result<DispatchReport, DispatchError> {
        let timer = Instant::now();
        let result = self.run(campaign_id, message_override).await;

        let outcome = match &result {
            Ok(report) if report.is_completed() => "completed",
            Ok(_) => "incomplete",
            Err(err) => err.outcome(),
        };
        counter!("campaign_dispatch_total", "outcome" => outcome).increment(1);
        histogram!("campaign_dispatch_duration_ms").record(timer.elapsed().as_secs_f64() * 1_000.0);

        result
    }

    async fn run(
        &self,
        campaign_id: Uuid,
        message_override: Option<String>,
    ) -> Result<DispatchReport, DispatchError> {
        let started_at = Utc::now();

        let bundle = self
            .campaigns
            .load_for_dispatch(campaign_id)
            .await?
            .ok_or(DispatchError::NotFound(campaign_id))?;

        if bundle.campaign.status != CampaignStatus::Pending {
            return Err(DispatchError::NotPending {
                id: campaign_id,
                status: bundle.campaign.status,
            });
        }
        if bundle
            .device
            .as_ref()
            .is_none_or(|device| device.status != DeviceStatus::Active)
        {
            return Err(DispatchError::DeviceInactive(campaign_id));
        }
        if bundle.recipients.is_empty() {
            return Err(DispatchError::NoRecipients(campaign_id));
        }
        self.gateway
            .ensure_configured()
            .map_err(|err| DispatchError::GatewayMisconfigured(err.to_string()))?;

        if !self.campaigns.claim(campaign_id, Utc::now()).await? {
            debug!("Campaign claimed elsewhere; skipping");
            return Err(DispatchError::ClaimLost(campaign_id));
        }

        let message: Arc<str> = match message_override {
            Some(text) if !text.trim().is_empty() => text.into(),
            _ => bundle.campaign.message.as_str().into(),
        };
        let recipients = bundle.recipients;
        let recipient_count = recipients.len();

        info!(recipients = recipient_count, "Campaign claimed, sending");

        match self
            .deliver_and_reconcile(campaign_id, recipients, message)
            .await
        {
            Ok((status, tally)) => Ok(DispatchReport {
                campaign_id,
                status,
                recipients: recipient_count,
                delivered: tally.delivered,
                failed: tally.failed,
                started_at,
                finished_at: Utc::now(),
            }),
            Err(err) => {
                error!(error = %err, "Campaign dispatch aborted");
                if let Err(mark_err) = self.campaigns.fail_claimed(campaign_id).await {
                    error!(error = %mark_err, "Failed to mark aborted campaign as failed");
                }
                let reason = match err {
                    DispatchError::Aborted { reason, .. } => reason,
                    other => other.to_string(),
                };
                Err(DispatchError::Aborted {
                    id: campaign_id,
                    reason,
                })
            }
        }
    }

    async fn deliver_and_reconcile(
        &self,
        campaign_id: Uuid,
        recipients: Vec<contact::Model>,
        message: Arc<str>,
    ) -> Result<(CampaignStatus, DeliveryTally), DispatchError> {
        let recipient_count = recipients.len() as u64;
        let tally = self.deliver_all(campaign_id, recipients, message).await?;

        let successful = self
            .deliveries
            .count_for_campaign(campaign_id, Some(DeliveryStatus::Success))
            .await?;

        if successful >= recipient_count {
            if !self.campaigns.complete_claimed(campaign_id).await? {
                return Err(DispatchError::Aborted {
                    id: campaign_id,
                    reason: "campaign left in_progress while sending".to_string(),
                });
            }
            info!(delivered = tally.delivered, "Campaign completed");
            Ok((CampaignStatus::Completed, tally))
        } else {
            warn!(
                successful,
                recipients = recipient_count,
                failed = tally.failed,
                "Campaign left in progress: not every recipient was reached"
            );
            Ok((CampaignStatus::InProgress, tally))
        }
    }

    async fn deliver_all(
        &self,
        campaign_id: Uuid,
        recipients: Vec<contact::Model>,
        message: Arc<str>,
    ) -> Result<DeliveryTally, DispatchError> {
        let mut tally = DeliveryTally::default();

        if self.config.send_concurrency <= 1 {
            for contact in &recipients {
                tally.add(self.deliver_one(campaign_id, contact, &message).await?);
            }
            return Ok(tally);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.send_concurrency));
        let mut handles = Vec::with_capacity(recipients.len());

        for contact in recipients {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| DispatchError::Aborted {
                    id: campaign_id,
                    reason: "send pool closed".to_string(),
                })?;
            let dispatcher = self.clone();
            let message = Arc::clone(&message);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                dispatcher.deliver_one(campaign_id, &contact, &message).await
            }));
        }

        // Every task is awaited so no send is still running when the status is reconciled.
        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(status)) => tally.add(status),
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    first_error.get_or_insert(DispatchError::Aborted {
                        id: campaign_id,
                        reason: format!("delivery task failed: {join_err}"),
                    });
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(tally),
        }
    }

    /// Send to one contact and record the outcome. Gateway faults become a
    /// failed delivery; only a storage fault is returned as an error.
    async fn deliver_one(
        &self,
        campaign_id: Uuid,
        contact: &contact::Model,
        message: &str,
    ) -> Result<DeliveryStatus, DispatchError> {
        let outbound = OutboundMessage {
            number: contact.phone_number.clone(),
            message: message.to_string(),
        };

        let (status, error) = match self.gateway.send_text(&outbound).await {
            Ok(SendOutcome::Accepted { .. }) => (DeliveryStatus::Success, None),
            Ok(SendOutcome::Rejected { status, body }) => {
                warn!(contact_id = %contact.id, status, "Gateway rejected message");
                (
                    DeliveryStatus::Failed,
                    Some(format!("rejected with status {status}: {body}")),
                )
            }
            Err(err) => {
                warn!(contact_id = %contact.id, kind = err.kind(), error = %err, "Gateway send failed");
                (DeliveryStatus::Failed, Some(delivery_error(&err)))
            }
        };

        self.deliveries
            .record(
                campaign_id,
                contact.id,
                status,
                error.map(|e| snippet(&e, DELIVERY_ERROR_CHARS)),
            )
            .await?;
        counter!("campaign_deliveries_total", "status" => status.as_str()).increment(1);

        Ok(status)
    }
}

fn delivery_error(err: &GatewayError) -> String {
    format!("{}: {}", err.kind(), err)
}
