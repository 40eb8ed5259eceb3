//! # Campaign Repository
//!
//! Owns the campaign lifecycle in storage: creation with a frozen recipient
//! set, edits while pending, the due-campaign snapshot and the atomic claim.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{
    campaign::{self, CampaignStatus},
    campaign_contact, contact, device,
};

use super::contact::{dedup, resolve_contacts_by_tags};
use super::tag::ensure_tags_exist;

#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub name: String,
    pub message: String,
    pub device_id: Uuid,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub tag_ids: Vec<Uuid>,
}

/// Partial edit of a pending campaign. `None` leaves a field untouched;
/// `tag_ids` re-resolves the recipient set from scratch.
#[derive(Debug, Clone, Default)]
pub struct CampaignUpdate {
    pub name: Option<String>,
    pub message: Option<String>,
    pub device_id: Option<Uuid>,
    pub scheduled_time: Option<Option<DateTime<Utc>>>,
    pub tag_ids: Option<Vec<Uuid>>,
}

/// Everything the dispatch engine reads before claiming a campaign.
#[derive(Debug, Clone)]
pub struct DispatchBundle {
    pub campaign: campaign::Model,
    pub device: Option<device::Model>,
    pub recipients: Vec<contact::Model>,
}

#[derive(Clone)]
pub struct CampaignRepository {
    db: DatabaseConnection,
}

impl CampaignRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a `pending` campaign whose recipients are the contacts holding
    /// any of `tag_ids` at creation time.
    pub async fn create(&self, input: NewCampaign) -> Result<campaign::Model, RepositoryError> {
        validate_content(&input.name, &input.message)?;

        let tag_ids = dedup(input.tag_ids);
        let now = Utc::now().fixed_offset();
        let txn = self.db.begin().await?;

        ensure_device_exists(&txn, input.device_id).await?;
        ensure_tags_exist(&txn, &tag_ids).await?;

        let created = campaign::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            message: Set(input.message),
            device_id: Set(input.device_id),
            status: Set(CampaignStatus::Pending),
            scheduled_time: Set(input.scheduled_time.map(|t| t.fixed_offset())),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let recipients = freeze_recipients(&txn, created.id, &tag_ids).await?;
        txn.commit().await?;

        tracing::info!(
            campaign_id = %created.id,
            recipients,
            scheduled_time = ?created.scheduled_time,
            "Campaign created"
        );

        Ok(created)
    }

    /// Apply `update` to a campaign that is still `pending`. Any other status
    /// yields `Conflict`, including a claim that lands mid-edit.
    pub async fn update_pending(
        &self,
        id: Uuid,
        update: CampaignUpdate,
    ) -> Result<campaign::Model, RepositoryError> {
        let txn = self.db.begin().await?;

        let existing = campaign::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| RepositoryError::not_found("campaign", id))?;
        if existing.status != CampaignStatus::Pending {
            return Err(RepositoryError::Conflict(format!(
                "campaign {id} is {} and can no longer be edited",
                existing.status
            )));
        }

        let name = update.name.unwrap_or_else(|| existing.name.clone());
        let message = update.message.unwrap_or_else(|| existing.message.clone());
        validate_content(&name, &message)?;

        if let Some(device_id) = update.device_id {
            ensure_device_exists(&txn, device_id).await?;
        }

        let mut changes = campaign::ActiveModel {
            name: Set(name.trim().to_string()),
            message: Set(message),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        if let Some(device_id) = update.device_id {
            changes.device_id = Set(device_id);
        }
        if let Some(scheduled_time) = update.scheduled_time {
            changes.scheduled_time = Set(scheduled_time.map(|t| t.fixed_offset()));
        }

        let result = campaign::Entity::update_many()
            .set(changes)
            .filter(campaign::Column::Id.eq(id))
            .filter(campaign::Column::Status.eq(CampaignStatus::Pending))
            .exec(&txn)
            .await?;
        if result.rows_affected != 1 {
            return Err(RepositoryError::Conflict(format!(
                "campaign {id} left pending during the edit"
            )));
        }

        if let Some(tag_ids) = update.tag_ids {
            let tag_ids = dedup(tag_ids);
            ensure_tags_exist(&txn, &tag_ids).await?;
            campaign_contact::Entity::delete_many()
                .filter(campaign_contact::Column::CampaignId.eq(id))
                .exec(&txn)
                .await?;
            freeze_recipients(&txn, id, &tag_ids).await?;
        }

        let updated = campaign::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| RepositoryError::not_found("campaign", id))?;
        txn.commit().await?;

        tracing::info!(campaign_id = %id, "Pending campaign updated");
        Ok(updated)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<campaign::Model>, RepositoryError> {
        Ok(campaign::Entity::find_by_id(id).one(&self.db).await?)
    }

    /// Frozen recipient set, in a stable order.
    pub async fn recipients(&self, id: Uuid) -> Result<Vec<contact::Model>, RepositoryError> {
        let campaign = self
            .find(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("campaign", id))?;
        recipients_of(&self.db, &campaign).await
    }

    /// Campaign plus its device and recipients, or `None` when the campaign is gone.
    pub async fn load_for_dispatch(
        &self,
        id: Uuid,
    ) -> Result<Option<DispatchBundle>, RepositoryError> {
        let Some(campaign) = self.find(id).await? else {
            return Ok(None);
        };

        let device = campaign.find_related(device::Entity).one(&self.db).await?;
        let recipients = recipients_of(&self.db, &campaign).await?;

        Ok(Some(DispatchBundle {
            campaign,
            device,
            recipients,
        }))
    }

    /// Snapshot of pending campaigns due at `now`, oldest schedule first.
    pub async fn due_campaign_ids(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Uuid>, RepositoryError> {
        let ids = campaign::Entity::find()
            .select_only()
            .column(campaign::Column::Id)
            .filter(campaign::Column::Status.eq(CampaignStatus::Pending))
            .filter(campaign::Column::ScheduledTime.is_not_null())
            .filter(campaign::Column::ScheduledTime.lte(now.fixed_offset()))
            .order_by_asc(campaign::Column::ScheduledTime)
            .order_by_asc(campaign::Column::CreatedAt)
            .order_by_asc(campaign::Column::Id)
            .limit(limit)
            .into_tuple::<Uuid>()
            .all(&self.db)
            .await?;

        Ok(ids)
    }

    /// Atomically move `id` from `pending` to `in_progress`. Returns `false`
    /// when another caller got there first or the campaign is not pending.
    pub async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = campaign::Entity::update_many()
            .col_expr(
                campaign::Column::Status,
                Expr::value(CampaignStatus::InProgress),
            )
            .col_expr(campaign::Column::UpdatedAt, Expr::value(now.fixed_offset()))
            .filter(campaign::Column::Id.eq(id))
            .filter(campaign::Column::Status.eq(CampaignStatus::Pending))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Unconditional status write for operator corrections. Dispatch only
    /// moves campaigns through `claim`, `complete_claimed` and `fail_claimed`.
    pub async fn set_status(
        &self,
        id: Uuid,
        status: CampaignStatus,
    ) -> Result<(), RepositoryError> {
        let result = campaign::Entity::update_many()
            .col_expr(campaign::Column::Status, Expr::value(status))
            .col_expr(
                campaign::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(campaign::Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::not_found("campaign", id));
        }
        Ok(())
    }

    /// Move a claimed campaign to `completed`. Returns `false` when the
    /// campaign is no longer `in_progress`.
    pub async fn complete_claimed(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.transition(id, CampaignStatus::InProgress, CampaignStatus::Completed)
            .await
    }

    /// Move a claimed campaign to `failed`. Pending and terminal campaigns are
    /// left alone; returns whether a row changed.
    pub async fn fail_claimed(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.transition(id, CampaignStatus::InProgress, CampaignStatus::Failed)
            .await
    }

    async fn transition(
        &self,
        id: Uuid,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<bool, RepositoryError> {
        let result = campaign::Entity::update_many()
            .col_expr(campaign::Column::Status, Expr::value(to))
            .col_expr(
                campaign::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(campaign::Column::Id.eq(id))
            .filter(campaign::Column::Status.eq(from))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected == 1)
    }
}

fn validate_content(name: &str, message: &str) -> Result<(), RepositoryError> {
    if name.trim().is_empty() {
        return Err(RepositoryError::Validation(
            "campaign name must not be empty".to_string(),
        ));
    }
    if message.trim().is_empty() {
        return Err(RepositoryError::Validation(
            "campaign message must not be empty".to_string(),
        ));
    }
    Ok(())
}

async fn ensure_device_exists<C: ConnectionTrait>(
    conn: &C,
    device_id: Uuid,
) -> Result<(), RepositoryError> {
    device::Entity::find_by_id(device_id)
        .one(conn)
        .await?
        .map(|_| ())
        .ok_or_else(|| RepositoryError::Validation(format!("unknown device {device_id}")))
}

/// Link the contacts currently holding any of `tag_ids` to the campaign.
async fn freeze_recipients<C: ConnectionTrait>(
    conn: &C,
    campaign_id: Uuid,
    tag_ids: &[Uuid],
) -> Result<usize, RepositoryError> {
    let contacts = resolve_contacts_by_tags(conn, tag_ids).await?;
    if contacts.is_empty() {
        return Ok(0);
    }

    let links = contacts.iter().map(|c| campaign_contact::ActiveModel {
        campaign_id: Set(campaign_id),
        contact_id: Set(c.id),
    });
    campaign_contact::Entity::insert_many(links)
        .exec_without_returning(conn)
        .await?;

    Ok(contacts.len())
}

async fn recipients_of<C: ConnectionTrait>(
    conn: &C,
    campaign: &campaign::Model,
) -> Result<Vec<contact::Model>, RepositoryError> {
    Ok(campaign
        .find_related(contact::Entity)
        .order_by_asc(contact::Column::CreatedAt)
        .order_by_asc(contact::Column::Id)
        .all(conn)
        .await?)
}
