//! # Delivery Recorder
//!
//! Append-only log of per-contact send outcomes. Records are never updated
//! or deleted here.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::delivery_record::{ActiveModel, Column, DeliveryStatus, Entity, Model};

#[derive(Clone)]
pub struct DeliveryRecorder {
    db: DatabaseConnection,
}

impl DeliveryRecorder {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn record(
        &self,
        campaign_id: Uuid,
        contact_id: Uuid,
        status: DeliveryStatus,
        error: Option<String>,
    ) -> Result<Model, RepositoryError> {
        let record = ActiveModel {
            id: Set(Uuid::new_v4()),
            contact_id: Set(contact_id),
            campaign_id: Set(campaign_id),
            status: Set(status),
            error: Set(error),
            sent_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&self.db)
        .await?;

        Ok(record)
    }

    /// Number of records for the campaign, optionally restricted to one status.
    pub async fn count_for_campaign(
        &self,
        campaign_id: Uuid,
        status: Option<DeliveryStatus>,
    ) -> Result<u64, RepositoryError> {
        let mut query = Entity::find().filter(Column::CampaignId.eq(campaign_id));
        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status));
        }
        Ok(query.count(&self.db).await?)
    }

    pub async fn list_for_campaign(&self, campaign_id: Uuid) -> Result<Vec<Model>, RepositoryError> {
        Ok(Entity::find()
            .filter(Column::CampaignId.eq(campaign_id))
            .order_by_asc(Column::SentAt)
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?)
    }
}
