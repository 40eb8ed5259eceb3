//! # Device Repository

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::device::{ActiveModel, DeviceStatus, Entity, Model};

#[derive(Debug, Clone)]
pub struct NewDevice {
    pub name: String,
    pub phone_number: String,
    pub image_url: Option<String>,
}

pub struct DeviceRepository {
    db: DatabaseConnection,
}

impl DeviceRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Register a device. New devices start `active`.
    pub async fn create(&self, input: NewDevice) -> Result<Model, RepositoryError> {
        let now = Utc::now().fixed_offset();

        let device = ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            phone_number: Set(input.phone_number),
            status: Set(DeviceStatus::Active),
            image_url: Set(input.image_url),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        tracing::info!(device_id = %device.id, "Device registered");
        Ok(device)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Model>, RepositoryError> {
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn set_status(&self, id: Uuid, status: DeviceStatus) -> Result<Model, RepositoryError> {
        let device = self
            .find(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("device", id))?;

        let mut active: ActiveModel = device.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now().fixed_offset());

        let updated = active.update(&self.db).await?;
        tracing::info!(device_id = %id, status = ?updated.status, "Device status changed");
        Ok(updated)
    }

    /// Flip between `active` and `inactive`.
    pub async fn toggle_status(&self, id: Uuid) -> Result<Model, RepositoryError> {
        let device = self
            .find(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("device", id))?;
        self.set_status(id, device.status.toggled()).await
    }
}
