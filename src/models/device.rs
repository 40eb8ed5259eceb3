//! Device entity model
//!
//! The device is the sending identity of a campaign. Dispatch requires it to be active.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "devices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub name: String,

    pub phone_number: String,

    pub status: DeviceStatus,

    /// Reference to an externally stored device image
    pub image_url: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema, Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    #[sea_orm(string_value = "active")]
    #[default]
    Active,

    #[sea_orm(string_value = "inactive")]
    Inactive,
}

impl DeviceStatus {
    /// The opposite status, used by the toggle operation
    pub fn toggled(self) -> Self {
        match self {
            DeviceStatus::Active => DeviceStatus::Inactive,
            DeviceStatus::Inactive => DeviceStatus::Active,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::campaign::Entity")]
    Campaign,
}

impl Related<super::campaign::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Campaign.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
