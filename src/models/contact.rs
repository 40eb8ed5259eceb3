//! Contact entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message recipient. `phone_number` is stored in normalized international form.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "contacts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub name: String,

    pub phone_number: String,

    pub email: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl Related<super::tag::Entity> for Entity {
    fn to() -> RelationDef {
        super::contact_tag::Relation::Tag.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::contact_tag::Relation::Contact.def().rev())
    }
}

impl Related<super::campaign::Entity> for Entity {
    fn to() -> RelationDef {
        super::campaign_contact::Relation::Campaign.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::campaign_contact::Relation::Contact.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
