//! # Contact Repository
//!
//! Contacts are stored with normalized phone numbers and linked to tags;
//! campaign recipients are resolved from those links.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
    sea_query::Query,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{contact, contact_tag, tag};
use crate::phone::normalize_phone_number;

use super::tag::ensure_tags_exist;

#[derive(Debug, Clone)]
pub struct NewContact {
    pub name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub tag_ids: Vec<Uuid>,
}

pub struct ContactRepository {
    db: DatabaseConnection,
    default_country_code: Option<String>,
}

impl ContactRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            default_country_code: None,
        }
    }

    /// Country code prepended to national numbers on write.
    pub fn with_default_country_code(mut self, code: Option<String>) -> Self {
        self.default_country_code = code;
        self
    }

    pub async fn create(&self, input: NewContact) -> Result<contact::Model, RepositoryError> {
        let phone_number =
            normalize_phone_number(&input.phone_number, self.default_country_code.as_deref())
                .map_err(|err| RepositoryError::Validation(err.to_string()))?;

        let tag_ids = dedup(input.tag_ids);
        let now = Utc::now().fixed_offset();
        let txn = self.db.begin().await?;

        ensure_tags_exist(&txn, &tag_ids).await?;

        let created = contact::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            phone_number: Set(phone_number),
            email: Set(input.email.filter(|e| !e.trim().is_empty())),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        if !tag_ids.is_empty() {
            let links = tag_ids.iter().map(|tag_id| contact_tag::ActiveModel {
                contact_id: Set(created.id),
                tag_id: Set(*tag_id),
            });
            contact_tag::Entity::insert_many(links)
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;

        tracing::debug!(contact_id = %created.id, tags = tag_ids.len(), "Contact created");

        Ok(created)
    }

    pub async fn tags(&self, contact: &contact::Model) -> Result<Vec<tag::Model>, RepositoryError> {
        Ok(contact
            .find_related(tag::Entity)
            .order_by_asc(tag::Column::Name)
            .all(&self.db)
            .await?)
    }

    /// Distinct contacts holding ANY of `tag_ids`.
    pub async fn resolve_by_tags(
        &self,
        tag_ids: &[Uuid],
    ) -> Result<Vec<contact::Model>, RepositoryError> {
        resolve_contacts_by_tags(&self.db, tag_ids).await
    }
}

pub(crate) async fn resolve_contacts_by_tags<C: ConnectionTrait>(
    conn: &C,
    tag_ids: &[Uuid],
) -> Result<Vec<contact::Model>, RepositoryError> {
    if tag_ids.is_empty() {
        return Ok(Vec::new());
    }

    let holders = Query::select()
        .column(contact_tag::Column::ContactId)
        .from(contact_tag::Entity)
        .and_where(contact_tag::Column::TagId.is_in(tag_ids.iter().copied()))
        .to_owned();

    Ok(contact::Entity::find()
        .filter(contact::Column::Id.in_subquery(holders))
        .order_by_asc(contact::Column::CreatedAt)
        .order_by_asc(contact::Column::Id)
        .all(conn)
        .await?)
}

pub(crate) fn dedup(mut ids: Vec<Uuid>) -> Vec<Uuid> {
    ids.sort_unstable();
    ids.dedup();
    ids
}
