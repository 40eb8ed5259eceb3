//! # Tag Repository

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::error::{RepositoryError, is_unique_violation};
use crate::models::tag::{ActiveModel, Column, Entity, Model};

pub struct TagRepository {
    db: DatabaseConnection,
}

impl TagRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a tag. Names are unique; a duplicate yields `Conflict`.
    pub async fn create(&self, name: &str) -> Result<Model, RepositoryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RepositoryError::Validation(
                "tag name must not be empty".to_string(),
            ));
        }

        let tag = ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            created_at: Set(Utc::now().fixed_offset()),
        };

        tag.insert(&self.db).await.map_err(|err| {
            if is_unique_violation(&err) {
                RepositoryError::Conflict(format!("tag '{name}' already exists"))
            } else {
                err.into()
            }
        })
    }

    pub async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Model>, RepositoryError> {
        find_tags(&self.db, ids).await
    }
}

pub(crate) async fn find_tags<C: ConnectionTrait>(
    conn: &C,
    ids: &[Uuid],
) -> Result<Vec<Model>, RepositoryError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    Ok(Entity::find()
        .filter(Column::Id.is_in(ids.iter().copied()))
        .order_by_asc(Column::Name)
        .all(conn)
        .await?)
}

/// Fail with `Validation` unless every id in `ids` names an existing tag.
pub(crate) async fn ensure_tags_exist<C: ConnectionTrait>(
    conn: &C,
    ids: &[Uuid],
) -> Result<(), RepositoryError> {
    let found = find_tags(conn, ids).await?;
    if let Some(missing) = ids.iter().find(|id| !found.iter().any(|tag| tag.id == **id)) {
        return Err(RepositoryError::Validation(format!("unknown tag {missing}")));
    }
    Ok(())
}
