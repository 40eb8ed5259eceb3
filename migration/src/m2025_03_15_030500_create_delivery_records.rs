//! Migration to create the delivery_records table.
//!
//! One row per (campaign, contact) send attempt. Rows are append-only.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeliveryRecords::ContactId).uuid().not_null())
                    .col(
                        ColumnDef::new(DeliveryRecords::CampaignId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeliveryRecords::Status).text().not_null())
                    .col(ColumnDef::new(DeliveryRecords::Error).text().null())
                    .col(
                        ColumnDef::new(DeliveryRecords::SentAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_delivery_records_campaign_id")
                            .from(DeliveryRecords::Table, DeliveryRecords::CampaignId)
                            .to(Campaigns::Table, Campaigns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_delivery_records_contact_id")
                            .from(DeliveryRecords::Table, DeliveryRecords::ContactId)
                            .to(Contacts::Table, Contacts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Reconciliation counts records per campaign and status
        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_records_campaign_status")
                    .table(DeliveryRecords::Table)
                    .col(DeliveryRecords::CampaignId)
                    .col(DeliveryRecords::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_delivery_records_campaign_status")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(DeliveryRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DeliveryRecords {
    Table,
    Id,
    ContactId,
    CampaignId,
    Status,
    Error,
    SentAt,
}

#[derive(DeriveIden)]
enum Campaigns {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Contacts {
    Table,
    Id,
}
