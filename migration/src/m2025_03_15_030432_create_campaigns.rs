//! Migration to create the campaigns table and the frozen recipient pivot.
//!
//! `campaign_contacts` holds the recipient set resolved from tag filters at
//! creation or edit time. Dispatch never re-resolves it.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Campaigns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Campaigns::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Campaigns::Name).text().not_null())
                    .col(ColumnDef::new(Campaigns::Message).text().not_null())
                    .col(ColumnDef::new(Campaigns::DeviceId).uuid().not_null())
                    .col(
                        ColumnDef::new(Campaigns::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Campaigns::ScheduledTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Campaigns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Campaigns::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaigns_device_id")
                            .from(Campaigns::Table, Campaigns::DeviceId)
                            .to(Devices::Table, Devices::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Due-campaign snapshot: status = pending AND scheduled_time <= now
        manager
            .create_index(
                Index::create()
                    .name("idx_campaigns_status_scheduled_time")
                    .table(Campaigns::Table)
                    .col(Campaigns::Status)
                    .col(Campaigns::ScheduledTime)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CampaignContacts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CampaignContacts::CampaignId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CampaignContacts::ContactId)
                            .uuid()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_campaign_contacts")
                            .col(CampaignContacts::CampaignId)
                            .col(CampaignContacts::ContactId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaign_contacts_campaign_id")
                            .from(CampaignContacts::Table, CampaignContacts::CampaignId)
                            .to(Campaigns::Table, Campaigns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_campaign_contacts_contact_id")
                            .from(CampaignContacts::Table, CampaignContacts::ContactId)
                            .to(Contacts::Table, Contacts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CampaignContacts::Table).to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_campaigns_status_scheduled_time")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Campaigns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Campaigns {
    Table,
    Id,
    Name,
    Message,
    DeviceId,
    Status,
    ScheduledTime,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CampaignContacts {
    Table,
    CampaignId,
    ContactId,
}

#[derive(DeriveIden)]
enum Devices {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Contacts {
    Table,
    Id,
}
