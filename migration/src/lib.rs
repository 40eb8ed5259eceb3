//! Database migrations for the campaign dispatcher.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_03_15_000100_create_tags;
mod m2025_03_15_000200_create_contacts;
mod m2025_03_15_000300_create_devices;
mod m2025_03_15_030432_create_campaigns;
mod m2025_03_15_030500_create_delivery_records;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_03_15_000100_create_tags::Migration),
            Box::new(m2025_03_15_000200_create_contacts::Migration),
            Box::new(m2025_03_15_000300_create_devices::Migration),
            Box::new(m2025_03_15_030432_create_campaigns::Migration),
            Box::new(m2025_03_15_030500_create_delivery_records::Migration),
        ]
    }
}
