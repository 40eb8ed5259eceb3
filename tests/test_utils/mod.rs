//! Test utilities for database and gateway testing.
//!
//! In-memory SQLite databases with all migrations applied, plus fixtures for
//! the campaign data model and helpers wiring the dispatcher to a mock gateway.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use campaigns::config::{DispatchConfig, GatewayConfig, SchedulerConfig};
use campaigns::dispatch::CampaignDispatcher;
use campaigns::gateway::HttpGateway;
use campaigns::models::{campaign, contact, device, tag};
use campaigns::repositories::{
    CampaignRepository, ContactRepository, DeviceRepository, NewCampaign, NewContact, NewDevice,
    TagRepository,
};
use campaigns::scheduler::CampaignScheduler;
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

pub const TEST_TOKEN: &str = "test-gateway-token";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn gateway_config(base_url: &str) -> GatewayConfig {
    GatewayConfig {
        base_url: Some(base_url.to_string()),
        api_token: Some(TEST_TOKEN.to_string()),
        ..GatewayConfig::default()
    }
}

/// Dispatcher talking to the gateway at `base_url` with sequential sends.
pub fn dispatcher(db: &DatabaseConnection, base_url: &str) -> CampaignDispatcher {
    dispatcher_with(db, gateway_config(base_url), 1)
}

pub fn dispatcher_with(
    db: &DatabaseConnection,
    gateway: GatewayConfig,
    send_concurrency: usize,
) -> CampaignDispatcher {
    let gateway = HttpGateway::new(&gateway).expect("gateway client builds");
    CampaignDispatcher::new(
        db.clone(),
        Arc::new(gateway),
        DispatchConfig { send_concurrency },
    )
}

pub fn scheduler(dispatcher: CampaignDispatcher) -> CampaignScheduler {
    CampaignScheduler::new(SchedulerConfig::default(), dispatcher)
}

pub async fn create_tag(db: &DatabaseConnection, name: &str) -> Result<tag::Model> {
    Ok(TagRepository::new(db.clone()).create(name).await?)
}

pub async fn create_contact(
    db: &DatabaseConnection,
    name: &str,
    phone_number: &str,
    tag_ids: &[Uuid],
) -> Result<contact::Model> {
    Ok(ContactRepository::new(db.clone())
        .create(NewContact {
            name: name.to_string(),
            phone_number: phone_number.to_string(),
            email: None,
            tag_ids: tag_ids.to_vec(),
        })
        .await?)
}

pub async fn create_device(db: &DatabaseConnection) -> Result<device::Model> {
    Ok(DeviceRepository::new(db.clone())
        .create(NewDevice {
            name: "Sales phone".to_string(),
            phone_number: "+628000000001".to_string(),
            image_url: None,
        })
        .await?)
}

pub async fn create_campaign(
    db: &DatabaseConnection,
    device_id: Uuid,
    message: &str,
    scheduled_time: Option<DateTime<Utc>>,
    tag_ids: &[Uuid],
) -> Result<campaign::Model> {
    Ok(CampaignRepository::new(db.clone())
        .create(NewCampaign {
            name: format!("Campaign {}", &Uuid::new_v4().to_string()[..8]),
            message: message.to_string(),
            device_id,
            scheduled_time,
            tag_ids: tag_ids.to_vec(),
        })
        .await?)
}

/// Tag, device and `numbers.len()` tagged contacts, plus a pending campaign
/// targeting that tag.
pub struct CampaignFixture {
    pub campaign: campaign::Model,
    pub device: device::Model,
    pub contacts: Vec<contact::Model>,
}

pub async fn campaign_fixture(
    db: &DatabaseConnection,
    numbers: &[&str],
    scheduled_time: Option<DateTime<Utc>>,
) -> Result<CampaignFixture> {
    let tag = create_tag(db, &format!("audience-{}", Uuid::new_v4())).await?;
    let device = create_device(db).await?;

    let mut contacts = Vec::with_capacity(numbers.len());
    for (index, number) in numbers.iter().enumerate() {
        contacts.push(create_contact(db, &format!("Contact {index}"), number, &[tag.id]).await?);
    }

    let campaign = create_campaign(
        db,
        device.id,
        "Hello from the campaign",
        scheduled_time,
        &[tag.id],
    )
    .await?;

    Ok(CampaignFixture {
        campaign,
        device,
        contacts,
    })
}

pub async fn campaign_status(
    db: &DatabaseConnection,
    id: Uuid,
) -> Result<campaign::CampaignStatus> {
    let campaign = CampaignRepository::new(db.clone())
        .find(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("campaign {id} missing"))?;
    Ok(campaign.status)
}
