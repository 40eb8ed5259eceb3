//! # Data Models
//!
//! SeaORM entities for tags, contacts, devices, campaigns and delivery records.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod campaign;
pub mod campaign_contact;
pub mod contact;
pub mod contact_tag;
pub mod delivery_record;
pub mod device;
pub mod tag;

pub use campaign::{CampaignStatus, Entity as Campaign};
pub use campaign_contact::Entity as CampaignContact;
pub use contact::Entity as Contact;
pub use contact_tag::Entity as ContactTag;
pub use delivery_record::{DeliveryStatus, Entity as DeliveryRecord};
pub use device::{DeviceStatus, Entity as Device};
pub use tag::Entity as Tag;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "campaigns".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
