//! # Repository Layer
//!
//! Record-oriented access to tags, contacts, devices, campaigns and delivery
//! records. Every repository owns a clone of the connection pool.

pub mod campaign;
pub mod contact;
pub mod delivery;
pub mod device;
pub mod tag;

pub use campaign::{CampaignRepository, CampaignUpdate, DispatchBundle, NewCampaign};
pub use contact::{ContactRepository, NewContact};
pub use delivery::DeliveryRecorder;
pub use device::{DeviceRepository, NewDevice};
pub use tag::TagRepository;
