//! # Campaigns
//!
//! Campaign-based outbound messaging: contacts grouped by tags, campaigns
//! sent through an external messaging gateway on a schedule or on demand,
//! and one delivery record per recipient.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod phone;
pub mod repositories;
pub mod scheduler;
pub mod server;
pub mod telemetry;
pub use migration;
