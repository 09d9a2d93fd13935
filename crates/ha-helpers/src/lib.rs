//! Helpers shared by integrations
//!
//! - [`Entity`] - the contract an integration's entity objects implement
//! - [`EntityPlatform`] - the entities of one platform for one config entry
//! - [`EntityPlatforms`] - platform forwarding keyed by config entry
//! - [`HomeAssistant`] - handle bundling the host services

pub mod entity;
pub mod entity_platform;
pub mod hass;

pub use entity::{DeviceInfo, Entity, EntityHandle};
pub use entity_platform::{EntityPlatform, EntityPlatforms};
pub use hass::{HomeAssistant, SharedConfig};
