//! geo_location entity for one earthquake

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::SecondsFormat;
use ha_config::UnitSystem;
use ha_helpers::{Entity, EntityHandle};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};

use super::feed::FeedEntry;
use super::DOMAIN;
use crate::geo_location;

pub const ATTR_EXTERNAL_ID: &str = "external_id";
pub const ATTR_ATTRIBUTION: &str = "attribution";
pub const ATTR_DEPTH: &str = "depth";
pub const ATTR_LOCALITY: &str = "locality";
pub const ATTR_MAGNITUDE: &str = "magnitude";
pub const ATTR_MMI: &str = "mmi";
pub const ATTR_QUALITY: &str = "quality";
pub const ATTR_TIME: &str = "time";

const ICON: &str = "mdi:pulse";

/// An earthquake from the feed
///
/// Holds a snapshot of the feed entry taken at the last poll that saw it.
pub struct QuakeEvent {
    external_id: String,
    entry: RwLock<FeedEntry>,
    handle: Mutex<Option<EntityHandle>>,
}

impl QuakeEvent {
    pub fn new(entry: FeedEntry) -> Self {
        Self {
            external_id: entry.external_id.clone(),
            entry: RwLock::new(entry),
            handle: Mutex::new(None),
        }
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    /// Replace the snapshot and write the new state
    pub fn update(&self, entry: FeedEntry) {
        *self.entry.write() = entry;
        if let Some(handle) = self.handle.lock().as_ref() {
            handle.schedule_update_ha_state();
        }
    }
}

#[async_trait]
impl Entity for QuakeEvent {
    fn unique_id(&self) -> Option<String> {
        Some(self.external_id.clone())
    }

    fn name(&self) -> Option<String> {
        Some(self.entry.read().title.clone())
    }

    fn should_poll(&self) -> bool {
        false
    }

    fn icon(&self) -> Option<String> {
        Some(ICON.to_string())
    }

    fn state(&self, units: &UnitSystem) -> Option<String> {
        Some(geo_location::distance_state(
            self.entry.read().distance_to_home,
            units,
        ))
    }

    fn unit_of_measurement(&self, units: &UnitSystem) -> Option<String> {
        Some(units.length_unit().to_string())
    }

    fn extra_state_attributes(&self, _units: &UnitSystem) -> HashMap<String, Value> {
        let entry = self.entry.read();
        let (latitude, longitude) = entry.coordinates;

        let mut attributes = geo_location::base_attributes(latitude, longitude, DOMAIN);
        attributes.insert(ATTR_EXTERNAL_ID.to_string(), json!(self.external_id));

        let optional = [
            (ATTR_ATTRIBUTION, entry.attribution.as_ref().map(|v| json!(v))),
            (ATTR_DEPTH, entry.depth.map(|v| json!(v))),
            (ATTR_LOCALITY, entry.locality.as_ref().map(|v| json!(v))),
            (ATTR_MAGNITUDE, entry.magnitude.map(|v| json!(v))),
            (ATTR_MMI, entry.mmi.map(|v| json!(v))),
            (ATTR_QUALITY, entry.quality.as_ref().map(|v| json!(v))),
            (
                ATTR_TIME,
                entry
                    .time
                    .map(|t| json!(t.to_rfc3339_opts(SecondsFormat::Secs, true))),
            ),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                attributes.insert(key.to_string(), value);
            }
        }

        attributes
    }

    async fn async_added_to_hass(&self, handle: EntityHandle) {
        *self.handle.lock() = Some(handle);
    }

    async fn async_will_remove_from_hass(&self) {
        self.handle.lock().take();
    }
}
