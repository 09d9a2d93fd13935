//! Entity proxy for one module channel

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_config::UnitSystem;
use ha_helpers::{DeviceInfo, Entity, EntityHandle};
use serde_json::{json, Value};
use tracing::debug;

use super::controller::VelbusModule;
use super::discovery::Category;
use super::DOMAIN;

const MANUFACTURER: &str = "Velleman";

/// One (module, channel) pair exposed on a category platform
///
/// Every property is read from the module on demand; the proxy caches
/// nothing.
pub struct VelbusEntity {
    module: Arc<dyn VelbusModule>,
    channel: u8,
    category: Category,
}

impl VelbusEntity {
    pub fn new(module: Arc<dyn VelbusModule>, channel: u8, category: Category) -> Self {
        Self {
            module,
            channel,
            category,
        }
    }
}

fn on_off(value: bool) -> String {
    let state = if value { "on" } else { "off" };
    state.to_string()
}

#[async_trait]
impl Entity for VelbusEntity {
    fn unique_id(&self) -> Option<String> {
        let serial = match self.module.serial() {
            0 => u32::from(self.module.address()),
            serial => serial,
        };
        Some(format!("{}-{}", serial, self.channel))
    }

    fn name(&self) -> Option<String> {
        Some(self.module.name(self.channel))
    }

    fn should_poll(&self) -> bool {
        false
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        let address = self.module.address();
        let module_name = self.module.module_name();
        Some(DeviceInfo {
            identifiers: vec![(
                DOMAIN.to_string(),
                format!("{}:{}", address, self.module.serial()),
            )],
            name: Some(format!("{} {}", address, module_name)),
            manufacturer: Some(MANUFACTURER.to_string()),
            model: Some(module_name),
            sw_version: Some(format!(
                "{}.{}-{}",
                self.module.memory_map_version(),
                self.module.build_year(),
                self.module.build_week()
            )),
        })
    }

    fn state(&self, _units: &UnitSystem) -> Option<String> {
        let channel = self.channel;
        match self.category {
            Category::Switch => Some(on_off(self.module.is_on(channel))),
            Category::BinarySensor => Some(on_off(self.module.is_closed(channel))),
            Category::Sensor => self.module.sensor_value(channel).map(|v| v.to_string()),
            Category::Cover => Some(
                if self.module.is_closed(channel) {
                    "closed"
                } else {
                    "open"
                }
                .to_string(),
            ),
            Category::Climate => Some("heat".to_string()),
        }
    }

    fn unit_of_measurement(&self, _units: &UnitSystem) -> Option<String> {
        match self.category {
            Category::Sensor => self.module.sensor_unit(self.channel),
            _ => None,
        }
    }

    fn extra_state_attributes(&self, _units: &UnitSystem) -> HashMap<String, Value> {
        let mut attributes = HashMap::new();
        match self.category {
            Category::Cover => {
                if let Some(position) = self.module.cover_position(self.channel) {
                    attributes.insert("current_position".to_string(), json!(position));
                }
            }
            Category::Climate => {
                if let Some(current) = self.module.current_temperature(self.channel) {
                    attributes.insert("current_temperature".to_string(), json!(current));
                }
                if let Some(target) = self.module.target_temperature(self.channel) {
                    attributes.insert("temperature".to_string(), json!(target));
                }
            }
            _ => {}
        }
        attributes
    }

    async fn async_added_to_hass(&self, handle: EntityHandle) {
        debug!(entity_id = %handle.entity_id(), "Listening for channel {} updates", self.channel);
        self.module.on_status_update(
            self.channel,
            Box::new(move || handle.schedule_update_ha_state()),
        );
    }
}
