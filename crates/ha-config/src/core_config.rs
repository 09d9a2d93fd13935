//! Core configuration
//!
//! Parses the `homeassistant:` section of configuration.yaml

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{ConfigError, ConfigResult};
use crate::units::UnitSystem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Name of the location (e.g., "Home")
    #[serde(default = "default_name")]
    pub name: String,

    /// Home latitude
    #[serde(default)]
    pub latitude: f64,

    /// Home longitude
    #[serde(default)]
    pub longitude: f64,

    /// Elevation in meters
    #[serde(default)]
    pub elevation: i32,

    #[serde(default)]
    pub unit_system: UnitSystem,

    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

fn default_name() -> String {
    "Home".to_string()
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            latitude: 0.0,
            longitude: 0.0,
            elevation: 0,
            unit_system: UnitSystem::Metric,
            time_zone: default_time_zone(),
        }
    }
}

impl CoreConfig {
    /// Parse core configuration from the configuration root
    ///
    /// A missing `homeassistant:` section yields the defaults.
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        let mapping = yaml
            .as_mapping()
            .ok_or_else(|| ConfigError::invalid("root", "configuration must be a mapping"))?;

        let section = mapping
            .get(&Value::String("homeassistant".to_string()))
            .cloned()
            .unwrap_or(Value::Mapping(serde_yaml::Mapping::new()));

        let config: CoreConfig = serde_yaml::from_value(section)
            .map_err(|e| ConfigError::invalid("homeassistant", e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Home coordinates as (latitude, longitude)
    pub fn home(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    fn validate(&self) -> ConfigResult<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ConfigError::invalid("latitude", "must be between -90 and 90"));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ConfigError::invalid(
                "longitude",
                "must be between -180 and 180",
            ));
        }
        Ok(())
    }
}
