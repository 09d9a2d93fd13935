//! `geonetnz_quakes:` configuration

use std::time::Duration;

use ha_config::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_RADIUS: f64 = 50.0;
pub const DEFAULT_MMI: i32 = 3;
pub const DEFAULT_MINIMUM_MAGNITUDE: f64 = 0.0;
/// Poll interval in seconds
pub const DEFAULT_SCAN_INTERVAL: u64 = 300;

fn default_radius() -> f64 {
    DEFAULT_RADIUS
}

fn default_mmi() -> i32 {
    DEFAULT_MMI
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL
}

/// Feed settings, as written in YAML and stored in the config entry
///
/// `radius` is in the host's length unit. Missing coordinates default to the
/// home location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuakesConfig {
    #[serde(default = "default_radius")]
    pub radius: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    /// Minimum Modified Mercalli Intensity, -1 for all
    #[serde(default = "default_mmi")]
    pub mmi: i32,

    #[serde(default)]
    pub minimum_magnitude: f64,

    /// Seconds between polls
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,

    /// Seconds after an event's time at which its entity is removed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<u64>,
}

impl Default for QuakesConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            latitude: None,
            longitude: None,
            mmi: DEFAULT_MMI,
            minimum_magnitude: DEFAULT_MINIMUM_MAGNITUDE,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            expire_after: None,
        }
    }
}

impl QuakesConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(ConfigError::invalid("radius", "must be a positive number"));
        }
        if let Some(latitude) = self.latitude {
            if !(-90.0..=90.0).contains(&latitude) {
                return Err(ConfigError::invalid("latitude", "must be between -90 and 90"));
            }
        }
        if let Some(longitude) = self.longitude {
            if !(-180.0..=180.0).contains(&longitude) {
                return Err(ConfigError::invalid(
                    "longitude",
                    "must be between -180 and 180",
                ));
            }
        }
        if !(-1..=8).contains(&self.mmi) {
            return Err(ConfigError::invalid("mmi", "must be between -1 and 8"));
        }
        if !self.minimum_magnitude.is_finite() || self.minimum_magnitude < 0.0 {
            return Err(ConfigError::invalid(
                "minimum_magnitude",
                "must not be negative",
            ));
        }
        if self.scan_interval == 0 {
            return Err(ConfigError::invalid("scan_interval", "must be at least 1 second"));
        }
        Ok(())
    }

    /// Fill in missing coordinates from the home location
    pub fn with_home(mut self, home: (f64, f64)) -> Self {
        self.latitude.get_or_insert(home.0);
        self.longitude.get_or_insert(home.1);
        self
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval)
    }

    pub fn expire_after(&self) -> Option<Duration> {
        self.expire_after.map(Duration::from_secs)
    }

    /// Identity of a feed: its center
    pub fn unique_id(&self) -> String {
        format!(
            "{}, {}",
            self.latitude.unwrap_or_default(),
            self.longitude.unwrap_or_default()
        )
    }
}
