//! Shared rendering of `geo_location` entities
//!
//! A geolocation event's state is its distance to home, in the host's length
//! unit; its position and source are attributes.

use std::collections::HashMap;

use ha_config::{UnitSystem, LENGTH_KILOMETERS};
use serde_json::{json, Value};

pub const DOMAIN: &str = "geo_location";

pub const ATTR_SOURCE: &str = "source";
pub const ATTR_LATITUDE: &str = "latitude";
pub const ATTR_LONGITUDE: &str = "longitude";

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

/// State of an event `distance_km` away, in the unit of `units`
pub fn distance_state(distance_km: f64, units: &UnitSystem) -> String {
    let distance = units.length(distance_km, LENGTH_KILOMETERS);
    format!("{:.1}", round_to(distance, 1))
}

/// Position and source attributes common to every geolocation event
pub fn base_attributes(latitude: f64, longitude: f64, source: &str) -> HashMap<String, Value> {
    HashMap::from([
        (ATTR_LATITUDE.to_string(), json!(round_to(latitude, 5))),
        (ATTR_LONGITUDE.to_string(), json!(round_to(longitude, 5))),
        (ATTR_SOURCE.to_string(), json!(source)),
    ])
}
