//! Unit systems and length conversion

use serde::{Deserialize, Serialize};

pub const LENGTH_KILOMETERS: &str = "km";
pub const LENGTH_MILES: &str = "mi";

/// Kilometers in one international mile
pub const KM_PER_MILE: f64 = 1.609344;

/// The host's unit system
///
/// Integrations read it at render time to pick the unit of the values they
/// expose, and at setup time to interpret user supplied distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    pub fn name(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
        }
    }

    pub fn is_metric(&self) -> bool {
        *self == UnitSystem::Metric
    }

    /// Unit used for distances
    pub fn length_unit(&self) -> &'static str {
        match self {
            UnitSystem::Metric => LENGTH_KILOMETERS,
            UnitSystem::Imperial => LENGTH_MILES,
        }
    }

    pub fn temperature_unit(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "°C",
            UnitSystem::Imperial => "°F",
        }
    }

    /// Convert a length given in `from_unit` into this system's length unit
    ///
    /// Unknown units are returned unchanged.
    pub fn length(&self, value: f64, from_unit: &str) -> f64 {
        convert_length(value, from_unit, self.length_unit())
    }
}

fn convert_length(value: f64, from: &str, to: &str) -> f64 {
    match (from, to) {
        (LENGTH_MILES, LENGTH_KILOMETERS) => value * KM_PER_MILE,
        (LENGTH_KILOMETERS, LENGTH_MILES) => value / KM_PER_MILE,
        _ => value,
    }
}
