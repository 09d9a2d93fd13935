//! Host harness
//!
//! Builds a [`HomeAssistant`] around a New Zealand home location and provides
//! assertions over the state machine.

use std::sync::Arc;
use std::time::Duration;

use ha_config::{CoreConfig, UnitSystem};
use ha_helpers::HomeAssistant;

pub const HOME_LATITUDE: f64 = -41.2;
pub const HOME_LONGITUDE: f64 = 174.7;

pub fn test_config(unit_system: UnitSystem) -> CoreConfig {
    CoreConfig {
        name: "Test Home".to_string(),
        latitude: HOME_LATITUDE,
        longitude: HOME_LONGITUDE,
        unit_system,
        time_zone: "Pacific/Auckland".to_string(),
        ..CoreConfig::default()
    }
}

/// A metric host that has not been started yet
pub fn test_hass() -> Arc<HomeAssistant> {
    HomeAssistant::new(test_config(UnitSystem::Metric))
}

/// Assert that an entity is in a specific state
pub fn assert_state(hass: &HomeAssistant, entity_id: &str, expected: &str) {
    let state = hass.states.get_state(entity_id);
    assert_eq!(
        state.as_deref(),
        Some(expected),
        "Expected entity {} to be in state '{}', but was {:?}",
        entity_id,
        expected,
        state
    );
}

/// Number of states in a domain
pub fn domain_count(hass: &HomeAssistant, domain: &str) -> usize {
    hass.states.entity_ids(domain).len()
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for {}", what);
}
