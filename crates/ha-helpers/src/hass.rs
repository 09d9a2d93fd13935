//! The HomeAssistant handle passed to integrations

use std::sync::Arc;

use ha_config::{CoreConfig, UnitSystem};
use ha_config_entries::ConfigEntries;
use ha_core::{events, Context, Event};
use ha_event_bus::EventBus;
use ha_service_registry::ServiceRegistry;
use ha_state_machine::StateMachine;
use parking_lot::RwLock;
use tracing::info;

use crate::entity::StateWriter;
use crate::entity_platform::EntityPlatforms;

/// Core configuration that can change while running
#[derive(Debug, Default)]
pub struct SharedConfig {
    inner: RwLock<CoreConfig>,
}

impl SharedConfig {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            inner: RwLock::new(config),
        }
    }

    pub fn get(&self) -> CoreConfig {
        self.inner.read().clone()
    }

    pub fn unit_system(&self) -> UnitSystem {
        self.inner.read().unit_system
    }

    pub fn set_unit_system(&self, units: UnitSystem) {
        self.inner.write().unit_system = units;
    }
}

/// Host services shared by every integration
pub struct HomeAssistant {
    /// Event bus for pub/sub communication
    pub bus: Arc<EventBus>,
    /// State machine for entity states
    pub states: Arc<StateMachine>,
    /// Service registry for service calls
    pub services: Arc<ServiceRegistry>,
    /// Config entry lifecycle
    pub config_entries: Arc<ConfigEntries>,
    /// Entity platforms forwarded by config entries
    pub platforms: Arc<EntityPlatforms>,
    config: Arc<SharedConfig>,
}

impl HomeAssistant {
    pub fn new(config: CoreConfig) -> Arc<Self> {
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateMachine::new(bus.clone()));
        let config = Arc::new(SharedConfig::new(config));
        let platforms = Arc::new(EntityPlatforms::new(StateWriter {
            states: states.clone(),
            config: config.clone(),
        }));

        Arc::new(Self {
            bus,
            states,
            services: Arc::new(ServiceRegistry::new()),
            config_entries: Arc::new(ConfigEntries::new()),
            platforms,
            config,
        })
    }

    /// Snapshot of the core configuration
    pub fn config(&self) -> CoreConfig {
        self.config.get()
    }

    pub fn unit_system(&self) -> UnitSystem {
        self.config.unit_system()
    }

    /// Switch the unit system; entities pick it up on their next render
    pub fn set_unit_system(&self, units: UnitSystem) {
        info!("Unit system set to {}", units.name());
        self.config.set_unit_system(units);
    }

    /// Whether `homeassistant_start` has been fired
    pub fn is_running(&self) -> bool {
        self.bus.is_started()
    }

    /// Fire `homeassistant_start`
    pub fn start(&self) {
        info!("Starting Home Assistant");
        self.bus.fire(Event::new(
            events::HOMEASSISTANT_START,
            serde_json::Value::Null,
            Context::new(),
        ));
    }

    /// Fire `homeassistant_stop`
    pub fn stop(&self) {
        info!("Stopping Home Assistant");
        self.bus.fire(Event::new(
            events::HOMEASSISTANT_STOP,
            serde_json::Value::Null,
            Context::new(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_system_switch() {
        let hass = HomeAssistant::new(CoreConfig::default());
        assert_eq!(hass.unit_system(), UnitSystem::Metric);

        hass.set_unit_system(UnitSystem::Imperial);
        assert_eq!(hass.unit_system(), UnitSystem::Imperial);
        assert_eq!(hass.config().unit_system, UnitSystem::Imperial);
    }

    #[tokio::test]
    async fn test_start_fires_event() {
        let hass = HomeAssistant::new(CoreConfig::default());
        let mut rx = hass.bus.subscribe(events::HOMEASSISTANT_START);
        assert!(!hass.is_running());

        hass.start();

        assert!(hass.is_running());
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type.as_str(), events::HOMEASSISTANT_START);
    }
}
