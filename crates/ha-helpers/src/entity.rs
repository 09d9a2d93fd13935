//! Entity contract
//!
//! An integration exposes each real-world item as an object implementing
//! [`Entity`]. The platform renders it into a [`State`](ha_core::State)
//! against the host's current unit system and hands the entity an
//! [`EntityHandle`] to request re-renders when its source changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use ha_config::UnitSystem;
use ha_core::{Context, EntityId, STATE_UNKNOWN};
use ha_state_machine::StateMachine;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::hass::SharedConfig;

pub const ATTR_FRIENDLY_NAME: &str = "friendly_name";
pub const ATTR_UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";
pub const ATTR_ICON: &str = "icon";

/// Device a group of entities belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// (domain, id) pairs identifying the device
    pub identifiers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
}

/// An entity owned by an integration
#[async_trait]
pub trait Entity: Send + Sync {
    /// Stable identity; entities without one cannot be deduplicated
    fn unique_id(&self) -> Option<String> {
        None
    }

    fn name(&self) -> Option<String> {
        None
    }

    /// Whether the host should poll the entity for updates
    fn should_poll(&self) -> bool {
        true
    }

    fn icon(&self) -> Option<String> {
        None
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        None
    }

    /// State value; `None` is written as `unknown`
    fn state(&self, units: &UnitSystem) -> Option<String>;

    fn unit_of_measurement(&self, _units: &UnitSystem) -> Option<String> {
        None
    }

    fn extra_state_attributes(&self, _units: &UnitSystem) -> HashMap<String, Value> {
        HashMap::new()
    }

    /// Called once the entity has an entity_id and its first state
    async fn async_added_to_hass(&self, _handle: EntityHandle) {}

    /// Called before the entity's state is removed
    async fn async_will_remove_from_hass(&self) {}
}

/// Renders entities into the state machine
#[derive(Clone)]
pub(crate) struct StateWriter {
    pub(crate) states: Arc<StateMachine>,
    pub(crate) config: Arc<SharedConfig>,
}

impl StateWriter {
    pub(crate) fn write(&self, entity_id: &EntityId, entity: &dyn Entity) {
        let units = self.config.unit_system();
        let state = entity
            .state(&units)
            .unwrap_or_else(|| STATE_UNKNOWN.to_string());

        let mut attributes = entity.extra_state_attributes(&units);
        if let Some(name) = entity.name() {
            attributes.insert(ATTR_FRIENDLY_NAME.to_string(), Value::String(name));
        }
        if let Some(unit) = entity.unit_of_measurement(&units) {
            attributes.insert(ATTR_UNIT_OF_MEASUREMENT.to_string(), Value::String(unit));
        }
        if let Some(icon) = entity.icon() {
            attributes.insert(ATTR_ICON.to_string(), Value::String(icon));
        }

        trace!(entity_id = %entity_id, state = %state, "Writing entity state");
        self.states
            .set(entity_id.clone(), state, attributes, Context::new());
    }

    pub(crate) fn remove(&self, entity_id: &EntityId) {
        self.states.remove(entity_id, Context::new());
    }

    pub(crate) fn is_taken(&self, entity_id: &EntityId) -> bool {
        self.states.get(&entity_id.to_string()).is_some()
    }
}

/// Link from an added entity back to the host
///
/// Holds only a weak reference to the entity, so an entity may keep its own
/// handle without creating a cycle.
#[derive(Clone)]
pub struct EntityHandle {
    entity_id: EntityId,
    entity: Weak<dyn Entity>,
    writer: StateWriter,
    removed: Arc<AtomicBool>,
}

impl EntityHandle {
    pub(crate) fn new(entity_id: EntityId, entity: &Arc<dyn Entity>, writer: StateWriter) -> Self {
        Self {
            entity_id,
            entity: Arc::downgrade(entity),
            writer,
            removed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Re-render the entity and write its state
    ///
    /// Does nothing once the entity has been removed.
    pub fn schedule_update_ha_state(&self) {
        if self.is_removed() {
            trace!(entity_id = %self.entity_id, "Ignoring update of removed entity");
            return;
        }
        if let Some(entity) = self.entity.upgrade() {
            self.writer.write(&self.entity_id, entity.as_ref());
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityHandle")
            .field("entity_id", &self.entity_id)
            .field("removed", &self.is_removed())
            .finish()
    }
}
