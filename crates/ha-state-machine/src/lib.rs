//! State machine with domain indexing
//!
//! Holds the last written state of every entity. Entity platforms write here
//! whenever an entity proxy asks to be re-rendered and remove the state when
//! the proxy goes away. Every write and removal fires `state_changed`.

use dashmap::DashMap;
use ha_core::events::StateChangedData;
use ha_core::{Context, EntityId, State};
use ha_event_bus::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

pub struct StateMachine {
    /// All entity states keyed by entity_id string
    states: DashMap<String, State>,
    /// Entity ids by domain
    domain_index: DashMap<String, Vec<String>>,
    event_bus: Arc<EventBus>,
}

impl StateMachine {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            domain_index: DashMap::new(),
            event_bus,
        }
    }

    /// Write the state of an entity
    ///
    /// `last_changed` only moves when the state value differs from the
    /// stored one. Fires STATE_CHANGED with the old and new state.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();

        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context.clone()),
            None => State::new(entity_id.clone(), state, attributes, context.clone()),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Setting entity state"
        );

        self.states.insert(key.clone(), new_state.clone());

        if old_state.is_none() {
            self.domain_index
                .entry(entity_id.domain().to_string())
                .or_default()
                .push(key);
        }

        self.event_bus.fire_typed(
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );

        new_state
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// The state value alone, or None if the entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    /// Entity ids for a domain, in insertion order
    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn domain_states(&self, domain: &str) -> Vec<State> {
        self.entity_ids(domain)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn all(&self) -> Vec<State> {
        self.states.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove an entity's state
    ///
    /// Fires STATE_CHANGED with `new_state: None`. Removing an unknown
    /// entity is a no-op.
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let key = entity_id.to_string();

        let old_state = self.states.remove(&key).map(|(_, s)| s);

        if let Some(ref state) = old_state {
            trace!("Removing entity state");

            if let Some(mut ids) = self.domain_index.get_mut(entity_id.domain()) {
                ids.retain(|id| id != &key);
            }

            self.event_bus.fire_typed(
                StateChangedData {
                    entity_id: entity_id.clone(),
                    old_state: Some(state.clone()),
                    new_state: None,
                },
                context,
            );
        }

        old_state
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_test_setup() -> (Arc<EventBus>, StateMachine) {
        let event_bus = Arc::new(EventBus::new());
        let state_machine = StateMachine::new(event_bus.clone());
        (event_bus, state_machine)
    }

    #[test]
    fn test_set_and_get_state() {
        let (_, sm) = make_test_setup();

        let entity_id = EntityId::new("geo_location", "title_1").unwrap();
        let attrs = HashMap::from([("magnitude".to_string(), json!(5.7))]);

        let state = sm.set(entity_id, "15.5", attrs.clone(), Context::new());
        assert_eq!(state.state, "15.5");
        assert_eq!(state.attributes, attrs);

        assert!(sm.is_state("geo_location.title_1", "15.5"));
        assert!(!sm.is_state("geo_location.title_2", "15.5"));
    }

    #[test]
    fn test_domain_indexing() {
        let (_, sm) = make_test_setup();

        for (domain, object_id) in [("switch", "relay_1"), ("switch", "relay_2"), ("sensor", "temp")]
        {
            sm.set(
                EntityId::new(domain, object_id).unwrap(),
                "on",
                HashMap::new(),
                Context::new(),
            );
        }

        assert_eq!(sm.entity_ids("switch"), vec!["switch.relay_1", "switch.relay_2"]);
        assert_eq!(sm.domain_states("sensor").len(), 1);
        assert_eq!(sm.entity_count(), 3);
    }

    #[test]
    fn test_remove_state() {
        let (_, sm) = make_test_setup();

        let entity_id = EntityId::new("switch", "relay").unwrap();
        sm.set(entity_id.clone(), "on", HashMap::new(), Context::new());

        let removed = sm.remove(&entity_id, Context::new());
        assert_eq!(removed.unwrap().state, "on");
        assert!(sm.get("switch.relay").is_none());
        assert!(sm.entity_ids("switch").is_empty());
        assert!(sm.remove(&entity_id, Context::new()).is_none());
    }

    #[tokio::test]
    async fn test_state_changed_events() {
        let event_bus = Arc::new(EventBus::new());
        let sm = StateMachine::new(event_bus.clone());
        let mut rx = event_bus.subscribe_typed::<StateChangedData>();

        let entity_id = EntityId::new("switch", "relay").unwrap();
        sm.set(entity_id.clone(), "on", HashMap::new(), Context::new());
        sm.remove(&entity_id, Context::new());

        let added = rx.recv().await.unwrap();
        assert!(added.data.old_state.is_none());
        assert_eq!(added.data.new_state.unwrap().state, "on");

        let removed = rx.recv().await.unwrap();
        assert!(removed.data.new_state.is_none());
        assert_eq!(removed.data.old_state.unwrap().state, "on");
    }
}
