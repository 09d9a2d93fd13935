//! Core types for the integration host
//!
//! Value types shared by every host crate and integration: EntityId, State,
//! Event, Context and ServiceCall.

mod context;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{slugify, EntityId, EntityIdError};
pub use event::{Event, EventData, EventOrigin, EventType};
pub use service_call::ServiceCall;
pub use state::State;

/// Maximum length for a state value
pub const MAX_STATE_LENGTH: usize = 255;

/// State value written when an entity has no state
pub const STATE_UNKNOWN: &str = "unknown";

/// Well-known event types fired by the host
pub mod events {
    use super::*;

    /// An entity state was written or removed
    pub const STATE_CHANGED: &str = "state_changed";

    /// The host finished starting up
    pub const HOMEASSISTANT_START: &str = "homeassistant_start";

    /// The host is shutting down
    pub const HOMEASSISTANT_STOP: &str = "homeassistant_stop";

    /// Data for STATE_CHANGED events
    ///
    /// `new_state` is `None` when the entity was removed.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }
}
