//! Config Entries
//!
//! Config entries represent individual integration instances. This crate
//! drives their lifecycle (setup, retry, unload, reload) against the
//! [`Integration`] implementations registered for each domain.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntryState`] - Lifecycle state of an entry
//! - [`Integration`] - Setup/unload entry points of an integration
//! - [`ConfigEntries`] - Manager for all config entries
//!
//! Entries are kept in memory only.

pub mod entry;
pub mod integration;
pub mod manager;
pub mod state_machine;

// Re-export main types
pub use entry::{ConfigEntry, ConfigEntrySource, ConfigEntryState};
pub use integration::{Integration, SetupError};
pub use manager::{ConfigEntries, ConfigEntriesError, ConfigEntriesResult};
pub use state_machine::{calculate_retry_delay, InvalidTransition};
