//! The entry points an integration exposes to the config entry manager

use async_trait::async_trait;
use thiserror::Error;

use crate::entry::ConfigEntry;

/// Outcome of a failed `async_setup_entry`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetupError {
    /// The device or service is temporarily unavailable; setup is retried
    /// with backoff.
    #[error("not ready: {0}")]
    NotReady(String),

    /// Setup failed for good; the entry stays in `SetupError`.
    #[error("setup failed: {0}")]
    Failed(String),
}

/// An integration able to set up config entries of its domain
#[async_trait]
pub trait Integration: Send + Sync {
    /// Domain handled by this integration (e.g., "velbus")
    fn domain(&self) -> &str;

    /// Set up a config entry
    async fn async_setup_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError>;

    /// Unload a config entry. `Ok(false)` means the integration could not
    /// release everything.
    async fn async_unload_entry(&self, entry: &ConfigEntry) -> Result<bool, SetupError>;
}
