//! Config Entries Manager
//!
//! Manages the lifecycle of configuration entries.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::entry::{ConfigEntry, ConfigEntryState};
use crate::integration::{Integration, SetupError};
use crate::state_machine::{calculate_retry_delay, InvalidTransition};

/// Config entries errors
#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error("No integration registered for domain {0}")]
    IntegrationNotFound(String),

    #[error("Cannot unload entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error("Setup failed: {0}")]
    SetupFailed(String),

    #[error("Unload failed: {0}")]
    UnloadFailed(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Config Entries Manager
///
/// Manages the lifecycle of configuration entries including:
/// - Entry creation and removal
/// - Setup through the registered [`Integration`] of the entry's domain
/// - Scheduled setup retries for entries that are not ready
/// - Unload and reload
pub struct ConfigEntries {
    /// Primary index: entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// Index: domain -> set of entry_ids
    by_domain: DashMap<String, HashSet<String>>,

    /// Index: (domain, unique_id) -> entry_id
    by_unique_id: DashMap<(String, String), String>,

    /// Serializes setup/unload
    setup_lock: Mutex<()>,

    /// Integrations by domain
    integrations: DashMap<String, Arc<dyn Integration>>,

    /// Pending setup retries: entry_id -> retry task
    retry_tasks: DashMap<String, JoinHandle<()>>,
}

impl Default for ConfigEntries {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigEntries {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            by_domain: DashMap::new(),
            by_unique_id: DashMap::new(),
            setup_lock: Mutex::new(()),
            integrations: DashMap::new(),
            retry_tasks: DashMap::new(),
        }
    }

    fn index_entry(&self, entry: &ConfigEntry) {
        let entry_id = entry.entry_id.clone();

        self.entries.insert(entry_id.clone(), entry.clone());

        self.by_domain
            .entry(entry.domain.clone())
            .or_default()
            .insert(entry_id.clone());

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .insert((entry.domain.clone(), unique_id.clone()), entry_id);
        }
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        if let Some(mut ids) = self.by_domain.get_mut(&entry.domain) {
            ids.remove(&entry.entry_id);
        }

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&(entry.domain.clone(), unique_id.clone()));
        }

        self.entries.remove(&entry.entry_id);
    }

    /// Register the integration handling a domain
    pub fn register_integration(&self, integration: Arc<dyn Integration>) {
        let domain = integration.domain().to_string();
        debug!("Registered integration for domain: {}", domain);
        self.integrations.insert(domain, integration);
    }

    /// Get an entry by ID
    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    /// Get all entries for a domain
    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.by_domain
            .get(domain)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Get loaded entries for a domain
    pub fn get_loaded_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.get_by_domain(domain)
            .into_iter()
            .filter(|e| e.is_loaded())
            .collect()
    }

    /// Get entry by unique_id
    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        self.by_unique_id
            .get(&(domain.to_string(), unique_id.to_string()))
            .and_then(|entry_id| self.get(&entry_id))
    }

    /// Add a new config entry
    pub fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(ref unique_id) = entry.unique_id {
            if self.get_by_unique_id(&entry.domain, unique_id).is_some() {
                return Err(ConfigEntriesError::AlreadyExists {
                    domain: entry.domain.clone(),
                    unique_id: unique_id.clone(),
                });
            }
        }

        self.index_entry(&entry);

        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );

        Ok(entry)
    }

    /// Remove an entry, unloading it first when needed
    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.state != ConfigEntryState::NotLoaded && entry.state.is_recoverable() {
            self.unload(entry_id).await?;
        }
        self.cancel_retry(entry_id);

        self.unindex_entry(&entry);

        info!(
            "Removed config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry_id
        );

        Ok(entry)
    }

    /// Transition an entry, returning the updated copy
    fn transition(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        entry.try_set_state(state, reason)?;
        debug!("Entry {} state changed to {:?}", entry_id, state);
        Ok(entry.clone())
    }

    fn cancel_retry(&self, entry_id: &str) {
        if let Some((_, task)) = self.retry_tasks.remove(entry_id) {
            task.abort();
            debug!("Cancelled pending setup retry for entry {}", entry_id);
        }
    }

    fn schedule_retry(self: &Arc<Self>, entry_id: &str, delay: Duration) {
        let manager = Arc::clone(self);
        let id = entry_id.to_string();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.retry_tasks.remove(&id);

            let still_waiting = manager
                .get(&id)
                .is_some_and(|e| e.state == ConfigEntryState::SetupRetry);
            if !still_waiting {
                return;
            }
            if let Err(e) = manager.setup(&id).await {
                warn!("Retried setup of entry {} failed: {}", id, e);
            }
        });

        if let Some(previous) = self.retry_tasks.insert(entry_id.to_string(), task) {
            previous.abort();
        }
    }

    /// Set up an entry through its integration
    ///
    /// A `NotReady` outcome is not an error: the entry moves to `SetupRetry`
    /// and another attempt is scheduled with backoff.
    pub async fn setup(self: &Arc<Self>, entry_id: &str) -> ConfigEntriesResult<()> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.disabled {
            debug!("Skipping setup for disabled entry: {}", entry_id);
            return Ok(());
        }
        if entry.is_loaded() {
            debug!("Entry {} already loaded", entry_id);
            return Ok(());
        }

        let integration = self
            .integrations
            .get(&entry.domain)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| ConfigEntriesError::IntegrationNotFound(entry.domain.clone()))?;

        let entry = self.transition(entry_id, ConfigEntryState::SetupInProgress, None)?;

        match integration.async_setup_entry(&entry).await {
            Ok(()) => {
                self.transition(entry_id, ConfigEntryState::Loaded, None)?;
                info!("Setup completed for entry: {} ({})", entry.title, entry_id);
                Ok(())
            }
            Err(SetupError::NotReady(reason)) => {
                let tries = match self.entries.get_mut(entry_id) {
                    Some(mut e) => e.increment_tries(),
                    None => return Err(ConfigEntriesError::NotFound(entry_id.to_string())),
                };
                self.transition(entry_id, ConfigEntryState::SetupRetry, Some(reason.clone()))?;

                let delay = calculate_retry_delay(tries - 1);
                warn!(
                    "Config entry '{}' for {} integration not ready yet: {}; retrying in {:.0}s",
                    entry.title,
                    entry.domain,
                    reason,
                    delay.as_secs_f64()
                );
                self.schedule_retry(entry_id, delay);
                Ok(())
            }
            Err(SetupError::Failed(reason)) => {
                warn!("Setup failed for entry {}: {}", entry_id, reason);
                self.transition(entry_id, ConfigEntryState::SetupError, Some(reason.clone()))?;
                Err(ConfigEntriesError::SetupFailed(reason))
            }
        }
    }

    /// Unload an entry
    ///
    /// Returns `Ok(false)` when the integration reported it could not unload.
    pub async fn unload(&self, entry_id: &str) -> ConfigEntriesResult<bool> {
        let _lock = self.setup_lock.lock().await;
        self.cancel_retry(entry_id);

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        match entry.state {
            ConfigEntryState::NotLoaded => return Ok(true),
            state if !state.is_recoverable() => {
                return Err(ConfigEntriesError::CannotUnload(state));
            }
            _ => {}
        }

        let was_loaded = entry.is_loaded();
        let entry = self.transition(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        // Entries that never finished setup have nothing to release
        if !was_loaded {
            self.transition(entry_id, ConfigEntryState::NotLoaded, None)?;
            return Ok(true);
        }

        let integration = self
            .integrations
            .get(&entry.domain)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| ConfigEntriesError::IntegrationNotFound(entry.domain.clone()))?;

        match integration.async_unload_entry(&entry).await {
            Ok(true) => {
                self.transition(entry_id, ConfigEntryState::NotLoaded, None)?;
                info!("Unloaded entry: {} ({})", entry.title, entry_id);
                Ok(true)
            }
            Ok(false) => {
                warn!("Integration {} could not unload entry {}", entry.domain, entry_id);
                self.transition(entry_id, ConfigEntryState::FailedUnload, None)?;
                Ok(false)
            }
            Err(e) => {
                warn!("Error unloading entry {}: {}", entry_id, e);
                self.transition(
                    entry_id,
                    ConfigEntryState::FailedUnload,
                    Some(e.to_string()),
                )?;
                Err(ConfigEntriesError::UnloadFailed(e.to_string()))
            }
        }
    }

    /// Reload an entry (unload + setup)
    pub async fn reload(self: &Arc<Self>, entry_id: &str) -> ConfigEntriesResult<()> {
        if !self.unload(entry_id).await? {
            return Err(ConfigEntriesError::UnloadFailed(entry_id.to_string()));
        }
        self.setup(entry_id).await
    }

    /// Whether a setup retry is pending for the entry
    pub fn has_pending_retry(&self, entry_id: &str) -> bool {
        self.retry_tasks.contains_key(entry_id)
    }

    /// Get all entry IDs
    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    /// Get count of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
