//! Velbus integration
//!
//! Connects to a Velbus bus, scans its modules and exposes every module
//! channel on the platform matching its category. Also provides the
//! `velbus.sync_clock` service.

mod controller;
mod discovery;
mod entity;

pub use controller::{
    ScanCallback, StatusListener, VelbusConnector, VelbusController, VelbusError, VelbusModule,
};
pub use discovery::{Category, DiscoverySnapshot};
pub use entity::VelbusEntity;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use ha_config::{integration_config, ConfigError, Value};
use ha_config_entries::{ConfigEntry, ConfigEntrySource, Integration, SetupError};
use ha_helpers::{Entity, HomeAssistant};
use ha_service_registry::empty_schema;
use serde::Deserialize;
use serde_json::json;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DOMAIN: &str = "velbus";
pub const SERVICE_SYNC_CLOCK: &str = "sync_clock";

const CONF_PORT: &str = "port";
const CONF_NAME: &str = "name";
const IMPORT_TITLE: &str = "Velbus import";

/// `velbus:` section of configuration.yaml
#[derive(Debug, Clone, Deserialize)]
pub struct VelbusConfig {
    pub port: String,
}

impl VelbusConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port.trim().is_empty() {
            return Err(ConfigError::invalid(CONF_PORT, "must not be empty"));
        }
        Ok(())
    }
}

/// Import the YAML configuration as a config entry and set it up
///
/// Returns without doing anything when `velbus:` is absent.
pub async fn async_setup(hass: &Arc<HomeAssistant>, config: &Value) -> Result<(), ConfigError> {
    let Some(conf) = integration_config::<VelbusConfig>(config, DOMAIN)? else {
        return Ok(());
    };
    conf.validate()?;

    let mut data = HashMap::new();
    data.insert(CONF_PORT.to_string(), json!(conf.port));
    data.insert(CONF_NAME.to_string(), json!(IMPORT_TITLE));

    let entry = ConfigEntry::new(DOMAIN, IMPORT_TITLE)
        .with_data(data)
        .with_unique_id(conf.port.clone())
        .with_source(ConfigEntrySource::Import);

    let entry = match hass.config_entries.add(entry) {
        Ok(entry) => entry,
        Err(e) => {
            debug!("Velbus port {} already imported: {}", conf.port, e);
            return Ok(());
        }
    };

    if let Err(e) = hass.config_entries.setup(&entry.entry_id).await {
        warn!("Setting up imported Velbus entry failed: {}", e);
    }
    Ok(())
}

/// Per-entry connection state
struct VelbusData {
    controller: Arc<dyn VelbusController>,
    discovery: Option<DiscoverySnapshot>,
    forward_task: Option<JoinHandle<()>>,
    /// Set when unload starts; a scan completing afterwards is dropped
    closing: bool,
}

/// The Velbus integration
pub struct Velbus {
    hass: Weak<HomeAssistant>,
    connector: Arc<dyn VelbusConnector>,
    data: Arc<DashMap<String, VelbusData>>,
}

impl Velbus {
    /// Create the integration and register it with the host's config entries
    pub fn register(hass: &Arc<HomeAssistant>, connector: Arc<dyn VelbusConnector>) -> Arc<Self> {
        let velbus = Arc::new(Self {
            hass: Arc::downgrade(hass),
            connector,
            data: Arc::new(DashMap::new()),
        });
        hass.config_entries.register_integration(velbus.clone());
        velbus
    }

    /// Discovery snapshot of an entry, once its scan has completed
    pub fn discovery(&self, entry_id: &str) -> Option<DiscoverySnapshot> {
        self.data.get(entry_id).and_then(|d| d.discovery.clone())
    }

    /// Whether the entry has a live connection
    pub fn is_connected(&self, entry_id: &str) -> bool {
        self.data.contains_key(entry_id)
    }

    fn hass(&self) -> Result<Arc<HomeAssistant>, SetupError> {
        self.hass
            .upgrade()
            .ok_or_else(|| SetupError::Failed("host is shutting down".to_string()))
    }

    fn register_sync_clock(&self, hass: &HomeAssistant) {
        if hass.services.has_service(DOMAIN, SERVICE_SYNC_CLOCK) {
            return;
        }

        let data = Arc::clone(&self.data);
        let registered = hass.services.register(
            DOMAIN,
            SERVICE_SYNC_CLOCK,
            move |_call| {
                let controllers: Vec<Arc<dyn VelbusController>> =
                    data.iter().map(|d| Arc::clone(&d.controller)).collect();
                async move {
                    for controller in controllers {
                        if let Err(err) = controller.sync_clock().await {
                            error!("An error occurred: {}", err);
                        }
                    }
                    Ok(())
                }
            },
            Some(empty_schema()),
        );
        if let Err(e) = registered {
            error!("Registering {}.{} failed: {}", DOMAIN, SERVICE_SYNC_CLOCK, e);
        }
    }

    /// Completion callback of a scan: build the snapshot, store it and
    /// forward the category platforms
    fn scan_callback(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
        runtime: Handle,
    ) -> ScanCallback {
        let data = Arc::clone(&self.data);
        let hass = Arc::downgrade(hass);
        let entry = entry.clone();

        Box::new(move |modules: Vec<Arc<dyn VelbusModule>>| {
            let snapshot = DiscoverySnapshot::from_modules(&modules);
            info!(
                "Velbus scan found {} modules, {} channels",
                modules.len(),
                snapshot.len()
            );

            let modules: HashMap<u8, Arc<dyn VelbusModule>> =
                modules.into_iter().map(|m| (m.address(), m)).collect();

            match data.get_mut(&entry.entry_id) {
                Some(mut slot) if !slot.closing => {
                    slot.discovery = Some(snapshot.clone());
                }
                _ => {
                    debug!("Scan completed after entry {} was unloaded", entry.entry_id);
                    return;
                }
            }

            let entry_id = entry.entry_id.clone();
            let task = runtime.spawn(async move {
                if let Some(hass) = hass.upgrade() {
                    forward_platforms(&hass, &entry, &snapshot, &modules).await;
                }
            });

            match data.get_mut(&entry_id) {
                Some(mut slot) if !slot.closing => slot.forward_task = Some(task),
                _ => task.abort(),
            }
        })
    }
}

async fn forward_platforms(
    hass: &HomeAssistant,
    entry: &ConfigEntry,
    snapshot: &DiscoverySnapshot,
    modules: &HashMap<u8, Arc<dyn VelbusModule>>,
) {
    for category in Category::ALL {
        let platform = hass.platforms.forward_entry_setup(entry, category.as_str());

        let entities: Vec<Arc<dyn Entity>> = snapshot
            .channels(category)
            .iter()
            .filter_map(|(address, channel)| {
                let module = modules.get(address)?;
                Some(Arc::new(VelbusEntity::new(Arc::clone(module), *channel, category))
                    as Arc<dyn Entity>)
            })
            .collect();

        if !entities.is_empty() {
            let added = platform.add_entities(entities).await;
            debug!("Added {} Velbus {} entities", added.len(), category);
        }
    }
}

/// Abort platform forwarding and wait until the task is gone
async fn cancel_forwarding(task: Option<JoinHandle<()>>) {
    if let Some(task) = task {
        task.abort();
        // Cancelled or finished, either way nothing is added afterwards
        let _ = task.await;
    }
}

#[async_trait]
impl Integration for Velbus {
    fn domain(&self) -> &str {
        DOMAIN
    }

    async fn async_setup_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError> {
        let hass = self.hass()?;
        let runtime = Handle::try_current().map_err(|e| SetupError::Failed(e.to_string()))?;
        let port = entry
            .data_str(CONF_PORT)
            .ok_or_else(|| SetupError::Failed("missing port".to_string()))?;

        let controller = self.connector.connect(port).await.map_err(|err| {
            error!("An error occurred: {}", err);
            SetupError::NotReady(err.to_string())
        })?;

        self.data.insert(
            entry.entry_id.clone(),
            VelbusData {
                controller: Arc::clone(&controller),
                discovery: None,
                forward_task: None,
                closing: false,
            },
        );

        if let Err(err) = controller.scan(self.scan_callback(&hass, entry, runtime)) {
            error!("An error occurred: {}", err);
            self.data.remove(&entry.entry_id);
            controller.stop();
            return Err(SetupError::NotReady(err.to_string()));
        }

        self.register_sync_clock(&hass);
        Ok(())
    }

    async fn async_unload_entry(&self, entry: &ConfigEntry) -> Result<bool, SetupError> {
        let hass = self.hass()?;

        let (controller, forward_task) = match self.data.get_mut(&entry.entry_id) {
            Some(mut slot) => {
                slot.closing = true;
                (Some(Arc::clone(&slot.controller)), slot.forward_task.take())
            }
            None => (None, None),
        };
        cancel_forwarding(forward_task).await;

        for category in Category::ALL {
            hass.platforms
                .forward_entry_unload(&entry.entry_id, category.as_str())
                .await;
        }

        if let Some(controller) = controller {
            controller.stop();
        }
        if let Some((_, slot)) = self.data.remove(&entry.entry_id) {
            cancel_forwarding(slot.forward_task).await;
        }

        if self.data.is_empty() {
            hass.services.unregister(DOMAIN, SERVICE_SYNC_CLOCK);
        }

        info!("Unloaded Velbus entry {}", entry.entry_id);
        Ok(true)
    }
}
