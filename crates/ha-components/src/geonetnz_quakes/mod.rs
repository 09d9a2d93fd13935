//! GeoNet NZ Quakes integration
//!
//! Polls the GeoNet NZ earthquake feed and keeps one `geo_location` entity
//! per earthquake within the configured radius.

mod config;
mod entity;
mod feed;
mod manager;

pub use config::{
    QuakesConfig, DEFAULT_MINIMUM_MAGNITUDE, DEFAULT_MMI, DEFAULT_RADIUS, DEFAULT_SCAN_INTERVAL,
};
pub use entity::{
    QuakeEvent, ATTR_ATTRIBUTION, ATTR_DEPTH, ATTR_EXTERNAL_ID, ATTR_LOCALITY, ATTR_MAGNITUDE,
    ATTR_MMI, ATTR_QUALITY, ATTR_TIME,
};
pub use feed::{FeedEntry, FeedParams, FeedStatus, FeedUpdate, QuakesFeed, QuakesFeedFactory};
pub use manager::FeedEntityManager;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use ha_config::{integration_config, ConfigError, UnitSystem, Value, LENGTH_MILES};
use ha_config_entries::{ConfigEntry, ConfigEntrySource, Integration, SetupError};
use ha_helpers::HomeAssistant;
use tracing::{debug, info, warn};

use crate::geo_location;

pub const DOMAIN: &str = "geonetnz_quakes";

/// Import the YAML configuration as a config entry and set it up
///
/// Missing coordinates are taken from the home location. A feed already
/// configured for the same coordinates is left alone.
pub async fn async_setup(hass: &Arc<HomeAssistant>, config: &Value) -> Result<(), ConfigError> {
    let Some(conf) = integration_config::<QuakesConfig>(config, DOMAIN)? else {
        return Ok(());
    };
    let conf = conf.with_home(hass.config().home());
    conf.validate()?;

    let unique_id = conf.unique_id();
    let entry = ConfigEntry::new(DOMAIN, unique_id.clone())
        .with_data_from(&conf)
        .with_unique_id(unique_id)
        .with_source(ConfigEntrySource::Import);

    let entry = match hass.config_entries.add(entry) {
        Ok(entry) => entry,
        Err(e) => {
            debug!("Quakes feed already configured: {}", e);
            return Ok(());
        }
    };

    if let Err(e) = hass.config_entries.setup(&entry.entry_id).await {
        warn!("Setting up imported quakes feed failed: {}", e);
    }
    Ok(())
}

/// Radius for the feed client, which filters in kilometers
pub fn filter_radius(radius: f64, units: &UnitSystem) -> f64 {
    match units {
        UnitSystem::Imperial => UnitSystem::Metric.length(radius, LENGTH_MILES),
        UnitSystem::Metric => radius,
    }
}

/// The GeoNet NZ Quakes integration
pub struct GeonetnzQuakes {
    hass: Weak<HomeAssistant>,
    factory: Arc<dyn QuakesFeedFactory>,
    managers: DashMap<String, Arc<FeedEntityManager>>,
}

impl GeonetnzQuakes {
    /// Create the integration and register it with the host's config entries
    pub fn register(hass: &Arc<HomeAssistant>, factory: Arc<dyn QuakesFeedFactory>) -> Arc<Self> {
        let integration = Arc::new(Self {
            hass: Arc::downgrade(hass),
            factory,
            managers: DashMap::new(),
        });
        hass.config_entries.register_integration(integration.clone());
        integration
    }

    /// Feed manager of a loaded entry
    pub fn manager(&self, entry_id: &str) -> Option<Arc<FeedEntityManager>> {
        self.managers.get(entry_id).map(|m| Arc::clone(m.value()))
    }

    fn hass(&self) -> Result<Arc<HomeAssistant>, SetupError> {
        self.hass
            .upgrade()
            .ok_or_else(|| SetupError::Failed("host is shutting down".to_string()))
    }
}

#[async_trait]
impl Integration for GeonetnzQuakes {
    fn domain(&self) -> &str {
        DOMAIN
    }

    async fn async_setup_entry(&self, entry: &ConfigEntry) -> Result<(), SetupError> {
        let hass = self.hass()?;
        let conf: QuakesConfig = entry
            .data_as()
            .map_err(|e| SetupError::Failed(format!("invalid entry data: {}", e)))?;
        let conf = conf.with_home(hass.config().home());
        conf.validate()
            .map_err(|e| SetupError::Failed(e.to_string()))?;

        let params = FeedParams {
            home_coordinates: (
                conf.latitude.unwrap_or_default(),
                conf.longitude.unwrap_or_default(),
            ),
            filter_radius: filter_radius(conf.radius, &hass.unit_system()),
            filter_minimum_magnitude: conf.minimum_magnitude,
            mmi: conf.mmi,
        };
        debug!(
            "Creating quakes feed around {:?} within {} km",
            params.home_coordinates, params.filter_radius
        );

        let feed = self.factory.create(params);
        let platform = hass.platforms.forward_entry_setup(entry, geo_location::DOMAIN);
        let manager = FeedEntityManager::new(
            feed,
            platform,
            conf.scan_interval(),
            conf.expire_after(),
        );
        manager.start(&hass.bus);

        if let Some(previous) = self.managers.insert(entry.entry_id.clone(), manager) {
            previous.stop().await;
        }

        info!("Quakes feed {} set up", entry.title);
        Ok(())
    }

    async fn async_unload_entry(&self, entry: &ConfigEntry) -> Result<bool, SetupError> {
        let hass = self.hass()?;

        if let Some((_, manager)) = self.managers.remove(&entry.entry_id) {
            manager.stop().await;
        }
        hass.platforms
            .forward_entry_unload(&entry.entry_id, geo_location::DOMAIN)
            .await;

        info!("Quakes feed {} unloaded", entry.title);
        Ok(true)
    }
}
