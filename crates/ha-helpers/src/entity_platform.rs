//! Entity platforms
//!
//! An [`EntityPlatform`] holds the entities one config entry contributes to
//! one platform domain (`switch`, `geo_location`, ...). Integrations obtain
//! it by forwarding their entry through [`EntityPlatforms`].

use std::sync::Arc;

use dashmap::DashMap;
use ha_config_entries::ConfigEntry;
use ha_core::{slugify, EntityId};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::entity::{Entity, EntityHandle, StateWriter};

struct PlatformEntity {
    entity: Arc<dyn Entity>,
    handle: EntityHandle,
}

/// Entities of one platform domain for one integration entry
pub struct EntityPlatform {
    domain: String,
    integration: String,
    entry_id: Option<String>,
    writer: StateWriter,
    /// entity_id -> entity
    entities: DashMap<String, PlatformEntity>,
    /// unique_id -> entity_id
    unique_ids: DashMap<String, String>,
    /// Serializes entity_id allocation
    id_lock: Mutex<()>,
}

impl EntityPlatform {
    pub(crate) fn new(
        domain: impl Into<String>,
        integration: impl Into<String>,
        entry_id: Option<String>,
        writer: StateWriter,
    ) -> Self {
        Self {
            domain: domain.into(),
            integration: integration.into(),
            entry_id,
            writer,
            entities: DashMap::new(),
            unique_ids: DashMap::new(),
            id_lock: Mutex::new(()),
        }
    }

    /// Platform domain, e.g. `geo_location`
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Integration providing the entities, e.g. `geonetnz_quakes`
    pub fn integration(&self) -> &str {
        &self.integration
    }

    pub fn entry_id(&self) -> Option<&str> {
        self.entry_id.as_deref()
    }

    /// Add entities to the platform
    ///
    /// Each entity gets an entity_id derived from its name, writes its first
    /// state and then receives `async_added_to_hass`. Entities whose unique_id
    /// is already present on this platform are skipped. Returns the entity_ids
    /// of the entities actually added.
    pub async fn add_entities(&self, entities: Vec<Arc<dyn Entity>>) -> Vec<EntityId> {
        let mut added = Vec::with_capacity(entities.len());

        for entity in entities {
            let Some(handle) = self.register(&entity) else {
                continue;
            };
            added.push(handle.entity_id().clone());
            entity.async_added_to_hass(handle).await;
        }

        added
    }

    /// Allocate an entity_id, track the entity and write its first state
    fn register(&self, entity: &Arc<dyn Entity>) -> Option<EntityHandle> {
        let _guard = self.id_lock.lock();
        let unique_id = entity.unique_id();

        if let Some(ref unique_id) = unique_id {
            if let Some(existing) = self.unique_ids.get(unique_id) {
                warn!(
                    platform = %self.domain,
                    "Platform {} does not generate unique IDs. ID {} already exists - ignoring {}",
                    self.integration,
                    unique_id,
                    existing.value()
                );
                return None;
            }
        }

        let entity_id = match self.generate_entity_id(entity.as_ref()) {
            Some(entity_id) => entity_id,
            None => {
                warn!(
                    platform = %self.domain,
                    "Cannot derive an entity_id for entity of {} (unique_id {:?})",
                    self.integration,
                    unique_id
                );
                return None;
            }
        };

        let handle = EntityHandle::new(entity_id.clone(), entity, self.writer.clone());
        let key = entity_id.to_string();

        self.entities.insert(
            key.clone(),
            PlatformEntity {
                entity: Arc::clone(entity),
                handle: handle.clone(),
            },
        );
        if let Some(unique_id) = unique_id {
            self.unique_ids.insert(unique_id, key);
        }

        self.writer.write(&entity_id, entity.as_ref());
        debug!(entity_id = %entity_id, "Added entity");

        Some(handle)
    }

    fn generate_entity_id(&self, entity: &dyn Entity) -> Option<EntityId> {
        let name_slug = entity.name().map(|n| slugify(&n)).unwrap_or_default();
        let object_id = if !name_slug.is_empty() {
            name_slug
        } else if let Some(unique_id) = entity.unique_id() {
            slugify(&format!("{} {}", self.integration, unique_id))
        } else {
            slugify(&self.integration)
        };

        let base = EntityId::new(self.domain.clone(), object_id).ok()?;
        let taken = |id: &EntityId| {
            self.entities.contains_key(&id.to_string()) || self.writer.is_taken(id)
        };

        if !taken(&base) {
            return Some(base);
        }
        (2..)
            .map(|n| base.with_suffix(n))
            .find(|candidate| !taken(candidate))
    }

    /// Remove one entity and its state
    ///
    /// Returns false when the entity is not part of this platform.
    pub async fn remove_entity(&self, entity_id: &str) -> bool {
        let Some((_, removed)) = self.entities.remove(entity_id) else {
            return false;
        };
        if let Some(unique_id) = removed.entity.unique_id() {
            self.unique_ids.remove(&unique_id);
        }

        removed.handle.mark_removed();
        removed.entity.async_will_remove_from_hass().await;
        self.writer.remove(removed.handle.entity_id());

        debug!(entity_id = %entity_id, "Removed entity");
        true
    }

    /// Remove every entity of the platform
    pub async fn async_reset(&self) {
        let entity_ids = self.entity_ids();
        for entity_id in &entity_ids {
            self.remove_entity(entity_id).await;
        }
        if !entity_ids.is_empty() {
            debug!(
                platform = %self.domain,
                integration = %self.integration,
                "Removed {} entities",
                entity_ids.len()
            );
        }
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.entities.iter().map(|r| r.key().clone()).collect()
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<dyn Entity>> {
        self.entities.get(entity_id).map(|r| Arc::clone(&r.entity))
    }

    /// entity_id of the entity with the given unique_id
    pub fn entity_id_for(&self, unique_id: &str) -> Option<String> {
        self.unique_ids.get(unique_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Platforms forwarded by config entries, keyed by (entry_id, platform)
pub struct EntityPlatforms {
    writer: StateWriter,
    platforms: DashMap<(String, String), Arc<EntityPlatform>>,
}

impl EntityPlatforms {
    pub(crate) fn new(writer: StateWriter) -> Self {
        Self {
            writer,
            platforms: DashMap::new(),
        }
    }

    /// Set up `platform` for a config entry, returning the existing platform
    /// when it is already set up
    pub fn forward_entry_setup(&self, entry: &ConfigEntry, platform: &str) -> Arc<EntityPlatform> {
        let key = (entry.entry_id.clone(), platform.to_string());
        let platform = self.platforms.entry(key).or_insert_with(|| {
            info!(
                "Setting up {}.{} for entry {}",
                entry.domain, platform, entry.entry_id
            );
            Arc::new(EntityPlatform::new(
                platform,
                entry.domain.clone(),
                Some(entry.entry_id.clone()),
                self.writer.clone(),
            ))
        });
        Arc::clone(platform.value())
    }

    /// Unload `platform` for a config entry, removing its entities
    ///
    /// Returns false when the platform was not set up for the entry.
    pub async fn forward_entry_unload(&self, entry_id: &str, platform: &str) -> bool {
        let Some((_, platform)) = self
            .platforms
            .remove(&(entry_id.to_string(), platform.to_string()))
        else {
            return false;
        };

        platform.async_reset().await;
        debug!(
            "Unloaded {}.{} for entry {}",
            platform.integration(),
            platform.domain(),
            entry_id
        );
        true
    }

    pub fn get(&self, entry_id: &str, platform: &str) -> Option<Arc<EntityPlatform>> {
        self.platforms
            .get(&(entry_id.to_string(), platform.to_string()))
            .map(|r| Arc::clone(r.value()))
    }

    pub fn platforms_for_entry(&self, entry_id: &str) -> Vec<Arc<EntityPlatform>> {
        self.platforms
            .iter()
            .filter(|r| r.key().0 == entry_id)
            .map(|r| Arc::clone(r.value()))
            .collect()
    }
}
