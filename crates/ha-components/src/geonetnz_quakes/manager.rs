//! Reconciles feed updates with the tracked geo_location entities

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ha_core::events::HOMEASSISTANT_START;
use ha_event_bus::EventBus;
use ha_helpers::{Entity, EntityPlatform};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::entity::QuakeEvent;
use super::feed::{FeedEntry, FeedStatus, QuakesFeed};

/// Time left until an event that happened at `time` expires
fn expiry_delay(time: DateTime<Utc>, expire_after: Duration) -> Duration {
    let now = Utc::now();
    match (now - time).to_std() {
        Ok(age) => expire_after.saturating_sub(age),
        // Event time ahead of the local clock
        Err(_) => expire_after.saturating_add((time - now).to_std().unwrap_or_default()),
    }
}

struct Tracked {
    event: Arc<QuakeEvent>,
    entity_id: String,
    expiry: Option<JoinHandle<()>>,
}

impl Tracked {
    fn cancel_expiry(&mut self) {
        if let Some(task) = self.expiry.take() {
            task.abort();
        }
    }
}

/// Owns the feed of one config entry and the entities created from it
pub struct FeedEntityManager {
    feed: Arc<dyn QuakesFeed>,
    platform: Arc<EntityPlatform>,
    scan_interval: Duration,
    expire_after: Option<Duration>,
    /// external_id -> entity; the lock also serializes updates
    tracked: Mutex<HashMap<String, Tracked>>,
    poll_task: SyncMutex<Option<JoinHandle<()>>>,
}

impl FeedEntityManager {
    pub fn new(
        feed: Arc<dyn QuakesFeed>,
        platform: Arc<EntityPlatform>,
        scan_interval: Duration,
        expire_after: Option<Duration>,
    ) -> Arc<Self> {
        Arc::new(Self {
            feed,
            platform,
            scan_interval,
            expire_after,
            tracked: Mutex::new(HashMap::new()),
            poll_task: SyncMutex::new(None),
        })
    }

    /// Start polling once the host is running
    ///
    /// Polls immediately when `homeassistant_start` has already been fired,
    /// otherwise waits for it. Then polls every scan interval.
    pub fn start(self: &Arc<Self>, bus: &EventBus) {
        let mut started = bus.subscribe(HOMEASSISTANT_START);
        let already_running = bus.is_started();
        let manager = Arc::downgrade(self);
        let scan_interval = self.scan_interval;

        let task = tokio::spawn(async move {
            if !already_running {
                // A closed bus means shutdown; lagging still means it fired
                if let Err(tokio::sync::broadcast::error::RecvError::Closed) =
                    started.recv().await
                {
                    return;
                }
            }

            let mut ticker = tokio::time::interval(scan_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(this) = manager.upgrade() else {
                    break;
                };
                this.update().await;
            }
        });

        if let Some(previous) = self.poll_task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Poll the feed once and reconcile the entities
    ///
    /// Polls run one at a time in the order they were started.
    pub async fn update(self: &Arc<Self>) {
        let mut tracked = self.tracked.lock().await;
        let update = self.feed.update().await;

        match (update.status, update.entries) {
            (FeedStatus::Ok, entries) => {
                let entries = entries.unwrap_or_default();
                debug!("Feed update returned {} entries", entries.len());
                self.reconcile(&mut tracked, entries).await;
            }
            (FeedStatus::OkNoData, _) => {
                debug!("Feed update returned no new data, keeping {} entities", tracked.len());
            }
            (FeedStatus::Error, _) => {
                debug!("Feed update failed, removing {} entities", tracked.len());
                self.reconcile(&mut tracked, Vec::new()).await;
            }
        }
    }

    async fn reconcile(
        self: &Arc<Self>,
        tracked: &mut HashMap<String, Tracked>,
        entries: Vec<FeedEntry>,
    ) {
        let incoming: HashMap<String, FeedEntry> = entries
            .into_iter()
            .map(|e| (e.external_id.clone(), e))
            .collect();

        let outdated: Vec<String> = tracked
            .keys()
            .filter(|id| !incoming.contains_key(*id))
            .cloned()
            .collect();
        for external_id in outdated {
            if let Some(mut entry) = tracked.remove(&external_id) {
                entry.cancel_expiry();
                self.platform.remove_entity(&entry.entity_id).await;
                debug!("Removed entity for {}", external_id);
            }
        }

        for (external_id, entry) in incoming {
            if let Some(existing) = tracked.get(&external_id) {
                existing.event.update(entry);
                debug!("Updated entity for {}", external_id);
                continue;
            }

            let delay = match (self.expire_after, entry.time) {
                (Some(expire_after), Some(time)) => Some(expiry_delay(time, expire_after)),
                _ => None,
            };
            if delay.is_some_and(|d| d.is_zero()) {
                debug!("Skipping {}, already expired", external_id);
                continue;
            }

            let event = Arc::new(QuakeEvent::new(entry));
            let added = self
                .platform
                .add_entities(vec![event.clone() as Arc<dyn Entity>])
                .await;
            let Some(entity_id) = added.into_iter().next() else {
                continue;
            };
            debug!("Created {} for {}", entity_id, external_id);

            let expiry = delay.map(|d| self.schedule_expiry(external_id.clone(), d));

            tracked.insert(
                external_id,
                Tracked {
                    event,
                    entity_id: entity_id.to_string(),
                    expiry,
                },
            );
        }
    }

    fn schedule_expiry(self: &Arc<Self>, external_id: String, delay: Duration) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(manager) = manager.upgrade() {
                manager.expire(&external_id).await;
            }
        })
    }

    async fn expire(&self, external_id: &str) {
        let mut tracked = self.tracked.lock().await;
        // The expiry task is the caller, so its handle is dropped, not aborted
        if let Some(entry) = tracked.remove(external_id) {
            self.platform.remove_entity(&entry.entity_id).await;
            info!("Removed expired entity {}", entry.entity_id);
        }
    }

    /// Stop polling and cancel every pending expiry
    pub async fn stop(&self) {
        let poll_task = self.poll_task.lock().take();
        if let Some(task) = poll_task {
            task.abort();
        }
        let mut tracked = self.tracked.lock().await;
        for (_, mut entry) in tracked.drain() {
            entry.cancel_expiry();
        }
    }

    /// entity_ids of the tracked entities
    pub async fn entity_ids(&self) -> Vec<String> {
        let tracked = self.tracked.lock().await;
        tracked.values().map(|t| t.entity_id.clone()).collect()
    }

    pub async fn entity_count(&self) -> usize {
        self.tracked.lock().await.len()
    }

    /// The entity tracked for an external id
    pub async fn get(&self, external_id: &str) -> Option<Arc<QuakeEvent>> {
        let tracked = self.tracked.lock().await;
        tracked.get(external_id).map(|t| Arc::clone(&t.event))
    }
}
