//! In-memory quakes feed

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ha_components::geonetnz_quakes::{
    FeedEntry, FeedParams, FeedUpdate, QuakesFeed, QuakesFeedFactory,
};

/// A feed returning whatever update was last set
pub struct MockFeed {
    current: Mutex<FeedUpdate>,
    calls: AtomicUsize,
}

impl MockFeed {
    pub fn new(update: FeedUpdate) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(update),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, update: FeedUpdate) {
        *self.current.lock().unwrap() = update;
    }

    /// Number of updates served
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuakesFeed for MockFeed {
    async fn update(&self) -> FeedUpdate {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.current.lock().unwrap().clone()
    }
}

/// A feed answering each update after its own delay
///
/// Responses are assigned in call order; once used up every update returns
/// no data.
pub struct SlowFeed {
    responses: Mutex<VecDeque<(Duration, FeedUpdate)>>,
}

impl SlowFeed {
    pub fn new(responses: Vec<(Duration, FeedUpdate)>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl QuakesFeed for SlowFeed {
    async fn update(&self) -> FeedUpdate {
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some((delay, update)) => {
                tokio::time::sleep(delay).await;
                update
            }
            None => FeedUpdate::no_data(),
        }
    }
}

/// Hands out one shared [`MockFeed`] and records the parameters it was asked for
pub struct MockFeedFactory {
    pub feed: Arc<MockFeed>,
    params: Mutex<Vec<FeedParams>>,
}

impl MockFeedFactory {
    pub fn new(feed: Arc<MockFeed>) -> Arc<Self> {
        Arc::new(Self {
            feed,
            params: Mutex::new(Vec::new()),
        })
    }

    pub fn params(&self) -> Vec<FeedParams> {
        self.params.lock().unwrap().clone()
    }
}

impl QuakesFeedFactory for MockFeedFactory {
    fn create(&self, params: FeedParams) -> Arc<dyn QuakesFeed> {
        self.params.lock().unwrap().push(params);
        self.feed.clone()
    }
}

/// A feed entry with every optional field filled in
pub fn quake_entry(
    external_id: &str,
    title: &str,
    distance_to_home: f64,
    coordinates: (f64, f64),
    time: DateTime<Utc>,
) -> FeedEntry {
    FeedEntry {
        attribution: Some(format!("Attribution {}", &title[title.len() - 1..])),
        depth: Some(10.5),
        magnitude: Some(5.7),
        mmi: Some(5),
        locality: Some(format!("Locality {}", &title[title.len() - 1..])),
        quality: Some("best".to_string()),
        time: Some(time),
        ..FeedEntry::new(external_id, title, distance_to_home, coordinates)
    }
}
