//! Seam to the GeoNet NZ quakes GeoJSON feed client
//!
//! Fetching, parsing and distance filtering are done by the feed client;
//! this crate only consumes its results.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Outcome of one feed update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// Entries were fetched
    Ok,
    /// The fetch succeeded but reported nothing new; current entries stand
    OkNoData,
    /// The fetch failed
    Error,
}

/// One earthquake
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub external_id: String,
    pub title: String,
    /// Kilometers from the feed's center
    pub distance_to_home: f64,
    /// (latitude, longitude)
    pub coordinates: (f64, f64),
    pub attribution: Option<String>,
    /// Kilometers below the surface
    pub depth: Option<f64>,
    pub magnitude: Option<f64>,
    pub mmi: Option<i32>,
    pub locality: Option<String>,
    pub quality: Option<String>,
    pub time: Option<DateTime<Utc>>,
}

impl FeedEntry {
    pub fn new(
        external_id: impl Into<String>,
        title: impl Into<String>,
        distance_to_home: f64,
        coordinates: (f64, f64),
    ) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            distance_to_home,
            coordinates,
            attribution: None,
            depth: None,
            magnitude: None,
            mmi: None,
            locality: None,
            quality: None,
            time: None,
        }
    }
}

/// Result of [`QuakesFeed::update`]; `entries` is `None` unless the status is `Ok`
#[derive(Debug, Clone, PartialEq)]
pub struct FeedUpdate {
    pub status: FeedStatus,
    pub entries: Option<Vec<FeedEntry>>,
}

impl FeedUpdate {
    pub fn ok(entries: Vec<FeedEntry>) -> Self {
        Self {
            status: FeedStatus::Ok,
            entries: Some(entries),
        }
    }

    pub fn no_data() -> Self {
        Self {
            status: FeedStatus::OkNoData,
            entries: None,
        }
    }

    pub fn error() -> Self {
        Self {
            status: FeedStatus::Error,
            entries: None,
        }
    }
}

/// Filters applied by the feed client
#[derive(Debug, Clone, PartialEq)]
pub struct FeedParams {
    /// (latitude, longitude) of the feed's center
    pub home_coordinates: (f64, f64),
    /// Kilometers
    pub filter_radius: f64,
    pub filter_minimum_magnitude: f64,
    pub mmi: i32,
}

#[async_trait]
pub trait QuakesFeed: Send + Sync {
    async fn update(&self) -> FeedUpdate;
}

/// Creates feed clients
pub trait QuakesFeedFactory: Send + Sync {
    fn create(&self, params: FeedParams) -> Arc<dyn QuakesFeed>;
}
