//! GeoNet NZ Quakes integration tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::*;
use ha_components::geonetnz_quakes::{
    self, FeedEntry, FeedUpdate, GeonetnzQuakes, QuakesConfig,
};
use ha_config::{load_yaml_string, UnitSystem};
use ha_config_entries::{ConfigEntry, ConfigEntrySource, ConfigEntryState};
use ha_helpers::HomeAssistant;
use serde_json::{json, Value};

const GEO: &str = "geo_location";

fn event_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 9, 22, 8, 0, 0).unwrap()
}

fn entry_1() -> FeedEntry {
    quake_entry("1234", "Title 1", 15.5, (-41.2, 174.7), event_time())
}

fn entry_2() -> FeedEntry {
    FeedEntry::new("2345", "Title 2", 20.5, (-41.1, 174.8))
}

fn entry_3() -> FeedEntry {
    FeedEntry::new("3456", "Title 3", 25.5, (-41.3, 174.6))
}

fn entry_4() -> FeedEntry {
    FeedEntry::new("5678", "Title 4", 12.5, (-41.25, 174.75))
}

struct Setup {
    hass: Arc<HomeAssistant>,
    quakes: Arc<GeonetnzQuakes>,
    factory: Arc<MockFeedFactory>,
    entry_id: String,
}

impl Setup {
    fn feed(&self) -> &MockFeed {
        &self.factory.feed
    }

    fn manager(&self) -> Arc<geonetnz_quakes::FeedEntityManager> {
        self.quakes
            .manager(&self.entry_id)
            .expect("feed manager for loaded entry")
    }

    fn entry_state(&self) -> ConfigEntryState {
        self.hass.config_entries.get(&self.entry_id).unwrap().state
    }
}

/// Start the host, add an entry with `config` and set it up with the feed
/// initially returning `initial`
async fn setup_feed(units: UnitSystem, config: QuakesConfig, initial: FeedUpdate) -> Setup {
    let hass = HomeAssistant::new(test_config(units));
    let factory = MockFeedFactory::new(MockFeed::new(initial));
    let quakes = GeonetnzQuakes::register(&hass, factory.clone());
    hass.start();

    let config = config.with_home(hass.config().home());
    let entry = hass
        .config_entries
        .add(
            ConfigEntry::new(geonetnz_quakes::DOMAIN, config.unique_id())
                .with_data_from(&config)
                .with_unique_id(config.unique_id()),
        )
        .unwrap();
    hass.config_entries.setup(&entry.entry_id).await.unwrap();

    Setup {
        hass,
        quakes,
        factory,
        entry_id: entry.entry_id,
    }
}

async fn wait_for_count(hass: &Arc<HomeAssistant>, expected: usize) {
    let hass = hass.clone();
    wait_for(&format!("{} geo_location entities", expected), move || {
        domain_count(&hass, GEO) == expected
    })
    .await;
}

#[tokio::test]
async fn test_feed_lifecycle() {
    let setup = setup_feed(
        UnitSystem::Metric,
        QuakesConfig {
            radius: 200.0,
            ..QuakesConfig::default()
        },
        FeedUpdate::ok(vec![entry_1(), entry_2(), entry_3()]),
    )
    .await;
    let hass = &setup.hass;
    wait_for_count(hass, 3).await;
    assert_eq!(setup.entry_state(), ConfigEntryState::Loaded);
    assert_eq!(hass.states.entity_count(), 3);

    let state = hass.states.get("geo_location.title_1").unwrap();
    assert_eq!(state.state, "15.5");
    let expected: std::collections::HashMap<String, Value> = [
        ("external_id", json!("1234")),
        ("latitude", json!(-41.2)),
        ("longitude", json!(174.7)),
        ("friendly_name", json!("Title 1")),
        ("locality", json!("Locality 1")),
        ("attribution", json!("Attribution 1")),
        ("time", json!("2018-09-22T08:00:00Z")),
        ("magnitude", json!(5.7)),
        ("depth", json!(10.5)),
        ("mmi", json!(5)),
        ("quality", json!("best")),
        ("unit_of_measurement", json!("km")),
        ("source", json!("geonetnz_quakes")),
        ("icon", json!("mdi:pulse")),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    assert_eq!(state.attributes, expected);

    assert_state(hass, "geo_location.title_2", "20.5");
    let title_2 = hass.states.get("geo_location.title_2").unwrap();
    assert!(!title_2.attributes.contains_key("magnitude"));
    assert!(!title_2.attributes.contains_key("time"));

    let manager = setup.manager();
    let event_1 = manager.get("1234").await.unwrap();

    // Entry 2 disappears, entry 4 is new, entry 1 changes
    let mut updated_1 = entry_1();
    updated_1.distance_to_home = 14.0;
    setup
        .feed()
        .set(FeedUpdate::ok(vec![updated_1, entry_4(), entry_3()]));
    manager.update().await;

    assert_eq!(domain_count(hass, GEO), 3);
    assert!(hass.states.get("geo_location.title_2").is_none());
    assert_state(hass, "geo_location.title_1", "14.0");
    assert_state(hass, "geo_location.title_4", "12.5");
    assert_state(hass, "geo_location.title_3", "25.5");
    assert!(Arc::ptr_eq(&event_1, &manager.get("1234").await.unwrap()));

    // Nothing new: entities stay as they are
    setup.feed().set(FeedUpdate::no_data());
    manager.update().await;
    assert_eq!(domain_count(hass, GEO), 3);
    assert_state(hass, "geo_location.title_1", "14.0");

    // Failed fetch: every entity goes
    setup.feed().set(FeedUpdate::error());
    manager.update().await;
    assert_eq!(domain_count(hass, GEO), 0);
    assert_eq!(manager.entity_count().await, 0);
}

#[tokio::test]
async fn test_feed_parameters() {
    let setup = setup_feed(
        UnitSystem::Metric,
        QuakesConfig {
            radius: 200.0,
            mmi: 4,
            minimum_magnitude: 2.5,
            ..QuakesConfig::default()
        },
        FeedUpdate::no_data(),
    )
    .await;

    let params = setup.factory.params();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].home_coordinates, (HOME_LATITUDE, HOME_LONGITUDE));
    assert_eq!(params[0].filter_radius, 200.0);
    assert_eq!(params[0].filter_minimum_magnitude, 2.5);
    assert_eq!(params[0].mmi, 4);
}

#[tokio::test]
async fn test_imperial_units() {
    let setup = setup_feed(
        UnitSystem::Imperial,
        QuakesConfig {
            radius: 200.0,
            ..QuakesConfig::default()
        },
        FeedUpdate::ok(vec![entry_1()]),
    )
    .await;
    let hass = &setup.hass;
    wait_for_count(hass, 1).await;

    let params = setup.factory.params();
    assert!((params[0].filter_radius - 321.8688).abs() < 1e-9);

    let state = hass.states.get("geo_location.title_1").unwrap();
    assert_eq!(state.state, "9.6");
    assert_eq!(state.attributes["unit_of_measurement"], json!("mi"));
}

#[tokio::test]
async fn test_unit_change_applies_on_next_write() {
    let setup = setup_feed(
        UnitSystem::Metric,
        QuakesConfig::default(),
        FeedUpdate::ok(vec![entry_1()]),
    )
    .await;
    let hass = &setup.hass;
    wait_for_count(hass, 1).await;
    assert_state(hass, "geo_location.title_1", "15.5");

    hass.set_unit_system(UnitSystem::Imperial);
    setup.manager().update().await;

    assert_state(hass, "geo_location.title_1", "9.6");
}

#[tokio::test]
async fn test_polling_waits_for_start() {
    let hass = HomeAssistant::new(test_config(UnitSystem::Metric));
    let feed = MockFeed::new(FeedUpdate::ok(vec![entry_1()]));
    let factory = MockFeedFactory::new(feed.clone());
    GeonetnzQuakes::register(&hass, factory);

    let config = QuakesConfig::default().with_home(hass.config().home());
    let entry = hass
        .config_entries
        .add(ConfigEntry::new(geonetnz_quakes::DOMAIN, config.unique_id()).with_data_from(&config))
        .unwrap();
    hass.config_entries.setup(&entry.entry_id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(feed.calls(), 0);
    assert_eq!(domain_count(&hass, GEO), 0);

    hass.start();
    wait_for_count(&hass, 1).await;
    assert_eq!(feed.calls(), 1);
}

#[tokio::test]
async fn test_events_expire() {
    let mut expiring = entry_1();
    expiring.time = Some(Utc::now() - chrono::Duration::milliseconds(59_700));
    let setup = setup_feed(
        UnitSystem::Metric,
        QuakesConfig {
            expire_after: Some(60),
            ..QuakesConfig::default()
        },
        FeedUpdate::ok(vec![expiring, entry_2()]),
    )
    .await;
    let hass = &setup.hass;
    wait_for_count(hass, 2).await;

    wait_for_count(hass, 1).await;
    assert!(hass.states.get("geo_location.title_1").is_none());
    assert_state(hass, "geo_location.title_2", "20.5");
    assert!(setup.manager().get("1234").await.is_none());
}

#[tokio::test]
async fn test_already_expired_events_are_skipped() {
    let mut stale = entry_1();
    stale.time = Some(Utc::now() - chrono::Duration::days(2));
    let setup = setup_feed(
        UnitSystem::Metric,
        QuakesConfig {
            expire_after: Some(60),
            ..QuakesConfig::default()
        },
        FeedUpdate::ok(vec![stale.clone()]),
    )
    .await;
    let hass = &setup.hass;
    let manager = setup.manager();
    wait_for("first poll", {
        let feed = setup.factory.feed.clone();
        move || feed.calls() >= 1
    })
    .await;

    let mut changes = hass.bus.subscribe(ha_core::events::STATE_CHANGED);
    for _ in 0..3 {
        manager.update().await;
    }

    assert_eq!(domain_count(hass, GEO), 0);
    assert_eq!(manager.entity_count().await, 0);
    assert!(changes.try_recv().is_err());

    // A fresh event next to the stale one is still created
    setup.feed().set(FeedUpdate::ok(vec![stale, entry_2()]));
    manager.update().await;
    assert_eq!(domain_count(hass, GEO), 1);
    assert_state(hass, "geo_location.title_2", "20.5");
}

#[tokio::test]
async fn test_latest_poll_wins() {
    let hass = HomeAssistant::new(test_config(UnitSystem::Metric));
    let entry = ConfigEntry::new(geonetnz_quakes::DOMAIN, "Feed");
    let platform = hass.platforms.forward_entry_setup(&entry, GEO);
    let feed = SlowFeed::new(vec![
        (
            Duration::from_millis(100),
            FeedUpdate::ok(vec![entry_1(), entry_2()]),
        ),
        (Duration::ZERO, FeedUpdate::ok(vec![entry_3()])),
    ]);
    let manager = geonetnz_quakes::FeedEntityManager::new(
        feed,
        platform,
        Duration::from_secs(300),
        None,
    );

    tokio::join!(manager.update(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.update().await;
    });

    assert_eq!(domain_count(&hass, GEO), 1);
    assert_state(&hass, "geo_location.title_3", "25.5");
    assert_eq!(
        manager.entity_ids().await,
        vec!["geo_location.title_3".to_string()]
    );
}

#[tokio::test]
async fn test_unload_removes_entities() {
    let setup = setup_feed(
        UnitSystem::Metric,
        QuakesConfig::default(),
        FeedUpdate::ok(vec![entry_1(), entry_2()]),
    )
    .await;
    let hass = &setup.hass;
    wait_for_count(hass, 2).await;
    let manager = setup.manager();

    assert!(hass.config_entries.unload(&setup.entry_id).await.unwrap());

    assert_eq!(setup.entry_state(), ConfigEntryState::NotLoaded);
    assert_eq!(domain_count(hass, GEO), 0);
    assert!(setup.quakes.manager(&setup.entry_id).is_none());
    assert_eq!(manager.entity_count().await, 0);
    assert!(hass.platforms.get(&setup.entry_id, GEO).is_none());
}

#[tokio::test]
async fn test_yaml_import() {
    let hass = HomeAssistant::new(test_config(UnitSystem::Metric));
    let factory = MockFeedFactory::new(MockFeed::new(FeedUpdate::no_data()));
    GeonetnzQuakes::register(&hass, factory.clone());

    let config = load_yaml_string("geonetnz_quakes:\n  radius: 25\n  mmi: 2\n").unwrap();
    geonetnz_quakes::async_setup(&hass, &config).await.unwrap();
    geonetnz_quakes::async_setup(&hass, &config).await.unwrap();

    let entries = hass.config_entries.get_by_domain(geonetnz_quakes::DOMAIN);
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.title, "-41.2, 174.7");
    assert_eq!(entry.unique_id.as_deref(), Some("-41.2, 174.7"));
    assert_eq!(entry.source, ConfigEntrySource::Import);
    assert_eq!(entry.state, ConfigEntryState::Loaded);

    let stored: QuakesConfig = entry.data_as().unwrap();
    assert_eq!(stored.radius, 25.0);
    assert_eq!(stored.mmi, 2);
    assert_eq!(stored.latitude, Some(HOME_LATITUDE));
    assert_eq!(factory.params().len(), 1);
}

#[tokio::test]
async fn test_yaml_rejects_invalid_mmi() {
    let hass = HomeAssistant::new(test_config(UnitSystem::Metric));
    let config = load_yaml_string("geonetnz_quakes:\n  mmi: 12\n").unwrap();

    assert!(geonetnz_quakes::async_setup(&hass, &config).await.is_err());
    assert!(hass.config_entries.is_empty());
}
