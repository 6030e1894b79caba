//! Reconciliation passes against PostgreSQL.
//!
//! Runs only when `DATABASE_URL` points at a disposable database; the
//! migrations are applied on connect.

#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;

use bikeshare_tracker::domain::{EventBus, Feed, NewFeed, NewFeedUpdate, PassReport, UpdateState};
use bikeshare_tracker::error::TrackerError;
use bikeshare_tracker::persistence::{IntervalClose, PostgresStore, StationStore};
use bikeshare_tracker::reconcile::RawStationRecord;
use bikeshare_tracker::service::{ABANDONED_REASON, PassOptions, RawSnapshot, ReconcileService};

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0)
        .single()
        .unwrap_or_default()
}

fn record(value: Value) -> RawStationRecord {
    match value {
        Value::Object(map) => map,
        _ => panic!("record must be an object"),
    }
}

fn station(local_id: &str, la: &str, lo: &str, da: &str) -> RawStationRecord {
    record(json!({
        "id": local_id,
        "n": "Main St",
        "la": la,
        "lo": lo,
        "da": da,
        "dx": "12",
        "ba": "1",
        "bx": "0",
    }))
}

fn snapshot(minute: u32, stations: Vec<RawStationRecord>) -> RawSnapshot {
    RawSnapshot {
        source_timestamp: Some(at(minute)),
        scheme_suspended: None,
        stations,
    }
}

struct Harness {
    store: Arc<PostgresStore>,
    service: ReconcileService,
    feed: Feed,
}

async fn harness() -> Option<Harness> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let Ok(pool) = PgPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&url)
        .await
    else {
        panic!("could not connect to {url}");
    };
    if let Err(err) = sqlx::migrate!().run(&pool).await {
        panic!("migrations failed: {err}");
    }

    let store = Arc::new(PostgresStore::new(pool));
    let shared: Arc<PostgresStore> = Arc::clone(&store);
    let service = ReconcileService::new(shared, EventBus::new(256), PassOptions::default());
    let Ok(feed) = service
        .create_feed(NewFeed {
            short_name: format!("pg-{}", uuid::Uuid::new_v4()),
            url: "https://example.org/bixi.json".to_string(),
            other: json!({}),
        })
        .await
    else {
        panic!("create_feed failed");
    };
    Some(Harness {
        store,
        service,
        feed,
    })
}

impl Harness {
    async fn pass(&self, snapshot: RawSnapshot) -> PassReport {
        match self.service.run_update(self.feed.id, snapshot).await {
            Ok(report) => report,
            Err(err) => panic!("pass failed to run: {err}"),
        }
    }
}

#[tokio::test]
async fn high_precision_coordinates_stay_unchanged() {
    let Some(h) = harness().await else {
        return;
    };
    let main = || station("42", "45.50171234567891", "-73.56731234567891", "3");

    let first = h.pass(snapshot(0, vec![main()])).await;
    assert_eq!(first.state, UpdateState::Ended);
    assert_eq!(first.classifications.new, 1);

    for minute in [5, 10] {
        let report = h.pass(snapshot(minute, vec![main()])).await;
        assert_eq!(report.state, UpdateState::Ended);
        assert_eq!(report.classifications.unchanged, 1, "pass at minute {minute}");
    }

    let Ok(stations) = h.store.stations_for_feed(h.feed.id).await else {
        panic!("stations failed");
    };
    let [stored] = stations.as_slice() else {
        panic!("expected one station");
    };
    assert_eq!(stored.properties.lat, Some(45.501_712_345_678_91));
    assert_eq!(stored.properties.lon, Some(-73.567_312_345_678_91));

    let Ok(history) = h.store.station_history(stored.id).await else {
        panic!("history failed");
    };
    let Ok(statuses) = h.store.station_statuses(stored.id).await else {
        panic!("statuses failed");
    };
    assert_eq!(history.len(), 1);
    assert_eq!(statuses.len(), 1);
}

#[tokio::test]
async fn missing_station_closes_then_reopens() {
    let Some(h) = harness().await else {
        return;
    };
    let main = |da: &str| station("42", "45.5017", "-73.5673", da);
    let oak = || station("7", "45.52", "-73.58", "5");

    h.pass(snapshot(0, vec![main("3"), oak()])).await;
    let report = h.pass(snapshot(5, vec![main("4")])).await;
    assert_eq!(report.state, UpdateState::Ended);
    assert_eq!(report.classifications.status_changed, 1);
    assert_eq!(report.missing_closed, 1);

    let Ok(stations) = h.store.stations_for_feed(h.feed.id).await else {
        panic!("stations failed");
    };
    let Some(gone) = stations.iter().find(|s| s.properties.local_id == "7") else {
        panic!("station 7 missing");
    };
    let Ok(Some(closed)) = h.store.latest_station_history(gone.id).await else {
        panic!("history missing");
    };
    assert_eq!(closed.valid_to, Some(at(5)));

    let report = h.pass(snapshot(10, vec![main("4"), oak()])).await;
    assert_eq!(report.state, UpdateState::Ended);
    assert_eq!(report.classifications.property_and_status_changed, 1);

    let Ok(history) = h.store.station_history(gone.id).await else {
        panic!("history failed");
    };
    let [first, second] = history.as_slice() else {
        panic!("expected two history rows");
    };
    assert_eq!(first.valid_to, Some(at(5)));
    assert_eq!(second.valid_from, at(10));
    assert!(second.is_open());
    assert_eq!(second.feed_update_id, report.feed_update_id);
}

#[tokio::test]
async fn closing_a_closed_row_is_inconsistent() {
    let Some(h) = harness().await else {
        return;
    };
    h.pass(snapshot(0, vec![station("42", "45.5017", "-73.5673", "3")])).await;
    h.pass(snapshot(5, Vec::new())).await;

    let Ok(stations) = h.store.stations_for_feed(h.feed.id).await else {
        panic!("stations failed");
    };
    let Some(closed) = stations.first() else {
        panic!("station missing");
    };
    let Ok(Some(row)) = h.store.latest_station_history(closed.id).await else {
        panic!("history missing");
    };
    assert!(!row.is_open());

    let result = h
        .store
        .close_intervals(IntervalClose {
            station_id: closed.id,
            at: at(10),
            history: Some(row.id),
            status: None,
        })
        .await;
    assert!(matches!(result, Err(TrackerError::InconsistentState(_))));
}

#[tokio::test]
async fn abandoned_updates_are_swept() {
    let Some(h) = harness().await else {
        return;
    };
    let started_at = Utc::now() - chrono::Duration::hours(1);
    let Ok(stuck) = h
        .store
        .start_feed_update(NewFeedUpdate {
            feed_id: h.feed.id,
            started_at,
            source_timestamp: started_at,
            number_of_stations: 0,
            other: json!({}),
        })
        .await
    else {
        panic!("start_feed_update failed");
    };

    let Ok(swept) = h.service.sweep_abandoned(Duration::from_secs(900)).await else {
        panic!("sweep failed");
    };
    assert!(swept >= 1);

    let Ok(Some(stuck)) = h.store.get_feed_update(stuck.id).await else {
        panic!("update missing");
    };
    assert_eq!(stuck.state, UpdateState::Failed);
    assert!(stuck.ended_at.is_none());
    assert!(stuck.failed_at.is_some());
    assert_eq!(stuck.failure_reason.as_deref(), Some(ABANDONED_REASON));
}
