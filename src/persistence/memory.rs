//! In-memory implementation of the store.
//!
//! Used when `PERSISTENCE_ENABLED=false` and throughout the tests. All
//! tables live behind one [`tokio::sync::RwLock`]; every write method
//! validates its whole plan before mutating anything, which gives it the
//! same all-or-nothing behaviour as a SQL transaction.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::StationStore;
use super::models::{IntervalClose, StationTarget, StationWrite};
use crate::domain::{
    Feed, FeedId, FeedUpdate, FeedUpdateId, NewFeed, NewFeedUpdate, Station, StationHistory,
    StationHistoryId, StationId, StationStatus, StationStatusId, UpdateState, UpdateTransition,
};
use crate::error::TrackerError;

#[derive(Debug, Default)]
struct Sequences {
    feed: i64,
    feed_update: i64,
    station: i64,
    history: i64,
    status: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq = seq.saturating_add(1);
    *seq
}

#[derive(Debug, Default)]
struct Tables {
    seq: Sequences,
    feeds: BTreeMap<FeedId, Feed>,
    updates: BTreeMap<FeedUpdateId, FeedUpdate>,
    stations: BTreeMap<StationId, Station>,
    history: BTreeMap<StationHistoryId, StationHistory>,
    statuses: BTreeMap<StationStatusId, StationStatus>,
}

impl Tables {
    fn check_open_history(
        &self,
        station_id: StationId,
        row_id: StationHistoryId,
    ) -> Result<(), TrackerError> {
        match self.history.get(&row_id) {
            Some(row) if row.station_id == station_id && row.is_open() => Ok(()),
            Some(row) if row.station_id == station_id => Err(TrackerError::InconsistentState(
                format!("history row {row_id} of station {station_id} is already closed"),
            )),
            _ => Err(TrackerError::InconsistentState(format!(
                "history row {row_id} does not belong to station {station_id}"
            ))),
        }
    }

    fn check_open_status(
        &self,
        station_id: StationId,
        row_id: StationStatusId,
    ) -> Result<(), TrackerError> {
        match self.statuses.get(&row_id) {
            Some(row) if row.station_id == station_id && row.is_open() => Ok(()),
            Some(row) if row.station_id == station_id => Err(TrackerError::InconsistentState(
                format!("status row {row_id} of station {station_id} is already closed"),
            )),
            _ => Err(TrackerError::InconsistentState(format!(
                "status row {row_id} does not belong to station {station_id}"
            ))),
        }
    }

    fn close_history(&mut self, row_id: StationHistoryId, at: DateTime<Utc>) {
        if let Some(row) = self.history.get_mut(&row_id) {
            row.valid_to = Some(at);
        }
    }

    fn close_status(&mut self, row_id: StationStatusId, at: DateTime<Utc>) {
        if let Some(row) = self.statuses.get_mut(&row_id) {
            row.valid_to = Some(at);
        }
    }
}

/// Store keeping every table in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StationStore for MemoryStore {
    async fn create_feed(&self, feed: NewFeed) -> Result<Feed, TrackerError> {
        let mut tables = self.tables.write().await;
        let id = FeedId::new(next(&mut tables.seq.feed));
        let feed = Feed {
            id,
            short_name: feed.short_name,
            url: feed.url,
            other: feed.other,
        };
        tables.feeds.insert(id, feed.clone());
        Ok(feed)
    }

    async fn get_feed(&self, feed_id: FeedId) -> Result<Option<Feed>, TrackerError> {
        Ok(self.tables.read().await.feeds.get(&feed_id).cloned())
    }

    async fn list_feeds(&self) -> Result<Vec<Feed>, TrackerError> {
        Ok(self.tables.read().await.feeds.values().cloned().collect())
    }

    async fn start_feed_update(&self, update: NewFeedUpdate) -> Result<FeedUpdate, TrackerError> {
        let mut tables = self.tables.write().await;
        if !tables.feeds.contains_key(&update.feed_id) {
            return Err(TrackerError::FeedNotFound(update.feed_id));
        }
        let id = FeedUpdateId::new(next(&mut tables.seq.feed_update));
        let row = FeedUpdate {
            id,
            feed_id: update.feed_id,
            started_at: update.started_at,
            ended_at: None,
            source_timestamp: update.source_timestamp,
            number_of_stations: update.number_of_stations,
            state: UpdateState::Started,
            failed_at: None,
            failure_reason: None,
            other: update.other,
        };
        tables.updates.insert(id, row.clone());
        Ok(row)
    }

    async fn transition_feed_update(
        &self,
        feed_update_id: FeedUpdateId,
        transition: UpdateTransition,
    ) -> Result<FeedUpdate, TrackerError> {
        let mut tables = self.tables.write().await;
        let Some(row) = tables.updates.get_mut(&feed_update_id) else {
            return Err(TrackerError::FeedUpdateNotFound(feed_update_id));
        };
        if !row.state.can_transition_to(transition.target()) {
            return Err(TrackerError::InconsistentState(format!(
                "feed update {feed_update_id} cannot move from {} to {}",
                row.state,
                transition.target()
            )));
        }
        transition.apply_to(row);
        Ok(row.clone())
    }

    async fn get_feed_update(
        &self,
        feed_update_id: FeedUpdateId,
    ) -> Result<Option<FeedUpdate>, TrackerError> {
        Ok(self.tables.read().await.updates.get(&feed_update_id).cloned())
    }

    async fn list_feed_updates(
        &self,
        feed_id: FeedId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<FeedUpdate>, TrackerError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<FeedUpdate> = tables
            .updates
            .values()
            .filter(|u| u.feed_id == feed_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_feed_updates(&self, feed_id: FeedId) -> Result<u64, TrackerError> {
        let tables = self.tables.read().await;
        Ok(tables
            .updates
            .values()
            .filter(|u| u.feed_id == feed_id)
            .count() as u64)
    }

    async fn fail_abandoned_updates(
        &self,
        started_before: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<u64, TrackerError> {
        let mut tables = self.tables.write().await;
        let mut changed = 0u64;
        for row in tables.updates.values_mut() {
            if !row.state.is_terminal() && row.started_at < started_before {
                UpdateTransition::Failed {
                    failed_at,
                    reason: reason.to_string(),
                    other: row.other.clone(),
                }
                .apply_to(row);
                changed = changed.saturating_add(1);
            }
        }
        Ok(changed)
    }

    async fn stations_for_feed(&self, feed_id: FeedId) -> Result<Vec<Station>, TrackerError> {
        let tables = self.tables.read().await;
        Ok(tables
            .stations
            .values()
            .filter(|s| s.feed_id == feed_id)
            .cloned()
            .collect())
    }

    async fn get_station(&self, station_id: StationId) -> Result<Option<Station>, TrackerError> {
        Ok(self.tables.read().await.stations.get(&station_id).cloned())
    }

    async fn latest_station_history(
        &self,
        station_id: StationId,
    ) -> Result<Option<StationHistory>, TrackerError> {
        let tables = self.tables.read().await;
        Ok(tables
            .history
            .values()
            .filter(|h| h.station_id == station_id)
            .max_by_key(|h| (h.valid_from, h.id))
            .cloned())
    }

    async fn latest_station_status(
        &self,
        station_id: StationId,
    ) -> Result<Option<StationStatus>, TrackerError> {
        let tables = self.tables.read().await;
        Ok(tables
            .statuses
            .values()
            .filter(|s| s.station_id == station_id)
            .max_by_key(|s| (s.valid_from, s.id))
            .cloned())
    }

    async fn station_history(
        &self,
        station_id: StationId,
    ) -> Result<Vec<StationHistory>, TrackerError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<StationHistory> = tables
            .history
            .values()
            .filter(|h| h.station_id == station_id)
            .cloned()
            .collect();
        rows.sort_by_key(|h| (h.valid_from, h.id));
        Ok(rows)
    }

    async fn station_statuses(
        &self,
        station_id: StationId,
    ) -> Result<Vec<StationStatus>, TrackerError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<StationStatus> = tables
            .statuses
            .values()
            .filter(|s| s.station_id == station_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.valid_from, s.id));
        Ok(rows)
    }

    async fn apply_station_write(&self, write: StationWrite) -> Result<StationId, TrackerError> {
        let mut tables = self.tables.write().await;

        // Validate the whole plan before touching any table.
        let (station_id, feed_id) = match &write.target {
            StationTarget::New { feed_id } => {
                if !tables.feeds.contains_key(feed_id) {
                    return Err(TrackerError::FeedNotFound(*feed_id));
                }
                if write.properties.is_none() || write.status.is_none() {
                    return Err(TrackerError::InconsistentState(
                        "a new station needs both a property and a status version".to_string(),
                    ));
                }
                (None, *feed_id)
            }
            StationTarget::Existing(id) => {
                let Some(station) = tables.stations.get(id) else {
                    return Err(TrackerError::StationNotFound(*id));
                };
                if let Some(close) = write.properties.as_ref().and_then(|p| p.close) {
                    tables.check_open_history(*id, close)?;
                }
                if let Some(close) = write.status.as_ref().and_then(|s| s.close) {
                    tables.check_open_status(*id, close)?;
                }
                (Some(*id), station.feed_id)
            }
        };

        let station_id = match station_id {
            Some(id) => id,
            None => {
                let id = StationId::new(next(&mut tables.seq.station));
                let properties = write
                    .properties
                    .as_ref()
                    .map(|p| p.snapshot.clone())
                    .unwrap_or_default();
                tables.stations.insert(
                    id,
                    Station {
                        id,
                        feed_id,
                        properties,
                    },
                );
                id
            }
        };

        if let Some(version) = write.properties {
            if let Some(close) = version.close {
                tables.close_history(close, write.at);
            }
            let row_id = StationHistoryId::new(next(&mut tables.seq.history));
            tables.history.insert(
                row_id,
                StationHistory {
                    id: row_id,
                    station_id,
                    feed_id,
                    feed_update_id: write.feed_update_id,
                    valid_from: write.at,
                    valid_to: None,
                    properties: version.snapshot.clone(),
                },
            );
            if let Some(station) = tables.stations.get_mut(&station_id) {
                station.properties = version.snapshot;
            }
        }

        if let Some(version) = write.status {
            if let Some(close) = version.close {
                tables.close_status(close, write.at);
            }
            let row_id = StationStatusId::new(next(&mut tables.seq.status));
            tables.statuses.insert(
                row_id,
                StationStatus {
                    id: row_id,
                    station_id,
                    feed_update_id: write.feed_update_id,
                    valid_from: write.at,
                    valid_to: None,
                    counts: version.counts,
                },
            );
        }

        Ok(station_id)
    }

    async fn close_intervals(&self, close: IntervalClose) -> Result<(), TrackerError> {
        let mut tables = self.tables.write().await;
        if let Some(row_id) = close.history {
            tables.check_open_history(close.station_id, row_id)?;
        }
        if let Some(row_id) = close.status {
            tables.check_open_status(close.station_id, row_id)?;
        }
        if let Some(row_id) = close.history {
            tables.close_history(row_id, close.at);
        }
        if let Some(row_id) = close.status {
            tables.close_status(row_id, close.at);
        }
        Ok(())
    }
}
