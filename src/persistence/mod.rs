//! Persistence layer: the relational store behind the reconciliation engine.
//!
//! [`StationStore`] exposes one method per query shape. Two
//! implementations exist: [`postgres::PostgresStore`] (`sqlx::PgPool`) for
//! production and [`memory::MemoryStore`] for tests and for running with
//! persistence disabled.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Feed, FeedId, FeedUpdate, FeedUpdateId, NewFeed, NewFeedUpdate, Station, StationHistory,
    StationId, StationStatus, UpdateTransition,
};
use crate::error::TrackerError;

pub use memory::MemoryStore;
pub use models::{IntervalClose, PropertyVersion, StationTarget, StationWrite, StatusVersion};
pub use postgres::PostgresStore;

/// Store of feeds, passes, stations and their histories.
///
/// All methods return [`TrackerError::Persistence`] on store failure.
/// Write methods that find stored state contradicting the versioning
/// invariants return [`TrackerError::InconsistentState`].
#[async_trait]
pub trait StationStore: Send + Sync + Debug {
    /// Registers a feed.
    async fn create_feed(&self, feed: NewFeed) -> Result<Feed, TrackerError>;

    /// Loads one feed.
    async fn get_feed(&self, feed_id: FeedId) -> Result<Option<Feed>, TrackerError>;

    /// Lists all feeds ordered by id.
    async fn list_feeds(&self) -> Result<Vec<Feed>, TrackerError>;

    /// Creates a pass in the `started` state.
    async fn start_feed_update(&self, update: NewFeedUpdate) -> Result<FeedUpdate, TrackerError>;

    /// Moves a pass to its next state. Fails with `InconsistentState` when
    /// the transition is not allowed from the stored state.
    async fn transition_feed_update(
        &self,
        feed_update_id: FeedUpdateId,
        transition: UpdateTransition,
    ) -> Result<FeedUpdate, TrackerError>;

    /// Loads one pass.
    async fn get_feed_update(
        &self,
        feed_update_id: FeedUpdateId,
    ) -> Result<Option<FeedUpdate>, TrackerError>;

    /// Lists the passes of a feed, newest first.
    async fn list_feed_updates(
        &self,
        feed_id: FeedId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<FeedUpdate>, TrackerError>;

    /// Number of passes of a feed.
    async fn count_feed_updates(&self, feed_id: FeedId) -> Result<u64, TrackerError>;

    /// Marks every non-terminal pass started before `started_before` as
    /// failed with `reason`. Returns the number of passes changed.
    async fn fail_abandoned_updates(
        &self,
        started_before: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<u64, TrackerError>;

    /// Stations currently belonging to a feed.
    async fn stations_for_feed(&self, feed_id: FeedId) -> Result<Vec<Station>, TrackerError>;

    /// Loads one station.
    async fn get_station(&self, station_id: StationId) -> Result<Option<Station>, TrackerError>;

    /// Latest property row of a station, ordered by `valid_from` then id,
    /// descending. May be closed.
    async fn latest_station_history(
        &self,
        station_id: StationId,
    ) -> Result<Option<StationHistory>, TrackerError>;

    /// Latest status row of a station, ordered by `valid_from` then id,
    /// descending. May be closed.
    async fn latest_station_status(
        &self,
        station_id: StationId,
    ) -> Result<Option<StationStatus>, TrackerError>;

    /// Every property row of a station, oldest first.
    async fn station_history(
        &self,
        station_id: StationId,
    ) -> Result<Vec<StationHistory>, TrackerError>;

    /// Every status row of a station, oldest first.
    async fn station_statuses(
        &self,
        station_id: StationId,
    ) -> Result<Vec<StationStatus>, TrackerError>;

    /// Applies one station's plan atomically. Returns the station id
    /// (freshly assigned for [`StationTarget::New`]).
    async fn apply_station_write(&self, write: StationWrite) -> Result<StationId, TrackerError>;

    /// Closes the open intervals of a missing station atomically.
    async fn close_intervals(&self, close: IntervalClose) -> Result<(), TrackerError>;
}
