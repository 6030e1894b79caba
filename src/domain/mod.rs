//! Domain layer: entities, identifiers, events and pass bookkeeping.
//!
//! This module contains the typed model of feeds, passes, stations and
//! their two SCD2 histories, the event bus used to broadcast
//! reconciliation steps, and the per-feed locks that serialize passes.

pub mod event_bus;
pub mod feed;
pub mod feed_locks;
pub mod ids;
pub mod pass_report;
pub mod reconcile_event;
pub mod station;

pub use event_bus::EventBus;
pub use feed::{Feed, FeedUpdate, NewFeed, NewFeedUpdate, UpdateState, UpdateTransition};
pub use feed_locks::{FeedLocks, FeedPassGuard};
pub use ids::{FeedId, FeedUpdateId, StationHistoryId, StationId, StationStatusId};
pub use pass_report::{
    Classification, ClassificationCounts, PassReport, RecordRejection, StationFailure,
};
pub use reconcile_event::ReconcileEvent;
pub use station::{
    LAT_SCALE, LON_SCALE, Station, StationHistory, StationProperties, StationStatus, StatusCounts,
    round_coordinate,
};
