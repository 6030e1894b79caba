//! Domain events emitted while a feed snapshot is reconciled.
//!
//! Every classifier decision that leads to a write, every missing station
//! and every pass lifecycle step publishes a [`ReconcileEvent`] through the
//! [`super::EventBus`]. WebSocket clients receive the events of the feeds
//! they subscribed to.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{FeedId, FeedUpdateId, StationId, StatusCounts, UpdateState};

/// Domain event describing one step of a reconciliation pass.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ReconcileEvent {
    /// A pass started for a feed.
    PassStarted {
        /// Feed identifier.
        feed_id: FeedId,
        /// Pass identifier.
        feed_update_id: FeedUpdateId,
        /// Raw records in the snapshot.
        number_of_stations: i32,
        /// Snapshot time reported by the feed.
        source_timestamp: DateTime<Utc>,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A station was seen for the first time.
    StationCreated {
        /// Feed identifier.
        feed_id: FeedId,
        /// Pass identifier.
        feed_update_id: FeedUpdateId,
        /// New global station identifier.
        station_id: StationId,
        /// Feed-scoped identifier.
        local_id: String,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A new property version was opened for a known station.
    PropertiesVersioned {
        /// Feed identifier.
        feed_id: FeedId,
        /// Pass identifier.
        feed_update_id: FeedUpdateId,
        /// Station identifier.
        station_id: StationId,
        /// Feed-scoped identifier.
        local_id: String,
        /// `true` when no open row was closed (the station reappeared).
        reopened: bool,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A new status version was opened for a known station.
    StatusVersioned {
        /// Feed identifier.
        feed_id: FeedId,
        /// Pass identifier.
        feed_update_id: FeedUpdateId,
        /// Station identifier.
        station_id: StationId,
        /// Feed-scoped identifier.
        local_id: String,
        /// Counts of the new version.
        counts: StatusCounts,
        /// `true` when no open row was closed (the station reappeared).
        reopened: bool,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A known station was absent from the snapshot and its intervals were
    /// closed.
    StationMissing {
        /// Feed identifier.
        feed_id: FeedId,
        /// Pass identifier.
        feed_update_id: FeedUpdateId,
        /// Station identifier.
        station_id: StationId,
        /// Feed-scoped identifier.
        local_id: String,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A wire key with no mapping entry was dropped.
    UnknownField {
        /// Feed identifier.
        feed_id: FeedId,
        /// Pass identifier.
        feed_update_id: FeedUpdateId,
        /// The unmapped wire key.
        key: String,
        /// How many records in the snapshot carried it.
        occurrences: u64,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A raw record could not be parsed and was skipped.
    RecordRejected {
        /// Feed identifier.
        feed_id: FeedId,
        /// Pass identifier.
        feed_update_id: FeedUpdateId,
        /// Local identifier, when the record carried one.
        local_id: Option<String>,
        /// Why the record was rejected.
        reason: String,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Writing a station failed; the pass will end failed.
    StationFailed {
        /// Feed identifier.
        feed_id: FeedId,
        /// Pass identifier.
        feed_update_id: FeedUpdateId,
        /// Feed-scoped identifier.
        local_id: String,
        /// Error message.
        error: String,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A pass reached a terminal state.
    PassFinished {
        /// Feed identifier.
        feed_id: FeedId,
        /// Pass identifier.
        feed_update_id: FeedUpdateId,
        /// `ended` or `failed`.
        state: UpdateState,
        /// Failure reason, if any.
        failure_reason: Option<String>,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl ReconcileEvent {
    /// Returns the feed this event belongs to.
    #[must_use]
    pub fn feed_id(&self) -> FeedId {
        match self {
            Self::PassStarted { feed_id, .. }
            | Self::StationCreated { feed_id, .. }
            | Self::PropertiesVersioned { feed_id, .. }
            | Self::StatusVersioned { feed_id, .. }
            | Self::StationMissing { feed_id, .. }
            | Self::UnknownField { feed_id, .. }
            | Self::RecordRejected { feed_id, .. }
            | Self::StationFailed { feed_id, .. }
            | Self::PassFinished { feed_id, .. } => *feed_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::PassStarted { .. } => "pass_started",
            Self::StationCreated { .. } => "station_created",
            Self::PropertiesVersioned { .. } => "properties_versioned",
            Self::StatusVersioned { .. } => "status_versioned",
            Self::StationMissing { .. } => "station_missing",
            Self::UnknownField { .. } => "unknown_field",
            Self::RecordRejected { .. } => "record_rejected",
            Self::StationFailed { .. } => "station_failed",
            Self::PassFinished { .. } => "pass_finished",
        }
    }
}
