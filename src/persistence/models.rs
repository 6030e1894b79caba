//! Write plans applied atomically by a [`super::StationStore`].
//!
//! The versioning writer decides what changes; the store executes one plan
//! per station inside a single transaction, so a station is never left
//! with a closed row and no replacement.

use chrono::{DateTime, Utc};

use crate::domain::{
    FeedId, FeedUpdateId, StationHistoryId, StationId, StationProperties, StationStatusId,
    StatusCounts,
};

/// The station a [`StationWrite`] applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum StationTarget {
    /// Create the station row first.
    New {
        /// Owning feed.
        feed_id: FeedId,
    },
    /// An existing station.
    Existing(StationId),
}

/// A new property version.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyVersion {
    /// Open row to close at the plan's timestamp, if any.
    pub close: Option<StationHistoryId>,
    /// Snapshot for the new open row. Also written onto the station row.
    pub snapshot: StationProperties,
}

/// A new status version.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusVersion {
    /// Open row to close at the plan's timestamp, if any.
    pub close: Option<StationStatusId>,
    /// Counts for the new open row.
    pub counts: StatusCounts,
}

/// Everything one pass writes for one station.
#[derive(Debug, Clone, PartialEq)]
pub struct StationWrite {
    /// Pass that owns the new rows.
    pub feed_update_id: FeedUpdateId,
    /// Closes the old rows (`valid_to`) and opens the new ones
    /// (`valid_from`).
    pub at: DateTime<Utc>,
    /// Station the plan applies to.
    pub target: StationTarget,
    /// Property track, `None` when unchanged.
    pub properties: Option<PropertyVersion>,
    /// Status track, `None` when unchanged.
    pub status: Option<StatusVersion>,
}

impl StationWrite {
    /// Returns `true` if the plan writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.target, StationTarget::Existing(_))
            && self.properties.is_none()
            && self.status.is_none()
    }
}

/// Closes the open intervals of a station absent from the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalClose {
    /// Station to close.
    pub station_id: StationId,
    /// Close time.
    pub at: DateTime<Utc>,
    /// Open history row to close, if any.
    pub history: Option<StationHistoryId>,
    /// Open status row to close, if any.
    pub status: Option<StationStatusId>,
}

impl IntervalClose {
    /// Returns `true` if nothing is left open.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.history.is_none() && self.status.is_none()
    }
}
