//! Aggregate outcome of one reconciliation pass.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{FeedId, FeedUpdateId, UpdateState};

/// What the classifier decided for one parsed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// No station with this local id existed in the feed.
    New,
    /// Only the descriptive fields changed.
    PropertyChanged,
    /// Only the availability counts changed.
    StatusChanged,
    /// Both tracks changed.
    PropertyAndStatusChanged,
    /// Nothing to write.
    Unchanged,
}

impl Classification {
    /// Combines the outcome of the two independent tracks.
    #[must_use]
    pub const fn from_tracks(property_changed: bool, status_changed: bool) -> Self {
        match (property_changed, status_changed) {
            (true, true) => Self::PropertyAndStatusChanged,
            (true, false) => Self::PropertyChanged,
            (false, true) => Self::StatusChanged,
            (false, false) => Self::Unchanged,
        }
    }
}

/// Number of records per [`Classification`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClassificationCounts {
    /// Stations created.
    pub new: u32,
    /// Property-only changes.
    pub property_changed: u32,
    /// Status-only changes.
    pub status_changed: u32,
    /// Changes on both tracks.
    pub property_and_status_changed: u32,
    /// Stations left untouched.
    pub unchanged: u32,
}

impl ClassificationCounts {
    /// Counts one more record.
    pub fn record(&mut self, classification: Classification) {
        let slot = match classification {
            Classification::New => &mut self.new,
            Classification::PropertyChanged => &mut self.property_changed,
            Classification::StatusChanged => &mut self.status_changed,
            Classification::PropertyAndStatusChanged => &mut self.property_and_status_changed,
            Classification::Unchanged => &mut self.unchanged,
        };
        *slot = slot.saturating_add(1);
    }

    /// Total number of classified records.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.new
            .saturating_add(self.property_changed)
            .saturating_add(self.status_changed)
            .saturating_add(self.property_and_status_changed)
            .saturating_add(self.unchanged)
    }
}

/// A station whose processing failed during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StationFailure {
    /// Feed-scoped identifier.
    pub local_id: String,
    /// `true` if the failure happened while closing a missing station.
    pub missing: bool,
    /// Error message.
    pub error: String,
}

/// A raw record that was skipped because it could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecordRejection {
    /// Local identifier, when the record carried a usable one.
    pub local_id: Option<String>,
    /// Why the record was rejected.
    pub reason: String,
}

/// Aggregate outcome of one pass, returned to the caller that submitted
/// the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PassReport {
    /// Feed identifier.
    pub feed_id: FeedId,
    /// Pass identifier.
    pub feed_update_id: FeedUpdateId,
    /// Terminal state of the pass.
    pub state: UpdateState,
    /// Snapshot time used for every interval opened or closed.
    pub source_timestamp: DateTime<Utc>,
    /// Per-classification record counts.
    pub classifications: ClassificationCounts,
    /// Known stations absent from the snapshot whose intervals were closed.
    pub missing_closed: u32,
    /// Records skipped by the parser.
    pub rejected: Vec<RecordRejection>,
    /// Unmapped wire keys and how many records carried each.
    pub unknown_fields: BTreeMap<String, u64>,
    /// Stations whose processing failed.
    pub failures: Vec<StationFailure>,
    /// Why the pass failed, if it did.
    pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_combine_into_classification() {
        assert_eq!(
            Classification::from_tracks(true, true),
            Classification::PropertyAndStatusChanged
        );
        assert_eq!(
            Classification::from_tracks(false, true),
            Classification::StatusChanged
        );
        assert_eq!(
            Classification::from_tracks(false, false),
            Classification::Unchanged
        );
    }

    #[test]
    fn counts_record_each_classification() {
        let mut counts = ClassificationCounts::default();
        counts.record(Classification::New);
        counts.record(Classification::Unchanged);
        counts.record(Classification::Unchanged);
        assert_eq!(counts.new, 1);
        assert_eq!(counts.unchanged, 2);
        assert_eq!(counts.total(), 3);
    }
}
