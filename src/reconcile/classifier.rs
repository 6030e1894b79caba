//! Reconciliation classifier.
//!
//! Compares a parsed record against what the store knows about the
//! station. The property track and the status track are decided
//! independently; [`KnownStationChange::classification`] combines them for
//! reporting.

use chrono::{DateTime, Utc};

use crate::domain::{
    Classification, Station, StationHistory, StationHistoryId, StationStatus, StationStatusId,
};
use crate::error::TrackerError;

use super::parser::ParsedStation;

/// Decision for one SCD2 track of a known station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackChange<Id> {
    /// The open row still describes the station.
    Unchanged,
    /// Close the open row, then open a new one.
    Changed {
        /// The currently open row.
        close: Id,
        /// Its `valid_from`.
        since: DateTime<Utc>,
    },
    /// The latest row is closed (the station had gone missing); open a new
    /// row without closing anything.
    Reopened {
        /// `valid_to` of the latest row.
        closed_at: DateTime<Utc>,
    },
}

impl<Id: Copy> TrackChange<Id> {
    /// Returns `true` if the track needs a new row.
    #[must_use]
    pub const fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Row to close before inserting, if any.
    #[must_use]
    pub fn close(&self) -> Option<Id> {
        match self {
            Self::Changed { close, .. } => Some(*close),
            Self::Unchanged | Self::Reopened { .. } => None,
        }
    }

    /// The earliest time a new row may start at: the open row's
    /// `valid_from`, or the closed row's `valid_to`.
    #[must_use]
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Changed { since, .. } => Some(*since),
            Self::Reopened { closed_at } => Some(*closed_at),
            Self::Unchanged => None,
        }
    }
}

/// Decisions for both tracks of a known station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownStationChange {
    /// Property track.
    pub properties: TrackChange<StationHistoryId>,
    /// Status track.
    pub status: TrackChange<StationStatusId>,
}

impl KnownStationChange {
    /// Combined classification for reporting.
    #[must_use]
    pub const fn classification(&self) -> Classification {
        Classification::from_tracks(self.properties.is_change(), self.status.is_change())
    }
}

/// Classifies a parsed record against a known station.
///
/// `latest_history` and `latest_status` are the latest rows of each track
/// (see [`crate::persistence::StationStore::latest_station_history`]).
///
/// # Errors
///
/// Returns [`TrackerError::InconsistentState`] when the station has no row
/// at all on one of the tracks: every station gets both rows when it is
/// created, so a missing row means the store was altered outside the
/// engine.
pub fn classify_known(
    station: &Station,
    latest_history: Option<&StationHistory>,
    latest_status: Option<&StationStatus>,
    parsed: &ParsedStation,
) -> Result<KnownStationChange, TrackerError> {
    let Some(history) = latest_history else {
        return Err(TrackerError::InconsistentState(format!(
            "station {} has no history row",
            station.id
        )));
    };
    let Some(status) = latest_status else {
        return Err(TrackerError::InconsistentState(format!(
            "station {} has no status row",
            station.id
        )));
    };

    let properties = if let Some(closed_at) = history.valid_to {
        TrackChange::Reopened { closed_at }
    } else if station.properties.same_description(&parsed.properties) {
        TrackChange::Unchanged
    } else {
        TrackChange::Changed {
            close: history.id,
            since: history.valid_from,
        }
    };

    let status = if let Some(closed_at) = status.valid_to {
        TrackChange::Reopened { closed_at }
    } else if status.counts == parsed.status {
        TrackChange::Unchanged
    } else {
        TrackChange::Changed {
            close: status.id,
            since: status.valid_from,
        }
    };

    Ok(KnownStationChange { properties, status })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::domain::{FeedId, FeedUpdateId, StationId, StationProperties, StatusCounts};
    use crate::reconcile::parser::TransientFields;

    fn properties() -> StationProperties {
        StationProperties {
            local_id: "42".to_string(),
            short_name: Some("Main St".to_string()),
            lat: Some(45.5017),
            lon: Some(-73.5673),
            total_spots: Some(16),
            ..StationProperties::default()
        }
    }

    fn counts() -> StatusCounts {
        StatusCounts {
            available_vehicles: 1,
            available_spots: 3,
            disabled_vehicles: 0,
            disabled_spots: 12,
        }
    }

    fn station() -> Station {
        Station {
            id: StationId::new(1),
            feed_id: FeedId::new(1),
            properties: properties(),
        }
    }

    fn history(open: bool) -> StationHistory {
        let from = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap_or_default();
        StationHistory {
            id: StationHistoryId::new(10),
            station_id: StationId::new(1),
            feed_id: FeedId::new(1),
            feed_update_id: FeedUpdateId::new(1),
            valid_from: from,
            valid_to: (!open).then_some(from),
            properties: properties(),
        }
    }

    fn status(open: bool) -> StationStatus {
        let from = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap_or_default();
        StationStatus {
            id: StationStatusId::new(20),
            station_id: StationId::new(1),
            feed_update_id: FeedUpdateId::new(1),
            valid_from: from,
            valid_to: (!open).then_some(from),
            counts: counts(),
        }
    }

    fn parsed(properties: StationProperties, status: StatusCounts) -> ParsedStation {
        ParsedStation {
            properties,
            status,
            transient: TransientFields::default(),
        }
    }

    #[test]
    fn identical_record_is_unchanged() {
        let Ok(change) = classify_known(
            &station(),
            Some(&history(true)),
            Some(&status(true)),
            &parsed(properties(), counts()),
        ) else {
            panic!("classification failed");
        };
        assert_eq!(change.classification(), Classification::Unchanged);
    }

    #[test]
    fn count_change_is_status_only() {
        let mut new_counts = counts();
        new_counts.available_spots = 4;
        let mut new_props = properties();
        new_props.total_spots = Some(17);
        let Ok(change) = classify_known(
            &station(),
            Some(&history(true)),
            Some(&status(true)),
            &parsed(new_props, new_counts),
        ) else {
            panic!("classification failed");
        };
        assert_eq!(change.classification(), Classification::StatusChanged);
        assert_eq!(change.status.close(), Some(StationStatusId::new(20)));
        assert_eq!(change.properties, TrackChange::Unchanged);
    }

    #[test]
    fn rename_is_property_only() {
        let mut renamed = properties();
        renamed.short_name = Some("Main Street".to_string());
        let Ok(change) = classify_known(
            &station(),
            Some(&history(true)),
            Some(&status(true)),
            &parsed(renamed, counts()),
        ) else {
            panic!("classification failed");
        };
        assert_eq!(change.classification(), Classification::PropertyChanged);
        assert_eq!(change.properties.close(), Some(StationHistoryId::new(10)));
    }

    #[test]
    fn both_tracks_change_independently() {
        let mut moved = properties();
        moved.lat = Some(45.6);
        let mut new_counts = counts();
        new_counts.disabled_vehicles = 2;
        let Ok(change) = classify_known(
            &station(),
            Some(&history(true)),
            Some(&status(true)),
            &parsed(moved, new_counts),
        ) else {
            panic!("classification failed");
        };
        assert_eq!(
            change.classification(),
            Classification::PropertyAndStatusChanged
        );
    }

    #[test]
    fn closed_rows_are_reopened() {
        let Ok(change) = classify_known(
            &station(),
            Some(&history(false)),
            Some(&status(false)),
            &parsed(properties(), counts()),
        ) else {
            panic!("classification failed");
        };
        assert!(matches!(change.properties, TrackChange::Reopened { .. }));
        assert!(matches!(change.status, TrackChange::Reopened { .. }));
        assert_eq!(change.properties.close(), None);
        assert_eq!(
            change.classification(),
            Classification::PropertyAndStatusChanged
        );
    }

    #[test]
    fn missing_history_is_inconsistent() {
        let result = classify_known(
            &station(),
            None,
            Some(&status(true)),
            &parsed(properties(), counts()),
        );
        assert!(matches!(result, Err(TrackerError::InconsistentState(_))));
    }
}
