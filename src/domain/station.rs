//! Stations and their two SCD2 histories.
//!
//! A [`Station`] is the durable identity of one physical station inside a
//! feed. Its descriptive fields are versioned in [`StationHistory`] rows and
//! its live counts in [`StationStatus`] rows. Both histories use half-open
//! validity intervals `[valid_from, valid_to)`; `valid_to = None` marks the
//! currently open row.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{FeedId, FeedUpdateId, StationHistoryId, StationId, StationStatusId};

/// Fractional digits kept for latitudes (`NUMERIC(17,15)`).
pub const LAT_SCALE: usize = 15;

/// Fractional digits kept for longitudes (`NUMERIC(17,14)`).
pub const LON_SCALE: usize = 14;

/// Rounds a coordinate to `scale` fractional digits, the precision of its
/// column, so a stored coordinate reads back equal to a freshly parsed one.
#[must_use]
pub fn round_coordinate(value: f64, scale: usize) -> f64 {
    format!("{value:.scale$}").parse().unwrap_or(value)
}

/// Identity and descriptive fields of a station.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StationProperties {
    /// Feed-scoped identifier, stable across polls.
    pub local_id: String,
    /// Short display name.
    pub short_name: Option<String>,
    /// Long display name.
    pub long_name: Option<String>,
    /// Street address.
    pub address: Option<String>,
    /// Latitude, rounded to [`LAT_SCALE`] fractional digits.
    pub lat: Option<f64>,
    /// Longitude, rounded to [`LON_SCALE`] fractional digits.
    pub lon: Option<f64>,
    /// Sum of the four status counts when this property version was opened.
    ///
    /// Not refreshed by status-only changes: the open [`StationStatus`] row
    /// holds the current counts.
    pub total_spots: Option<i32>,
    /// Vendor-specific fields keyed by their wire key.
    #[schema(value_type = Object)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl StationProperties {
    /// Returns `true` if both sides describe the same station.
    ///
    /// Empty strings count as absent, empty `other` entries (null or `""`)
    /// count as absent, and `total_spots` is ignored: it is derived from the
    /// status counts, which are versioned on their own track.
    #[must_use]
    pub fn same_description(&self, other: &Self) -> bool {
        self.comparable() == other.comparable()
    }

    fn comparable(&self) -> Self {
        Self {
            local_id: self.local_id.clone(),
            short_name: non_empty(self.short_name.as_deref()),
            long_name: non_empty(self.long_name.as_deref()),
            address: non_empty(self.address.as_deref()),
            lat: self.lat.map(|v| round_coordinate(v, LAT_SCALE)),
            lon: self.lon.map(|v| round_coordinate(v, LON_SCALE)),
            total_spots: None,
            other: self
                .other
                .iter()
                .filter(|(_, value)| !is_empty_value(value))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(str::to_string)
}

fn is_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Live availability counts of a station.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusCounts {
    /// Vehicles ready to be rented.
    pub available_vehicles: i32,
    /// Free docks.
    pub available_spots: i32,
    /// Vehicles docked but out of service.
    pub disabled_vehicles: i32,
    /// Docks out of service.
    pub disabled_spots: i32,
}

impl StatusCounts {
    /// Sum of the four counts, `None` on overflow.
    #[must_use]
    pub fn total(&self) -> Option<i32> {
        self.available_spots
            .checked_add(self.disabled_spots)?
            .checked_add(self.available_vehicles)?
            .checked_add(self.disabled_vehicles)
    }
}

/// Durable identity of a station plus its current descriptive fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Station {
    /// Global station identifier.
    pub id: StationId,
    /// Owning feed.
    pub feed_id: FeedId,
    /// Current descriptive fields (denormalized from the open history row).
    pub properties: StationProperties,
}

/// One version of a station's descriptive fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StationHistory {
    /// Row identifier.
    pub id: StationHistoryId,
    /// Station described.
    pub station_id: StationId,
    /// Feed of the station.
    pub feed_id: FeedId,
    /// Pass that created this row.
    pub feed_update_id: FeedUpdateId,
    /// Start of validity (inclusive).
    pub valid_from: DateTime<Utc>,
    /// End of validity (exclusive), `None` while open.
    pub valid_to: Option<DateTime<Utc>>,
    /// Snapshot of the descriptive fields.
    pub properties: StationProperties,
}

impl StationHistory {
    /// Returns `true` while the row is the current version.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.valid_to.is_none()
    }
}

/// One version of a station's availability counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StationStatus {
    /// Row identifier.
    pub id: StationStatusId,
    /// Station described.
    pub station_id: StationId,
    /// Pass that created this row.
    pub feed_update_id: FeedUpdateId,
    /// Start of validity (inclusive).
    pub valid_from: DateTime<Utc>,
    /// End of validity (exclusive), `None` while open.
    pub valid_to: Option<DateTime<Utc>>,
    /// Counts during the interval.
    pub counts: StatusCounts,
}

impl StationStatus {
    /// Returns `true` while the row is the current version.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.valid_to.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main_st() -> StationProperties {
        StationProperties {
            local_id: "42".to_string(),
            short_name: Some("Main St".to_string()),
            lat: Some(45.5017),
            lon: Some(-73.5673),
            total_spots: Some(16),
            ..StationProperties::default()
        }
    }

    #[test]
    fn empty_string_equals_absent() {
        let mut with_empty = main_st();
        with_empty.long_name = Some(String::new());
        with_empty.other.insert("st".to_string(), serde_json::json!(""));
        assert!(with_empty.same_description(&main_st()));
    }

    #[test]
    fn coordinates_round_to_column_scale() {
        assert_eq!(round_coordinate(45.5017, LAT_SCALE), 45.5017);
        assert_eq!(
            round_coordinate(-73.567_312_345_678_912_3, LON_SCALE),
            -73.567_312_345_678_91
        );
        let mut near_equator = main_st();
        near_equator.lat = Some(0.001_234_567_890_123);
        let mut precise = near_equator.clone();
        precise.lat = Some(0.001_234_567_890_123_456_7);
        assert!(precise.same_description(&near_equator));
    }

    #[test]
    fn total_spots_is_not_compared() {
        let mut grown = main_st();
        grown.total_spots = Some(17);
        assert!(grown.same_description(&main_st()));
    }

    #[test]
    fn renamed_station_differs() {
        let mut renamed = main_st();
        renamed.short_name = Some("Main Street".to_string());
        assert!(!renamed.same_description(&main_st()));
    }

    #[test]
    fn other_values_are_compared() {
        let mut locked = main_st();
        locked.other.insert("bl".to_string(), serde_json::json!("true"));
        assert!(!locked.same_description(&main_st()));
    }

    #[test]
    fn total_sums_all_counts() {
        let counts = StatusCounts {
            available_vehicles: 1,
            available_spots: 3,
            disabled_vehicles: 0,
            disabled_spots: 12,
        };
        assert_eq!(counts.total(), Some(16));

        let huge = StatusCounts {
            available_spots: i32::MAX,
            disabled_spots: 1,
            ..StatusCounts::default()
        };
        assert_eq!(huge.total(), None);
    }
}
