//! Temporal versioning writer.
//!
//! Turns classifier decisions into [`StationWrite`] plans: close the open
//! row at the pass's source timestamp, then open a new row from that same
//! timestamp. Unchanged tracks produce no write.

use chrono::{DateTime, Utc};

use super::classifier::{KnownStationChange, TrackChange};
use super::parser::ParsedStation;
use crate::domain::{FeedId, FeedUpdate, Station};
use crate::error::TrackerError;
use crate::persistence::{PropertyVersion, StationTarget, StationWrite, StatusVersion};

/// Plan for a station seen for the first time: the station row plus one
/// open row on each track.
#[must_use]
pub fn plan_new(feed_id: FeedId, update: &FeedUpdate, parsed: &ParsedStation) -> StationWrite {
    StationWrite {
        feed_update_id: update.id,
        at: update.source_timestamp,
        target: StationTarget::New { feed_id },
        properties: Some(PropertyVersion {
            close: None,
            snapshot: parsed.properties.clone(),
        }),
        status: Some(StatusVersion {
            close: None,
            counts: parsed.status,
        }),
    }
}

/// Plan for a known station. Returns `None` when both tracks are
/// unchanged.
///
/// # Errors
///
/// Returns [`TrackerError::InconsistentState`] when the pass's source
/// timestamp precedes the interval it would close or reopen after: the
/// result would be an interval ending before it starts.
pub fn plan_known(
    station: &Station,
    change: &KnownStationChange,
    update: &FeedUpdate,
    parsed: &ParsedStation,
) -> Result<Option<StationWrite>, TrackerError> {
    let at = update.source_timestamp;
    check_order(station, "history", &change.properties, at)?;
    check_order(station, "status", &change.status, at)?;

    let properties = change
        .properties
        .is_change()
        .then(|| PropertyVersion {
            close: change.properties.close(),
            snapshot: parsed.properties.clone(),
        });
    let status = change.status.is_change().then(|| StatusVersion {
        close: change.status.close(),
        counts: parsed.status,
    });

    if properties.is_none() && status.is_none() {
        return Ok(None);
    }

    Ok(Some(StationWrite {
        feed_update_id: update.id,
        at,
        target: StationTarget::Existing(station.id),
        properties,
        status,
    }))
}

fn check_order<Id: Copy>(
    station: &Station,
    track: &str,
    change: &TrackChange<Id>,
    at: DateTime<Utc>,
) -> Result<(), TrackerError> {
    match change.not_before() {
        Some(not_before) if at < not_before => Err(TrackerError::InconsistentState(format!(
            "station {} {track} row bound {not_before} is after source timestamp {at}",
            station.id
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::domain::{
        FeedUpdateId, StationHistoryId, StationId, StationProperties, StationStatusId,
        StatusCounts, UpdateState,
    };
    use crate::reconcile::parser::TransientFields;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap_or_default()
    }

    fn update(at: DateTime<Utc>) -> FeedUpdate {
        FeedUpdate {
            id: FeedUpdateId::new(7),
            feed_id: FeedId::new(1),
            started_at: at,
            ended_at: None,
            source_timestamp: at,
            number_of_stations: 1,
            state: UpdateState::Reconciling,
            failed_at: None,
            failure_reason: None,
            other: serde_json::json!({}),
        }
    }

    fn parsed() -> ParsedStation {
        ParsedStation {
            properties: StationProperties {
                local_id: "42".to_string(),
                total_spots: Some(16),
                ..StationProperties::default()
            },
            status: StatusCounts {
                available_spots: 3,
                disabled_spots: 12,
                available_vehicles: 1,
                disabled_vehicles: 0,
            },
            transient: TransientFields::default(),
        }
    }

    fn station() -> Station {
        Station {
            id: StationId::new(3),
            feed_id: FeedId::new(1),
            properties: parsed().properties,
        }
    }

    #[test]
    fn new_station_opens_both_tracks() {
        let plan = plan_new(FeedId::new(1), &update(t0()), &parsed());
        assert_eq!(plan.target, StationTarget::New { feed_id: FeedId::new(1) });
        assert_eq!(plan.at, t0());
        assert_eq!(plan.feed_update_id, FeedUpdateId::new(7));
        assert!(plan.properties.as_ref().is_some_and(|p| p.close.is_none()));
        assert!(plan.status.as_ref().is_some_and(|s| s.counts.available_spots == 3));
    }

    #[test]
    fn status_change_closes_then_opens() {
        let change = KnownStationChange {
            properties: TrackChange::Unchanged,
            status: TrackChange::Changed {
                close: StationStatusId::new(20),
                since: t0(),
            },
        };
        let later = t0() + Duration::minutes(5);
        let Ok(Some(plan)) = plan_known(&station(), &change, &update(later), &parsed()) else {
            panic!("expected a plan");
        };
        assert!(plan.properties.is_none());
        let Some(status) = plan.status else {
            panic!("expected a status version");
        };
        assert_eq!(status.close, Some(StationStatusId::new(20)));
        assert_eq!(plan.at, later);
    }

    #[test]
    fn unchanged_station_needs_no_write() {
        let change = KnownStationChange {
            properties: TrackChange::Unchanged,
            status: TrackChange::Unchanged,
        };
        let result = plan_known(&station(), &change, &update(t0()), &parsed());
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn closing_before_interval_start_is_inconsistent() {
        let change = KnownStationChange {
            properties: TrackChange::Changed {
                close: StationHistoryId::new(10),
                since: t0(),
            },
            status: TrackChange::Unchanged,
        };
        let earlier = t0() - Duration::minutes(5);
        let result = plan_known(&station(), &change, &update(earlier), &parsed());
        assert!(matches!(result, Err(TrackerError::InconsistentState(_))));
    }

    #[test]
    fn same_timestamp_is_allowed() {
        let change = KnownStationChange {
            properties: TrackChange::Reopened { closed_at: t0() },
            status: TrackChange::Unchanged,
        };
        let result = plan_known(&station(), &change, &update(t0()), &parsed());
        assert!(matches!(result, Ok(Some(_))));
    }
}
