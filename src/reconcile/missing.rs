//! Missing-station handler.
//!
//! A known station absent from the snapshot keeps its identity row. Its
//! open history and status rows are closed at the pass's source timestamp
//! and nothing replaces them; a later pass that sees the station again
//! reopens both tracks.

use chrono::{DateTime, Utc};

use crate::domain::{Station, StationHistory, StationStatus};
use crate::error::TrackerError;
use crate::persistence::IntervalClose;

/// Plans the closing of a missing station's open rows. Returns `None` when
/// both tracks are already closed.
///
/// # Errors
///
/// Returns [`TrackerError::InconsistentState`] when a track has no row at
/// all, or when an open row starts after `at`.
pub fn plan_missing(
    station: &Station,
    latest_history: Option<&StationHistory>,
    latest_status: Option<&StationStatus>,
    at: DateTime<Utc>,
) -> Result<Option<IntervalClose>, TrackerError> {
    let Some(history) = latest_history else {
        return Err(TrackerError::InconsistentState(format!(
            "missing station {} has no history row",
            station.id
        )));
    };
    let Some(status) = latest_status else {
        return Err(TrackerError::InconsistentState(format!(
            "missing station {} has no status row",
            station.id
        )));
    };

    let history_to_close = match history.valid_to {
        Some(_) => None,
        None if history.valid_from > at => {
            return Err(TrackerError::InconsistentState(format!(
                "missing station {} history opened at {} after {at}",
                station.id, history.valid_from
            )));
        }
        None => Some(history.id),
    };
    let status_to_close = match status.valid_to {
        Some(_) => None,
        None if status.valid_from > at => {
            return Err(TrackerError::InconsistentState(format!(
                "missing station {} status opened at {} after {at}",
                station.id, status.valid_from
            )));
        }
        None => Some(status.id),
    };

    let close = IntervalClose {
        station_id: station.id,
        at,
        history: history_to_close,
        status: status_to_close,
    };
    Ok((!close.is_empty()).then_some(close))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::domain::{
        FeedId, FeedUpdateId, StationHistoryId, StationId, StationProperties, StationStatusId,
        StatusCounts,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap_or_default()
    }

    fn station() -> Station {
        Station {
            id: StationId::new(1),
            feed_id: FeedId::new(1),
            properties: StationProperties::default(),
        }
    }

    fn history(valid_to: Option<DateTime<Utc>>) -> StationHistory {
        StationHistory {
            id: StationHistoryId::new(10),
            station_id: StationId::new(1),
            feed_id: FeedId::new(1),
            feed_update_id: FeedUpdateId::new(1),
            valid_from: t0(),
            valid_to,
            properties: StationProperties::default(),
        }
    }

    fn status(valid_to: Option<DateTime<Utc>>) -> StationStatus {
        StationStatus {
            id: StationStatusId::new(20),
            station_id: StationId::new(1),
            feed_update_id: FeedUpdateId::new(1),
            valid_from: t0(),
            valid_to,
            counts: StatusCounts::default(),
        }
    }

    #[test]
    fn open_rows_are_closed() {
        let at = t0() + Duration::minutes(1);
        let Ok(Some(close)) = plan_missing(&station(), Some(&history(None)), Some(&status(None)), at)
        else {
            panic!("expected a close plan");
        };
        assert_eq!(close.history, Some(StationHistoryId::new(10)));
        assert_eq!(close.status, Some(StationStatusId::new(20)));
        assert_eq!(close.at, at);
    }

    #[test]
    fn already_closed_rows_are_left_alone() {
        let at = t0() + Duration::minutes(2);
        let closed = Some(t0() + Duration::minutes(1));
        let result = plan_missing(&station(), Some(&history(closed)), Some(&status(closed)), at);
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn tracks_close_independently() {
        let at = t0() + Duration::minutes(2);
        let closed = Some(t0() + Duration::minutes(1));
        let Ok(Some(close)) = plan_missing(&station(), Some(&history(closed)), Some(&status(None)), at)
        else {
            panic!("expected a close plan");
        };
        assert_eq!(close.history, None);
        assert_eq!(close.status, Some(StationStatusId::new(20)));
    }

    #[test]
    fn station_without_rows_is_inconsistent() {
        let result = plan_missing(&station(), None, None, t0());
        assert!(matches!(result, Err(TrackerError::InconsistentState(_))));
    }
}
