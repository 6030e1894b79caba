//! Feeds and the reconciliation passes run against them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{FeedId, FeedUpdateId};

/// A source of station data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Feed {
    /// Feed identifier.
    pub id: FeedId,
    /// Short human-readable name (e.g. `"bixi-montreal"`).
    pub short_name: String,
    /// URL the feed is published at.
    pub url: String,
    /// Free-form metadata.
    #[schema(value_type = Object)]
    pub other: serde_json::Value,
}

/// Fields required to register a feed.
#[derive(Debug, Clone)]
pub struct NewFeed {
    /// Short human-readable name.
    pub short_name: String,
    /// Feed URL.
    pub url: String,
    /// Free-form metadata.
    pub other: serde_json::Value,
}

/// Lifecycle state of a [`FeedUpdate`].
///
/// `Started -> Reconciling -> Ended | Failed`. The two last states are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    /// Row created, nothing reconciled yet.
    Started,
    /// Station records are being reconciled.
    Reconciling,
    /// Every station was reconciled.
    Ended,
    /// The pass stopped early or some stations failed.
    Failed,
}

impl UpdateState {
    /// Returns the state as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Reconciling => "reconciling",
            Self::Ended => "ended",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` for [`Self::Ended`] and [`Self::Failed`].
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Failed)
    }

    /// Returns `true` if a pass in `self` may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Started, Self::Reconciling)
                | (Self::Started | Self::Reconciling, Self::Ended | Self::Failed)
        )
    }
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "reconciling" => Ok(Self::Reconciling),
            "ended" => Ok(Self::Ended),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown feed update state: {other}")),
        }
    }
}

/// One reconciliation pass over a feed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FeedUpdate {
    /// Pass identifier.
    pub id: FeedUpdateId,
    /// Feed the snapshot came from.
    pub feed_id: FeedId,
    /// When the pass started.
    pub started_at: DateTime<Utc>,
    /// Set once when the pass ends successfully.
    pub ended_at: Option<DateTime<Utc>>,
    /// Snapshot time reported by the feed. Opens and closes intervals.
    pub source_timestamp: DateTime<Utc>,
    /// Number of raw station records in the snapshot.
    pub number_of_stations: i32,
    /// Lifecycle state.
    pub state: UpdateState,
    /// Set when the pass fails.
    pub failed_at: Option<DateTime<Utc>>,
    /// Why the pass failed.
    pub failure_reason: Option<String>,
    /// Free-form metadata (`scheme_suspended`, unknown wire keys).
    #[schema(value_type = Object)]
    pub other: serde_json::Value,
}

/// Fields required to start a pass.
#[derive(Debug, Clone)]
pub struct NewFeedUpdate {
    /// Feed the snapshot came from.
    pub feed_id: FeedId,
    /// Pass start time.
    pub started_at: DateTime<Utc>,
    /// Snapshot time reported by the feed.
    pub source_timestamp: DateTime<Utc>,
    /// Number of raw station records.
    pub number_of_stations: i32,
    /// Free-form metadata.
    pub other: serde_json::Value,
}

/// A state change requested for a running pass.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateTransition {
    /// Start reconciling station records.
    Reconciling,
    /// Finish successfully at `ended_at`.
    Ended {
        /// Completion time.
        ended_at: DateTime<Utc>,
        /// Metadata replacing the row's `other`.
        other: serde_json::Value,
    },
    /// Finish with a failure.
    Failed {
        /// Failure time.
        failed_at: DateTime<Utc>,
        /// Human-readable reason.
        reason: String,
        /// Metadata replacing the row's `other`.
        other: serde_json::Value,
    },
}

impl UpdateTransition {
    /// Returns the state this transition leads to.
    #[must_use]
    pub const fn target(&self) -> UpdateState {
        match self {
            Self::Reconciling => UpdateState::Reconciling,
            Self::Ended { .. } => UpdateState::Ended,
            Self::Failed { .. } => UpdateState::Failed,
        }
    }

    /// Applies the transition to an in-memory row.
    pub fn apply_to(&self, update: &mut FeedUpdate) {
        update.state = self.target();
        match self {
            Self::Reconciling => {}
            Self::Ended { ended_at, other } => {
                update.ended_at = Some(*ended_at);
                update.other = other.clone();
            }
            Self::Failed {
                failed_at,
                reason,
                other,
            } => {
                update.failed_at = Some(*failed_at);
                update.failure_reason = Some(reason.clone());
                update.other = other.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_str() {
        for state in [
            UpdateState::Started,
            UpdateState::Reconciling,
            UpdateState::Ended,
            UpdateState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<UpdateState>(), Ok(state));
        }
        assert!("paused".parse::<UpdateState>().is_err());
    }

    #[test]
    fn terminal_states_do_not_transition() {
        assert!(UpdateState::Started.can_transition_to(UpdateState::Reconciling));
        assert!(UpdateState::Started.can_transition_to(UpdateState::Failed));
        assert!(UpdateState::Reconciling.can_transition_to(UpdateState::Ended));
        assert!(!UpdateState::Reconciling.can_transition_to(UpdateState::Reconciling));
        assert!(!UpdateState::Ended.can_transition_to(UpdateState::Failed));
        assert!(!UpdateState::Failed.can_transition_to(UpdateState::Ended));
    }

    #[test]
    fn failed_transition_keeps_ended_at_empty() {
        let now = Utc::now();
        let mut update = FeedUpdate {
            id: FeedUpdateId::new(1),
            feed_id: FeedId::new(1),
            started_at: now,
            ended_at: None,
            source_timestamp: now,
            number_of_stations: 0,
            state: UpdateState::Reconciling,
            failed_at: None,
            failure_reason: None,
            other: serde_json::json!({}),
        };
        UpdateTransition::Failed {
            failed_at: now,
            reason: "deadline exceeded".to_string(),
            other: serde_json::json!({}),
        }
        .apply_to(&mut update);
        assert_eq!(update.state, UpdateState::Failed);
        assert!(update.ended_at.is_none());
        assert_eq!(update.failure_reason.as_deref(), Some("deadline exceeded"));
    }
}
