//! Reconcile service: runs feed update passes and serves the read side.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{StreamExt, stream};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::Instrument;
use utoipa::ToSchema;

use crate::domain::{
    Classification, ClassificationCounts, EventBus, Feed, FeedId, FeedLocks, FeedUpdate,
    FeedUpdateId, NewFeed, NewFeedUpdate, PassReport, ReconcileEvent, RecordRejection, Station,
    StationFailure, StationHistory, StationId, StationStatus, UpdateState, UpdateTransition,
};
use crate::error::TrackerError;
use crate::persistence::StationStore;
use crate::reconcile::{
    Claim, IdentityIndex, ParseDiagnostics, ParsedStation, RawStationRecord, classify_known,
    parse_record, plan_known, plan_missing, plan_new,
};

/// Failure reason recorded on passes swept as abandoned.
pub const ABANDONED_REASON: &str = "abandoned";

/// One snapshot of a feed, as submitted for reconciliation.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RawSnapshot {
    /// Snapshot time reported by the feed. Defaults to the pass start time.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Whether the whole scheme is suspended.
    pub scheme_suspended: Option<bool>,
    /// Raw station records keyed by wire key.
    #[schema(value_type = Vec<Object>)]
    pub stations: Vec<RawStationRecord>,
}

/// Tuning knobs of a pass.
#[derive(Debug, Clone, Copy)]
pub struct PassOptions {
    /// Stations reconciled concurrently.
    pub concurrency: usize,
    /// Upper bound on the reconciling phase.
    pub deadline: Duration,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            deadline: Duration::from_secs(120),
        }
    }
}

/// What the reconciling phase produced.
#[derive(Debug, Default)]
struct PassOutcome {
    classifications: ClassificationCounts,
    missing_closed: u32,
    failures: Vec<StationFailure>,
}

/// Records of a snapshot after parsing and de-duplication.
#[derive(Debug, Default)]
struct ParsedSnapshot {
    stations: Vec<ParsedStation>,
    rejected: Vec<RecordRejection>,
    /// Local ids whose only record was rejected. Their stations are kept
    /// as they are rather than treated as missing.
    held: Vec<String>,
    diagnostics: ParseDiagnostics,
}

/// Orchestration layer for reconciliation passes.
///
/// Owns the store handle, the [`EventBus`] and the per-feed pass locks.
/// A pass follows the pattern: acquire the feed lock, start the
/// [`FeedUpdate`], reconcile every record under a deadline, move the
/// update to its terminal state, emit events, return the [`PassReport`].
#[derive(Debug, Clone)]
pub struct ReconcileService {
    store: Arc<dyn StationStore>,
    event_bus: EventBus,
    locks: Arc<FeedLocks>,
    options: PassOptions,
}

impl ReconcileService {
    /// Creates a new `ReconcileService`.
    #[must_use]
    pub fn new(store: Arc<dyn StationStore>, event_bus: EventBus, options: PassOptions) -> Self {
        Self {
            store,
            event_bus,
            locks: Arc::new(FeedLocks::new()),
            options: PassOptions {
                concurrency: options.concurrency.max(1),
                deadline: options.deadline,
            },
        }
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns the per-feed pass locks.
    #[must_use]
    pub fn feed_locks(&self) -> &FeedLocks {
        &self.locks
    }

    /// Returns the pass options in effect.
    #[must_use]
    pub const fn options(&self) -> PassOptions {
        self.options
    }

    /// Registers a feed.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidRequest`] for an empty name or URL.
    pub async fn create_feed(&self, feed: NewFeed) -> Result<Feed, TrackerError> {
        if feed.short_name.trim().is_empty() {
            return Err(TrackerError::InvalidRequest(
                "short_name must not be empty".to_string(),
            ));
        }
        if feed.url.trim().is_empty() {
            return Err(TrackerError::InvalidRequest(
                "url must not be empty".to_string(),
            ));
        }
        let feed = self.store.create_feed(feed).await?;
        tracing::info!(feed_id = %feed.id, short_name = %feed.short_name, "feed registered");
        Ok(feed)
    }

    /// Loads a feed.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::FeedNotFound`] if the feed does not exist.
    pub async fn get_feed(&self, feed_id: FeedId) -> Result<Feed, TrackerError> {
        self.store
            .get_feed(feed_id)
            .await?
            .ok_or(TrackerError::FeedNotFound(feed_id))
    }

    /// Lists all feeds.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Persistence`] on store failure.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, TrackerError> {
        self.store.list_feeds().await
    }

    /// Lists a page of a feed's passes, newest first, with the total count.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::FeedNotFound`] if the feed does not exist.
    pub async fn list_updates(
        &self,
        feed_id: FeedId,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<FeedUpdate>, u64), TrackerError> {
        self.get_feed(feed_id).await?;
        let updates = self.store.list_feed_updates(feed_id, limit, offset).await?;
        let total = self.store.count_feed_updates(feed_id).await?;
        Ok((updates, total))
    }

    /// Loads one pass.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::FeedUpdateNotFound`] if the pass does not
    /// exist.
    pub async fn get_update(&self, feed_update_id: FeedUpdateId) -> Result<FeedUpdate, TrackerError> {
        self.store
            .get_feed_update(feed_update_id)
            .await?
            .ok_or(TrackerError::FeedUpdateNotFound(feed_update_id))
    }

    /// Stations of a feed.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::FeedNotFound`] if the feed does not exist.
    pub async fn stations(&self, feed_id: FeedId) -> Result<Vec<Station>, TrackerError> {
        self.get_feed(feed_id).await?;
        self.store.stations_for_feed(feed_id).await
    }

    /// Loads one station.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::StationNotFound`] if the station does not
    /// exist.
    pub async fn get_station(&self, station_id: StationId) -> Result<Station, TrackerError> {
        self.store
            .get_station(station_id)
            .await?
            .ok_or(TrackerError::StationNotFound(station_id))
    }

    /// Property history of a station, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::StationNotFound`] if the station does not
    /// exist.
    pub async fn station_history(
        &self,
        station_id: StationId,
    ) -> Result<Vec<StationHistory>, TrackerError> {
        self.get_station(station_id).await?;
        self.store.station_history(station_id).await
    }

    /// Status history of a station, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::StationNotFound`] if the station does not
    /// exist.
    pub async fn station_statuses(
        &self,
        station_id: StationId,
    ) -> Result<Vec<StationStatus>, TrackerError> {
        self.get_station(station_id).await?;
        self.store.station_statuses(station_id).await
    }

    /// Runs one reconciliation pass over `snapshot`.
    ///
    /// Station-level problems do not make this method fail: they end the
    /// pass in [`UpdateState::Failed`] and are listed in the returned
    /// report.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::FeedNotFound`] for an unknown feed,
    /// [`TrackerError::PassInProgress`] when another pass holds the feed,
    /// and a store error when the pass row itself cannot be written.
    pub async fn run_update(
        &self,
        feed_id: FeedId,
        snapshot: RawSnapshot,
    ) -> Result<PassReport, TrackerError> {
        let _guard = self.locks.try_acquire(feed_id).await?;
        self.get_feed(feed_id).await?;

        let started_at = Utc::now();
        let source_timestamp = snapshot.source_timestamp.unwrap_or(started_at);
        let number_of_stations = i32::try_from(snapshot.stations.len()).map_err(|_| {
            TrackerError::InvalidRequest("snapshot has too many station records".to_string())
        })?;
        let mut other = Map::new();
        if let Some(suspended) = snapshot.scheme_suspended {
            other.insert("scheme_suspended".to_string(), Value::Bool(suspended));
        }

        let update = self
            .store
            .start_feed_update(NewFeedUpdate {
                feed_id,
                started_at,
                source_timestamp,
                number_of_stations,
                other: Value::Object(other),
            })
            .await?;

        let _ = self.event_bus.publish(ReconcileEvent::PassStarted {
            feed_id,
            feed_update_id: update.id,
            number_of_stations,
            source_timestamp,
            timestamp: Utc::now(),
        });
        tracing::info!(
            %feed_id,
            feed_update_id = %update.id,
            number_of_stations,
            %source_timestamp,
            "pass started"
        );

        let update = match self
            .store
            .transition_feed_update(update.id, UpdateTransition::Reconciling)
            .await
        {
            Ok(update) => update,
            Err(err) => {
                self.abort(&update, &err).await;
                return Err(err);
            }
        };

        let parsed = self.parse_snapshot(&update, &snapshot.stations);
        let span = tracing::info_span!("pass", %feed_id, feed_update_id = %update.id);
        let result = tokio::time::timeout(
            self.options.deadline,
            self.reconcile(&update, &parsed).instrument(span),
        )
        .await;

        let (outcome, failure_reason) = match result {
            Ok(Ok(outcome)) if outcome.failures.is_empty() => (outcome, None),
            Ok(Ok(outcome)) => {
                let reason = format!("{} station(s) failed", outcome.failures.len());
                (outcome, Some(reason))
            }
            Ok(Err(err)) => (
                PassOutcome::default(),
                Some(format!("could not reconcile stations: {err}")),
            ),
            Err(_elapsed) => (
                PassOutcome::default(),
                Some(format!(
                    "pass deadline of {:?} exceeded",
                    self.options.deadline
                )),
            ),
        };

        let finished = self
            .finish(&update, &parsed, failure_reason.clone())
            .await?;

        let report = PassReport {
            feed_id,
            feed_update_id: update.id,
            state: finished.state,
            source_timestamp,
            classifications: outcome.classifications,
            missing_closed: outcome.missing_closed,
            rejected: parsed.rejected,
            unknown_fields: parsed.diagnostics.unknown_fields().clone(),
            failures: outcome.failures,
            failure_reason,
        };

        let _ = self.event_bus.publish(ReconcileEvent::PassFinished {
            feed_id,
            feed_update_id: update.id,
            state: report.state,
            failure_reason: report.failure_reason.clone(),
            timestamp: Utc::now(),
        });
        if report.state == UpdateState::Ended {
            tracing::info!(
                %feed_id,
                feed_update_id = %update.id,
                new = report.classifications.new,
                changed = report
                    .classifications
                    .total()
                    .saturating_sub(report.classifications.unchanged)
                    .saturating_sub(report.classifications.new),
                unchanged = report.classifications.unchanged,
                missing = report.missing_closed,
                rejected = report.rejected.len(),
                "pass ended"
            );
        } else {
            tracing::warn!(
                %feed_id,
                feed_update_id = %update.id,
                failures = report.failures.len(),
                reason = report.failure_reason.as_deref().unwrap_or_default(),
                "pass failed"
            );
        }
        Ok(report)
    }

    /// Fails every non-terminal pass started more than `older_than` ago.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Internal`] if `older_than` is out of range,
    /// or a store error.
    pub async fn sweep_abandoned(&self, older_than: Duration) -> Result<u64, TrackerError> {
        let older_than = chrono::Duration::from_std(older_than)
            .map_err(|e| TrackerError::Internal(e.to_string()))?;
        let now = Utc::now();
        let swept = self
            .store
            .fail_abandoned_updates(now - older_than, now, ABANDONED_REASON)
            .await?;
        if swept > 0 {
            tracing::warn!(swept, "abandoned feed updates marked failed");
        }
        Ok(swept)
    }

    /// Parses every record, drops duplicate local ids (first one wins,
    /// valid or not) and publishes the diagnostics.
    fn parse_snapshot(&self, update: &FeedUpdate, records: &[RawStationRecord]) -> ParsedSnapshot {
        let mut parsed = ParsedSnapshot::default();
        let mut seen: HashSet<String> = HashSet::with_capacity(records.len());

        for raw in records {
            match parse_record(raw, &mut parsed.diagnostics) {
                Ok(station) => {
                    if seen.insert(station.local_id().to_string()) {
                        parsed.stations.push(station);
                    } else {
                        parsed.rejected.push(RecordRejection {
                            local_id: Some(station.local_id().to_string()),
                            reason: "duplicate local id in snapshot".to_string(),
                        });
                    }
                }
                Err(rejection) => {
                    if let Some(local_id) = &rejection.local_id
                        && seen.insert(local_id.clone())
                    {
                        parsed.held.push(local_id.clone());
                    }
                    parsed.rejected.push(rejection);
                }
            }
        }

        for rejection in &parsed.rejected {
            tracing::warn!(
                feed_id = %update.feed_id,
                feed_update_id = %update.id,
                local_id = rejection.local_id.as_deref().unwrap_or_default(),
                reason = %rejection.reason,
                "station record rejected"
            );
            let _ = self.event_bus.publish(ReconcileEvent::RecordRejected {
                feed_id: update.feed_id,
                feed_update_id: update.id,
                local_id: rejection.local_id.clone(),
                reason: rejection.reason.clone(),
                timestamp: Utc::now(),
            });
        }
        for (key, occurrences) in parsed.diagnostics.unknown_fields() {
            tracing::warn!(
                feed_id = %update.feed_id,
                feed_update_id = %update.id,
                key = %key,
                occurrences,
                "unknown station field dropped"
            );
            let _ = self.event_bus.publish(ReconcileEvent::UnknownField {
                feed_id: update.feed_id,
                feed_update_id: update.id,
                key: key.clone(),
                occurrences: *occurrences,
                timestamp: Utc::now(),
            });
        }
        parsed
    }

    /// The reconciling phase: classify and write every parsed record, then
    /// close the intervals of the stations nobody claimed.
    async fn reconcile(
        &self,
        update: &FeedUpdate,
        parsed: &ParsedSnapshot,
    ) -> Result<PassOutcome, TrackerError> {
        let known = self.store.stations_for_feed(update.feed_id).await?;
        let index = IdentityIndex::build(known);
        for local_id in &parsed.held {
            let _ = index.claim(local_id);
        }

        let index = &index;
        let results: Vec<(String, Result<Classification, TrackerError>)> =
            stream::iter(parsed.stations.clone())
                .map(|station| async move {
                    let result = self.reconcile_station(index, update, &station).await;
                    (station.local_id().to_string(), result)
                })
                .buffer_unordered(self.options.concurrency)
                .collect()
                .await;

        let mut outcome = PassOutcome::default();
        for (local_id, result) in results {
            match result {
                Ok(classification) => outcome.classifications.record(classification),
                Err(err) => outcome.failures.push(self.station_failed(update, local_id, false, &err)),
            }
        }

        let results: Vec<(String, Result<bool, TrackerError>)> =
            stream::iter(index.unmatched().cloned())
                .map(|station| async move {
                    let result = self.close_missing(update, &station).await;
                    (station.properties.local_id, result)
                })
                .buffer_unordered(self.options.concurrency)
                .collect()
                .await;

        for (local_id, result) in results {
            match result {
                Ok(true) => outcome.missing_closed = outcome.missing_closed.saturating_add(1),
                Ok(false) => {}
                Err(err) => outcome.failures.push(self.station_failed(update, local_id, true, &err)),
            }
        }
        Ok(outcome)
    }

    async fn reconcile_station(
        &self,
        index: &IdentityIndex,
        update: &FeedUpdate,
        parsed: &ParsedStation,
    ) -> Result<Classification, TrackerError> {
        let station = match index.claim(parsed.local_id()) {
            Claim::Unknown => return self.create_station(update, parsed).await,
            Claim::Matched(station) => station,
            Claim::AlreadyClaimed(station) => {
                return Err(TrackerError::InconsistentState(format!(
                    "station {} claimed twice in one pass",
                    station.id
                )));
            }
        };

        let history = self.store.latest_station_history(station.id).await?;
        let status = self.store.latest_station_status(station.id).await?;
        let change = classify_known(station, history.as_ref(), status.as_ref(), parsed)?;
        let classification = change.classification();
        tracing::debug!(
            station_id = %station.id,
            local_id = %parsed.local_id(),
            ?classification,
            "station classified"
        );

        let Some(write) = plan_known(station, &change, update, parsed)? else {
            return Ok(classification);
        };
        self.store.apply_station_write(write).await?;

        let now = Utc::now();
        if change.properties.is_change() {
            let reopened = change.properties.close().is_none();
            tracing::debug!(station_id = %station.id, reopened, "property version opened");
            let _ = self.event_bus.publish(ReconcileEvent::PropertiesVersioned {
                feed_id: update.feed_id,
                feed_update_id: update.id,
                station_id: station.id,
                local_id: parsed.local_id().to_string(),
                reopened,
                timestamp: now,
            });
        }
        if change.status.is_change() {
            let reopened = change.status.close().is_none();
            tracing::debug!(station_id = %station.id, reopened, "status version opened");
            let _ = self.event_bus.publish(ReconcileEvent::StatusVersioned {
                feed_id: update.feed_id,
                feed_update_id: update.id,
                station_id: station.id,
                local_id: parsed.local_id().to_string(),
                counts: parsed.status,
                reopened,
                timestamp: now,
            });
        }
        Ok(classification)
    }

    async fn create_station(
        &self,
        update: &FeedUpdate,
        parsed: &ParsedStation,
    ) -> Result<Classification, TrackerError> {
        let write = plan_new(update.feed_id, update, parsed);
        let station_id = self.store.apply_station_write(write).await?;
        tracing::debug!(
            %station_id,
            local_id = %parsed.local_id(),
            "station created"
        );
        let _ = self.event_bus.publish(ReconcileEvent::StationCreated {
            feed_id: update.feed_id,
            feed_update_id: update.id,
            station_id,
            local_id: parsed.local_id().to_string(),
            timestamp: Utc::now(),
        });
        Ok(Classification::New)
    }

    /// Returns `true` if intervals were closed, `false` if the station was
    /// already closed by an earlier pass.
    async fn close_missing(&self, update: &FeedUpdate, station: &Station) -> Result<bool, TrackerError> {
        let history = self.store.latest_station_history(station.id).await?;
        let status = self.store.latest_station_status(station.id).await?;
        let Some(close) = plan_missing(
            station,
            history.as_ref(),
            status.as_ref(),
            update.source_timestamp,
        )?
        else {
            return Ok(false);
        };
        self.store.close_intervals(close).await?;

        tracing::debug!(
            station_id = %station.id,
            local_id = %station.properties.local_id,
            "missing station closed"
        );
        let _ = self.event_bus.publish(ReconcileEvent::StationMissing {
            feed_id: update.feed_id,
            feed_update_id: update.id,
            station_id: station.id,
            local_id: station.properties.local_id.clone(),
            timestamp: Utc::now(),
        });
        Ok(true)
    }

    fn station_failed(
        &self,
        update: &FeedUpdate,
        local_id: String,
        missing: bool,
        err: &TrackerError,
    ) -> StationFailure {
        tracing::error!(
            feed_id = %update.feed_id,
            feed_update_id = %update.id,
            local_id = %local_id,
            missing,
            error = %err,
            "station reconciliation failed"
        );
        let _ = self.event_bus.publish(ReconcileEvent::StationFailed {
            feed_id: update.feed_id,
            feed_update_id: update.id,
            local_id: local_id.clone(),
            error: err.to_string(),
            timestamp: Utc::now(),
        });
        StationFailure {
            local_id,
            missing,
            error: err.to_string(),
        }
    }

    /// Moves the pass to `ended` or `failed`, recording the parse
    /// diagnostics in `other`.
    async fn finish(
        &self,
        update: &FeedUpdate,
        parsed: &ParsedSnapshot,
        failure_reason: Option<String>,
    ) -> Result<FeedUpdate, TrackerError> {
        let mut other = match &update.other {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        if !parsed.diagnostics.unknown_fields().is_empty() {
            other.insert(
                "unknown_fields".to_string(),
                json!(parsed.diagnostics.unknown_fields()),
            );
        }
        if parsed.diagnostics.dropped_transient() > 0 {
            other.insert(
                "dropped_transient".to_string(),
                json!(parsed.diagnostics.dropped_transient()),
            );
        }
        if !parsed.rejected.is_empty() {
            other.insert("rejected_records".to_string(), json!(parsed.rejected.len()));
        }
        let other = Value::Object(other);

        let transition = match failure_reason {
            None => UpdateTransition::Ended {
                ended_at: Utc::now(),
                other,
            },
            Some(reason) => UpdateTransition::Failed {
                failed_at: Utc::now(),
                reason,
                other,
            },
        };
        self.store
            .transition_feed_update(update.id, transition)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    feed_update_id = %update.id,
                    error = %err,
                    "could not record the end of the pass"
                );
            })
    }

    /// Best-effort failure of a pass that could not start reconciling.
    async fn abort(&self, update: &FeedUpdate, err: &TrackerError) {
        let transition = UpdateTransition::Failed {
            failed_at: Utc::now(),
            reason: err.to_string(),
            other: update.other.clone(),
        };
        if let Err(inner) = self.store.transition_feed_update(update.id, transition).await {
            tracing::error!(
                feed_update_id = %update.id,
                error = %inner,
                "could not mark the pass failed"
            );
        }
        let _ = self.event_bus.publish(ReconcileEvent::PassFinished {
            feed_id: update.feed_id,
            feed_update_id: update.id,
            state: UpdateState::Failed,
            failure_reason: Some(err.to_string()),
            timestamp: Utc::now(),
        });
    }
}
