//! PostgreSQL implementation of the persistence layer.
//!
//! Coordinates are stored as `NUMERIC`, written from decimal text and read
//! back as `DOUBLE PRECISION`. Every write plan runs in its
//! own transaction; an early return drops the transaction, which rolls it
//! back.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use super::StationStore;
use super::models::{IntervalClose, PropertyVersion, StationTarget, StationWrite, StatusVersion};
use crate::domain::{
    Feed, FeedId, FeedUpdate, FeedUpdateId, NewFeed, NewFeedUpdate, Station, StationHistory,
    StationHistoryId, StationId, StationProperties, StationStatus, StationStatusId, StatusCounts,
    UpdateState, UpdateTransition,
};
use crate::error::TrackerError;

type FeedRow = (i64, String, String, Value);

type FeedUpdateRow = (
    i64,
    i64,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
    i32,
    String,
    Option<DateTime<Utc>>,
    Option<String>,
    Value,
);

type StationRow = (
    i64,
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<f64>,
    Option<f64>,
    Option<i32>,
    Json<BTreeMap<String, Value>>,
);

type HistoryRow = (
    i64,
    i64,
    i64,
    i64,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<f64>,
    Option<f64>,
    Option<i32>,
    Json<BTreeMap<String, Value>>,
);

type StatusRow = (
    i64,
    i64,
    i64,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    i32,
    i32,
    i32,
    i32,
);

const SELECT_UPDATE: &str = "SELECT id, feed_id, started_at, ended_at, source_timestamp, \
     number_of_stations, state, failed_at, failure_reason, other FROM feed_update";

const SELECT_STATION: &str = "SELECT id, feed_id, local_id, short_name, long_name, address, \
     lat::DOUBLE PRECISION, lon::DOUBLE PRECISION, total_spots, other FROM station";

const SELECT_HISTORY: &str = "SELECT id, station_id, feed_id, feed_update_id, valid_from, \
     valid_to, local_id, short_name, long_name, address, lat::DOUBLE PRECISION, \
     lon::DOUBLE PRECISION, total_spots, other FROM station_history";

const SELECT_STATUS: &str = "SELECT id, station_id, feed_update_id, valid_from, valid_to, \
     available_vehicles, available_spots, disabled_vehicles, disabled_spots \
     FROM station_status";

/// Coordinates travel as decimal text: a float8 to numeric cast keeps only
/// 15 significant digits.
fn coordinate_text(value: Option<f64>) -> Option<String> {
    value.map(|v| v.to_string())
}

fn feed_from_row((id, short_name, url, other): FeedRow) -> Feed {
    Feed {
        id: FeedId::new(id),
        short_name,
        url,
        other,
    }
}

fn update_from_row(row: FeedUpdateRow) -> Result<FeedUpdate, TrackerError> {
    let (
        id,
        feed_id,
        started_at,
        ended_at,
        source_timestamp,
        number_of_stations,
        state,
        failed_at,
        failure_reason,
        other,
    ) = row;
    Ok(FeedUpdate {
        id: FeedUpdateId::new(id),
        feed_id: FeedId::new(feed_id),
        started_at,
        ended_at,
        source_timestamp,
        number_of_stations,
        state: UpdateState::from_str(&state).map_err(TrackerError::Persistence)?,
        failed_at,
        failure_reason,
        other,
    })
}

fn station_from_row(row: StationRow) -> Station {
    let (id, feed_id, local_id, short_name, long_name, address, lat, lon, total_spots, other) =
        row;
    Station {
        id: StationId::new(id),
        feed_id: FeedId::new(feed_id),
        properties: StationProperties {
            local_id,
            short_name,
            long_name,
            address,
            lat,
            lon,
            total_spots,
            other: other.0,
        },
    }
}

fn history_from_row(row: HistoryRow) -> StationHistory {
    let (
        id,
        station_id,
        feed_id,
        feed_update_id,
        valid_from,
        valid_to,
        local_id,
        short_name,
        long_name,
        address,
        lat,
        lon,
        total_spots,
        other,
    ) = row;
    StationHistory {
        id: StationHistoryId::new(id),
        station_id: StationId::new(station_id),
        feed_id: FeedId::new(feed_id),
        feed_update_id: FeedUpdateId::new(feed_update_id),
        valid_from,
        valid_to,
        properties: StationProperties {
            local_id,
            short_name,
            long_name,
            address,
            lat,
            lon,
            total_spots,
            other: other.0,
        },
    }
}

fn status_from_row(row: StatusRow) -> StationStatus {
    let (
        id,
        station_id,
        feed_update_id,
        valid_from,
        valid_to,
        available_vehicles,
        available_spots,
        disabled_vehicles,
        disabled_spots,
    ) = row;
    StationStatus {
        id: StationStatusId::new(id),
        station_id: StationId::new(station_id),
        feed_update_id: FeedUpdateId::new(feed_update_id),
        valid_from,
        valid_to,
        counts: StatusCounts {
            available_vehicles,
            available_spots,
            disabled_vehicles,
            disabled_spots,
        },
    }
}

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_station(
    conn: &mut PgConnection,
    feed_id: FeedId,
    properties: &StationProperties,
) -> Result<StationId, TrackerError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO station (feed_id, local_id, short_name, long_name, address, lat, lon, \
         total_spots, other) \
         VALUES ($1, $2, $3, $4, $5, $6::NUMERIC, $7::NUMERIC, $8, $9) \
         RETURNING id",
    )
    .bind(feed_id.get())
    .bind(&properties.local_id)
    .bind(&properties.short_name)
    .bind(&properties.long_name)
    .bind(&properties.address)
    .bind(coordinate_text(properties.lat))
    .bind(coordinate_text(properties.lon))
    .bind(properties.total_spots)
    .bind(Json(&properties.other))
    .fetch_one(&mut *conn)
    .await?;
    Ok(StationId::new(id))
}

async fn update_station(
    conn: &mut PgConnection,
    station_id: StationId,
    properties: &StationProperties,
) -> Result<(), TrackerError> {
    sqlx::query(
        "UPDATE station SET local_id = $2, short_name = $3, long_name = $4, address = $5, \
         lat = $6::NUMERIC, lon = $7::NUMERIC, total_spots = $8, other = $9 \
         WHERE id = $1",
    )
    .bind(station_id.get())
    .bind(&properties.local_id)
    .bind(&properties.short_name)
    .bind(&properties.long_name)
    .bind(&properties.address)
    .bind(coordinate_text(properties.lat))
    .bind(coordinate_text(properties.lon))
    .bind(properties.total_spots)
    .bind(Json(&properties.other))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn close_history_row(
    conn: &mut PgConnection,
    station_id: StationId,
    row_id: StationHistoryId,
    at: DateTime<Utc>,
) -> Result<(), TrackerError> {
    let result = sqlx::query(
        "UPDATE station_history SET valid_to = $1 \
         WHERE id = $2 AND station_id = $3 AND valid_to IS NULL",
    )
    .bind(at)
    .bind(row_id.get())
    .bind(station_id.get())
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(TrackerError::InconsistentState(format!(
            "history row {row_id} of station {station_id} is not open"
        )));
    }
    Ok(())
}

async fn close_status_row(
    conn: &mut PgConnection,
    station_id: StationId,
    row_id: StationStatusId,
    at: DateTime<Utc>,
) -> Result<(), TrackerError> {
    let result = sqlx::query(
        "UPDATE station_status SET valid_to = $1 \
         WHERE id = $2 AND station_id = $3 AND valid_to IS NULL",
    )
    .bind(at)
    .bind(row_id.get())
    .bind(station_id.get())
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(TrackerError::InconsistentState(format!(
            "status row {row_id} of station {station_id} is not open"
        )));
    }
    Ok(())
}

async fn insert_history_row(
    conn: &mut PgConnection,
    station_id: StationId,
    feed_id: FeedId,
    write: &StationWrite,
    version: &PropertyVersion,
) -> Result<(), TrackerError> {
    let properties = &version.snapshot;
    sqlx::query(
        "INSERT INTO station_history (station_id, feed_id, feed_update_id, valid_from, \
         local_id, short_name, long_name, address, lat, lon, total_spots, other) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::NUMERIC, $10::NUMERIC, \
         $11, $12)",
    )
    .bind(station_id.get())
    .bind(feed_id.get())
    .bind(write.feed_update_id.get())
    .bind(write.at)
    .bind(&properties.local_id)
    .bind(&properties.short_name)
    .bind(&properties.long_name)
    .bind(&properties.address)
    .bind(coordinate_text(properties.lat))
    .bind(coordinate_text(properties.lon))
    .bind(properties.total_spots)
    .bind(Json(&properties.other))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_status_row(
    conn: &mut PgConnection,
    station_id: StationId,
    write: &StationWrite,
    version: &StatusVersion,
) -> Result<(), TrackerError> {
    let counts = version.counts;
    sqlx::query(
        "INSERT INTO station_status (station_id, feed_update_id, valid_from, \
         available_vehicles, available_spots, disabled_vehicles, disabled_spots) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(station_id.get())
    .bind(write.feed_update_id.get())
    .bind(write.at)
    .bind(counts.available_vehicles)
    .bind(counts.available_spots)
    .bind(counts.disabled_vehicles)
    .bind(counts.disabled_spots)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl StationStore for PostgresStore {
    async fn create_feed(&self, feed: NewFeed) -> Result<Feed, TrackerError> {
        let row = sqlx::query_as::<_, FeedRow>(
            "INSERT INTO feed (short_name, url, other) VALUES ($1, $2, $3) \
             RETURNING id, short_name, url, other",
        )
        .bind(&feed.short_name)
        .bind(&feed.url)
        .bind(&feed.other)
        .fetch_one(&self.pool)
        .await?;
        Ok(feed_from_row(row))
    }

    async fn get_feed(&self, feed_id: FeedId) -> Result<Option<Feed>, TrackerError> {
        let row = sqlx::query_as::<_, FeedRow>(
            "SELECT id, short_name, url, other FROM feed WHERE id = $1",
        )
        .bind(feed_id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(feed_from_row))
    }

    async fn list_feeds(&self) -> Result<Vec<Feed>, TrackerError> {
        let rows =
            sqlx::query_as::<_, FeedRow>("SELECT id, short_name, url, other FROM feed ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(feed_from_row).collect())
    }

    async fn start_feed_update(&self, update: NewFeedUpdate) -> Result<FeedUpdate, TrackerError> {
        let row = sqlx::query_as::<_, FeedUpdateRow>(
            "INSERT INTO feed_update (feed_id, started_at, source_timestamp, \
             number_of_stations, state, other) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, feed_id, started_at, ended_at, source_timestamp, \
             number_of_stations, state, failed_at, failure_reason, other",
        )
        .bind(update.feed_id.get())
        .bind(update.started_at)
        .bind(update.source_timestamp)
        .bind(update.number_of_stations)
        .bind(UpdateState::Started.as_str())
        .bind(&update.other)
        .fetch_one(&self.pool)
        .await?;
        update_from_row(row)
    }

    async fn transition_feed_update(
        &self,
        feed_update_id: FeedUpdateId,
        transition: UpdateTransition,
    ) -> Result<FeedUpdate, TrackerError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, FeedUpdateRow>(&format!(
            "{SELECT_UPDATE} WHERE id = $1 FOR UPDATE"
        ))
        .bind(feed_update_id.get())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(TrackerError::FeedUpdateNotFound(feed_update_id));
        };
        let mut update = update_from_row(row)?;
        if !update.state.can_transition_to(transition.target()) {
            return Err(TrackerError::InconsistentState(format!(
                "feed update {feed_update_id} cannot move from {} to {}",
                update.state,
                transition.target()
            )));
        }
        transition.apply_to(&mut update);

        sqlx::query(
            "UPDATE feed_update SET state = $2, ended_at = $3, failed_at = $4, \
             failure_reason = $5, other = $6 WHERE id = $1",
        )
        .bind(feed_update_id.get())
        .bind(update.state.as_str())
        .bind(update.ended_at)
        .bind(update.failed_at)
        .bind(&update.failure_reason)
        .bind(&update.other)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(update)
    }

    async fn get_feed_update(
        &self,
        feed_update_id: FeedUpdateId,
    ) -> Result<Option<FeedUpdate>, TrackerError> {
        let row = sqlx::query_as::<_, FeedUpdateRow>(&format!("{SELECT_UPDATE} WHERE id = $1"))
            .bind(feed_update_id.get())
            .fetch_optional(&self.pool)
            .await?;
        row.map(update_from_row).transpose()
    }

    async fn list_feed_updates(
        &self,
        feed_id: FeedId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<FeedUpdate>, TrackerError> {
        let rows = sqlx::query_as::<_, FeedUpdateRow>(&format!(
            "{SELECT_UPDATE} WHERE feed_id = $1 \
             ORDER BY started_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(feed_id.get())
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(update_from_row).collect()
    }

    async fn count_feed_updates(&self, feed_id: FeedId) -> Result<u64, TrackerError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM feed_update WHERE feed_id = $1")
                .bind(feed_id.get())
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn fail_abandoned_updates(
        &self,
        started_before: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<u64, TrackerError> {
        let result = sqlx::query(
            "UPDATE feed_update SET state = $1, failed_at = $2, failure_reason = $3 \
             WHERE state IN ($4, $5) AND started_at < $6",
        )
        .bind(UpdateState::Failed.as_str())
        .bind(failed_at)
        .bind(reason)
        .bind(UpdateState::Started.as_str())
        .bind(UpdateState::Reconciling.as_str())
        .bind(started_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn stations_for_feed(&self, feed_id: FeedId) -> Result<Vec<Station>, TrackerError> {
        let rows = sqlx::query_as::<_, StationRow>(&format!(
            "{SELECT_STATION} WHERE feed_id = $1 ORDER BY id"
        ))
        .bind(feed_id.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(station_from_row).collect())
    }

    async fn get_station(&self, station_id: StationId) -> Result<Option<Station>, TrackerError> {
        let row = sqlx::query_as::<_, StationRow>(&format!("{SELECT_STATION} WHERE id = $1"))
            .bind(station_id.get())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(station_from_row))
    }

    async fn latest_station_history(
        &self,
        station_id: StationId,
    ) -> Result<Option<StationHistory>, TrackerError> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            "{SELECT_HISTORY} WHERE station_id = $1 ORDER BY valid_from DESC, id DESC LIMIT 1"
        ))
        .bind(station_id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(history_from_row))
    }

    async fn latest_station_status(
        &self,
        station_id: StationId,
    ) -> Result<Option<StationStatus>, TrackerError> {
        let row = sqlx::query_as::<_, StatusRow>(&format!(
            "{SELECT_STATUS} WHERE station_id = $1 ORDER BY valid_from DESC, id DESC LIMIT 1"
        ))
        .bind(station_id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(status_from_row))
    }

    async fn station_history(
        &self,
        station_id: StationId,
    ) -> Result<Vec<StationHistory>, TrackerError> {
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "{SELECT_HISTORY} WHERE station_id = $1 ORDER BY valid_from, id"
        ))
        .bind(station_id.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(history_from_row).collect())
    }

    async fn station_statuses(
        &self,
        station_id: StationId,
    ) -> Result<Vec<StationStatus>, TrackerError> {
        let rows = sqlx::query_as::<_, StatusRow>(&format!(
            "{SELECT_STATUS} WHERE station_id = $1 ORDER BY valid_from, id"
        ))
        .bind(station_id.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(status_from_row).collect())
    }

    async fn apply_station_write(&self, write: StationWrite) -> Result<StationId, TrackerError> {
        let mut tx = self.pool.begin().await?;

        let (station_id, feed_id) = match &write.target {
            StationTarget::New { feed_id } => {
                let Some(version) = write.properties.as_ref().filter(|_| write.status.is_some())
                else {
                    return Err(TrackerError::InconsistentState(
                        "a new station needs both a property and a status version".to_string(),
                    ));
                };
                let id = insert_station(&mut tx, *feed_id, &version.snapshot).await?;
                (id, *feed_id)
            }
            StationTarget::Existing(id) => {
                let feed_id = sqlx::query_scalar::<_, i64>(
                    "SELECT feed_id FROM station WHERE id = $1 FOR UPDATE",
                )
                .bind(id.get())
                .fetch_optional(&mut *tx)
                .await?;
                let Some(feed_id) = feed_id else {
                    return Err(TrackerError::StationNotFound(*id));
                };
                (*id, FeedId::new(feed_id))
            }
        };

        if let Some(version) = &write.properties {
            if let Some(close) = version.close {
                close_history_row(&mut tx, station_id, close, write.at).await?;
            }
            insert_history_row(&mut tx, station_id, feed_id, &write, version).await?;
            if matches!(write.target, StationTarget::Existing(_)) {
                update_station(&mut tx, station_id, &version.snapshot).await?;
            }
        }

        if let Some(version) = &write.status {
            if let Some(close) = version.close {
                close_status_row(&mut tx, station_id, close, write.at).await?;
            }
            insert_status_row(&mut tx, station_id, &write, version).await?;
        }

        tx.commit().await?;
        Ok(station_id)
    }

    async fn close_intervals(&self, close: IntervalClose) -> Result<(), TrackerError> {
        let mut tx = self.pool.begin().await?;
        if let Some(row_id) = close.history {
            close_history_row(&mut tx, close.station_id, row_id, close.at).await?;
        }
        if let Some(row_id) = close.status {
            close_status_row(&mut tx, close.station_id, row_id, close.at).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
