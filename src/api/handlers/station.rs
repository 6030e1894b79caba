//! Station handlers: stations of a feed, one station, its histories.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{StationHistoryResponse, StationListResponse, StationStatusResponse};
use crate::app_state::AppState;
use crate::domain::{FeedId, Station, StationId};
use crate::error::{ErrorResponse, TrackerError};

/// `GET /feeds/{feed_id}/stations`: Stations of a feed.
///
/// # Errors
///
/// Returns [`TrackerError::FeedNotFound`] if the feed does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/feeds/{feed_id}/stations",
    tag = "Stations",
    summary = "List stations of a feed",
    description = "Returns every station ever seen in the feed with its current properties, including stations missing from the latest snapshot.",
    params(
        ("feed_id" = i64, Path, description = "Feed identifier"),
    ),
    responses(
        (status = 200, description = "Stations", body = StationListResponse),
        (status = 404, description = "Feed not found", body = ErrorResponse),
    )
)]
pub async fn list_stations(
    State(state): State<AppState>,
    Path(feed_id): Path<FeedId>,
) -> Result<impl IntoResponse, TrackerError> {
    let data = state.service.stations(feed_id).await?;
    Ok(Json(StationListResponse { data }))
}

/// `GET /stations/{station_id}`: Get one station.
///
/// # Errors
///
/// Returns [`TrackerError::StationNotFound`] if the station does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/stations/{station_id}",
    tag = "Stations",
    summary = "Get station",
    params(
        ("station_id" = i64, Path, description = "Station identifier"),
    ),
    responses(
        (status = 200, description = "Station", body = Station),
        (status = 404, description = "Station not found", body = ErrorResponse),
    )
)]
pub async fn get_station(
    State(state): State<AppState>,
    Path(station_id): Path<StationId>,
) -> Result<impl IntoResponse, TrackerError> {
    let station = state.service.get_station(station_id).await?;
    Ok(Json(station))
}

/// `GET /stations/{station_id}/history`: Property versions.
///
/// # Errors
///
/// Returns [`TrackerError::StationNotFound`] if the station does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/stations/{station_id}/history",
    tag = "Stations",
    summary = "Station property history",
    params(
        ("station_id" = i64, Path, description = "Station identifier"),
    ),
    responses(
        (status = 200, description = "Property versions, oldest first", body = StationHistoryResponse),
        (status = 404, description = "Station not found", body = ErrorResponse),
    )
)]
pub async fn station_history(
    State(state): State<AppState>,
    Path(station_id): Path<StationId>,
) -> Result<impl IntoResponse, TrackerError> {
    let data = state.service.station_history(station_id).await?;
    Ok(Json(StationHistoryResponse { station_id, data }))
}

/// `GET /stations/{station_id}/status`: Status versions.
///
/// # Errors
///
/// Returns [`TrackerError::StationNotFound`] if the station does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/stations/{station_id}/status",
    tag = "Stations",
    summary = "Station status history",
    params(
        ("station_id" = i64, Path, description = "Station identifier"),
    ),
    responses(
        (status = 200, description = "Status versions, oldest first", body = StationStatusResponse),
        (status = 404, description = "Station not found", body = ErrorResponse),
    )
)]
pub async fn station_status(
    State(state): State<AppState>,
    Path(station_id): Path<StationId>,
) -> Result<impl IntoResponse, TrackerError> {
    let data = state.service.station_statuses(station_id).await?;
    Ok(Json(StationStatusResponse { station_id, data }))
}

/// Station routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/feeds/{feed_id}/stations", get(list_stations))
        .route("/stations/{station_id}", get(get_station))
        .route("/stations/{station_id}/history", get(station_history))
        .route("/stations/{station_id}/status", get(station_status))
}
