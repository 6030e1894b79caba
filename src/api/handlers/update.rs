//! Feed update handlers: submit a snapshot, list and get passes.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{FeedUpdateListResponse, PaginationParams};
use crate::app_state::AppState;
use crate::domain::{FeedId, FeedUpdate, FeedUpdateId, PassReport};
use crate::error::{ErrorResponse, TrackerError};
use crate::service::RawSnapshot;

/// `POST /feeds/{feed_id}/updates`: Reconcile a snapshot.
///
/// A pass that ran to completion is reported with `201` whether it ended
/// or failed; the report's `state` tells which.
///
/// # Errors
///
/// Returns [`TrackerError::FeedNotFound`] for an unknown feed and
/// [`TrackerError::PassInProgress`] when a pass is already running for it.
#[utoipa::path(
    post,
    path = "/api/v1/feeds/{feed_id}/updates",
    tag = "Feed updates",
    summary = "Submit a snapshot",
    description = "Runs one reconciliation pass over the submitted station records and returns its report. Passes for the same feed never overlap.",
    params(
        ("feed_id" = i64, Path, description = "Feed identifier"),
    ),
    request_body = RawSnapshot,
    responses(
        (status = 201, description = "Pass finished", body = PassReport),
        (status = 400, description = "Invalid snapshot", body = ErrorResponse),
        (status = 404, description = "Feed not found", body = ErrorResponse),
        (status = 409, description = "A pass is already running for the feed", body = ErrorResponse),
    )
)]
pub async fn submit_snapshot(
    State(state): State<AppState>,
    Path(feed_id): Path<FeedId>,
    payload: Result<Json<RawSnapshot>, JsonRejection>,
) -> Result<impl IntoResponse, TrackerError> {
    let Json(snapshot) = payload?;
    let report = state.service.run_update(feed_id, snapshot).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// `GET /feeds/{feed_id}/updates`: List passes of a feed, newest first.
///
/// # Errors
///
/// Returns [`TrackerError::FeedNotFound`] if the feed does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/feeds/{feed_id}/updates",
    tag = "Feed updates",
    summary = "List feed updates",
    params(
        ("feed_id" = i64, Path, description = "Feed identifier"),
        PaginationParams,
    ),
    responses(
        (status = 200, description = "Paginated passes", body = FeedUpdateListResponse),
        (status = 404, description = "Feed not found", body = ErrorResponse),
    )
)]
pub async fn list_updates(
    State(state): State<AppState>,
    Path(feed_id): Path<FeedId>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, TrackerError> {
    let params = params.clamped();
    let (data, total) = state
        .service
        .list_updates(feed_id, params.per_page, params.offset())
        .await?;
    Ok(Json(FeedUpdateListResponse {
        data,
        pagination: params.meta(total),
    }))
}

/// `GET /updates/{update_id}`: Get one pass.
///
/// # Errors
///
/// Returns [`TrackerError::FeedUpdateNotFound`] if the pass does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/updates/{update_id}",
    tag = "Feed updates",
    summary = "Get feed update",
    params(
        ("update_id" = i64, Path, description = "Feed update identifier"),
    ),
    responses(
        (status = 200, description = "Feed update", body = FeedUpdate),
        (status = 404, description = "Feed update not found", body = ErrorResponse),
    )
)]
pub async fn get_update(
    State(state): State<AppState>,
    Path(update_id): Path<FeedUpdateId>,
) -> Result<impl IntoResponse, TrackerError> {
    let update = state.service.get_update(update_id).await?;
    Ok(Json(update))
}

/// Feed update routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/feeds/{feed_id}/updates",
            get(list_updates).post(submit_snapshot),
        )
        .route("/updates/{update_id}", get(get_update))
}
