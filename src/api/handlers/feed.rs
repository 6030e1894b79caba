//! Feed handlers: register, list, get.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{CreateFeedRequest, FeedListResponse};
use crate::app_state::AppState;
use crate::domain::{Feed, FeedId};
use crate::error::{ErrorResponse, TrackerError};

/// `POST /feeds`: Register a feed.
///
/// # Errors
///
/// Returns [`TrackerError::InvalidRequest`] on a malformed body or an
/// empty name or URL.
#[utoipa::path(
    post,
    path = "/api/v1/feeds",
    tag = "Feeds",
    summary = "Register a feed",
    description = "Registers an external station feed. Snapshots of the feed are then submitted to its updates endpoint.",
    request_body = CreateFeedRequest,
    responses(
        (status = 201, description = "Feed registered", body = Feed),
        (status = 400, description = "Invalid request", body = ErrorResponse),
    )
)]
pub async fn create_feed(
    State(state): State<AppState>,
    payload: Result<Json<CreateFeedRequest>, JsonRejection>,
) -> Result<impl IntoResponse, TrackerError> {
    let Json(req) = payload?;
    let feed = state.service.create_feed(req.into()).await?;
    Ok((StatusCode::CREATED, Json(feed)))
}

/// `GET /feeds`: List feeds.
///
/// # Errors
///
/// Returns [`TrackerError::Persistence`] on store failure.
#[utoipa::path(
    get,
    path = "/api/v1/feeds",
    tag = "Feeds",
    summary = "List feeds",
    responses(
        (status = 200, description = "Registered feeds", body = FeedListResponse),
    )
)]
pub async fn list_feeds(State(state): State<AppState>) -> Result<impl IntoResponse, TrackerError> {
    let data = state.service.list_feeds().await?;
    Ok(Json(FeedListResponse { data }))
}

/// `GET /feeds/{feed_id}`: Get one feed.
///
/// # Errors
///
/// Returns [`TrackerError::FeedNotFound`] if the feed does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/feeds/{feed_id}",
    tag = "Feeds",
    summary = "Get feed",
    params(
        ("feed_id" = i64, Path, description = "Feed identifier"),
    ),
    responses(
        (status = 200, description = "Feed", body = Feed),
        (status = 404, description = "Feed not found", body = ErrorResponse),
    )
)]
pub async fn get_feed(
    State(state): State<AppState>,
    Path(feed_id): Path<FeedId>,
) -> Result<impl IntoResponse, TrackerError> {
    let feed = state.service.get_feed(feed_id).await?;
    Ok(Json(feed))
}

/// Feed routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/feeds", get(list_feeds).post(create_feed))
        .route("/feeds/{feed_id}", get(get_feed))
}
