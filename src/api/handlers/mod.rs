//! REST endpoint handlers organized by resource.

pub mod feed;
pub mod station;
pub mod system;
pub mod update;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(feed::routes())
        .merge(update::routes())
        .merge(station::routes())
}
