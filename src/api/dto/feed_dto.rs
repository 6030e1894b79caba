//! Feed and feed update DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::common_dto::PaginationMeta;
use crate::domain::{Feed, FeedUpdate, NewFeed};

/// Request body for `POST /feeds`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateFeedRequest {
    /// Short human-readable name of the system.
    pub short_name: String,
    /// Where the snapshots are published.
    pub url: String,
    /// Free-form metadata.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub other: Option<serde_json::Value>,
}

impl From<CreateFeedRequest> for NewFeed {
    fn from(req: CreateFeedRequest) -> Self {
        Self {
            short_name: req.short_name,
            url: req.url,
            other: req
                .other
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
        }
    }
}

/// Response body for `GET /feeds`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FeedListResponse {
    /// Registered feeds ordered by id.
    pub data: Vec<Feed>,
}

/// Response body for `GET /feeds/{feed_id}/updates`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FeedUpdateListResponse {
    /// Passes, newest first.
    pub data: Vec<FeedUpdate>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}
