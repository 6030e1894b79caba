//! Station DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Station, StationHistory, StationId, StationStatus};

/// Response body for `GET /feeds/{feed_id}/stations`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StationListResponse {
    /// Stations of the feed ordered by id.
    pub data: Vec<Station>,
}

/// Response body for `GET /stations/{station_id}/history`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StationHistoryResponse {
    /// Station identifier.
    pub station_id: StationId,
    /// Property versions, oldest first.
    pub data: Vec<StationHistory>,
}

/// Response body for `GET /stations/{station_id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StationStatusResponse {
    /// Station identifier.
    pub station_id: StationId,
    /// Status versions, oldest first.
    pub data: Vec<StationStatus>,
}
