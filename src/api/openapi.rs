//! OpenAPI document of the REST API.

use utoipa::OpenApi;

use super::handlers::{feed, station, system, update};

/// OpenAPI document, served at `/api-docs/openapi.json`.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "bikeshare-tracker",
        description = "Temporally-versioned history of bike-share station properties and availability."
    ),
    paths(
        system::health_handler,
        system::wire_keys_handler,
        feed::create_feed,
        feed::list_feeds,
        feed::get_feed,
        update::submit_snapshot,
        update::list_updates,
        update::get_update,
        station::list_stations,
        station::get_station,
        station::station_history,
        station::station_status,
    ),
    tags(
        (name = "System", description = "Health and static configuration"),
        (name = "Feeds", description = "Registered station feeds"),
        (name = "Feed updates", description = "Reconciliation passes"),
        (name = "Stations", description = "Stations and their SCD2 histories"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/config/wire-keys",
            "/api/v1/feeds",
            "/api/v1/feeds/{feed_id}",
            "/api/v1/feeds/{feed_id}/updates",
            "/api/v1/updates/{update_id}",
            "/api/v1/feeds/{feed_id}/stations",
            "/api/v1/stations/{station_id}",
            "/api/v1/stations/{station_id}/history",
            "/api/v1/stations/{station_id}/status",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
