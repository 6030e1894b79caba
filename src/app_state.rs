//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::service::ReconcileService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Reconcile service for passes and reads.
    pub service: Arc<ReconcileService>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}

impl AppState {
    /// Builds the state around a service, sharing its event bus.
    #[must_use]
    pub fn new(service: Arc<ReconcileService>) -> Self {
        let event_bus = service.event_bus().clone();
        Self { service, event_bus }
    }
}
