//! Service layer: business logic orchestration.
//!
//! [`ReconcileService`] drives reconciliation passes over the
//! [`crate::reconcile`] engine, persists through a
//! [`crate::persistence::StationStore`], and emits events through the
//! [`super::domain::EventBus`].

pub mod reconcile_service;
pub mod sweeper;

pub use reconcile_service::{ABANDONED_REASON, PassOptions, RawSnapshot, ReconcileService};
pub use sweeper::spawn_sweeper;
