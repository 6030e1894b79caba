//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` streams [`crate::domain::ReconcileEvent`]s
//! of the feeds a client subscribed to.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
