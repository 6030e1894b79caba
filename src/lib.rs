//! # bikeshare-tracker
//!
//! Keeps a temporally-versioned history of bike-share stations. Each
//! submitted feed snapshot runs one reconciliation pass: raw station records
//! are parsed through a fixed wire-key table, matched to known stations by
//! their feed-scoped local id, and classified per track. Changed properties
//! and changed availability counts each close the open SCD2 row and open a
//! new one at the snapshot's source timestamp; stations absent from the
//! snapshot get their open rows closed.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── ReconcileService (service/)
//!     ├── EventBus, FeedLocks (domain/)
//!     │
//!     ├── parser → identity → classifier → writer / missing (reconcile/)
//!     │
//!     └── StationStore: PostgreSQL or in-memory (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod reconcile;
pub mod service;
pub mod ws;
