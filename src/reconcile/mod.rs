//! Feed update reconciliation engine.
//!
//! The pieces of one pass, leaves first:
//!
//! ```text
//! raw records ──► parser ──► identity index ──► classifier ──► writer ──► store
//!                                  │
//!                                  └─ unmatched ──► missing handler ──► store
//! ```
//!
//! Everything here is synchronous and store-agnostic; the lifecycle that
//! drives it lives in [`crate::service::ReconcileService`].

pub mod classifier;
pub mod identity;
pub mod missing;
pub mod parser;
pub mod wire_keys;
pub mod writer;

pub use classifier::{KnownStationChange, TrackChange, classify_known};
pub use identity::{Claim, IdentityIndex};
pub use missing::plan_missing;
pub use parser::{ParseDiagnostics, ParsedStation, RawStationRecord, parse_record};
pub use writer::{plan_known, plan_new};
