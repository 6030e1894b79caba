//! Data Transfer Objects for REST request/response serialization.
//!
//! Domain types are serialized as-is; DTOs only wrap lists and carry
//! request bodies.

pub mod common_dto;
pub mod feed_dto;
pub mod station_dto;

pub use common_dto::*;
pub use feed_dto::*;
pub use station_dto::*;
