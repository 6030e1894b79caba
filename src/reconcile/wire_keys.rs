//! Wire-key mapping table.
//!
//! Station records arrive as flat objects keyed by short wire codes
//! (`id`, `n`, `la`, `da`, ...). [`WIRE_KEYS`] maps each known code to the
//! bucket and field it lands in. The table is built once, on first use, and
//! is read-only afterwards.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::Serialize;
use utoipa::ToSchema;

/// Field of the properties bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyField {
    /// Feed-scoped identifier.
    LocalId,
    /// Long display name.
    LongName,
    /// Short display name.
    ShortName,
    /// Latitude.
    Lat,
    /// Longitude.
    Lon,
    /// Merged into the free-form map under the wire key.
    Other,
}

/// Field of the status bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    /// Free docks.
    AvailableSpots,
    /// Docks out of service.
    DisabledSpots,
    /// Rentable vehicles.
    AvailableVehicles,
    /// Vehicles out of service.
    DisabledVehicles,
}

/// Field of the transient bucket (diagnostics only, never persisted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientField {
    /// When the feed last refreshed the record (epoch ms).
    LastUpdated,
    /// When the station last talked to the operator (epoch ms).
    LastCommunication,
}

/// Where a wire key lands in a parsed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Identity and descriptive fields.
    Property(PropertyField),
    /// Availability counts.
    Status(StatusField),
    /// Diagnostic timestamps.
    Transient(TransientField),
}

impl Destination {
    /// Returns the bucket name (`properties`, `status` or `transient`).
    #[must_use]
    pub const fn bucket(self) -> &'static str {
        match self {
            Self::Property(_) => "properties",
            Self::Status(_) => "status",
            Self::Transient(_) => "transient",
        }
    }

    /// Returns the field name inside the bucket.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::Property(PropertyField::LocalId) => "localId",
            Self::Property(PropertyField::LongName) => "longName",
            Self::Property(PropertyField::ShortName) => "shortName",
            Self::Property(PropertyField::Lat) => "lat",
            Self::Property(PropertyField::Lon) => "lon",
            Self::Property(PropertyField::Other) => "other",
            Self::Status(StatusField::AvailableSpots) => "availableSpots",
            Self::Status(StatusField::DisabledSpots) => "disabledSpots",
            Self::Status(StatusField::AvailableVehicles) => "availableVehicles",
            Self::Status(StatusField::DisabledVehicles) => "disabledVehicles",
            Self::Transient(TransientField::LastUpdated) => "lastUpdated",
            Self::Transient(TransientField::LastCommunication) => "lastCommunication",
        }
    }
}

const WIRE_KEY_TABLE: [(&str, Destination); 17] = [
    ("id", Destination::Property(PropertyField::LocalId)),
    ("s", Destination::Property(PropertyField::LongName)),
    ("n", Destination::Property(PropertyField::ShortName)),
    ("st", Destination::Property(PropertyField::Other)),
    ("b", Destination::Property(PropertyField::Other)),
    ("su", Destination::Property(PropertyField::Other)),
    ("m", Destination::Property(PropertyField::Other)),
    ("lu", Destination::Transient(TransientField::LastUpdated)),
    ("lc", Destination::Transient(TransientField::LastCommunication)),
    ("bk", Destination::Property(PropertyField::Other)),
    ("bl", Destination::Property(PropertyField::Other)),
    ("la", Destination::Property(PropertyField::Lat)),
    ("lo", Destination::Property(PropertyField::Lon)),
    ("da", Destination::Status(StatusField::AvailableSpots)),
    ("dx", Destination::Status(StatusField::DisabledSpots)),
    ("ba", Destination::Status(StatusField::AvailableVehicles)),
    ("bx", Destination::Status(StatusField::DisabledVehicles)),
];

/// Process-wide wire-key lookup table.
pub static WIRE_KEYS: LazyLock<HashMap<&'static str, Destination>> =
    LazyLock::new(|| WIRE_KEY_TABLE.into_iter().collect());

/// Looks up the destination of a wire key.
#[must_use]
pub fn destination(key: &str) -> Option<Destination> {
    WIRE_KEYS.get(key).copied()
}

/// One row of the mapping table, as served by `GET /config/wire-keys`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WireKeyInfo {
    /// Wire key.
    pub key: String,
    /// Destination bucket.
    pub bucket: String,
    /// Destination field.
    pub field: String,
}

/// Returns the mapping table in declaration order.
#[must_use]
pub fn catalog() -> Vec<WireKeyInfo> {
    WIRE_KEY_TABLE
        .iter()
        .map(|&(key, dest)| WireKeyInfo {
            key: key.to_string(),
            bucket: dest.bucket().to_string(),
            field: dest.field().to_string(),
        })
        .collect()
}
