//! Type-safe entity identifiers.
//!
//! Every table uses a `BIGSERIAL` primary key. Each key is wrapped in its
//! own newtype so that, for example, a [`StationId`] cannot be passed where
//! a [`FeedId`] is expected.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database key.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw database key.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

entity_id!(
    /// Identifier of a [`super::Feed`].
    FeedId
);
entity_id!(
    /// Identifier of one reconciliation pass ([`super::FeedUpdate`]).
    FeedUpdateId
);
entity_id!(
    /// Global (system-wide) identifier of a [`super::Station`].
    StationId
);
entity_id!(
    /// Identifier of a [`super::StationHistory`] row.
    StationHistoryId
);
entity_id!(
    /// Identifier of a [`super::StationStatus`] row.
    StationStatusId
);

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn display_is_raw_number() {
        assert_eq!(StationId::new(42).to_string(), "42");
    }

    #[test]
    fn serializes_transparently() {
        let json = serde_json::to_string(&FeedId::new(7)).unwrap_or_default();
        assert_eq!(json, "7");
        let Ok(parsed) = serde_json::from_str::<FeedUpdateId>("12") else {
            panic!("deserialization failed");
        };
        assert_eq!(parsed.get(), 12);
    }

    #[test]
    fn ordering_follows_raw_key() {
        assert!(StationHistoryId::new(3) > StationHistoryId::new(2));
    }
}
