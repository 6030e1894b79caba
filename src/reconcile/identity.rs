//! Identity matcher.
//!
//! [`IdentityIndex`] maps the local identifiers of a feed's known stations
//! to their stored rows. Each entry carries a `matched` flag that the
//! reconciliation pass sets when a raw record claims the station; entries
//! never claimed form the missing-station set of the pass.
//!
//! The flag is the only mutable state shared between concurrently processed
//! records, so claiming is a single atomic swap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::Station;

/// A known station plus its per-pass `matched` flag.
#[derive(Debug)]
pub struct KnownStation {
    station: Station,
    matched: AtomicBool,
}

impl KnownStation {
    /// The stored station row.
    #[must_use]
    pub const fn station(&self) -> &Station {
        &self.station
    }

    /// Returns `true` once a raw record claimed this station.
    #[must_use]
    pub fn is_matched(&self) -> bool {
        self.matched.load(Ordering::Acquire)
    }
}

/// Result of claiming a local identifier.
#[derive(Debug)]
pub enum Claim<'a> {
    /// No known station has this local id.
    Unknown,
    /// First claim of a known station in this pass.
    Matched(&'a Station),
    /// Another record already claimed this station in this pass.
    AlreadyClaimed(&'a Station),
}

/// Known stations of one feed, keyed by local identifier.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    by_local_id: HashMap<String, KnownStation>,
}

impl IdentityIndex {
    /// Builds the index from the feed's stations.
    ///
    /// Should the store ever return two stations with the same local id,
    /// the one with the highest global id wins and a warning is logged.
    #[must_use]
    pub fn build(stations: Vec<Station>) -> Self {
        let mut by_local_id: HashMap<String, KnownStation> = HashMap::with_capacity(stations.len());
        for station in stations {
            let local_id = station.properties.local_id.clone();
            if let Some(existing) = by_local_id.get(&local_id) {
                tracing::warn!(
                    local_id = %local_id,
                    kept = %existing.station.id.max(station.id),
                    "duplicate local id in feed"
                );
                if existing.station.id > station.id {
                    continue;
                }
            }
            by_local_id.insert(
                local_id,
                KnownStation {
                    station,
                    matched: AtomicBool::new(false),
                },
            );
        }
        Self { by_local_id }
    }

    /// Marks the station with `local_id` as seen in this pass.
    pub fn claim(&self, local_id: &str) -> Claim<'_> {
        match self.by_local_id.get(local_id) {
            None => Claim::Unknown,
            Some(known) => {
                if known.matched.swap(true, Ordering::AcqRel) {
                    Claim::AlreadyClaimed(&known.station)
                } else {
                    Claim::Matched(&known.station)
                }
            }
        }
    }

    /// Stations no raw record claimed.
    pub fn unmatched(&self) -> impl Iterator<Item = &Station> {
        self.by_local_id
            .values()
            .filter(|known| !known.is_matched())
            .map(KnownStation::station)
    }

    /// Looks up a known station without claiming it.
    #[must_use]
    pub fn get(&self, local_id: &str) -> Option<&KnownStation> {
        self.by_local_id.get(local_id)
    }

    /// Number of known stations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_local_id.len()
    }

    /// Returns `true` if the feed has no known stations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_local_id.is_empty()
    }
}
