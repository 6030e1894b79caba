//! Raw record parser.
//!
//! Turns one raw station record (a flat JSON object keyed by wire codes)
//! into a [`ParsedStation`]: descriptive properties, availability counts and
//! transient diagnostic fields. Unknown wire keys are counted in
//! [`ParseDiagnostics`] and dropped; they never reject a record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::wire_keys::{self, Destination, PropertyField, StatusField, TransientField};
use crate::domain::{
    LAT_SCALE, LON_SCALE, RecordRejection, StationProperties, StatusCounts, round_coordinate,
};

/// One raw station record as received from the feed.
pub type RawStationRecord = Map<String, Value>;

/// Fields used for diagnostics only; never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransientFields {
    /// When the feed last refreshed the record.
    pub last_updated: Option<DateTime<Utc>>,
    /// When the station last talked to the operator.
    pub last_communication: Option<DateTime<Utc>>,
}

/// A raw record split into its three buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStation {
    /// Identity and descriptive fields, `total_spots` filled in.
    pub properties: StationProperties,
    /// Availability counts.
    pub status: StatusCounts,
    /// Diagnostic timestamps.
    pub transient: TransientFields,
}

impl ParsedStation {
    /// Feed-scoped identifier of the record.
    #[must_use]
    pub fn local_id(&self) -> &str {
        &self.properties.local_id
    }
}

/// Non-fatal findings collected while parsing a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseDiagnostics {
    unknown_fields: BTreeMap<String, u64>,
    dropped_transient: u64,
}

impl ParseDiagnostics {
    /// Creates empty diagnostics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unmapped wire keys and the number of records carrying each.
    #[must_use]
    pub fn unknown_fields(&self) -> &BTreeMap<String, u64> {
        &self.unknown_fields
    }

    /// Transient values that could not be read as epoch milliseconds.
    #[must_use]
    pub const fn dropped_transient(&self) -> u64 {
        self.dropped_transient
    }

    fn record_unknown(&mut self, key: &str) {
        let count = self.unknown_fields.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1);
    }
}

/// Parses one raw record.
///
/// # Errors
///
/// Returns a [`RecordRejection`] when the record has no usable `id`, when a
/// count is missing, non-numeric or negative, or when a coordinate cannot be
/// read. The rejection keeps the local id when one was found so the caller
/// can still mark that station as seen.
pub fn parse_record(
    raw: &RawStationRecord,
    diagnostics: &mut ParseDiagnostics,
) -> Result<ParsedStation, RecordRejection> {
    let mut properties = StationProperties::default();
    let mut local_id = None;
    let mut available_spots = None;
    let mut disabled_spots = None;
    let mut available_vehicles = None;
    let mut disabled_vehicles = None;
    let mut transient = TransientFields::default();
    let mut problems = Vec::new();

    for (key, value) in raw {
        let Some(dest) = wire_keys::destination(key) else {
            tracing::debug!(key = %key, "unknown station key");
            diagnostics.record_unknown(key);
            continue;
        };
        match dest {
            Destination::Property(PropertyField::LocalId) => {
                local_id = value_to_string(value).filter(|id| !id.is_empty());
            }
            Destination::Property(PropertyField::LongName) => {
                properties.long_name = value_to_string(value).filter(|s| !s.is_empty());
            }
            Destination::Property(PropertyField::ShortName) => {
                properties.short_name = value_to_string(value).filter(|s| !s.is_empty());
            }
            Destination::Property(PropertyField::Lat) => {
                match parse_coordinate(key, value, 90.0, LAT_SCALE) {
                    Ok(lat) => properties.lat = lat,
                    Err(problem) => problems.push(problem),
                }
            }
            Destination::Property(PropertyField::Lon) => {
                match parse_coordinate(key, value, 180.0, LON_SCALE) {
                    Ok(lon) => properties.lon = lon,
                    Err(problem) => problems.push(problem),
                }
            }
            Destination::Property(PropertyField::Other) => {
                properties.other.insert(key.clone(), value.clone());
            }
            Destination::Status(field) => {
                let slot = match field {
                    StatusField::AvailableSpots => &mut available_spots,
                    StatusField::DisabledSpots => &mut disabled_spots,
                    StatusField::AvailableVehicles => &mut available_vehicles,
                    StatusField::DisabledVehicles => &mut disabled_vehicles,
                };
                match parse_count(key, value) {
                    Ok(count) => *slot = Some(count),
                    Err(problem) => problems.push(problem),
                }
            }
            Destination::Transient(field) => {
                let parsed = parse_epoch_millis(value);
                if parsed.is_none() && !value.is_null() {
                    diagnostics.dropped_transient = diagnostics.dropped_transient.saturating_add(1);
                }
                match field {
                    TransientField::LastUpdated => transient.last_updated = parsed,
                    TransientField::LastCommunication => transient.last_communication = parsed,
                }
            }
        }
    }

    let Some(local_id) = local_id else {
        return Err(RecordRejection {
            local_id: None,
            reason: "missing station id".to_string(),
        });
    };

    for (name, slot) in [
        ("da", available_spots),
        ("dx", disabled_spots),
        ("ba", available_vehicles),
        ("bx", disabled_vehicles),
    ] {
        if slot.is_none() && !problems.iter().any(|p: &String| p.starts_with(name)) {
            problems.push(format!("{name}: missing count"));
        }
    }

    let status = match (
        available_spots,
        disabled_spots,
        available_vehicles,
        disabled_vehicles,
    ) {
        (Some(available_spots), Some(disabled_spots), Some(available_vehicles), Some(disabled_vehicles))
            if problems.is_empty() =>
        {
            StatusCounts {
                available_vehicles,
                available_spots,
                disabled_vehicles,
                disabled_spots,
            }
        }
        _ => {
            return Err(RecordRejection {
                local_id: Some(local_id),
                reason: problems.join("; "),
            });
        }
    };

    let Some(total_spots) = status.total() else {
        return Err(RecordRejection {
            local_id: Some(local_id),
            reason: "total spots overflow".to_string(),
        });
    };

    properties.local_id = local_id;
    properties.total_spots = Some(total_spots);

    Ok(ParsedStation {
        properties,
        status,
        transient,
    })
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn parse_count(key: &str, value: &Value) -> Result<i32, String> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    };
    match parsed {
        Some(count) if count >= 0 => Ok(count),
        Some(count) => Err(format!("{key}: negative count {count}")),
        None => Err(format!("{key}: not an integer count: {value}")),
    }
}

fn parse_coordinate(
    key: &str,
    value: &Value,
    bound: f64,
    scale: usize,
) -> Result<Option<f64>, String> {
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(coord) if coord.is_finite() && coord.abs() <= bound => {
            Ok(Some(round_coordinate(coord, scale)))
        }
        Some(coord) => Err(format!("{key}: coordinate out of range: {coord}")),
        None => Err(format!("{key}: not a coordinate: {value}")),
    }
}

fn parse_epoch_millis(value: &Value) -> Option<DateTime<Utc>> {
    let millis = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawStationRecord {
        let Value::Object(map) = value else {
            panic!("test record must be an object");
        };
        map
    }

    fn main_st() -> RawStationRecord {
        record(json!({
            "id": "42", "n": "Main St", "la": "45.5017", "lo": "-73.5673",
            "da": "3", "dx": "12", "ba": "1", "bx": "0"
        }))
    }

    #[test]
    fn parses_reference_record() {
        let mut diagnostics = ParseDiagnostics::new();
        let Ok(parsed) = parse_record(&main_st(), &mut diagnostics) else {
            panic!("record should parse");
        };
        assert_eq!(parsed.local_id(), "42");
        assert_eq!(parsed.properties.short_name.as_deref(), Some("Main St"));
        assert_eq!(parsed.properties.lat, Some(45.5017));
        assert_eq!(parsed.properties.lon, Some(-73.5673));
        assert_eq!(parsed.properties.total_spots, Some(16));
        assert_eq!(parsed.status.available_spots, 3);
        assert_eq!(parsed.status.disabled_spots, 12);
        assert_eq!(parsed.status.available_vehicles, 1);
        assert_eq!(parsed.status.disabled_vehicles, 0);
        assert!(diagnostics.unknown_fields().is_empty());
    }

    #[test]
    fn total_spots_is_sum_of_counts() {
        let mut diagnostics = ParseDiagnostics::new();
        let raw = record(json!({"id": 7, "da": 5, "dx": 1, "ba": 9, "bx": 2}));
        let Ok(parsed) = parse_record(&raw, &mut diagnostics) else {
            panic!("record should parse");
        };
        let s = parsed.status;
        assert_eq!(
            parsed.properties.total_spots,
            Some(s.available_spots + s.disabled_spots + s.available_vehicles + s.disabled_vehicles)
        );
        assert_eq!(parsed.local_id(), "7");
    }

    #[test]
    fn vendor_keys_merge_into_other() {
        let mut raw = main_st();
        raw.insert("st".to_string(), json!("1"));
        raw.insert("bl".to_string(), json!("false"));
        raw.insert("m".to_string(), json!(true));
        let mut diagnostics = ParseDiagnostics::new();
        let Ok(parsed) = parse_record(&raw, &mut diagnostics) else {
            panic!("record should parse");
        };
        assert_eq!(parsed.properties.other.len(), 3);
        assert_eq!(parsed.properties.other.get("m"), Some(&json!(true)));
        assert_eq!(parsed.properties.other.get("st"), Some(&json!("1")));
    }

    #[test]
    fn unknown_keys_are_counted_not_fatal() {
        let mut raw = main_st();
        raw.insert("zz".to_string(), json!("x"));
        let mut diagnostics = ParseDiagnostics::new();
        assert!(parse_record(&raw, &mut diagnostics).is_ok());
        assert!(parse_record(&raw, &mut diagnostics).is_ok());
        assert_eq!(diagnostics.unknown_fields().get("zz"), Some(&2));
    }

    #[test]
    fn transient_fields_are_epoch_millis() {
        let mut raw = main_st();
        raw.insert("lu".to_string(), json!("1714564800000"));
        raw.insert("lc".to_string(), json!("yesterday"));
        let mut diagnostics = ParseDiagnostics::new();
        let Ok(parsed) = parse_record(&raw, &mut diagnostics) else {
            panic!("record should parse");
        };
        assert_eq!(
            parsed.transient.last_updated,
            DateTime::from_timestamp_millis(1_714_564_800_000)
        );
        assert_eq!(parsed.transient.last_communication, None);
        assert_eq!(diagnostics.dropped_transient(), 1);
    }

    #[test]
    fn missing_id_is_rejected() {
        let mut raw = main_st();
        raw.remove("id");
        let mut diagnostics = ParseDiagnostics::new();
        let Err(rejection) = parse_record(&raw, &mut diagnostics) else {
            panic!("record should be rejected");
        };
        assert_eq!(rejection.local_id, None);
    }

    #[test]
    fn bad_counts_keep_local_id() {
        let mut raw = main_st();
        raw.insert("da".to_string(), json!("three"));
        raw.insert("bx".to_string(), json!(-1));
        raw.remove("dx");
        let mut diagnostics = ParseDiagnostics::new();
        let Err(rejection) = parse_record(&raw, &mut diagnostics) else {
            panic!("record should be rejected");
        };
        assert_eq!(rejection.local_id.as_deref(), Some("42"));
        assert!(rejection.reason.contains("da: not an integer count"));
        assert!(rejection.reason.contains("bx: negative count"));
        assert!(rejection.reason.contains("dx: missing count"));
    }

    #[test]
    fn coordinates_are_rounded_to_column_scale() {
        let mut raw = main_st();
        raw.insert("la".to_string(), json!("0.0012345678901234567"));
        raw.insert("lo".to_string(), json!(-0.001_234_567_890_123_456_7));
        let mut diagnostics = ParseDiagnostics::new();
        let Ok(parsed) = parse_record(&raw, &mut diagnostics) else {
            panic!("record should parse");
        };
        assert_eq!(parsed.properties.lat, Some(0.001_234_567_890_123));
        assert_eq!(parsed.properties.lon, Some(-0.001_234_567_890_12));
    }

    #[test]
    fn out_of_range_latitude_is_rejected() {
        let mut raw = main_st();
        raw.insert("la".to_string(), json!(145.0));
        let mut diagnostics = ParseDiagnostics::new();
        assert!(parse_record(&raw, &mut diagnostics).is_err());
    }

    #[test]
    fn empty_names_are_absent() {
        let mut raw = main_st();
        raw.insert("s".to_string(), json!(""));
        raw.insert("la".to_string(), json!(""));
        let mut diagnostics = ParseDiagnostics::new();
        let Ok(parsed) = parse_record(&raw, &mut diagnostics) else {
            panic!("record should parse");
        };
        assert_eq!(parsed.properties.long_name, None);
        assert_eq!(parsed.properties.lat, None);
    }
}
