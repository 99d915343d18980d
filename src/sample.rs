//! # Sample Normalization Module
//!
//! Turns raw session payloads into the canonical sample sequence every other
//! component works on.
//!
//! ## Key Types
//! - `RawSession`: Session payload exactly as the store hands it over
//! - `Sample`: One canonical, time-indexed row of a session
//! - `Session`: Canonical samples plus scalar metadata
//!
//! ## Normalization Rules
//! 1. Field names are trimmed and lower-cased; unknown fields keep their values verbatim
//! 2. `anomaly` and `pred_*` fields are coerced to exactly 0 or 1 (anything but 1 is 0)
//! 3. `sequence_index` is the 0-based input position and never changes afterwards
//! 4. The output owns its data; editing it never touches the raw payload
//!
//! Normalization never fails. Missing or malformed input degrades to an empty
//! sequence or zeroed fields.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const ANOMALY_FIELD: &str = "anomaly";
/// Fields starting with this prefix are read-only model predictions
pub const PREDICTION_PREFIX: &str = "pred_";

// Numeric timestamps at or above this are epoch milliseconds, below it epoch seconds
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Session payload as returned by a store, before normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSession {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub samples: Vec<Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One canonical row of a session's time series
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Position within the session, assigned once at normalization
    pub sequence_index: usize,
    /// Operator-editable label, always 0 or 1
    pub anomaly: u8,
    time: Option<DateTime<Utc>>,
    /// Canonical fields in first-seen order, `anomaly` excluded
    fields: Map<String, Value>,
}

impl Sample {
    /// Build a sample from already-canonical parts
    pub fn new(sequence_index: usize, anomaly: u8, fields: Map<String, Value>) -> Self {
        let time = fields.get(TIMESTAMP_FIELD).and_then(parse_time);
        Self {
            sequence_index,
            anomaly: if anomaly == 1 { 1 } else { 0 },
            time,
            fields,
        }
    }

    /// Raw timestamp value as received
    pub fn timestamp(&self) -> Option<&Value> {
        self.fields.get(TIMESTAMP_FIELD)
    }

    /// Parsed absolute time, if the timestamp was readable
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field names in first-seen order (excluding `anomaly`)
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Numeric channel value; `None` for missing sensor readings
    pub fn channel(&self, name: &str) -> Option<f64> {
        match self.fields.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    pub fn prediction(&self, predictor: &str) -> Option<u8> {
        self.fields
            .get(&format!("{}{}", PREDICTION_PREFIX, predictor))
            .map(coerce_flag)
    }

    /// All model predictions carried by this sample, keyed by predictor name
    pub fn predictions(&self) -> impl Iterator<Item = (&str, u8)> {
        self.fields.iter().filter_map(|(key, value)| {
            key.strip_prefix(PREDICTION_PREFIX)
                .map(|name| (name, coerce_flag(value)))
        })
    }
}

/// Scalar session metadata with canonical field names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMetadata {
    pub subject_id: Option<String>,
    pub subject_name: Option<String>,
    /// Administrative label assigned by the operator
    pub label: Option<String>,
    pub recorded_at: Option<String>,
    pub statistics: Map<String, Value>,
    pub prediction_summary: Map<String, Value>,
    /// Metadata keys not recognized above, preserved as received
    pub extra: Map<String, Value>,
}

/// A loaded session: canonical samples plus metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub id: String,
    pub metadata: SessionMetadata,
    pub samples: Vec<Sample>,
}

impl Session {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Positive prediction count per predictor
    pub fn prediction_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            for (name, flag) in sample.predictions() {
                *counts.entry(name.to_string()).or_insert(0) += flag as usize;
            }
        }
        counts
    }
}

/// Canonical form of a field name
pub fn canonical_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Coerce a label value to 0 or 1. Only the number 1 (or the text "1") is anomalous.
pub fn coerce_flag(value: &Value) -> u8 {
    let is_one = match value {
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => s.trim().parse::<f64>().ok() == Some(1.0),
        _ => false,
    };
    if is_one {
        1
    } else {
        0
    }
}

/// Parse a raw timestamp value into an absolute UTC time
///
/// Accepts RFC 3339 text, naive `YYYY-MM-DD HH:MM:SS[.fff]` (read as UTC),
/// and epoch seconds or milliseconds as numbers or numeric text.
pub fn parse_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for format in NAIVE_FORMATS {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(naive.and_utc());
                }
            }
            s.parse::<f64>().ok().and_then(from_epoch)
        }
        _ => None,
    }
}

fn from_epoch(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() {
        return None;
    }
    let millis = if raw.abs() >= EPOCH_MILLIS_THRESHOLD {
        raw
    } else {
        raw * 1000.0
    };
    DateTime::from_timestamp_millis(millis.round() as i64)
}

/// Normalize raw per-sample records into canonical samples
pub fn normalize_samples(records: &[Value]) -> Vec<Sample> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| normalize_record(index, record))
        .collect()
}

fn normalize_record(sequence_index: usize, record: &Value) -> Sample {
    let mut fields = Map::new();
    let mut anomaly = 0;

    if let Value::Object(raw) = record {
        for (key, value) in raw {
            let key = canonical_key(key);
            if key == ANOMALY_FIELD {
                anomaly = coerce_flag(value);
            } else if key.starts_with(PREDICTION_PREFIX) {
                fields.insert(key, Value::from(coerce_flag(value)));
            } else {
                fields.insert(key, value.clone());
            }
        }
    }

    Sample::new(sequence_index, anomaly, fields)
}

fn metadata_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn normalize_metadata(raw: &Map<String, Value>) -> SessionMetadata {
    let mut metadata = SessionMetadata::default();

    for (key, value) in raw {
        match canonical_key(key).as_str() {
            "subject_id" => metadata.subject_id = metadata_text(value),
            "subject_name" => metadata.subject_name = metadata_text(value),
            "label" => metadata.label = metadata_text(value),
            "recorded_at" => metadata.recorded_at = metadata_text(value),
            "statistics" => {
                if let Value::Object(map) = value {
                    metadata.statistics = map.clone();
                }
            }
            "prediction_summary" => {
                if let Value::Object(map) = value {
                    metadata.prediction_summary = map.clone();
                }
            }
            other => {
                metadata.extra.insert(other.to_string(), value.clone());
            }
        }
    }

    metadata
}

/// Normalize a whole session payload
pub fn normalize(raw: &RawSession) -> Session {
    let samples = normalize_samples(&raw.samples);

    let unreadable = samples.iter().filter(|s| s.time().is_none()).count();
    if unreadable > 0 {
        log::debug!(
            "Session {}: {} of {} samples have an unreadable timestamp",
            raw.id,
            unreadable,
            samples.len()
        );
    }

    Session {
        id: raw.id.clone(),
        metadata: normalize_metadata(&raw.metadata),
        samples,
    }
}
