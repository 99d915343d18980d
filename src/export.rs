//! # Tabular Export Module
//!
//! Flattens session samples into delimited text, one file per session.
//!
//! ## Format
//! - Header is the union of field names across every exported sample, with
//!   `timestamp` and `anomaly` pinned first and the rest in first-seen order
//! - Missing and null cells are empty
//! - Rows are written with `csv::Writer`: cells holding the delimiter, a
//!   quote or a line break are quoted with inner quotes doubled, and every
//!   row ends with `\n`
//!
//! ## File Naming
//! `<subject>_<YYYYMMDD_HHMMSS>.<ext>`, built from the subject identity and the
//! first sample's time. Identity text is reduced to ASCII alphanumerics joined
//! by `_`. Nothing random goes into the name, so re-exporting the same data
//! yields the same name.

use crate::error::ExportError;
use crate::sample::{parse_time, Sample, Session, SessionMetadata, ANOMALY_FIELD, TIMESTAMP_FIELD};
use serde_json::Value;
use std::borrow::Cow;

pub const DEFAULT_DELIMITER: u8 = b',';

// Used when neither a sample nor the metadata carries a readable time
const FALLBACK_DATE: &str = "undated";

/// Serialized export ready to be offered to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub contents: Vec<u8>,
}

/// File extension conventionally used for a delimiter
pub fn extension_for(delimiter: u8) -> &'static str {
    match delimiter {
        b',' => "csv",
        b'\t' => "tsv",
        _ => "txt",
    }
}

/// Union of field names across all samples, `timestamp` and `anomaly` first
pub fn header(samples: &[Sample]) -> Vec<String> {
    let mut rest: Vec<&str> = Vec::new();
    let mut has_timestamp = false;

    for sample in samples {
        for name in sample.field_names() {
            if name == TIMESTAMP_FIELD {
                has_timestamp = true;
            } else if !rest.contains(&name) {
                rest.push(name);
            }
        }
    }

    let mut columns = Vec::with_capacity(rest.len() + 2);
    if has_timestamp {
        columns.push(TIMESTAMP_FIELD.to_string());
    }
    if !samples.is_empty() {
        columns.push(ANOMALY_FIELD.to_string());
    }
    columns.extend(rest.into_iter().map(str::to_string));
    columns
}

/// Plain text of a cell value before escaping
pub fn cell_text(value: Option<&Value>) -> Cow<'_, str> {
    match value {
        None | Some(Value::Null) => Cow::Borrowed(""),
        Some(Value::String(s)) => Cow::Borrowed(s.as_str()),
        Some(Value::Number(n)) => Cow::Owned(n.to_string()),
        Some(Value::Bool(b)) => Cow::Owned(b.to_string()),
        Some(other) => Cow::Owned(other.to_string()),
    }
}

fn row_cell(sample: &Sample, column: &str) -> String {
    if column == ANOMALY_FIELD {
        sample.anomaly.to_string()
    } else {
        cell_text(sample.field(column)).into_owned()
    }
}

/// Serialize samples as delimited text with a header row
pub fn to_delimited(samples: &[Sample], delimiter: u8) -> Result<Vec<u8>, ExportError> {
    let columns = header(samples);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(&columns)?;
    for sample in samples {
        writer.write_record(columns.iter().map(|column| row_cell(sample, column)))?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))
}

/// Reduce identity text to ASCII alphanumerics separated by single `_`
pub fn sanitize_identity(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

fn identity_slug(metadata: &SessionMetadata, session_id: &str) -> String {
    let parts: Vec<String> = [metadata.subject_id.as_deref(), metadata.subject_name.as_deref()]
        .into_iter()
        .flatten()
        .map(sanitize_identity)
        .filter(|part| !part.is_empty())
        .collect();

    if !parts.is_empty() {
        return parts.join("_");
    }

    match sanitize_identity(session_id) {
        id if id.is_empty() => "session".to_string(),
        id => format!("session_{}", id),
    }
}

/// Deterministic export file name for a session
pub fn file_name(session: &Session, samples: &[Sample], delimiter: u8) -> String {
    let stamp = samples
        .first()
        .and_then(Sample::time)
        .or_else(|| {
            session
                .metadata
                .recorded_at
                .as_ref()
                .and_then(|text| parse_time(&Value::String(text.clone())))
        })
        .map(|time| time.format("%Y%m%d_%H%M%S").to_string())
        .unwrap_or_else(|| FALLBACK_DATE.to_string());

    format!(
        "{}_{}.{}",
        identity_slug(&session.metadata, &session.id),
        stamp,
        extension_for(delimiter)
    )
}

/// Export the given samples of a session; empty sessions produce no file
pub fn export_samples(
    session: &Session,
    samples: &[Sample],
    delimiter: u8,
) -> Result<Option<ExportFile>, ExportError> {
    if samples.is_empty() {
        log::info!("Session {} has no samples, nothing to export", session.id);
        return Ok(None);
    }

    Ok(Some(ExportFile {
        file_name: file_name(session, samples, delimiter),
        contents: to_delimited(samples, delimiter)?,
    }))
}

pub fn export_session(session: &Session, delimiter: u8) -> Result<Option<ExportFile>, ExportError> {
    export_samples(session, &session.samples, delimiter)
}

/// One file per session, skipping empty ones
pub fn export_batch(sessions: &[Session], delimiter: u8) -> Result<Vec<ExportFile>, ExportError> {
    let mut files = Vec::with_capacity(sessions.len());
    for session in sessions {
        if let Some(file) = export_session(session, delimiter)? {
            files.push(file);
        }
    }
    Ok(files)
}
