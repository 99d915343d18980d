//! # Error Types Module
//!
//! Centralized error handling for the review engine.
//! Each boundary gets its own error type so callers can tell recoverable
//! input problems apart from transport failures.
//!
//! ## Error Types
//! - `StoreError`: Load/save/delete failures from the session store
//! - `ConfigError`: Configuration file I/O and parsing errors
//! - `RangeError`: Rejected time-string view windows
//! - `SegmentError`: Invalid split parameters or nothing to split
//! - `ExportError`: Delimited text that could not be encoded
//! - `BatchError`: Per-session outcome of a failed batch export
//! - `DeliveryError`: Export files that could not be handed to the user
//!
//! ## Usage Examples
//! ```rust,ignore
//! // Store implementations use StoreError
//! async fn load(&self, session_id: &str) -> Result<RawSession, StoreError> { ... }
//!
//! // View windows use RangeError
//! pub fn by_time_string(&mut self, start: &str, end: &str, axis: &ElapsedAxis)
//!     -> Result<ViewWindow, RangeError> { ... }
//! ```

use std::fmt;

/// Errors reported by a session store
#[derive(Debug)]
pub enum StoreError {
    /// No session with this identifier
    NotFound { session_id: String },
    /// The store rejected the request payload
    Validation(String),
    /// The store could not be reached or the call was interrupted
    Transport(String),
    /// Local file I/O failed
    Io(std::io::Error),
    /// Stored payload could not be decoded
    Decode(serde_json::Error),
}

impl StoreError {
    /// Whether the operator can simply retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transport(_) | StoreError::Io(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { session_id } => {
                write!(f, "Session {} was not found", session_id)
            }
            StoreError::Validation(msg) => {
                write!(f, "Store rejected the request: {}", msg)
            }
            StoreError::Transport(msg) => {
                write!(f, "Store unavailable: {}", msg)
            }
            StoreError::Io(e) => {
                write!(f, "Store I/O failed: {}", e)
            }
            StoreError::Decode(e) => {
                write!(f, "Failed to decode stored session: {}", e)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e)
    }
}

/// Errors loading or saving the review settings file
#[derive(Debug)]
pub enum ConfigError {
    /// Settings file exists but could not be read
    ReadFailed(std::io::Error),
    /// Settings file or its directory could not be written
    WriteFailed(std::io::Error),
    /// Settings file is not valid TOML or holds an invalid value
    ParseFailed(toml::de::Error),
    SerializeFailed(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Cannot read review settings: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Cannot write review settings: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Invalid review settings: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Cannot encode review settings: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
        }
    }
}

/// A view window request that could not be resolved
#[derive(Debug, Clone, PartialEq)]
pub enum RangeError {
    /// Text was not `HH:MM:SS`, `MM:SS` or `SS`
    InvalidTime(String),
    /// Start is not strictly before end
    EmptyRange { start: f64, end: f64 },
    /// The session has no samples to window
    NoSamples,
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeError::InvalidTime(text) => {
                write!(f, "Invalid time '{}', expected HH:MM:SS, MM:SS or SS", text)
            }
            RangeError::EmptyRange { start, end } => {
                write!(f, "Invalid range: start {}s must be before end {}s", start, end)
            }
            RangeError::NoSamples => {
                write!(f, "Session has no samples")
            }
        }
    }
}

impl std::error::Error for RangeError {}

/// Reasons a segmentation could not be produced
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentError {
    /// Split parameter out of range (zero count, non-positive duration)
    InvalidParameter(String),
    /// Nothing to split
    EmptySession,
    /// Point-based split found no sample with a value on the channel
    NoEligibleSamples { channel: String },
}

impl SegmentError {
    /// Informational conditions are reported to the operator, not treated as failures
    pub fn is_informational(&self) -> bool {
        matches!(self, SegmentError::NoEligibleSamples { .. })
    }
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentError::InvalidParameter(msg) => {
                write!(f, "Invalid split parameter: {}", msg)
            }
            SegmentError::EmptySession => {
                write!(f, "Session has no samples to split")
            }
            SegmentError::NoEligibleSamples { channel } => {
                write!(f, "No samples with a '{}' value to split", channel)
            }
        }
    }
}

impl std::error::Error for SegmentError {}

/// Errors building delimited export text
#[derive(Debug)]
pub enum ExportError {
    /// A row could not be encoded
    Csv(csv::Error),
    /// The in-memory buffer could not be flushed
    Io(std::io::Error),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Csv(e) => write!(f, "Failed to encode export row: {}", e),
            ExportError::Io(e) => write!(f, "Failed to finish export: {}", e),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Csv(e) => Some(e),
            ExportError::Io(e) => Some(e),
        }
    }
}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        ExportError::Csv(e)
    }
}

/// Why one session of a batch export produced no file
#[derive(Debug)]
pub enum BatchError {
    Fetch(StoreError),
    Export(ExportError),
    /// The fetch task panicked or was cancelled
    TaskFailed(String),
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::Fetch(e) => write!(f, "{}", e),
            BatchError::Export(e) => write!(f, "{}", e),
            BatchError::TaskFailed(msg) => write!(f, "Fetch task failed: {}", msg),
        }
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BatchError::Fetch(e) => Some(e),
            BatchError::Export(e) => Some(e),
            BatchError::TaskFailed(_) => None,
        }
    }
}

/// Errors raised while offering an export file to the user
#[derive(Debug)]
pub enum DeliveryError {
    /// Writing the file failed
    Io(std::io::Error),
    /// Background writer has already shut down
    WriterClosed,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Io(e) => write!(f, "Failed to write export: {}", e),
            DeliveryError::WriterClosed => write!(f, "Export writer is no longer running"),
        }
    }
}

impl std::error::Error for DeliveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeliveryError::Io(e) => Some(e),
            DeliveryError::WriterClosed => None,
        }
    }
}

impl From<std::io::Error> for DeliveryError {
    fn from(e: std::io::Error) -> Self {
        DeliveryError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound {
            session_id: "abc".to_string(),
        };
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_store_error_retryable() {
        assert!(StoreError::Transport("timeout".into()).is_retryable());
        assert!(!StoreError::Validation("bad".into()).is_retryable());
        assert!(!StoreError::NotFound { session_id: "x".into() }.is_retryable());
    }

    #[test]
    fn test_config_error_names_settings() {
        use std::error::Error;
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::ReadFailed(io_err);
        assert!(err.to_string().starts_with("Cannot read review settings"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_segment_error_informational() {
        let err = SegmentError::NoEligibleSamples {
            channel: "heart_rate".into(),
        };
        assert!(err.is_informational());
        assert!(!SegmentError::EmptySession.is_informational());
    }
}
