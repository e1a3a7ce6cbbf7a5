//! Error handling for syncrec-rs
//!
//! This module defines the error taxonomy shared by the producers, the
//! acquisition session and the playback clock, together with a Result alias.
//!
//! Only [`SyncRecError::TransientRead`] is recoverable: a producer skips the
//! sample, counts it and keeps its schedule. Every other variant ends the
//! loop that raised it.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::StreamKind;

/// Main error type for syncrec-rs operations
#[derive(Error, Debug)]
pub enum SyncRecError {
    /// A device could not be opened; aborts session start
    #[error("{stream} device unavailable: {reason}")]
    DeviceUnavailable { stream: StreamKind, reason: String },

    /// A single read failed or produced a malformed record
    #[error("transient {stream} read error: {reason}")]
    TransientRead { stream: StreamKind, reason: String },

    /// No successful sample arrived within the watchdog timeout
    #[error("{stream} produced no data for {timeout:?}")]
    StaleData { stream: StreamKind, timeout: Duration },

    /// The device went away mid-recording
    #[error("{stream} device lost: {reason}")]
    DeviceLost { stream: StreamKind, reason: String },

    /// A producer thread did not finish within its join bound
    #[error("{stream} producer did not stop within {waited:?}; its device may be leaked")]
    JoinTimeout { stream: StreamKind, waited: Duration },

    /// The session completed but one or more streams failed
    #[error("recording finished with failed streams: {}", format_failures(.failures))]
    PartialFailure { failures: Vec<StreamFailure> },

    /// Operation not valid in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Playback requested on a stream with no entries
    #[error("Stream is empty")]
    EmptyStream,

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<SyncRecError>,
    },
}

impl SyncRecError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        SyncRecError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether a producer may skip this error and keep sampling
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncRecError::TransientRead { .. } => true,
            SyncRecError::WithContext { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    /// The stream this error belongs to, if any
    pub fn stream(&self) -> Option<StreamKind> {
        match self {
            SyncRecError::DeviceUnavailable { stream, .. }
            | SyncRecError::TransientRead { stream, .. }
            | SyncRecError::StaleData { stream, .. }
            | SyncRecError::DeviceLost { stream, .. }
            | SyncRecError::JoinTimeout { stream, .. } => Some(*stream),
            SyncRecError::WithContext { source, .. } => source.stream(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncRecError {
    fn from(err: serde_json::Error) -> Self {
        SyncRecError::Serialization(err.to_string())
    }
}

/// A stream that stopped early during a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFailure {
    /// Which stream failed
    pub stream: StreamKind,
    /// Human-readable cause
    pub reason: String,
    /// Index of the last sample that made it into the stream
    pub last_good_index: Option<usize>,
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last_good_index {
            Some(idx) => write!(f, "{} ({}, last good index {})", self.stream, self.reason, idx),
            None => write!(f, "{} ({}, no samples)", self.stream, self.reason),
        }
    }
}

fn format_failures(failures: &[StreamFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for syncrec-rs operations
pub type Result<T> = std::result::Result<T, SyncRecError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncRecError::DeviceUnavailable {
            stream: StreamKind::Camera,
            reason: "no such device".to_string(),
        };
        assert_eq!(err.to_string(), "camera device unavailable: no such device");
    }

    #[test]
    fn test_error_with_context() {
        let err = SyncRecError::Config("bad rate".to_string());
        let with_ctx = err.with_context("Failed to start session");
        assert!(with_ctx.to_string().contains("Failed to start session"));
    }

    #[test]
    fn test_recoverable_classification() {
        let transient = SyncRecError::TransientRead {
            stream: StreamKind::Imu,
            reason: "expected 9 fields".to_string(),
        };
        assert!(transient.is_recoverable());
        assert!(transient.with_context("sample").is_recoverable());

        let stale = SyncRecError::StaleData {
            stream: StreamKind::Imu,
            timeout: Duration::from_secs(1),
        };
        assert!(!stale.is_recoverable());
        assert_eq!(stale.stream(), Some(StreamKind::Imu));
    }

    #[test]
    fn test_partial_failure_lists_streams() {
        let err = SyncRecError::PartialFailure {
            failures: vec![StreamFailure {
                stream: StreamKind::Camera,
                reason: "stalled".to_string(),
                last_good_index: None,
            }],
        };
        let text = err.to_string();
        assert!(text.contains("camera"));
        assert!(text.contains("no samples"));
    }
}
