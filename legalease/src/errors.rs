use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LegalEaseError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Handoff failed: {0}")]
    HandoffFailed(String),

    #[error("Invalid overlay transition: cannot {trigger} while {from}")]
    InvalidTransition { from: String, trigger: String },

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LegalEaseError>;

/// Error categories surfaced to the UI layer through error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    PermissionDenied,
    ExtractionFailed,
    HandoffFailed,
    Internal,
}

impl ErrorKind {
    /// Wire code carried in `ErrorEvent::error_code`.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::ExtractionFailed => "EXTRACTION_FAILED",
            ErrorKind::HandoffFailed => "HANDOFF_FAILED",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "PERMISSION_DENIED" => Some(ErrorKind::PermissionDenied),
            "EXTRACTION_FAILED" => Some(ErrorKind::ExtractionFailed),
            "HANDOFF_FAILED" => Some(ErrorKind::HandoffFailed),
            "INTERNAL" => Some(ErrorKind::Internal),
            _ => None,
        }
    }
}

impl LegalEaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LegalEaseError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            LegalEaseError::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
            LegalEaseError::HandoffFailed(_) => ErrorKind::HandoffFailed,
            _ => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for LegalEaseError {
    fn from(e: std::io::Error) -> Self {
        LegalEaseError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for LegalEaseError {
    fn from(e: serde_json::Error) -> Self {
        LegalEaseError::InvalidEvent(e.to_string())
    }
}
