use thiserror::Error;

use crate::segment::SegmentId;

/// Main error type for attribute storage operations
#[derive(Error, Debug)]
pub enum AttrError {
    #[error("Format error in {context}: expected {expected}, got {actual}")]
    Format {
        context: String,
        expected: u64,
        actual: u64,
    },

    #[error("Corrupt patch stream for field {field} at byte {offset}: {reason}")]
    CorruptPatchStream {
        field: String,
        offset: u64,
        reason: String,
    },

    #[error("Unsupported width: {0}")]
    UnsupportedWidth(u8),

    #[error("Failed to open {segment}: {source}")]
    SegmentOpen {
        segment: SegmentId,
        #[source]
        source: Box<AttrError>,
    },

    #[error("Value is reserved as a sentinel and cannot be stored")]
    ReservedSentinel,

    #[error("Invalid value for field {field}: {token:?}")]
    InvalidValue { field: String, token: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for attribute storage operations
pub type Result<T> = std::result::Result<T, AttrError>;

impl AttrError {
    /// Shorthand for a length/structure mismatch
    pub fn format(context: impl Into<String>, expected: u64, actual: u64) -> Self {
        AttrError::Format {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Shorthand for a malformed patch entry
    pub fn corrupt_patch(field: &str, offset: u64, reason: impl Into<String>) -> Self {
        AttrError::CorruptPatchStream {
            field: field.to_string(),
            offset,
            reason: reason.into(),
        }
    }

    /// Attach the segment being opened to this error
    pub fn in_segment(self, segment: SegmentId) -> Self {
        match self {
            err @ AttrError::SegmentOpen { .. } => err,
            other => AttrError::SegmentOpen {
                segment,
                source: Box::new(other),
            },
        }
    }

    /// Check if this error signals on-disk corruption or a format mismatch.
    ///
    /// These are never retryable without operator intervention.
    pub fn is_fatal_format(&self) -> bool {
        match self {
            AttrError::Format { .. }
            | AttrError::CorruptPatchStream { .. }
            | AttrError::UnsupportedWidth(_) => true,
            AttrError::SegmentOpen { source, .. } => source.is_fatal_format(),
            _ => false,
        }
    }
}
