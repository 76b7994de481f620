//! Codec errors

use thiserror::Error;
use trace_data::TraceError;

/// Errors raised while decoding or encoding trace files
#[derive(Debug, Error)]
pub enum CodecError {
    /// Unrecognized magic or unusable file header
    #[error("Format error: {0}")]
    Format(String),

    /// Malformed or truncated record stream
    #[error("Decode error at byte {offset}: {reason}")]
    Decode { offset: usize, reason: String },

    /// Trace cannot be represented in the target format
    #[error("Encode error: {0}")]
    Encode(String),

    /// JSON interchange error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Trace model rejected decoded data
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// Writer failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    pub(crate) fn decode(offset: usize, reason: impl Into<String>) -> Self {
        CodecError::Decode {
            offset,
            reason: reason.into(),
        }
    }
}
