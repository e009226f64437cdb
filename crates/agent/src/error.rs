//! Errors of the stdio protocol layer.
//!
//! Handler failures stay `sous_core::Error`; this type only covers input
//! lines that never reach a handler.

/// A line on stdin that could not be turned into an event.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Not JSON at all.
    #[error("MALFORMED_LINE: {0}")]
    MalformedLine(String),

    /// JSON, but not a valid envelope. Carries the id when one was readable.
    #[error("INVALID_EVENT: {reason}")]
    InvalidEvent { id: Option<u64>, reason: String },
}

impl ProtocolError {
    /// Envelope id to report the failure against, if known.
    pub fn id(&self) -> Option<u64> {
        match self {
            ProtocolError::MalformedLine(_) => None,
            ProtocolError::InvalidEvent { id, .. } => *id,
        }
    }
}
