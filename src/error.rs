//! Error types for reference building and classification.

use thiserror::Error;

use crate::annotation::io::ParseError;

/// Errors raised while building the reference or classifying queries.
#[derive(Debug, Error)]
pub enum Error {
    /// Structurally invalid reference annotation. Fatal for the build.
    #[error("malformed annotation ({transcript_id}): {reason}")]
    MalformedAnnotation {
        transcript_id: String,
        reason: String,
    },

    /// Query transcript that cannot be classified. Reported and skipped.
    #[error("invalid transcript {transcript_id}: {reason}")]
    InvalidTranscript {
        transcript_id: String,
        reason: String,
    },

    /// Unrecoverable problem reading an input file.
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialized index could not be read or written.
    #[error("index file: {0}")]
    Index(String),
}

impl Error {
    pub fn malformed(transcript_id: impl Into<String>, reason: impl ToString) -> Self {
        Error::MalformedAnnotation {
            transcript_id: transcript_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid(transcript_id: impl Into<String>, reason: impl ToString) -> Self {
        Error::InvalidTranscript {
            transcript_id: transcript_id.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
