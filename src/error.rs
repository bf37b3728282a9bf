//! Centralized error types for maildir2addr.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::address::SyntaxError;

/// All errors produced by the maildir2addr library.
#[derive(Error, Debug)]
pub enum AddrError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A message file could not be opened or read.
    #[error("reading message '{path}': {source}")]
    MessageRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An exclusion rule failed to compile.
    #[error("exclusion pattern ({pattern}): {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },

    /// The header block of a message is malformed.
    #[error("malformed header block: {reason}")]
    Header { reason: String },

    /// An RFC 2047 encoded-word could not be decoded.
    #[error("[{field}] {value}: {reason}")]
    EncodedWord {
        field: String,
        value: String,
        reason: String,
    },

    /// A decoded header value is not a valid mailbox list.
    #[error("[{field}] {value}: {source}")]
    AddressList {
        field: String,
        value: String,
        source: SyntaxError,
    },

    /// A scan root could not be traversed.
    #[error("walking '{path}': {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// Convenience alias for `Result<T, AddrError>`.
pub type Result<T> = std::result::Result<T, AddrError>;

impl AddrError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error should abort the whole run.
    ///
    /// Message-level failures (unreadable message, header, encoded-word,
    /// and address-list errors) only abort the message they occurred in.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io { .. } | Self::Pattern { .. } | Self::Walk { .. } => true,
            Self::MessageRead { .. }
            | Self::Header { .. }
            | Self::EncodedWord { .. }
            | Self::AddressList { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_errors_are_recoverable() {
        let err = AddrError::Header {
            reason: "missing colon".to_string(),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_pattern_error_is_fatal() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = AddrError::Pattern {
            pattern: "(".to_string(),
            source,
        };
        assert!(err.is_fatal());
        assert!(err.to_string().starts_with("exclusion pattern (()"));
    }

    #[test]
    fn test_encoded_word_error_names_field() {
        let err = AddrError::EncodedWord {
            field: "From".to_string(),
            value: "=?x-bogus?Q?abc?=".to_string(),
            reason: "unknown charset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "[From] =?x-bogus?Q?abc?=: unknown charset"
        );
    }
}
