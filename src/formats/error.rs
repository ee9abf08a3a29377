//! Error types for region file parsing.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading a region annotation file.
#[derive(Error, Debug)]
pub enum FormatError {
    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid format structure or content
    #[error("Invalid format at line {line}: {message}")]
    InvalidFormat {
        /// 1-based line number
        line: usize,
        /// Description of the format error
        message: String,
    },

    /// File ended before a required field
    #[error("Unexpected end of file: expected {expected}")]
    UnexpectedEof {
        /// What the parser was looking for
        expected: String,
    },

    /// Invalid timestamp in a vertex or bounding box
    #[error("Invalid timestamp '{value}' at line {line}")]
    InvalidTimestamp {
        /// The unparsable date and time tokens
        value: String,
        /// 1-based line number
        line: usize,
    },

    /// No parser handles this file extension
    #[error("Unsupported region file: {path:?}")]
    UnsupportedFile {
        /// Offending file
        path: PathBuf,
    },
}

impl FormatError {
    /// Create an invalid format error with a message.
    pub fn invalid_format(line: usize, message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            line,
            message: message.into(),
        }
    }

    /// Create an unexpected end of file error.
    pub fn unexpected_eof(expected: impl Into<String>) -> Self {
        Self::UnexpectedEof {
            expected: expected.into(),
        }
    }
}
