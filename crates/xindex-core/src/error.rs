//! Error types and error codes for xindex.
//!
//! Each subsystem owns a focused error enum (`StoreError`, `MappingError`,
//! `SerializeError`, ...). [`XindexError`] is the single front-door type that
//! queries, notifications and the CLI report.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad input from caller, bad configuration)
//! - `3`: Not indexed (path has no store entry before the deadline)
//! - `4`: Parse failed (parser error or panic for one unit)
//! - `5`: Unresolvable (no position mapping between indexed and live content)
//! - `10`: Internal errors (bugs, unexpected state, shutdown)
//!
//! ## Design
//!
//! - **Unified type**: `XindexError` is the single error type for output
//! - **Bridging**: `impl From<X> for XindexError` bridges subsystem errors
//! - **Code mapping**: [`ErrorCode`] provides stable integer codes

use std::fmt;

use thiserror::Error;

use crate::reconcile::MappingError;
use crate::serialize::SerializeError;
use crate::store::StoreError;

// ============================================================================
// Error Codes
// ============================================================================

/// Stable error codes, used as CLI exit codes and in notification payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Invalid arguments from caller.
    InvalidArguments = 2,
    /// The path is not indexed.
    NotIndexed = 3,
    /// Parsing a unit failed.
    ParseFailed = 4,
    /// A position could not be mapped.
    Unresolvable = 5,
    /// Internal errors (bugs, unexpected state).
    Internal = 10,
}

impl ErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for query results, notifications and CLI output.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XindexError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// The path has no store entry.
    #[error("not indexed: {path}")]
    NotIndexed { path: String },

    /// The parser failed (or panicked) for one unit.
    #[error("parse failed for {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    /// No mapping between indexed and live positions.
    #[error("unresolvable position: {message}")]
    Unresolvable { message: String },

    /// A persisted index was written by another format version.
    #[error("cached index format {found} does not match {expected}")]
    CacheVersionMismatch { found: u32, expected: u32 },

    /// The pipeline is shutting down.
    #[error("indexer is shutting down")]
    ShuttingDown,

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl From<&XindexError> for ErrorCode {
    fn from(err: &XindexError) -> Self {
        match err {
            XindexError::InvalidArguments { .. } => ErrorCode::InvalidArguments,
            XindexError::NotIndexed { .. } => ErrorCode::NotIndexed,
            XindexError::ParseFailed { .. } => ErrorCode::ParseFailed,
            XindexError::Unresolvable { .. } => ErrorCode::Unresolvable,
            XindexError::CacheVersionMismatch { .. } => ErrorCode::Internal,
            XindexError::ShuttingDown => ErrorCode::Internal,
            XindexError::Internal { .. } => ErrorCode::Internal,
        }
    }
}

// ============================================================================
// Bridges from Core Errors
// ============================================================================

impl From<MappingError> for XindexError {
    fn from(err: MappingError) -> Self {
        XindexError::Unresolvable {
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for XindexError {
    fn from(err: StoreError) -> Self {
        XindexError::Internal {
            message: format!("rejected delta: {}", err),
        }
    }
}

impl From<SerializeError> for XindexError {
    fn from(err: SerializeError) -> Self {
        match err {
            SerializeError::VersionMismatch { found, expected } => {
                XindexError::CacheVersionMismatch { found, expected }
            }
            SerializeError::Malformed(json_err) => XindexError::Internal {
                message: format!("JSON error: {}", json_err),
            },
        }
    }
}

impl From<std::io::Error> for XindexError {
    fn from(err: std::io::Error) -> Self {
        XindexError::Internal {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<serde_json::Error> for XindexError {
    fn from(err: serde_json::Error) -> Self {
        XindexError::Internal {
            message: format!("JSON error: {}", err),
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl XindexError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        XindexError::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create a not-indexed error.
    pub fn not_indexed(path: impl Into<String>) -> Self {
        XindexError::NotIndexed { path: path.into() }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        XindexError::Internal {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod error_code_mapping {
        use super::*;

        #[test]
        fn codes_are_stable() {
            assert_eq!(XindexError::invalid_args("x").error_code().code(), 2);
            assert_eq!(XindexError::not_indexed("a.cc").error_code().code(), 3);
            let parse = XindexError::ParseFailed {
                path: "a.cc".to_string(),
                reason: "boom".to_string(),
            };
            assert_eq!(parse.error_code().code(), 4);
            assert_eq!(XindexError::internal("x").error_code().code(), 10);
            assert_eq!(XindexError::ShuttingDown.error_code(), ErrorCode::Internal);
        }

        #[test]
        fn mapping_error_is_unresolvable() {
            let err: XindexError = MappingError::OutOfBounds { line: 9, len: 3 }.into();
            assert_eq!(err.error_code(), ErrorCode::Unresolvable);
            assert!(err.to_string().contains("line 9"));
        }

        #[test]
        fn version_mismatch_bridges() {
            let err: XindexError = SerializeError::VersionMismatch {
                found: 1,
                expected: 3,
            }
            .into();
            assert_eq!(
                err,
                XindexError::CacheVersionMismatch {
                    found: 1,
                    expected: 3
                }
            );
        }

        #[test]
        fn store_error_is_internal() {
            let err: XindexError = StoreError::EmptyPath.into();
            assert_eq!(err.error_code(), ErrorCode::Internal);
        }
    }
}
