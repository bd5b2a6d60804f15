//! Error bridge implementations for pipeline-side errors.
//!
//! This module provides `impl From<X> for XindexError` conversions from the
//! error types of the root crate (parser, cache, configuration) to the
//! unified `XindexError` type.
//!
//! These bridges live in the root crate rather than `xindex-core` because
//! they depend on types that are not part of core.

use xindex_core::error::XindexError;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::parser::ParseFailure;

// ============================================================================
// Bridge: ParseFailure -> XindexError
// ============================================================================

impl From<ParseFailure> for XindexError {
    fn from(err: ParseFailure) -> Self {
        match err {
            ParseFailure::Missing { path } => XindexError::ParseFailed {
                path,
                reason: "file does not exist".to_string(),
            },
            ParseFailure::Failed { path, reason } => XindexError::ParseFailed { path, reason },
        }
    }
}

// ============================================================================
// Bridge: CacheError -> XindexError
// ============================================================================

impl From<CacheError> for XindexError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Format(format) => XindexError::from(format),
            io @ CacheError::Io { .. } => XindexError::Internal {
                message: io.to_string(),
            },
        }
    }
}

// ============================================================================
// Bridge: ConfigError -> XindexError
// ============================================================================

impl From<ConfigError> for XindexError {
    fn from(err: ConfigError) -> Self {
        XindexError::InvalidArguments {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
