//! JSON output types for the CLI.
//!
//! ## Design Principles
//!
//! 1. **Always JSON:** All CLI output is valid JSON (no mixed text/JSON)
//! 2. **Status first:** Every response has `status` as first field
//! 3. **Deterministic:** Same store -> same output (field order, array ordering)
//! 4. **Versioned:** Schema version in every response
//!
//! Positions are rendered 1-based (`line:col`, `line:col-line:col`).

use std::io::{self, Write};

use serde::Serialize;

use xindex_core::error::XindexError;
use xindex_core::index::{Detail, FuncDetail, TypeDetail, VarDetail};
use xindex_core::query::{Location, StoreDump};
use xindex_core::store::GlobalStore;
use xindex_core::symbol::Role;

use crate::pipeline::RequestState;

/// Version of the CLI output schema.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Shared Types
// ============================================================================

/// A location rendered for output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationInfo {
    pub path: String,
    /// 1-based `line:col-line:col`.
    pub range: String,
    /// Lowercase role names, e.g. `["reference", "call"]`.
    pub roles: Vec<String>,
}

impl From<&Location> for LocationInfo {
    fn from(loc: &Location) -> Self {
        LocationInfo {
            path: loc.path.clone(),
            range: loc.range.to_string(),
            roles: role_names(loc.role),
        }
    }
}

fn role_names(role: Role) -> Vec<String> {
    role.iter_names().map(|(name, _)| name.to_lowercase()).collect()
}

/// Error information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    /// Numeric error code, also the process exit code.
    pub code: u8,
    /// Human-readable message.
    pub message: String,
}

impl ErrorInfo {
    pub fn from_error(err: &XindexError) -> Self {
        ErrorInfo {
            code: err.error_code().code(),
            message: err.to_string(),
        }
    }
}

/// Entity and file counts of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub files: usize,
    pub funcs: usize,
    pub types: usize,
    pub vars: usize,
}

impl StoreStats {
    pub fn of(store: &GlobalStore) -> Self {
        StoreStats {
            files: store.files().filter(|f| f.def.is_some()).count(),
            funcs: live::<FuncDetail>(store),
            types: live::<TypeDetail>(store),
            vars: live::<VarDetail>(store),
        }
    }
}

fn live<D: Detail>(store: &GlobalStore) -> usize {
    store.entities::<D>().iter().filter(|e| !e.is_empty()).count()
}

// ============================================================================
// Responses
// ============================================================================

/// Outcome of one requested path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    pub path: String,
    pub state: RequestState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Response for `xindex index`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexResponse {
    pub status: String,
    pub schema_version: String,
    pub files: Vec<FileStatus>,
    pub store: StoreStats,
}

/// Response for `xindex refs`.
#[derive(Debug, Clone, Serialize)]
pub struct RefsResponse {
    pub status: String,
    pub schema_version: String,
    pub path: String,
    pub at: String,
    pub definitions: Vec<LocationInfo>,
    pub references: Vec<LocationInfo>,
}

/// Response for `xindex map`.
#[derive(Debug, Clone, Serialize)]
pub struct MapResponse {
    pub status: String,
    pub schema_version: String,
    /// `index_to_buffer` or `buffer_to_index`.
    pub direction: String,
    pub from: String,
    pub to: String,
}

/// Response for `xindex dump`.
#[derive(Debug, Clone, Serialize)]
pub struct DumpResponse {
    pub status: String,
    pub schema_version: String,
    pub files: Vec<FileStatus>,
    pub dump: StoreDump,
}

/// Error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub schema_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    pub fn from_error(err: &XindexError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

/// Emit a response as pretty JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use xindex_core::position::Range;

    #[test]
    fn locations_render_one_based() {
        let loc = Location {
            path: "a.cc".to_string(),
            range: Range::from_coords(0, 4, 0, 7),
            role: Role::REFERENCE | Role::CALL,
        };
        let info = LocationInfo::from(&loc);
        assert_eq!(info.range, "1:5-1:8");
        assert_eq!(info.roles, vec!["reference", "call"]);
    }

    #[test]
    fn error_response_has_status_first() {
        let response = ErrorResponse::from_error(&XindexError::not_indexed("a.cc"));
        let mut out = Vec::new();
        emit_response(&response, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["code"], 3);
        assert!(text.find("\"status\"").unwrap() < text.find("\"error\":").unwrap());
    }
}
