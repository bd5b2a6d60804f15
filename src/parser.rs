//! The parser seam and the sidecar parser shipped with the binary.
//!
//! A language front end implements [`IndexParser`]: given a source unit, its
//! compile args and the unsaved editor content, it returns one
//! [`PerUnitIndex`] per file the parse visited. The pipeline never looks
//! inside a parse, so the trait is all it depends on.
//!
//! [`SidecarParser`] reads pre-built indexes from `<source>.xidx.json` files,
//! which lets the CLI and tests run without a compiler front end.

use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use xindex_core::index::{ContentHash, Language, PerUnitIndex};

/// Suffix of sidecar index files.
pub const SIDECAR_SUFFIX: &str = ".xidx.json";

/// Unsaved content of an open document, handed to the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overlay {
    pub path: String,
    pub content: String,
}

/// A parse that produced no usable index.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// The source file does not exist.
    #[error("source file not found: {path}")]
    Missing { path: String },

    /// The front end rejected the unit.
    #[error("failed to parse {path}: {reason}")]
    Failed { path: String, reason: String },
}

impl ParseFailure {
    pub fn failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ParseFailure::Failed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ParseFailure::Missing { path } | ParseFailure::Failed { path, .. } => path,
        }
    }
}

/// A language front end.
pub trait IndexParser: Send + Sync {
    /// Parse one unit; the record-set for `path` itself must be present.
    fn parse(
        &self,
        path: &str,
        args: &[String],
        overlays: &[Overlay],
    ) -> Result<Vec<PerUnitIndex>, ParseFailure>;

    /// Modification time of `path`, `None` if it does not exist.
    fn last_write_time(&self, path: &str) -> Option<i64>;
}

/// File modification time in nanoseconds since the epoch.
pub fn file_write_time(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let nanos = modified.duration_since(UNIX_EPOCH).ok()?.as_nanos();
    i64::try_from(nanos).ok()
}

// ============================================================================
// Sidecar Parser
// ============================================================================

/// Reads `<source>.xidx.json` instead of parsing `<source>`.
///
/// The sidecar holds a JSON list of per-file records. The parser fills in
/// what only the live filesystem knows: each visited file's contents (from an
/// overlay if one exists), the requested file's args and every write time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarParser;

impl SidecarParser {
    pub fn new() -> Self {
        SidecarParser
    }

    /// Path of the sidecar index for `source`.
    pub fn sidecar_path(source: &str) -> String {
        format!("{source}{SIDECAR_SUFFIX}")
    }
}

impl IndexParser for SidecarParser {
    fn parse(
        &self,
        path: &str,
        args: &[String],
        overlays: &[Overlay],
    ) -> Result<Vec<PerUnitIndex>, ParseFailure> {
        let overlay = overlays.iter().find(|o| o.path == path);
        let contents = match overlay {
            Some(overlay) => overlay.content.clone(),
            None => fs::read_to_string(path).map_err(|_| ParseFailure::Missing {
                path: path.to_string(),
            })?,
        };

        let sidecar = Self::sidecar_path(path);
        let text = fs::read_to_string(&sidecar)
            .map_err(|err| ParseFailure::failed(path, format!("{sidecar}: {err}")))?;
        let mut records: Vec<PerUnitIndex> = serde_json::from_str(&text)
            .map_err(|err| ParseFailure::failed(path, format!("{sidecar}: {err}")))?;

        if !records.iter().any(|r| r.path == path) {
            records.push(PerUnitIndex::empty(path));
        }
        for record in &mut records {
            if let Some(time) = self.last_write_time(&record.path) {
                record.last_write_time = time;
            }
            if record.language == Language::Unknown {
                record.language = Language::from_path(&record.path);
            }
            if record.path == path {
                record.args = args.to_vec();
                record.file_contents = contents.clone();
            } else if let Some(overlay) = overlays.iter().find(|o| o.path == record.path) {
                record.file_contents = overlay.content.clone();
            } else if let Ok(text) = fs::read_to_string(&record.path) {
                record.file_contents = text;
            }
        }

        debug!(
            path,
            records = records.len(),
            content = %ContentHash::compute(contents.as_bytes()),
            "read sidecar index"
        );
        Ok(records)
    }

    fn last_write_time(&self, path: &str) -> Option<i64> {
        file_write_time(Path::new(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use xindex_core::index::FuncDetail;
    use xindex_core::symbol::SymbolKey;

    fn sidecar(dir: &TempDir, name: &str, source: &str, records: &[PerUnitIndex]) -> String {
        let path = dir.path().join(name).to_string_lossy().into_owned();
        fs::write(&path, source).unwrap();
        fs::write(
            SidecarParser::sidecar_path(&path),
            serde_json::to_string(records).unwrap(),
        )
        .unwrap();
        path
    }

    #[test]
    fn fills_in_live_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.cc").to_string_lossy().into_owned();
        let mut record = PerUnitIndex::empty(&path);
        record.entity_mut::<FuncDetail>(SymbolKey(1)).def.name = "f".to_string();
        let path = sidecar(&dir, "a.cc", "void f();\n", &[record]);

        let args = vec!["clang".to_string(), path.clone()];
        let out = SidecarParser::new().parse(&path, &args, &[]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].file_contents, "void f();\n");
        assert_eq!(out[0].args, args);
        assert!(out[0].last_write_time > 0);
        assert_eq!(out[0].entity_count(), 1);
    }

    #[test]
    fn overlay_replaces_disk_contents() {
        let dir = TempDir::new().unwrap();
        let path = sidecar(&dir, "b.cc", "old\n", &[]);
        let overlays = [Overlay {
            path: path.clone(),
            content: "new\n".to_string(),
        }];
        let out = SidecarParser::new().parse(&path, &[], &overlays).unwrap();
        assert_eq!(out[0].path, path);
        assert_eq!(out[0].file_contents, "new\n");
    }

    #[test]
    fn missing_source_and_bad_sidecar() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("none.cc").to_string_lossy().into_owned();
        assert!(matches!(
            SidecarParser::new().parse(&missing, &[], &[]),
            Err(ParseFailure::Missing { .. })
        ));

        let path = dir.path().join("c.cc").to_string_lossy().into_owned();
        fs::write(&path, "x").unwrap();
        fs::write(SidecarParser::sidecar_path(&path), "{not json").unwrap();
        let err = SidecarParser::new().parse(&path, &[], &[]).unwrap_err();
        assert_eq!(err.path(), path);
        assert!(matches!(err, ParseFailure::Failed { .. }));
    }
}
