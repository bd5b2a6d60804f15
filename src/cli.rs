//! CLI command implementations.
//!
//! Each `run_*` function starts what it needs, does its work and returns the
//! response the binary prints. The binary (`main.rs`) owns argument parsing,
//! logging setup and error output.
//!
//! ## Error Handling
//!
//! All functions return `Result<T, XindexError>`; the error code of a failure
//! becomes the process exit code.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};
use walkdir::WalkDir;

use xindex_core::error::XindexError;
use xindex_core::position::Position;
use xindex_core::reconcile::{AlignConfig, Reconciler};

use crate::cache::{DiskCache, IndexCache, MemoryCache};
use crate::config::IndexerConfig;
use crate::output::{
    DumpResponse, ErrorInfo, FileStatus, IndexResponse, LocationInfo, MapResponse, RefsResponse,
    StoreStats, SCHEMA_VERSION,
};
use crate::parser::{SidecarParser, SIDECAR_SUFFIX};
use crate::pipeline::{IndexMode, Pipeline, Request, RequestState};

/// How long the CLI waits for a batch of requests to finish.
pub const INDEX_TIMEOUT: Duration = Duration::from_secs(600);

// ============================================================================
// Setup
// ============================================================================

/// Start a pipeline over sidecar indexes with the configured cache.
pub fn start_pipeline(config: &IndexerConfig) -> Result<Pipeline, XindexError> {
    let cache: Arc<dyn IndexCache> = match &config.cache_dir {
        Some(dir) => Arc::new(DiskCache::open(dir)?),
        None => Arc::new(MemoryCache::new()),
    };
    debug!(cache_dir = ?config.cache_dir, "starting pipeline");
    Pipeline::start(config.clone(), Arc::new(SidecarParser::new()), cache)
}

/// Expand files and directories into source files.
///
/// Directories contribute every file that has a sidecar index next to it.
/// Explicit files are kept as given.
pub fn collect_sources(paths: &[PathBuf]) -> Result<Vec<String>, XindexError> {
    let mut sources = BTreeSet::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(true) {
                let entry = entry.map_err(|e| XindexError::internal(e.to_string()))?;
                let file = entry.path();
                if entry.file_type().is_file() && has_sidecar(file) {
                    sources.insert(file.to_string_lossy().into_owned());
                }
            }
        } else if path.is_file() {
            sources.insert(path.to_string_lossy().into_owned());
        } else {
            return Err(XindexError::invalid_args(format!(
                "no such file or directory: {}",
                path.display()
            )));
        }
    }
    Ok(sources.into_iter().collect())
}

fn has_sidecar(file: &Path) -> bool {
    let name = file.to_string_lossy();
    !name.ends_with(SIDECAR_SUFFIX) && Path::new(&SidecarParser::sidecar_path(&name)).is_file()
}

/// Submit every source and wait for all of them to complete.
pub fn index_sources(
    pipeline: &Pipeline,
    sources: &[String],
    mode: IndexMode,
    timeout: Duration,
) -> Result<Vec<FileStatus>, XindexError> {
    for (id, path) in sources.iter().enumerate() {
        pipeline.submit(Request::new(path.clone(), mode).with_id(id as u64))?;
    }

    let deadline = Instant::now() + timeout;
    let mut done: Vec<Option<FileStatus>> = vec![None; sources.len()];
    let mut remaining = sources.len();
    while remaining > 0 {
        if Instant::now() >= deadline {
            return Err(XindexError::internal(format!(
                "timed out waiting for {remaining} of {} files",
                sources.len()
            )));
        }
        for note in pipeline.wait_notifications(deadline) {
            let Some(slot) = done.get_mut(note.id as usize) else {
                continue;
            };
            if slot.is_none() {
                remaining -= 1;
            }
            *slot = Some(FileStatus {
                path: note.path,
                state: note.state,
                error: note.error.as_ref().map(ErrorInfo::from_error),
            });
        }
    }
    Ok(done.into_iter().flatten().collect())
}

fn parse_position(at: &str) -> Result<Position, XindexError> {
    Position::parse(at).ok_or_else(|| {
        XindexError::invalid_args(format!("invalid position '{at}', expected line:col"))
    })
}

// ============================================================================
// Commands
// ============================================================================

/// `xindex index <paths..>`
pub fn run_index(config: &IndexerConfig, paths: &[PathBuf]) -> Result<IndexResponse, XindexError> {
    let sources = collect_sources(paths)?;
    let pipeline = start_pipeline(config)?;
    let files = index_sources(&pipeline, &sources, IndexMode::Background, INDEX_TIMEOUT)?;
    pipeline.wait_idle(INDEX_TIMEOUT);
    let store = pipeline.with_store(StoreStats::of);
    pipeline.shutdown();

    let merged = files
        .iter()
        .filter(|f| f.state == RequestState::Merged)
        .count();
    info!(requested = files.len(), merged, "index complete");
    Ok(IndexResponse {
        status: "ok".to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        files,
        store,
    })
}

/// `xindex refs <path> --at L:C`
pub fn run_refs(
    config: &IndexerConfig,
    path: &Path,
    at: &str,
    include_decls: bool,
    with: &[PathBuf],
) -> Result<RefsResponse, XindexError> {
    let pos = parse_position(at)?;
    let path = path.to_string_lossy().into_owned();
    let mut sources = collect_sources(with)?;
    sources.push(path.clone());
    sources.sort();
    sources.dedup();

    let pipeline = start_pipeline(config)?;
    let statuses = index_sources(&pipeline, &sources, IndexMode::Normal, INDEX_TIMEOUT)?;
    if let Some(failed) = statuses
        .iter()
        .find(|s| s.path == path && s.state == RequestState::Failed)
    {
        let message = failed
            .error
            .as_ref()
            .map_or_else(|| "indexing failed".to_string(), |e| e.message.clone());
        return Err(XindexError::ParseFailed {
            path: path.clone(),
            reason: message,
        });
    }
    pipeline.wait_idle(INDEX_TIMEOUT);

    let definitions = pipeline.definitions_at(&path, pos)?;
    let references = pipeline.references_at(&path, pos, include_decls)?;
    pipeline.shutdown();

    Ok(RefsResponse {
        status: "ok".to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        path,
        at: pos.to_string(),
        definitions: definitions.iter().map(LocationInfo::from).collect(),
        references: references.iter().map(LocationInfo::from).collect(),
    })
}

/// `xindex map --indexed F --buffer F --at L:C [--end] [--reverse]`
pub fn run_map(
    indexed: &Path,
    buffer: &Path,
    at: &str,
    is_end: bool,
    reverse: bool,
    align: AlignConfig,
) -> Result<MapResponse, XindexError> {
    let pos = parse_position(at)?;
    let indexed_text = fs::read_to_string(indexed)?;
    let buffer_text = fs::read_to_string(buffer)?;
    let reconciler = Reconciler::new(&indexed_text, &buffer_text, align);

    let (direction, mapped) = if reverse {
        ("buffer_to_index", reconciler.buffer_to_index(pos, is_end)?)
    } else {
        ("index_to_buffer", reconciler.index_to_buffer(pos, is_end)?)
    };
    Ok(MapResponse {
        status: "ok".to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        direction: direction.to_string(),
        from: pos.to_string(),
        to: mapped.to_string(),
    })
}

/// `xindex dump <paths..>`
pub fn run_dump(config: &IndexerConfig, paths: &[PathBuf]) -> Result<DumpResponse, XindexError> {
    let sources = collect_sources(paths)?;
    let pipeline = start_pipeline(config)?;
    let files = index_sources(&pipeline, &sources, IndexMode::Background, INDEX_TIMEOUT)?;
    pipeline.wait_idle(INDEX_TIMEOUT);
    let dump = pipeline.with_store(|store| store.dump());
    pipeline.shutdown();

    Ok(DumpResponse {
        status: "ok".to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        files,
        dump,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    mod sources {
        use super::*;

        #[test]
        fn directories_yield_files_with_sidecars() {
            let dir = TempDir::new().unwrap();
            let nested = dir.path().join("src");
            fs::create_dir_all(&nested).unwrap();
            fs::write(nested.join("a.cc"), "").unwrap();
            fs::write(nested.join("a.cc.xidx.json"), "[]").unwrap();
            fs::write(nested.join("b.cc"), "").unwrap();

            let sources = collect_sources(&[dir.path().to_path_buf()]).unwrap();
            assert_eq!(sources.len(), 1);
            assert!(sources[0].ends_with("a.cc"));
        }

        #[test]
        fn missing_path_is_invalid() {
            let err = collect_sources(&[PathBuf::from("/definitely/not/here")]).unwrap_err();
            assert_eq!(err.error_code().code(), 2);
        }
    }

    mod map {
        use super::*;

        #[test]
        fn maps_across_inserted_line() {
            let dir = TempDir::new().unwrap();
            let indexed = dir.path().join("indexed.cc");
            let buffer = dir.path().join("buffer.cc");
            fs::write(&indexed, "foo();\nbar();\nbaz();").unwrap();
            fs::write(&buffer, "foo();\n// comment\nbar();\nbaz();").unwrap();

            let out = run_map(&indexed, &buffer, "2:1", false, false, AlignConfig::default())
                .unwrap();
            assert_eq!(out.to, "3:1");
            let back = run_map(&indexed, &buffer, "3:1", false, true, AlignConfig::default())
                .unwrap();
            assert_eq!(back.to, "2:1");
            assert_eq!(back.direction, "buffer_to_index");
        }

        #[test]
        fn bad_position_and_out_of_bounds() {
            let dir = TempDir::new().unwrap();
            let file = dir.path().join("x.cc");
            fs::write(&file, "a\nb").unwrap();
            let err = run_map(&file, &file, "zero", false, false, AlignConfig::default())
                .unwrap_err();
            assert_eq!(err.error_code().code(), 2);
            let err = run_map(&file, &file, "9:1", false, false, AlignConfig::default())
                .unwrap_err();
            assert_eq!(err.error_code().code(), 5);
        }
    }
}
