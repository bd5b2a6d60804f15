//! Persistent cache of per-file indexes.
//!
//! The pipeline diffs every new parse against the cached previous index for
//! the same path. A miss means "never indexed": the Delta adds everything.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use xindex_core::index::PerUnitIndex;
use xindex_core::serialize::{self, SerializeError};

use crate::queue::lock;

/// Errors reading or writing cached indexes.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure on a cache entry.
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The entry exists but cannot be used.
    #[error(transparent)]
    Format(#[from] SerializeError),
}

/// Storage for the last index of each path.
pub trait IndexCache: Send + Sync {
    /// The cached index for `path`; `Ok(None)` on a miss.
    fn load(&self, path: &str) -> Result<Option<PerUnitIndex>, CacheError>;

    /// Replace the cached index for `index.path`.
    fn store(&self, index: &PerUnitIndex) -> Result<(), CacheError>;

    /// Drop the cached index for `path`; a miss is not an error.
    fn remove(&self, path: &str) -> Result<(), CacheError>;
}

// ============================================================================
// Memory Cache
// ============================================================================

/// Cache that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, PerUnitIndex>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        MemoryCache::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IndexCache for MemoryCache {
    fn load(&self, path: &str) -> Result<Option<PerUnitIndex>, CacheError> {
        Ok(lock(&self.entries).get(path).cloned())
    }

    fn store(&self, index: &PerUnitIndex) -> Result<(), CacheError> {
        lock(&self.entries).insert(index.path.clone(), index.clone());
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), CacheError> {
        lock(&self.entries).remove(path);
        Ok(())
    }
}

// ============================================================================
// Disk Cache
// ============================================================================

/// One versioned JSON file per path, named by the SHA-256 of the path.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    /// Open (creating if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(DiskCache { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the cached index for `path`.
    pub fn entry_path(&self, path: &str) -> PathBuf {
        let digest = Sha256::digest(path.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }
}

impl IndexCache for DiskCache {
    fn load(&self, path: &str) -> Result<Option<PerUnitIndex>, CacheError> {
        let entry = self.entry_path(path);
        let bytes = match fs::read(&entry) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path: entry, source }),
        };
        let index = serialize::from_bytes(&bytes)?;
        debug!(path, entry = %entry.display(), "cache hit");
        Ok(Some(index))
    }

    fn store(&self, index: &PerUnitIndex) -> Result<(), CacheError> {
        let entry = self.entry_path(&index.path);
        let bytes = serialize::to_bytes(index)?;
        atomic_write(&entry, &bytes).map_err(|source| CacheError::Io { path: entry, source })
    }

    fn remove(&self, path: &str) -> Result<(), CacheError> {
        let entry = self.entry_path(path);
        match fs::remove_file(&entry) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io { path: entry, source }),
        }
    }
}

/// Write through a uniquely named temp file and rename it into place.
fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};

    let pid = std::process::id();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let thread = format!("{:?}", std::thread::current().id());
    let thread: String = thread.chars().filter(char::is_ascii_digit).collect();

    let temp_path = path.with_file_name(format!(
        ".{}.{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        pid,
        thread,
        timestamp
    ));
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use xindex_core::index::FuncDetail;
    use xindex_core::symbol::SymbolKey;

    fn sample(path: &str) -> PerUnitIndex {
        let mut index = PerUnitIndex::empty(path);
        index.file_contents = "int f();\n".to_string();
        index.entity_mut::<FuncDetail>(SymbolKey(9)).def.name = "f".to_string();
        index
    }

    mod memory {
        use super::*;

        #[test]
        fn store_load_remove() {
            let cache = MemoryCache::new();
            assert_eq!(cache.load("a.cc").unwrap(), None);
            cache.store(&sample("a.cc")).unwrap();
            assert_eq!(cache.load("a.cc").unwrap(), Some(sample("a.cc")));
            cache.remove("a.cc").unwrap();
            cache.remove("a.cc").unwrap();
            assert!(cache.is_empty());
        }
    }

    mod disk {
        use super::*;

        #[test]
        fn entries_are_named_by_path_digest() {
            let dir = TempDir::new().unwrap();
            let cache = DiskCache::open(dir.path().join("nested")).unwrap();
            let entry = cache.entry_path("/src/a.cc");
            let name = entry.file_name().unwrap().to_string_lossy().into_owned();
            assert_eq!(name.len(), 64 + ".json".len());
            assert_ne!(entry, cache.entry_path("/src/b.cc"));
        }

        #[test]
        fn store_load_remove() {
            let dir = TempDir::new().unwrap();
            let cache = DiskCache::open(dir.path()).unwrap();
            assert_eq!(cache.load("a.cc").unwrap(), None);

            cache.store(&sample("a.cc")).unwrap();
            assert_eq!(cache.load("a.cc").unwrap(), Some(sample("a.cc")));
            let leftovers = fs::read_dir(dir.path())
                .unwrap()
                .filter(|e| {
                    e.as_ref()
                        .map(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
                        .unwrap_or(false)
                })
                .count();
            assert_eq!(leftovers, 0);

            cache.remove("a.cc").unwrap();
            assert_eq!(cache.load("a.cc").unwrap(), None);
            cache.remove("a.cc").unwrap();
        }

        #[test]
        fn other_format_version_is_rejected() {
            let dir = TempDir::new().unwrap();
            let cache = DiskCache::open(dir.path()).unwrap();
            fs::write(
                cache.entry_path("a.cc"),
                br#"{"format_version": 0, "index": {}}"#,
            )
            .unwrap();
            assert!(matches!(
                cache.load("a.cc"),
                Err(CacheError::Format(SerializeError::VersionMismatch { found: 0, .. }))
            ));
        }
    }
}
