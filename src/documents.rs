//! Open documents and their reconcilers.
//!
//! Each open document keeps two texts: the live buffer and the content its
//! store entry was indexed from. Stored positions are mapped between the two
//! with a [`Reconciler`], rebuilt whenever either side changes.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::debug;

use xindex_core::reconcile::{AlignConfig, Reconciler};

use crate::parser::Overlay;
use crate::queue::lock;

/// One document open in an editor.
#[derive(Debug, Clone)]
pub struct WorkingFile {
    path: String,
    version: i64,
    buffer: String,
    index_content: String,
    reconciler: Reconciler,
}

impl WorkingFile {
    fn new(path: String, buffer: String, version: i64, align: AlignConfig) -> Self {
        // Until a merge says otherwise, the buffer is what will be indexed.
        let reconciler = Reconciler::new(&buffer, &buffer, align);
        WorkingFile {
            path,
            version,
            index_content: buffer.clone(),
            buffer,
            reconciler,
        }
    }

    fn rebuild(&mut self, align: AlignConfig) {
        self.reconciler = Reconciler::new(&self.index_content, &self.buffer, align);
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn index_content(&self) -> &str {
        &self.index_content
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }
}

/// The set of open documents.
#[derive(Debug, Default)]
pub struct WorkingFiles {
    files: Mutex<BTreeMap<String, WorkingFile>>,
    align: AlignConfig,
}

impl WorkingFiles {
    pub fn new(align: AlignConfig) -> Self {
        WorkingFiles {
            files: Mutex::new(BTreeMap::new()),
            align,
        }
    }

    /// Open (or reopen) `path` with `content`.
    pub fn open(&self, path: &str, content: impl Into<String>, version: i64) {
        let file = WorkingFile::new(path.to_string(), content.into(), version, self.align);
        lock(&self.files).insert(path.to_string(), file);
        debug!(path, version, "opened document");
    }

    /// Replace the buffer of an open document; false if it is not open.
    pub fn change(&self, path: &str, content: impl Into<String>, version: i64) -> bool {
        let mut files = lock(&self.files);
        match files.get_mut(path) {
            Some(file) => {
                file.buffer = content.into();
                file.version = version;
                file.rebuild(self.align);
                true
            }
            None => false,
        }
    }

    /// Close `path`; false if it was not open.
    pub fn close(&self, path: &str) -> bool {
        lock(&self.files).remove(path).is_some()
    }

    pub fn is_open(&self, path: &str) -> bool {
        lock(&self.files).contains_key(path)
    }

    /// Record the content the store now reflects for `path`.
    pub fn set_index_content(&self, path: &str, content: &str) -> bool {
        let mut files = lock(&self.files);
        match files.get_mut(path) {
            Some(file) => {
                if file.index_content != content {
                    file.index_content = content.to_string();
                    file.rebuild(self.align);
                }
                true
            }
            None => false,
        }
    }

    /// Unsaved content of every open document.
    pub fn overlays(&self) -> Vec<Overlay> {
        lock(&self.files)
            .values()
            .map(|file| Overlay {
                path: file.path.clone(),
                content: file.buffer.clone(),
            })
            .collect()
    }

    /// A snapshot of one open document.
    pub fn get(&self, path: &str) -> Option<WorkingFile> {
        lock(&self.files).get(path).cloned()
    }

    /// Run `f` against the reconciler of `path`, if it is open.
    pub fn with_reconciler<R>(&self, path: &str, f: impl FnOnce(&Reconciler) -> R) -> Option<R> {
        lock(&self.files).get(path).map(|file| f(&file.reconciler))
    }

    pub fn len(&self) -> usize {
        lock(&self.files).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xindex_core::position::Position;

    #[test]
    fn open_maps_identity_until_edited() {
        let docs = WorkingFiles::new(AlignConfig::default());
        docs.open("a.cc", "foo();\nbar();\n", 1);
        let pos = Position::new(1, 2);
        assert_eq!(
            docs.with_reconciler("a.cc", |r| r.index_to_buffer(pos, false)),
            Some(Ok(pos))
        );
        assert_eq!(docs.with_reconciler("b.cc", |_| ()), None);
    }

    #[test]
    fn edits_shift_stored_positions() {
        let docs = WorkingFiles::new(AlignConfig::default());
        docs.open("a.cc", "foo();\nbar();\nbaz();", 1);
        assert!(docs.change("a.cc", "foo();\n// comment\nbar();\nbaz();", 2));
        let mapped = docs
            .with_reconciler("a.cc", |r| r.index_to_buffer(Position::new(1, 0), false))
            .unwrap();
        assert_eq!(mapped, Ok(Position::new(2, 0)));

        // After a re-index the stored content matches the buffer again.
        assert!(docs.set_index_content("a.cc", "foo();\n// comment\nbar();\nbaz();"));
        let mapped = docs
            .with_reconciler("a.cc", |r| r.index_to_buffer(Position::new(1, 0), false))
            .unwrap();
        assert_eq!(mapped, Ok(Position::new(1, 0)));
        assert_eq!(docs.get("a.cc").unwrap().version(), 2);
    }

    #[test]
    fn overlays_and_close() {
        let docs = WorkingFiles::new(AlignConfig::default());
        docs.open("a.cc", "x", 1);
        docs.open("b.cc", "y", 1);
        let overlays = docs.overlays();
        assert_eq!(overlays.len(), 2);
        assert_eq!(overlays[0].path, "a.cc");
        assert!(docs.close("a.cc"));
        assert!(!docs.close("a.cc"));
        assert!(!docs.change("a.cc", "z", 2));
        assert!(!docs.set_index_content("a.cc", "z"));
        assert_eq!(docs.len(), 1);
    }
}
