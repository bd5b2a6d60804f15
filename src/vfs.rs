//! Staleness ledger: per path, the last stamped timestamp and pass.
//!
//! A stamp succeeds only if it advances `(timestamp, step)`; workers use this
//! to skip parses whose result is already in the store. The ledger also keeps
//! at most one parse in flight per path and remembers requests that arrived
//! while one was running.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::queue::lock;

/// Which pass last stamped a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Loaded from the persistent cache.
    Cached = 1,
    /// Parsed from disk.
    Indexed = 2,
    /// Parsed with unsaved editor content.
    Edited = 3,
}

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    stamp: Option<(i64, Step)>,
    in_flight: bool,
    rerun: bool,
}

/// Outcome of [`Vfs::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Begin {
    /// The caller owns the path until [`Vfs::finish`].
    Started,
    /// Another worker is parsing the path; the request was recorded.
    Coalesced,
}

/// Per-path staleness ledger.
#[derive(Debug, Default)]
pub struct Vfs {
    entries: Mutex<HashMap<String, Entry>>,
}

impl Vfs {
    pub fn new() -> Self {
        Vfs::default()
    }

    /// Record `(timestamp, step)` for `path` if it advances the last stamp.
    pub fn stamp(&self, path: &str, timestamp: i64, step: Step) -> bool {
        let mut entries = lock(&self.entries);
        let entry = entries.entry(path.to_string()).or_default();
        let advances = entry.stamp.is_none_or(|last| (timestamp, step) > last);
        if advances {
            entry.stamp = Some((timestamp, step));
        }
        advances
    }

    /// The last stamp recorded for `path`.
    #[cfg(test)]
    pub(crate) fn last_stamp(&self, path: &str) -> Option<(i64, Step)> {
        lock(&self.entries).get(path).and_then(|e| e.stamp)
    }

    /// Forget the stamp for `path` so the next stamp always succeeds.
    pub fn reset(&self, path: &str) {
        if let Some(entry) = lock(&self.entries).get_mut(path) {
            entry.stamp = None;
        }
    }

    /// Claim `path` for one parse.
    pub fn begin(&self, path: &str) -> Begin {
        let mut entries = lock(&self.entries);
        let entry = entries.entry(path.to_string()).or_default();
        if entry.in_flight {
            entry.rerun = true;
            Begin::Coalesced
        } else {
            entry.in_flight = true;
            Begin::Started
        }
    }

    /// Release `path`; true if a request arrived meanwhile and must be re-queued.
    pub fn finish(&self, path: &str) -> bool {
        match lock(&self.entries).get_mut(path) {
            Some(entry) => {
                entry.in_flight = false;
                std::mem::take(&mut entry.rerun)
            }
            None => false,
        }
    }
}
