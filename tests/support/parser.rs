//! A scripted parser.
//!
//! Each path is given the record-sets a parse returns, or told to fail or
//! panic. Write times are kept in memory so tests can "touch" and "delete"
//! files without a filesystem.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use xindex::index::PerUnitIndex;
use xindex::parser::{IndexParser, Overlay, ParseFailure};

/// What parsing a path does.
#[derive(Debug, Clone)]
pub enum Script {
    Records(Vec<PerUnitIndex>),
    Fail(String),
    Panic(String),
}

#[derive(Debug, Default)]
pub struct FixtureParser {
    scripts: Mutex<HashMap<String, Script>>,
    times: Mutex<HashMap<String, i64>>,
    parses: AtomicUsize,
    delay: Duration,
}

impl FixtureParser {
    pub fn new() -> Self {
        FixtureParser::default()
    }

    /// A parser that sleeps for `delay` in every parse.
    pub fn with_delay(delay: Duration) -> Self {
        FixtureParser {
            delay,
            ..FixtureParser::default()
        }
    }

    /// Parsing `main.path` yields `main` followed by `others`.
    pub fn set(&self, main: PerUnitIndex, others: Vec<PerUnitIndex>) {
        let path = main.path.clone();
        let mut records = vec![main];
        records.extend(others);
        {
            let mut times = self.times.lock().unwrap();
            for record in &records {
                times.entry(record.path.clone()).or_insert(1);
            }
        }
        self.set_script(&path, Script::Records(records));
    }

    pub fn set_script(&self, path: &str, script: Script) {
        self.times
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_insert(1);
        self.scripts
            .lock()
            .unwrap()
            .insert(path.to_string(), script);
    }

    /// Advance the write time of `path`.
    pub fn touch(&self, path: &str) {
        *self
            .times
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_insert(0) += 1;
    }

    /// Make `path` look deleted from disk.
    pub fn remove_file(&self, path: &str) {
        self.times.lock().unwrap().remove(path);
    }

    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::SeqCst)
    }

    /// What parsing `path` returns without overlays, without counting it.
    pub fn records(&self, path: &str) -> Vec<PerUnitIndex> {
        self.produce(path, &[]).expect("scripted records")
    }

    fn produce(&self, path: &str, overlays: &[Overlay]) -> Result<Vec<PerUnitIndex>, ParseFailure> {
        let script = self.scripts.lock().unwrap().get(path).cloned();
        match script {
            None => Err(ParseFailure::Missing {
                path: path.to_string(),
            }),
            Some(Script::Fail(reason)) => Err(ParseFailure::failed(path, reason)),
            Some(Script::Panic(message)) => panic!("{message}"),
            Some(Script::Records(records)) => {
                let times = self.times.lock().unwrap();
                Ok(records
                    .into_iter()
                    .map(|mut record| {
                        record.last_write_time = times.get(&record.path).copied().unwrap_or(0);
                        if let Some(overlay) = overlays.iter().find(|o| o.path == record.path) {
                            record.file_contents = overlay.content.clone();
                        }
                        record
                    })
                    .collect())
            }
        }
    }
}

impl IndexParser for FixtureParser {
    fn parse(
        &self,
        path: &str,
        _args: &[String],
        overlays: &[Overlay],
    ) -> Result<Vec<PerUnitIndex>, ParseFailure> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.produce(path, overlays)
    }

    fn last_write_time(&self, path: &str) -> Option<i64> {
        self.times.lock().unwrap().get(path).copied()
    }
}
