//! Shared test support utilities.
//!
//! This module provides helpers for integration tests: builders for
//! per-unit indexes and a scripted parser the pipeline can be driven with.

#![allow(dead_code)]

pub mod parser;
pub mod units;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use xindex::cache::{IndexCache, MemoryCache};
use xindex::config::IndexerConfig;
use xindex::pipeline::{IndexMode, Notification, Pipeline, Request};

use parser::FixtureParser;

/// Pipeline settings with short ticks so tests settle quickly.
pub fn test_config(threads: usize) -> IndexerConfig {
    IndexerConfig {
        threads,
        batch_size: 8,
        tick: Duration::from_millis(10),
        backlog_timeout: Duration::from_secs(5),
        cache_dir: None,
        ..IndexerConfig::default()
    }
}

/// Start a pipeline over `parser` with a fresh in-memory cache.
pub fn start(parser: &Arc<FixtureParser>, config: IndexerConfig) -> Pipeline {
    start_with_cache(parser, config, Arc::new(MemoryCache::new()))
}

/// Start a pipeline over `parser` with the given cache.
pub fn start_with_cache(
    parser: &Arc<FixtureParser>,
    config: IndexerConfig,
    cache: Arc<dyn IndexCache>,
) -> Pipeline {
    Pipeline::start(config, parser.clone(), cache).expect("pipeline should start")
}

/// Submit `requests` with ids `0..n` and wait for every completion.
pub fn run_requests(pipeline: &Pipeline, requests: Vec<Request>) -> HashMap<u64, Notification> {
    let count = requests.len();
    for (id, request) in requests.into_iter().enumerate() {
        pipeline
            .submit(request.with_id(id as u64))
            .expect("submit should succeed");
    }
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut done = HashMap::new();
    while done.len() < count {
        assert!(
            Instant::now() < deadline,
            "timed out with {} of {count} requests complete",
            done.len()
        );
        for note in pipeline.wait_notifications(deadline) {
            done.insert(note.id, note);
        }
    }
    assert!(pipeline.wait_idle(Duration::from_secs(20)), "pipeline never went idle");
    done
}

/// Index each path in `mode` and wait for all of them.
pub fn index_paths(pipeline: &Pipeline, paths: &[&str], mode: IndexMode) -> HashMap<u64, Notification> {
    run_requests(
        pipeline,
        paths.iter().map(|p| Request::new(*p, mode)).collect(),
    )
}
