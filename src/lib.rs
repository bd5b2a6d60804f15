//! xindex: incremental code indexer
//!
//! Parses source units concurrently, merges their per-file symbol pictures
//! into one refcounted store and answers queries against it, mapping stored
//! positions onto documents that are being edited.

// Core - re-exported from xindex-core
pub use xindex_core::delta;
pub use xindex_core::error;
pub use xindex_core::index;
pub use xindex_core::position;
pub use xindex_core::query;
pub use xindex_core::reconcile;
pub use xindex_core::serialize;
pub use xindex_core::store;
pub use xindex_core::symbol;

// Pipeline
pub mod backlog;
pub mod cache;
pub mod config;
pub mod documents;
pub mod parser;
pub mod pipeline;
pub mod queue;
pub mod vfs;

// Front door
pub mod cli;
pub mod output;

// Error bridges - converts parser, cache and config errors to XindexError
mod error_bridges;
