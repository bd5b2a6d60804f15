//! Core of the xindex incremental code indexer.
//!
//! This crate is language-agnostic and free of threads:
//! - Position/range value types and symbol occurrences
//! - Per-unit index records and their Delta computation
//! - The global symbol store with refcounted Delta application
//! - Store queries and canonical dumps
//! - Position reconciliation between indexed and live content
//! - Versioned persistence of per-unit indexes
//! - Error types and error codes

pub mod delta;
pub mod error;
pub mod index;
pub mod position;
pub mod query;
pub mod reconcile;
pub mod serialize;
pub mod store;
pub mod symbol;

pub use delta::{compute_delta, compute_removal, Delta};
pub use error::{ErrorCode, XindexError};
pub use index::PerUnitIndex;
pub use position::{Position, Range};
pub use store::GlobalStore;
