//! Queries parked until their path is indexed.
//!
//! A query against a path with no store entry waits here with a deadline. The
//! store consumer services the backlog after every merge batch and every
//! tick: a query whose path became indexed runs, one whose deadline passed is
//! answered `NotIndexed`.

use std::time::Instant;

use tracing::debug;

use xindex_core::error::XindexError;
use xindex_core::store::GlobalStore;

/// Callback that answers a parked query.
pub type Answer = Box<dyn FnOnce(Result<&GlobalStore, XindexError>) + Send>;

struct Parked {
    path: String,
    deadline: Instant,
    answer: Answer,
}

/// Parked queries in arrival order.
#[derive(Default)]
pub struct Backlog {
    parked: Vec<Parked>,
}

impl std::fmt::Debug for Backlog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backlog")
            .field("parked", &self.parked.len())
            .finish()
    }
}

impl Backlog {
    pub fn new() -> Self {
        Backlog::default()
    }

    /// Park a query on `path` until `deadline`.
    pub fn park(&mut self, path: impl Into<String>, deadline: Instant, answer: Answer) {
        let path = path.into();
        debug!(path = %path, "parked query");
        self.parked.push(Parked {
            path,
            deadline,
            answer,
        });
    }

    /// Answer every query that can be answered at `now`; returns how many.
    pub fn service(&mut self, store: &GlobalStore, now: Instant) -> usize {
        let (ready, waiting): (Vec<Parked>, Vec<Parked>) = std::mem::take(&mut self.parked)
            .into_iter()
            .partition(|p| store.is_indexed(&p.path) || now >= p.deadline);
        self.parked = waiting;

        let answered = ready.len();
        for parked in ready {
            if store.is_indexed(&parked.path) {
                (parked.answer)(Ok(store));
            } else {
                debug!(path = %parked.path, "parked query expired");
                (parked.answer)(Err(XindexError::not_indexed(parked.path)));
            }
        }
        answered
    }

    /// Answer every parked query with `err`.
    pub fn fail_all(&mut self, err: &XindexError) {
        for parked in std::mem::take(&mut self.parked) {
            (parked.answer)(Err(err.clone()));
        }
    }

    /// The earliest deadline among parked queries.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.parked.iter().map(|p| p.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }
}
