//! The indexing pipeline: worker pool, single store writer and query front.
//!
//! ```text
//! submit ──► requests (priority | normal)
//!               │  N workers: staleness check, parse, diff against cache
//!               ▼
//!            updates ──► 1 consumer: GlobalStore::apply in batches
//!                              │  notifications, status, backlog
//!                              ▼
//!                   queries (read lock, parked until indexed)
//! ```
//!
//! Only the consumer thread mutates the store. Workers never block on the
//! store; queries share a read lock with each other and wait only while the
//! consumer applies a batch.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use xindex_core::delta::{compute_delta, compute_removal, Delta};
use xindex_core::error::XindexError;
use xindex_core::index::{Language, PerUnitIndex};
use xindex_core::position::Position;
use xindex_core::query::Location;
use xindex_core::store::{GlobalStore, StoreError};
use xindex_core::symbol::{DeclRef, EntityKind};

use crate::backlog::Backlog;
use crate::cache::IndexCache;
use crate::config::IndexerConfig;
use crate::documents::WorkingFiles;
use crate::parser::{IndexParser, ParseFailure};
use crate::queue::{lock, MultiQueueWaiter, ThreadedQueue, Waitable};
use crate::vfs::{Begin, Step, Vfs};

// ============================================================================
// Requests and Notifications
// ============================================================================

/// Why a path is being indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    /// Bulk indexing; uses the normal lane.
    Background,
    /// The open document changed; always parses.
    OnChange,
    /// Interactive request.
    Normal,
    /// Withdraw everything the path contributed.
    Delete,
}

impl IndexMode {
    /// Interactive modes use the priority lane.
    pub fn is_interactive(self) -> bool {
        !matches!(self, IndexMode::Background)
    }
}

/// A request to (re)index or delete one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub path: String,
    /// Compile args; empty reuses the args of the cached index.
    pub args: Vec<String>,
    pub mode: IndexMode,
    /// Fail instead of deleting when the file does not exist.
    pub must_exist: bool,
    /// Correlation id echoed in the completion notification.
    pub id: Option<u64>,
}

impl Request {
    pub fn new(path: impl Into<String>, mode: IndexMode) -> Self {
        Request {
            path: path.into(),
            args: Vec::new(),
            mode,
            must_exist: false,
            id: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn must_exist(mut self) -> Self {
        self.must_exist = true;
        self
    }
}

/// Latest known state of a requested path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Queued,
    Parsing,
    Merged,
    Skipped,
    Failed,
}

/// Completion of a request that carried a correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub path: String,
    pub state: RequestState,
    pub error: Option<XindexError>,
}

/// The request a Delta answers.
#[derive(Debug, Clone)]
struct Origin {
    path: String,
    id: Option<u64>,
}

impl Origin {
    fn of(request: &Request) -> Self {
        Origin {
            path: request.path.clone(),
            id: request.id,
        }
    }
}

#[derive(Debug)]
struct IndexUpdate {
    delta: Delta,
    origin: Option<Origin>,
}

enum Outcome {
    Emitted,
    Skipped,
    Failed(XindexError),
}

// ============================================================================
// Shared State
// ============================================================================

struct Shared {
    config: IndexerConfig,
    parser: Arc<dyn IndexParser>,
    cache: Arc<dyn IndexCache>,
    documents: Arc<WorkingFiles>,
    store: RwLock<GlobalStore>,
    waiter: Arc<MultiQueueWaiter>,
    requests: ThreadedQueue<Request>,
    updates: ThreadedQueue<IndexUpdate>,
    notifications: ThreadedQueue<Notification>,
    vfs: Vfs,
    backlog: Mutex<Backlog>,
    status: Mutex<HashMap<String, RequestState>>,
    deferred: Mutex<HashMap<String, Request>>,
    path_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Requests plus Deltas not yet finished.
    pending: AtomicUsize,
    /// Running pipeline threads.
    active: AtomicUsize,
    quit: AtomicBool,
}

fn read(store: &RwLock<GlobalStore>) -> RwLockReadGuard<'_, GlobalStore> {
    store.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(store: &RwLock<GlobalStore>) -> RwLockWriteGuard<'_, GlobalStore> {
    store.write().unwrap_or_else(PoisonError::into_inner)
}

/// Decrements the active-thread count when a pipeline thread exits.
struct ActiveGuard<'a>(&'a Shared);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
        self.0.waiter.notify_all();
    }
}

impl Shared {
    fn quitting(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    fn set_status(&self, path: &str, state: RequestState) {
        lock(&self.status).insert(path.to_string(), state);
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.waiter.notify_all();
        }
    }

    fn complete(&self, origin: &Origin, state: RequestState, error: Option<XindexError>) {
        self.set_status(&origin.path, state);
        if let Some(id) = origin.id {
            self.notifications.push(
                Notification {
                    id,
                    path: origin.path.clone(),
                    state,
                    error,
                },
                false,
            );
        }
    }

    fn path_lock(&self, path: &str) -> Arc<Mutex<()>> {
        Arc::clone(lock(&self.path_locks).entry(path.to_string()).or_default())
    }

    fn load_cached(&self, path: &str) -> Option<PerUnitIndex> {
        match self.cache.load(path) {
            Ok(Some(index)) if !index.dangling_lids().is_empty() => {
                let lids = index.dangling_lids();
                warn!(path, ?lids, "ignoring cached index with undefined local files");
                None
            }
            Ok(index) => index,
            Err(err) => {
                warn!(path, error = %err, "ignoring unusable cached index");
                None
            }
        }
    }

    // ------------------------------------------------------------------------
    // Workers
    // ------------------------------------------------------------------------

    fn worker_loop(&self) {
        let _active = ActiveGuard(self);
        loop {
            self.waiter
                .wait_until(None, || self.quitting() || !self.requests.is_empty());
            if self.quitting() {
                break;
            }
            if let Some(request) = self.requests.try_pop() {
                self.process(request);
            }
        }
    }

    fn process(&self, request: Request) {
        let origin = Origin::of(&request);
        {
            let mut deferred = lock(&self.deferred);
            if self.vfs.begin(&request.path) == Begin::Coalesced {
                debug!(path = %request.path, "coalesced with in-flight parse");
                let replaced = deferred.insert(request.path.clone(), request);
                drop(deferred);
                if let Some(old) = replaced {
                    self.complete(&Origin::of(&old), RequestState::Skipped, None);
                    self.finish_one();
                }
                return;
            }
        }

        self.set_status(&request.path, RequestState::Parsing);
        debug!(path = %request.path, mode = ?request.mode, "indexing");
        let outcome = match request.mode {
            IndexMode::Delete => self.delete(&request),
            _ => self.index(&request),
        };

        let rerun = {
            let mut deferred = lock(&self.deferred);
            if self.vfs.finish(&request.path) {
                deferred.remove(&request.path)
            } else {
                None
            }
        };
        if let Some(next) = rerun {
            let priority = next.mode.is_interactive();
            self.requests.push(next, priority);
        }

        match outcome {
            Outcome::Emitted => {}
            Outcome::Skipped => self.complete(&origin, RequestState::Skipped, None),
            Outcome::Failed(err) => {
                warn!(path = %origin.path, error = %err, "indexing failed");
                self.complete(&origin, RequestState::Failed, Some(err));
            }
        }
        self.finish_one();
    }

    fn index(&self, request: &Request) -> Outcome {
        let path = request.path.as_str();
        let Some(write_time) = self.parser.last_write_time(path) else {
            if request.must_exist {
                return Outcome::Failed(
                    ParseFailure::Missing {
                        path: path.to_string(),
                    }
                    .into(),
                );
            }
            return self.delete(request);
        };

        let prev = self.load_cached(path);
        let args = if request.args.is_empty() {
            prev.as_ref().map(|p| p.args.clone()).unwrap_or_default()
        } else {
            request.args.clone()
        };

        if request.mode != IndexMode::OnChange {
            if let Some(prev) = prev.as_ref().filter(|p| self.is_fresh(p, write_time, &args)) {
                return self.load_from_cache(request, prev);
            }
        }

        let overlays = self.documents.overlays();
        let parsed = panic::catch_unwind(AssertUnwindSafe(|| {
            self.parser.parse(path, &args, &overlays)
        }));
        let records = match parsed {
            Ok(Ok(records)) => records,
            Ok(Err(failure)) => return Outcome::Failed(failure.into()),
            Err(payload) => {
                return Outcome::Failed(XindexError::ParseFailed {
                    path: path.to_string(),
                    reason: format!("parser panicked: {}", panic_message(payload.as_ref())),
                })
            }
        };
        if !records.iter().any(|r| r.path == path) {
            return Outcome::Failed(XindexError::ParseFailed {
                path: path.to_string(),
                reason: "parser returned no record for the requested file".to_string(),
            });
        }
        // Nothing from this parse is cached or merged unless every record is sound.
        for record in &records {
            let dangling = record.dangling_lids();
            if !dangling.is_empty() {
                return Outcome::Failed(XindexError::ParseFailed {
                    path: path.to_string(),
                    reason: format!(
                        "record for {} uses undefined local file ids {:?}",
                        record.path, dangling
                    ),
                });
            }
        }

        for record in records {
            let is_main = record.path == path;
            let step = if overlays.iter().any(|o| o.path == record.path) {
                Step::Edited
            } else {
                Step::Indexed
            };
            let advanced = self.vfs.stamp(&record.path, record.last_write_time, step);
            if is_main {
                self.emit(record, Some(Origin::of(request)));
            } else if advanced {
                self.emit(record, None);
            }
        }
        Outcome::Emitted
    }

    /// True if `prev` still describes the file on disk.
    fn is_fresh(&self, prev: &PerUnitIndex, write_time: i64, args: &[String]) -> bool {
        prev.last_write_time == write_time
            && args_match(&prev.args, args)
            && prev
                .dependencies
                .iter()
                .all(|(dep, time)| self.parser.last_write_time(dep) == Some(*time))
    }

    /// Load an up-to-date cached index into the store if it is not there yet.
    fn load_from_cache(&self, request: &Request, prev: &PerUnitIndex) -> Outcome {
        if !self.vfs.stamp(&prev.path, prev.last_write_time, Step::Cached) {
            return Outcome::Skipped;
        }
        debug!(path = %prev.path, "loading cached index");
        self.push(compute_delta(None, prev), Some(Origin::of(request)));
        for dep in prev.dependencies.keys() {
            let Some(cached) = self.load_cached(dep) else {
                continue;
            };
            if self.vfs.stamp(dep, cached.last_write_time, Step::Cached) {
                self.push(compute_delta(None, &cached), None);
            }
        }
        Outcome::Emitted
    }

    /// Diff `record` against its cached predecessor and queue the Delta.
    fn emit(&self, record: PerUnitIndex, origin: Option<Origin>) {
        let path_lock = self.path_lock(&record.path);
        let _guard = lock(&path_lock);
        let prev = self.load_cached(&record.path);
        let delta = compute_delta(prev.as_ref(), &record);
        if let Err(err) = self.cache.store(&record) {
            warn!(path = %record.path, error = %err, "failed to cache index");
        }
        self.push(delta, origin);
    }

    fn delete(&self, request: &Request) -> Outcome {
        let path = request.path.as_str();
        let path_lock = self.path_lock(path);
        let _guard = lock(&path_lock);
        let Some(prev) = self.load_cached(path) else {
            return Outcome::Skipped;
        };
        if let Err(err) = self.cache.remove(path) {
            warn!(path, error = %err, "failed to remove cached index");
        }
        self.vfs.reset(path);
        self.push(compute_removal(Some(&prev), path), Some(Origin::of(request)));
        Outcome::Emitted
    }

    fn push(&self, delta: Delta, origin: Option<Origin>) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.updates.push(IndexUpdate { delta, origin }, false);
    }

    // ------------------------------------------------------------------------
    // Store Consumer
    // ------------------------------------------------------------------------

    fn consumer_loop(&self) {
        let _active = ActiveGuard(self);
        loop {
            if self.quitting() {
                break;
            }
            let batch = self.updates.try_pop_batch(self.config.batch_size);
            if !batch.is_empty() {
                self.apply_batch(batch);
            }
            self.service_backlog();

            let mut deadline = Instant::now() + self.config.tick;
            if let Some(next) = lock(&self.backlog).next_deadline() {
                deadline = deadline.min(next);
            }
            self.waiter.wait_until(Some(deadline), || {
                self.quitting() || !self.updates.is_empty()
            });
        }
    }

    fn apply_batch(&self, batch: Vec<IndexUpdate>) {
        let mut results = Vec::with_capacity(batch.len());
        {
            let mut store = write(&self.store);
            let mut removed_any = false;
            for IndexUpdate { delta, origin } in batch {
                let path = delta.path.clone();
                let content = delta.file_content.clone();
                removed_any |= delta.file_removed;
                match store.apply(delta) {
                    Ok(stats) => {
                        debug!(path = %path, defs = stats.defs_installed, refs = stats.refs_added, "merged");
                        if let Some(content) = content {
                            self.documents.set_index_content(&path, &content);
                        }
                        results.push((origin, None));
                    }
                    Err(err) => {
                        warn!(path = %path, error = %err, "rejected delta");
                        results.push((origin, Some(rejected(&path, err))));
                    }
                }
            }
            if removed_any {
                let pruned = store.prune();
                debug!(pruned, "pruned empty entities");
            }
        }

        for (origin, error) in results {
            if let Some(origin) = origin {
                let state = if error.is_some() {
                    RequestState::Failed
                } else {
                    RequestState::Merged
                };
                self.complete(&origin, state, error);
            }
            self.finish_one();
        }
    }

    fn service_backlog(&self) {
        let mut backlog = lock(&self.backlog);
        if backlog.is_empty() {
            return;
        }
        let store = read(&self.store);
        backlog.service(&store, Instant::now());
    }
}

/// Compare compile args, ignoring a swap of one source file for another.
fn args_match(a: &[String], b: &[String]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x == y
                || (Language::from_path(x) != Language::Unknown
                    && Language::from_path(y) != Language::Unknown)
        })
}

/// A Delta the store refused carries bad parser data for its file.
fn rejected(path: &str, err: StoreError) -> XindexError {
    XindexError::ParseFailed {
        path: path.to_string(),
        reason: format!("rejected delta: {err}"),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// A running indexer.
pub struct Pipeline {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("active", &self.shared.active.load(Ordering::SeqCst))
            .field("pending", &self.shared.pending.load(Ordering::SeqCst))
            .finish()
    }
}

impl Pipeline {
    /// Start `config.threads` workers and the store consumer.
    pub fn start(
        config: IndexerConfig,
        parser: Arc<dyn IndexParser>,
        cache: Arc<dyn IndexCache>,
    ) -> Result<Self, XindexError> {
        let waiter = MultiQueueWaiter::new();
        let threads = config.threads.max(1);
        let shared = Arc::new(Shared {
            documents: Arc::new(WorkingFiles::new(config.align)),
            config,
            parser,
            cache,
            store: RwLock::new(GlobalStore::new()),
            requests: ThreadedQueue::new(Arc::clone(&waiter)),
            updates: ThreadedQueue::new(Arc::clone(&waiter)),
            notifications: ThreadedQueue::new(Arc::clone(&waiter)),
            waiter,
            vfs: Vfs::new(),
            backlog: Mutex::new(Backlog::new()),
            status: Mutex::new(HashMap::new()),
            deferred: Mutex::new(HashMap::new()),
            path_locks: Mutex::new(HashMap::new()),
            pending: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            quit: AtomicBool::new(false),
        });

        let pipeline = Pipeline {
            shared,
            handles: Mutex::new(Vec::with_capacity(threads + 1)),
        };
        for i in 0..threads {
            pipeline.spawn(format!("xindex-worker-{i}"), Shared::worker_loop)?;
        }
        pipeline.spawn("xindex-store".to_string(), Shared::consumer_loop)?;
        info!(threads, "indexer started");
        Ok(pipeline)
    }

    fn spawn(&self, name: String, body: fn(&Shared)) -> Result<(), XindexError> {
        let shared = Arc::clone(&self.shared);
        shared.active.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(name)
            .spawn(move || body(&shared));
        match spawned {
            Ok(handle) => {
                lock(&self.handles).push(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.active.fetch_sub(1, Ordering::SeqCst);
                self.shutdown();
                Err(err.into())
            }
        }
    }

    /// Open documents; their buffers are handed to the parser as overlays.
    pub fn documents(&self) -> &Arc<WorkingFiles> {
        &self.shared.documents
    }

    /// Queue a request.
    pub fn submit(&self, request: Request) -> Result<(), XindexError> {
        if self.shared.quitting() {
            return Err(XindexError::ShuttingDown);
        }
        if request.path.is_empty() {
            return Err(XindexError::invalid_args("empty path"));
        }
        self.shared.set_status(&request.path, RequestState::Queued);
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        let priority = request.mode.is_interactive();
        self.shared.requests.push(request, priority);
        Ok(())
    }

    /// Open a document and index it.
    ///
    /// Stored positions map from the last indexed content, so unsaved edits
    /// made before opening are honored.
    pub fn open_document(
        &self,
        path: &str,
        content: impl Into<String>,
        version: i64,
    ) -> Result<(), XindexError> {
        let documents = &self.shared.documents;
        documents.open(path, content, version);
        if let Some(indexed) = self.shared.load_cached(path) {
            documents.set_index_content(path, &indexed.file_contents);
        }
        self.submit(Request::new(path, IndexMode::Normal))
    }

    /// Replace an open document's buffer and re-index it.
    pub fn change_document(
        &self,
        path: &str,
        content: impl Into<String>,
        version: i64,
    ) -> Result<(), XindexError> {
        if !self.shared.documents.change(path, content, version) {
            return Err(XindexError::invalid_args(format!("document not open: {path}")));
        }
        self.submit(Request::new(path, IndexMode::OnChange))
    }

    /// Close a document; the store keeps what it indexed.
    pub fn close_document(&self, path: &str) -> bool {
        self.shared.documents.close(path)
    }

    /// Run `f` against the store once `path` is indexed.
    ///
    /// Waits at most the backlog timeout, then fails with `NotIndexed`.
    pub fn query<R, F>(&self, path: &str, f: F) -> Result<R, XindexError>
    where
        F: FnOnce(&GlobalStore) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.shared.quitting() {
            return Err(XindexError::ShuttingDown);
        }
        {
            let store = read(&self.shared.store);
            if store.is_indexed(path) {
                return Ok(f(&store));
            }
        }

        let (tx, rx) = mpsc::channel();
        let deadline = Instant::now() + self.shared.config.backlog_timeout;
        lock(&self.shared.backlog).park(
            path,
            deadline,
            Box::new(move |res: Result<&GlobalStore, XindexError>| {
                let _ = tx.send(res.map(f));
            }),
        );
        if self.shared.quitting() {
            lock(&self.shared.backlog).fail_all(&XindexError::ShuttingDown);
        }
        self.shared.waiter.notify_all();
        rx.recv().unwrap_or(Err(XindexError::ShuttingDown))
    }

    /// Run `f` against the store as it is now.
    pub fn with_store<R>(&self, f: impl FnOnce(&GlobalStore) -> R) -> R {
        f(&read(&self.shared.store))
    }

    /// Definitions of the symbol at a buffer position of `path`.
    pub fn definitions_at(&self, path: &str, pos: Position) -> Result<Vec<Location>, XindexError> {
        let documents = Arc::clone(&self.shared.documents);
        let owned = path.to_string();
        self.query(path, move |store| {
            lookup_at(store, &documents, &owned, pos, Lookup::Definitions)
        })?
    }

    /// References to the symbol at a buffer position of `path`.
    pub fn references_at(
        &self,
        path: &str,
        pos: Position,
        include_decls: bool,
    ) -> Result<Vec<Location>, XindexError> {
        let documents = Arc::clone(&self.shared.documents);
        let owned = path.to_string();
        self.query(path, move |store| {
            lookup_at(
                store,
                &documents,
                &owned,
                pos,
                Lookup::References { include_decls },
            )
        })?
    }

    /// Latest state of a requested path.
    pub fn status(&self, path: &str) -> Option<RequestState> {
        lock(&self.shared.status).get(path).copied()
    }

    /// Completion notifications, waiting until one arrives or `deadline`.
    pub fn wait_notifications(&self, deadline: Instant) -> Vec<Notification> {
        let notifications: &dyn Waitable = &self.shared.notifications;
        self.shared.waiter.wait(&[notifications], Some(deadline));
        self.shared.notifications.drain()
    }

    /// Block until no request or Delta is in flight; false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let pending = &self.shared.pending;
        self.shared
            .waiter
            .wait_until(Some(Instant::now() + timeout), || {
                pending.load(Ordering::SeqCst) == 0
            })
    }

    /// Stop every thread and answer parked queries with `ShuttingDown`.
    pub fn shutdown(&self) {
        if self.shared.quit.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.waiter.notify_all();
        let active = &self.shared.active;
        self.shared
            .waiter
            .wait_until(None, || active.load(Ordering::SeqCst) == 0);
        for handle in lock(&self.handles).drain(..) {
            let _ = handle.join();
        }
        lock(&self.shared.backlog).fail_all(&XindexError::ShuttingDown);
        let dropped = self.shared.requests.drain().len();
        info!(dropped, "indexer stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Position Queries
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Lookup {
    Definitions,
    References { include_decls: bool },
}

/// Resolve the symbol under a buffer position and map results back.
fn lookup_at(
    store: &GlobalStore,
    documents: &WorkingFiles,
    path: &str,
    pos: Position,
    lookup: Lookup,
) -> Result<Vec<Location>, XindexError> {
    let index_pos = match documents.with_reconciler(path, |r| r.buffer_to_index(pos, false)) {
        Some(mapped) => mapped?,
        None => pos,
    };
    let Some(file) = store.file_id(path) else {
        return Ok(Vec::new());
    };
    let Some(target) = store
        .symbols_at(file, index_pos)
        .into_iter()
        .find(|r| r.kind != EntityKind::File)
    else {
        return Ok(Vec::new());
    };

    let uses = match lookup {
        Lookup::Definitions => {
            let mut decls = store.definitions(target.kind, target.key);
            if decls.is_empty() {
                decls = store.declarations(target.kind, target.key);
            }
            decls.iter().map(DeclRef::as_use).collect()
        }
        Lookup::References { include_decls } => {
            store.references(target.kind, target.key, include_decls)
        }
    };

    let mut out: Vec<Location> = store
        .locations(&uses)
        .into_iter()
        .filter_map(|loc| {
            match documents.with_reconciler(&loc.path, |r| r.index_range_to_buffer(loc.range)) {
                None => Some(loc),
                Some(Ok(range)) => Some(Location { range, ..loc }),
                Some(Err(err)) => {
                    debug!(path = %loc.path, error = %err, "dropping unmappable location");
                    None
                }
            }
        })
        .collect();
    out.sort();
    out.dedup();
    Ok(out)
}
