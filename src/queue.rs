//! Two-lane blocking queues sharing one condition variable.
//!
//! Every [`ThreadedQueue`] attached to a [`MultiQueueWaiter`] notifies it on
//! push, so one thread can block until any of several queues has work (or a
//! caller-supplied condition becomes true) without polling.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Lock a mutex, recovering the data from a poisoned lock.
///
/// Every critical section in the pipeline leaves its data consistent, so a
/// panic elsewhere never invalidates what the lock protects.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Waiter
// ============================================================================

/// Anything a [`MultiQueueWaiter`] can wait on.
pub trait Waitable {
    /// True if the queue has nothing to pop.
    fn is_empty(&self) -> bool;
}

/// One condition variable shared by every attached queue.
#[derive(Debug, Default)]
pub struct MultiQueueWaiter {
    lock: Mutex<()>,
    cv: Condvar,
}

impl MultiQueueWaiter {
    pub fn new() -> Arc<Self> {
        Arc::new(MultiQueueWaiter::default())
    }

    /// Wake every waiting thread so it re-checks its condition.
    pub fn notify_all(&self) {
        // Taking the lock orders the wakeup after any in-progress check.
        let _guard = lock(&self.lock);
        self.cv.notify_all();
    }

    /// Block until `ready()` is true or `deadline` passes.
    ///
    /// Returns the final value of `ready()`.
    pub fn wait_until(&self, deadline: Option<Instant>, mut ready: impl FnMut() -> bool) -> bool {
        let mut guard = lock(&self.lock);
        loop {
            if ready() {
                return true;
            }
            match deadline {
                None => {
                    guard = self.cv.wait(guard).unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return ready();
                    }
                    guard = self
                        .cv
                        .wait_timeout(guard, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0);
                }
            }
        }
    }

    /// Block until any of `queues` is non-empty or `deadline` passes.
    pub fn wait(&self, queues: &[&dyn Waitable], deadline: Option<Instant>) -> bool {
        self.wait_until(deadline, || queues.iter().any(|q| !q.is_empty()))
    }
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Debug)]
struct Lanes<T> {
    priority: VecDeque<T>,
    normal: VecDeque<T>,
}

/// A FIFO queue with a priority lane drained first.
#[derive(Debug)]
pub struct ThreadedQueue<T> {
    lanes: Mutex<Lanes<T>>,
    waiter: Arc<MultiQueueWaiter>,
}

impl<T> ThreadedQueue<T> {
    /// Create a queue that notifies `waiter` on every push.
    pub fn new(waiter: Arc<MultiQueueWaiter>) -> Self {
        ThreadedQueue {
            lanes: Mutex::new(Lanes {
                priority: VecDeque::new(),
                normal: VecDeque::new(),
            }),
            waiter,
        }
    }

    /// Push an item; `priority` items are popped before all normal items.
    pub fn push(&self, item: T, priority: bool) {
        {
            let mut lanes = lock(&self.lanes);
            if priority {
                lanes.priority.push_back(item);
            } else {
                lanes.normal.push_back(item);
            }
        }
        self.waiter.notify_all();
    }

    /// Pop the oldest priority item, else the oldest normal item.
    pub fn try_pop(&self) -> Option<T> {
        let mut lanes = lock(&self.lanes);
        lanes.priority.pop_front().or_else(|| lanes.normal.pop_front())
    }

    /// Pop up to `max` items in lane order.
    pub fn try_pop_batch(&self, max: usize) -> Vec<T> {
        let mut lanes = lock(&self.lanes);
        let mut batch = Vec::with_capacity(max.min(lanes.priority.len() + lanes.normal.len()));
        while batch.len() < max {
            match lanes.priority.pop_front().or_else(|| lanes.normal.pop_front()) {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        batch
    }

    /// Remove every queued item.
    pub fn drain(&self) -> Vec<T> {
        let mut lanes = lock(&self.lanes);
        let mut all: Vec<T> = lanes.priority.drain(..).collect();
        all.extend(lanes.normal.drain(..));
        all
    }

    pub fn len(&self) -> usize {
        let lanes = lock(&self.lanes);
        lanes.priority.len() + lanes.normal.len()
    }
}

impl<T> Waitable for ThreadedQueue<T> {
    fn is_empty(&self) -> bool {
        let lanes = lock(&self.lanes);
        lanes.priority.is_empty() && lanes.normal.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
