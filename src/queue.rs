use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Upper bound on a single wait while a producer polls an unavailable queue.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

// ── OwnerThread ──────────────────────────────────────────────────────────────

/// The one thread allowed to touch toolkit state. Every queue, canvas and
/// sprite belongs to exactly one of these (the frame scheduler's thread).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct OwnerThread(ThreadId);

impl OwnerThread {
    pub fn current() -> Self {
        Self(thread::current().id())
    }

    pub fn is_current(self) -> bool {
        thread::current().id() == self.0
    }

    pub fn thread_id(self) -> ThreadId {
        self.0
    }
}

// ── QueueStage ───────────────────────────────────────────────────────────────

/// The four queues drained every tick, in this order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueStage {
    /// Internal pre-process work (menu widgets, host requests).
    Pre,
    /// Level logic, runs before sprite visuals are refreshed.
    Level,
    /// Sprite redraws.
    Sprite,
    /// Post-process cleanup, e.g. surface destruction.
    Post,
}

impl QueueStage {
    pub const ORDER: [QueueStage; 4] =
        [QueueStage::Pre, QueueStage::Level, QueueStage::Sprite, QueueStage::Post];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            QueueStage::Pre => "internal execution",
            QueueStage::Level => "levels",
            QueueStage::Sprite => "sprites",
            QueueStage::Post => "internal postprocess",
        }
    }
}

impl fmt::Display for QueueStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── CommandQueue ─────────────────────────────────────────────────────────────

struct QueueState<T> {
    items: Vec<T>,
    available: bool,
    closed: bool,
    owner: Option<OwnerThread>,
}

/// FIFO of deferred work bound to one owner thread.
///
/// Producers on any thread call [`enqueue`](Self::enqueue); it waits until the
/// queue reports `available` (the queue starts out pending until the owner
/// [`open`](Self::open)s it). The owner calls [`drain_once`](Self::drain_once),
/// which swaps the whole backlog out before running any of it, so work queued
/// while a batch executes always lands in the next batch.
pub struct CommandQueue<T> {
    stage: QueueStage,
    state: Mutex<QueueState<T>>,
    ready: Condvar,
}

impl<T> CommandQueue<T> {
    /// A pending queue: enqueue blocks until [`open`](Self::open) is called.
    pub fn new(stage: QueueStage) -> Self {
        Self {
            stage,
            state: Mutex::new(QueueState {
                items: Vec::new(),
                available: false,
                closed: false,
                owner: None,
            }),
            ready: Condvar::new(),
        }
    }

    /// A queue already open for `owner`.
    pub fn with_owner(stage: QueueStage, owner: OwnerThread) -> Self {
        let queue = Self::new(stage);
        queue.open(owner);
        queue
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // No user code ever runs under this lock, so a poisoned guard still
        // holds a consistent Vec.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stage(&self) -> QueueStage {
        self.stage
    }

    pub fn owner(&self) -> Option<OwnerThread> {
        self.lock().owner
    }

    /// Bind the queue to `owner` and start accepting work.
    pub fn open(&self, owner: OwnerThread) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.owner = Some(owner);
        state.available = true;
        drop(state);
        self.ready.notify_all();
    }

    /// Stop accepting work. Anything still queued is dropped and counted.
    pub fn close(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        state.available = false;
        let dropped = std::mem::take(&mut state.items).len();
        drop(state);
        self.ready.notify_all();
        dropped
    }

    pub fn is_available(&self) -> bool {
        self.lock().available
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `item` to the tail, waiting in [`POLL_INTERVAL`] slices while the
    /// queue is unavailable. Unbounded: callers must not flood it.
    pub fn enqueue(&self, item: T) -> Result<()> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(EngineError::QueueClosed(self.stage));
            }
            if state.available {
                state.items.push(item);
                return Ok(());
            }
            state = match self.ready.wait_timeout(state, POLL_INTERVAL) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Swap the backlog out for an empty list. Owner thread only.
    pub fn take_batch(&self) -> Result<Vec<T>> {
        let mut state = self.lock();
        match state.owner {
            Some(owner) if owner.is_current() => {}
            _ => return Err(EngineError::WrongThread),
        }
        state.available = false;
        let batch = std::mem::take(&mut state.items);
        state.available = !state.closed;
        drop(state);
        self.ready.notify_all();
        Ok(batch)
    }

    /// One drain: swap the backlog out, then hand each item to `exec` in
    /// insertion order. Returns how many items ran.
    pub fn drain_once(&self, mut exec: impl FnMut(T)) -> Result<usize> {
        let batch = self.take_batch()?;
        let count = batch.len();
        for item in batch {
            exec(item);
        }
        Ok(count)
    }
}
