use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use glam::{IVec2, UVec2};

use crate::backend::{Anchor, EventKind, InputEvent};
use crate::command::Command;
use crate::error::{EngineError, Result};
use crate::level::LevelObject;
use crate::queue::QueueStage;
use crate::scheduler::EngineContext;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanvasId(pub u64);

/// Key of one subscriber in a canvas event table (a sprite, a level, ...).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

pub type EventCallback = Arc<dyn Fn(&InputEvent) + Send + Sync>;

// ── EventTable ───────────────────────────────────────────────────────────────

/// Per-surface bind table: every event kind fans out to any number of
/// independent subscribers, so sprites sharing a canvas never clobber each
/// other's handlers.
#[derive(Default)]
pub struct EventTable {
    binds: BTreeMap<EventKind, BTreeMap<SubscriberId, EventCallback>>,
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace `subscriber`'s handler. Returns `true` when it is the
    /// first handler for `event`, i.e. the toolkit binding must be created.
    pub fn subscribe(&mut self, event: EventKind, subscriber: SubscriberId, callback: EventCallback) -> bool {
        let entry = self.binds.entry(event).or_default();
        let first = entry.is_empty();
        entry.insert(subscriber, callback);
        first
    }

    /// Drop `subscriber`'s handler. Returns `true` when `event` has no handler
    /// left, i.e. the toolkit binding can go.
    pub fn unsubscribe(&mut self, event: EventKind, subscriber: SubscriberId) -> bool {
        let Some(entry) = self.binds.get_mut(&event) else { return false };
        if entry.remove(&subscriber).is_none() {
            return false;
        }
        if entry.is_empty() {
            self.binds.remove(&event);
            return true;
        }
        false
    }

    /// Copy of the handlers for `event`, taken before dispatch so handlers may
    /// (un)subscribe while the event is being delivered.
    pub fn snapshot(&self, event: EventKind) -> Vec<EventCallback> {
        self.binds
            .get(&event)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, event: EventKind) -> usize {
        self.binds.get(&event).map_or(0, |subs| subs.len())
    }

    pub fn events(&self) -> Vec<EventKind> {
        self.binds.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.binds.clear();
    }
}

// ── Canvas ───────────────────────────────────────────────────────────────────

struct CanvasInner {
    id: CanvasId,
    ctx: EngineContext,
    size: UVec2,
    destroyed: AtomicBool,
}

/// Caller-side handle to a render surface living on the owner thread.
///
/// Creation blocks until the owner thread has built the surface; everything
/// else (binds, destruction) is queued.
#[derive(Clone)]
pub struct Canvas {
    inner: Arc<CanvasInner>,
}

/// Back-reference that does not keep the canvas alive.
#[derive(Clone)]
pub struct WeakCanvas(Weak<CanvasInner>);

impl WeakCanvas {
    pub fn upgrade(&self) -> Option<Canvas> {
        self.0.upgrade().map(|inner| Canvas { inner })
    }
}

impl Canvas {
    /// Queue creation of a `size` surface placed at `pos` on `stage`, then
    /// wait for the owner thread to report back.
    pub fn create(
        ctx: &EngineContext,
        stage: QueueStage,
        pos: IVec2,
        size: UVec2,
        anchor: Anchor,
    ) -> Result<Canvas> {
        if ctx.is_owner_thread() {
            return Err(EngineError::OwnerThreadBlocked);
        }
        let id = CanvasId(ctx.next_id());
        let (reply, done) = crossbeam_channel::bounded(1);
        ctx.enqueue(stage, Command::CreateCanvas { canvas: id, pos, size, anchor, reply })?;
        ctx.wait_reply(&done)?;
        Ok(Self::attach(ctx, id, size))
    }

    /// Handle for a canvas the owner thread already created
    /// (see [`Stage::create_canvas`](crate::command::Stage::create_canvas)).
    pub fn attach(ctx: &EngineContext, id: CanvasId, size: UVec2) -> Canvas {
        Canvas {
            inner: Arc::new(CanvasInner {
                id,
                ctx: ctx.clone(),
                size,
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> CanvasId {
        self.inner.id
    }

    pub fn size(&self) -> UVec2 {
        self.inner.size
    }

    pub fn context(&self) -> &EngineContext {
        &self.inner.ctx
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    pub fn downgrade(&self) -> WeakCanvas {
        WeakCanvas(Arc::downgrade(&self.inner))
    }

    /// Register `callback` for `event` under `subscriber`. No-op once destroyed.
    pub fn bind(&self, event: EventKind, subscriber: SubscriberId, callback: EventCallback) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.inner.ctx.enqueue(
            QueueStage::Level,
            Command::Subscribe { canvas: self.id(), event, subscriber, callback },
        )
    }

    pub fn unbind(&self, event: EventKind, subscriber: SubscriberId) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.inner
            .ctx
            .enqueue(QueueStage::Level, Command::Unsubscribe { canvas: self.id(), event, subscriber })
    }

    /// Mark destroyed and queue the surface teardown on the post-process queue,
    /// after the sprite removals of the same tick. Idempotent.
    pub fn destroy(&self) -> Result<()> {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.ctx.enqueue(QueueStage::Post, Command::DestroyCanvas { canvas: self.id() })
    }
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canvas")
            .field("id", &self.inner.id)
            .field("size", &self.inner.size)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl LevelObject for Canvas {
    fn destroy(&self) -> Result<()> {
        Canvas::destroy(self)
    }
}
