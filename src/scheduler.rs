use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use glam::UVec2;

use crate::backend::BackendFactory;
use crate::command::{panic_message, Command, Stage};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::queue::{CommandQueue, OwnerThread, QueueStage};

/// How long a blocked caller waits between checks that the scheduler is alive.
const REPLY_POLL: Duration = Duration::from_millis(10);

/// Lifecycle of the owner thread.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchedulerState {
    Created,
    Initializing,
    Running,
    Stopping,
    Destroyed,
}

/// Runs on the owner thread once the loop has ended, before the final drain.
pub type ShutdownHook = Box<dyn FnOnce(&mut Stage) + Send>;

// ── Registry ─────────────────────────────────────────────────────────────────

struct Registry {
    config: EngineConfig,
    queues: [CommandQueue<Command>; 4],
    owner: OnceLock<OwnerThread>,
    next_id: AtomicU64,
    running: AtomicBool,
    frames: AtomicU64,
    state: Mutex<SchedulerState>,
}

/// Shared view of one scheduler: its queues, identity counter and run flag.
///
/// Sprites, canvases and levels each hold a clone; there is no process-wide
/// state.
#[derive(Clone)]
pub struct EngineContext {
    registry: Arc<Registry>,
}

impl EngineContext {
    fn new(config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(Registry {
                config,
                queues: QueueStage::ORDER.map(CommandQueue::new),
                owner: OnceLock::new(),
                next_id: AtomicU64::new(1),
                running: AtomicBool::new(false),
                frames: AtomicU64::new(0),
                state: Mutex::new(SchedulerState::Created),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.registry.config
    }

    pub fn frame_size(&self) -> UVec2 {
        self.registry.config.frame_size
    }

    pub fn is_debug(&self) -> bool {
        self.registry.config.debug
    }

    pub fn queue(&self, stage: QueueStage) -> &CommandQueue<Command> {
        &self.registry.queues[stage.index()]
    }

    /// Push `command` onto `stage`, waiting while that queue is mid-drain.
    pub fn enqueue(&self, stage: QueueStage, command: Command) -> Result<()> {
        self.queue(stage).enqueue(command)
    }

    /// Queue a closure to run on the owner thread with the stage.
    pub fn queue_fn<F>(&self, stage: QueueStage, f: F) -> Result<()>
    where
        F: FnOnce(&mut Stage) -> Result<()> + Send + 'static,
    {
        self.enqueue(stage, Command::Call(Box::new(f)))
    }

    /// Next identity for a sprite, canvas or subscriber. Never returns 0.
    pub fn next_id(&self) -> u64 {
        self.registry.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn owner(&self) -> Option<OwnerThread> {
        self.registry.owner.get().copied()
    }

    pub fn is_owner_thread(&self) -> bool {
        self.owner().is_some_and(OwnerThread::is_current)
    }

    pub fn is_running(&self) -> bool {
        self.registry.running.load(Ordering::Acquire)
    }

    /// Ask the loop to stop after the current tick.
    pub fn request_stop(&self) {
        self.registry.running.store(false, Ordering::Release);
    }

    pub fn frame_count(&self) -> u64 {
        self.registry.frames.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> SchedulerState {
        *self.lock_state()
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.registry.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SchedulerState) {
        *self.lock_state() = state;
        log::info!("frame scheduler: {state:?}");
    }

    /// Block until the owner thread answers on `reply`, giving up with
    /// [`EngineError::SchedulerStopped`] once the scheduler has begun stopping.
    pub fn wait_reply<T>(&self, reply: &Receiver<Result<T>>) -> Result<T> {
        loop {
            match reply.recv_timeout(REPLY_POLL) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => {
                    if self.state() >= SchedulerState::Stopping {
                        return Err(EngineError::SchedulerStopped);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(EngineError::SchedulerStopped),
            }
        }
    }

    // ── Owner-thread side ────────────────────────────────────────────────────

    fn open_queues(&self, owner: OwnerThread) {
        for queue in &self.registry.queues {
            queue.open(owner);
        }
    }

    fn close_queues(&self) {
        for queue in &self.registry.queues {
            let dropped = queue.close();
            if dropped > 0 {
                log::warn!("{} queue closed with {dropped} pending action(s)", queue.stage());
            }
        }
    }

    /// Drain every queue once, in stage order. Each command runs isolated: an
    /// error or a panic is logged and the drain goes on.
    fn drain_all(&self, stage: &mut Stage) {
        let frame = self.frame_count();
        let debug = self.is_debug();
        let mut total = 0;

        for queue in &self.registry.queues {
            if debug && !queue.is_empty() {
                log::debug!("frame {frame}: {} queue holds {} action(s)", queue.stage(), queue.len());
            }
            let result = queue.drain_once(|command| {
                if debug {
                    log::debug!("frame {frame}: {} <- {command:?}", queue.stage());
                }
                match panic::catch_unwind(AssertUnwindSafe(|| stage.execute(command))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => log::error!("frame {frame}: {} action failed: {e}", queue.stage()),
                    Err(payload) => log::error!(
                        "frame {frame}: {} action panicked: {}",
                        queue.stage(),
                        panic_message(&payload)
                    ),
                }
            });
            match result {
                Ok(count) => total += count,
                Err(e) => log::error!("frame {frame}: could not drain {} queue: {e}", queue.stage()),
            }
        }
        if debug && total > 0 {
            log::debug!("frame {frame}: {total} action(s) executed");
        }
    }
}

// ── FrameScheduler ───────────────────────────────────────────────────────────

/// Owner of the render/update thread.
///
/// `spawn` returns once the thread has built its window and opened its queues.
/// Dropping the scheduler stops and joins it.
pub struct FrameScheduler {
    ctx: EngineContext,
    thread: Option<JoinHandle<()>>,
    hook: Arc<Mutex<Option<ShutdownHook>>>,
}

impl FrameScheduler {
    pub fn spawn(config: EngineConfig, factory: BackendFactory) -> Result<Self> {
        let ctx = EngineContext::new(config);
        let hook: Arc<Mutex<Option<ShutdownHook>>> = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);

        let thread_ctx = ctx.clone();
        let thread_hook = Arc::clone(&hook);
        let thread = thread::Builder::new()
            .name("jstage-frame".into())
            .spawn(move || {
                thread_ctx.set_state(SchedulerState::Initializing);
                let owner = OwnerThread::current();
                let _ = thread_ctx.registry.owner.set(owner);

                let backend = match factory(thread_ctx.config()) {
                    Ok(backend) => backend,
                    Err(e) => {
                        thread_ctx.close_queues();
                        thread_ctx.set_state(SchedulerState::Destroyed);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let mut stage = Stage::new(backend);
                thread_ctx.open_queues(owner);
                thread_ctx.registry.running.store(true, Ordering::Release);
                thread_ctx.set_state(SchedulerState::Running);
                let _ = ready_tx.send(Ok(()));

                run_loop(&thread_ctx, &mut stage);
                shut_down(&thread_ctx, &mut stage, &thread_hook);
            })
            .map_err(EngineError::Spawn)?;

        let mut scheduler = Self { ctx, thread: Some(thread), hook };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(scheduler),
            Ok(Err(e)) => {
                scheduler.join();
                Err(e)
            }
            Err(_) => {
                scheduler.join();
                Err(EngineError::SchedulerStopped)
            }
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn state(&self) -> SchedulerState {
        self.ctx.state()
    }

    /// Replace the hook run on the owner thread when the loop ends.
    pub fn set_shutdown_hook<F>(&self, f: F)
    where
        F: FnOnce(&mut Stage) + Send + 'static,
    {
        *self.hook.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(f));
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Request a stop and wait for teardown to complete.
    pub fn stop(&mut self) {
        self.ctx.request_stop();
        self.join();
    }

    /// Wait for the owner thread to end on its own (window closed, or a stop
    /// requested elsewhere).
    pub fn join(&mut self) {
        let Some(handle) = self.thread.take() else { return };
        if handle.thread().id() == thread::current().id() {
            // Dropped from inside a queued action; the loop will end on its own.
            return;
        }
        if handle.join().is_err() {
            log::error!("frame scheduler thread panicked");
        }
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(ctx: &EngineContext, stage: &mut Stage) {
    let interval = ctx.config().tick_interval;
    while ctx.is_running() && stage.window_exists() {
        ctx.registry.frames.fetch_add(1, Ordering::Relaxed);
        ctx.drain_all(stage);
        stage.refresh();
        thread::sleep(interval);
    }
}

fn shut_down(ctx: &EngineContext, stage: &mut Stage, hook: &Mutex<Option<ShutdownHook>>) {
    ctx.registry.running.store(false, Ordering::Release);
    ctx.set_state(SchedulerState::Stopping);

    let hook = hook.lock().unwrap_or_else(|e| e.into_inner()).take();
    if let Some(hook) = hook {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| hook(stage))) {
            log::error!("shutdown hook panicked: {}", panic_message(&payload));
        }
    }

    ctx.drain_all(stage);
    ctx.close_queues();
    stage.destroy_window();
    ctx.set_state(SchedulerState::Destroyed);
}
