use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use glam::{IVec2, UVec2};

use crate::audio::SoundBank;
use crate::backend::{Anchor, BackendFactory, EventKind, InputEvent};
use crate::canvas::{Canvas, EventCallback};
use crate::command::{Command, Stage};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::level::{Level, LevelHandler, LevelInfo, LevelObject};
use crate::queue::QueueStage;
use crate::scheduler::{EngineContext, FrameScheduler};

// ── BindTable ────────────────────────────────────────────────────────────────

/// Window-wide binds held by the game. Levels consult it so they never
/// shadow a global bind.
#[derive(Clone, Default)]
pub struct BindTable(Arc<Mutex<BTreeSet<EventKind>>>);

impl BindTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<EventKind>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn contains(&self, event: EventKind) -> bool {
        self.lock().contains(&event)
    }

    pub fn events(&self) -> Vec<EventKind> {
        self.lock().iter().copied().collect()
    }

    fn insert(&self, event: EventKind) -> bool {
        self.lock().insert(event)
    }

    fn remove(&self, event: EventKind) -> bool {
        self.lock().remove(&event)
    }
}

// ── SceneHandler ─────────────────────────────────────────────────────────────

/// The game's menu. Drawn at start-up and whenever no level is running.
pub trait SceneHandler: Send {
    fn draw_menu(&mut self, game: &mut Game) -> Result<()>;

    /// Called when a level is entered, before the menu objects are destroyed.
    fn exit_menu(&mut self, _game: &mut Game) {}
}

// ── Game ─────────────────────────────────────────────────────────────────────

struct LevelSlot {
    handler: Box<dyn LevelHandler>,
    level: Level,
}

#[derive(Default)]
struct LevelRegistry {
    levels: BTreeMap<String, LevelSlot>,
    current: Option<String>,
}

impl LevelRegistry {
    /// Tear down the running level, if any. Returns whether one was running.
    fn exit_current(&mut self) -> Result<bool> {
        let Some(name) = self.current.take() else { return Ok(false) };
        let Some(slot) = self.levels.get_mut(&name) else { return Ok(false) };
        log::info!("exiting level {name}");
        slot.handler.destroy(&mut slot.level);
        slot.level.destroy()?;
        Ok(true)
    }
}

/// The game host: owns the frame scheduler, the window-wide binds, every
/// registered level and the menu.
pub struct Game {
    ctx: EngineContext,
    binds: BindTable,
    levels: Arc<Mutex<LevelRegistry>>,
    menu: Option<Box<dyn SceneHandler>>,
    menu_objects: HashMap<String, Arc<dyn LevelObject>>,
    global_objects: HashMap<String, Arc<dyn LevelObject>>,
    audio: SoundBank,
    scheduler: FrameScheduler,
}

impl Game {
    pub fn builder() -> GameBuilder {
        GameBuilder::new()
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn config(&self) -> &EngineConfig {
        self.ctx.config()
    }

    pub fn frame_size(&self) -> UVec2 {
        self.ctx.frame_size()
    }

    pub fn binds(&self) -> &BindTable {
        &self.binds
    }

    pub fn audio(&self) -> &SoundBank {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut SoundBank {
        &mut self.audio
    }

    fn lock_levels(&self) -> MutexGuard<'_, LevelRegistry> {
        self.levels.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Queues ───────────────────────────────────────────────────────────────

    /// Run `f` on the owner thread at the start of the next tick.
    pub fn queue_function<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Stage) -> Result<()> + Send + 'static,
    {
        self.ctx.queue_fn(QueueStage::Pre, f)
    }

    /// Run `f` on the owner thread at the end of the next tick.
    pub fn queue_function_postprocess<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Stage) -> Result<()> + Send + 'static,
    {
        self.ctx.queue_fn(QueueStage::Post, f)
    }

    // ── Window binds ─────────────────────────────────────────────────────────

    /// Bind `callback` to `event` on the whole window. Returns `false` when
    /// `event` is already bound.
    pub fn add_bind<F>(&self, event: EventKind, callback: F) -> Result<bool>
    where
        F: Fn(&InputEvent) + Send + Sync + 'static,
    {
        if !self.binds.insert(event) {
            return Ok(false);
        }
        let callback: EventCallback = Arc::new(callback);
        if let Err(e) = self.ctx.enqueue(QueueStage::Pre, Command::BindWindow { event, callback }) {
            self.binds.remove(event);
            return Err(e);
        }
        Ok(true)
    }

    /// Returns `false` when `event` was not bound.
    pub fn remove_bind(&self, event: EventKind) -> Result<bool> {
        if !self.binds.remove(event) {
            return Ok(false);
        }
        self.ctx.enqueue(QueueStage::Pre, Command::UnbindWindow { event })?;
        Ok(true)
    }

    // ── Menu ─────────────────────────────────────────────────────────────────

    /// Create a canvas for the menu, store it as menu object `name`, and wait
    /// until it exists.
    pub fn create_menu_canvas(&mut self, name: &str, pos: IVec2, size: UVec2) -> Result<Canvas> {
        let canvas = Canvas::create(&self.ctx, QueueStage::Pre, pos, size, Anchor::NorthWest)?;
        if let Some(old) = self.menu_objects.insert(name.to_string(), Arc::new(canvas.clone())) {
            old.destroy()?;
        }
        Ok(canvas)
    }

    pub fn insert_menu_object(&mut self, name: &str, object: Arc<dyn LevelObject>) {
        self.menu_objects.insert(name.to_string(), object);
    }

    pub fn menu_object(&self, name: &str) -> Option<Arc<dyn LevelObject>> {
        self.menu_objects.get(name).cloned()
    }

    pub fn menu_object_count(&self) -> usize {
        self.menu_objects.len()
    }

    /// Forget menu object `name` and destroy it. Returns `false` if there was
    /// no such object.
    pub fn delete_menu_object(&mut self, name: &str) -> Result<bool> {
        match self.menu_objects.remove(name) {
            Some(object) => {
                object.destroy()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn insert_global_object(&mut self, name: &str, object: Arc<dyn LevelObject>) {
        self.global_objects.insert(name.to_string(), object);
    }

    pub fn global_object(&self, name: &str) -> Option<Arc<dyn LevelObject>> {
        self.global_objects.get(name).cloned()
    }

    pub fn draw_menu(&mut self) -> Result<()> {
        let Some(mut menu) = self.menu.take() else { return Ok(()) };
        let result = menu.draw_menu(self);
        self.menu = Some(menu);
        result
    }

    pub fn exit_menu(&mut self) {
        if let Some(mut menu) = self.menu.take() {
            menu.exit_menu(self);
            self.menu = Some(menu);
        }
        for (name, object) in self.menu_objects.drain() {
            if let Err(e) = object.destroy() {
                log::warn!("menu object \"{name}\" teardown failed: {e}");
            }
        }
    }

    // ── Levels ───────────────────────────────────────────────────────────────

    pub fn level_names(&self) -> Vec<String> {
        self.lock_levels().levels.keys().cloned().collect()
    }

    pub fn level_info(&self, name: &str) -> Option<LevelInfo> {
        self.lock_levels().levels.get(name).map(|slot| slot.level.info().clone())
    }

    pub fn current_level(&self) -> Option<String> {
        self.lock_levels().current.clone()
    }

    pub fn is_ingame(&self) -> bool {
        self.lock_levels().current.is_some()
    }

    /// Run `f` against level `name`.
    pub fn with_level<R>(&self, name: &str, f: impl FnOnce(&mut Level) -> R) -> Option<R> {
        let mut levels = self.lock_levels();
        levels.levels.get_mut(name).map(|slot| f(&mut slot.level))
    }

    /// Leave the running level or the menu, then build level `name`.
    /// Returns `Ok(false)` if no level has that name.
    pub fn change_level(&mut self, name: &str) -> Result<bool> {
        if !self.lock_levels().levels.contains_key(name) {
            log::debug!("level \"{name}\" not found");
            return Ok(false);
        }

        if self.is_ingame() {
            self.exit_level()?;
        } else {
            self.exit_menu();
        }

        log::info!("changing level to {name}");
        let mut levels = self.lock_levels();
        levels.current = Some(name.to_string());
        let Some(slot) = levels.levels.get_mut(name) else { return Ok(false) };

        let created = slot
            .level
            .create_render_frame()
            .and_then(|_| slot.handler.create(&mut slot.level));
        if let Err(e) = created {
            log::error!("level {name} failed to start: {e}");
            if let Err(e) = slot.level.destroy() {
                log::warn!("level {name}: teardown after failed start: {e}");
            }
            levels.current = None;
            return Err(e);
        }
        log::info!("level {name} created");
        Ok(true)
    }

    /// Destroy the running level. Returns `false` if none was running.
    pub fn exit_level(&mut self) -> Result<bool> {
        self.lock_levels().exit_current()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.ctx.is_running()
    }

    pub fn request_stop(&self) {
        self.ctx.request_stop();
    }

    /// Block until the window closes or a stop is requested.
    pub fn wait(&mut self) {
        self.scheduler.join();
    }

    /// Destroy menu and global objects, stop the scheduler and wait for its
    /// teardown (which also destroys the running level).
    pub fn shutdown(mut self) {
        for (name, object) in self.menu_objects.drain().chain(self.global_objects.drain()) {
            if let Err(e) = object.destroy() {
                log::debug!("object \"{name}\" teardown during shutdown: {e}");
            }
        }
        self.scheduler.stop();
    }
}

// ── GameBuilder ──────────────────────────────────────────────────────────────

pub struct GameBuilder {
    config: EngineConfig,
    menu: Option<Box<dyn SceneHandler>>,
    levels: Vec<(String, Box<dyn LevelHandler>)>,
    audio: bool,
}

impl GameBuilder {
    pub fn new() -> Self {
        Self { config: EngineConfig::default(), menu: None, levels: Vec::new(), audio: true }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.config.title = title.to_string();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.config.frame_size = UVec2::new(width, height);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    /// Open the audio device. On by default; the bank stays silent when no
    /// device is present either way.
    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.audio = enabled;
        self
    }

    pub fn with_menu(mut self, menu: impl SceneHandler + 'static) -> Self {
        self.menu = Some(Box::new(menu));
        self
    }

    /// Register a level under `name`. Names are unique; a later registration
    /// replaces an earlier one.
    pub fn with_level(mut self, name: &str, handler: impl LevelHandler + 'static) -> Self {
        self.levels.push((name.to_string(), Box::new(handler)));
        self
    }

    /// Spawn the scheduler on a backend from `factory`, register the levels
    /// and draw the menu.
    pub fn start(self, factory: BackendFactory) -> Result<Game> {
        let scheduler = FrameScheduler::spawn(self.config, factory)?;
        let ctx = scheduler.context().clone();
        let binds = BindTable::new();

        let mut registry = LevelRegistry::default();
        for (name, handler) in self.levels {
            let level = Level::new(&ctx, binds.clone(), handler.grid_dimensions()).with_info(handler.info());
            registry.levels.insert(name, LevelSlot { handler, level });
        }
        let levels = Arc::new(Mutex::new(registry));

        let hook_levels = Arc::clone(&levels);
        scheduler.set_shutdown_hook(move |_stage| {
            let mut levels = hook_levels.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = levels.exit_current() {
                log::warn!("level teardown at shutdown failed: {e}");
            }
        });

        let mut game = Game {
            ctx,
            binds,
            levels,
            menu: self.menu,
            menu_objects: HashMap::new(),
            global_objects: HashMap::new(),
            audio: if self.audio { SoundBank::new() } else { SoundBank::disabled() },
            scheduler,
        };
        game.draw_menu()?;
        Ok(game)
    }
}

impl Default for GameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
