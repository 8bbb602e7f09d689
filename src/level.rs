use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::{IVec2, UVec2};

use crate::audio::LevelSounds;
use crate::backend::{Anchor, EventKind, InputEvent};
use crate::canvas::{Canvas, EventCallback, SubscriberId};
use crate::engine::BindTable;
use crate::error::{EngineError, Result};
use crate::queue::QueueStage;
use crate::scheduler::EngineContext;
use crate::sprite::Sprite;

/// Anything a level (or the menu) owns and must tear down with it.
pub trait LevelObject: Send + Sync {
    fn destroy(&self) -> Result<()>;
}

/// An object that can occupy grid tiles.
pub trait GridObject: LevelObject {
    /// Whether this object blocks the tile it stands on.
    fn collisions(&self) -> bool;
}

pub type ObjectRef = Arc<dyn GridObject>;

fn same_object(a: &ObjectRef, b: &ObjectRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ── Entity ───────────────────────────────────────────────────────────────────

/// Minimal grid object: an id, a collision flag and an optional visual.
pub struct Entity {
    id: u64,
    collisions: AtomicBool,
    sprite: Option<Sprite>,
}

impl Entity {
    pub fn new(id: u64, collisions: bool) -> Self {
        Self { id, collisions: AtomicBool::new(collisions), sprite: None }
    }

    pub fn with_sprite(mut self, sprite: Sprite) -> Self {
        self.sprite = Some(sprite);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_collisions(&self, collisions: bool) {
        self.collisions.store(collisions, Ordering::Relaxed);
    }

    pub fn sprite(&self) -> Option<&Sprite> {
        self.sprite.as_ref()
    }
}

impl LevelObject for Entity {
    fn destroy(&self) -> Result<()> {
        match &self.sprite {
            Some(sprite) => sprite.destroy(),
            None => Ok(()),
        }
    }
}

impl GridObject for Entity {
    fn collisions(&self) -> bool {
        self.collisions.load(Ordering::Relaxed)
    }
}

// ── Grid ─────────────────────────────────────────────────────────────────────

/// Bounded tile index: which objects stand on which tile, plus a static wall
/// mask. An object appears in at most one tile.
pub struct Grid {
    dims: UVec2,
    cells: Vec<Vec<ObjectRef>>,
    walls: Vec<bool>,
}

impl Grid {
    pub fn new(dims: UVec2) -> Self {
        let len = dims.x as usize * dims.y as usize;
        Self {
            dims,
            cells: (0..len).map(|_| Vec::new()).collect(),
            walls: vec![false; len],
        }
    }

    pub fn dimensions(&self) -> UVec2 {
        self.dims
    }

    pub fn in_bounds(&self, tile: IVec2) -> bool {
        tile.x >= 0 && tile.y >= 0 && (tile.x as u32) < self.dims.x && (tile.y as u32) < self.dims.y
    }

    fn index(&self, tile: IVec2) -> Result<usize> {
        if !self.in_bounds(tile) {
            return Err(EngineError::OutOfBounds { x: tile.x, y: tile.y });
        }
        Ok(tile.y as usize * self.dims.x as usize + tile.x as usize)
    }

    /// Put `object` on `tile`. Returns `false` if it already stands somewhere.
    pub fn place(&mut self, object: ObjectRef, tile: IVec2) -> Result<bool> {
        let idx = self.index(tile)?;
        if self.occurrences(&object) > 0 {
            return Ok(false);
        }
        self.cells[idx].push(object);
        Ok(true)
    }

    pub fn remove(&mut self, object: &ObjectRef, tile: IVec2) -> Result<bool> {
        let idx = self.index(tile)?;
        let cell = &mut self.cells[idx];
        match cell.iter().position(|o| same_object(o, object)) {
            Some(pos) => {
                cell.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Move `object` from `from` to `to`. Returns `Ok(false)` and leaves the
    /// grid untouched when the object is not on `from`.
    ///
    /// Only the index changes; the object's own notion of position is the
    /// caller's business.
    pub fn move_object(&mut self, object: &ObjectRef, from: IVec2, to: IVec2) -> Result<bool> {
        let to_idx = self.index(to)?;
        if !self.remove(object, from)? {
            return Ok(false);
        }
        self.cells[to_idx].push(Arc::clone(object));
        Ok(true)
    }

    /// Objects on `tile`; empty when out of bounds.
    pub fn objects_at(&self, tile: IVec2) -> &[ObjectRef] {
        match self.index(tile) {
            Ok(idx) => &self.cells[idx],
            Err(_) => &[],
        }
    }

    pub fn position_of(&self, object: &ObjectRef) -> Option<IVec2> {
        let w = self.dims.x.max(1) as usize;
        self.cells
            .iter()
            .position(|cell| cell.iter().any(|o| same_object(o, object)))
            .map(|idx| IVec2::new((idx % w) as i32, (idx / w) as i32))
    }

    pub fn set_wall(&mut self, tile: IVec2, wall: bool) -> Result<()> {
        let idx = self.index(tile)?;
        self.walls[idx] = wall;
        Ok(())
    }

    pub fn is_wall(&self, tile: IVec2) -> bool {
        self.index(tile).is_ok_and(|idx| self.walls[idx])
    }

    /// `true` when `tile` is inside the grid, not a wall, and holds no object
    /// with collisions enabled.
    pub fn check_tile_available(&self, tile: IVec2) -> bool {
        let Ok(idx) = self.index(tile) else { return false };
        !self.walls[idx] && !self.cells[idx].iter().any(|o| o.collisions())
    }

    pub fn occurrences(&self, object: &ObjectRef) -> usize {
        self.cells
            .iter()
            .map(|cell| cell.iter().filter(|o| same_object(o, object)).count())
            .sum()
    }

    pub fn object_count(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    /// Drop every object. Walls stay.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }
}

// ── Level ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelInfo {
    pub name: String,
    pub description: String,
}

impl Default for LevelInfo {
    fn default() -> Self {
        Self { name: "Untitled".to_string(), description: "No description.".to_string() }
    }
}

/// Runtime state of one level: its grid, its render surface and everything it
/// created. Content is supplied by a [`LevelHandler`].
pub struct Level {
    ctx: EngineContext,
    binds: BindTable,
    info: LevelInfo,
    tile_scale: UVec2,
    grid: Grid,
    canvas: Option<Canvas>,
    objects: Vec<Arc<dyn LevelObject>>,
    sounds: LevelSounds,
    subscriber: SubscriberId,
}

impl Level {
    /// Empty level of `grid_dims` tiles covering the whole window.
    pub fn new(ctx: &EngineContext, binds: BindTable, grid_dims: UVec2) -> Self {
        let dims = grid_dims.max(UVec2::ONE);
        Self {
            ctx: ctx.clone(),
            binds,
            info: LevelInfo::default(),
            tile_scale: ctx.frame_size() / dims,
            grid: Grid::new(dims),
            canvas: None,
            objects: Vec::new(),
            sounds: LevelSounds::default(),
            subscriber: SubscriberId(ctx.next_id()),
        }
    }

    pub fn with_info(mut self, info: LevelInfo) -> Self {
        self.info = info;
        self
    }

    pub fn info(&self) -> &LevelInfo {
        &self.info
    }

    pub fn set_info(&mut self, info: LevelInfo) {
        self.info = info;
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Pixel size of one tile, floored per axis.
    pub fn tile_scale(&self) -> UVec2 {
        self.tile_scale
    }

    /// Top-left pixel of `tile` on the level canvas.
    pub fn tile_origin(&self, tile: IVec2) -> IVec2 {
        tile * self.tile_scale.as_ivec2()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    pub fn canvas(&self) -> Option<&Canvas> {
        self.canvas.as_ref()
    }

    /// Create the full-window canvas for this level and wait until the owner
    /// thread has built it. Reuses a live canvas.
    pub fn create_render_frame(&mut self) -> Result<Canvas> {
        if let Some(canvas) = self.canvas.as_ref().filter(|c| !c.is_destroyed()) {
            return Ok(canvas.clone());
        }
        let canvas = Canvas::create(
            &self.ctx,
            QueueStage::Pre,
            IVec2::ZERO,
            self.ctx.frame_size(),
            Anchor::NorthWest,
        )?;
        self.canvas = Some(canvas.clone());
        Ok(canvas)
    }

    // ── Objects ──────────────────────────────────────────────────────────────

    /// Track `object` so it is destroyed with the level.
    pub fn add_object(&mut self, object: Arc<dyn LevelObject>) {
        self.objects.push(object);
    }

    pub fn objects(&self) -> &[Arc<dyn LevelObject>] {
        &self.objects
    }

    pub fn place_object(&mut self, object: ObjectRef, tile: IVec2) -> Result<bool> {
        self.grid.place(object, tile)
    }

    pub fn move_object(&mut self, object: &ObjectRef, from: IVec2, to: IVec2) -> Result<bool> {
        self.grid.move_object(object, from, to)
    }

    pub fn check_tile_available(&self, tile: IVec2) -> bool {
        self.grid.check_tile_available(tile)
    }

    // ── Input & sound ────────────────────────────────────────────────────────

    /// Bind `callback` to `event` on the level canvas. Returns `Ok(false)`
    /// when the game already has a window-wide bind for `event`; those cannot
    /// be overridden.
    pub fn add_bind<F>(&self, event: EventKind, callback: F) -> Result<bool>
    where
        F: Fn(&InputEvent) + Send + Sync + 'static,
    {
        if self.binds.contains(event) {
            return Ok(false);
        }
        let canvas = self.canvas.as_ref().ok_or(EngineError::NoRenderFrame)?;
        let callback: EventCallback = Arc::new(callback);
        canvas.bind(event, self.subscriber, callback)?;
        Ok(true)
    }

    pub fn remove_bind(&self, event: EventKind) -> Result<()> {
        match &self.canvas {
            Some(canvas) => canvas.unbind(event, self.subscriber),
            None => Ok(()),
        }
    }

    /// Keep `handle` so the sound stops when the level is destroyed.
    pub fn track_sound(&mut self, handle: kira::sound::static_sound::StaticSoundHandle) {
        self.sounds.track(handle);
    }

    pub fn sound_count(&self) -> usize {
        self.sounds.len()
    }

    /// Tear the level down: sounds, then objects, then grid contents, and the
    /// canvas last so no handler runs against a half-destroyed surface.
    pub fn destroy(&mut self) -> Result<()> {
        self.sounds.stop_all();

        for object in self.objects.drain(..) {
            if let Err(e) = object.destroy() {
                log::warn!("level \"{}\": object teardown failed: {e}", self.info.name);
            }
        }
        self.grid.clear();

        match self.canvas.take() {
            Some(canvas) => canvas.destroy(),
            None => Ok(()),
        }
    }
}

/// Content of one level. The host keeps one per registered level and calls
/// [`create`](Self::create) each time the level is entered.
pub trait LevelHandler: Send {
    fn info(&self) -> LevelInfo {
        LevelInfo::default()
    }

    fn grid_dimensions(&self) -> UVec2 {
        UVec2::new(50, 50)
    }

    /// Populate `level`. Its render frame already exists.
    fn create(&mut self, level: &mut Level) -> Result<()>;

    /// Extra teardown, run before the level's own.
    fn destroy(&mut self, _level: &mut Level) {}
}
