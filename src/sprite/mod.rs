//! Positioned, scalable, showable image units with optional input handlers and
//! at most one running animation sequence.
//!
//! A [`Sprite`] may be driven from any thread. Bitmap work (resize, mirror,
//! flip) happens on the calling thread; only the cheap handle swap is queued
//! for the owner thread.

mod model;
mod playback;

pub use model::{Model, Sequence, Step};

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use glam::{IVec2, UVec2};
use image::{RgbaImage, imageops};

use crate::backend::{EventKind, InputEvent, MouseButton};
use crate::canvas::{Canvas, CanvasId, EventCallback, SubscriberId, WeakCanvas};
use crate::command::Command;
use crate::error::{EngineError, Result};
use crate::level::LevelObject;
use crate::queue::QueueStage;
use crate::scheduler::EngineContext;
use playback::Playback;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpriteId(pub u64);

pub type ClickCallback = Arc<dyn Fn() + Send + Sync>;
/// Receives the pointer position when the sprite asked for coordinates.
pub type HoverCallback = Arc<dyn Fn(Option<IVec2>) + Send + Sync>;

struct Hover {
    on_enter: HoverCallback,
    on_leave: HoverCallback,
    want_coordinates: bool,
}

struct SpriteState {
    model: Arc<Model>,
    current_image: String,
    /// Last transformed bitmap, ready to hand to the toolkit.
    rendered: Option<Arc<RgbaImage>>,
    global_pos: IVec2,
    displacement: IVec2,
    scale: UVec2,
    mirrored: bool,
    flipped: bool,
    is_shown: bool,
    click: Option<ClickCallback>,
    hover: Option<Hover>,
    is_hovered: bool,
    time_factor: f32,
}

impl SpriteState {
    fn composed_pos(&self) -> IVec2 {
        self.global_pos + self.displacement
    }

    fn contains(&self, point: IVec2) -> bool {
        let min = self.composed_pos();
        let max = min + self.scale.as_ivec2();
        point.cmpge(min).all() && point.cmple(max).all()
    }
}

struct SpriteInner {
    id: SpriteId,
    ctx: EngineContext,
    canvas: WeakCanvas,
    canvas_id: CanvasId,
    state: Mutex<SpriteState>,
    playback: Mutex<Option<Playback>>,
}

impl Drop for SpriteInner {
    fn drop(&mut self) {
        // The thread only holds a weak reference; let it wind down on its own.
        let playback = self.playback.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(p) = playback.take() {
            p.request_stop();
        }
    }
}

/// Shared handle to one sprite. Clones refer to the same sprite.
#[derive(Clone)]
pub struct Sprite {
    inner: Arc<SpriteInner>,
}

// ── SpriteBuilder ────────────────────────────────────────────────────────────

pub struct SpriteBuilder<'a> {
    canvas: &'a Canvas,
    model: Arc<Model>,
    image: String,
    pos: IVec2,
    scale: Option<UVec2>,
    displacement: IVec2,
}

impl<'a> SpriteBuilder<'a> {
    pub fn new(canvas: &'a Canvas, model: impl Into<Arc<Model>>, image: &str) -> Self {
        Self {
            canvas,
            model: model.into(),
            image: image.to_string(),
            pos: IVec2::ZERO,
            scale: None,
            displacement: IVec2::ZERO,
        }
    }

    pub fn with_pos(mut self, pos: IVec2) -> Self {
        self.pos = pos;
        self
    }

    /// On-screen size. Defaults to the initial image's own size.
    pub fn with_scale(mut self, scale: UVec2) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_displacement(mut self, displacement: IVec2) -> Self {
        self.displacement = displacement;
        self
    }

    /// Create the sprite shown, and queue its first placement.
    pub fn build(self) -> Result<Sprite> {
        let Some(source) = self.model.image(&self.image) else {
            log::warn!("cannot create sprite: image \"{}\" is not in its model", self.image);
            return Err(EngineError::missing_image(&self.image));
        };
        let scale = self.scale.unwrap_or_else(|| UVec2::new(source.width(), source.height()));
        let ctx = self.canvas.context().clone();

        let sprite = Sprite {
            inner: Arc::new(SpriteInner {
                id: SpriteId(ctx.next_id()),
                ctx,
                canvas: self.canvas.downgrade(),
                canvas_id: self.canvas.id(),
                state: Mutex::new(SpriteState {
                    model: self.model,
                    current_image: self.image.clone(),
                    rendered: None,
                    global_pos: self.pos,
                    displacement: self.displacement,
                    scale,
                    mirrored: false,
                    flipped: false,
                    is_shown: true,
                    click: None,
                    hover: None,
                    is_hovered: false,
                    time_factor: 1.0,
                }),
                playback: Mutex::new(None),
            }),
        };
        sprite.set_current_image(&self.image)?;
        Ok(sprite)
    }
}

// ── Sprite ───────────────────────────────────────────────────────────────────

impl Sprite {
    pub fn new(
        canvas: &Canvas,
        model: impl Into<Arc<Model>>,
        image: &str,
        pos: IVec2,
        scale: UVec2,
    ) -> Result<Sprite> {
        SpriteBuilder::new(canvas, model, image).with_pos(pos).with_scale(scale).build()
    }

    pub fn builder<'a>(canvas: &'a Canvas, model: impl Into<Arc<Model>>, image: &str) -> SpriteBuilder<'a> {
        SpriteBuilder::new(canvas, model, image)
    }

    fn lock(&self) -> MutexGuard<'_, SpriteState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_playback(&self) -> MutexGuard<'_, Option<Playback>> {
        self.inner.playback.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn subscriber(&self) -> SubscriberId {
        SubscriberId(self.inner.id.0)
    }

    fn swap_command(&self, state: &SpriteState, image: Arc<RgbaImage>) -> Command {
        Command::SwapImage {
            canvas: self.inner.canvas_id,
            sprite: self.inner.id,
            pos: state.composed_pos(),
            image,
        }
    }

    // ── Appearance ───────────────────────────────────────────────────────────

    /// Replace the image and sequence tables, then show `image` from the new model.
    pub fn set_model(&self, model: impl Into<Arc<Model>>, image: &str) -> Result<()> {
        let model = model.into();
        if !model.has_image(image) {
            log::warn!("sprite {}: image \"{image}\" is not in the new model", self.inner.id.0);
            return Err(EngineError::missing_image(image));
        }
        self.lock().model = model;
        self.set_current_image(image)
    }

    /// Re-render `name` with the current transform and queue the swap.
    ///
    /// Returns [`EngineError::MissingResource`] (and changes nothing) when the
    /// model has no such image.
    pub fn set_current_image(&self, name: &str) -> Result<()> {
        let mut transform = {
            let state = self.lock();
            let Some(source) = state.model.image(name) else {
                log::warn!("sprite {}: image \"{name}\" is not in its model", self.inner.id.0);
                return Err(EngineError::missing_image(name));
            };
            (source, state.scale, state.mirrored, state.flipped)
        };

        loop {
            let (source, scale, mirrored, flipped) = &transform;
            let rendered = Arc::new(transform_image(source, *scale, *mirrored, *flipped));

            // Queue while still holding the lock so swaps and removals reach the
            // owner thread in the order the state changed.
            let mut state = self.lock();
            let Some(current) = state.model.image(name) else {
                return Err(EngineError::missing_image(name));
            };
            // Another setter ran while rendering: build again from what is there now.
            if !Arc::ptr_eq(&current, source)
                || state.scale != *scale
                || state.mirrored != *mirrored
                || state.flipped != *flipped
            {
                transform = (current, state.scale, state.mirrored, state.flipped);
                continue;
            }

            state.current_image = name.to_string();
            state.rendered = Some(Arc::clone(&rendered));
            if state.is_shown {
                let command = self.swap_command(&state, rendered);
                self.inner.ctx.enqueue(QueueStage::Sprite, command)?;
            }
            return Ok(());
        }
    }

    fn redraw(&self) -> Result<()> {
        let name = self.lock().current_image.clone();
        self.set_current_image(&name)
    }

    pub fn move_to(&self, pos: IVec2) -> Result<()> {
        self.lock().global_pos = pos;
        self.redraw()
    }

    pub fn set_displacement(&self, displacement: IVec2) -> Result<()> {
        self.lock().displacement = displacement;
        self.redraw()
    }

    pub fn set_scale(&self, scale: UVec2) -> Result<()> {
        self.lock().scale = scale;
        self.redraw()
    }

    pub fn mirror(&self, mirrored: bool) -> Result<()> {
        self.lock().mirrored = mirrored;
        self.redraw()
    }

    pub fn flip(&self, flipped: bool) -> Result<()> {
        self.lock().flipped = flipped;
        self.redraw()
    }

    /// One sequence frame: new offset and new image, a single redraw.
    fn apply_frame(&self, image: &str, displacement: IVec2) -> Result<()> {
        {
            let mut state = self.lock();
            if !state.model.has_image(image) {
                drop(state);
                log::warn!("sprite {}: image \"{image}\" is not in its model", self.inner.id.0);
                return Err(EngineError::missing_image(image));
            }
            state.displacement = displacement;
        }
        self.set_current_image(image)
    }

    // ── Visibility ───────────────────────────────────────────────────────────

    pub fn show(&self) -> Result<()> {
        let mut state = self.lock();
        state.is_shown = true;
        if let Some(image) = state.rendered.clone() {
            let command = self.swap_command(&state, image);
            self.inner.ctx.enqueue(QueueStage::Sprite, command)?;
        }
        Ok(())
    }

    /// Take the sprite off screen. Ends any hover (firing the leave handler),
    /// stops the running sequence and queues removal of the rendered handle.
    pub fn hide(&self) -> Result<()> {
        let on_leave = {
            let mut state = self.lock();
            let was_hovered = std::mem::replace(&mut state.is_hovered, false);
            state.is_shown = false;
            self.inner.ctx.enqueue(QueueStage::Sprite, Command::RemoveImage { sprite: self.inner.id })?;
            if was_hovered { state.hover.as_ref().map(|h| Arc::clone(&h.on_leave)) } else { None }
        };
        if let Some(on_leave) = on_leave {
            on_leave(None);
        }
        self.stop_sequence();
        Ok(())
    }

    /// Whether `point` (canvas coordinates) lies on the sprite, edges included.
    pub fn is_in_boundaries(&self, point: IVec2) -> bool {
        self.lock().contains(point)
    }

    // ── Input ────────────────────────────────────────────────────────────────

    fn bind(&self, event: EventKind, handler: EventCallback) -> Result<()> {
        match self.inner.canvas.upgrade() {
            Some(canvas) => canvas.bind(event, self.subscriber(), handler),
            None => Ok(()),
        }
    }

    fn unbind(&self, event: EventKind) -> Result<()> {
        match self.inner.canvas.upgrade() {
            Some(canvas) => canvas.unbind(event, self.subscriber()),
            None => Ok(()),
        }
    }

    /// Call `f` on a left click inside the sprite while it is shown.
    pub fn set_click_callback<F>(&self, f: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.lock().click = Some(Arc::new(f));

        let weak = Arc::downgrade(&self.inner);
        let handler: EventCallback = Arc::new(move |event: &InputEvent| {
            if event.button != Some(MouseButton::Left) {
                return;
            }
            let Some(inner) = weak.upgrade() else { return };
            let sprite = Sprite { inner };
            let callback = {
                let state = sprite.lock();
                if !state.is_shown || !state.contains(event.pos) {
                    return;
                }
                state.click.clone()
            };
            if let Some(callback) = callback {
                callback();
            }
        });
        self.bind(EventKind::PointerDown, handler)
    }

    pub fn remove_click_callback(&self) -> Result<()> {
        self.lock().click = None;
        self.unbind(EventKind::PointerDown)
    }

    /// Call `on_enter` when the pointer moves onto the sprite and `on_leave`
    /// when it moves off. With `want_coordinates` the handlers receive the
    /// pointer position.
    pub fn set_hover_callback<E, L>(&self, on_enter: E, on_leave: L, want_coordinates: bool) -> Result<()>
    where
        E: Fn(Option<IVec2>) + Send + Sync + 'static,
        L: Fn(Option<IVec2>) + Send + Sync + 'static,
    {
        self.lock().hover = Some(Hover {
            on_enter: Arc::new(on_enter),
            on_leave: Arc::new(on_leave),
            want_coordinates,
        });

        let weak = Arc::downgrade(&self.inner);
        let handler: EventCallback = Arc::new(move |event: &InputEvent| {
            let Some(inner) = weak.upgrade() else { return };
            let sprite = Sprite { inner };
            let fire = {
                let mut state = sprite.lock();
                let inside = state.contains(event.pos);
                if inside == state.is_hovered {
                    return;
                }
                state.is_hovered = inside;
                if !state.is_shown {
                    return;
                }
                let Some(hover) = state.hover.as_ref() else { return };
                let arg = hover.want_coordinates.then_some(event.pos);
                let callback = if inside { &hover.on_enter } else { &hover.on_leave };
                (Arc::clone(callback), arg)
            };
            let (callback, arg) = fire;
            callback(arg);
        });
        self.bind(EventKind::PointerMove, handler)
    }

    pub fn remove_hover_callback(&self) -> Result<()> {
        {
            let mut state = self.lock();
            state.hover = None;
            state.is_hovered = false;
        }
        self.unbind(EventKind::PointerMove)
    }

    // ── Sequences ────────────────────────────────────────────────────────────

    /// Start playing `name` on its own thread. Returns `Ok(false)` without
    /// doing anything when a sequence is already running.
    pub fn start_sequence(&self, name: &str) -> Result<bool> {
        let sequence = {
            let state = self.lock();
            match state.model.sequence(name) {
                Some(sequence) => sequence.clone(),
                None => {
                    drop(state);
                    log::warn!("sprite {}: sequence \"{name}\" is not in its model", self.inner.id.0);
                    return Err(EngineError::missing_sequence(name));
                }
            }
        };

        let mut playback = self.lock_playback();
        if playback.as_ref().is_some_and(Playback::is_active) {
            return Ok(false);
        }
        if let Some(finished) = playback.take() {
            finished.join();
        }
        *playback = Some(Playback::spawn(Arc::downgrade(&self.inner), self.inner.id, name, sequence)?);
        Ok(true)
    }

    /// Ask the running sequence to stop at its next instruction. Returns
    /// immediately; [`current_sequence`](Self::current_sequence) reads `None`
    /// once the thread has exited.
    pub fn stop_sequence(&self) {
        if let Some(playback) = self.lock_playback().as_ref() {
            playback.request_stop();
        }
    }

    pub fn current_sequence(&self) -> Option<String> {
        self.lock_playback()
            .as_ref()
            .filter(|p| p.is_active())
            .map(|p| p.name().to_string())
    }

    pub fn is_playing(&self) -> bool {
        self.current_sequence().is_some()
    }

    /// Divisor applied to every sequence delay: 2.0 plays twice as fast.
    pub fn set_time_factor(&self, factor: f32) -> Result<()> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(EngineError::InvalidTimeFactor(factor));
        }
        self.lock().time_factor = factor;
        Ok(())
    }

    /// Hide, drop input handlers, then stop and join the sequence thread.
    ///
    /// Every step runs even if an earlier one failed; the first error is returned.
    pub fn destroy(&self) -> Result<()> {
        let hidden = self.hide();
        let (has_click, has_hover) = {
            let state = self.lock();
            (state.click.is_some(), state.hover.is_some())
        };
        let click = if has_click { self.remove_click_callback() } else { Ok(()) };
        let hover = if has_hover { self.remove_hover_callback() } else { Ok(()) };

        let playback = self.lock_playback().take();
        if let Some(playback) = playback {
            playback.request_stop();
            playback.join();
        }
        hidden.and(click).and(hover)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn id(&self) -> SpriteId {
        self.inner.id
    }

    pub fn canvas_id(&self) -> CanvasId {
        self.inner.canvas_id
    }

    pub fn model(&self) -> Arc<Model> {
        Arc::clone(&self.lock().model)
    }

    pub fn current_image(&self) -> String {
        self.lock().current_image.clone()
    }

    /// The bitmap last produced by [`set_current_image`](Self::set_current_image).
    pub fn rendered(&self) -> Option<Arc<RgbaImage>> {
        self.lock().rendered.clone()
    }

    pub fn global_pos(&self) -> IVec2 {
        self.lock().global_pos
    }

    pub fn displacement(&self) -> IVec2 {
        self.lock().displacement
    }

    pub fn composed_pos(&self) -> IVec2 {
        self.lock().composed_pos()
    }

    pub fn scale(&self) -> UVec2 {
        self.lock().scale
    }

    pub fn is_mirrored(&self) -> bool {
        self.lock().mirrored
    }

    pub fn is_flipped(&self) -> bool {
        self.lock().flipped
    }

    pub fn is_shown(&self) -> bool {
        self.lock().is_shown
    }

    pub fn is_hovered(&self) -> bool {
        self.lock().is_hovered
    }

    pub fn time_factor(&self) -> f32 {
        self.lock().time_factor
    }
}

impl fmt::Debug for Sprite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Sprite")
            .field("id", &self.inner.id)
            .field("image", &state.current_image)
            .field("pos", &state.composed_pos())
            .field("scale", &state.scale)
            .field("shown", &state.is_shown)
            .finish()
    }
}

impl LevelObject for Sprite {
    fn destroy(&self) -> Result<()> {
        Sprite::destroy(self)
    }
}

/// Resize to `scale` (nearest neighbour, each side at least one pixel), then
/// mirror and flip as requested.
pub fn transform_image(source: &RgbaImage, scale: UVec2, mirrored: bool, flipped: bool) -> RgbaImage {
    let (w, h) = (scale.x.max(1), scale.y.max(1));
    let mut out = if source.dimensions() == (w, h) {
        source.clone()
    } else {
        imageops::resize(source, w, h, imageops::FilterType::Nearest)
    };
    if mirrored {
        imageops::flip_horizontal_in_place(&mut out);
    }
    if flipped {
        imageops::flip_vertical_in_place(&mut out);
    }
    out
}
