use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::Sender;
use glam::{IVec2, UVec2};
use image::RgbaImage;

use crate::backend::{Anchor, Backend, BindTarget, EventKind, ImageId, RoutedEvent, SurfaceId};
use crate::canvas::{CanvasId, EventCallback, EventTable, SubscriberId};
use crate::error::{EngineError, Result};
use crate::sprite::SpriteId;

pub type StageFn = Box<dyn FnOnce(&mut Stage) -> Result<()> + Send>;

// ── Command ──────────────────────────────────────────────────────────────────

/// One unit of owner-thread work. Producers on any thread build these and
/// push them into a [`CommandQueue`](crate::queue::CommandQueue); the frame
/// scheduler hands each to [`Stage::execute`].
pub enum Command {
    /// Create and place a surface, then answer on `reply`.
    CreateCanvas {
        canvas: CanvasId,
        pos: IVec2,
        size: UVec2,
        anchor: Anchor,
        reply: Sender<Result<()>>,
    },
    DestroyCanvas {
        canvas: CanvasId,
    },
    /// Replace the sprite's rendered handle with `image` at `pos`.
    SwapImage {
        canvas: CanvasId,
        sprite: SpriteId,
        pos: IVec2,
        image: Arc<RgbaImage>,
    },
    RemoveImage {
        sprite: SpriteId,
    },
    Subscribe {
        canvas: CanvasId,
        event: EventKind,
        subscriber: SubscriberId,
        callback: EventCallback,
    },
    Unsubscribe {
        canvas: CanvasId,
        event: EventKind,
        subscriber: SubscriberId,
    },
    BindWindow {
        event: EventKind,
        callback: EventCallback,
    },
    UnbindWindow {
        event: EventKind,
    },
    /// Arbitrary host work with full access to the stage.
    Call(StageFn),
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::CreateCanvas { canvas, pos, size, .. } => {
                write!(f, "CreateCanvas({} at {pos} size {size})", canvas.0)
            }
            Command::DestroyCanvas { canvas } => write!(f, "DestroyCanvas({})", canvas.0),
            Command::SwapImage { canvas, sprite, pos, image } => write!(
                f,
                "SwapImage(sprite {} on {} at {pos}, {}x{})",
                sprite.0,
                canvas.0,
                image.width(),
                image.height()
            ),
            Command::RemoveImage { sprite } => write!(f, "RemoveImage(sprite {})", sprite.0),
            Command::Subscribe { canvas, event, subscriber, .. } => {
                write!(f, "Subscribe({event:?} on {} for {})", canvas.0, subscriber.0)
            }
            Command::Unsubscribe { canvas, event, subscriber } => {
                write!(f, "Unsubscribe({event:?} on {} for {})", canvas.0, subscriber.0)
            }
            Command::BindWindow { event, .. } => write!(f, "BindWindow({event:?})"),
            Command::UnbindWindow { event } => write!(f, "UnbindWindow({event:?})"),
            Command::Call(_) => f.write_str("Call(..)"),
        }
    }
}

// ── Stage ────────────────────────────────────────────────────────────────────

struct CanvasSlot {
    surface: SurfaceId,
    events: EventTable,
}

#[derive(Copy, Clone)]
struct SpriteImage {
    canvas: CanvasId,
    surface: SurfaceId,
    image: ImageId,
}

/// Everything that may only be touched from the owner thread: the toolkit
/// backend plus the bookkeeping that maps core ids onto toolkit handles.
pub struct Stage {
    backend: Box<dyn Backend>,
    canvases: HashMap<CanvasId, CanvasSlot>,
    surfaces: HashMap<SurfaceId, CanvasId>,
    sprite_images: HashMap<SpriteId, SpriteImage>,
    window_binds: BTreeMap<EventKind, EventCallback>,
}

impl Stage {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            canvases: HashMap::new(),
            surfaces: HashMap::new(),
            sprite_images: HashMap::new(),
            window_binds: BTreeMap::new(),
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn Backend {
        self.backend.as_mut()
    }

    pub fn window_exists(&self) -> bool {
        self.backend.window_exists()
    }

    pub fn has_canvas(&self, canvas: CanvasId) -> bool {
        self.canvases.contains_key(&canvas)
    }

    pub fn canvas_count(&self) -> usize {
        self.canvases.len()
    }

    pub fn surface_of(&self, canvas: CanvasId) -> Option<SurfaceId> {
        self.canvases.get(&canvas).map(|slot| slot.surface)
    }

    pub fn has_image(&self, sprite: SpriteId) -> bool {
        self.sprite_images.contains_key(&sprite)
    }

    pub fn subscriber_count(&self, canvas: CanvasId, event: EventKind) -> usize {
        self.canvases.get(&canvas).map_or(0, |slot| slot.events.subscriber_count(event))
    }

    /// Build a surface right away. Only callable from owner-thread code
    /// (queued closures, shutdown hooks).
    pub fn create_canvas(&mut self, canvas: CanvasId, pos: IVec2, size: UVec2, anchor: Anchor) -> Result<SurfaceId> {
        let surface = self.backend.create_surface(size)?;
        if let Err(e) = self.backend.place_surface(surface, pos, anchor) {
            self.backend.destroy_surface(surface);
            return Err(e);
        }
        self.canvases.insert(canvas, CanvasSlot { surface, events: EventTable::new() });
        self.surfaces.insert(surface, canvas);
        Ok(surface)
    }

    /// Drop the surface, every sprite image on it and its bindings.
    pub fn destroy_canvas(&mut self, canvas: CanvasId) {
        let Some(mut slot) = self.canvases.remove(&canvas) else { return };
        self.surfaces.remove(&slot.surface);

        let orphans: Vec<SpriteId> = self
            .sprite_images
            .iter()
            .filter(|(_, img)| img.canvas == canvas)
            .map(|(id, _)| *id)
            .collect();
        for sprite in orphans {
            if let Some(img) = self.sprite_images.remove(&sprite) {
                self.backend.delete_image(img.surface, img.image);
            }
        }

        for event in slot.events.events() {
            self.backend.unbind(BindTarget::Surface(slot.surface), event);
        }
        slot.events.clear();
        self.backend.destroy_surface(slot.surface);
    }

    fn remove_sprite_image(&mut self, sprite: SpriteId) {
        if let Some(img) = self.sprite_images.remove(&sprite) {
            self.backend.delete_image(img.surface, img.image);
        }
    }

    pub fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::CreateCanvas { canvas, pos, size, anchor, reply } => {
                match self.create_canvas(canvas, pos, size, anchor) {
                    Ok(_) => {
                        let _ = reply.send(Ok(()));
                        Ok(())
                    }
                    Err(e) => {
                        let _ = reply.send(Err(EngineError::Backend(e.to_string())));
                        Err(e)
                    }
                }
            }

            Command::DestroyCanvas { canvas } => {
                self.destroy_canvas(canvas);
                Ok(())
            }

            Command::SwapImage { canvas, sprite, pos, image } => {
                // The canvas may have been torn down after this was queued.
                let Some(surface) = self.surface_of(canvas) else {
                    self.remove_sprite_image(sprite);
                    return Ok(());
                };
                self.remove_sprite_image(sprite);
                let handle = self.backend.create_image(surface, pos, Anchor::NorthWest, &image)?;
                self.sprite_images.insert(sprite, SpriteImage { canvas, surface, image: handle });
                Ok(())
            }

            Command::RemoveImage { sprite } => {
                self.remove_sprite_image(sprite);
                Ok(())
            }

            Command::Subscribe { canvas, event, subscriber, callback } => {
                let Some(slot) = self.canvases.get_mut(&canvas) else { return Ok(()) };
                if slot.events.subscribe(event, subscriber, callback) {
                    let surface = slot.surface;
                    self.backend.bind(BindTarget::Surface(surface), event)?;
                }
                Ok(())
            }

            Command::Unsubscribe { canvas, event, subscriber } => {
                let Some(slot) = self.canvases.get_mut(&canvas) else { return Ok(()) };
                if slot.events.unsubscribe(event, subscriber) {
                    let surface = slot.surface;
                    self.backend.unbind(BindTarget::Surface(surface), event);
                }
                Ok(())
            }

            Command::BindWindow { event, callback } => {
                if self.window_binds.insert(event, callback).is_none() {
                    self.backend.bind(BindTarget::Window, event)?;
                }
                Ok(())
            }

            Command::UnbindWindow { event } => {
                if self.window_binds.remove(&event).is_some() {
                    self.backend.unbind(BindTarget::Window, event);
                }
                Ok(())
            }

            Command::Call(f) => f(self),
        }
    }

    /// Deliver one toolkit event to every handler bound for it.
    pub fn dispatch(&mut self, routed: RoutedEvent) {
        let callbacks = match routed.target {
            BindTarget::Window => self.window_binds.get(&routed.event.kind).cloned().into_iter().collect(),
            BindTarget::Surface(surface) => self
                .surfaces
                .get(&surface)
                .and_then(|canvas| self.canvases.get(canvas))
                .map(|slot| slot.events.snapshot(routed.event.kind))
                .unwrap_or_default(),
        };

        for callback in callbacks {
            let event = &routed.event;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                log::error!("input handler for {:?} panicked: {}", event.kind, panic_message(&payload));
            }
        }
    }

    /// Repaint and deliver whatever input arrived. Returns the number of events.
    pub fn refresh(&mut self) -> usize {
        let events = self.backend.refresh();
        let count = events.len();
        for routed in events {
            self.dispatch(routed);
        }
        count
    }

    pub(crate) fn destroy_window(&mut self) {
        let canvases: Vec<CanvasId> = self.canvases.keys().copied().collect();
        for canvas in canvases {
            self.destroy_canvas(canvas);
        }
        let events: Vec<EventKind> = self.window_binds.keys().copied().collect();
        for event in events {
            self.backend.unbind(BindTarget::Window, event);
        }
        self.window_binds.clear();
        self.backend.destroy_window();
    }
}

pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
