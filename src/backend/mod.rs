//! The toolkit capability set the core relies on.
//!
//! Nothing outside this trait is assumed about the GUI toolkit: a window, flat
//! surfaces placed on it, positioned image handles on those surfaces, named
//! input bindings, and a repaint call that hands back pending input.
//! [`HeadlessBackend`] is the in-memory implementation used by tests and the
//! demo binary.

mod headless;

pub use headless::{HeadlessBackend, HeadlessHandle, ImageRecord, SurfaceRecord};

use glam::{IVec2, UVec2};
use image::RgbaImage;
pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;

use crate::config::EngineConfig;
use crate::error::Result;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub u64);

/// Which point of a placed item its position refers to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Anchor {
    #[default]
    NorthWest,
    Center,
}

impl Anchor {
    /// Top-left corner of an item of `size` anchored at `pos`.
    pub fn top_left(self, pos: IVec2, size: UVec2) -> IVec2 {
        match self {
            Anchor::NorthWest => pos,
            Anchor::Center => pos - size.as_ivec2() / 2,
        }
    }
}

// ── Input ────────────────────────────────────────────────────────────────────

/// Named input event a surface or the window can be bound to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    PointerDown,
    PointerUp,
    PointerMove,
    KeyDown,
    KeyUp,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InputEvent {
    pub kind: EventKind,
    /// Pointer position relative to the bound surface (window-relative for window binds).
    pub pos: IVec2,
    pub button: Option<MouseButton>,
    pub key: Option<KeyCode>,
}

impl InputEvent {
    pub fn pointer_down(pos: IVec2, button: MouseButton) -> Self {
        Self { kind: EventKind::PointerDown, pos, button: Some(button), key: None }
    }

    pub fn pointer_up(pos: IVec2, button: MouseButton) -> Self {
        Self { kind: EventKind::PointerUp, pos, button: Some(button), key: None }
    }

    pub fn pointer_move(pos: IVec2) -> Self {
        Self { kind: EventKind::PointerMove, pos, button: None, key: None }
    }

    pub fn key_down(key: KeyCode) -> Self {
        Self { kind: EventKind::KeyDown, pos: IVec2::ZERO, button: None, key: Some(key) }
    }

    pub fn key_up(key: KeyCode) -> Self {
        Self { kind: EventKind::KeyUp, pos: IVec2::ZERO, button: None, key: Some(key) }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindTarget {
    Window,
    Surface(SurfaceId),
}

/// An input event the toolkit delivered to one of its bound targets.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutedEvent {
    pub target: BindTarget,
    pub event: InputEvent,
}

// ── Backend trait ────────────────────────────────────────────────────────────

/// Toolkit adapter. Lives on the owner thread for its whole life, so it does
/// not need to be `Send`; the factory that builds it does.
pub trait Backend {
    fn window_exists(&self) -> bool;
    fn destroy_window(&mut self);

    fn create_surface(&mut self, size: UVec2) -> Result<SurfaceId>;
    fn place_surface(&mut self, surface: SurfaceId, pos: IVec2, anchor: Anchor) -> Result<()>;
    fn destroy_surface(&mut self, surface: SurfaceId);

    fn create_image(
        &mut self,
        surface: SurfaceId,
        pos: IVec2,
        anchor: Anchor,
        image: &RgbaImage,
    ) -> Result<ImageId>;
    fn delete_image(&mut self, surface: SurfaceId, image: ImageId);

    fn bind(&mut self, target: BindTarget, event: EventKind) -> Result<()>;
    fn unbind(&mut self, target: BindTarget, event: EventKind);

    /// Repaint, then return the input events delivered since the last call.
    fn refresh(&mut self) -> Vec<RoutedEvent>;
}

/// Builds the backend on the owner thread, creating its window.
pub type BackendFactory = Box<dyn FnOnce(&EngineConfig) -> Result<Box<dyn Backend>> + Send>;
