use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use glam::{IVec2, UVec2};
use image::RgbaImage;

use super::{
    Anchor, Backend, BackendFactory, BindTarget, EventKind, ImageId, InputEvent, MouseButton,
    RoutedEvent, SurfaceId,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceRecord {
    pub size: UVec2,
    /// Top-left corner on the window, once placed.
    pub pos: Option<IVec2>,
    pub binds: BTreeSet<EventKind>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageRecord {
    pub surface: SurfaceId,
    /// Top-left corner on the surface.
    pub pos: IVec2,
    pub size: UVec2,
}

#[derive(Default)]
struct HeadlessScene {
    title: String,
    size: UVec2,
    window_open: bool,
    next_id: u64,
    surfaces: BTreeMap<SurfaceId, SurfaceRecord>,
    images: BTreeMap<ImageId, ImageRecord>,
    window_binds: BTreeSet<EventKind>,
    pending: VecDeque<RoutedEvent>,
    refreshes: u64,
}

impl HeadlessScene {
    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn is_bound(&self, target: BindTarget, kind: EventKind) -> bool {
        match target {
            BindTarget::Window => self.window_binds.contains(&kind),
            BindTarget::Surface(id) => self.surfaces.get(&id).is_some_and(|s| s.binds.contains(&kind)),
        }
    }
}

/// In-memory toolkit: records every surface, image and binding, and delivers
/// input events injected through its [`HeadlessHandle`].
pub struct HeadlessBackend {
    scene: Arc<Mutex<HeadlessScene>>,
}

/// Outside view of a [`HeadlessBackend`], usable from any thread.
#[derive(Clone)]
pub struct HeadlessHandle {
    scene: Arc<Mutex<HeadlessScene>>,
}

fn lock(scene: &Mutex<HeadlessScene>) -> MutexGuard<'_, HeadlessScene> {
    scene.lock().unwrap_or_else(|e| e.into_inner())
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self { scene: Arc::new(Mutex::new(HeadlessScene::default())) }
    }

    pub fn handle(&self) -> HeadlessHandle {
        HeadlessHandle { scene: Arc::clone(&self.scene) }
    }

    /// "Create the window": record title and size and mark it open.
    pub fn open(self, config: &EngineConfig) -> Self {
        {
            let mut scene = lock(&self.scene);
            scene.title = config.title.clone();
            scene.size = config.frame_size;
            scene.window_open = true;
        }
        self
    }

    /// Factory for [`FrameScheduler::spawn`](crate::scheduler::FrameScheduler::spawn).
    pub fn into_factory(self) -> BackendFactory {
        Box::new(move |config: &EngineConfig| Ok(Box::new(self.open(config)) as Box<dyn Backend>))
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self { Self::new() }
}

impl Backend for HeadlessBackend {
    fn window_exists(&self) -> bool {
        lock(&self.scene).window_open
    }

    fn destroy_window(&mut self) {
        let mut scene = lock(&self.scene);
        scene.window_open = false;
        scene.surfaces.clear();
        scene.images.clear();
        scene.window_binds.clear();
        scene.pending.clear();
    }

    fn create_surface(&mut self, size: UVec2) -> Result<SurfaceId> {
        let mut scene = lock(&self.scene);
        if !scene.window_open {
            return Err(EngineError::Backend("window does not exist".into()));
        }
        let id = SurfaceId(scene.alloc());
        scene.surfaces.insert(id, SurfaceRecord { size, pos: None, binds: BTreeSet::new() });
        Ok(id)
    }

    fn place_surface(&mut self, surface: SurfaceId, pos: IVec2, anchor: Anchor) -> Result<()> {
        let mut scene = lock(&self.scene);
        let record = scene
            .surfaces
            .get_mut(&surface)
            .ok_or_else(|| EngineError::Backend(format!("unknown surface {}", surface.0)))?;
        record.pos = Some(anchor.top_left(pos, record.size));
        Ok(())
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        let mut scene = lock(&self.scene);
        scene.surfaces.remove(&surface);
        scene.images.retain(|_, img| img.surface != surface);
    }

    fn create_image(
        &mut self,
        surface: SurfaceId,
        pos: IVec2,
        anchor: Anchor,
        image: &RgbaImage,
    ) -> Result<ImageId> {
        let mut scene = lock(&self.scene);
        if !scene.surfaces.contains_key(&surface) {
            return Err(EngineError::Backend(format!("unknown surface {}", surface.0)));
        }
        let size = UVec2::new(image.width(), image.height());
        let id = ImageId(scene.alloc());
        scene.images.insert(id, ImageRecord { surface, pos: anchor.top_left(pos, size), size });
        Ok(id)
    }

    fn delete_image(&mut self, _surface: SurfaceId, image: ImageId) {
        lock(&self.scene).images.remove(&image);
    }

    fn bind(&mut self, target: BindTarget, event: EventKind) -> Result<()> {
        let mut scene = lock(&self.scene);
        match target {
            BindTarget::Window => {
                scene.window_binds.insert(event);
            }
            BindTarget::Surface(id) => {
                let record = scene
                    .surfaces
                    .get_mut(&id)
                    .ok_or_else(|| EngineError::Backend(format!("unknown surface {}", id.0)))?;
                record.binds.insert(event);
            }
        }
        Ok(())
    }

    fn unbind(&mut self, target: BindTarget, event: EventKind) {
        let mut scene = lock(&self.scene);
        match target {
            BindTarget::Window => {
                scene.window_binds.remove(&event);
            }
            BindTarget::Surface(id) => {
                if let Some(record) = scene.surfaces.get_mut(&id) {
                    record.binds.remove(&event);
                }
            }
        }
    }

    fn refresh(&mut self) -> Vec<RoutedEvent> {
        let mut scene = lock(&self.scene);
        scene.refreshes += 1;
        let pending: Vec<RoutedEvent> = scene.pending.drain(..).collect();
        // The toolkit only delivers events somebody is bound to.
        pending
            .into_iter()
            .filter(|ev| scene.is_bound(ev.target, ev.event.kind))
            .collect()
    }
}

impl HeadlessHandle {
    pub fn window_open(&self) -> bool {
        lock(&self.scene).window_open
    }

    /// Simulate the user closing the window.
    pub fn close_window(&self) {
        lock(&self.scene).window_open = false;
    }

    pub fn title(&self) -> String {
        lock(&self.scene).title.clone()
    }

    pub fn window_size(&self) -> UVec2 {
        lock(&self.scene).size
    }

    pub fn refresh_count(&self) -> u64 {
        lock(&self.scene).refreshes
    }

    pub fn surfaces(&self) -> Vec<(SurfaceId, SurfaceRecord)> {
        lock(&self.scene).surfaces.iter().map(|(id, s)| (*id, s.clone())).collect()
    }

    pub fn surface_count(&self) -> usize {
        lock(&self.scene).surfaces.len()
    }

    pub fn images(&self) -> Vec<ImageRecord> {
        lock(&self.scene).images.values().cloned().collect()
    }

    pub fn images_on(&self, surface: SurfaceId) -> Vec<ImageRecord> {
        lock(&self.scene).images.values().filter(|img| img.surface == surface).cloned().collect()
    }

    pub fn image_count(&self) -> usize {
        lock(&self.scene).images.len()
    }

    pub fn is_bound(&self, target: BindTarget, kind: EventKind) -> bool {
        lock(&self.scene).is_bound(target, kind)
    }

    /// Queue an event for delivery on the next repaint.
    pub fn inject(&self, target: BindTarget, event: InputEvent) {
        lock(&self.scene).pending.push_back(RoutedEvent { target, event });
    }

    pub fn click(&self, surface: SurfaceId, pos: IVec2) {
        self.inject(BindTarget::Surface(surface), InputEvent::pointer_down(pos, MouseButton::Left));
    }

    pub fn hover(&self, surface: SurfaceId, pos: IVec2) {
        self.inject(BindTarget::Surface(surface), InputEvent::pointer_move(pos));
    }
}
