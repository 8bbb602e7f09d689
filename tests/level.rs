use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use glam::{IVec2, UVec2};
use image::{Rgba, RgbaImage};
use jstage::backend::{BindTarget, EventKind, HeadlessBackend, HeadlessHandle, InputEvent};
use jstage::config::EngineConfig;
use jstage::engine::BindTable;
use jstage::error::EngineError;
use jstage::level::{Entity, Level, LevelInfo, ObjectRef};
use jstage::scheduler::FrameScheduler;
use jstage::sprite::{Model, Sprite};

fn spawn(frame_size: UVec2) -> (FrameScheduler, HeadlessHandle) {
    let backend = HeadlessBackend::new();
    let view = backend.handle();
    let config = EngineConfig { frame_size, tick_interval: Duration::from_millis(2), ..EngineConfig::default() };
    (FrameScheduler::spawn(config, backend.into_factory()).unwrap(), view)
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn tile_scale_is_floored_per_axis() {
    let (scheduler, _view) = spawn(UVec2::new(500, 500));
    let ctx = scheduler.context();

    let level = Level::new(ctx, BindTable::new(), UVec2::new(3, 3));
    assert_eq!(level.tile_scale(), UVec2::new(166, 166));
    assert_eq!(level.tile_origin(IVec2::new(2, 1)), IVec2::new(332, 166));

    let level = Level::new(ctx, BindTable::new(), UVec2::new(50, 40));
    assert_eq!(level.tile_scale(), UVec2::new(10, 12));
    assert_eq!(level.grid().dimensions(), UVec2::new(50, 40));
}

#[test]
fn degenerate_grid_is_clamped() {
    let (scheduler, _view) = spawn(UVec2::new(300, 200));
    let level = Level::new(scheduler.context(), BindTable::new(), UVec2::new(0, 4));
    assert_eq!(level.grid().dimensions(), UVec2::new(1, 4));
    assert_eq!(level.tile_scale(), UVec2::new(300, 50));
}

#[test]
fn render_frame_covers_the_window_and_is_reused() {
    let (scheduler, view) = spawn(UVec2::new(320, 240));
    let mut level = Level::new(scheduler.context(), BindTable::new(), UVec2::new(4, 4));
    assert!(level.canvas().is_none());

    let first = level.create_render_frame().unwrap();
    let again = level.create_render_frame().unwrap();
    assert_eq!(first.id(), again.id());
    assert_eq!(first.size(), UVec2::new(320, 240));

    let surfaces = view.surfaces();
    assert_eq!(surfaces.len(), 1);
    assert_eq!(surfaces[0].1.pos, Some(IVec2::ZERO));
    assert_eq!(surfaces[0].1.size, UVec2::new(320, 240));
}

#[test]
fn binds_need_a_render_frame() {
    let (scheduler, view) = spawn(UVec2::new(100, 100));
    let mut level = Level::new(scheduler.context(), BindTable::new(), UVec2::new(2, 2));
    assert!(matches!(level.add_bind(EventKind::KeyDown, |_| {}), Err(EngineError::NoRenderFrame)));

    level.create_render_frame().unwrap();
    let pressed = Arc::new(AtomicUsize::new(0));
    let p = Arc::clone(&pressed);
    assert!(level.add_bind(EventKind::KeyDown, move |_| { p.fetch_add(1, Ordering::SeqCst); }).unwrap());

    let surface = view.surfaces()[0].0;
    assert!(wait_until(|| view.is_bound(BindTarget::Surface(surface), EventKind::KeyDown)));
    view.inject(BindTarget::Surface(surface), InputEvent::key_down(jstage::backend::KeyCode::KeyA));
    assert!(wait_until(|| pressed.load(Ordering::SeqCst) == 1));

    level.remove_bind(EventKind::KeyDown).unwrap();
    assert!(wait_until(|| !view.is_bound(BindTarget::Surface(surface), EventKind::KeyDown)));
}

#[test]
fn destroy_tears_down_objects_then_the_canvas() {
    let (scheduler, view) = spawn(UVec2::new(100, 100));
    let mut level = Level::new(scheduler.context(), BindTable::new(), UVec2::new(5, 5))
        .with_info(LevelInfo { name: "test".into(), description: "a level".into() });
    let canvas = level.create_render_frame().unwrap();

    let model = Model::new().with_image("dot", RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])));
    let sprite = Sprite::new(&canvas, model, "dot", level.tile_origin(IVec2::new(1, 1)), level.tile_scale()).unwrap();
    let walker = Arc::new(Entity::new(7, true).with_sprite(sprite.clone()));
    let as_grid: ObjectRef = walker.clone();
    level.place_object(as_grid, IVec2::new(1, 1)).unwrap();
    level.add_object(walker);
    assert!(!level.check_tile_available(IVec2::new(1, 1)));
    assert!(wait_until(|| view.image_count() == 1));

    level.destroy().unwrap();
    assert!(level.canvas().is_none());
    assert!(level.objects().is_empty());
    assert_eq!(level.grid().object_count(), 0);
    assert!(!sprite.is_shown());
    assert!(canvas.is_destroyed());
    assert!(wait_until(|| view.surface_count() == 0 && view.image_count() == 0));

    // A destroyed level can be built again.
    let fresh = level.create_render_frame().unwrap();
    assert_ne!(fresh.id(), canvas.id());
    assert_eq!(level.info().name, "test");
}

#[test]
fn move_object_goes_through_the_grid() {
    let (scheduler, _view) = spawn(UVec2::new(100, 100));
    let mut level = Level::new(scheduler.context(), BindTable::new(), UVec2::new(3, 3));
    let box_: ObjectRef = Arc::new(Entity::new(1, true));
    level.place_object(Arc::clone(&box_), IVec2::ZERO).unwrap();
    level.grid_mut().set_wall(IVec2::new(2, 2), true).unwrap();

    assert!(level.move_object(&box_, IVec2::ZERO, IVec2::new(1, 0)).unwrap());
    assert!(!level.move_object(&box_, IVec2::ZERO, IVec2::new(1, 0)).unwrap());
    assert!(level.check_tile_available(IVec2::ZERO));
    assert!(!level.check_tile_available(IVec2::new(2, 2)));
}
