//! Headless demo: a menu with one button and a level with a blinking sprite
//! and a walking entity. Run with `RUST_LOG=debug` and `--debug` to watch the
//! queues drain.

use std::sync::Arc;
use std::time::Duration;

use glam::{IVec2, UVec2};
use image::{Rgba, RgbaImage};
use jstage::backend::{EventKind, HeadlessBackend};
use jstage::engine::{Game, SceneHandler};
use jstage::error::Result;
use jstage::level::{Entity, Level, LevelHandler, LevelInfo, ObjectRef};
use jstage::settings::Settings;
use jstage::sprite::{Model, Sequence, Sprite};

// ── Assets ───────────────────────────────────────────────────────────────────

fn solid(w: u32, h: u32, color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba(color))
}

fn blink_model() -> Result<Model> {
    Ok(Model::new()
        .with_image("main", solid(32, 32, [220, 60, 40, 255]))
        .with_image("hidden", solid(1, 1, [0, 0, 0, 0]))
        .with_sequence("loop", Sequence::from_json(r#"[true, ["main", [0, 0]], 400, ["hidden", [0, 0]], 400]"#)?))
}

// ── Menu ─────────────────────────────────────────────────────────────────────

struct MainMenu;

impl SceneHandler for MainMenu {
    fn draw_menu(&mut self, game: &mut Game) -> Result<()> {
        let size = game.frame_size();
        let canvas = game.create_menu_canvas("background", IVec2::ZERO, size)?;
        let button = Model::new()
            .with_image("idle", solid(100, 40, [40, 40, 40, 255]))
            .with_image("hover", solid(100, 40, [90, 90, 90, 255]));
        let play = Sprite::new(&canvas, button, "idle", IVec2::new(200, 230), UVec2::new(100, 40))?;

        let enter = play.clone();
        let leave = play.clone();
        play.set_hover_callback(
            move |_| { let _ = enter.set_current_image("hover"); },
            move |_| { let _ = leave.set_current_image("idle"); },
            false,
        )?;
        play.set_click_callback(|| log::info!("play clicked"))?;
        game.insert_menu_object("play_button", Arc::new(play));
        Ok(())
    }
}

// ── Level ────────────────────────────────────────────────────────────────────

struct BlinkLevel;

impl LevelHandler for BlinkLevel {
    fn info(&self) -> LevelInfo {
        LevelInfo { name: "Niveau 1".to_string(), description: "A blinking square.".to_string() }
    }

    fn grid_dimensions(&self) -> UVec2 {
        UVec2::new(10, 10)
    }

    fn create(&mut self, level: &mut Level) -> Result<()> {
        let canvas = level.create_render_frame()?;
        let scale = level.tile_scale();

        let blink = Sprite::new(&canvas, blink_model()?, "main", level.tile_origin(IVec2::new(4, 4)), scale)?;
        blink.start_sequence("loop")?;
        level.add_object(Arc::new(blink));

        let walker = Arc::new(Entity::new(1, true));
        let as_grid: ObjectRef = walker.clone();
        level.place_object(as_grid, IVec2::new(0, 0))?;
        level.add_object(walker);
        level.grid_mut().set_wall(IVec2::new(1, 0), true)?;

        level.add_bind(EventKind::KeyDown, |event| log::info!("key {:?}", event.key))?;
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let debug = std::env::args().any(|a| a == "--debug");

    let settings_path = std::env::temp_dir().join("jstage-demo").join("settings.json");
    let settings = Settings::load_or_default(&settings_path)?;
    log::info!("language {}, progression {}", settings.language, settings.progression);

    let backend = HeadlessBackend::new();
    let view = backend.handle();

    let mut game = Game::builder()
        .with_title("jstage demo")
        .with_size(500, 500)
        .with_debug(debug)
        .with_audio(false)
        .with_menu(MainMenu)
        .with_level(&settings.progression, BlinkLevel)
        .start(backend.into_factory())?;

    std::thread::sleep(Duration::from_millis(300));
    game.change_level(&settings.progression)?;

    let walker = game.with_level(&settings.progression, |level| {
        let grid = level.grid();
        let first = grid.objects_at(IVec2::new(0, 0)).first().cloned();
        first.map(|w| (w, grid.check_tile_available(IVec2::new(1, 0))))
    });
    if let Some(Some((walker, blocked_free))) = walker {
        log::info!("tile (1, 0) available: {blocked_free}");
        let moved = game.with_level(&settings.progression, |level| {
            level.move_object(&walker, IVec2::new(0, 0), IVec2::new(0, 1))
        });
        if let Some(Err(e)) = moved {
            log::warn!("walker could not move: {e}");
        }
    }

    std::thread::sleep(Duration::from_millis(2500));
    log::info!(
        "{} frames, {} surfaces, {} images",
        game.context().frame_count(),
        view.surface_count(),
        view.image_count()
    );

    game.shutdown();
    Ok(())
}
