pub mod audio;
pub mod backend;
pub mod canvas;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod level;
pub mod queue;
pub mod scheduler;
pub mod settings;
pub mod sprite;

pub use config::EngineConfig;
pub use engine::{Game, GameBuilder, SceneHandler};
pub use error::{EngineError, Result};
pub use level::{Grid, Level, LevelHandler, LevelObject};
pub use scheduler::{EngineContext, FrameScheduler, SchedulerState};
pub use sprite::{Model, Sequence, Sprite};
