use std::io;

use crate::queue::QueueStage;

/// What kind of model entry a lookup was after.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Image,
    Sequence,
    Level,
    Sound,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Image => "image",
            ResourceKind::Sequence => "sequence",
            ResourceKind::Level => "level",
            ResourceKind::Sound => "sound",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0} queue is closed")]
    QueueClosed(QueueStage),

    #[error("queue drained outside of its owner thread")]
    WrongThread,

    #[error("{kind} \"{name}\" not found in model")]
    MissingResource { kind: ResourceKind, name: String },

    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    #[error("time factor must be a positive finite number, got {0}")]
    InvalidTimeFactor(f32),

    #[error("tile ({x}, {y}) is outside the grid")]
    OutOfBounds { x: i32, y: i32 },

    #[error("frame scheduler stopped before the request completed")]
    SchedulerStopped,

    #[error("blocking request issued from the owner thread")]
    OwnerThreadBlocked,

    #[error("level has no render frame yet")]
    NoRenderFrame,

    #[error("backend error: {0}")]
    Backend(String),

    #[error("action failed: {0}")]
    ActionFailed(String),

    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("audio error: {0}")]
    Audio(String),
}

impl EngineError {
    pub fn missing_image(name: &str) -> Self {
        EngineError::MissingResource { kind: ResourceKind::Image, name: name.to_string() }
    }

    pub fn missing_sequence(name: &str) -> Self {
        EngineError::MissingResource { kind: ResourceKind::Sequence, name: name.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
