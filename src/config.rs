use std::time::Duration;

use glam::UVec2;
use serde::Deserialize;

// ── EngineConfig ──────────────────────────────────────────────────────────────

/// Settings the host hands to the frame scheduler when it starts.
///
/// Deserialisable so a game can keep it next to its other JSON data; missing
/// fields fall back to [`EngineConfig::default`].
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Window title.
    pub title: String,
    /// Window size in pixels. Not resizable once created.
    pub frame_size: UVec2,
    /// Log every drained command and every non-empty queue per tick.
    pub debug: bool,
    /// Sleep between ticks, in milliseconds.
    #[serde(deserialize_with = "millis::deserialize")]
    pub tick_interval: Duration,
}

impl Default for EngineConfig {
    /// 500 × 500 window ticking at roughly 20 frames per second.
    fn default() -> Self {
        Self {
            title: "Untitled game".to_string(),
            frame_size: UVec2::new(500, 500),
            debug: false,
            tick_interval: Duration::from_millis(50),
        }
    }
}

impl EngineConfig {
    /// Target tick rate implied by `tick_interval`. Returns `0.0` for a zero interval.
    pub fn target_fps(&self) -> f32 {
        let secs = self.tick_interval.as_secs_f32();
        if secs <= 0.0 {
            return 0.0;
        }
        1.0 / secs
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
