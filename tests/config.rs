use std::time::Duration;

use glam::UVec2;
use jstage::config::EngineConfig;

#[test]
fn defaults_match_a_small_window_at_twenty_fps() {
    let config = EngineConfig::default();
    assert_eq!(config.title, "Untitled game");
    assert_eq!(config.frame_size, UVec2::new(500, 500));
    assert!(!config.debug);
    assert_eq!(config.tick_interval, Duration::from_millis(50));
    assert!((config.target_fps() - 20.0).abs() < 1e-3);
}

#[test]
fn partial_json_falls_back_to_defaults() {
    let config: EngineConfig =
        serde_json::from_str(r#"{ "frame_size": [800, 600], "tick_interval": 20 }"#).unwrap();
    assert_eq!(config.frame_size, UVec2::new(800, 600));
    assert_eq!(config.tick_interval, Duration::from_millis(20));
    assert_eq!(config.title, "Untitled game");
    assert!((config.target_fps() - 50.0).abs() < 1e-3);

    let empty: EngineConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(empty, EngineConfig::default());
}

#[test]
fn zero_interval_has_no_target_rate() {
    let config = EngineConfig { tick_interval: Duration::ZERO, ..EngineConfig::default() };
    assert_eq!(config.target_fps(), 0.0);
}
