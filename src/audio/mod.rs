use std::collections::HashMap;
use std::path::Path;
use kira::{
    manager::{AudioManager, AudioManagerSettings, backend::DefaultBackend},
    sound::static_sound::{StaticSoundData, StaticSoundHandle, StaticSoundSettings},
    tween::Tween,
    Volume,
};

use crate::error::{EngineError, Result};

/// Named sounds plus the device they play on.
pub struct SoundBank {
    /// `None` when audio hardware is unavailable (headless / CI / no audio device).
    manager: Option<AudioManager>,
    sounds: HashMap<String, StaticSoundData>,
}

impl SoundBank {
    pub fn new() -> Self {
        let manager = match AudioManager::<DefaultBackend>::new(AudioManagerSettings::default()) {
            Ok(m) => Some(m),
            Err(e) => {
                log::warn!("failed to initialize audio manager: {e}. Audio disabled.");
                None
            }
        };
        Self { manager, sounds: HashMap::new() }
    }

    /// A bank that never touches the audio device.
    pub fn disabled() -> Self {
        Self { manager: None, sounds: HashMap::new() }
    }

    /// Returns true if audio hardware is available.
    pub fn is_available(&self) -> bool { self.manager.is_some() }

    /// Load a sound file (OGG, WAV) into memory under `name`.
    pub fn load_sound<P: AsRef<Path>>(&mut self, name: &str, path: P) -> Result<()> {
        let sound = StaticSoundData::from_file(path.as_ref()).map_err(|e| {
            EngineError::Audio(format!("failed to load '{name}' from '{}': {e}", path.as_ref().display()))
        })?;
        self.sounds.insert(name.to_string(), sound);
        Ok(())
    }

    pub fn has_sound(&self, name: &str) -> bool {
        self.sounds.contains_key(name)
    }

    /// Play `name` once. `None` when audio is off or the sound is unknown.
    pub fn play(&mut self, name: &str) -> Option<StaticSoundHandle> {
        self.start(name, StaticSoundSettings::new())
    }

    /// Play `name` on repeat until its handle is stopped.
    pub fn play_looped(&mut self, name: &str, volume: f64) -> Option<StaticSoundHandle> {
        let mut settings = StaticSoundSettings::new().loop_region(0.0..);
        settings.volume = Volume::Amplitude(volume.clamp(0.0, 2.0)).into();
        self.start(name, settings)
    }

    fn start(&mut self, name: &str, settings: StaticSoundSettings) -> Option<StaticSoundHandle> {
        let manager = self.manager.as_mut()?;
        let Some(data) = self.sounds.get(name) else {
            log::warn!("sound \"{name}\" is not loaded");
            return None;
        };
        match manager.play(data.clone().with_settings(settings)) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("failed to play '{name}': {e}");
                None
            }
        }
    }
}

impl Default for SoundBank {
    fn default() -> Self { Self::new() }
}

/// Sounds started by one level, stopped when it is destroyed.
#[derive(Default)]
pub struct LevelSounds {
    handles: Vec<StaticSoundHandle>,
}

impl LevelSounds {
    pub fn track(&mut self, handle: StaticSoundHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn stop_all(&mut self) {
        for mut handle in self.handles.drain(..) {
            let _ = handle.stop(Tween::default());
        }
    }
}
