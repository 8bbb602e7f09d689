use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Player settings persisted as JSON next to the game data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub language: String,
    pub username: String,
    /// Name of the furthest level reached.
    pub progression: String,
    pub all_access: bool,
    pub has_selected_username: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: "FR".to_string(),
            username: "Player".to_string(),
            progression: "LNiveau1".to_string(),
            all_access: false,
            has_selected_username: false,
        }
    }
}

impl Settings {
    /// Read `path`. A missing or unreadable file is replaced by the defaults,
    /// which are written back.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let parsed = fs::read_to_string(path)
            .map_err(crate::error::EngineError::from)
            .and_then(|text| Ok(serde_json::from_str::<Settings>(&text)?));

        match parsed {
            Ok(settings) => Ok(settings),
            Err(e) => {
                log::info!("settings at {} unusable ({e}), writing defaults", path.display());
                let settings = Settings::default();
                settings.save(path)?;
                Ok(settings)
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::error::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Look a setting up by its JSON key.
    pub fn value(&self, key: &str) -> Option<serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => map.remove(key),
            _ => None,
        }
    }
}
