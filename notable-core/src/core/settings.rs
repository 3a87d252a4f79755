//! Workspace settings persistence for Notable.
//!
//! Tuning knobs (busy timeout, page sizes, journal retention) live in a JSON
//! file at an OS-appropriate location. Missing or unreadable files fall back
//! to defaults.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted workspace settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// How long a writer waits for another writer's lock before failing.
    pub busy_timeout_ms: u64,
    /// Page size used when a caller does not ask for one.
    pub default_page_size: u32,
    /// Upper bound applied to every requested page size.
    pub max_page_size: u32,
    /// Number of most recent journal entries retained after each mutation.
    pub journal_keep_last: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            default_page_size: 50,
            max_page_size: 100,
            journal_keep_last: 1_000,
        }
    }
}

impl Settings {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Clamps a requested page size into `1..=max_page_size`, substituting
    /// the default when none was requested.
    pub fn page_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

/// Returns the path to the settings JSON file.
///
/// - macOS / Linux: `~/.config/notable/settings.json`
/// - Windows: `%APPDATA%/Notable/settings.json`
pub fn settings_file_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("Notable").join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("notable").join("settings.json")
    }
}

/// Loads settings from `path`; returns defaults if the file is missing or corrupt.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Settings {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable settings file {}: {e}", path.display());
            Settings::default()
        }),
        Err(_) => Settings::default(),
    }
}

/// Saves settings to `path`, creating parent directories as needed.
pub fn save_settings<P: AsRef<Path>>(path: P, settings: &Settings) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;
    Ok(())
}
