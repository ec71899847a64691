//! The single user-settings record consumed by the core

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default debounce window between an edit burst and the triggered render
pub const DEFAULT_RENDER_DEBOUNCE_MS: u64 = 700;

/// Default debounce window between an edit burst and the auto-saved draft
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 900;

/// Default timestamp token used for generated snippet names
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// User settings. A single record, not CRUD-versioned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Milliseconds to wait after the last edit before re-rendering
    pub render_debounce_ms: u64,

    /// Milliseconds to wait after the last edit before auto-saving the draft
    pub autosave_debounce_ms: u64,

    /// chrono format string for generated snippet names
    pub date_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            render_debounce_ms: DEFAULT_RENDER_DEBOUNCE_MS,
            autosave_debounce_ms: DEFAULT_AUTOSAVE_DEBOUNCE_MS,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

impl Settings {
    /// Debounce window between the last edit and the triggered render
    pub fn render_debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.render_debounce_ms)
    }

    /// Debounce window between the last edit and the auto-saved draft
    pub fn autosave_debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.autosave_debounce_ms)
    }

    /// Load settings from file, falling back to defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load(&temp_dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");

        let mut settings = Settings::default();
        settings.render_debounce_ms = 250;
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.render_debounce_ms, 250);
        assert_eq!(loaded.date_format, DEFAULT_DATE_FORMAT);
    }
}
