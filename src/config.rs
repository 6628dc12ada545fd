use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::refresh;
use crate::types::Position;

/// Persisted settings document. Loaded once at startup; every in-memory
/// mutation is flushed straight back to disk (write-through, no batching).
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub metadata: Metadata,
    pub settings: Settings,
    /// DisplayName -> saved [x, y] of its preview surface.
    pub thumbnail_position: HashMap<String, [i32; 2]>,
    pub hotkeys: Hotkeys,
    #[serde(skip)]
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub last_modified: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Thumbnail size as a percentage of the captured window.
    pub thumbnail_scaling: f32,
    /// Overlay opacity percentage.
    pub thumbnail_opacity: u8,
    pub enable_borders: bool,
    pub active_border_color: String,
    pub inactive_border_color: String,
    pub font_family: String,
    /// Slow the capture cadence down as more clients are tracked.
    pub dynamic_refresh: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            thumbnail_scaling: 7.5,
            thumbnail_opacity: 100,
            enable_borders: true,
            active_border_color: "#47f73e".to_string(),
            inactive_border_color: "#808080".to_string(),
            font_family: "Courier New".to_string(),
            dynamic_refresh: true,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Hotkeys {
    /// User-ordered character names cycled by the hotkey. May contain names
    /// with no open window; those are skipped at cycle time.
    pub character_list: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metadata: Metadata::default(),
            settings: Settings::default(),
            thumbnail_position: HashMap::new(),
            hotkeys: Hotkeys::default(),
            path: PathBuf::new(),
        }
    }
}

impl Config {
    /// Default document location under the platform config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("multibox-preview")
            .join("config.json")
    }

    /// Load the document, falling back to defaults on a missing or malformed
    /// file. A corrupt file is left untouched until the next explicit save.
    pub fn load(path: PathBuf) -> Self {
        let mut config = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Config>(&raw) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded config");
                    config
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "malformed config, using defaults");
                    Config::default()
                }
            },
            Err(err) => {
                info!(path = %path.display(), error = %err, "no config file, using defaults");
                Config::default()
            }
        };
        config.path = path;
        config
    }

    /// Flush the document to disk with a fresh last-modified stamp.
    pub fn save(&mut self) -> Result<()> {
        self.metadata.last_modified = chrono::Local::now().to_rfc3339();
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    pub fn saved_position(&self, name: &str) -> Option<Position> {
        self.thumbnail_position
            .get(name)
            .map(|[x, y]| Position::new(*x, *y))
    }

    /// Record a surface position and flush immediately.
    pub fn set_position(&mut self, name: &str, pos: Position) -> Result<()> {
        self.thumbnail_position
            .insert(name.to_string(), [pos.x, pos.y]);
        self.save()
    }

    /// Capture scale factor, clamped away from zero.
    pub fn scale_factor(&self) -> f32 {
        (self.settings.thumbnail_scaling / 100.0).clamp(0.001, 1.0)
    }

    /// Refresh cadence for a surface, given how many clients are tracked.
    /// Grows linearly past the base client count when dynamic refresh is on,
    /// clamped to the allowed band.
    pub fn refresh_interval(&self, client_count: usize) -> Duration {
        let ms = if !self.settings.dynamic_refresh || client_count <= refresh::BASE_CLIENT_COUNT {
            refresh::BASE_INTERVAL_MS
        } else {
            refresh::BASE_INTERVAL_MS
                + (client_count - refresh::BASE_CLIENT_COUNT) as u64 * refresh::STEP_PER_CLIENT_MS
        };
        Duration::from_millis(ms.min(refresh::MAX_INTERVAL_MS))
    }

    /// Active border color as RGB, falling back to the default green when
    /// the configured hex string is unparseable.
    pub fn active_border_rgb(&self) -> [u8; 3] {
        parse_hex_color(&self.settings.active_border_color).unwrap_or([0x47, 0xf7, 0x3e])
    }
}

/// Parse a `#rrggbb` color string.
pub fn parse_hex_color(s: &str) -> Option<[u8; 3]> {
    let hex = s.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("nope.json"));
        assert_eq!(config.settings.thumbnail_opacity, 100);
        assert!(config.thumbnail_position.is_empty());
    }

    #[test]
    fn malformed_file_falls_back_and_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = Config::load(path.clone());
        assert_eq!(config.settings.thumbnail_scaling, 7.5);
        // The corrupt file survives until the next explicit save.
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn position_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::load(path.clone());
        config.set_position("Bob", Position::new(480, 270)).unwrap();

        let reloaded = Config::load(path);
        assert_eq!(reloaded.saved_position("Bob"), Some(Position::new(480, 270)));
        assert_eq!(reloaded.thumbnail_position["Bob"], [480, 270]);
        assert!(!reloaded.metadata.last_modified.is_empty());
    }

    #[test]
    fn refresh_interval_grows_with_client_count() {
        let config = Config::default();
        assert_eq!(config.refresh_interval(1), Duration::from_millis(500));
        assert_eq!(config.refresh_interval(2), Duration::from_millis(500));
        assert_eq!(config.refresh_interval(4), Duration::from_millis(1000));
        // Clamped at the top of the band.
        assert_eq!(config.refresh_interval(50), Duration::from_millis(3000));
    }

    #[test]
    fn refresh_interval_is_flat_when_dynamic_refresh_is_off() {
        let mut config = Config::default();
        config.settings.dynamic_refresh = false;
        assert_eq!(config.refresh_interval(10), Duration::from_millis(500));
    }

    #[test]
    fn hex_color_parsing() {
        assert_eq!(parse_hex_color("#47f73e"), Some([0x47, 0xf7, 0x3e]));
        assert_eq!(parse_hex_color("#FFFFFF"), Some([255, 255, 255]));
        assert_eq!(parse_hex_color("47f73e"), None);
        assert_eq!(parse_hex_color("#47f73"), None);
        assert_eq!(parse_hex_color("#zzzzzz"), None);
    }
}
