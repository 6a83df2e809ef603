//! Settings store - a flat JSON document of string keys
//!
//! Lives at `<config dir>/dlqueue/config.json`. A known key that is missing,
//! `null` or not a string reads as its default without disturbing the
//! others. Unknown keys are kept so other front-ends can share the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Naming pattern written on first run
pub const DEFAULT_SETTINGS_PATTERN: &str = "%(upload_date>%Y.%m.%d)s.%(title)s [%(id)s].%(ext)s";

/// Format selector written on first run
pub const DEFAULT_FORMAT: &str = "bestvideo+bestaudio/best";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub download_path: String,
    pub format: String,
    pub naming_pattern: String,
    /// Netscape cookies.txt file
    pub cookies_path: String,
    /// Browser to pull cookies from when no file is set
    pub cookies_browser: String,
    /// Empty means look up `yt-dlp` on PATH
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl<'de> Deserialize<'de> for Settings {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Map::deserialize(deserializer).map(Self::from_map)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_path: default_download_dir().to_string_lossy().into_owned(),
            format: DEFAULT_FORMAT.to_string(),
            naming_pattern: DEFAULT_SETTINGS_PATTERN.to_string(),
            cookies_path: String::new(),
            cookies_browser: String::new(),
            ytdlp_path: String::new(),
            ffmpeg_path: String::new(),
            extra: Map::new(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Settings {
    /// Take the known keys out of `map`, per key falling back to defaults
    fn from_map(mut map: Map<String, Value>) -> Self {
        let mut settings = Self::default();

        let known = [
            ("download_path", &mut settings.download_path),
            ("format", &mut settings.format),
            ("naming_pattern", &mut settings.naming_pattern),
            ("cookies_path", &mut settings.cookies_path),
            ("cookies_browser", &mut settings.cookies_browser),
            ("ytdlp_path", &mut settings.ytdlp_path),
            ("ffmpeg_path", &mut settings.ffmpeg_path),
        ];
        for (key, slot) in known {
            match map.remove(key) {
                Some(Value::String(value)) => *slot = value,
                None | Some(Value::Null) => {}
                Some(other) => {
                    log::warn!("Setting {} is not a string ({}), using default", key, other);
                }
            }
        }

        settings.extra = map;
        settings
    }

    /// Get the default settings path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dlqueue")
            .join("config.json")
    }

    /// Load from `path`, never failing.
    ///
    /// A missing file is created with defaults; an unreadable one is logged
    /// and replaced by defaults in memory only.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            let settings = Self::default();
            if let Err(e) = settings.save_to(path) {
                log::warn!("Failed to write default settings: {:#}", e);
            }
            return settings;
        }

        match Self::load_from(path) {
            Ok(settings) => settings,
            Err(e) => {
                log::error!("Failed to load settings: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(settings)
    }

    /// Save to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Value of `key` as a string; unknown or non-string keys read as empty
    pub fn get(&self, key: &str) -> String {
        match key {
            "download_path" => self.download_path.clone(),
            "format" => self.format.clone(),
            "naming_pattern" => self.naming_pattern.clone(),
            "cookies_path" => self.cookies_path.clone(),
            "cookies_browser" => self.cookies_browser.clone(),
            "ytdlp_path" => self.ytdlp_path.clone(),
            "ffmpeg_path" => self.ffmpeg_path.clone(),
            other => self
                .extra
                .get(other)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        }
    }
}
