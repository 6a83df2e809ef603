//! Job configuration and yt-dlp command-line construction

use crate::settings::Settings;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Filename pattern used when none is configured
pub const DEFAULT_NAMING_PATTERN: &str = "%(title)s.%(ext)s";

/// Extension placeholder every output template must carry
pub const EXT_PLACEHOLDER: &str = "%(ext)s";

/// Fixed progress line format: `<percent>:<eta>:<speed>`
pub const PROGRESS_TEMPLATE: &str =
    "%(progress._percent_str)s:%(progress._eta_str)s:%(progress._speed_str)s";

/// Container forced when a thumbnail is embedded into a video
const EMBED_CONTAINER: &str = "mp4";

/// Immutable snapshot of everything one download needs.
///
/// Taken when the task starts; later settings edits don't reach a running task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    pub download_video: bool,
    pub audio_only: bool,
    pub format_selector: Option<String>,
    pub save_thumbnail: bool,
    pub embed_thumbnail: bool,
    pub output_dir: PathBuf,
    /// Naming pattern relative to `output_dir`; empty means default
    pub output_template: String,
    pub cookies_path: Option<String>,
    pub cookies_browser: Option<String>,
    pub ffmpeg_location: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            download_video: true,
            audio_only: false,
            format_selector: None,
            save_thumbnail: false,
            embed_thumbnail: false,
            output_dir: PathBuf::from("."),
            output_template: String::new(),
            cookies_path: None,
            cookies_browser: None,
            ffmpeg_location: None,
        }
    }
}

impl JobConfig {
    /// Snapshot the settings-backed fields. Per-job toggles stay at defaults.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            format_selector: non_empty(&settings.format),
            output_dir: non_empty(&settings.download_path)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            output_template: settings.naming_pattern.clone(),
            cookies_path: non_empty(&settings.cookies_path),
            cookies_browser: non_empty(&settings.cookies_browser),
            ffmpeg_location: non_empty(&settings.ffmpeg_path),
            ..Self::default()
        }
    }

    /// Directory handed to `--ffmpeg-location` and prepended to PATH
    pub fn ffmpeg_dir(&self) -> Option<PathBuf> {
        self.ffmpeg_location.as_deref().map(|p| {
            Path::new(p)
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .to_path_buf()
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Quality presets mapped to yt-dlp format selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Quality {
    Best,
    #[value(name = "1080p")]
    P1080,
    #[value(name = "720p")]
    P720,
    #[value(name = "480p")]
    P480,
    #[value(name = "360p")]
    P360,
}

impl Quality {
    pub fn format_selector(&self) -> &'static str {
        match self {
            Self::Best => "bestvideo+bestaudio/best",
            Self::P1080 => "bestvideo[height<=1080]+bestaudio/best[height<=1080]",
            Self::P720 => "bestvideo[height<=720]+bestaudio/best[height<=720]",
            Self::P480 => "bestvideo[height<=480]+bestaudio/best[height<=480]",
            Self::P360 => "bestvideo[height<=360]+bestaudio/best[height<=360]",
        }
    }
}

/// Join the naming pattern onto the output directory, making sure the
/// extension placeholder is present. Templates that already carry it are
/// left as they are.
pub fn resolve_output_template(output_dir: &Path, pattern: &str) -> String {
    let pattern = pattern.trim();
    let pattern = if pattern.is_empty() {
        DEFAULT_NAMING_PATTERN.to_string()
    } else if pattern.contains(EXT_PLACEHOLDER) {
        pattern.to_string()
    } else {
        format!("{}.{}", pattern, EXT_PLACEHOLDER)
    };

    output_dir.join(pattern).to_string_lossy().into_owned()
}

/// Build the download argv (program excluded). Flag order is fixed.
pub fn build_download_args(config: &JobConfig, output_template: &str, url: &str) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--newline".into(),
        "--no-colors".into(),
        "--no-playlist".into(),
        "-o".into(),
        output_template.into(),
        "--progress-template".into(),
        PROGRESS_TEMPLATE.into(),
    ];

    if !config.download_video {
        args.push("--skip-download".into());
    }

    // Audio-only wins over an explicit selector
    if config.audio_only {
        if config.download_video {
            args.extend(
                ["-x", "--audio-format", "mp3", "--audio-quality", "0"].map(String::from),
            );
        }
    } else if let Some(format) = &config.format_selector {
        args.push("-f".into());
        args.push(format.clone());
    }

    let embed = config.embed_thumbnail && config.download_video;
    if config.save_thumbnail {
        args.push("--write-thumbnail".into());
    }
    if embed {
        args.push("--embed-thumbnail".into());
    }
    if config.save_thumbnail || embed {
        args.push("--convert-thumbnails".into());
        args.push("jpg".into());
    }
    if embed && !config.audio_only {
        args.push("--merge-output-format".into());
        args.push(EMBED_CONTAINER.into());
    }

    if let Some(dir) = config.ffmpeg_dir() {
        args.push("--ffmpeg-location".into());
        args.push(dir.to_string_lossy().into_owned());
    }

    push_cookie_args(&mut args, config);
    args.push(url.into());
    args
}

/// Build the metadata dump argv (program excluded)
pub fn build_metadata_args(config: &JobConfig, url: &str) -> Vec<String> {
    let mut args: Vec<String> = ["--dump-json", "--no-playlist", "--skip-download"]
        .map(String::from)
        .to_vec();
    push_cookie_args(&mut args, config);
    args.push(url.into());
    args
}

/// Cookie file takes precedence over browser extraction
fn push_cookie_args(args: &mut Vec<String>, config: &JobConfig) {
    if let Some(path) = &config.cookies_path {
        args.push("--cookies".into());
        args.push(path.clone());
    } else if let Some(browser) = &config.cookies_browser {
        args.push("--cookies-from-browser".into());
        args.push(browser.clone());
    }
}

/// Where the external tool lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ytdlp: PathBuf,
}

impl ToolPaths {
    /// Configured path when set, otherwise `yt-dlp` looked up through PATH
    pub fn from_settings(settings: &Settings) -> Self {
        let ytdlp = match non_empty(&settings.ytdlp_path) {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(default_binary_name()),
        };
        Self { ytdlp }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ytdlp: PathBuf::from(default_binary_name()),
        }
    }
}

fn default_binary_name() -> &'static str {
    if cfg!(windows) {
        "yt-dlp.exe"
    } else {
        "yt-dlp"
    }
}

/// Environment overrides for the child: ffmpeg's directory goes in front of PATH
pub fn child_env(config: &JobConfig) -> Vec<(OsString, OsString)> {
    let Some(dir) = config.ffmpeg_dir() else {
        return Vec::new();
    };

    let mut paths = vec![dir.clone()];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing).filter(|p| *p != dir));
    }

    match std::env::join_paths(paths) {
        Ok(joined) => vec![(OsString::from("PATH"), joined)],
        Err(e) => {
            log::warn!("Cannot extend PATH with {}: {}", dir.display(), e);
            Vec::new()
        }
    }
}
