//! Metadata preview - title, uploader and thumbnail before downloading
//!
//! YouTube links try the oEmbed endpoint first: one HTTP request instead of a
//! tool start-up. Other hosts, or an oEmbed failure, fall back to
//! `yt-dlp --dump-json`. The download path never depends on this module.

use crate::core::{build_metadata_args, child_env, JobConfig, ToolPaths};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

const OEMBED_ENDPOINT: &str = "https://www.youtube.com/oembed";
const OEMBED_TIMEOUT: Duration = Duration::from_secs(5);
const USER_AGENT: &str = "Mozilla/5.0";

static VIDEO_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:v=|/v/|youtu\.be/)([a-zA-Z0-9_-]{11})",
        r"(?:embed/)([a-zA-Z0-9_-]{11})",
        r"(?:shorts/)([a-zA-Z0-9_-]{11})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static SUPPORTED_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(https?://)?(www\.)?(",
        r"youtube\.com/watch\?v=|youtu\.be/|youtube\.com/shorts/|",
        r"twitch\.tv/|twitter\.com/|x\.com/|vimeo\.com/|dailymotion\.com/",
        r")"
    ))
    .unwrap()
});

/// Preview data shown before a download is confirmed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub id: Option<String>,
    pub webpage_url: Option<String>,
    pub thumbnail: Option<String>,
    pub duration_string: Option<String>,
}

impl Metadata {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Unknown")
    }
}

/// Subset of the oEmbed response we use
#[derive(Debug, Deserialize)]
struct OEmbed {
    title: Option<String>,
    author_name: Option<String>,
}

impl OEmbed {
    fn into_metadata(self, url: &str) -> Metadata {
        let id = extract_video_id(url);
        let thumbnail = id
            .as_ref()
            .map(|id| format!("https://i.ytimg.com/vi/{}/mqdefault.jpg", id));

        Metadata {
            title: Some(self.title.unwrap_or_else(|| "Unknown".to_string())),
            uploader: self.author_name,
            id,
            webpage_url: Some(url.to_string()),
            thumbnail,
            duration_string: None,
        }
    }
}

pub fn is_youtube(url: &str) -> bool {
    url.contains("youtube.com") || url.contains("youtu.be")
}

/// Hosts the front-end accepts without asking
pub fn is_supported_url(url: &str) -> bool {
    SUPPORTED_URL.is_match(url)
}

/// 11-character YouTube video id, if the URL carries one
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(url))
        .map(|caps| caps[1].to_string())
}

/// Fetch preview metadata, oEmbed first for YouTube
pub async fn fetch(url: &str, tool: &ToolPaths, config: &JobConfig) -> Result<Metadata> {
    if is_youtube(url) {
        let started = Instant::now();
        match fetch_oembed(url).await {
            Ok(metadata) => {
                log::info!("oEmbed fetch: {:.2}s", started.elapsed().as_secs_f32());
                return Ok(metadata);
            }
            Err(e) => log::warn!("oEmbed failed, falling back to yt-dlp: {:#}", e),
        }
    }

    let started = Instant::now();
    let metadata = fetch_with_tool(url, tool, config).await?;
    log::info!("yt-dlp metadata fetch: {:.2}s", started.elapsed().as_secs_f32());
    Ok(metadata)
}

async fn fetch_oembed(url: &str) -> Result<Metadata> {
    let client = reqwest::Client::builder()
        .timeout(OEMBED_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()?;

    let oembed: OEmbed = client
        .get(OEMBED_ENDPOINT)
        .query(&[("url", url), ("format", "json")])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(oembed.into_metadata(url))
}

/// `yt-dlp --dump-json` for a single item
pub async fn fetch_with_tool(url: &str, tool: &ToolPaths, config: &JobConfig) -> Result<Metadata> {
    let mut cmd = tokio::process::Command::new(&tool.ytdlp);
    cmd.args(build_metadata_args(config, url))
        .envs(child_env(config))
        .stdin(Stdio::null())
        .kill_on_drop(true);
    #[cfg(windows)]
    cmd.creation_flags(0x0800_0000);

    let output = cmd
        .output()
        .await
        .with_context(|| format!("launching {}", tool.ytdlp.display()))?;

    if !output.status.success() {
        anyhow::bail!(
            "yt-dlp error: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    parse_dump(&output.stdout)
}

/// Parse the first JSON document of a `--dump-json` run
fn parse_dump(stdout: &[u8]) -> Result<Metadata> {
    let text = String::from_utf8_lossy(stdout);
    let first = text
        .lines()
        .find(|l| !l.trim().is_empty())
        .context("yt-dlp printed no metadata")?;
    Ok(serde_json::from_str(first)?)
}
