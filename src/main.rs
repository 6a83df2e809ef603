//! dlqueue CLI entry point

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use dlqueue::core::TOOL_LOG_TARGET;
use dlqueue::{
    metadata, App, Event, EventKind, JobConfig, Payload, Quality, Settings, TaskView, ToolPaths,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dlqueue", version, about = "Run several yt-dlp downloads side by side")]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one or more URLs concurrently
    Get(GetArgs),
    /// Show title, uploader and thumbnail for a URL
    Info {
        url: String,
        /// Print the metadata as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the settings file path and its resolved contents
    Config,
}

#[derive(Args)]
struct GetArgs {
    #[arg(required = true)]
    urls: Vec<String>,

    /// Extract audio only (mp3)
    #[arg(long)]
    audio_only: bool,

    /// Quality preset
    #[arg(long, value_enum, conflicts_with = "format")]
    quality: Option<Quality>,

    /// Raw yt-dlp format selector
    #[arg(long)]
    format: Option<String>,

    /// Skip the media download (thumbnail only)
    #[arg(long)]
    no_video: bool,

    #[arg(long)]
    save_thumbnail: bool,

    #[arg(long)]
    embed_thumbnail: bool,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// yt-dlp output template, relative to the output directory
    #[arg(long)]
    naming_pattern: Option<String>,

    /// Automatic retries for a failed download
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Print every event as a JSON line
    #[arg(long)]
    json: bool,

    /// Also print unclassified tool output
    #[arg(short, long)]
    verbose: bool,
}

impl GetArgs {
    fn job_config(&self, settings: &Settings) -> Result<JobConfig> {
        if self.no_video && !self.save_thumbnail {
            bail!("Select at least one of video or thumbnail (drop --no-video or add --save-thumbnail)");
        }

        let mut config = JobConfig::from_settings(settings);
        config.download_video = !self.no_video;
        config.audio_only = self.audio_only;
        config.save_thumbnail = self.save_thumbnail;
        config.embed_thumbnail = self.embed_thumbnail;

        if let Some(quality) = self.quality {
            config.format_selector = Some(quality.format_selector().to_string());
        } else if let Some(format) = &self.format {
            config.format_selector = Some(format.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(pattern) = &self.naming_pattern {
            config.output_template = pattern.clone();
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Settings::default_path);
    let settings = Settings::load_or_default(&config_path);

    match cli.command {
        Commands::Get(args) => get(&settings, &args).await,
        Commands::Info { url, json } => info(&settings, &url, json).await,
        Commands::Config => {
            println!("# {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

async fn get(settings: &Settings, args: &GetArgs) -> Result<()> {
    let config = args.job_config(settings)?;
    let mut app = App::new(ToolPaths::from_settings(settings)).with_retries(args.retries);

    let mut launch_errors = 0;
    for url in &args.urls {
        if !metadata::is_supported_url(url) {
            log::warn!("{} is not a known host, passing it to yt-dlp anyway", url);
        }
        match app.submit(url, config.clone()) {
            Ok(id) => log::info!("Queued {} as {}", url, id.short()),
            Err(e) => {
                eprintln!("{}: {}", url, e);
                launch_errors += 1;
            }
        }
    }

    if launch_errors == args.urls.len() {
        bail!("No download could be started");
    }

    let json = args.json;
    let verbose = args.verbose;
    let summary = app
        .run(|event, view| {
            if json {
                println!("{}", event.to_json_line());
            } else {
                render(event, view, verbose);
            }
        })
        .await;

    log::info!(
        "{} completed, {} cancelled, {} failed",
        summary.completed,
        summary.cancelled,
        summary.failed
    );

    if launch_errors > 0 || !summary.all_completed() {
        bail!(
            "{} of {} download(s) did not complete",
            launch_errors + summary.cancelled + summary.failed,
            args.urls.len()
        );
    }
    Ok(())
}

fn render(event: &Event, view: &TaskView, verbose: bool) {
    let tag = view.id.short();
    match (&event.kind, &event.payload) {
        (EventKind::Progress, Payload::Progress(p)) => {
            println!("[{}] {:>7}  ETA {:>8}  {}", tag, p.percent, p.eta, p.speed);
        }
        (EventKind::Status, Payload::Text(text)) => println!("[{}] {}", tag, text),
        (EventKind::Error, Payload::Text(text)) => eprintln!("[{}] Error: {}", tag, text),
        (EventKind::Log, Payload::Text(text)) => {
            if verbose {
                println!("[{}] {}", tag, text);
            } else {
                log::trace!(target: TOOL_LOG_TARGET, "[{}] {}", tag, text);
            }
        }
        _ => {}
    }
}

async fn info(settings: &Settings, url: &str, json: bool) -> Result<()> {
    let tool = ToolPaths::from_settings(settings);
    let config = JobConfig::from_settings(settings);
    let metadata = metadata::fetch(url, &tool, &config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    println!("Title:     {}", metadata.display_title());
    if let Some(uploader) = &metadata.uploader {
        println!("Uploader:  {}", uploader);
    }
    if let Some(duration) = &metadata.duration_string {
        println!("Duration:  {}", duration);
    }
    if let Some(thumbnail) = &metadata.thumbnail {
        println!("Thumbnail: {}", thumbnail);
    }
    Ok(())
}
