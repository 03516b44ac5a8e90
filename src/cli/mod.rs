use crate::config::Config;
use crate::core::{
    DownloadOutcome, FileSink, Format, FormatInfo, OutputFormat, SessionController,
    TransportClient,
};
use crate::utils::{format_duration, format_size_mb, partition_formats, preferred_format};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "ytfetch")]
#[command(about = "Fetch formats from a media-extraction backend and download them")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend address, e.g. http://localhost:8000
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Origin the client is served from; the backend is assumed on the same host
    #[arg(long, global = true)]
    pub origin: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check whether the backend is reachable
    Health,

    /// List the formats available for a video
    Formats {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Download one format of a video
    Download {
        #[arg(value_name = "URL")]
        url: String,

        /// Format to download (defaults to the best muxed video or audio stream)
        #[arg(short, long)]
        format_id: Option<String>,

        /// Extract audio as mp3 instead of saving mp4
        #[arg(short, long)]
        audio: bool,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Search for videos
    Search {
        #[arg(value_name = "QUERY")]
        query: String,

        /// Number of results to request
        #[arg(short = 'n', long)]
        max_results: Option<u32>,
    },

    /// Show statistics for a video id
    Info {
        #[arg(value_name = "VIDEO_ID")]
        video_id: String,
    },
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(api_url) = &self.api_url {
            config.api_url = Some(api_url.clone());
        }
        if let Some(origin) = &self.origin {
            config.page_origin = Some(origin.clone());
        }
        if let Command::Download {
            output: Some(output),
            ..
        } = &self.command
        {
            config.output_dir = output.clone();
        }
        Ok(config)
    }

    pub async fn run(&self) -> Result<()> {
        let config = self.load_config()?;
        let backend = config.backend_url()?;
        info!("Using backend at {}", backend);

        let transport = TransportClient::new(&backend, &config)?;
        let sink = Arc::new(FileSink::new(config.output_dir.clone()));
        let controller = Arc::new(SessionController::new(transport, sink));

        match &self.command {
            Command::Health => {
                if controller.check_health().await {
                    println!("Backend at {} is healthy", controller.transport().address());
                } else {
                    println!("Backend at {} is not responding", controller.transport().address());
                }
                Ok(())
            }
            Command::Formats { url } => {
                ensure_backend(&controller).await;
                controller.fetch_formats(url).await?;
                print_session(&controller);
                Ok(())
            }
            Command::Download {
                url,
                format_id,
                audio,
                ..
            } => {
                let output_format = if *audio {
                    OutputFormat::Mp3
                } else {
                    OutputFormat::Mp4
                };
                ensure_backend(&controller).await;
                download(&controller, url, format_id.as_deref(), output_format).await
            }
            Command::Search { query, max_results } => {
                let max_results = config.search_limit(*max_results);
                search(&controller, query, max_results).await
            }
            Command::Info { video_id } => info_for(&controller, video_id).await,
        }
    }
}

async fn ensure_backend(controller: &SessionController) {
    if !controller.check_health().await {
        println!(
            "Warning: the backend at {} is not responding. Start the backend service first.",
            controller.transport().address()
        );
    }
}

fn print_session(controller: &SessionController) {
    let state = controller.session_state();
    if let Some(info) = &state.video_info {
        println!("Title: {}", info.title.as_deref().unwrap_or("Unknown"));
        if let Some(duration) = info.duration {
            println!("Duration: {}", format_duration(duration));
        }
        if info.is_live {
            println!("Live stream");
        }
        if info.age_restricted {
            println!("Age restricted");
        }
    }

    println!(
        "{} format{} available",
        state.formats.len(),
        if state.formats.len() == 1 { "" } else { "s" }
    );

    let (video, audio) = partition_formats(&state.formats);
    println!("Video ({}):", video.len());
    for format in video {
        print_format(format);
    }
    println!("Audio ({}):", audio.len());
    for format in audio {
        print_format(format);
    }
}

fn print_format(format: &Format) {
    let mut line = format!(
        "  {:>6}  {:<8} {:<5} {:<14} {:<14} ~{}",
        format.format_id,
        format.quality_label(),
        format.ext,
        format.type_label(),
        format.codec_label(),
        format_size_mb(format.estimated_size_mb)
    );
    if let Some(fps) = format.fps {
        line.push_str(&format!("  {} fps", fps));
    }
    if let (Some(width), Some(height)) = (format.width, format.height) {
        line.push_str(&format!("  {}x{}", width, height));
    }
    println!("{}", line);
}

async fn download(
    controller: &Arc<SessionController>,
    url: &str,
    format_id: Option<&str>,
    output_format: OutputFormat,
) -> Result<()> {
    controller.fetch_formats(url).await?;
    let state = controller.session_state();

    let format = match format_id {
        Some(id) => state.find_format(id),
        None => preferred_format(&state.formats, output_format),
    };
    let format_id = match (format_id, format) {
        (Some(id), _) => id.to_string(),
        (None, Some(format)) => format.format_id.clone(),
        (None, None) => anyhow::bail!("No suitable format found"),
    };
    let format_info = format.map(FormatInfo::from);
    if let Some(info) = &format_info {
        println!("Downloading {} ({}, {})", info.quality, info.codec, info.format_type);
    }

    let cancel_on_interrupt = {
        let controller = Arc::clone(controller);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                controller.cancel_download();
            }
        })
    };
    let render_progress = {
        let mut updates = controller.subscribe_download();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let state = updates.borrow_and_update().clone();
                if state.loading {
                    print!("\rProgress: {:.1}%", state.progress);
                    let _ = std::io::stdout().flush();
                }
            }
        })
    };

    let result = controller
        .download(url, &format_id, output_format, format_info)
        .await;
    cancel_on_interrupt.abort();
    render_progress.abort();
    println!();

    match result? {
        DownloadOutcome::Saved(path) => println!("Saved to {}", path.display()),
        DownloadOutcome::Cancelled => println!("Download cancelled"),
    }
    Ok(())
}

async fn search(controller: &SessionController, query: &str, max_results: u32) -> Result<()> {
    if query.trim().is_empty() {
        anyhow::bail!("Please enter a search query");
    }
    let response = controller.transport().search(query, max_results).await?;
    if !response.success {
        anyhow::bail!(response.error.unwrap_or_else(|| "No results found".to_string()));
    }
    debug!("Search returned {} videos", response.videos.len());

    if response.videos.is_empty() {
        println!("No results found");
    }
    for (i, video) in response.videos.iter().enumerate() {
        println!("{:>2}. {} - {}", i + 1, video.title, video.channel);
        println!("    {}", video.url);
    }
    Ok(())
}

async fn info_for(controller: &SessionController, video_id: &str) -> Result<()> {
    let details = controller.transport().video_details(video_id).await?;
    if !details.success {
        anyhow::bail!(details
            .error
            .unwrap_or_else(|| "Failed to fetch details".to_string()));
    }
    if let Some(title) = &details.title {
        println!("Title: {}", title);
    }
    println!("Duration: {}", format_duration(details.duration.unwrap_or(0)));
    if let Some(views) = details.views {
        println!("Views: {}", views);
    }
    if let Some(likes) = details.likes {
        println!("Likes: {}", likes);
    }
    Ok(())
}
