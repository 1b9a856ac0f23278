use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedbrief::{
    Collaborators, FeedBrief, config::Config, models::SummaryLength, sources::StaticFeedSource,
};

#[derive(Parser)]
#[command(name = "feedbrief")]
#[command(version)]
#[command(about = "Article text extraction, streaming summaries and thumbnail caching")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "feedbrief.toml")]
    config: String,

    /// Cache directory (overrides config file)
    #[arg(short = 'd', long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a page, extract its readable text and cache it
    Extract { url: String },

    /// Stream a summary of an article
    Summarize {
        url: String,
        /// Multi-sentence summary instead of a single sentence
        #[arg(long)]
        long: bool,
        /// Text to summarize when the page yields none
        #[arg(long, value_name = "TEXT")]
        seed: Option<String>,
    },

    /// Download and cache a thumbnail image
    Thumbnail { url: String },

    /// Clear cached artifacts; without flags every cache is cleared
    ClearCache {
        #[arg(long)]
        summaries: bool,
        #[arg(long)]
        text: bool,
        #[arg(long)]
        thumbnails: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("feedbrief={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting feedbrief v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    let collaborators = Collaborators::from_config(&config, Arc::new(StaticFeedSource::new()))
        .await
        .context("failed to set up collaborators")?;
    let app = FeedBrief::open(&config, collaborators).await?;

    match cli.command {
        Command::Extract { url } => match app.fetch_text(&url).await? {
            Some(text) => println!("{text}"),
            None => warn!("No readable text found at {}", url),
        },
        Command::Summarize { url, long, seed } => {
            let length = if long {
                SummaryLength::Long
            } else {
                SummaryLength::Short
            };
            tokio::select! {
                printed = print_summary(&app, &url, length, seed) => {
                    if !printed? {
                        warn!("No summary produced for {}", url);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Summary cancelled");
                }
            }
        }
        Command::Thumbnail { url } => {
            if !app.cache_thumbnail(&url).await? {
                info!("Thumbnail not downloaded (already cached or unsupported)");
            }
            match app.get_thumbnail_with_color(&url) {
                Some((image, color)) => println!(
                    "{}x{} {} bytes, dominant color {}",
                    image.width,
                    image.height,
                    image.bytes.len(),
                    color.to_hex()
                ),
                None => warn!("No thumbnail cached for {}", url),
            }
        }
        Command::ClearCache {
            summaries,
            text,
            thumbnails,
        } => {
            let all = !(summaries || text || thumbnails);
            if all || summaries {
                app.clear_summaries();
                info!("Cleared summaries");
            }
            if all || text {
                app.clear_text_cache();
                info!("Cleared article text cache");
            }
            if all || thumbnails {
                app.clear_thumbnails();
                info!("Cleared thumbnail cache");
            }
        }
    }

    app.flush().await;
    Ok(())
}

/// Print the growing summary as it is revealed; true when anything was produced
async fn print_summary(
    app: &FeedBrief,
    url: &str,
    length: SummaryLength,
    seed: Option<String>,
) -> Result<bool> {
    let mut stream = app.summarize(url, length, seed);
    let mut stdout = std::io::stdout();
    let mut printed = String::new();

    while let Some(partial) = stream.next().await {
        match partial.strip_prefix(printed.as_str()) {
            Some(delta) => write!(stdout, "{delta}")?,
            // The full stage restarts from an empty string
            None => write!(stdout, "\n{partial}")?,
        }
        stdout.flush()?;
        printed = partial;
    }

    if !printed.is_empty() {
        writeln!(stdout)?;
    }
    Ok(!printed.is_empty())
}
