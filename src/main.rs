//! Media Uploadr - resilient media upload client
//!
//! Uploads, deletes and probes from the command line using the library
//! pipeline.

use anyhow::Context;
use clap::{Parser, Subcommand};
use media_uploadr::{config::Config, logging, metrics, SourceFile, Uploader};
use std::path::PathBuf;
use tracing::info;

/// Media Uploadr - upload images to object storage with fallback strategies
#[derive(Parser, Debug)]
#[command(name = "media-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print Prometheus metrics to stderr when done
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file and print its public URL
    Upload {
        /// File to upload
        #[arg(short, long)]
        file: PathBuf,

        /// Logical path the destination is derived from (e.g. "avatars/42")
        #[arg(short, long)]
        path: String,

        /// Compression quality (1-100)
        #[arg(short, long)]
        quality: Option<u8>,

        /// Attempts per strategy
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Delete an uploaded file by URL
    Delete {
        /// URL returned by a previous upload
        url: String,
    },

    /// Check connectivity and print a JSON diagnostic report
    Probe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

    logging::init_logging(&config.logging, args.log_level.as_deref())?;
    info!("Starting Media Uploadr v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from {:?}", args.config);

    let uploader = Uploader::from_config(&config)?;

    let result = run(&uploader, args.command).await;

    if args.print_metrics && config.metrics.enabled {
        eprintln!("{}", metrics::gather_text());
    }

    result
}

async fn run(uploader: &Uploader, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Upload {
            file,
            path,
            quality,
            max_retries,
        } => {
            let source = SourceFile::from_path(&file)
                .await
                .with_context(|| format!("Failed to read {:?}", file))?;

            let mut policy = uploader.policy().clone();
            if let Some(quality) = quality {
                policy.compression_quality = quality;
            }
            if let Some(max_retries) = max_retries {
                policy.max_retries = max_retries;
            }
            policy.validate()?;

            let request = uploader.request(source, path).with_policy(policy);
            let url = uploader.upload(request).await?;
            println!("{url}");
        }
        Command::Delete { url } => {
            uploader.delete_asset(&url).await?;
        }
        Command::Probe => {
            let report = uploader.probe_connection().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
