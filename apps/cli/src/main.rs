//! Relpost command line entry point.

mod config;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use relpost_pipeline::{Pipeline, PipelineConfig, PipelineEvent, PollConfig, format_post};

#[derive(Parser)]
#[command(name = "relpost", about = "Package, upload, and post release bundles")]
struct Cli {
    /// Seconds between upload status polls
    #[arg(long, default_value_t = 5)]
    poll_interval: u64,

    /// Give up after this many status polls (unbounded by default)
    #[arg(long)]
    max_polls: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Package files into the deterministically named archive
    Pack {
        /// Files to include
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Publish a cover image and print its URL
    Cover {
        /// Image to publish
        image: PathBuf,
    },
    /// Upload an archive to the file host and print the download URL
    Upload {
        /// Archive to upload
        archive: PathBuf,
    },
    /// Format the announcement post from two URLs
    Post {
        cover_url: String,
        archive_url: String,
    },
    /// Pack, publish the cover, upload, and print the finished post
    Publish {
        /// Cover image
        image: PathBuf,
        /// Files to include in the archive
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    // Log to stderr so stdout carries only the produced paths and URLs.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting relpost");

    let cli = Cli::parse();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Formatting needs no credentials or network.
    if let Command::Post {
        cover_url,
        archive_url,
    } = &cli.command
    {
        println!("{}", format_post(cover_url, archive_url));
        return Ok(());
    }

    let credentials = config::load()?;
    let mut pipeline_config = PipelineConfig::new(credentials);
    pipeline_config.poll = PollConfig {
        interval: Duration::from_secs(cli.poll_interval),
        max_attempts: cli.max_polls,
    };
    let mut pipeline = Pipeline::new(pipeline_config)?;

    if let Some(mut events) = pipeline.take_events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let PipelineEvent::Progress { action, status } = event {
                    eprintln!("[{action}] {status}");
                }
            }
        });
    }

    match cli.command {
        Command::Pack { files } => {
            let archive = pipeline.package_files(&files).await?;
            print_title(&files);
            println!("{}", archive.display());
        }
        Command::Cover { image } => {
            let url = pipeline.publish_cover(&image).await?;
            println!("{url}");
        }
        Command::Upload { archive } => {
            let url = pipeline.upload_archive(&archive).await?;
            println!("{url}");
        }
        Command::Publish { image, files } => {
            let archive = pipeline.package_files(&files).await?;
            print_title(&files);
            let cover_url = pipeline.publish_cover(&image).await?;
            let archive_url = pipeline.upload_archive(&archive).await?;
            println!("{}", format_post(&cover_url, &archive_url));
        }
        // Handled before pipeline construction.
        Command::Post { .. } => {}
    }

    Ok(())
}

/// Prints the human-readable title the archive name was derived from.
fn print_title(files: &[PathBuf]) {
    if let Some(label) = relpost_archive::archive_label(files) {
        eprintln!("title: {label}");
    }
}
