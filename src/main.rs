//! Vidmark - Watermark and Subtitle Processing Core
//!
//! Command line entry point: applies watermarks and subtitles to videos
//! through an ffmpeg engine.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vidmark::cli::{Args, Commands};
use vidmark::config::Config;
use vidmark::engine::{EngineLoader, FfmpegEngine};
use vidmark::media::{JobEvent, SubtitleMode};
use vidmark::workflow::{ProcessingRequest, Workflow};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;
    info!("Starting Vidmark");

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Process {
            input,
            watermark,
            subtitles,
            placement,
            subtitle_mode,
            output,
        } => {
            let mut request = ProcessingRequest::new(read_input(&input).await?);
            if let Some(path) = watermark {
                request = request.with_watermark(read_input(&path).await?, placement.options());
            }
            if let Some(path) = subtitles {
                request = request.with_subtitles(read_input(&path).await?, subtitle_mode.into());
            }

            let workflow = Workflow::new(&config);
            let (tx, rx) = mpsc::unbounded_channel();
            let spinner = tokio::spawn(show_progress(rx));

            let result = workflow.process_with_events(request, Some(tx)).await;
            let _ = spinner.await;
            let artifact = result?;

            let location = match output {
                Some(dest) => artifact.persist(dest).await?,
                None => artifact.path.clone(),
            };
            println!("Output: {}", location.display());

            if let Some(record) = workflow.history().first() {
                println!("{}", serde_json::to_string_pretty(record)?);
            }
        }
        Commands::Batch {
            input_dir,
            output_dir,
            watermark,
            placement,
            subtitle_mode,
        } => {
            let image = match &watermark {
                Some(path) => Some(read_input(path).await?),
                None => None,
            };
            let watermark = image.as_deref().map(|data| (data, placement.options()));

            let workflow = Workflow::new(&config);
            let summary = workflow
                .process_directory(&input_dir, &output_dir, watermark, SubtitleMode::from(subtitle_mode))
                .await?;

            println!("Processed {} file(s)", summary.processed.len());
            for path in &summary.processed {
                println!("  {}", path.display());
            }
            if !summary.failed.is_empty() {
                println!("Failed {} file(s)", summary.failed.len());
                for (path, error) in &summary.failed {
                    println!("  {}: {}", path.display(), error);
                }
            }
        }
        Commands::Filter { placement } => {
            let options = placement.options();
            options.validate()?;
            println!("{}", options.filter());
        }
        Commands::Check => {
            let engine = Arc::new(FfmpegEngine::new(config.engine.clone()));
            let version = engine.version_info().await?;
            let loader = EngineLoader::new(engine.clone());
            loader.ensure_loaded().await?;

            println!("Engine: {}", version);
            if let Some(dir) = engine.workspace_dir() {
                println!("Workspace: {}", dir.display());
            }
            println!("State: {:?}", loader.state());
        }
        Commands::InitConfig { path } => {
            write_default_config(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}

async fn read_input(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    Config::default().save_to_file(path)?;
    Ok(())
}

/// Drive a spinner from the job's own events until the sender is dropped
async fn show_progress(mut rx: mpsc::UnboundedReceiver<JobEvent>) {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message("Loading engine");

    while let Some(event) = rx.recv().await {
        match event {
            JobEvent::EngineReady => spinner.set_message("Staging input"),
            JobEvent::InputStaged { bytes } => {
                spinner.set_message(format!("Staged {} bytes", bytes))
            }
            JobEvent::StageStarted(stage) => spinner.set_message(format!("Running {}", stage)),
            JobEvent::StageFinished(stage) => spinner.println(format!("✓ {}", stage)),
            JobEvent::Completed => spinner.set_message("Done"),
        }
    }

    spinner.finish_and_clear();
}

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = std::env::current_dir()?.join(".vidmark").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "vidmark.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("vidmark.log").display());

    Ok(())
}
