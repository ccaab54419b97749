use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::media::{SubtitleMode, WatermarkOptions, WatermarkPosition};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SubtitleModeArg {
    /// Render subtitles into the picture
    Burn,
    /// Add a selectable subtitle track
    Embed,
}

impl From<SubtitleModeArg> for SubtitleMode {
    fn from(value: SubtitleModeArg) -> Self {
        match value {
            SubtitleModeArg::Burn => SubtitleMode::Burn,
            SubtitleModeArg::Embed => SubtitleMode::Embed,
        }
    }
}

/// Watermark placement flags shared by several commands
#[derive(clap::Args, Clone, Debug)]
pub struct WatermarkArgs {
    /// Watermark position (top-left, top-right, bottom-left, bottom-right, center)
    #[arg(long, default_value = "bottom-right")]
    pub position: String,

    /// Watermark opacity in percent
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub opacity: u8,

    /// Watermark width in percent of its native width
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub size: Option<u8>,
}

impl WatermarkArgs {
    pub fn options(&self) -> WatermarkOptions {
        WatermarkOptions {
            position: WatermarkPosition::parse(&self.position),
            opacity_percent: self.opacity,
            size_percent: self.size,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply a watermark and/or subtitles to a single video
    Process {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Watermark image (PNG, JPEG or SVG)
        #[arg(short, long)]
        watermark: Option<PathBuf>,

        /// Subtitle file (.srt)
        #[arg(short, long)]
        subtitles: Option<PathBuf>,

        #[command(flatten)]
        placement: WatermarkArgs,

        /// How subtitles are merged into the video
        #[arg(long, value_enum, default_value = "burn")]
        subtitle_mode: SubtitleModeArg,

        /// Output video file (kept in the artifact directory when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Process all video files in a directory, using `<name>.srt` sidecars as subtitles
    Batch {
        /// Input directory containing video files
        #[arg(short, long)]
        input_dir: PathBuf,

        /// Output directory for processed files
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Watermark image applied to every video
        #[arg(short, long)]
        watermark: Option<PathBuf>,

        #[command(flatten)]
        placement: WatermarkArgs,

        /// How subtitles are merged into the video
        #[arg(long, value_enum, default_value = "burn")]
        subtitle_mode: SubtitleModeArg,
    },

    /// Print the watermark filter graph for the given placement
    Filter {
        #[command(flatten)]
        placement: WatermarkArgs,
    },

    /// Check that the media engine can be loaded
    Check,

    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        #[arg(default_value = "config.toml")]
        path: PathBuf,
    },
}
