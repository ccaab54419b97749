//! Filter graph and argument list construction.
//!
//! Everything here is pure: the functions only turn options and virtual file
//! names into the argument lists handed to the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::MediaCommand;
use crate::error::{Result, VidmarkError};

/// Margin in pixels between a corner-anchored watermark and the frame edge
const EDGE_MARGIN: u32 = 10;

/// Stream label of the prepared watermark inside the filter graph
const WATERMARK_LABEL: &str = "watermark";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

impl WatermarkPosition {
    pub const ALL: [WatermarkPosition; 5] = [
        WatermarkPosition::TopLeft,
        WatermarkPosition::TopRight,
        WatermarkPosition::BottomLeft,
        WatermarkPosition::BottomRight,
        WatermarkPosition::Center,
    ];

    /// Parse a position name. Unrecognized names resolve to bottom-right.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "top-left" => Self::TopLeft,
            "top-right" => Self::TopRight,
            "bottom-left" => Self::BottomLeft,
            "center" => Self::Center,
            _ => Self::BottomRight,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
            Self::Center => "center",
        }
    }

    /// Overlay expression anchoring the watermark (`w`/`h`) inside the frame (`W`/`H`)
    pub fn overlay(&self) -> String {
        let m = EDGE_MARGIN;
        match self {
            Self::TopLeft => format!("overlay={m}:{m}"),
            Self::TopRight => format!("overlay=W-w-{m}:{m}"),
            Self::BottomLeft => format!("overlay={m}:H-h-{m}"),
            Self::BottomRight => format!("overlay=W-w-{m}:H-h-{m}"),
            Self::Center => "overlay=(W-w)/2:(H-h)/2".to_string(),
        }
    }
}

impl From<String> for WatermarkPosition {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl fmt::Display for WatermarkPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_opacity() -> u8 {
    100
}

/// Watermark placement collected by the upload form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct WatermarkOptions {
    #[serde(default)]
    pub position: WatermarkPosition,
    /// 0 is fully transparent, 100 fully opaque
    #[serde(default = "default_opacity")]
    pub opacity_percent: u8,
    /// Watermark width relative to its own width, in percent
    #[serde(default)]
    pub size_percent: Option<u8>,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            position: WatermarkPosition::default(),
            opacity_percent: default_opacity(),
            size_percent: None,
        }
    }
}

impl WatermarkOptions {
    pub fn validate(&self) -> Result<()> {
        if self.opacity_percent > 100 {
            return Err(VidmarkError::InvalidOptions(format!(
                "opacity must be within 0-100, got {}",
                self.opacity_percent
            )));
        }
        if let Some(size) = self.size_percent {
            if size > 100 {
                return Err(VidmarkError::InvalidOptions(format!(
                    "size must be within 0-100, got {}",
                    size
                )));
            }
        }
        Ok(())
    }

    pub fn filter(&self) -> String {
        build_watermark_filter(self.position, Some(self.opacity_percent), self.size_percent)
    }
}

/// How a subtitle track is merged into the video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleMode {
    /// Composite the text into the pixels (re-encode, irreversible)
    #[default]
    Burn,
    /// Store as a selectable mov_text track (stream copy, reversible)
    Embed,
}

/// Render a percentage as the shortest decimal fraction (`50` -> `0.5`, `100` -> `1`).
fn percent_fraction(percent: u8) -> String {
    format!("{}", f64::from(percent.min(100)) / 100.0)
}

/// Build the overlay filter graph compositing input 1 (watermark) over input 0 (video).
///
/// A missing opacity means fully opaque; a missing or zero size keeps the
/// watermark at its native width.
pub fn build_watermark_filter(
    position: WatermarkPosition,
    opacity_percent: Option<u8>,
    size_percent: Option<u8>,
) -> String {
    let alpha = percent_fraction(opacity_percent.unwrap_or(100));
    let scale = match size_percent.filter(|size| *size > 0) {
        Some(size) => format!("scale=iw*{}:-1,", percent_fraction(size)),
        None => String::new(),
    };

    format!(
        "[1:v]{scale}format=rgba,colorchannelmixer=aa={alpha}[{label}];[0:v][{label}]{overlay}",
        label = WATERMARK_LABEL,
        overlay = position.overlay(),
    )
}

pub fn build_watermark_args(
    input: &str,
    watermark: &str,
    options: &WatermarkOptions,
    output: &str,
) -> MediaCommand {
    MediaCommand::new("Watermark overlay")
        .input(input)
        .input(watermark)
        .filter_complex(options.filter())
        .copy_audio()
        .output(output)
}

/// Re-encode the video with the subtitle track rendered into the pixels.
pub fn build_subtitle_burn_args(input: &str, subtitles: &str, output: &str) -> MediaCommand {
    MediaCommand::new("Subtitle burn-in")
        .input(input)
        .video_filter(format!("subtitles={}", subtitles))
        .copy_audio()
        .output(output)
}

/// Mux the subtitle track as a container-level stream without touching the pixels.
pub fn build_subtitle_embed_args(
    input: &str,
    subtitles: &str,
    language: &str,
    output: &str,
) -> MediaCommand {
    MediaCommand::new("Subtitle embedding")
        .input(input)
        .input(subtitles)
        .copy_video()
        .copy_audio()
        .subtitle_codec("mov_text")
        .subtitle_language(language)
        .output(output)
}
