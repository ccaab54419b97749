//! Vidmark - Watermark and Subtitle Processing Core
//!
//! Accepts a source video plus an optional watermark image and subtitle
//! track, builds ffmpeg filter graphs, runs the processing stages inside a
//! media engine's private filesystem and hands back a playable artifact.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod media;
pub mod workflow;
