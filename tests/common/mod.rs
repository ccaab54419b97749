//! In-memory media engine used by the integration tests.
//!
//! Commands are simulated by composing the input bytes, so a test can tell
//! from an output exactly which inputs and stages produced it.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use vidmark::config::PipelineConfig;
use vidmark::engine::MediaEngine;
use vidmark::error::{Result, VidmarkError};

#[derive(Default)]
pub struct FakeEngine {
    files: Mutex<HashMap<String, Vec<u8>>>,
    execs: Mutex<Vec<Vec<String>>>,
    loads: AtomicUsize,
    writes: AtomicUsize,
    unavailable: bool,
    fail_on: Option<String>,
    delay: Duration,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine whose host cannot run it
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Reject any command containing an argument that includes `needle`
    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: Some(needle.to_string()),
            ..Self::default()
        }
    }

    /// Suspend inside every load, write and exec so concurrent jobs interleave
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn execs(&self) -> Vec<Vec<String>> {
        self.execs.lock().unwrap().clone()
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(name).cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.file(name)
            .ok_or_else(|| VidmarkError::Engine(format!("{}: No such file or directory", name)))
    }

    fn simulate(&self, args: &[String]) -> Result<(String, Vec<u8>)> {
        let inputs: Vec<&String> = args
            .windows(2)
            .filter(|pair| pair[0] == "-i")
            .map(|pair| &pair[1])
            .collect();
        let output = args
            .last()
            .ok_or_else(|| VidmarkError::Engine("missing output".to_string()))?;
        let primary = inputs
            .first()
            .ok_or_else(|| VidmarkError::Engine("missing input".to_string()))?;

        let mut data = self.read(primary)?;
        if let Some(filter) = value_after(args, "-filter_complex") {
            if !filter.contains("overlay=") {
                return Err(VidmarkError::Engine("no overlay in filter graph".to_string()));
            }
            if let Some(key) = unknown_mixer_option(filter) {
                return Err(VidmarkError::Engine(format!(
                    "Option '{}' not found for colorchannelmixer",
                    key
                )));
            }
            let watermark = inputs
                .get(1)
                .ok_or_else(|| VidmarkError::Engine("missing overlay input".to_string()))?;
            append_layer(&mut data, "wm", &self.read(watermark)?);
        } else if let Some(filter) = value_after(args, "-vf") {
            let track = filter
                .strip_prefix("subtitles=")
                .ok_or_else(|| VidmarkError::Engine(format!("unknown filter {}", filter)))?;
            append_layer(&mut data, "burn", &self.read(track)?);
        } else if value_after(args, "-c:s").is_some() {
            let track = inputs
                .get(1)
                .ok_or_else(|| VidmarkError::Engine("missing subtitle input".to_string()))?;
            append_layer(&mut data, "soft", &self.read(track)?);
        }

        Ok((output.clone(), data))
    }
}

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a String> {
    args.windows(2).find(|pair| pair[0] == flag).map(|pair| &pair[1])
}

/// First colorchannelmixer option ffmpeg would not recognize
fn unknown_mixer_option(filter: &str) -> Option<String> {
    const CHANNELS: [char; 4] = ['r', 'g', 'b', 'a'];
    let mixer = filter
        .split(&[',', '[', ';'][..])
        .find_map(|part| part.strip_prefix("colorchannelmixer="))?;

    mixer
        .split(':')
        .filter_map(|option| option.split_once('=').map(|(key, _)| key))
        .find(|key| {
            let mut chars = key.chars();
            let known = match (chars.next(), chars.next(), chars.next()) {
                (Some(a), Some(b), None) => {
                    (CHANNELS.contains(&a) && CHANNELS.contains(&b)) || *key == "pc" || *key == "pa"
                }
                _ => false,
            };
            !known
        })
        .map(str::to_string)
}

fn append_layer(data: &mut Vec<u8>, tag: &str, layer: &[u8]) {
    data.extend_from_slice(format!("+{}(", tag).as_bytes());
    data.extend_from_slice(layer);
    data.push(b')');
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn load(&self) -> Result<()> {
        self.pause().await;
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(VidmarkError::EngineUnavailable("no wasm host".to_string()));
        }
        Ok(())
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        self.pause().await;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.files.lock().unwrap().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        self.file(name)
            .ok_or_else(|| VidmarkError::MissingOutput(name.to_string()))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        self.files.lock().unwrap().remove(name);
        Ok(())
    }

    async fn exec(&self, args: &[String]) -> Result<()> {
        self.execs.lock().unwrap().push(args.to_vec());

        if let Some(needle) = &self.fail_on {
            if args.iter().any(|arg| arg.contains(needle.as_str())) {
                return Err(VidmarkError::Engine(format!("rejected command near {}", needle)));
            }
        }

        // Inputs are read before suspending and the output lands after it,
        // like a real transcode that takes time.
        let (output, data) = self.simulate(args)?;
        self.pause().await;
        self.files.lock().unwrap().insert(output, data);
        Ok(())
    }
}

pub fn pipeline_config(output_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        output_dir: Some(output_dir.to_path_buf()),
        ..PipelineConfig::default()
    }
}

/// Bytes the fake engine produces for a watermark stage
pub fn watermarked(source: &[u8], image: &[u8]) -> Vec<u8> {
    let mut data = source.to_vec();
    append_layer(&mut data, "wm", image);
    data
}

/// Bytes the fake engine produces for a burn-in stage
pub fn burned(source: &[u8], track: &[u8]) -> Vec<u8> {
    let mut data = source.to_vec();
    append_layer(&mut data, "burn", track);
    data
}

/// Bytes the fake engine produces for a soft-embed stage
pub fn embedded(source: &[u8], track: &[u8]) -> Vec<u8> {
    let mut data = source.to_vec();
    append_layer(&mut data, "soft", track);
    data
}
