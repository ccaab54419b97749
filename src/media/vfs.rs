use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::engine::EngineLoader;
use crate::error::{Result, VidmarkError};

pub const INPUT_FILE: &str = "input.mp4";
pub const WATERMARK_FILE: &str = "watermark.png";
pub const SUBTITLE_FILE: &str = "subtitles.srt";
pub const WATERMARKED_OUTPUT: &str = "output_watermarked.mp4";
pub const BURNED_OUTPUT: &str = "output_burned_subtitles.mp4";
pub const EMBEDDED_OUTPUT: &str = "output_with_subtitles.mp4";

/// Virtual file names used by one job.
///
/// Canonical names are shared by every job on an engine, so two jobs using
/// them must never overlap. Namespaced names carry the job ID as a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFiles {
    prefix: Option<String>,
}

impl JobFiles {
    pub fn canonical() -> Self {
        Self { prefix: None }
    }

    pub fn namespaced(job_id: &Uuid) -> Self {
        Self {
            prefix: Some(job_id.simple().to_string()),
        }
    }

    fn name(&self, base: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, base),
            None => base.to_string(),
        }
    }

    pub fn input(&self) -> String {
        self.name(INPUT_FILE)
    }

    pub fn watermark(&self) -> String {
        self.name(WATERMARK_FILE)
    }

    pub fn subtitles(&self) -> String {
        self.name(SUBTITLE_FILE)
    }

    pub fn watermarked(&self) -> String {
        self.name(WATERMARKED_OUTPUT)
    }

    pub fn burned(&self) -> String {
        self.name(BURNED_OUTPUT)
    }

    pub fn embedded(&self) -> String {
        self.name(EMBEDDED_OUTPUT)
    }

    pub fn all(&self) -> Vec<String> {
        vec![
            self.input(),
            self.watermark(),
            self.subtitles(),
            self.watermarked(),
            self.burned(),
            self.embedded(),
        ]
    }
}

/// Copies buffers into and out of the engine's private filesystem.
///
/// Nothing is cleaned up implicitly: files stay until overwritten or removed.
pub struct VirtualFs {
    loader: Arc<EngineLoader>,
}

impl VirtualFs {
    pub fn new(loader: Arc<EngineLoader>) -> Self {
        Self { loader }
    }

    pub async fn stage(&self, name: &str, data: &[u8]) -> Result<()> {
        let handle = self.loader.handle().ok_or_else(|| VidmarkError::WriteFailure {
            name: name.to_string(),
            reason: "engine is not loaded".to_string(),
        })?;

        handle
            .engine()
            .write_file(name, data)
            .await
            .map_err(|e| VidmarkError::WriteFailure {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        debug!("Staged {} ({} bytes)", name, data.len());
        Ok(())
    }

    pub async fn retrieve(&self, name: &str) -> Result<Vec<u8>> {
        let handle = self
            .loader
            .handle()
            .ok_or_else(|| VidmarkError::MissingOutput(name.to_string()))?;

        let data = handle.engine().read_file(name).await?;
        debug!("Retrieved {} ({} bytes)", name, data.len());
        Ok(data)
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        match self.loader.handle() {
            Some(handle) => handle.engine().delete_file(name).await,
            None => Ok(()),
        }
    }
}
