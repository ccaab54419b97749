use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use super::MediaEngine;
use crate::config::EngineConfig;
use crate::error::{Result, VidmarkError};

/// Number of trailing stderr lines kept when ffmpeg rejects a command
const STDERR_TAIL_LINES: usize = 12;

/// ffmpeg-backed engine whose virtual filesystem is a private temporary directory.
///
/// Every command runs with that directory as its working directory, so
/// argument lists only ever reference flat relative names.
pub struct FfmpegEngine {
    config: EngineConfig,
    workspace: OnceLock<TempDir>,
}

impl FfmpegEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            workspace: OnceLock::new(),
        }
    }

    /// First line of `ffmpeg -version`
    pub async fn version_info(&self) -> Result<String> {
        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| VidmarkError::EngineUnavailable(format!(
                "Failed to execute {}: {}",
                self.config.binary_path, e
            )))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VidmarkError::EngineUnavailable(format!(
                "Version check failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or("Unknown version").to_string())
    }

    /// Private workspace directory, once loaded
    pub fn workspace_dir(&self) -> Option<PathBuf> {
        self.workspace.get().map(|dir| dir.path().to_path_buf())
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let workspace = self
            .workspace
            .get()
            .ok_or_else(|| VidmarkError::Engine("engine is not loaded".to_string()))?;

        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(VidmarkError::Engine(format!("invalid virtual file name: {:?}", name)));
        }

        Ok(workspace.path().join(name))
    }

    fn create_workspace(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("vidmark-engine-");

        let dir = match &self.config.workspace_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn load(&self) -> Result<()> {
        let version = self.version_info().await?;
        info!("Using {}", version);

        if self.workspace.get().is_none() {
            let dir = self.create_workspace()?;
            debug!("Engine workspace: {}", dir.path().display());
            // A concurrent load that won the race keeps its directory; ours is dropped.
            let _ = self.workspace.set(dir);
        }
        Ok(())
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(name)?;
        tokio::fs::write(&path, data).await?;
        debug!("Wrote {} bytes to {}", data.len(), name);
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(VidmarkError::MissingOutput(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exec(&self, args: &[String]) -> Result<()> {
        let workspace = self
            .workspace
            .get()
            .ok_or_else(|| VidmarkError::Engine("engine is not loaded".to_string()))?;

        debug!("Executing {} {:?} {:?}", self.config.binary_path, self.config.global_args, args);

        let output = Command::new(&self.config.binary_path)
            .args(&self.config.global_args)
            .args(args)
            .current_dir(workspace.path())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| VidmarkError::Engine(format!("Failed to execute ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(VidmarkError::Engine(format!(
                "ffmpeg exited with {}: {}",
                output.status, tail
            )));
        }

        Ok(())
    }
}
