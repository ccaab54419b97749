use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, VidmarkError};

fn default_global_args() -> Vec<String> {
    vec!["-y".to_string(), "-nostdin".to_string(), "-hide_banner".to_string()]
}

fn default_subtitle_language() -> String {
    "tur".to_string()
}

fn default_history_limit() -> usize {
    100
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Arguments placed before every stage's own argument list.
    /// Stages reuse fixed output names, so overwriting must stay non-interactive.
    #[serde(default = "default_global_args")]
    pub global_args: Vec<String>,
    /// Parent directory for the engine's private workspace (system temp dir when unset)
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobIsolation {
    /// Serialized: one job at a time holds the engine, using the canonical file names
    #[default]
    Serialized,
    /// Namespaced: every job prefixes its virtual files with its own ID and may overlap others
    Namespaced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// How concurrent jobs are kept from clobbering each other's virtual files
    #[serde(default)]
    pub isolation: JobIsolation,
    /// Keep a successful job's virtual files in the engine workspace.
    /// Files of failed jobs are always kept for inspection.
    #[serde(default)]
    pub retain_intermediates: bool,
    /// Directory receiving finished artifacts (system temp dir when unset)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// ISO 639-2 language tag written on soft-embedded subtitle tracks
    #[serde(default = "default_subtitle_language")]
    pub subtitle_language: String,
    /// Most recent job records kept in the processing history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            global_args: default_global_args(),
            workspace_root: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            isolation: JobIsolation::default(),
            retain_intermediates: false,
            output_dir: None,
            subtitle_language: default_subtitle_language(),
            history_limit: default_history_limit(),
        }
    }
}

impl PipelineConfig {
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VidmarkError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| VidmarkError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VidmarkError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| VidmarkError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            isolation = "namespaced"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.isolation, JobIsolation::Namespaced);
        assert_eq!(config.pipeline.subtitle_language, "tur");
        assert_eq!(config.pipeline.history_limit, 100);
        assert_eq!(config.engine.binary_path, "ffmpeg");
        assert!(config.engine.global_args.contains(&"-y".to_string()));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.pipeline.retain_intermediates = true;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert!(loaded.pipeline.retain_intermediates);
        assert_eq!(loaded.pipeline.isolation, JobIsolation::Serialized);
    }

    #[test]
    fn test_unknown_isolation_is_rejected() {
        let err = toml::from_str::<Config>("[pipeline]\nisolation = \"shared\"\n");
        assert!(err.is_err());
    }
}
