use thiserror::Error;

use crate::media::StageKind;

#[derive(Error, Debug)]
pub enum VidmarkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Media engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Failed to write virtual file {name}: {reason}")]
    WriteFailure { name: String, reason: String },

    #[error("Virtual file not found: {0}")]
    MissingOutput(String),

    #[error("{stage} stage failed: {source}")]
    StageExecutionFailure {
        stage: StageKind,
        #[source]
        source: Box<VidmarkError>,
    },

    #[error("No source video provided")]
    NoInputProvided,

    #[error("Invalid processing options: {0}")]
    InvalidOptions(String),

    #[error("Invalid stage plan: {0}")]
    InvalidStagePlan(String),

    #[error("Media engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, VidmarkError>;
