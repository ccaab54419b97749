use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use super::{
    build_subtitle_burn_args, build_subtitle_embed_args, build_watermark_args, JobFiles,
    MediaCommand, SubtitleMode, VirtualFs, WatermarkOptions,
};
use crate::engine::EngineHandle;
use crate::error::{Result, VidmarkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Watermark,
    SubtitleBurn,
    SubtitleEmbed,
}

impl StageKind {
    pub fn is_subtitle(&self) -> bool {
        matches!(self, Self::SubtitleBurn | Self::SubtitleEmbed)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Watermark => "watermark",
            Self::SubtitleBurn => "subtitle burn-in",
            Self::SubtitleEmbed => "subtitle embedding",
        })
    }
}

/// Progress notifications emitted while a job runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    EngineReady,
    InputStaged { bytes: usize },
    StageStarted(StageKind),
    StageFinished(StageKind),
    Completed,
}

pub(crate) fn notify(events: Option<&UnboundedSender<JobEvent>>, event: JobEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is watching.
        let _ = tx.send(event);
    }
}

/// One transformation step and the extra input it needs.
#[derive(Debug, Clone, Copy)]
pub enum Stage<'a> {
    Watermark {
        image: &'a [u8],
        options: WatermarkOptions,
    },
    Subtitles {
        track: &'a [u8],
        mode: SubtitleMode,
    },
}

impl Stage<'_> {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Watermark { .. } => StageKind::Watermark,
            Stage::Subtitles { mode: SubtitleMode::Burn, .. } => StageKind::SubtitleBurn,
            Stage::Subtitles { mode: SubtitleMode::Embed, .. } => StageKind::SubtitleEmbed,
        }
    }
}

/// Ordered stages of one job: at most one watermark, then at most one subtitle stage.
#[derive(Debug, Clone, Default)]
pub struct StagePlan<'a> {
    stages: Vec<Stage<'a>>,
}

impl<'a> StagePlan<'a> {
    /// Validate an explicit stage list. Subtitles must see the composited
    /// watermark, so a subtitle stage may never precede the watermark stage.
    pub fn new(stages: Vec<Stage<'a>>) -> Result<Self> {
        let kinds: Vec<StageKind> = stages.iter().map(Stage::kind).collect();

        let watermarks = kinds.iter().filter(|k| **k == StageKind::Watermark).count();
        let subtitles = kinds.iter().filter(|k| k.is_subtitle()).count();
        if watermarks > 1 || subtitles > 1 {
            return Err(VidmarkError::InvalidStagePlan(format!(
                "each stage may appear once, got {:?}",
                kinds
            )));
        }

        if let (Some(watermark), Some(subtitle)) = (
            kinds.iter().position(|k| *k == StageKind::Watermark),
            kinds.iter().position(|k| k.is_subtitle()),
        ) {
            if subtitle < watermark {
                return Err(VidmarkError::InvalidStagePlan(
                    "subtitles must run after the watermark".to_string(),
                ));
            }
        }

        Ok(Self { stages })
    }

    /// Plan for the optional inputs of a request, always in canonical order.
    pub fn from_inputs(
        watermark: Option<(&'a [u8], WatermarkOptions)>,
        subtitles: Option<(&'a [u8], SubtitleMode)>,
    ) -> Self {
        let mut stages = Vec::with_capacity(2);
        if let Some((image, options)) = watermark {
            stages.push(Stage::Watermark { image, options });
        }
        if let Some((track, mode)) = subtitles {
            stages.push(Stage::Subtitles { track, mode });
        }
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage<'a>] {
        &self.stages
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(Stage::kind).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Watermarking,
    Subtitling,
    Done,
    Failed(StageKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    /// Output of the last completed stage, or the input name when no stage ran
    pub final_name: String,
    pub completed: Vec<StageKind>,
}

/// Runs a stage plan against a loaded engine, threading each output into the next stage.
pub struct StageExecutor<'a> {
    handle: &'a EngineHandle,
    vfs: &'a VirtualFs,
    files: &'a JobFiles,
    subtitle_language: &'a str,
    events: Option<&'a UnboundedSender<JobEvent>>,
    state: JobState,
}

impl<'a> StageExecutor<'a> {
    pub fn new(
        handle: &'a EngineHandle,
        vfs: &'a VirtualFs,
        files: &'a JobFiles,
        subtitle_language: &'a str,
    ) -> Self {
        Self {
            handle,
            vfs,
            files,
            subtitle_language,
            events: None,
            state: JobState::Idle,
        }
    }

    pub fn with_events(mut self, events: Option<&'a UnboundedSender<JobEvent>>) -> Self {
        self.events = events;
        self
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Run every stage of `plan` starting from the already staged `input`.
    ///
    /// Files written before a failure are left in place.
    pub async fn run(&mut self, plan: &StagePlan<'_>, input: String) -> Result<StageOutcome> {
        let mut current = input;
        let mut completed = Vec::with_capacity(plan.stages().len());

        for stage in plan.stages() {
            let kind = stage.kind();
            self.state = if kind.is_subtitle() {
                JobState::Subtitling
            } else {
                JobState::Watermarking
            };
            notify(self.events, JobEvent::StageStarted(kind));
            info!("Running {} stage on {}", kind, current);

            match self.run_stage(stage, &current).await {
                Ok(output) => {
                    notify(self.events, JobEvent::StageFinished(kind));
                    completed.push(kind);
                    current = output;
                }
                Err(e) => {
                    warn!("{} stage failed: {}", kind, e);
                    self.state = JobState::Failed(kind);
                    return Err(e);
                }
            }
        }

        self.state = JobState::Done;
        Ok(StageOutcome {
            final_name: current,
            completed,
        })
    }

    async fn run_stage(&self, stage: &Stage<'_>, input: &str) -> Result<String> {
        let (extra_input, data, output, command) = match *stage {
            Stage::Watermark { image, options } => {
                let watermark = self.files.watermark();
                let output = self.files.watermarked();
                let command = build_watermark_args(input, &watermark, &options, &output);
                (watermark, image, output, command)
            }
            Stage::Subtitles { track, mode: SubtitleMode::Burn } => {
                let subtitles = self.files.subtitles();
                let output = self.files.burned();
                let command = build_subtitle_burn_args(input, &subtitles, &output);
                (subtitles, track, output, command)
            }
            Stage::Subtitles { track, mode: SubtitleMode::Embed } => {
                let subtitles = self.files.subtitles();
                let output = self.files.embedded();
                let command =
                    build_subtitle_embed_args(input, &subtitles, self.subtitle_language, &output);
                (subtitles, track, output, command)
            }
        };

        self.vfs.stage(&extra_input, data).await?;
        self.execute(stage.kind(), command).await?;
        Ok(output)
    }

    async fn execute(&self, kind: StageKind, command: MediaCommand) -> Result<()> {
        info!("Executing {}", command.description);
        self.handle
            .engine()
            .exec(&command.args)
            .await
            .map_err(|e| VidmarkError::StageExecutionFailure {
                stage: kind,
                source: Box::new(e),
            })
    }
}
