use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::{Config, JobIsolation, PipelineConfig};
use crate::engine::{EngineLoader, FfmpegEngine, MediaEngine};
use crate::error::{Result, VidmarkError};
use crate::history::{JobFeatures, JobHistory, JobRecord};
use crate::media::stages::notify;
use crate::media::{
    JobEvent, JobFiles, StageExecutor, StagePlan, SubtitleMode, VirtualFs, WatermarkOptions,
};

const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mov", "mkv", "webm", "avi"];

/// A single processing job as submitted by the upload form.
#[derive(Debug, Clone, Default)]
pub struct ProcessingRequest {
    pub source_video: Vec<u8>,
    pub watermark_image: Option<Vec<u8>>,
    /// Defaults apply when a watermark image comes without options
    pub watermark_options: Option<WatermarkOptions>,
    pub subtitle_track: Option<Vec<u8>>,
    pub subtitle_mode: SubtitleMode,
}

impl ProcessingRequest {
    pub fn new(source_video: Vec<u8>) -> Self {
        Self {
            source_video,
            ..Self::default()
        }
    }

    pub fn with_watermark(mut self, image: Vec<u8>, options: WatermarkOptions) -> Self {
        self.watermark_image = Some(image);
        self.watermark_options = Some(options);
        self
    }

    pub fn with_subtitles(mut self, track: Vec<u8>, mode: SubtitleMode) -> Self {
        self.subtitle_track = Some(track);
        self.subtitle_mode = mode;
        self
    }

    pub fn features(&self) -> JobFeatures {
        JobFeatures {
            watermark: self.watermark_image.is_some(),
            subtitles: self.subtitle_track.is_some(),
        }
    }

    pub fn plan(&self) -> StagePlan<'_> {
        StagePlan::from_inputs(
            self.watermark_image
                .as_deref()
                .map(|image| (image, self.watermark_options.unwrap_or_default())),
            self.subtitle_track
                .as_deref()
                .map(|track| (track, self.subtitle_mode)),
        )
    }
}

/// Finished output of a job, owned by the caller.
///
/// The file behind `playable_url` is never removed by the workflow; call
/// [`ProcessingArtifact::revoke`] or [`ProcessingArtifact::persist`] when done.
#[derive(Debug, Clone)]
pub struct ProcessingArtifact {
    pub job_id: Uuid,
    pub playable_url: Url,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl ProcessingArtifact {
    pub fn mime_type(&self) -> &'static str {
        "video/mp4"
    }

    /// Delete the file behind the playable URL
    pub async fn revoke(self) -> Result<()> {
        fs::remove_file(&self.path).await?;
        debug!("Revoked {}", self.playable_url);
        Ok(())
    }

    /// Move the artifact file to `dest`, returning the destination
    pub async fn persist<P: AsRef<Path>>(self, dest: P) -> Result<PathBuf> {
        let dest = dest.as_ref().to_path_buf();
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        if fs::rename(&self.path, &dest).await.is_err() {
            // rename does not cross filesystems
            fs::copy(&self.path, &dest).await?;
            fs::remove_file(&self.path).await?;
        }
        Ok(dest)
    }
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Entry point for processing jobs against one engine.
pub struct Workflow {
    config: PipelineConfig,
    loader: Arc<EngineLoader>,
    vfs: VirtualFs,
    gate: Mutex<()>,
    history: JobHistory,
}

impl Workflow {
    /// Workflow driving the configured ffmpeg binary
    pub fn new(config: &Config) -> Self {
        let engine = Arc::new(FfmpegEngine::new(config.engine.clone()));
        Self::with_engine(config.pipeline.clone(), engine)
    }

    pub fn with_engine(config: PipelineConfig, engine: Arc<dyn MediaEngine>) -> Self {
        let loader = Arc::new(EngineLoader::new(engine));
        Self {
            vfs: VirtualFs::new(Arc::clone(&loader)),
            loader,
            gate: Mutex::new(()),
            history: JobHistory::with_limit(config.history_limit),
            config,
        }
    }

    pub fn loader(&self) -> &EngineLoader {
        &self.loader
    }

    /// Processing history, newest first
    pub fn history(&self) -> Vec<JobRecord> {
        self.history.snapshot()
    }

    pub async fn process(&self, request: ProcessingRequest) -> Result<ProcessingArtifact> {
        self.process_with_events(request, None).await
    }

    pub async fn process_with_events(
        &self,
        request: ProcessingRequest,
        events: Option<UnboundedSender<JobEvent>>,
    ) -> Result<ProcessingArtifact> {
        if request.source_video.is_empty() {
            return Err(VidmarkError::NoInputProvided);
        }
        if let Some(options) = &request.watermark_options {
            options.validate()?;
        }

        let job_id = Uuid::new_v4();
        self.history.open(job_id, request.features());
        info!(
            "Submitted job {} (watermark: {}, subtitles: {})",
            job_id,
            request.watermark_image.is_some(),
            request.subtitle_track.is_some()
        );

        let result = self.run_job(job_id, &request, events.as_ref()).await;
        match &result {
            Ok(artifact) => {
                self.history.complete(job_id, artifact.playable_url.as_str());
                notify(events.as_ref(), JobEvent::Completed);
                info!("Job {} completed: {}", job_id, artifact.playable_url);
            }
            Err(e) => {
                self.history.fail(job_id, &e.to_string());
                warn!("Job {} failed: {}", job_id, e);
            }
        }
        result
    }

    async fn run_job(
        &self,
        job_id: Uuid,
        request: &ProcessingRequest,
        events: Option<&UnboundedSender<JobEvent>>,
    ) -> Result<ProcessingArtifact> {
        let (files, _guard) = match self.config.isolation {
            JobIsolation::Serialized => {
                let guard = self.gate.lock().await;
                (JobFiles::canonical(), Some(guard))
            }
            JobIsolation::Namespaced => (JobFiles::namespaced(&job_id), None),
        };
        self.history.mark_processing(job_id);

        let handle = self.loader.ensure_loaded().await?;
        notify(events, JobEvent::EngineReady);

        let input = files.input();
        self.vfs.stage(&input, &request.source_video).await?;
        notify(events, JobEvent::InputStaged {
            bytes: request.source_video.len(),
        });

        let plan = request.plan();
        let mut executor =
            StageExecutor::new(&handle, &self.vfs, &files, &self.config.subtitle_language)
                .with_events(events);
        let outcome = executor.run(&plan, input).await?;
        debug!("Job {} final file: {}", job_id, outcome.final_name);

        let bytes = self.vfs.retrieve(&outcome.final_name).await?;
        let artifact = self.write_artifact(job_id, bytes).await?;

        if !self.config.retain_intermediates {
            self.remove_job_files(&files).await;
        }

        Ok(artifact)
    }

    async fn write_artifact(&self, job_id: Uuid, bytes: Vec<u8>) -> Result<ProcessingArtifact> {
        let output_dir = self.config.output_dir();
        fs::create_dir_all(&output_dir).await?;

        let path = output_dir.join(format!("vidmark-{}.mp4", job_id.simple()));
        fs::write(&path, &bytes).await?;
        let path = fs::canonicalize(&path).await?;

        let playable_url = Url::from_file_path(&path).map_err(|_| {
            VidmarkError::Config(format!("Cannot derive a URL for {}", path.display()))
        })?;

        Ok(ProcessingArtifact {
            job_id,
            playable_url,
            path,
            bytes,
        })
    }

    async fn remove_job_files(&self, files: &JobFiles) {
        for name in files.all() {
            if let Err(e) = self.vfs.remove(&name).await {
                warn!("Failed to remove virtual file {}: {}", name, e);
            }
        }
    }

    /// Process every video file under `input_dir`, pairing `<stem>.srt` sidecars
    /// as subtitle tracks, and persist results as `<stem>_processed.mp4` at the
    /// same relative location under `output_dir`.
    ///
    /// Inputs differing only by extension map to one output; the first in path
    /// order is processed and the rest are recorded as failures.
    pub async fn process_directory<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_dir: P,
        output_dir: Q,
        watermark: Option<(&[u8], WatermarkOptions)>,
        subtitle_mode: SubtitleMode,
    ) -> Result<BatchSummary> {
        let input_dir = input_dir.as_ref();
        let output_dir = output_dir.as_ref();
        info!("Processing directory: {}", input_dir.display());

        if !input_dir.is_dir() {
            return Err(VidmarkError::Config(format!(
                "Input path is not a directory: {}",
                input_dir.display()
            )));
        }
        fs::create_dir_all(output_dir).await?;

        let mut video_files = Vec::new();
        for entry in WalkDir::new(input_dir).into_iter().filter_map(|e| e.ok()) {
            if let Some(extension) = entry.path().extension().and_then(|ext| ext.to_str()) {
                if VIDEO_EXTENSIONS.contains(&extension.to_lowercase().as_str()) {
                    video_files.push(entry.path().to_path_buf());
                }
            }
        }
        video_files.sort();
        info!("Found {} video files to process", video_files.len());

        let mut summary = BatchSummary::default();
        let mut claimed = HashSet::new();
        for video_path in video_files {
            let dest = match batch_destination(input_dir, output_dir, &video_path) {
                Ok(dest) => dest,
                Err(e) => {
                    summary.failed.push((video_path, e.to_string()));
                    continue;
                }
            };
            if !claimed.insert(dest.clone()) {
                warn!("Skipping {}: {} is already taken", video_path.display(), dest.display());
                summary.failed.push((
                    video_path,
                    format!("Output {} already produced by another input", dest.display()),
                ));
                continue;
            }

            match self
                .process_file(&video_path, &dest, watermark, subtitle_mode)
                .await
            {
                Ok(dest) => {
                    info!("Successfully processed: {}", video_path.display());
                    summary.processed.push(dest);
                }
                Err(e) => {
                    warn!("Failed to process {}: {}", video_path.display(), e);
                    summary.failed.push((video_path, e.to_string()));
                }
            }
        }

        Ok(summary)
    }

    async fn process_file(
        &self,
        video_path: &Path,
        dest: &Path,
        watermark: Option<(&[u8], WatermarkOptions)>,
        subtitle_mode: SubtitleMode,
    ) -> Result<PathBuf> {
        let mut request = ProcessingRequest::new(fs::read(video_path).await?);
        if let Some((image, options)) = watermark {
            request = request.with_watermark(image.to_vec(), options);
        }

        let sidecar = video_path.with_extension("srt");
        if fs::try_exists(&sidecar).await? {
            debug!("Using subtitle sidecar {}", sidecar.display());
            request = request.with_subtitles(fs::read(&sidecar).await?, subtitle_mode);
        }

        let artifact = self.process(request).await?;
        artifact.persist(dest).await
    }
}

/// `<output_dir>/<relative dir>/<stem>_processed.mp4` for a video under `input_dir`
fn batch_destination(input_dir: &Path, output_dir: &Path, video_path: &Path) -> Result<PathBuf> {
    let stem = video_path
        .file_stem()
        .ok_or_else(|| VidmarkError::Config("Invalid video filename".to_string()))?
        .to_string_lossy()
        .to_string();

    let relative_dir = video_path
        .parent()
        .and_then(|parent| parent.strip_prefix(input_dir).ok())
        .unwrap_or_else(|| Path::new(""));

    Ok(output_dir
        .join(relative_dir)
        .join(format!("{}_processed.mp4", stem)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineState, MockMediaEngine};
    use crate::history::JobStatus;

    fn pipeline_config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            output_dir: Some(dir.to_path_buf()),
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_unavailable_engine_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = MockMediaEngine::new();
        engine
            .expect_load()
            .returning(|| Err(VidmarkError::EngineUnavailable("no ffmpeg on this host".to_string())));
        engine.expect_write_file().times(0);
        engine.expect_exec().times(0);

        let workflow = Workflow::with_engine(pipeline_config(dir.path()), Arc::new(engine));
        let request = ProcessingRequest::new(b"video".to_vec())
            .with_subtitles(b"srt".to_vec(), SubtitleMode::Burn);

        let err = workflow.process(request).await.unwrap_err();
        assert!(matches!(err, VidmarkError::EngineUnavailable(_)));
        assert_eq!(workflow.loader().state(), EngineState::Uninitialized);

        let history = workflow.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, JobStatus::Failed);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_history_keeps_configured_number_of_jobs() {
        let mut engine = MockMediaEngine::new();
        engine
            .expect_load()
            .returning(|| Err(VidmarkError::EngineUnavailable("no ffmpeg".to_string())));

        let config = PipelineConfig {
            history_limit: 2,
            ..PipelineConfig::default()
        };
        let workflow = Workflow::with_engine(config, Arc::new(engine));
        for _ in 0..3 {
            let _ = workflow.process(ProcessingRequest::new(b"video".to_vec())).await;
        }

        let history = workflow.history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|record| record.status == JobStatus::Failed));
    }

    #[tokio::test]
    async fn test_empty_source_is_rejected_before_loading() {
        let engine = MockMediaEngine::new();
        let workflow = Workflow::with_engine(PipelineConfig::default(), Arc::new(engine));

        let err = workflow.process(ProcessingRequest::default()).await.unwrap_err();
        assert!(matches!(err, VidmarkError::NoInputProvided));
        assert!(workflow.history().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_options_are_rejected() {
        let engine = MockMediaEngine::new();
        let workflow = Workflow::with_engine(PipelineConfig::default(), Arc::new(engine));

        let options = WatermarkOptions {
            opacity_percent: 120,
            ..WatermarkOptions::default()
        };
        let request = ProcessingRequest::new(b"video".to_vec()).with_watermark(b"png".to_vec(), options);

        assert!(matches!(
            workflow.process(request).await,
            Err(VidmarkError::InvalidOptions(_))
        ));
    }

    #[tokio::test]
    async fn test_engine_rejection_names_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = MockMediaEngine::new();
        engine.expect_load().returning(|| Ok(()));
        engine.expect_write_file().returning(|_, _| Ok(()));
        engine
            .expect_exec()
            .times(1)
            .returning(|_| Err(VidmarkError::Engine("Invalid filter graph".to_string())));
        // Failed jobs keep their files, so nothing is deleted or read back.
        engine.expect_delete_file().times(0);
        engine.expect_read_file().times(0);

        let workflow = Workflow::with_engine(pipeline_config(dir.path()), Arc::new(engine));
        let request = ProcessingRequest::new(b"video".to_vec())
            .with_watermark(b"png".to_vec(), WatermarkOptions::default())
            .with_subtitles(b"srt".to_vec(), SubtitleMode::Burn);

        match workflow.process(request).await {
            Err(VidmarkError::StageExecutionFailure { stage, source }) => {
                assert_eq!(stage, crate::media::StageKind::Watermark);
                assert!(source.to_string().contains("Invalid filter graph"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_request_plan_defaults_watermark_options() {
        let mut request = ProcessingRequest::new(b"video".to_vec());
        request.watermark_image = Some(b"png".to_vec());

        let plan = request.plan();
        match plan.stages() {
            [crate::media::Stage::Watermark { options, .. }] => {
                assert_eq!(*options, WatermarkOptions::default());
            }
            other => panic!("unexpected plan: {:?}", other),
        }
    }
}
