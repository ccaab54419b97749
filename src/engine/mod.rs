// Media engine abstraction
//
// - MediaEngine: the transcoding runtime with its private flat filesystem
// - EngineLoader: lazy, shared, exactly-once loading of an engine
// - ffmpeg: production engine backed by the ffmpeg binary

pub mod ffmpeg;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;
use tracing::{info, warn};

pub use ffmpeg::FfmpegEngine;

use crate::error::{Result, VidmarkError};

/// Transcoding runtime operating on named buffers in a private namespace.
///
/// Names are flat (no directories). Implementations report an absent file on
/// read as [`VidmarkError::MissingOutput`] and a rejected command as
/// [`VidmarkError::Engine`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Prepare the runtime. Called at most once per successful load.
    async fn load(&self) -> Result<()>;

    /// Store `data` under `name`, replacing any existing file
    async fn write_file(&self, name: &str, data: &[u8]) -> Result<()>;

    async fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    async fn delete_file(&self, name: &str) -> Result<()>;

    /// Run one command-line style invocation against the private namespace
    async fn exec(&self, args: &[String]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
}

/// Handle to an engine whose load has completed.
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<dyn MediaEngine>,
}

impl EngineHandle {
    pub fn engine(&self) -> &dyn MediaEngine {
        self.engine.as_ref()
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle").finish_non_exhaustive()
    }
}

/// Loads an engine on first use and keeps the handle for the loader's lifetime.
pub struct EngineLoader {
    engine: Arc<dyn MediaEngine>,
    handle: OnceCell<EngineHandle>,
    loading: AtomicBool,
}

impl EngineLoader {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            engine,
            handle: OnceCell::new(),
            loading: AtomicBool::new(false),
        }
    }

    /// Load the engine if needed and return its handle.
    ///
    /// Callers arriving while a load is in flight wait for that load instead of
    /// starting another. A failed load leaves the loader uninitialized.
    pub async fn ensure_loaded(&self) -> Result<EngineHandle> {
        let handle = self
            .handle
            .get_or_try_init(|| async {
                let loading = LoadingFlag::raise(&self.loading);
                info!("Loading media engine");

                let loaded = self.engine.load().await;
                drop(loading);

                match loaded {
                    Ok(()) => {
                        info!("Media engine ready");
                        Ok(EngineHandle {
                            engine: Arc::clone(&self.engine),
                        })
                    }
                    Err(VidmarkError::EngineUnavailable(reason)) => {
                        warn!("Media engine unavailable: {}", reason);
                        Err(VidmarkError::EngineUnavailable(reason))
                    }
                    Err(e) => {
                        warn!("Media engine failed to load: {}", e);
                        Err(VidmarkError::EngineUnavailable(e.to_string()))
                    }
                }
            })
            .await?;

        Ok(handle.clone())
    }

    /// Handle of an already loaded engine, without triggering a load
    pub fn handle(&self) -> Option<EngineHandle> {
        self.handle.get().cloned()
    }

    pub fn state(&self) -> EngineState {
        if self.handle.initialized() {
            EngineState::Ready
        } else if self.loading.load(Ordering::SeqCst) {
            EngineState::Loading
        } else {
            EngineState::Uninitialized
        }
    }
}

/// Marks a load in flight; lowered when dropped, including when the loading
/// future is cancelled.
struct LoadingFlag<'a>(&'a AtomicBool);

impl<'a> LoadingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
