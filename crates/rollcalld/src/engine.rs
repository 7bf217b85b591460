use rollcall_core::{LandmarkSet, PipelineError, Recognition, RecognitionPipeline};
use rollcall_store::{RegistryStore, StoreError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("recognition error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("registry error: {0}")]
    Store(#[from] StoreError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from stream tasks to the engine thread.
enum EngineRequest {
    Observe {
        detection: Option<LandmarkSet>,
        timestamp_ms: u64,
        reply: oneshot::Sender<Result<Recognition, EngineError>>,
    },
    Reload {
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread. Every camera stream gets a clone;
/// all of them share one registry and one debouncer.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run one detector result through build → match → threshold → debounce.
    pub async fn observe(
        &self,
        detection: Option<LandmarkSet>,
        timestamp_ms: u64,
    ) -> Result<Recognition, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Observe {
                detection,
                timestamp_ms,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Re-read the registry directory. Returns the number of identities.
    pub async fn reload(&self) -> Result<usize, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Reload { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The registry is loaded synchronously first so that a corrupt registry
/// fails startup instead of the first frame.
pub fn spawn_engine(
    pipeline: RecognitionPipeline,
    store: RegistryStore,
) -> Result<EngineHandle, EngineError> {
    let registry = store.load_all()?;
    tracing::info!(
        identities = registry.len(),
        dir = %store.dir().display(),
        threshold = pipeline.threshold(),
        interval_secs = pipeline.debouncer().interval().as_secs(),
        scheme = pipeline.builder().scheme(),
        "registry ready"
    );
    pipeline.registry().replace(registry);

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(32);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Observe {
                        detection,
                        timestamp_ms,
                        reply,
                    } => {
                        let result = pipeline
                            .observe(detection.as_ref(), timestamp_ms)
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Reload { reply } => {
                        let result = reload(&pipeline, &store);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

/// Swap in a freshly loaded registry. On failure the old one stays active.
fn reload(pipeline: &RecognitionPipeline, store: &RegistryStore) -> Result<usize, EngineError> {
    let registry = store.load_all()?;
    let count = registry.len();
    pipeline.registry().replace(registry);
    tracing::info!(identities = count, "registry reloaded");
    Ok(count)
}
