//! Generation calls against the loaded session.

use crate::compose::ChatMessage;
use crate::pipeline::{InferenceResult, PipelineError};
use crate::session::Session;
use crate::upload::Upload;
use cosmos::tracing::prefix;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("generation did not finish within {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("generation task panicked: {0}")]
    Panicked(String),

    #[error("inference queue closed")]
    QueueClosed,
}

/// Runs generation on blocking workers, one call per permit.
///
/// The deadline covers the generation only, not the wait for a permit. A
/// call that misses it fails the request, but the generation itself cannot
/// be interrupted: it keeps its permit and its upload until it finishes, so
/// later requests still queue behind it.
pub struct InferenceInvoker {
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl InferenceInvoker {
    pub fn new(max_concurrent: usize, timeout: Option<Duration>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    /// Generate up to `max_new_tokens` for `message`.
    ///
    /// `upload` is the file `message` refers to; it is released when the
    /// generation ends, even if the caller has stopped waiting.
    pub async fn invoke(
        &self,
        session: Arc<Session>,
        message: ChatMessage,
        max_new_tokens: usize,
        upload: Upload,
    ) -> Result<InferenceResult, InferenceError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| InferenceError::QueueClosed)?;
        debug!("Acquired inference permit");

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _upload = upload;
            let start = Instant::now();
            let result = session
                .pipeline()
                .generate(std::slice::from_ref(&message), max_new_tokens);
            info!(
                "{} Generation finished in {:.1}s",
                prefix::PULSE,
                start.elapsed().as_secs_f64()
            );
            result
        });

        let joined = match self.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Generation exceeded {}s deadline", deadline.as_secs());
                    return Err(InferenceError::Timeout(deadline));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(result) => result.map_err(InferenceError::from),
            Err(e) => Err(InferenceError::Panicked(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::compose;
    use crate::config::SessionConfig;
    use crate::pipeline::Pipeline;
    use crate::upload::ScratchDir;
    use serde_json::json;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the request back, tracking how many calls overlap.
    struct EchoPipeline {
        delay: Duration,
        active: AtomicUsize,
        peak: Arc<AtomicUsize>,
    }

    impl EchoPipeline {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                active: AtomicUsize::new(0),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Pipeline for EchoPipeline {
        fn generate(
            &self,
            messages: &[ChatMessage],
            max_new_tokens: usize,
        ) -> Result<InferenceResult, PipelineError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(json!({"messages": messages, "max_new_tokens": max_new_tokens}))
        }
    }

    struct FailingPipeline;

    impl Pipeline for FailingPipeline {
        fn generate(
            &self,
            _messages: &[ChatMessage],
            _max_new_tokens: usize,
        ) -> Result<InferenceResult, PipelineError> {
            Err(PipelineError::Generation("CUDA out of memory".to_string()))
        }
    }

    fn session(pipeline: impl Pipeline + 'static) -> Arc<Session> {
        Arc::new(Session::new(
            Box::new(pipeline),
            SessionConfig::new("/models/cosmos-model"),
        ))
    }

    /// Ingest `filename` and build the message that refers to it.
    async fn request(scratch: &ScratchDir, filename: &str) -> (ChatMessage, Upload) {
        let upload = scratch.ingest(filename, b"video").await.unwrap();
        (compose("describe", None, upload.path()), upload)
    }

    #[tokio::test]
    async fn passes_message_and_budget() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path(), false);
        let (message, upload) = request(&scratch, "clip.mp4").await;
        let video = upload.path().to_string_lossy().into_owned();

        let invoker = InferenceInvoker::new(1, None);
        let output = invoker
            .invoke(session(EchoPipeline::new(Duration::ZERO)), message, 512, upload)
            .await
            .unwrap();

        assert_eq!(output["max_new_tokens"], 512);
        assert_eq!(output["messages"][0]["role"], "user");
        assert_eq!(output["messages"][0]["content"][1]["video"], video.as_str());
        assert!(!Path::new(&video).exists());
    }

    #[tokio::test]
    async fn pipeline_errors_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path(), false);
        let (message, upload) = request(&scratch, "clip.mp4").await;

        let invoker = InferenceInvoker::new(1, None);
        let err = invoker
            .invoke(session(FailingPipeline), message, 512, upload)
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Pipeline(PipelineError::Generation(_))));
    }

    #[tokio::test]
    async fn deadline_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path(), false);
        let (message, upload) = request(&scratch, "clip.mp4").await;

        let invoker = InferenceInvoker::new(1, Some(Duration::from_millis(20)));
        let err = invoker
            .invoke(
                session(EchoPipeline::new(Duration::from_millis(300))),
                message,
                512,
                upload,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Timeout(_)));
    }

    #[tokio::test]
    async fn timed_out_generation_keeps_its_upload() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path(), false);
        let (message, upload) = request(&scratch, "slow.mp4").await;
        let path = upload.path().to_path_buf();

        let invoker = InferenceInvoker::new(1, Some(Duration::from_millis(20)));
        let err = invoker
            .invoke(
                session(EchoPipeline::new(Duration::from_millis(300))),
                message,
                512,
                upload,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Timeout(_)));
        assert!(path.exists());

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(!path.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn queue_wait_does_not_count_against_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path(), false);
        // Each call fits the deadline; both back to back do not
        let invoker = Arc::new(InferenceInvoker::new(1, Some(Duration::from_millis(350))));
        let shared = session(EchoPipeline::new(Duration::from_millis(200)));

        let mut handles = Vec::new();
        for name in ["first.mp4", "second.mp4"] {
            let (message, upload) = request(&scratch, name).await;
            let invoker = invoker.clone();
            let session = shared.clone();
            handles.push(tokio::spawn(async move {
                invoker.invoke(session, message, 8, upload).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn calls_are_serialized_by_permits() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path(), false);
        let invoker = Arc::new(InferenceInvoker::new(1, None));
        let pipeline = EchoPipeline::new(Duration::from_millis(30));
        let peak = pipeline.peak.clone();
        let shared = session(pipeline);

        let mut handles = Vec::new();
        for i in 0..4 {
            let (message, upload) = request(&scratch, &format!("clip{i}.mp4")).await;
            let invoker = invoker.clone();
            let session = shared.clone();
            handles.push(tokio::spawn(async move {
                invoker.invoke(session, message, 8, upload).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
