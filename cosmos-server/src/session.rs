//! Process-wide inference session.
//!
//! The session is built on first demand and then shared by every request.
//! Construction is single-flight: it runs in a task owned by the manager, so
//! callers arriving while a load is in progress wait for that load instead of
//! starting another, and a caller going away does not abandon it.

use crate::config::SessionConfig;
use crate::pipeline::{Pipeline, PipelineError, PipelineFactory};
use cosmos::tracing::prefix;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("model load panicked: {0}")]
    LoadPanicked(String),

    #[error("model load was aborted before completing")]
    LoadAborted,
}

/// A loaded pipeline together with the configuration it was built from.
pub struct Session {
    pipeline: Box<dyn Pipeline>,
    config: SessionConfig,
}

impl Session {
    pub fn new(pipeline: Box<dyn Pipeline>, config: SessionConfig) -> Self {
        Self { pipeline, config }
    }

    pub fn pipeline(&self) -> &dyn Pipeline {
        self.pipeline.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("model_path", &self.config.model_path)
            .finish_non_exhaustive()
    }
}

type LoadOutcome = Option<Result<Arc<Session>, SessionError>>;

enum LoadState {
    Idle,
    Loading(watch::Receiver<LoadOutcome>),
    Ready(Arc<Session>),
    Failed(SessionError),
}

/// Externally visible load state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// No load attempted yet
    Idle,
    Loading,
    Ready,
    /// Last attempt failed
    Failed,
}

struct Inner {
    config: SessionConfig,
    factory: Arc<dyn PipelineFactory>,
    state: Mutex<LoadState>,
    attempts: AtomicUsize,
}

/// Owner of the lazily constructed session. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(config: SessionConfig, factory: Box<dyn PipelineFactory>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                factory: Arc::from(factory),
                state: Mutex::new(LoadState::Idle),
                attempts: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn model_name(&self) -> String {
        self.inner.config.model_name()
    }

    pub fn status(&self) -> LoadStatus {
        match &*self.inner.state.lock() {
            LoadState::Idle => LoadStatus::Idle,
            LoadState::Loading(_) => LoadStatus::Loading,
            LoadState::Ready(_) => LoadStatus::Ready,
            LoadState::Failed(_) => LoadStatus::Failed,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == LoadStatus::Ready
    }

    /// Number of construction attempts started so far.
    pub fn load_attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Return the session, building it if no load has succeeded yet.
    ///
    /// A failed load is retried on the next call unless the session config
    /// asks for failures to be cached, in which case the first error is
    /// returned from then on.
    pub async fn get_session(&self) -> Result<Arc<Session>, SessionError> {
        let mut rx = {
            let mut state = self.inner.state.lock();
            let in_flight = match &*state {
                LoadState::Ready(session) => return Ok(session.clone()),
                LoadState::Failed(err) if self.inner.config.cache_load_failure => {
                    return Err(err.clone())
                }
                LoadState::Loading(rx) => Some(rx.clone()),
                LoadState::Idle | LoadState::Failed(_) => None,
            };
            match in_flight {
                Some(rx) => rx,
                None => {
                    let rx = self.start_load();
                    *state = LoadState::Loading(rx.clone());
                    rx
                }
            }
        };

        let outcome = rx
            .wait_for(|outcome| outcome.is_some())
            .await
            .map_err(|_| SessionError::LoadAborted)?;

        match &*outcome {
            Some(result) => result.clone(),
            None => Err(SessionError::LoadAborted),
        }
    }

    /// Spawn the load task. Must be called with the state lock held.
    fn start_load(&self) -> watch::Receiver<LoadOutcome> {
        let (tx, rx) = watch::channel(None);
        let inner = self.inner.clone();
        let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::spawn(async move {
            info!(
                "{} Loading model from {} (attempt {})",
                prefix::PULSE,
                inner.config.model_path.display(),
                attempt
            );
            let start = Instant::now();

            let factory = inner.factory.clone();
            let config = inner.config.clone();
            let built = tokio::task::spawn_blocking(move || factory.build(&config)).await;

            let result = match built {
                Ok(Ok(pipeline)) => {
                    info!(
                        "{} Model loaded in {:.1}s",
                        prefix::PULSE,
                        start.elapsed().as_secs_f64()
                    );
                    Ok(Arc::new(Session::new(pipeline, inner.config.clone())))
                }
                Ok(Err(e)) => {
                    error!("Model load failed: {}", e);
                    Err(SessionError::from(e))
                }
                Err(join_err) => {
                    error!("Model load task panicked: {}", join_err);
                    Err(SessionError::LoadPanicked(join_err.to_string()))
                }
            };

            *inner.state.lock() = match &result {
                Ok(session) => LoadState::Ready(session.clone()),
                Err(e) => LoadState::Failed(e.clone()),
            };
            // Receivers may all be gone; the state above is what later callers see
            let _ = tx.send(Some(result));
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::ChatMessage;
    use crate::pipeline::InferenceResult;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct NullPipeline;

    impl Pipeline for NullPipeline {
        fn generate(
            &self,
            _messages: &[ChatMessage],
            _max_new_tokens: usize,
        ) -> Result<InferenceResult, PipelineError> {
            Ok(serde_json::Value::Null)
        }
    }

    /// Factory that counts builds, optionally sleeping and failing.
    struct CountingFactory {
        builds: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
        delay: Duration,
    }

    impl CountingFactory {
        fn new(delay: Duration) -> (Self, Arc<AtomicUsize>, Arc<AtomicBool>) {
            let builds = Arc::new(AtomicUsize::new(0));
            let fail = Arc::new(AtomicBool::new(false));
            (
                Self {
                    builds: builds.clone(),
                    fail: fail.clone(),
                    delay,
                },
                builds,
                fail,
            )
        }
    }

    impl PipelineFactory for CountingFactory {
        fn build(&self, _config: &SessionConfig) -> Result<Box<dyn Pipeline>, PipelineError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.fail.load(Ordering::SeqCst) {
                Err(PipelineError::Load("model file not found".to_string()))
            } else {
                Ok(Box::new(NullPipeline))
            }
        }
    }

    fn manager(factory: CountingFactory, cache_load_failure: bool) -> SessionManager {
        let mut config = SessionConfig::new("/models/cosmos-model");
        config.cache_load_failure = cache_load_failure;
        SessionManager::new(config, Box::new(factory))
    }

    #[tokio::test]
    async fn second_call_reuses_session() {
        let (factory, builds, _) = CountingFactory::new(Duration::ZERO);
        let sessions = manager(factory, false);
        assert_eq!(sessions.status(), LoadStatus::Idle);

        let first = sessions.get_session().await.unwrap();
        let second = sessions.get_session().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(sessions.load_attempts(), 1);
        assert!(sessions.is_ready());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cold_start_builds_once() {
        let (factory, builds, _) = CountingFactory::new(Duration::from_millis(100));
        let sessions = manager(factory, false);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sessions = sessions.clone();
                tokio::spawn(async move { sessions.get_session().await })
            })
            .collect();

        let mut loaded = Vec::new();
        for handle in handles {
            loaded.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(loaded.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn failure_is_retried_by_default() {
        let (factory, builds, fail) = CountingFactory::new(Duration::ZERO);
        fail.store(true, Ordering::SeqCst);
        let sessions = manager(factory, false);

        assert!(sessions.get_session().await.is_err());
        assert_eq!(sessions.status(), LoadStatus::Failed);
        assert!(sessions.get_session().await.is_err());
        assert_eq!(builds.load(Ordering::SeqCst), 2);

        fail.store(false, Ordering::SeqCst);
        assert!(sessions.get_session().await.is_ok());
        assert_eq!(builds.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cached_failure_is_not_retried() {
        let (factory, builds, fail) = CountingFactory::new(Duration::ZERO);
        fail.store(true, Ordering::SeqCst);
        let sessions = manager(factory, true);

        let first = sessions.get_session().await.unwrap_err();
        fail.store(false, Ordering::SeqCst);
        let second = sessions.get_session().await.unwrap_err();

        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn load_survives_caller_going_away() {
        let (factory, builds, _) = CountingFactory::new(Duration::from_millis(100));
        let sessions = manager(factory, false);

        let abandoned = tokio::time::timeout(Duration::from_millis(10), sessions.get_session()).await;
        assert!(abandoned.is_err());
        assert_eq!(sessions.status(), LoadStatus::Loading);

        sessions.get_session().await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }
}
