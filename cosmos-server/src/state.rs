//! Shared application state

use crate::config::ServerConfig;
use crate::inference::InferenceInvoker;
use crate::pipeline::PipelineFactory;
use crate::session::SessionManager;
use crate::upload::ScratchDir;
use std::sync::Arc;

/// State shared by all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub scratch: ScratchDir,
    pub invoker: Arc<InferenceInvoker>,
    /// Generation budget per request
    pub max_new_tokens: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig, factory: Box<dyn PipelineFactory>) -> Self {
        Self {
            sessions: SessionManager::new(config.session.clone(), factory),
            scratch: ScratchDir::new(&config.scratch_dir, config.keep_uploads),
            invoker: Arc::new(InferenceInvoker::new(
                config.max_concurrent_inferences,
                config.inference_timeout,
            )),
            max_new_tokens: config.max_new_tokens,
        }
    }
}
