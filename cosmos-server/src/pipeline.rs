//! Generation pipeline abstraction.
//!
//! A [`PipelineFactory`] builds a [`Pipeline`] from a [`SessionConfig`]. The
//! session manager owns the factory and calls it at most once per successful
//! load; handlers only ever see the built pipeline.

use crate::compose::ChatMessage;
use crate::config::SessionConfig;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("failed to load model: {0}")]
    Load(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("no inference backend compiled in (rebuild with --features python)")]
    BackendUnavailable,
}

/// Raw pipeline output. Its shape depends on the model and library versions
/// and is decoded best-effort by [`crate::extract`].
pub type InferenceResult = serde_json::Value;

/// A loaded model ready to generate.
///
/// Calls block for the whole generation and must run off the async runtime.
pub trait Pipeline: Send + Sync {
    fn generate(
        &self,
        messages: &[ChatMessage],
        max_new_tokens: usize,
    ) -> Result<InferenceResult, PipelineError>;
}

/// Builds pipelines. Construction blocks (it loads weights onto the devices).
pub trait PipelineFactory: Send + Sync {
    fn build(&self, config: &SessionConfig) -> Result<Box<dyn Pipeline>, PipelineError>;
}

/// Factory used when the binary was built without a backend.
///
/// Every load fails, so health reports `offline` and analysis requests get 503.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableFactory;

impl PipelineFactory for UnavailableFactory {
    fn build(&self, _config: &SessionConfig) -> Result<Box<dyn Pipeline>, PipelineError> {
        Err(PipelineError::BackendUnavailable)
    }
}

/// The factory for the backend this binary was built with.
pub fn default_factory() -> Box<dyn PipelineFactory> {
    #[cfg(feature = "python")]
    {
        Box::new(crate::python::TransformersFactory::new())
    }

    #[cfg(not(feature = "python"))]
    {
        Box::new(UnavailableFactory)
    }
}
