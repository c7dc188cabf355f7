//! `transformers` pipeline backend embedded through PyO3.
//!
//! Builds `transformers.pipeline("image-text-to-text", ...)` with a
//! bitsandbytes 4-bit quantization config and calls it with chat messages.
//! Requires `torch`, `transformers`, `bitsandbytes` and a video decoding
//! backend importable by the embedded interpreter.

use crate::compose::ChatMessage;
use crate::config::SessionConfig;
use crate::pipeline::{InferenceResult, Pipeline, PipelineError, PipelineFactory};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use tracing::{debug, info};

/// Builds [`TransformersPipeline`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct TransformersFactory;

impl TransformersFactory {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineFactory for TransformersFactory {
    fn build(&self, config: &SessionConfig) -> Result<Box<dyn Pipeline>, PipelineError> {
        if !config.model_path.is_dir() {
            return Err(PipelineError::Load(format!(
                "model directory not found: {}",
                config.model_path.display()
            )));
        }

        let pipe = Python::with_gil(|py| {
            build_pipeline(py, config).map_err(|e| PipelineError::Load(format_python_error(py, &e)))
        })?;

        info!("transformers pipeline ready ({})", config.task);
        Ok(Box::new(TransformersPipeline { pipe }))
    }
}

fn build_pipeline(py: Python<'_>, config: &SessionConfig) -> PyResult<Py<PyAny>> {
    // Library deprecation chatter would otherwise land on our stderr
    py.import("warnings")?
        .call_method1("simplefilter", ("ignore",))?;

    let torch = py.import("torch")?;
    let transformers = py.import("transformers")?;

    let quant = &config.quantization;
    let quant_kwargs = PyDict::new(py);
    quant_kwargs.set_item("load_in_4bit", quant.load_in_4bit)?;
    quant_kwargs.set_item(
        "bnb_4bit_compute_dtype",
        torch.getattr(quant.compute_dtype.torch_name())?,
    )?;
    quant_kwargs.set_item("bnb_4bit_quant_type", quant.quant_type.as_str())?;
    let quantization_config = transformers
        .getattr("BitsAndBytesConfig")?
        .call((), Some(&quant_kwargs))?;

    let kwargs = PyDict::new(py);
    kwargs.set_item("model", config.model_path.to_string_lossy().into_owned())?;
    kwargs.set_item("device_map", config.device_map.as_str())?;
    kwargs.set_item("dtype", torch.getattr(config.dtype.torch_name())?)?;
    kwargs.set_item("quantization_config", quantization_config)?;
    kwargs.set_item("trust_remote_code", config.trust_remote_code)?;

    debug!("Calling transformers.pipeline({})", config.task);
    let pipe = transformers
        .getattr("pipeline")?
        .call((config.task.as_str(),), Some(&kwargs))?;

    Ok(pipe.unbind())
}

/// A loaded `transformers` pipeline object.
pub struct TransformersPipeline {
    pipe: Py<PyAny>,
}

impl Pipeline for TransformersPipeline {
    fn generate(
        &self,
        messages: &[ChatMessage],
        max_new_tokens: usize,
    ) -> Result<InferenceResult, PipelineError> {
        let messages_json = serde_json::to_string(messages)
            .map_err(|e| PipelineError::Generation(format!("failed to encode messages: {}", e)))?;

        Python::with_gil(|py| {
            let output = call_pipeline(py, &self.pipe, &messages_json, max_new_tokens)
                .map_err(|e| PipelineError::Generation(format_python_error(py, &e)))?;
            Ok(python_to_json(py, &output))
        })
    }
}

fn call_pipeline<'py>(
    py: Python<'py>,
    pipe: &Py<PyAny>,
    messages_json: &str,
    max_new_tokens: usize,
) -> PyResult<Bound<'py, PyAny>> {
    let messages = py
        .import("json")?
        .call_method1("loads", (messages_json,))?;
    let kwargs = PyDict::new(py);
    kwargs.set_item("max_new_tokens", max_new_tokens)?;
    pipe.bind(py).call((messages,), Some(&kwargs))
}

/// Traceback frames kept in generation error messages
const TRACEBACK_FRAMES: usize = 3;

/// Describe a Python exception by its message and innermost traceback frames.
fn format_python_error(py: Python<'_>, err: &PyErr) -> String {
    let frames: Vec<String> = err
        .traceback(py)
        .and_then(|tb| {
            py.import("traceback")
                .and_then(|traceback| traceback.call_method1("format_tb", (tb,)))
                .and_then(|lines| lines.extract::<Vec<String>>())
                .ok()
        })
        .unwrap_or_default();

    match innermost_frames(&frames, TRACEBACK_FRAMES) {
        Some(tail) => format!("{}\n{}", err, tail),
        None => err.to_string(),
    }
}

fn innermost_frames(frames: &[String], keep: usize) -> Option<String> {
    if frames.is_empty() {
        return None;
    }
    let tail = &frames[frames.len().saturating_sub(keep)..];
    Some(tail.concat().trim_end().to_string())
}

/// Convert pipeline output to JSON.
///
/// Objects `json.dumps` cannot encode become a JSON string holding their
/// `repr`, which extraction then treats as an unexpected shape.
fn python_to_json(py: Python<'_>, obj: &Bound<'_, PyAny>) -> serde_json::Value {
    let dumped = py
        .import("json")
        .and_then(|json| json.call_method1("dumps", (obj,)))
        .and_then(|s| s.extract::<String>());

    if let Ok(s) = dumped {
        if let Ok(value) = serde_json::from_str(&s) {
            return value;
        }
    }

    let repr: String = obj
        .repr()
        .and_then(|r| r.extract())
        .unwrap_or_else(|_| "<unknown>".to_string());
    serde_json::Value::String(repr)
}
