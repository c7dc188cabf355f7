//! Server and session configuration types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default model artifact directory, relative to the working directory.
///
/// The server is normally started from `backend/` with the model checked out
/// next to it at the repository root.
pub const DEFAULT_MODEL_DIR: &str = "../cosmos-model";

/// Default scratch directory for uploaded videos, relative to the working directory.
pub const DEFAULT_SCRATCH_DIR: &str = "temp";

/// Generation budget for one analysis request
pub const DEFAULT_MAX_NEW_TOKENS: usize = 512;

/// Default deadline for one generation call
pub const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 600;

/// Pipeline task name understood by `transformers.pipeline`
pub const PIPELINE_TASK: &str = "image-text-to-text";

/// Floating point formats a model can run its compute in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Bfloat16,
    Float16,
}

impl Dtype {
    /// Attribute name of the dtype in the `torch` module.
    pub fn torch_name(self) -> &'static str {
        match self {
            Dtype::Bfloat16 => "bfloat16",
            Dtype::Float16 => "float16",
        }
    }
}

/// 4-bit weight quantization parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizationConfig {
    pub load_in_4bit: bool,
    pub compute_dtype: Dtype,
    /// Quantization scheme, `nf4` (normalized float 4)
    pub quant_type: String,
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self {
            load_in_4bit: true,
            compute_dtype: Dtype::Bfloat16,
            quant_type: "nf4".to_string(),
        }
    }
}

/// Everything needed to construct the inference session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Absolute path of the model artifact directory
    pub model_path: PathBuf,
    /// Pipeline task name
    pub task: String,
    /// Dtype the weights are loaded in
    pub dtype: Dtype,
    pub quantization: QuantizationConfig,
    /// Device placement policy (`auto` spreads layers across accelerators)
    pub device_map: String,
    /// Allow the model repository to run its own code during loading.
    /// The artifact on disk is trusted.
    pub trust_remote_code: bool,
    /// Remember the first load failure instead of retrying on every call
    pub cache_load_failure: bool,
}

impl SessionConfig {
    /// Session config for a model at `model_path` with the default quantization.
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            task: PIPELINE_TASK.to_string(),
            dtype: Dtype::Bfloat16,
            quantization: QuantizationConfig::default(),
            device_map: "auto".to_string(),
            trust_remote_code: true,
            cache_load_failure: false,
        }
    }

    /// Name reported to clients: the final component of the model path.
    pub fn model_name(&self) -> String {
        model_name(&self.model_path)
    }
}

/// Server configuration assembled from the command line and environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub session: SessionConfig,
    /// Directory uploads are written to
    pub scratch_dir: PathBuf,
    /// Keep uploaded files after the request finishes
    pub keep_uploads: bool,
    /// Generation budget per request
    pub max_new_tokens: usize,
    /// Deadline for one generation call once it has a permit (`None` = unbounded)
    pub inference_timeout: Option<Duration>,
    /// Number of generation calls allowed to run at once
    pub max_concurrent_inferences: usize,
    /// Request body cap in bytes (`None` = unlimited)
    pub max_upload_bytes: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::new(absolute(DEFAULT_MODEL_DIR)),
            scratch_dir: absolute(DEFAULT_SCRATCH_DIR),
            keep_uploads: false,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            inference_timeout: Some(Duration::from_secs(DEFAULT_INFERENCE_TIMEOUT_SECS)),
            max_concurrent_inferences: 1,
            max_upload_bytes: None,
        }
    }
}

/// Resolve `path` against the working directory without touching the filesystem.
pub fn absolute(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Final path component, ignoring `..` and trailing separators.
pub fn model_name(path: &Path) -> String {
    // `absolute` keeps `..` segments, so normalize them lexically first
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                normalized.pop();
            }
            std::path::Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    normalized
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
