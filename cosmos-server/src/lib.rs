//! cosmos video analysis server
//!
//! Serves a multimodal (video + text) model over HTTP: `GET /health` reports
//! whether the model is loaded, `POST /analyze` answers a prompt about an
//! uploaded video.
//!
//! ## Module Structure
//!
//! - `config` - Server and session configuration
//! - `session` - Lazily constructed, process-wide inference session
//! - `pipeline` - Generation backend traits
//! - `python` - `transformers` backend via PyO3 (feature `python`)
//! - `upload` - Scratch storage for uploaded videos
//! - `compose` - Multimodal chat message composition
//! - `inference` - Deadline- and concurrency-bounded generation calls
//! - `extract` - Answer extraction from raw pipeline output
//! - `health` - Readiness reporting
//! - `handlers`, `router`, `error`, `state` - HTTP surface

pub mod compose;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod health;
pub mod inference;
pub mod pipeline;
#[cfg(feature = "python")]
pub mod python;
pub mod router;
pub mod session;
pub mod state;
pub mod upload;

pub use config::{ServerConfig, SessionConfig};
pub use pipeline::{Pipeline, PipelineFactory};
pub use router::create_router;
pub use session::{Session, SessionManager};
pub use state::AppState;
