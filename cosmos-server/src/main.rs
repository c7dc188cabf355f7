//! cosmos video analysis server - Main Entry Point
//!
//! Usage:
//!     cosmos-server --port 8000
//!     PORT=9000 cosmos-server --model-path /srv/cosmos-model

use clap::Parser;
use cosmos::server::HttpServer;
use cosmos_server::config::{self, ServerConfig, SessionConfig};
use cosmos_server::{create_router, pipeline, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cosmos-server")]
#[command(about = "HTTP server for video + text analysis with a multimodal model")]
#[command(version)]
struct Args {
    /// HTTP server port
    #[arg(short, long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Bind host
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Model artifact directory
    #[arg(long, env = "COSMOS_MODEL_PATH", default_value = config::DEFAULT_MODEL_DIR)]
    model_path: PathBuf,

    /// Directory uploaded videos are written to
    #[arg(long, env = "COSMOS_SCRATCH_DIR", default_value = config::DEFAULT_SCRATCH_DIR)]
    scratch_dir: PathBuf,

    /// Keep uploaded videos after each request
    #[arg(long)]
    keep_uploads: bool,

    /// Generation budget per request
    #[arg(long, default_value_t = config::DEFAULT_MAX_NEW_TOKENS)]
    max_new_tokens: usize,

    /// Deadline for one generation call in seconds, excluding queue wait (0 = unbounded)
    #[arg(long, default_value_t = config::DEFAULT_INFERENCE_TIMEOUT_SECS)]
    inference_timeout_secs: u64,

    /// Generation calls allowed to run at once
    #[arg(long, default_value_t = 1)]
    max_concurrent_inferences: usize,

    /// Cap on request body size in bytes (unlimited when unset)
    #[arg(long)]
    max_upload_bytes: Option<usize>,

    /// Remember the first model load failure instead of retrying on each request
    #[arg(long)]
    cache_load_failure: bool,

    /// Log level (debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let mut session = SessionConfig::new(config::absolute(&self.model_path));
        session.cache_load_failure = self.cache_load_failure;

        ServerConfig {
            session,
            scratch_dir: config::absolute(&self.scratch_dir),
            keep_uploads: self.keep_uploads,
            max_new_tokens: self.max_new_tokens,
            inference_timeout: (self.inference_timeout_secs > 0)
                .then(|| Duration::from_secs(self.inference_timeout_secs)),
            max_concurrent_inferences: self.max_concurrent_inferences,
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

#[tokio::main]
async fn main() -> cosmos::Result<()> {
    let args = Args::parse();

    let filter = match args.log_level.as_str() {
        "debug" | "warn" | "error" => format!("{},tower_http=info", args.log_level),
        _ => "info,tower_http=info".to_string(),
    };
    cosmos::tracing::init_with_filter(&filter);

    let config = args.server_config();
    info!("Model path: {}", config.session.model_path.display());
    info!("Scratch directory: {}", config.scratch_dir.display());

    // The model loads on the first /health or /analyze call
    let state = AppState::new(&config, pipeline::default_factory());
    let router = create_router(state, config.max_upload_bytes);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|e| {
            cosmos::Error::Config(format!(
                "invalid address '{}:{}': {}",
                args.host, args.port, e
            ))
        })?;

    HttpServer::new("cosmos-server", env!("CARGO_PKG_VERSION"))
        .address(addr)
        .serve(router)
        .await?;

    Ok(())
}
