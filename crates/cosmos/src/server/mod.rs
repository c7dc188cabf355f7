//! HTTP server infrastructure for cosmos services.

mod http;
mod shutdown;

pub use http::HttpServer;
pub use shutdown::shutdown_signal;
