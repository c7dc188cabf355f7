//! # cosmos shared library
//!
//! Infrastructure shared by the cosmos Rust components:
//! - **error**: Common error type with context
//! - **tracing**: Logging setup and segment prefixes
//! - **server**: HTTP server bootstrap with graceful shutdown (feature `server`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cosmos::server::HttpServer;
//! use cosmos::error::Error;
//! ```

#[cfg(feature = "server")]
pub mod server;

pub mod error;
pub mod tracing;

pub use error::{Error, Result};
