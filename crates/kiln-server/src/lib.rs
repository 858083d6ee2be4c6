//! Kiln Server - HTTP front end for the Kiln generation engine
//!
//! Exposes a status route and a single-shot generate route over HTTP, with
//! request validation, per-request deadlines and structured error bodies.

/// Version of the kiln-server crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{create_router, KilnServer, ServerState};
