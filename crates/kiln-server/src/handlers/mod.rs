//! HTTP request handlers

pub mod generate;
pub mod health;
pub mod status;

// Re-export handler modules for convenience
pub use generate::*;
pub use health::*;
pub use status::*;
