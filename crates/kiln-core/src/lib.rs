//! Kiln Core - decoding and sampling engine
//!
//! This crate drives autoregressive generation against a compiled model
//! executor: it encodes the prompt, calls the executor once per step, shapes
//! the returned scores into a distribution, samples the next token and decides
//! when generation stops.

// Module declarations
pub mod config;
pub mod engine;
pub mod executor;
pub mod generation;
pub mod tokenizer;
pub mod validation;

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Out-of-range or malformed generation parameters
    #[error("Invalid input [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    InvalidInput {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        parameter_name: Option<String>,
        value: Option<String>,
        valid_range: Option<String>,
    },

    /// Shaping removed all probability mass
    #[error("Degenerate distribution [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    DegenerateDistribution {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
    },

    /// The model executor failed or returned malformed output
    #[error("Execution error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Execution {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        shape: Option<Vec<usize>>,
    },

    /// Prompt encoding, decoding or tokenizer loading errors
    #[error("Tokenizer error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Tokenizer {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
    },

    /// Configuration parsing and validation errors
    #[error("Configuration error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Configuration {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        field_name: Option<String>,
    },

    /// Generation was cancelled before completion
    #[error("Cancelled [{code}]: {message}")]
    Cancelled {
        code: &'static str,
        message: String,
        tokens_generated: usize,
    },

    /// File system and I/O errors
    #[error("IO error [{code}]: {message}\nPath: {path:?}\nSuggestion: {suggestion}")]
    Io {
        code: &'static str,
        message: String,
        path: Option<std::path::PathBuf>,
        suggestion: String,
        #[source]
        source: std::io::Error,
    },

    /// Other unexpected errors
    #[error("Internal error [{code}]: {message}\nContext: {context}")]
    Internal {
        code: &'static str,
        message: String,
        context: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Coarse error classification surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidParameter,
    DegenerateDistribution,
    ExecutionError,
    TokenizationError,
    Configuration,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidParameter => "invalid_parameter",
            Self::DegenerateDistribution => "degenerate_distribution",
            Self::ExecutionError => "execution_error",
            Self::TokenizationError => "tokenization_error",
            Self::Configuration => "configuration",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CoreError {
    /// Create an invalid input error with parameter validation details
    pub fn invalid_parameter<S1, S2, S3, S4, S5, S6>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        param_name: S4,
        value: S5,
        valid_range: S6,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        S4: Into<String>,
        S5: Into<String>,
        S6: Into<String>,
    {
        Self::InvalidInput {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            parameter_name: Some(param_name.into()),
            value: Some(value.into()),
            valid_range: Some(valid_range.into()),
        }
    }

    /// Create a degenerate distribution error
    pub fn degenerate<S1, S2>(code: &'static str, message: S1, context: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::DegenerateDistribution {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: "Relax top_k/top_p or check the model output for non-finite scores"
                .to_string(),
        }
    }

    /// Create an executor error
    pub fn execution<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Execution {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            shape: None,
        }
    }

    /// Create an executor error describing an unexpected output shape
    pub fn execution_shape<S1>(code: &'static str, message: S1, shape: &[usize]) -> Self
    where
        S1: Into<String>,
    {
        Self::Execution {
            code,
            message: message.into(),
            context: format!("Executor returned tensor of shape {:?}", shape),
            suggestion: "Check that the compiled artifact matches the tokenizer vocabulary"
                .to_string(),
            shape: Some(shape.to_vec()),
        }
    }

    /// Create a tokenizer error
    pub fn tokenizer<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Tokenizer {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Configuration {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            field_name: None,
        }
    }

    /// Create an I/O error that remembers the offending path
    pub fn io_with_path<P: Into<std::path::PathBuf>>(source: std::io::Error, path: P) -> Self {
        let mut err = Self::from(source);
        if let Self::Io { path: slot, .. } = &mut err {
            *slot = Some(path.into());
        }
        err
    }

    /// Get the error code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { code, .. } => code,
            Self::DegenerateDistribution { code, .. } => code,
            Self::Execution { code, .. } => code,
            Self::Tokenizer { code, .. } => code,
            Self::Configuration { code, .. } => code,
            Self::Cancelled { code, .. } => code,
            Self::Io { code, .. } => code,
            Self::Internal { code, .. } => code,
        }
    }

    /// Get the coarse error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidParameter,
            Self::DegenerateDistribution { .. } => ErrorKind::DegenerateDistribution,
            Self::Execution { .. } => ErrorKind::ExecutionError,
            Self::Tokenizer { .. } => ErrorKind::TokenizationError,
            Self::Configuration { .. } | Self::Io { .. } => ErrorKind::Configuration,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Short human-readable message without context or suggestion
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidInput { message, .. }
            | Self::DegenerateDistribution { message, .. }
            | Self::Execution { message, .. }
            | Self::Tokenizer { message, .. }
            | Self::Configuration { message, .. }
            | Self::Cancelled { message, .. }
            | Self::Io { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        let (code, suggestion) = match err.kind() {
            std::io::ErrorKind::NotFound => (
                "IO_FILE_NOT_FOUND",
                "Check that the file path is correct and the file exists",
            ),
            std::io::ErrorKind::PermissionDenied => (
                "IO_PERMISSION_DENIED",
                "Check file permissions or run with appropriate privileges",
            ),
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => (
                "IO_INVALID_DATA",
                "The file may be corrupted or in an unexpected format",
            ),
            _ => (
                "IO_UNKNOWN",
                "Check the file system and try the operation again",
            ),
        };

        Self::Io {
            code,
            message: err.to_string(),
            path: None,
            suggestion: suggestion.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            code: "INTERNAL_UNKNOWN",
            message: err.to_string(),
            context: "An unexpected error occurred".to_string(),
            source: Some(err),
        }
    }
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        config::{EngineConfig, GenerationDefaults},
        engine::{EngineInfo, GenerationEngine},
        executor::{ModelExecutor, TableExecutor},
        generation::{
            sampler::Sampler, shaper::shape, FinishReason, GenerationRequest, GenerationResult,
            SamplingParams, Usage,
        },
        tokenizer::{bpe::BPETokenizer, Tokenizer, TokenizerConfig},
        validation::Validator,
        CoreError, ErrorKind, Result,
    };
}

// Re-export key types at the crate root
pub use config::EngineConfig;
pub use engine::GenerationEngine;
pub use generation::{FinishReason, GenerationRequest, GenerationResult};

pub mod error {
    pub use super::{CoreError, ErrorKind, Result};
}
