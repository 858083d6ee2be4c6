//! Configuration for the generation engine

use crate::{validation::Validator, Result};
use serde::{Deserialize, Serialize};

/// Main configuration for the generation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model identity reported by the status query
    pub model_name: String,

    /// Numeric precision the artifact was compiled for (e.g. "int8")
    pub precision: String,

    /// Longest sequence (prompt plus completion) the compiled model accepts
    pub max_sequence_length: usize,

    /// Defaults for every optional request field
    pub defaults: GenerationDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_name: "unnamed".to_string(),
            precision: "int8".to_string(),
            max_sequence_length: 2048,
            defaults: GenerationDefaults::default(),
        }
    }
}

impl EngineConfig {
    /// Check that the defaults would themselves pass request validation
    pub fn validate(&self) -> Result<()> {
        self.defaults.validate()?;
        if self.max_sequence_length == 0 {
            return Err(crate::CoreError::configuration(
                "CONFIG_ZERO_SEQUENCE_LENGTH",
                "max_sequence_length must be positive",
                "Engine configuration validation",
                "Set model.max_sequence_length to the sequence length the model was compiled for",
            ));
        }
        Ok(())
    }
}

/// Process-wide generation defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    /// Maximum number of tokens to generate
    pub max_tokens: usize,

    /// Temperature for sampling
    pub temperature: f32,

    /// Top-p (nucleus) sampling threshold, 1.0 disables
    pub top_p: f32,

    /// Top-k sampling limit, 0 disables
    pub top_k: usize,

    /// Repetition penalty, 1.0 disables
    pub repetition_penalty: f32,

    /// Seed used when a request does not carry one; entropy when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 50,
            repetition_penalty: 1.0,
            seed: None,
        }
    }
}

impl GenerationDefaults {
    pub fn validate(&self) -> Result<()> {
        Validator::validate_generation_params(
            Some(self.max_tokens),
            Some(self.temperature),
            Some(self.top_p),
            Some(self.repetition_penalty),
        )
        .map_err(|e| {
            crate::CoreError::configuration(
                "CONFIG_INVALID_DEFAULTS",
                format!("Invalid inference defaults: {}", e.message()),
                "Engine configuration validation",
                "Fix the [inference] section of the configuration file",
            )
        })
    }
}
