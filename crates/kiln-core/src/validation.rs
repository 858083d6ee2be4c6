//! Input validation utilities for Kiln Core
//!
//! Every check here runs before the first executor call, so a rejected request
//! never costs an accelerator invocation.

use crate::{CoreError, Result};
use std::path::{Path, PathBuf};

/// Validation utilities for common operations
pub struct Validator;

impl Validator {
    /// Validate generation parameters
    ///
    /// `None` means "not supplied"; only supplied values are checked. `top_k`
    /// is absent because every `usize` is a valid value (0 disables it).
    pub fn validate_generation_params(
        max_tokens: Option<usize>,
        temperature: Option<f32>,
        top_p: Option<f32>,
        repetition_penalty: Option<f32>,
    ) -> Result<()> {
        if let Some(max_tokens) = max_tokens {
            if max_tokens == 0 {
                return Err(CoreError::invalid_parameter(
                    "INVALID_MAX_TOKENS",
                    "max_tokens cannot be zero",
                    "Generation parameter validation",
                    "Use a positive value to generate at least one token",
                    "max_tokens",
                    "0",
                    ">= 1",
                ));
            }
        }

        if let Some(temperature) = temperature {
            if !temperature.is_finite() || temperature <= 0.0 {
                return Err(CoreError::invalid_parameter(
                    "INVALID_TEMPERATURE",
                    "temperature must be a finite value greater than zero",
                    "Generation parameter validation",
                    "Use a small positive value such as 0.1 for near-deterministic output",
                    "temperature",
                    temperature.to_string(),
                    "(0, +inf)",
                ));
            }
        }

        if let Some(top_p) = top_p {
            // NaN fails both comparisons, so test the accepted range directly
            if !(top_p > 0.0 && top_p <= 1.0) {
                return Err(CoreError::invalid_parameter(
                    "INVALID_TOP_P",
                    "top_p must be in (0, 1]",
                    "Generation parameter validation",
                    "Use 1.0 to disable nucleus filtering",
                    "top_p",
                    top_p.to_string(),
                    "(0, 1]",
                ));
            }
        }

        if let Some(penalty) = repetition_penalty {
            if !penalty.is_finite() || penalty <= 0.0 {
                return Err(CoreError::invalid_parameter(
                    "INVALID_REPETITION_PENALTY",
                    "repetition_penalty must be a finite value greater than zero",
                    "Generation parameter validation",
                    "Use values > 1.0 to penalize repetition, < 1.0 to encourage it, 1.0 to disable",
                    "repetition_penalty",
                    penalty.to_string(),
                    "(0, +inf)",
                ));
            }
        }

        Ok(())
    }

    /// Validate stop strings; an empty string would match every suffix
    pub fn validate_stop_sequences(stop: &[String]) -> Result<()> {
        if let Some(idx) = stop.iter().position(|s| s.is_empty()) {
            return Err(CoreError::invalid_parameter(
                "INVALID_STOP_SEQUENCE",
                format!("stop sequence at index {} is empty", idx),
                "Generation parameter validation",
                "Remove empty strings from the stop list",
                "stop",
                "\"\"",
                "non-empty strings",
            ));
        }
        Ok(())
    }

    /// Validate prompt text before tokenization
    pub fn validate_prompt(prompt: &str) -> Result<()> {
        if prompt.is_empty() {
            return Err(CoreError::invalid_parameter(
                "INVALID_EMPTY_PROMPT",
                "prompt cannot be empty",
                "Prompt validation",
                "Provide a non-empty prompt",
                "prompt",
                "\"\"",
                "non-empty text",
            ));
        }
        Ok(())
    }

    /// Validate that prompt plus completion fits the compiled sequence length
    pub fn validate_sequence_budget(
        prompt_tokens: usize,
        max_tokens: usize,
        max_sequence_length: usize,
    ) -> Result<()> {
        let required = prompt_tokens.saturating_add(max_tokens);
        if required > max_sequence_length {
            return Err(CoreError::invalid_parameter(
                "INVALID_SEQUENCE_LENGTH",
                format!(
                    "prompt ({} tokens) plus max_tokens ({}) exceeds the model limit of {}",
                    prompt_tokens, max_tokens, max_sequence_length
                ),
                "Sequence budget validation",
                "Shorten the prompt or lower max_tokens",
                "max_tokens",
                max_tokens.to_string(),
                format!("1 to {}", max_sequence_length.saturating_sub(prompt_tokens)),
            ));
        }
        Ok(())
    }

    /// Validate a model directory and return its canonical form
    pub fn validate_model_dir<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(CoreError::configuration(
                "CONFIG_MODEL_DIR_NOT_FOUND",
                format!("Model directory does not exist: {}", path.display()),
                "Model directory validation",
                "Check paths.models_dir and model.name in the configuration",
            ));
        }
        Ok(path.to_path_buf())
    }
}
