//! Request/response contract and the resolved sampling parameters

pub mod sampler;
pub mod shaper;

use crate::{config::GenerationDefaults, validation::Validator, Result};
use serde::{Deserialize, Serialize};

/// A generation request as received from the serving boundary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Seed for reproducible sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_repetition_penalty(mut self, penalty: f32) -> Self {
        self.repetition_penalty = Some(penalty);
        self
    }

    pub fn with_stop<I, S>(mut self, stop: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop = Some(stop.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Merge request overrides over the configured defaults and validate the
    /// result. This is the only place where defaulting happens.
    pub fn resolve(&self, defaults: &GenerationDefaults) -> Result<SamplingParams> {
        Validator::validate_prompt(&self.prompt)?;

        let params = SamplingParams {
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            top_k: self.top_k.unwrap_or(defaults.top_k),
            repetition_penalty: self.repetition_penalty.unwrap_or(defaults.repetition_penalty),
            stop: self.stop.clone().unwrap_or_default(),
            seed: self.seed.or(defaults.seed),
        };
        params.validate()?;
        Ok(params)
    }
}

/// Fully resolved, validated parameters for one decode loop
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: usize,
    pub repetition_penalty: f32,
    pub stop: Vec<String>,
    pub seed: Option<u64>,
}

impl SamplingParams {
    pub fn validate(&self) -> Result<()> {
        Validator::validate_generation_params(
            Some(self.max_tokens),
            Some(self.temperature),
            Some(self.top_p),
            Some(self.repetition_penalty),
        )?;
        Validator::validate_stop_sequences(&self.stop)
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        let defaults = GenerationDefaults::default();
        Self {
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            top_p: defaults.top_p,
            top_k: defaults.top_k,
            repetition_penalty: defaults.repetition_penalty,
            stop: Vec::new(),
            seed: defaults.seed,
        }
    }
}

/// Result of a generation operation, serialized as the response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Generated text with special tokens removed
    pub text: String,

    /// Token accounting
    pub usage: Usage,

    /// Reason generation stopped
    pub finish_reason: FinishReason,

    /// Wall-clock time spent in the engine
    pub duration_ms: f64,

    /// Generated token ids, including a trailing end-of-sequence id
    #[serde(skip)]
    pub tokens: Vec<u32>,
}

/// Token counts for one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Reason why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// End-of-sequence token sampled or a stop string matched
    Stop,

    /// Reached max_tokens limit
    Length,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_resolve_prefers_request_overrides() {
        let defaults = GenerationDefaults::default();
        let request = GenerationRequest::new("hi")
            .with_max_tokens(8)
            .with_temperature(1.3)
            .with_top_k(0)
            .with_stop(["END"]);
        let params = request.resolve(&defaults).unwrap();

        assert_eq!(params.max_tokens, 8);
        assert_eq!(params.temperature, 1.3);
        assert_eq!(params.top_k, 0);
        assert_eq!(params.top_p, defaults.top_p);
        assert_eq!(params.repetition_penalty, defaults.repetition_penalty);
        assert_eq!(params.stop, vec!["END".to_string()]);
    }

    #[test]
    fn test_resolve_falls_back_to_defaults() {
        let defaults = GenerationDefaults {
            seed: Some(7),
            ..Default::default()
        };
        let params = GenerationRequest::new("hi").resolve(&defaults).unwrap();
        assert_eq!(params.max_tokens, defaults.max_tokens);
        assert_eq!(params.seed, Some(7));
        assert!(params.stop.is_empty());
    }

    #[test]
    fn test_resolve_rejects_invalid_override() {
        let err = GenerationRequest::new("hi")
            .with_temperature(-1.0)
            .resolve(&GenerationDefaults::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_request_deserialization() {
        let request: GenerationRequest = serde_json::from_str(
            r#"{"prompt": "Hello", "max_tokens": 4, "stop": ["\n"]}"#,
        )
        .unwrap();
        assert_eq!(request.prompt, "Hello");
        assert_eq!(request.max_tokens, Some(4));
        assert_eq!(request.temperature, None);
        assert_eq!(request.stop, Some(vec!["\n".to_string()]));
    }

    #[test]
    fn test_result_serialization_shape() {
        let result = GenerationResult {
            text: "ok".to_string(),
            usage: Usage::new(3, 2),
            finish_reason: FinishReason::Length,
            duration_ms: 1.5,
            tokens: vec![5, 6],
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["finish_reason"], "length");
        assert_eq!(value["usage"]["total_tokens"], 5);
        assert!(value.get("tokens").is_none());
    }
}
