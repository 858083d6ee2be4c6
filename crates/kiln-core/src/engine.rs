//! Generation engine: the autoregressive decode loop

use crate::{
    config::EngineConfig,
    executor::{ModelExecutor, TableExecutor},
    generation::{
        sampler::Sampler, shaper::shape, FinishReason, GenerationRequest, GenerationResult,
        Usage,
    },
    tokenizer::{bpe::BPETokenizer, Tokenizer, TokenizerConfig},
    validation::Validator,
    CoreError, Result,
};
use ndarray::{s, Array2};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Identity and limits reported by the status query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineInfo {
    pub model: String,
    pub precision: String,
    pub executor: String,
    pub vocab_size: usize,
    pub max_sequence_length: usize,
}

/// Drives tokenizer, executor, shaper and sampler for one request at a time
/// per executor call.
///
/// Requests are independent; the only state shared between them is the
/// immutable configuration and the executor, which sits behind a mutex so
/// forward passes from concurrent requests never interleave.
pub struct GenerationEngine {
    config: EngineConfig,
    tokenizer: Arc<dyn Tokenizer>,
    executor: Mutex<Box<dyn ModelExecutor>>,
    executor_name: String,
    vocab_size: usize,
}

impl GenerationEngine {
    /// Create an engine from already-initialized collaborators
    pub fn new(
        config: EngineConfig,
        tokenizer: Arc<dyn Tokenizer>,
        executor: Box<dyn ModelExecutor>,
    ) -> Result<Self> {
        config.validate()?;

        let vocab_size = executor.vocab_size();
        if tokenizer.vocab_size() > vocab_size {
            return Err(CoreError::configuration(
                "CONFIG_VOCAB_MISMATCH",
                format!(
                    "Tokenizer knows {} ids but the executor only scores {}",
                    tokenizer.vocab_size(),
                    vocab_size
                ),
                "Engine construction",
                "Use the tokenizer the artifact was compiled with",
            ));
        }
        if let Some(eos) = tokenizer.eos_token_id() {
            if eos as usize >= vocab_size {
                return Err(CoreError::configuration(
                    "CONFIG_EOS_OUT_OF_RANGE",
                    format!("EOS id {} is outside the executor vocabulary", eos),
                    "Engine construction",
                    "Check model.eos_token",
                ));
            }
        } else {
            warn!("Tokenizer has no end-of-sequence token; generation stops only on stop strings or max_tokens");
        }

        let executor_name = executor.name().to_string();
        info!(
            model = %config.model_name,
            precision = %config.precision,
            executor = %executor_name,
            vocab_size,
            "Generation engine ready"
        );

        Ok(Self {
            config,
            tokenizer,
            executor: Mutex::new(executor),
            executor_name,
            vocab_size,
        })
    }

    /// Load the BPE tokenizer and score table artifact from a model directory
    pub fn from_model_dir(
        config: EngineConfig,
        model_dir: &Path,
        artifact: &Path,
        tokenizer_config: &TokenizerConfig,
    ) -> Result<Self> {
        let model_dir = Validator::validate_model_dir(model_dir)?;
        let tokenizer = BPETokenizer::from_model_dir(&model_dir, tokenizer_config)?;
        let executor = TableExecutor::open(model_dir.join(artifact))?;
        Self::new(config, Arc::new(tokenizer), Box::new(executor))
    }

    /// Get engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Status query; no side effects
    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            model: self.config.model_name.clone(),
            precision: self.config.precision.clone(),
            executor: self.executor_name.clone(),
            vocab_size: self.vocab_size,
            max_sequence_length: self.config.max_sequence_length,
        }
    }

    /// Run one request to completion
    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        self.generate_with_cancel(request, &CancellationToken::new())
    }

    /// Run one request, checking `cancel` before every executor call.
    ///
    /// On any error, including cancellation, no partial text is returned.
    pub fn generate_with_cancel(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        let start = Instant::now();
        let params = request.resolve(&self.config.defaults)?;

        let prompt_ids = self.tokenizer.encode(&request.prompt)?;
        self.check_prompt(&prompt_ids)?;
        Validator::validate_sequence_budget(
            prompt_ids.len(),
            params.max_tokens,
            self.config.max_sequence_length,
        )?;
        debug!(
            prompt_tokens = prompt_ids.len(),
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            top_p = params.top_p,
            top_k = params.top_k,
            repetition_penalty = params.repetition_penalty,
            seeded = params.seed.is_some(),
            "Starting generation"
        );

        let prompt_len = prompt_ids.len();
        let mut sequence = prompt_ids;
        sequence.reserve(params.max_tokens);
        let mut sampler = Sampler::from_seed_opt(params.seed);
        let eos = self.tokenizer.eos_token_id();
        let mut finish_reason = FinishReason::Length;

        for step in 0..params.max_tokens {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled {
                    code: "GENERATION_CANCELLED",
                    message: format!("Generation cancelled after {} tokens", step),
                    tokens_generated: step,
                });
            }

            let scores = self.next_token_scores(&sequence)?;
            let dist = shape(&scores, &params, &sequence)?;
            let next_id = sampler.sample(&dist)?;
            sequence.push(next_id);
            trace!(step, token = next_id, "Sampled token");

            if Some(next_id) == eos {
                finish_reason = FinishReason::Stop;
                break;
            }
            if !params.stop.is_empty() {
                let generated = self.tokenizer.decode(&sequence[prompt_len..])?;
                if params.stop.iter().any(|s| generated.contains(s.as_str())) {
                    finish_reason = FinishReason::Stop;
                    break;
                }
            }
        }

        let completion = sequence.split_off(prompt_len);
        let text = self.tokenizer.decode(&completion)?;
        let usage = Usage::new(prompt_len, completion.len());
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        info!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            finish_reason = %finish_reason,
            duration_ms,
            "Generation finished"
        );

        Ok(GenerationResult {
            text,
            usage,
            finish_reason,
            duration_ms,
            tokens: completion,
        })
    }

    fn check_prompt(&self, prompt_ids: &[u32]) -> Result<()> {
        if prompt_ids.is_empty() {
            return Err(CoreError::tokenizer(
                "TOKENIZER_EMPTY_ENCODING",
                "Prompt encoded to zero tokens",
                "Prompt encoding",
                "Provide a prompt containing at least one encodable character",
            ));
        }
        if let Some(&bad) = prompt_ids.iter().find(|&&id| id as usize >= self.vocab_size) {
            return Err(CoreError::tokenizer(
                "TOKENIZER_ID_OUT_OF_RANGE",
                format!("Prompt token {} is outside the vocabulary of {}", bad, self.vocab_size),
                "Prompt encoding",
                "Use the tokenizer the artifact was compiled with",
            ));
        }
        Ok(())
    }

    /// One forward pass over the whole sequence; returns the final position's
    /// score vector
    fn next_token_scores(&self, sequence: &[u32]) -> Result<Vec<f32>> {
        let positions = sequence.len();
        let input_ids = Array2::from_shape_fn((1, positions), |(_, t)| i64::from(sequence[t]));
        let attention_mask = Array2::<i64>::ones((1, positions));

        let logits = {
            let mut executor = self.executor.lock();
            executor
                .run(&input_ids, &attention_mask)
                .map_err(|e| match e {
                    CoreError::Execution { .. } => e,
                    other => CoreError::execution(
                        "EXECUTION_FAILED",
                        other.to_string(),
                        "Model executor forward pass",
                        "Check the accelerator runtime logs",
                    ),
                })?
        };

        let (batch, out_positions, vocab) = logits.dim();
        if batch != 1
            || vocab != self.vocab_size
            || (out_positions != positions && out_positions != 1)
        {
            return Err(CoreError::execution_shape(
                "EXECUTION_BAD_OUTPUT_SHAPE",
                format!(
                    "Expected scores of shape [1, {} or 1, {}]",
                    positions, self.vocab_size
                ),
                &[batch, out_positions, vocab],
            ));
        }

        Ok(logits.slice(s![0, out_positions - 1, ..]).to_vec())
    }
}
