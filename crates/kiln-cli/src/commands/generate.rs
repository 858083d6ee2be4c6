//! Generate command: send one prompt to `POST /v1/generate`

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use console::style;
use serde_json::json;
use tracing::{info, warn};

use crate::client::KilnClient;
use crate::commands::Command;
use crate::config::Config;
use crate::utils::{format_duration, print_output};
use kiln_core::GenerationRequest;

#[derive(Args, Debug)]
pub struct GenerateCommand {
    /// Prompt text
    #[arg(short, long, default_value = "Hello! Tell me about the AMD Alveo U250.")]
    pub prompt: String,

    /// Maximum number of tokens to generate (server default when omitted)
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Nucleus sampling threshold
    #[arg(long)]
    pub top_p: Option<f32>,

    /// Top-k candidate limit, 0 disables
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Repetition penalty
    #[arg(long)]
    pub repetition_penalty: Option<f32>,

    /// Stop string (repeatable)
    #[arg(long = "stop")]
    pub stop: Vec<String>,

    /// Seed for reproducible sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Skip the status check before generating
    #[arg(long)]
    pub no_status: bool,
}

impl GenerateCommand {
    fn request(&self) -> GenerationRequest {
        GenerationRequest {
            prompt: self.prompt.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            repetition_penalty: self.repetition_penalty,
            stop: (!self.stop.is_empty()).then(|| self.stop.clone()),
            seed: self.seed,
        }
    }
}

#[async_trait]
impl Command for GenerateCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        let client = KilnClient::new(config.base_url());

        if !self.no_status {
            match client.status().await {
                Ok(status) if !json_output => {
                    println!("{} {}", style("Server:").bold(), client.base_url());
                    print_output(&status, false)?;
                    println!();
                }
                Ok(_) => {}
                Err(e) => warn!("Status check failed: {:#}", e),
            }
        }

        info!("Sending prompt to {}", client.base_url());
        let timed = client.generate(&self.request()).await?;
        let result = &timed.result;

        if json_output {
            return print_output(
                &json!({
                    "text": result.text,
                    "usage": result.usage,
                    "finish_reason": result.finish_reason,
                    "duration_ms": result.duration_ms,
                    "round_trip_ms": timed.round_trip.as_secs_f64() * 1000.0,
                }),
                true,
            );
        }

        println!("{}", style("Generated text:").bold());
        println!("{}", result.text);
        println!();
        println!("{}", style("Statistics:").bold());
        println!("  Prompt tokens:     {}", result.usage.prompt_tokens);
        println!("  Completion tokens: {}", result.usage.completion_tokens);
        println!("  Total tokens:      {}", result.usage.total_tokens);
        println!("  Finish reason:     {}", result.finish_reason);
        println!("  Generation time:   {:.2}ms", result.duration_ms);
        println!("  Request time:      {}", format_duration(timed.round_trip));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_leaves_unset_fields_to_server() {
        let cmd = GenerateCommand {
            prompt: "hi".to_string(),
            max_tokens: Some(8),
            temperature: None,
            top_p: None,
            top_k: None,
            repetition_penalty: None,
            stop: Vec::new(),
            seed: None,
            no_status: true,
        };
        let request = cmd.request();
        assert_eq!(request.max_tokens, Some(8));
        assert_eq!(request.temperature, None);
        assert_eq!(request.stop, None);

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body, json!({"prompt": "hi", "max_tokens": 8}));
    }
}
