//! HTTP client for the kiln-server routes

use anyhow::{bail, Context, Result};
use kiln_core::{GenerationRequest, GenerationResult};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct KilnClient {
    http: reqwest::Client,
    base_url: String,
}

/// A generation result plus the client-observed round trip
#[derive(Debug)]
pub struct TimedGeneration {
    pub result: GenerationResult,
    pub round_trip: Duration,
}

impl KilnClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /`
    pub async fn status(&self) -> Result<Value> {
        let url = format!("{}/", self.base_url);
        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;
        Self::json_or_error(response).await
    }

    /// `POST /v1/generate`
    pub async fn generate(&self, request: &GenerationRequest) -> Result<TimedGeneration> {
        let url = format!("{}/v1/generate", self.base_url);
        debug!("POST {} ({} prompt chars)", url, request.prompt.len());

        let start = Instant::now();
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;
        let body = Self::json_or_error(response).await?;
        let round_trip = start.elapsed();

        let result = serde_json::from_value(body).context("Unexpected generate response")?;
        Ok(TimedGeneration { result, round_trip })
    }

    async fn json_or_error(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let text = response.text().await.context("Failed to read response body")?;
        if status.is_success() {
            return serde_json::from_str(&text).context("Server returned invalid JSON");
        }

        // Prefer the structured error body; fall back to whatever came back
        match serde_json::from_str::<Value>(&text) {
            Ok(body) if body["error"].is_object() => bail!(
                "server returned {} ({}): {}",
                status,
                body["error"]["code"].as_str().unwrap_or("unknown"),
                body["error"]["message"].as_str().unwrap_or_default()
            ),
            _ => bail!("server returned {}: {}", status, text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{
        executor::TableExecutor,
        tokenizer::{bpe::BPETokenizer, vocab::Vocabulary, TokenizerConfig},
        FinishReason, GenerationEngine,
    };
    use kiln_server::{create_router, ServerConfig, ServerState};
    use std::sync::Arc;

    /// Serve a tiny model on an ephemeral port and return its base URL
    async fn spawn_server() -> String {
        let vocab =
            Vocabulary::from_json(r#"{"o": 0, "k": 1, "<|endoftext|>": 2}"#).unwrap();
        let tokenizer =
            BPETokenizer::from_parts(vocab, Vec::new(), &TokenizerConfig::default()).unwrap();
        let row = [10.0, -10.0, f32::NEG_INFINITY];
        let table: Vec<f32> = (0..3).flat_map(|_| row).collect();
        let executor = TableExecutor::from_table("oo", 3, table).unwrap();

        let mut config = ServerConfig::default();
        config.model.name = "oo".to_string();
        let engine =
            GenerationEngine::new(config.engine_config(), Arc::new(tokenizer), Box::new(executor))
                .unwrap();
        let router = create_router(ServerState {
            config: Arc::new(config),
            engine: Arc::new(engine),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_status_round_trip() {
        let client = KilnClient::new(spawn_server().await);
        let status = client.status().await.unwrap();
        assert_eq!(status["model"], "oo");
        assert_eq!(status["precision"], "int8");
    }

    #[tokio::test]
    async fn test_generate_round_trip() {
        let client = KilnClient::new(spawn_server().await);
        let request = GenerationRequest::new("ok").with_max_tokens(3).with_seed(3);
        let timed = client.generate(&request).await.unwrap();

        assert_eq!(timed.result.text, "ooo");
        assert_eq!(timed.result.finish_reason, FinishReason::Length);
        assert_eq!(timed.result.usage.total_tokens, 5);
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let client = KilnClient::new(spawn_server().await);
        let request = GenerationRequest::new("ok").with_temperature(0.0);
        let err = client.generate(&request).await.unwrap_err();
        assert!(err.to_string().contains("INVALID_TEMPERATURE"), "{err}");
    }
}
