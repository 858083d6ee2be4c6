//! Server configuration

use kiln_core::{config::GenerationDefaults, tokenizer::TokenizerConfig, EngineConfig};
use serde::{Deserialize, Serialize};
use std::{
    net::{SocketAddr, ToSocketAddrs},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::{ServerError, ServerResult};

/// Main server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listening address
    pub server: HttpConfig,

    /// Model identity and tokenizer settings
    pub model: ModelConfig,

    /// Storage locations
    pub paths: PathsConfig,

    /// Defaults for optional request fields
    pub inference: GenerationDefaults,

    /// Request limits
    pub limits: RequestLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory name under `paths.models_dir`, also reported by the status route
    pub name: String,

    /// Upstream repository the model was exported from; informational only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,

    /// Numeric precision the artifact was compiled for
    pub precision: String,

    pub max_sequence_length: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub eos_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unk_token: Option<String>,

    /// Compiled artifact, relative to the model directory
    pub artifact: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub models_dir: PathBuf,
}

/// Request size and time limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestLimits {
    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Deadline for one generate request, in seconds
    pub request_timeout_secs: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "qwen2.5-0.5b".to_string(),
            repo_id: None,
            precision: "int8".to_string(),
            max_sequence_length: 2048,
            eos_token: Some("<|endoftext|>".to_string()),
            unk_token: None,
            artifact: PathBuf::from(kiln_core::executor::TableExecutor::DEFAULT_ARTIFACT),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("./models"),
        }
    }
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
            request_timeout_secs: 300.0,
        }
    }
}

impl RequestLimits {
    /// Per-request deadline. Values [`ServerConfig::validate`] rejects fall
    /// back to no practical limit rather than panicking.
    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout_secs).unwrap_or(Duration::MAX)
    }
}

impl ServerConfig {
    /// Load configuration from file, with `KILN_SECTION__FIELD` environment
    /// overrides on top
    pub fn from_file(path: &Path) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("KILN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Save configuration to file
    pub fn to_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Check values that deserialization alone cannot
    pub fn validate(&self) -> ServerResult<()> {
        self.engine_config().validate()?;
        self.bind_addr()?;
        if self.model.name.is_empty() {
            return Err(ServerError::Config("model.name must not be empty".to_string()));
        }
        if self.limits.max_body_size == 0 {
            return Err(ServerError::Config(
                "limits.max_body_size must be positive".to_string(),
            ));
        }
        let timeout_secs = self.limits.request_timeout_secs;
        if !(timeout_secs > 0.0 && Duration::try_from_secs_f64(timeout_secs).is_ok()) {
            return Err(ServerError::Config(format!(
                "limits.request_timeout_secs must be a positive number of seconds, got {}",
                self.limits.request_timeout_secs
            )));
        }
        Ok(())
    }

    /// Resolve `server.host:server.port`
    pub fn bind_addr(&self) -> ServerResult<SocketAddr> {
        (self.server.host.as_str(), self.server.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| {
                ServerError::Config(format!(
                    "Invalid bind address: {}:{}",
                    self.server.host, self.server.port
                ))
            })
    }

    /// Directory holding the tokenizer files and compiled artifact
    pub fn model_dir(&self) -> PathBuf {
        self.paths.models_dir.join(&self.model.name)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            model_name: self.model.name.clone(),
            precision: self.model.precision.clone(),
            max_sequence_length: self.model.max_sequence_length,
            defaults: self.inference.clone(),
        }
    }

    pub fn tokenizer_config(&self) -> TokenizerConfig {
        TokenizerConfig::for_model_dir(&self.model_dir())
            .with_eos_token(self.model.eos_token.clone())
            .with_unk_token(self.model.unk_token.clone())
    }
}
