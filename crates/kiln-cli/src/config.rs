//! Configuration management for Kiln CLI
//!
//! The client reads the same file the server does and only looks at the
//! `[server]` section.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "kiln-server.toml";

/// Where to find the server
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Default, Deserialize)]
struct ServerFile {
    #[serde(default)]
    server: ServerSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ServerSection {
    host: String,
    port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let section = ServerSection::default();
        Self {
            host: section.host,
            port: section.port,
        }
    }
}

impl Config {
    /// Load from an explicit file, or from `kiln-server.toml` in the working
    /// directory when present; defaults otherwise
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = match config_path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let file: ServerFile = config::Config::builder()
            .add_source(config::File::from(path.as_path()))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Ok(Self {
            host: file.server.host,
            port: file.server.port,
        })
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    /// Base URL of the server. A wildcard listen address is reached through
    /// loopback.
    pub fn base_url(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" => "127.0.0.1",
            "::" => "[::1]",
            other => other,
        };
        format!("http://{}:{}", host, self.port)
    }
}
