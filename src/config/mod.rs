//! Configuration management.

mod file_config;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub use file_config::{default_config_path, find_config_file, write_default_config, ConfigFileError};

use crate::transport::HttpTransportConfig;
use crate::utils::DEFAULT_USER_AGENT;

/// Prefix of environment variable overrides, e.g. `DOC_INGESTOR_SERVER__PORT`
pub const ENV_PREFIX: &str = "DOC_INGESTOR";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP transport settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Page fetching settings
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Embeddings API settings
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    /// Vector store settings
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Greeting tool settings
    #[serde(default)]
    pub demo: DemoConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Endpoint path for POST/GET/DELETE
    pub path: String,
    /// Seconds between SSE keep-alive comments
    pub keep_alive_secs: u64,
    /// Events kept per session for resumption
    pub history_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            path: "/mcp".to_string(),
            keep_alive_secs: 15,
            history_capacity: 1024,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn http_transport(&self) -> HttpTransportConfig {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        HttpTransportConfig {
            path,
            sse_keep_alive: Duration::from_secs(self.keep_alive_secs.max(1)),
            history_capacity: self.history_capacity,
        }
    }
}

/// Scraper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// Embeddings API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    /// Base URL of an OpenAI-compatible API
    pub api_base: String,

    /// API key; falls back to `OPENAI_API_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub model: String,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: "text-embedding-3-small".to_string(),
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Chroma server URL
    pub url: String,
    pub tenant: String,
    pub database: String,
    /// Collection snippets are stored in
    pub collection: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            tenant: "default_tenant".to_string(),
            database: "default_database".to_string(),
            collection: "snippet".to_string(),
        }
    }
}

/// Greeting tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Pause between multi-greet notifications, in milliseconds
    pub multi_greet_delay_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            multi_greet_delay_ms: 1000,
        }
    }
}

impl DemoConfig {
    pub fn multi_greet_delay(&self) -> Duration {
        Duration::from_millis(self.multi_greet_delay_ms)
    }
}

/// Load configuration.
///
/// Sources, lowest precedence first: built-in defaults, the config file
/// (`path`, or the first discovered one), then `DOC_INGESTOR_*` environment
/// variables with `__` separating nested keys.
pub fn load_config(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    let mut builder = config::Config::builder();

    match path {
        Some(path) => {
            builder = builder.add_source(config::File::from(path));
        }
        None => {
            if let Some(found) = find_config_file() {
                tracing::debug!("Using config file: {}", found.display());
                builder = builder.add_source(config::File::from(found.as_path()));
            }
        }
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind_addr(), "127.0.0.1:3001");
        assert_eq!(config.server.path, "/mcp");
        assert_eq!(config.embeddings.model, "text-embedding-3-small");
        assert_eq!(config.vector_store.url, "http://localhost:8000");
        assert_eq!(config.vector_store.collection, "snippet");
        assert_eq!(config.demo.multi_greet_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_http_transport_normalizes_path() {
        let server = ServerConfig {
            path: "rpc".to_string(),
            keep_alive_secs: 0,
            ..Default::default()
        };
        let transport = server.http_transport();
        assert_eq!(transport.path, "/rpc");
        assert_eq!(transport.sse_keep_alive, Duration::from_secs(1));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc-ingestor.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 4100
path = "/rpc"

[vector_store]
url = "http://chroma:8000"

[demo]
multi_greet_delay_ms = 5
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.server.path, "/rpc");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.vector_store.url, "http://chroma:8000");
        assert_eq!(config.vector_store.collection, "snippet");
        assert_eq!(config.demo.multi_greet_delay_ms, 5);
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(load_config(Some(&path)).is_err());
    }
}
