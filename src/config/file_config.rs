//! Configuration file support for doc-ingestor-mcp.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3001
//! path = "/mcp"
//! keep_alive_secs = 15
//! history_capacity = 1024
//!
//! [scraper]
//! user_agent = "doc-ingestor-mcp/0.1.0"
//! timeout_secs = 30
//! connect_timeout_secs = 10
//!
//! [embeddings]
//! api_base = "https://api.openai.com/v1"
//! api_key = "sk-..."
//! model = "text-embedding-3-small"
//!
//! [vector_store]
//! url = "http://localhost:8000"
//! tenant = "default_tenant"
//! database = "default_database"
//! collection = "snippet"
//!
//! [demo]
//! multi_greet_delay_ms = 1000
//! ```

use std::path::{Path, PathBuf};

use super::Config;

const LOCAL_CONFIG_FILE: &str = "doc-ingestor.toml";
const APP_DIR: &str = "doc-ingestor";

/// `<user config dir>/doc-ingestor/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

/// First existing config file: `./doc-ingestor.toml`, then the user config dir
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    default_config_path().filter(|path| path.is_file())
}

impl Config {
    /// Load configuration from a TOML file, without environment overrides
    pub fn load_file(path: &Path) -> Result<Self, ConfigFileError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigFileError::Parse(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigFileError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigFileError::Serialize(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigFileError::Io(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| ConfigFileError::Io(e.to_string()))
    }
}

/// Write a config file holding the defaults.
///
/// The API key is never written; it stays in the environment.
pub fn write_default_config(path: &Path, force: bool) -> Result<(), ConfigFileError> {
    if path.exists() && !force {
        return Err(ConfigFileError::Exists(path.to_path_buf()));
    }
    let mut config = Config::default();
    config.embeddings.api_key = None;
    config.save(path)
}

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Config file already exists: {}", .0.display())]
    Exists(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_config_file_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let toml_content = r#"
[server]
host = "0.0.0.0"
port = 8080

[embeddings]
api_key = "sk-test"
model = "text-embedding-3-large"

[vector_store]
collection = "docs"
"#;

        let mut file = File::create(&path).unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load_file(&path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.path, "/mcp");
        assert_eq!(config.embeddings.api_key, Some("sk-test".to_string()));
        assert_eq!(config.embeddings.model, "text-embedding-3-large");
        assert_eq!(config.vector_store.collection, "docs");
        assert_eq!(config.vector_store.url, "http://localhost:8000");
    }

    #[test]
    fn test_write_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        write_default_config(&path, false).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[server]"));
        assert!(!written.contains("api_key"));

        let loaded = Config::load_file(&path).unwrap();
        assert_eq!(loaded.server.port, 3001);

        assert!(matches!(
            write_default_config(&path, false),
            Err(ConfigFileError::Exists(_))
        ));
        assert!(write_default_config(&path, true).is_ok());
    }

    #[test]
    fn test_config_file_nonexistent() {
        let path = PathBuf::from("/nonexistent/config.toml");
        let result = Config::load_file(&path);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_file_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invalid.toml");

        std::fs::write(&path, "invalid = toml = content").unwrap();

        let result = Config::load_file(&path);
        assert!(result.is_err());
    }
}
