//! Server configuration loaded from JSON, with every field defaulted

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum number of simultaneously connected clients
    pub client_capacity: usize,
    pub client: ClientConfig,
    pub file: FileConfig,
    pub cache: CacheConfig,
}

/// Per-connection buffer and queue sizes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub input_capacity: usize,
    pub output_capacity: usize,
    /// Decoded messages waiting for dispatch
    pub message_capacity: usize,
    /// Output commands waiting for the output loop
    pub command_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Maximum number of concurrent sessions
    pub capacity: usize,
    pub workers: usize,
    pub supported_version: u32,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub priority_capacity: usize,
    pub passive_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub path: PathBuf,
    pub package_count: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 43594,
            client_capacity: 2000,
            client: ClientConfig::default(),
            file: FileConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            input_capacity: 10240,
            output_capacity: 10240,
            message_capacity: 1000,
            command_capacity: 64,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            workers: 2,
            supported_version: 177,
            session: SessionConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            priority_capacity: 200,
            passive_capacity: 200,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cache"),
            package_count: 21,
        }
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address(), "0.0.0.0:43594");
        assert_eq!(config.client.output_capacity, 10240);
        assert_eq!(config.file.supported_version, 177);
        assert_eq!(config.file.session.priority_capacity, 200);
        assert_eq!(config.cache.package_count, 21);
    }

    #[test]
    fn test_partial_file_keeps_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "port": 5000, "file": {{ "workers": 8, "session": {{ "passive_capacity": 3 }} }} }}"#
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.file.workers, 8);
        assert_eq!(config.file.capacity, 1000);
        assert_eq!(config.file.session.passive_capacity, 3);
        assert_eq!(config.file.session.priority_capacity, 200);
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ \"port\": \"not a number\" }}").unwrap();
        assert!(matches!(
            ServerConfig::load(file.path()),
            Err(ConfigError::Json(_))
        ));
    }
}
