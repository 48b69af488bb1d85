//! Role Access Configuration
//!
//! TOML-based configuration with environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mongodb: MongoConfig,
    pub cache: CacheConfig,
}

/// MongoDB configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    /// Collection holding role documents
    pub roles_collection: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "role_access".to_string(),
            roles_collection: "roles".to_string(),
        }
    }
}

/// Which cache implementation backs the role cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
}

impl std::str::FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "redis" => Ok(CacheBackend::Redis),
            other => Err(ConfigError::ValidationError(format!(
                "unknown cache backend '{}', expected 'memory' or 'redis'",
                other
            ))),
        }
    }
}

/// Role cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Namespace every role entry lives under
    pub region: String,
    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            region: "roles".to_string(),
            redis: RedisConfig::default(),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            prefix: "role-access".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("mongodb.uri", &self.mongodb.uri),
            ("mongodb.database", &self.mongodb.database),
            ("mongodb.roles_collection", &self.mongodb.roles_collection),
            ("cache.region", &self.cache.region),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{} must not be empty", field)));
            }
        }

        if self.cache.backend == CacheBackend::Redis && self.cache.redis.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "cache.redis.url is required when cache.backend = \"redis\"".to_string(),
            ));
        }

        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Role Access Configuration
# Environment variables (ROLE_ACCESS_*) override these settings

[mongodb]
uri = "mongodb://localhost:27017"
database = "role_access"
roles_collection = "roles"

[cache]
backend = "memory"  # memory or redis
region = "roles"

[cache.redis]
url = "redis://localhost:6379"
prefix = "role-access"
"#
        .to_string()
    }
}
