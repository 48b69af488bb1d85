//! Configuration loader with file and environment variable support

use crate::{AppConfig, CacheBackend, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "role-access.toml",
    "./config/config.toml",
    "/etc/role-access/config.toml",
];

pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        self.load_with(|key| env::var(key).ok())
    }

    /// Same as [`load`](Self::load) but reads variables through `lookup`.
    pub fn load_with<F>(&self, lookup: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match self.find_config_file(&lookup) {
            Some(path) => {
                info!(?path, "Loading configuration from file");
                AppConfig::from_file(&path)?
            }
            None => AppConfig::default(),
        };

        apply_overrides(&mut config, &lookup);
        config.validate()?;

        Ok(config)
    }

    fn find_config_file<F>(&self, lookup: &F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Some(path) = lookup("ROLE_ACCESS_CONFIG").map(PathBuf::from) {
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_overrides<F>(config: &mut AppConfig, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    // MongoDB
    if let Some(val) = lookup("ROLE_ACCESS_MONGODB_URI") {
        config.mongodb.uri = val;
    }
    if let Some(val) = lookup("ROLE_ACCESS_MONGODB_DATABASE") {
        config.mongodb.database = val;
    }
    if let Some(val) = lookup("ROLE_ACCESS_ROLES_COLLECTION") {
        config.mongodb.roles_collection = val;
    }

    // Cache
    if let Some(val) = lookup("ROLE_ACCESS_CACHE_BACKEND") {
        match val.parse::<CacheBackend>() {
            Ok(backend) => config.cache.backend = backend,
            Err(e) => warn!(error = %e, "Ignoring ROLE_ACCESS_CACHE_BACKEND"),
        }
    }
    if let Some(val) = lookup("ROLE_ACCESS_CACHE_REGION") {
        config.cache.region = val;
    }
    if let Some(val) = lookup("ROLE_ACCESS_REDIS_URL") {
        config.cache.redis.url = val;
    }
    if let Some(val) = lookup("ROLE_ACCESS_REDIS_PREFIX") {
        config.cache.redis.prefix = val;
    }
}
