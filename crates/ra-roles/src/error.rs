//! Role Access Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoleError {
    #[error("Error retrieving role {role_name}: {message}")]
    Lookup { role_name: String, message: String },

    #[error("Failed to update role {role_name}: {message}")]
    Update { role_name: String, message: String },

    #[error("Duplicate role: {role_name}")]
    Duplicate { role_name: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bson::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] bson::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RoleError {
    /// Wrap a lookup failure, keeping the cause's message.
    pub fn lookup(role_name: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Lookup {
            role_name: role_name.into(),
            message: cause.to_string(),
        }
    }

    /// Wrap an update failure, keeping the cause's message.
    pub fn update(role_name: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Update {
            role_name: role_name.into(),
            message: cause.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, RoleError>;
