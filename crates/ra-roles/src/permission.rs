//! Permission Types and Validators
//!
//! Each permission type (prompt sharing, bookmark sharing, ...) is a named
//! category of boolean flags with its own schema. Validators are looked up
//! by type in a [`PermissionRegistry`], so new categories only need a
//! registration.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};

use crate::error::{Result, RoleError};
use crate::role::PermissionSet;

/// Permission flag names
pub mod flags {
    pub const SHARED_GLOBAL: &str = "SHARED_GLOBAL";
    pub const USE: &str = "USE";
    pub const CREATE: &str = "CREATE";
}

/// Tag naming a permission category; doubles as the role field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionType(Cow<'static, str>);

impl PermissionType {
    pub const PROMPTS: PermissionType = PermissionType(Cow::Borrowed("PROMPTS"));
    pub const BOOKMARKS: PermissionType = PermissionType(Cow::Borrowed("BOOKMARKS"));
    pub const AGENTS: PermissionType = PermissionType(Cow::Borrowed("AGENTS"));
    pub const MULTI_CONVO: PermissionType = PermissionType(Cow::Borrowed("MULTI_CONVO"));
    pub const TEMPORARY_CHAT: PermissionType = PermissionType(Cow::Borrowed("TEMPORARY_CHAT"));
    pub const RUN_CODE: PermissionType = PermissionType(Cow::Borrowed("RUN_CODE"));

    /// Types with a built-in schema
    pub const WELL_KNOWN: [PermissionType; 6] = [
        Self::PROMPTS,
        Self::BOOKMARKS,
        Self::AGENTS,
        Self::MULTI_CONVO,
        Self::TEMPORARY_CHAT,
        Self::RUN_CODE,
    ];

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PermissionType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Validates a partial permission update for one permission type.
pub trait PermissionValidator: Send + Sync {
    /// Returns the accepted flags; unknown flags and non-boolean values fail.
    fn validate(&self, permissions: &Document) -> Result<PermissionSet>;
}

/// Schema accepting any subset of a fixed list of boolean flags.
#[derive(Debug, Clone)]
pub struct FlagSchema {
    permission_type: PermissionType,
    allowed: Vec<&'static str>,
}

impl FlagSchema {
    pub fn new(permission_type: PermissionType, allowed: &[&'static str]) -> Self {
        Self {
            permission_type,
            allowed: allowed.to_vec(),
        }
    }

    pub fn allowed(&self) -> &[&'static str] {
        &self.allowed
    }
}

impl PermissionValidator for FlagSchema {
    fn validate(&self, permissions: &Document) -> Result<PermissionSet> {
        let mut validated = PermissionSet::new();

        for (flag, value) in permissions {
            if !self.allowed.contains(&flag.as_str()) {
                return Err(RoleError::validation(format!(
                    "unrecognized permission '{}' for {}",
                    flag, self.permission_type
                )));
            }
            match value {
                Bson::Boolean(granted) => {
                    validated.insert(flag.clone(), *granted);
                }
                other => {
                    return Err(RoleError::validation(format!(
                        "permission '{}' for {} must be a boolean, got {:?}",
                        flag,
                        self.permission_type,
                        other.element_type()
                    )));
                }
            }
        }

        Ok(validated)
    }
}

/// Permission type -> validator
#[derive(Clone, Default)]
pub struct PermissionRegistry {
    validators: HashMap<PermissionType, Arc<dyn PermissionValidator>>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a schema for every well-known permission type.
    pub fn with_defaults() -> Self {
        use flags::*;

        let mut registry = Self::new();
        for permission_type in PermissionType::WELL_KNOWN {
            let allowed: &[&'static str] = if permission_type == PermissionType::PROMPTS
                || permission_type == PermissionType::AGENTS
            {
                &[SHARED_GLOBAL, USE, CREATE]
            } else {
                &[USE]
            };
            let schema = FlagSchema::new(permission_type.clone(), allowed);
            registry.register(permission_type, schema);
        }
        registry
    }

    /// Add or replace the validator for `permission_type`.
    pub fn register<V>(&mut self, permission_type: PermissionType, validator: V)
    where
        V: PermissionValidator + 'static,
    {
        self.validators.insert(permission_type, Arc::new(validator));
    }

    pub fn get(&self, permission_type: &PermissionType) -> Option<Arc<dyn PermissionValidator>> {
        self.validators.get(permission_type).cloned()
    }

    pub fn contains(&self, permission_type: &PermissionType) -> bool {
        self.validators.contains_key(permission_type)
    }

    pub fn types(&self) -> impl Iterator<Item = &PermissionType> {
        self.validators.keys()
    }
}

impl fmt::Debug for PermissionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.validators.keys().map(PermissionType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("PermissionRegistry").field("types", &types).finish()
    }
}
