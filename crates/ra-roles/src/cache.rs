//! Role Cache
//!
//! Keyed by role name within a cache region. A cached `None` records that
//! the role does not exist, so repeated misses skip the store too.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;
use crate::role::Role;

/// A cache entry: `Some(role)` or a cached absence.
pub type CachedRole = Option<Role>;

#[async_trait]
pub trait RoleCache: Send + Sync {
    /// `None` on a cache miss, `Some(entry)` on a hit.
    async fn get(&self, role_name: &str) -> Result<Option<CachedRole>>;
    async fn set(&self, role_name: &str, entry: CachedRole) -> Result<()>;
}

// ============================================================================
// In-Memory Role Cache
// ============================================================================

pub struct MemoryRoleCache {
    region: String,
    entries: Arc<RwLock<HashMap<String, CachedRole>>>,
}

impl MemoryRoleCache {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A cache for `region` backed by the same entries.
    pub fn with_region(&self, region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            entries: Arc::clone(&self.entries),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn key(&self, role_name: &str) -> String {
        format!("{}:{}", self.region, role_name)
    }

    /// Entries across every region sharing this map
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MemoryRoleCache {
    fn default() -> Self {
        Self::new("roles")
    }
}

#[async_trait]
impl RoleCache for MemoryRoleCache {
    async fn get(&self, role_name: &str) -> Result<Option<CachedRole>> {
        let entries = self.entries.read();
        Ok(entries.get(&self.key(role_name)).cloned())
    }

    async fn set(&self, role_name: &str, entry: CachedRole) -> Result<()> {
        let mut entries = self.entries.write();
        entries.insert(self.key(role_name), entry);
        Ok(())
    }
}

// ============================================================================
// Redis Role Cache
// ============================================================================

pub struct RedisRoleCache {
    client: redis::Client,
    prefix: String,
    region: String,
}

impl RedisRoleCache {
    pub fn new(redis_url: &str, prefix: &str, region: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
            region: region.to_string(),
        })
    }

    fn key(&self, role_name: &str) -> String {
        format!("{}:{}:{}", self.prefix, self.region, role_name)
    }
}

#[async_trait]
impl RoleCache for RedisRoleCache {
    async fn get(&self, role_name: &str) -> Result<Option<CachedRole>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let data: Option<String> = redis::AsyncCommands::get(&mut conn, self.key(role_name)).await?;

        match data {
            // "null" decodes to a cached absence
            Some(json) => Ok(Some(serde_json::from_str::<CachedRole>(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, role_name: &str, entry: CachedRole) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let json = serde_json::to_string(&entry)?;

        redis::AsyncCommands::set::<_, _, ()>(&mut conn, self.key(role_name), json).await?;
        Ok(())
    }
}
