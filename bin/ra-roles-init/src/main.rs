//! Role Access Init
//!
//! Run at deployment or process startup:
//! - Ensures the unique index on role names
//! - Persists every missing system role from its default profile
//! - Warms the role cache by reading each system role back
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ROLE_ACCESS_CONFIG` | - | Path to a TOML config file |
//! | `ROLE_ACCESS_MONGODB_URI` | `mongodb://localhost:27017` | MongoDB connection URI |
//! | `ROLE_ACCESS_MONGODB_DATABASE` | `role_access` | Database name |
//! | `ROLE_ACCESS_CACHE_BACKEND` | `memory` | `memory` or `redis` |
//! | `ROLE_ACCESS_REDIS_URL` | `redis://localhost:6379` | Redis URL for the role cache |
//! | `RUST_LOG` | `info` | Log level |
//! | `LOG_FORMAT` | text | `json` for JSON logs |

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use ra_config::{AppConfig, CacheBackend};
use ra_roles::{MemoryRoleCache, MongoRoleStore, RedisRoleCache, RoleCache, RoleService, SystemRole};

fn build_cache(config: &AppConfig) -> Result<Arc<dyn RoleCache>> {
    let cache: Arc<dyn RoleCache> = match config.cache.backend {
        CacheBackend::Memory => Arc::new(MemoryRoleCache::new(config.cache.region.clone())),
        CacheBackend::Redis => Arc::new(
            RedisRoleCache::new(
                &config.cache.redis.url,
                &config.cache.redis.prefix,
                &config.cache.region,
            )
            .context("Failed to create Redis role cache")?,
        ),
    };
    Ok(cache)
}

#[tokio::main]
async fn main() -> Result<()> {
    ra_common::logging::init_logging("ra-roles-init");

    let config = AppConfig::load().context("Failed to load configuration")?;

    info!(
        database = %config.mongodb.database,
        collection = %config.mongodb.roles_collection,
        cache = ?config.cache.backend,
        "Starting role initialization"
    );

    let client = mongodb::Client::with_uri_str(&config.mongodb.uri)
        .await
        .context("Failed to connect to MongoDB")?;
    let db = client.database(&config.mongodb.database);

    let store = MongoRoleStore::with_collection(&db, &config.mongodb.roles_collection);
    store.ensure_indexes().await?;

    let service = RoleService::new(Arc::new(store), build_cache(&config)?);
    let summary = service.initialize_roles().await?;

    for role in SystemRole::ALL {
        service.get_role_by_name(role.as_str(), None).await?;
    }

    info!(
        created = summary.created,
        existing = summary.existing,
        "Role initialization complete"
    );
    Ok(())
}
