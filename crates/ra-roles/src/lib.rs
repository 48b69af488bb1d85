//! Role Access
//!
//! Role-based permission records for a multi-user application:
//! - System roles (`ADMIN`, `USER`) materialized from default profiles
//! - Cache-aside role lookup over a document store
//! - Key-level merges of partial permission updates per permission type
//!
//! ## Module Organization
//!
//! - `role` - Role document and field projections
//! - `permission` - Permission types, flags and validators
//! - `defaults` - System role registry
//! - `cache` - Role cache backends (memory, Redis)
//! - `store` - Role store backends (memory, MongoDB)
//! - `service` - The role access service

pub mod error;
pub mod role;
pub mod permission;
pub mod defaults;
pub mod cache;
pub mod store;
pub mod service;

pub use error::{RoleError, Result};
pub use role::{FieldSelection, PermissionSet, Role};
pub use permission::{
    flags, FlagSchema, PermissionRegistry, PermissionType, PermissionValidator,
};
pub use defaults::{RoleDefinition, SystemRole, SYSTEM_ROLES};
pub use cache::{CachedRole, MemoryRoleCache, RedisRoleCache, RoleCache};
pub use store::{MemoryRoleStore, MongoRoleStore, RoleStore};
pub use service::{
    InitSummary, PermissionChange, PermissionUpdateOutcome, RoleService, SkipReason,
};
