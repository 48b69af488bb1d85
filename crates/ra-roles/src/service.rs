//! Role Access Service
//!
//! Cache-aside role lookup with lazy creation of system roles, top-level
//! field updates, and key-level merges of permission updates.

use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document};
use tracing::{debug, error, info};

use crate::cache::RoleCache;
use crate::defaults::{SystemRole, SYSTEM_ROLES};
use crate::error::{Result, RoleError};
use crate::permission::{PermissionRegistry, PermissionType};
use crate::role::{FieldSelection, Role};
use crate::store::RoleStore;

/// One flag written by a permission update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionChange {
    pub permission: String,
    /// Value before the merge; `None` if the flag was not set
    pub previous: Option<bool>,
    pub new_value: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing left after dropping null entries
    NoPermissions,
    /// No validator registered for the permission type
    UnknownPermissionType,
    RoleNotFound,
}

/// Result of [`RoleService::update_access_permissions`].
///
/// Failures are logged by the service and handed back here rather than
/// raised; callers decide whether they matter.
#[derive(Debug)]
pub enum PermissionUpdateOutcome {
    Applied(Vec<PermissionChange>),
    Skipped(SkipReason),
    Failed(RoleError),
}

impl PermissionUpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, PermissionUpdateOutcome::Applied(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, PermissionUpdateOutcome::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PermissionUpdateOutcome::Failed(_))
    }

    pub fn changes(&self) -> &[PermissionChange] {
        match self {
            PermissionUpdateOutcome::Applied(changes) => changes,
            _ => &[],
        }
    }

    /// Skips become an empty change list; failures become errors.
    pub fn into_result(self) -> Result<Vec<PermissionChange>> {
        match self {
            PermissionUpdateOutcome::Applied(changes) => Ok(changes),
            PermissionUpdateOutcome::Skipped(_) => Ok(Vec::new()),
            PermissionUpdateOutcome::Failed(e) => Err(e),
        }
    }
}

/// Outcome of [`RoleService::initialize_roles`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitSummary {
    pub created: usize,
    pub existing: usize,
}

pub struct RoleService {
    store: Arc<dyn RoleStore>,
    cache: Arc<dyn RoleCache>,
    validators: PermissionRegistry,
}

impl fmt::Debug for RoleService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleService")
            .field("validators", &self.validators)
            .finish()
    }
}

impl RoleService {
    pub fn new(store: Arc<dyn RoleStore>, cache: Arc<dyn RoleCache>) -> Self {
        Self {
            store,
            cache,
            validators: PermissionRegistry::with_defaults(),
        }
    }

    pub fn with_validators(mut self, validators: PermissionRegistry) -> Self {
        self.validators = validators;
        self
    }

    pub fn validators(&self) -> &PermissionRegistry {
        &self.validators
    }

    /// Look up a role, cache first.
    ///
    /// On a miss the store is queried (projected to `fields` when given). A
    /// missing system role is created from its default profile; any other
    /// missing role yields `None`, which is cached as well. Projected
    /// records are returned but never cached.
    pub async fn get_role_by_name(
        &self,
        role_name: &str,
        fields: Option<&FieldSelection>,
    ) -> Result<Option<Role>> {
        self.read_through(role_name, fields)
            .await
            .map_err(|e| RoleError::lookup(role_name, e))
    }

    async fn read_through(
        &self,
        role_name: &str,
        fields: Option<&FieldSelection>,
    ) -> Result<Option<Role>> {
        if let Some(cached) = self.cache.get(role_name).await? {
            debug!(role_name, found = cached.is_some(), "Role cache hit");
            return Ok(cached);
        }

        let projected = fields.is_some_and(|selection| !selection.is_empty());
        let mut role = self.store.find_by_name(role_name, fields).await?;
        let mut complete = !projected;

        if role.is_none() {
            if let Some(system_role) = SystemRole::from_name(role_name) {
                let created = self.store.insert(&system_role.default_role()).await?;
                info!(role_name, "Created missing system role from defaults");
                role = Some(created);
                complete = true;
            }
        }

        if complete || role.is_none() {
            self.cache.set(role_name, role.clone()).await?;
        }
        Ok(role)
    }

    /// Replace each top-level field in `updates` and refresh the cache entry.
    ///
    /// A rename through `updates` also refreshes the entry under the new
    /// name and records the old name as absent.
    pub async fn update_role_by_name(&self, role_name: &str, updates: Document) -> Result<Option<Role>> {
        let renamed_to = updates
            .get_str("name")
            .ok()
            .filter(|new_name| *new_name != role_name)
            .map(str::to_string);

        let updated = self
            .store
            .update_by_name(role_name, updates)
            .await
            .map_err(|e| RoleError::update(role_name, e))?
            .map(Role::without_version_key);

        self.refresh_after_update(role_name, renamed_to.as_deref(), &updated)
            .await
            .map_err(|e| RoleError::update(role_name, e))?;

        Ok(updated)
    }

    async fn refresh_after_update(
        &self,
        role_name: &str,
        renamed_to: Option<&str>,
        updated: &Option<Role>,
    ) -> Result<()> {
        match (renamed_to, updated) {
            (Some(new_name), Some(_)) => {
                self.cache.set(new_name, updated.clone()).await?;
                self.cache.set(role_name, None).await?;
                debug!(role_name, new_name, "Role renamed, cache entries refreshed");
            }
            _ => self.cache.set(role_name, updated.clone()).await?,
        }
        Ok(())
    }

    /// Merge `permissions` into the role's `permission_type` field.
    ///
    /// Null entries are dropped first. Flags not named in the update keep
    /// their stored values. Never returns an error directly: validation and
    /// store failures are logged and come back as
    /// [`PermissionUpdateOutcome::Failed`].
    pub async fn update_access_permissions(
        &self,
        role_name: &str,
        permission_type: &PermissionType,
        permissions: Document,
    ) -> PermissionUpdateOutcome {
        let permissions: Document = permissions
            .into_iter()
            .filter(|(_, value)| !matches!(value, Bson::Null | Bson::Undefined))
            .collect();

        if permissions.is_empty() {
            return PermissionUpdateOutcome::Skipped(SkipReason::NoPermissions);
        }

        match self.merge_permissions(role_name, permission_type, &permissions).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    role_name,
                    permission_type = %permission_type,
                    error = %e,
                    "Failed to update role permissions"
                );
                PermissionUpdateOutcome::Failed(e)
            }
        }
    }

    async fn merge_permissions(
        &self,
        role_name: &str,
        permission_type: &PermissionType,
        permissions: &Document,
    ) -> Result<PermissionUpdateOutcome> {
        let Some(validator) = self.validators.get(permission_type) else {
            debug!(role_name, permission_type = %permission_type, "No validator for permission type");
            return Ok(PermissionUpdateOutcome::Skipped(SkipReason::UnknownPermissionType));
        };

        let Some(role) = self.get_role_by_name(role_name, None).await? else {
            debug!(role_name, "Role not found, permission update skipped");
            return Ok(PermissionUpdateOutcome::Skipped(SkipReason::RoleNotFound));
        };

        let validated = validator.validate(permissions)?;

        let mut merged = role
            .fields
            .get_document(permission_type.as_str())
            .cloned()
            .unwrap_or_default();

        let mut changes = Vec::with_capacity(validated.len());
        for (permission, new_value) in validated {
            let previous = merged.get_bool(&permission).ok();
            merged.insert(permission.clone(), new_value);
            changes.push(PermissionChange {
                permission,
                previous,
                new_value,
            });
        }

        let mut updates = Document::new();
        updates.insert(permission_type.as_str(), merged);

        if self.update_role_by_name(role_name, updates).await?.is_none() {
            return Ok(PermissionUpdateOutcome::Skipped(SkipReason::RoleNotFound));
        }

        for change in &changes {
            info!(
                role_name,
                permission_type = %permission_type,
                permission = %change.permission,
                new_value = change.new_value,
                "Updated role permission"
            );
        }

        Ok(PermissionUpdateOutcome::Applied(changes))
    }

    pub async fn update_prompts_access(&self, role_name: &str, permissions: Document) -> PermissionUpdateOutcome {
        self.update_access_permissions(role_name, &PermissionType::PROMPTS, permissions).await
    }

    pub async fn update_bookmarks_access(&self, role_name: &str, permissions: Document) -> PermissionUpdateOutcome {
        self.update_access_permissions(role_name, &PermissionType::BOOKMARKS, permissions).await
    }

    pub async fn update_agents_access(&self, role_name: &str, permissions: Document) -> PermissionUpdateOutcome {
        self.update_access_permissions(role_name, &PermissionType::AGENTS, permissions).await
    }

    pub async fn update_multi_convo_access(&self, role_name: &str, permissions: Document) -> PermissionUpdateOutcome {
        self.update_access_permissions(role_name, &PermissionType::MULTI_CONVO, permissions).await
    }

    pub async fn update_temporary_chat_access(&self, role_name: &str, permissions: Document) -> PermissionUpdateOutcome {
        self.update_access_permissions(role_name, &PermissionType::TEMPORARY_CHAT, permissions).await
    }

    pub async fn update_run_code_access(&self, role_name: &str, permissions: Document) -> PermissionUpdateOutcome {
        self.update_access_permissions(role_name, &PermissionType::RUN_CODE, permissions).await
    }

    /// True when the role exists and every flag in `required` is granted.
    pub async fn check_access(
        &self,
        role_name: &str,
        permission_type: &PermissionType,
        required: &[&str],
    ) -> Result<bool> {
        let granted = self
            .get_role_by_name(role_name, None)
            .await?
            .map(|role| required.iter().all(|flag| role.has_permission(permission_type, flag)))
            .unwrap_or(false);

        Ok(granted)
    }

    /// Persist every system role that is missing from the store.
    ///
    /// Reads the store directly and leaves the cache untouched.
    pub async fn initialize_roles(&self) -> Result<InitSummary> {
        let mut summary = InitSummary::default();

        for definition in SYSTEM_ROLES {
            if self.store.find_by_name(definition.name, None).await?.is_some() {
                summary.existing += 1;
                continue;
            }

            self.store.insert(&definition.to_role()).await?;
            info!(role_name = definition.name, "Created system role");
            summary.created += 1;
        }

        info!(
            created = summary.created,
            existing = summary.existing,
            "System roles initialized"
        );
        Ok(summary)
    }
}
