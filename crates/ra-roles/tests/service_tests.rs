//! Role Access Service Integration Tests
//!
//! Cache-aside lookup, permission merges and system role initialization
//! against the in-memory backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Bson, Document};

use ra_roles::{
    flags, FieldSelection, FlagSchema, MemoryRoleCache, MemoryRoleStore, PermissionRegistry,
    PermissionType, PermissionUpdateOutcome, Role, RoleCache, RoleError, RoleService, RoleStore,
    SkipReason, SystemRole,
};

fn build(store: MemoryRoleStore) -> (RoleService, Arc<MemoryRoleStore>, Arc<MemoryRoleCache>) {
    let store = Arc::new(store);
    let cache = Arc::new(MemoryRoleCache::new("roles"));
    let service = RoleService::new(store.clone(), cache.clone());
    (service, store, cache)
}

fn empty() -> (RoleService, Arc<MemoryRoleStore>, Arc<MemoryRoleCache>) {
    build(MemoryRoleStore::new())
}

/// Store double whose every call fails
struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl RoleStore for FailingStore {
    async fn find_by_name(&self, _: &str, _: Option<&FieldSelection>) -> ra_roles::Result<Option<Role>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RoleError::internal("connection refused"))
    }

    async fn update_by_name(&self, _: &str, _: Document) -> ra_roles::Result<Option<Role>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RoleError::internal("connection refused"))
    }

    async fn insert(&self, _: &Role) -> ra_roles::Result<Role> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RoleError::internal("connection refused"))
    }
}

/// Store double that loses the race to create a missing role: the lookup
/// sees nothing, then another writer's record trips the unique name index.
struct RacingStore;

#[async_trait]
impl RoleStore for RacingStore {
    async fn find_by_name(&self, _: &str, _: Option<&FieldSelection>) -> ra_roles::Result<Option<Role>> {
        Ok(None)
    }

    async fn update_by_name(&self, _: &str, _: Document) -> ra_roles::Result<Option<Role>> {
        Ok(None)
    }

    async fn insert(&self, role: &Role) -> ra_roles::Result<Role> {
        Err(RoleError::Duplicate {
            role_name: role.name.clone(),
        })
    }
}

mod lookup_tests {
    use super::*;

    #[tokio::test]
    async fn test_system_roles_are_created_on_first_lookup_then_cached() {
        for system_role in SystemRole::ALL {
            let (service, store, _) = empty();
            let name = system_role.as_str();

            let role = service.get_role_by_name(name, None).await.unwrap().unwrap();
            assert_eq!(role.name, name);
            for permission_type in PermissionType::WELL_KNOWN {
                assert_eq!(
                    role.permissions(&permission_type),
                    system_role.default_role().permissions(&permission_type)
                );
            }
            assert_eq!(store.reads(), 1);
            assert_eq!(store.writes(), 1);

            let again = service.get_role_by_name(name, None).await.unwrap().unwrap();
            assert_eq!(again, role);
            assert_eq!(store.reads(), 1, "second lookup must be served by the cache");
            assert_eq!(store.writes(), 1);
        }
    }

    #[tokio::test]
    async fn test_unknown_role_returns_none_and_caches_absence() {
        let (service, store, cache) = empty();

        assert!(service.get_role_by_name("custom", None).await.unwrap().is_none());
        assert_eq!(cache.get("custom").await.unwrap(), Some(None));

        assert!(service.get_role_by_name("custom", None).await.unwrap().is_none());
        assert_eq!(store.reads(), 1);
        assert_eq!(store.writes(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_existing_custom_role_is_returned() {
        let seeded = Role::new("editor")
            .with_field("PROMPTS", doc! { "USE": true })
            .with_field("description", "content editors");
        let (service, _, _) = build(MemoryRoleStore::with_roles([seeded]).unwrap());

        let role = service.get_role_by_name("editor", None).await.unwrap().unwrap();
        assert!(role.has_permission(&PermissionType::PROMPTS, flags::USE));
        assert_eq!(role.field("description").and_then(Bson::as_str), Some("content editors"));
    }

    #[tokio::test]
    async fn test_lookup_with_projection() {
        let seeded = SystemRole::User.default_role().with_field("label", "users");
        let (service, _, _) = build(MemoryRoleStore::with_roles([seeded]).unwrap());

        let selection = FieldSelection::from("name PROMPTS");
        let role = service.get_role_by_name("USER", Some(&selection)).await.unwrap().unwrap();

        assert_eq!(role.name, "USER");
        assert!(role.field("PROMPTS").is_some());
        assert!(role.field("BOOKMARKS").is_none());
        assert!(role.field("label").is_none());
    }

    #[tokio::test]
    async fn test_projected_lookup_is_not_cached() {
        let (service, store, cache) = build(MemoryRoleStore::with_roles([SystemRole::User.default_role()]).unwrap());

        let selection = FieldSelection::from("name BOOKMARKS");
        service.get_role_by_name("USER", Some(&selection)).await.unwrap().unwrap();
        assert_eq!(cache.get("USER").await.unwrap(), None);

        let full = service.get_role_by_name("USER", None).await.unwrap().unwrap();
        assert!(full.field("PROMPTS").is_some());
        assert_eq!(store.reads(), 2);
        assert_eq!(cache.get("USER").await.unwrap(), Some(Some(full)));
    }

    #[tokio::test]
    async fn test_projected_lookup_of_missing_system_role_caches_full_record() {
        let (service, _, cache) = empty();

        let selection = FieldSelection::from("name");
        let created = service.get_role_by_name("ADMIN", Some(&selection)).await.unwrap().unwrap();

        assert!(created.field("PROMPTS").is_some());
        assert_eq!(cache.get("ADMIN").await.unwrap(), Some(Some(created)));
    }

    #[tokio::test]
    async fn test_losing_concurrent_creation_is_a_lookup_error() {
        let cache = Arc::new(MemoryRoleCache::default());
        let service = RoleService::new(Arc::new(RacingStore), cache.clone());

        let err = service.get_role_by_name("ADMIN", None).await.unwrap_err();

        match &err {
            RoleError::Lookup { role_name, message } => {
                assert_eq!(role_name, "ADMIN");
                assert!(message.contains("Duplicate role: ADMIN"));
            }
            other => panic!("expected lookup error, got {:?}", other),
        }
        // nothing cached, so the next lookup reads the winner's record
        assert_eq!(cache.get("ADMIN").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_wrapped_with_cause() {
        let store = Arc::new(FailingStore::new());
        let service = RoleService::new(store.clone(), Arc::new(MemoryRoleCache::default()));

        let err = service.get_role_by_name("ADMIN", None).await.unwrap_err();

        match &err {
            RoleError::Lookup { role_name, message } => {
                assert_eq!(role_name, "ADMIN");
                assert!(message.contains("connection refused"));
            }
            other => panic!("expected lookup error, got {:?}", other),
        }
        assert!(err.to_string().contains("connection refused"));
    }
}

mod update_tests {
    use super::*;

    #[tokio::test]
    async fn test_update_replaces_only_named_fields_and_refreshes_cache() {
        let seeded = SystemRole::Admin
            .default_role()
            .with_field("label", "admins")
            .with_field("__v", 0);
        let (service, _, cache) = build(MemoryRoleStore::with_roles([seeded]).unwrap());

        // prime the cache with the pre-update record
        let before = service.get_role_by_name("ADMIN", None).await.unwrap().unwrap();

        let updated = service
            .update_role_by_name("ADMIN", doc! { "label": "super users" })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.field("label").and_then(Bson::as_str), Some("super users"));
        assert_eq!(updated.field("PROMPTS"), before.field("PROMPTS"));
        assert_eq!(updated.field("BOOKMARKS"), before.field("BOOKMARKS"));
        assert!(updated.field("__v").is_none());

        let cached = cache.get("ADMIN").await.unwrap().unwrap().unwrap();
        assert_eq!(cached, updated);
    }

    #[tokio::test]
    async fn test_rename_refreshes_both_cache_entries() {
        let (service, _, cache) = build(MemoryRoleStore::with_roles([Role::new("editor")]).unwrap());

        assert!(service.get_role_by_name("writer", None).await.unwrap().is_none());
        service.get_role_by_name("editor", None).await.unwrap().unwrap();

        let renamed = service
            .update_role_by_name("editor", doc! { "name": "writer" })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.name, "writer");

        assert_eq!(cache.get("editor").await.unwrap(), Some(None));
        assert_eq!(cache.get("writer").await.unwrap(), Some(Some(renamed.clone())));
        assert_eq!(service.get_role_by_name("writer", None).await.unwrap(), Some(renamed));
        assert!(service.get_role_by_name("editor", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_of_missing_role_caches_absence() {
        let (service, _, cache) = empty();

        let updated = service.update_role_by_name("ghost", doc! { "label": "x" }).await.unwrap();

        assert!(updated.is_none());
        assert_eq!(cache.get("ghost").await.unwrap(), Some(None));
    }

    #[tokio::test]
    async fn test_update_failure_is_wrapped() {
        let service = RoleService::new(Arc::new(FailingStore::new()), Arc::new(MemoryRoleCache::default()));

        let err = service.update_role_by_name("ADMIN", doc! { "label": "x" }).await.unwrap_err();
        assert!(matches!(err, RoleError::Update { .. }));
        assert!(err.to_string().contains("connection refused"));
    }
}

mod permission_tests {
    use super::*;

    fn admin_with_prompts(prompts: Document) -> MemoryRoleStore {
        MemoryRoleStore::with_roles([Role::new("ADMIN").with_field("PROMPTS", prompts)]).unwrap()
    }

    #[tokio::test]
    async fn test_merge_preserves_unspecified_flags() {
        let (service, store, _) = build(admin_with_prompts(doc! { "SHARED_GLOBAL": false, "USE": true }));

        let outcome = service
            .update_prompts_access("ADMIN", doc! { "SHARED_GLOBAL": true })
            .await;

        assert!(outcome.is_applied());
        let stored = store.document("ADMIN").unwrap();
        assert_eq!(
            stored.get_document("PROMPTS").unwrap(),
            &doc! { "SHARED_GLOBAL": true, "USE": true }
        );
    }

    #[tokio::test]
    async fn test_null_flags_are_dropped_and_siblings_kept() {
        let (service, store, _) = build(admin_with_prompts(doc! { "CREATE": true }));

        let outcome = service
            .update_prompts_access("ADMIN", doc! { "USE": true, "SHARED_GLOBAL": Bson::Null })
            .await;

        let changes = outcome.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].permission, "USE");
        assert_eq!(changes[0].previous, None);
        assert!(changes[0].new_value);

        let prompts = store.document("ADMIN").unwrap().get_document("PROMPTS").unwrap().clone();
        assert_eq!(prompts, doc! { "CREATE": true, "USE": true });
    }

    #[tokio::test]
    async fn test_change_records_previous_value() {
        let (service, _, _) = build(admin_with_prompts(doc! { "SHARED_GLOBAL": false, "USE": true }));

        let changes = service
            .update_prompts_access("ADMIN", doc! { "SHARED_GLOBAL": true })
            .await
            .into_result()
            .unwrap();

        assert_eq!(changes[0].previous, Some(false));
        assert!(changes[0].new_value);
    }

    #[tokio::test]
    async fn test_merge_after_projected_lookup_keeps_sibling_flags() {
        let (service, store, _) = build(MemoryRoleStore::with_roles([SystemRole::User.default_role()]).unwrap());

        let selection = FieldSelection::from("name BOOKMARKS");
        service.get_role_by_name("USER", Some(&selection)).await.unwrap();

        let outcome = service
            .update_prompts_access("USER", doc! { "SHARED_GLOBAL": true })
            .await;
        assert!(outcome.is_applied());

        let prompts = store.document("USER").unwrap().get_document("PROMPTS").unwrap().clone();
        assert_eq!(prompts.len(), 3);
        assert!(prompts.get_bool(flags::SHARED_GLOBAL).unwrap());
        assert!(prompts.get_bool(flags::USE).unwrap());
        assert!(prompts.get_bool(flags::CREATE).unwrap());
    }

    #[tokio::test]
    async fn test_merge_refreshes_cache() {
        let (service, _, cache) = build(admin_with_prompts(doc! { "USE": true }));

        service.get_role_by_name("ADMIN", None).await.unwrap();
        service.update_prompts_access("ADMIN", doc! { "USE": false }).await;

        let cached = cache.get("ADMIN").await.unwrap().unwrap().unwrap();
        assert!(!cached.has_permission(&PermissionType::PROMPTS, flags::USE));
    }

    #[tokio::test]
    async fn test_missing_permission_field_is_created() {
        let (service, store, _) = build(MemoryRoleStore::with_roles([Role::new("editor")]).unwrap());

        let outcome = service.update_bookmarks_access("editor", doc! { "USE": true }).await;

        assert!(outcome.is_applied());
        let stored = store.document("editor").unwrap();
        assert_eq!(stored.get_document("BOOKMARKS").unwrap(), &doc! { "USE": true });
    }

    #[tokio::test]
    async fn test_custom_role_absent_is_silent_noop() {
        let (service, store, _) = empty();

        assert!(service.get_role_by_name("custom", None).await.unwrap().is_none());

        let outcome = service
            .update_prompts_access("custom", doc! { "SHARED_GLOBAL": true })
            .await;

        assert!(matches!(outcome, PermissionUpdateOutcome::Skipped(SkipReason::RoleNotFound)));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_permission_type_performs_no_write() {
        let (service, store, _) = build(admin_with_prompts(doc! { "USE": true }));

        let outcome = service
            .update_access_permissions("ADMIN", &PermissionType::new("WEB_SEARCH"), doc! { "USE": true })
            .await;

        assert!(outcome.is_skipped());
        assert!(!outcome.is_failed());
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_invalid_value_fails_without_write() {
        let (service, store, _) = build(admin_with_prompts(doc! { "USE": true }));

        let outcome = service.update_prompts_access("ADMIN", doc! { "USE": "yes" }).await;

        assert!(matches!(outcome, PermissionUpdateOutcome::Failed(RoleError::Validation { .. })));
        assert_eq!(store.writes(), 0);
        assert_eq!(
            store.document("ADMIN").unwrap().get_document("PROMPTS").unwrap(),
            &doc! { "USE": true }
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_reported_as_failed_outcome() {
        let service = RoleService::new(Arc::new(FailingStore::new()), Arc::new(MemoryRoleCache::default()));

        let outcome = service.update_prompts_access("ADMIN", doc! { "USE": true }).await;

        match outcome {
            PermissionUpdateOutcome::Failed(err) => {
                assert!(err.to_string().contains("connection refused"))
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_registered_custom_type_is_merged() {
        let web_search = PermissionType::new("WEB_SEARCH");
        let mut registry = PermissionRegistry::with_defaults();
        registry.register(web_search.clone(), FlagSchema::new(web_search.clone(), &[flags::USE]));

        let store = Arc::new(MemoryRoleStore::with_roles([Role::new("editor")]).unwrap());
        let service = RoleService::new(store.clone(), Arc::new(MemoryRoleCache::default()))
            .with_validators(registry);

        let outcome = service
            .update_access_permissions("editor", &web_search, doc! { "USE": true })
            .await;

        assert!(outcome.is_applied());
        assert_eq!(
            store.document("editor").unwrap().get_document("WEB_SEARCH").unwrap(),
            &doc! { "USE": true }
        );
    }

    #[tokio::test]
    async fn test_convenience_bindings_target_their_fields() {
        let (service, store, _) = build(MemoryRoleStore::with_roles([Role::new("editor")]).unwrap());

        service.update_agents_access("editor", doc! { "CREATE": false }).await;
        service.update_multi_convo_access("editor", doc! { "USE": true }).await;
        service.update_temporary_chat_access("editor", doc! { "USE": false }).await;
        service.update_run_code_access("editor", doc! { "USE": true }).await;

        let stored = store.document("editor").unwrap();
        assert_eq!(stored.get_document("AGENTS").unwrap(), &doc! { "CREATE": false });
        assert_eq!(stored.get_document("MULTI_CONVO").unwrap(), &doc! { "USE": true });
        assert_eq!(stored.get_document("TEMPORARY_CHAT").unwrap(), &doc! { "USE": false });
        assert_eq!(stored.get_document("RUN_CODE").unwrap(), &doc! { "USE": true });
    }
}

mod access_tests {
    use super::*;

    #[tokio::test]
    async fn test_check_access() {
        let (service, _, _) = empty();
        let prompts = PermissionType::PROMPTS;

        assert!(service.check_access("ADMIN", &prompts, &[flags::USE, flags::SHARED_GLOBAL]).await.unwrap());
        assert!(service.check_access("USER", &prompts, &[flags::USE]).await.unwrap());
        assert!(!service.check_access("USER", &prompts, &[flags::USE, flags::SHARED_GLOBAL]).await.unwrap());
        assert!(!service.check_access("custom", &prompts, &[flags::USE]).await.unwrap());
    }

    #[tokio::test]
    async fn test_check_access_ignores_earlier_projected_lookup() {
        let (service, _, _) = build(MemoryRoleStore::with_roles([SystemRole::User.default_role()]).unwrap());

        let selection = FieldSelection::from("name BOOKMARKS");
        service.get_role_by_name("USER", Some(&selection)).await.unwrap();

        assert!(service
            .check_access("USER", &PermissionType::PROMPTS, &[flags::USE, flags::CREATE])
            .await
            .unwrap());
    }
}

mod initialize_tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_roles_is_idempotent() {
        let (service, store, cache) = empty();

        let first = service.initialize_roles().await.unwrap();
        assert_eq!(first.created, SystemRole::ALL.len());
        assert_eq!(first.existing, 0);
        assert_eq!(store.len(), SystemRole::ALL.len());
        let writes_after_first = store.writes();

        let second = service.initialize_roles().await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.existing, SystemRole::ALL.len());
        assert_eq!(store.writes(), writes_after_first);
        assert_eq!(store.len(), SystemRole::ALL.len());

        assert!(cache.is_empty(), "initialization must not populate the cache");
    }

    #[tokio::test]
    async fn test_initialize_roles_keeps_existing_records() {
        let customized = SystemRole::Admin
            .default_role()
            .with_field("PROMPTS", doc! { "SHARED_GLOBAL": false });
        let (service, store, _) = build(MemoryRoleStore::with_roles([customized]).unwrap());

        let summary = service.initialize_roles().await.unwrap();

        assert_eq!(summary.created, 1);
        assert_eq!(summary.existing, 1);
        let admin = store.document("ADMIN").unwrap();
        assert_eq!(admin.get_document("PROMPTS").unwrap(), &doc! { "SHARED_GLOBAL": false });
    }

    #[tokio::test]
    async fn test_lookup_after_initialize_reads_store() {
        let (service, store, _) = empty();
        service.initialize_roles().await.unwrap();
        let reads = store.reads();

        let admin = service.get_role_by_name("ADMIN", None).await.unwrap();
        assert!(admin.is_some());
        assert_eq!(store.reads(), reads + 1);
    }
}
