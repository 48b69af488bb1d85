//! Role Store
//!
//! Persistent role collection: find by name with optional projection,
//! `$set`-style field updates returning the post-update record, and insert.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use parking_lot::RwLock;
use tracing::info;

use crate::error::{Result, RoleError};
use crate::role::{FieldSelection, Role};

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_by_name(&self, role_name: &str, fields: Option<&FieldSelection>) -> Result<Option<Role>>;

    /// Replace each top-level field named in `updates`; `None` if no role matched.
    async fn update_by_name(&self, role_name: &str, updates: Document) -> Result<Option<Role>>;

    async fn insert(&self, role: &Role) -> Result<Role>;
}

// ============================================================================
// MongoDB Role Store
// ============================================================================

pub struct MongoRoleStore {
    collection: Collection<Role>,
}

impl MongoRoleStore {
    pub fn new(db: &Database) -> Self {
        Self::with_collection(db, "roles")
    }

    pub fn with_collection(db: &Database, collection_name: &str) -> Self {
        Self {
            collection: db.collection(collection_name),
        }
    }

    /// Unique index on `name`; safe to call on every startup.
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.collection
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "name": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;

        info!(collection = %self.collection.name(), "Ensured unique index on role name");
        Ok(())
    }
}

#[async_trait]
impl RoleStore for MongoRoleStore {
    async fn find_by_name(&self, role_name: &str, fields: Option<&FieldSelection>) -> Result<Option<Role>> {
        let mut find = self.collection.find_one(doc! { "name": role_name });
        if let Some(selection) = fields.filter(|s| !s.is_empty()) {
            find = find.projection(selection.to_projection());
        }
        Ok(find.await?)
    }

    async fn update_by_name(&self, role_name: &str, updates: Document) -> Result<Option<Role>> {
        // MongoDB rejects an empty $set
        if updates.is_empty() {
            return self.find_by_name(role_name, None).await;
        }

        Ok(self
            .collection
            .find_one_and_update(doc! { "name": role_name }, doc! { "$set": updates })
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn insert(&self, role: &Role) -> Result<Role> {
        let result = self
            .collection
            .insert_one(role)
            .await
            .map_err(|e| insert_error(&role.name, e))?;

        let mut inserted = role.clone();
        inserted.fields.insert("_id", result.inserted_id);
        Ok(inserted)
    }
}

/// Duplicate key error code (11000) from the unique `name` index
const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key_error(error: &mongodb::error::Error) -> bool {
    if let ErrorKind::Write(WriteFailure::WriteError(write_error)) = error.kind.as_ref() {
        return write_error.code == DUPLICATE_KEY;
    }
    false
}

fn insert_error(role_name: &str, error: mongodb::error::Error) -> RoleError {
    if is_duplicate_key_error(&error) {
        RoleError::Duplicate {
            role_name: role_name.to_string(),
        }
    } else {
        RoleError::Database(error)
    }
}

// ============================================================================
// In-Memory Role Store (for testing/development)
// ============================================================================

pub struct MemoryRoleStore {
    documents: Arc<RwLock<Vec<Document>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryRoleStore {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(Vec::new())),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Store pre-populated with `roles`. Seeding is not counted as writes.
    pub fn with_roles(roles: impl IntoIterator<Item = Role>) -> Result<Self> {
        let store = Self::new();
        {
            let mut documents = store.documents.write();
            for role in roles {
                let mut document = role.to_document()?;
                if !document.contains_key("_id") {
                    document.insert("_id", ObjectId::new());
                }
                documents.push(document);
            }
        }
        Ok(store)
    }

    /// Number of `find_by_name` calls served
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `update_by_name` and `insert` calls served
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Raw stored document for `role_name`
    pub fn document(&self, role_name: &str) -> Option<Document> {
        let documents = self.documents.read();
        documents.iter().find(|d| has_name(d, role_name)).cloned()
    }
}

impl Default for MemoryRoleStore {
    fn default() -> Self {
        Self::new()
    }
}

fn has_name(document: &Document, role_name: &str) -> bool {
    document.get_str("name").map(|n| n == role_name).unwrap_or(false)
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn find_by_name(&self, role_name: &str, fields: Option<&FieldSelection>) -> Result<Option<Role>> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let found = {
            let documents = self.documents.read();
            documents
                .iter()
                .find(|d| has_name(d, role_name))
                .map(|d| match fields {
                    Some(selection) => selection.apply(d),
                    None => d.clone(),
                })
        };

        found.map(Role::from_document).transpose()
    }

    async fn update_by_name(&self, role_name: &str, updates: Document) -> Result<Option<Role>> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        let updated = {
            let mut documents = self.documents.write();
            documents
                .iter_mut()
                .find(|d| has_name(d, role_name))
                .map(|document| {
                    for (key, value) in updates {
                        document.insert(key, value);
                    }
                    document.clone()
                })
        };

        updated.map(Role::from_document).transpose()
    }

    async fn insert(&self, role: &Role) -> Result<Role> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut document = role.to_document()?;
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }

        {
            let mut documents = self.documents.write();
            if documents.iter().any(|d| has_name(d, &role.name)) {
                return Err(RoleError::Duplicate {
                    role_name: role.name.clone(),
                });
            }
            documents.push(document.clone());
        }

        Role::from_document(document)
    }
}
