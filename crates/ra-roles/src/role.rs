//! Role Document
//!
//! A role is a named permission profile. Apart from `name`, every top-level
//! field lives in a flattened BSON document: one sub-document per permission
//! type plus metadata this crate never interprets.

use std::collections::BTreeMap;

use bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::permission::PermissionType;

/// Permission flag name -> granted
pub type PermissionSet = BTreeMap<String, bool>;

/// Store-internal revision field stripped from returned documents
pub const VERSION_KEY: &str = "__v";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role name, a system role name or a custom one.
    /// Empty only when a projection excluded it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Permission-type fields and pass-through metadata
    #[serde(flatten)]
    pub fields: Document,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Document::new(),
        }
    }

    pub fn with_permissions(mut self, permission_type: &PermissionType, permissions: &PermissionSet) -> Self {
        self.set_permissions(permission_type, permissions);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn from_document(document: Document) -> Result<Self> {
        Ok(bson::from_document(document)?)
    }

    pub fn to_document(&self) -> Result<Document> {
        Ok(bson::to_document(self)?)
    }

    pub fn field(&self, key: &str) -> Option<&Bson> {
        self.fields.get(key)
    }

    /// Flags stored under `permission_type`. Non-boolean entries are ignored
    /// and a missing field reads as an empty set.
    pub fn permissions(&self, permission_type: &PermissionType) -> PermissionSet {
        self.fields
            .get_document(permission_type.as_str())
            .map(|field| {
                field
                    .iter()
                    .filter_map(|(flag, value)| value.as_bool().map(|v| (flag.clone(), v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace the whole `permission_type` field.
    pub fn set_permissions(&mut self, permission_type: &PermissionType, permissions: &PermissionSet) {
        self.fields.insert(
            permission_type.as_str().to_string(),
            permission_set_to_document(permissions),
        );
    }

    pub fn has_permission(&self, permission_type: &PermissionType, flag: &str) -> bool {
        self.fields
            .get_document(permission_type.as_str())
            .ok()
            .and_then(|field| field.get_bool(flag).ok())
            .unwrap_or(false)
    }

    pub fn without_version_key(mut self) -> Self {
        self.fields.remove(VERSION_KEY);
        self
    }
}

pub fn permission_set_to_document(permissions: &PermissionSet) -> Document {
    permissions
        .iter()
        .map(|(flag, granted)| (flag.clone(), Bson::Boolean(*granted)))
        .collect()
}

/// Field projection for role lookups.
///
/// Parsed from a space-separated list where a leading `-` excludes the
/// field (`"name PROMPTS"`, `"-BOOKMARKS -__v"`), or built from a list of
/// field names to include.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelection {
    fields: Vec<(String, bool)>,
}

impl FieldSelection {
    pub fn parse(selection: &str) -> Self {
        let fields = selection
            .split_whitespace()
            .filter_map(|token| match token.strip_prefix('-') {
                Some("") => None,
                Some(field) => Some((field.to_string(), false)),
                None => Some((token.to_string(), true)),
            })
            .collect();
        Self { fields }
    }

    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(|f| (f.into(), true)).collect(),
        }
    }

    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(|f| (f.into(), false)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn is_inclusion(&self) -> bool {
        self.fields.iter().any(|(field, included)| *included && field != "_id")
    }

    /// MongoDB projection document (`{ field: 1 }` / `{ field: 0 }`)
    pub fn to_projection(&self) -> Document {
        let mut projection = doc! {};
        for (field, included) in &self.fields {
            projection.insert(field.clone(), if *included { 1 } else { 0 });
        }
        projection
    }

    /// Apply the projection to an in-memory document the way MongoDB does:
    /// inclusion keeps the listed fields plus `_id` unless `_id` is excluded,
    /// exclusion drops the listed fields.
    pub fn apply(&self, document: &Document) -> Document {
        if self.is_empty() {
            return document.clone();
        }

        let excluded = |key: &str| {
            self.fields
                .iter()
                .any(|(field, included)| !*included && field == key)
        };

        if self.is_inclusion() {
            document
                .iter()
                .filter(|(key, _)| {
                    let listed = self
                        .fields
                        .iter()
                        .any(|(field, included)| *included && field == key.as_str());
                    (listed || key.as_str() == "_id") && !excluded(key)
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        } else {
            document
                .iter()
                .filter(|(key, _)| !excluded(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        }
    }
}

impl From<&str> for FieldSelection {
    fn from(selection: &str) -> Self {
        Self::parse(selection)
    }
}

impl From<Vec<&str>> for FieldSelection {
    fn from(fields: Vec<&str>) -> Self {
        Self::parse(&fields.join(" "))
    }
}

impl From<&[&str]> for FieldSelection {
    fn from(fields: &[&str]) -> Self {
        Self::parse(&fields.join(" "))
    }
}
