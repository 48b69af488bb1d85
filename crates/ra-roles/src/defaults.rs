//! System Role Registry
//!
//! Reserved role names and the default permission profile each one is
//! materialized from on first access or at startup.

use std::fmt;

use crate::permission::{flags::*, PermissionType};
use crate::role::{PermissionSet, Role};

type FlagDefaults = &'static [(&'static str, bool)];

/// Code-defined role profile
pub struct RoleDefinition {
    pub name: &'static str,
    pub permissions: &'static [(&'static str, FlagDefaults)],
}

impl RoleDefinition {
    /// Build the role record this definition describes.
    pub fn to_role(&self) -> Role {
        let mut role = Role::new(self.name);
        for (permission_type, defaults) in self.permissions {
            let set: PermissionSet = defaults
                .iter()
                .map(|(flag, granted)| (flag.to_string(), *granted))
                .collect();
            role.set_permissions(&PermissionType::new(*permission_type), &set);
        }
        role
    }
}

pub const ADMIN: RoleDefinition = RoleDefinition {
    name: "ADMIN",
    permissions: &[
        ("PROMPTS", &[(SHARED_GLOBAL, true), (USE, true), (CREATE, true)]),
        ("BOOKMARKS", &[(USE, true)]),
        ("AGENTS", &[(SHARED_GLOBAL, true), (USE, true), (CREATE, true)]),
        ("MULTI_CONVO", &[(USE, true)]),
        ("TEMPORARY_CHAT", &[(USE, true)]),
        ("RUN_CODE", &[(USE, true)]),
    ],
};

pub const USER: RoleDefinition = RoleDefinition {
    name: "USER",
    permissions: &[
        ("PROMPTS", &[(SHARED_GLOBAL, false), (USE, true), (CREATE, true)]),
        ("BOOKMARKS", &[(USE, true)]),
        ("AGENTS", &[(SHARED_GLOBAL, false), (USE, true), (CREATE, true)]),
        ("MULTI_CONVO", &[(USE, true)]),
        ("TEMPORARY_CHAT", &[(USE, true)]),
        ("RUN_CODE", &[(USE, true)]),
    ],
};

/// All system roles, in initialization order
pub const SYSTEM_ROLES: &[&RoleDefinition] = &[&ADMIN, &USER];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemRole {
    Admin,
    User,
}

impl SystemRole {
    pub const ALL: [SystemRole; 2] = [SystemRole::Admin, SystemRole::User];

    /// Exact, case-sensitive match against the reserved names.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        self.definition().name
    }

    pub fn definition(&self) -> &'static RoleDefinition {
        match self {
            SystemRole::Admin => &ADMIN,
            SystemRole::User => &USER,
        }
    }

    pub fn default_role(&self) -> Role {
        self.definition().to_role()
    }
}

impl fmt::Display for SystemRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
