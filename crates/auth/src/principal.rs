use serde::{Deserialize, Serialize};

use crate::Role;

/// Identity of an authenticated caller (user, service account, module worker).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved caller: identity plus granted roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn new(id: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            id: PrincipalId::new(id),
            roles,
        }
    }

    /// Admins implicitly hold every role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.is_admin() || r.as_str() == role)
    }
}
