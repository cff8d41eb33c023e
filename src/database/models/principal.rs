use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tenant::looks_like_email;

/// Root principal requested for a new tenant.
///
/// `credential_hash` is produced by the authentication layer; this crate
/// stores it verbatim and never sees a plaintext password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminPrincipal {
    pub username: String,
    pub email: String,
    pub credential_hash: String,
    #[serde(default = "default_first_name")]
    pub first_name: String,
    #[serde(default = "default_last_name")]
    pub last_name: String,
}

impl AdminPrincipal {
    pub fn normalized(mut self) -> Result<Self, String> {
        self.username = self.username.trim().to_string();
        if self.username.len() < 3 || self.username.len() > 100 {
            return Err("Admin username must be between 3 and 100 characters".to_string());
        }
        self.email = self.email.trim().to_ascii_lowercase();
        if !looks_like_email(&self.email) {
            return Err(format!("Invalid admin email '{}'", self.email));
        }
        if self.credential_hash.trim().is_empty() {
            return Err("Admin credential is required".to_string());
        }
        Ok(self)
    }
}

/// A persisted principal. The credential hash is never loaded back out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub tenant_id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_tenant_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Resource name → allowed actions.
pub type PermissionMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleTemplate {
    pub name: String,
    pub permissions: PermissionMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub permissions: PermissionMap,
}

pub const ADMIN_ROLE: &str = "Admin";

fn template(name: &str, grants: &[(&str, &[&str])]) -> RoleTemplate {
    RoleTemplate {
        name: name.to_string(),
        permissions: grants
            .iter()
            .map(|(resource, actions)| {
                (
                    resource.to_string(),
                    actions.iter().map(|a| a.to_string()).collect(),
                )
            })
            .collect(),
    }
}

/// Roles seeded into every new tenant. The first entry is assigned to the
/// admin principal.
pub fn default_role_templates() -> Vec<RoleTemplate> {
    vec![
        template(
            ADMIN_ROLE,
            &[
                ("users", &["read", "write", "delete"]),
                ("employees", &["read", "write", "delete", "approve"]),
                ("departments", &["read", "write", "delete"]),
                ("leave", &["read", "write", "delete", "approve"]),
                ("payroll", &["read", "write", "approve"]),
                ("performance", &["read", "write", "approve"]),
                ("recruitment", &["read", "write", "approve"]),
                ("training", &["read", "write", "approve"]),
                ("documents", &["read", "write", "delete"]),
                ("settings", &["read", "write"]),
            ],
        ),
        template(
            "Manager",
            &[
                ("employees", &["read", "write"]),
                ("departments", &["read"]),
                ("leave", &["read", "write", "approve"]),
                ("performance", &["read", "write"]),
                ("documents", &["read", "write"]),
            ],
        ),
        template(
            "Employee",
            &[
                ("employees", &["read"]),
                ("departments", &["read"]),
                ("leave", &["read", "write"]),
                ("performance", &["read"]),
                ("documents", &["read"]),
            ],
        ),
        template(
            "HR Staff",
            &[
                ("employees", &["read", "write"]),
                ("departments", &["read", "write"]),
                ("leave", &["read", "write", "approve"]),
                ("performance", &["read", "write"]),
                ("recruitment", &["read", "write"]),
                ("training", &["read", "write"]),
            ],
        ),
    ]
}

fn default_first_name() -> String {
    "Admin".to_string()
}

fn default_last_name() -> String {
    "User".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_role_is_first_template() {
        let roles = default_role_templates();
        assert_eq!(roles[0].name, ADMIN_ROLE);
        assert_eq!(roles.len(), 4);
        assert!(roles[0].permissions["settings"].contains(&"write".to_string()));
    }

    #[test]
    fn admin_principal_requires_credential() {
        let admin = AdminPrincipal {
            username: "root".into(),
            email: "Root@Acme.io".into(),
            credential_hash: "  ".into(),
            first_name: "Admin".into(),
            last_name: "User".into(),
        };
        assert!(admin.normalized().is_err());
    }
}
