use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::{Permission, PermissionContext, Resource};
use crate::errors::AppError;
use crate::events::{Loggable, Severity};
use crate::utils::required_text;

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub permissions: Vec<Permission>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: impl Into<String>, description: Option<String>, permissions: Vec<Permission>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description,
            permissions,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Entries for `resource`. Well-formed roles hold at most one.
    pub fn permissions_for(&self, resource: Resource) -> impl Iterator<Item = &Permission> {
        self.permissions.iter().filter(move |p| p.resource == resource)
    }
}

impl Loggable for Role {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// Row shape; `permissions` is the JSON document column.
#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub permissions: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbRole> for Role {
    type Error = AppError;

    fn try_from(db: DbRole) -> Result<Self, Self::Error> {
        let permissions: Vec<Permission> = serde_json::from_str(&db.permissions)
            .map_err(|err| AppError::internal(format!("role '{}' has malformed permissions: {err}", db.name)))?;

        Ok(Role {
            id: db.id,
            name: db.name,
            description: db.description,
            permissions,
            active: db.active,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

pub const ROLE_COLUMNS: &str = "id, name, description, permissions, active, created_at, updated_at";

/// Lookup key for role names and legacy user types: trimmed, Unicode-lowercased.
/// SQLite's `lower()` and `NOCASE` only fold ASCII, so the key is computed here.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Reject blank names, empty action sets, and a resource listed twice.
pub fn validate_permissions(permissions: &[Permission]) -> Result<(), AppError> {
    let mut seen = BTreeSet::new();
    for permission in permissions {
        if permission.actions.is_empty() {
            return Err(AppError::bad_request(format!(
                "permission for '{}' must grant at least one action",
                permission.resource
            )));
        }
        if !seen.insert(permission.resource) {
            return Err(AppError::bad_request(format!(
                "resource '{}' appears more than once",
                permission.resource
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "Residente de obra")]
    pub name: String,
    #[schema(example = "Registra avances y documentos de sus proyectos")]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    pub active: Option<bool>,
}

impl RoleCreateRequest {
    pub fn into_role(self) -> Result<Role, AppError> {
        let name = required_text("name", &self.name)?;
        validate_permissions(&self.permissions)?;
        let mut role = Role::new(name, self.description, self.permissions);
        role.active = self.active.unwrap_or(true);
        Ok(role)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<Permission>>,
    pub active: Option<bool>,
}

// =============================================================================
// USER-ROLE ASSIGNMENT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRole {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Loggable for UserRole {
    fn entity_type() -> &'static str { "user_role" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role_id: Uuid,
}

// =============================================================================
// CHECKS & EFFECTIVE PERMISSIONS
// =============================================================================

/// Resource and action arrive as strings so unknown names can be reported
/// as invalid arguments instead of a denial.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckPermissionRequest {
    /// Defaults to the caller.
    pub user_id: Option<Uuid>,
    #[schema(example = "proyectos")]
    pub resource: String,
    #[schema(example = "actualizar")]
    pub action: String,
    pub context: Option<PermissionContext>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckPermissionResponse {
    pub user_id: Uuid,
    pub resource: Resource,
    pub action: crate::authz::Action,
    pub allowed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EffectivePermissions {
    pub user_id: Uuid,
    pub roles: Vec<String>,
    /// True when the roles were resolved through the legacy user type.
    pub legacy_fallback: bool,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SeedResponse {
    pub inserted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::Action;

    #[test]
    fn duplicate_resources_are_rejected() {
        let permissions = vec![
            Permission::new(Resource::Documents, [Action::Read]),
            Permission::new(Resource::Documents, [Action::Create]),
        ];
        assert!(matches!(validate_permissions(&permissions), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn empty_action_sets_are_rejected() {
        let permissions = vec![Permission::new(Resource::Reports, [])];
        assert!(validate_permissions(&permissions).is_err());
    }

    #[test]
    fn db_row_with_malformed_permissions_fails_conversion() {
        let now = Utc::now();
        let row = DbRole {
            id: Uuid::new_v4(),
            name: "Roto".to_string(),
            description: None,
            permissions: "{not json".to_string(),
            active: true,
            created_at: now,
            updated_at: now,
        };
        assert!(Role::try_from(row).is_err());
    }

    #[test]
    fn create_request_trims_name() {
        let request = RoleCreateRequest {
            name: "  Auditor  ".to_string(),
            description: None,
            permissions: vec![Permission::new(Resource::Reports, [Action::Read])],
            active: None,
        };
        let role = request.into_role().unwrap();
        assert_eq!(role.name, "Auditor");
        assert!(role.active);
    }
}
