//! Compatibility path for accounts created before roles existed.
//!
//! Such users carry only a free-text user type. When they hold no role
//! assignment, the type is mapped to a single role through a lookup table,
//! falling back to a role whose name equals the type (case-insensitive).
//! No substring matching: `admin` must never resolve
//! to an unrelated role that merely contains the text.

use std::collections::HashMap;

use super::defaults;
use super::repository::RoleRepository;
use crate::errors::AppResult;
use crate::models::role::{name_key, Role};

#[derive(Debug, Clone)]
pub struct LegacyRoleFallback {
    table: HashMap<String, String>,
}

impl LegacyRoleFallback {
    /// A fallback with no table entries; only exact role names resolve.
    pub fn empty() -> Self {
        Self { table: HashMap::new() }
    }

    pub fn with_alias(mut self, user_type: &str, role_name: &str) -> Self {
        self.table.insert(name_key(user_type), role_name.to_string());
        self
    }

    /// Role name a legacy user type maps to.
    pub fn role_name_for(&self, user_type: &str) -> Option<String> {
        let key = name_key(user_type);
        if key.is_empty() {
            return None;
        }
        Some(self.table.get(&key).cloned().unwrap_or(key))
    }

    pub async fn resolve(&self, repository: &dyn RoleRepository, user_type: &str) -> AppResult<Option<Role>> {
        let Some(role_name) = self.role_name_for(user_type) else {
            return Ok(None);
        };

        let role = repository.find_role_by_name(&role_name).await?;
        if let Some(role) = &role {
            tracing::warn!(
                user_type = %user_type,
                role = %role.name,
                "resolved permissions through legacy user type"
            );
        }
        Ok(role)
    }
}

impl Default for LegacyRoleFallback {
    fn default() -> Self {
        Self::empty()
            .with_alias("superadmin", defaults::SUPER_ADMIN)
            .with_alias("super_admin", defaults::SUPER_ADMIN)
            .with_alias("super administrador", defaults::SUPER_ADMIN)
            .with_alias("admin", defaults::ADMIN)
            .with_alias("administrador", defaults::ADMIN)
            .with_alias("interventor", defaults::OVERSEER)
            .with_alias("interventoria", defaults::OVERSEER)
            .with_alias("contratista", defaults::CONTRACTOR)
            .with_alias("supervisor", defaults::SUPERVISOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_aliases_are_case_insensitive() {
        let fallback = LegacyRoleFallback::default();
        assert_eq!(fallback.role_name_for("ADMIN").as_deref(), Some(defaults::ADMIN));
        assert_eq!(fallback.role_name_for(" Contratista ").as_deref(), Some(defaults::CONTRACTOR));
    }

    #[test]
    fn unknown_types_fall_back_to_exact_name() {
        let fallback = LegacyRoleFallback::default();
        assert_eq!(fallback.role_name_for("Auditor Externo").as_deref(), Some("auditor externo"));
        assert_eq!(fallback.role_name_for("   "), None);
    }
}
