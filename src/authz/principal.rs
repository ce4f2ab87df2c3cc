use uuid::Uuid;

use super::permission::{Action, Permission, PermissionContext, Resource};
use crate::models::role::Role;

/// A user together with the roles resolved for them at check time.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    /// Active roles only, in name order.
    pub roles: Vec<Role>,
    /// Roles came from the legacy user-type compatibility path.
    pub legacy_fallback: bool,
}

impl Principal {
    /// A principal with no roles; every check against it is denied.
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            roles: Vec::new(),
            legacy_fallback: false,
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles = roles.into_iter().filter(|role| role.active).collect();
        self
    }

    pub fn via_legacy_fallback(mut self) -> Self {
        self.legacy_fallback = true;
        self
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|role| role.name.clone()).collect()
    }

    /// True on the first role entry granting `action` on `resource` with all
    /// of its conditions satisfied by `ctx`.
    pub fn allows(&self, resource: Resource, action: Action, ctx: Option<&PermissionContext>) -> bool {
        for role in &self.roles {
            let entries: Vec<&Permission> = role.permissions_for(resource).collect();
            if entries.len() > 1 {
                tracing::warn!(
                    role = %role.name,
                    resource = %resource,
                    entries = entries.len(),
                    "role lists a resource more than once; evaluating every entry"
                );
            }

            if let Some(entry) = entries.iter().find(|entry| entry.grants(action, self.user_id, ctx)) {
                tracing::debug!(
                    user_id = %self.user_id,
                    role = %role.name,
                    resource = %resource,
                    action = %action,
                    conditional = entry.conditions.is_some(),
                    "permission granted"
                );
                return true;
            }
        }

        tracing::debug!(
            user_id = %self.user_id,
            resource = %resource,
            action = %action,
            "permission denied"
        );
        false
    }

    /// One entry per resource: actions unioned across roles, conditions taken
    /// from the first entry seen for that resource.
    pub fn effective_permissions(&self) -> Vec<Permission> {
        let mut merged: Vec<Permission> = Vec::new();

        for entry in self.roles.iter().flat_map(|role| role.permissions.iter()) {
            match merged.iter_mut().find(|p| p.resource == entry.resource) {
                Some(existing) => existing.actions.extend(entry.actions.iter().copied()),
                None => merged.push(entry.clone()),
            }
        }

        merged.sort_by_key(|p| p.resource);
        merged
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::authz::permission::Conditions;

    fn role(name: &str, permissions: Vec<Permission>) -> Role {
        Role::new(name, None, permissions)
    }

    #[test]
    fn principal_without_roles_denies_everything() {
        let principal = Principal::new(Uuid::new_v4());
        for resource in Resource::ALL {
            for action in Action::ALL {
                assert!(!principal.allows(resource, action, None));
            }
        }
    }

    #[test]
    fn inactive_roles_are_ignored() {
        let mut disabled = role("Desactivado", vec![Permission::all(Resource::Projects)]);
        disabled.active = false;

        let principal = Principal::new(Uuid::new_v4()).with_roles(vec![disabled]);
        assert!(principal.roles.is_empty());
        assert!(!principal.allows(Resource::Projects, Action::Read, None));
    }

    #[test]
    fn failed_condition_in_one_role_falls_through_to_the_next() {
        let user = Uuid::new_v4();
        let restricted = role(
            "A Restringido",
            vec![Permission::new(Resource::Projects, [Action::Read])
                .with_conditions(Conditions::default().with_states(["activo"]))],
        );
        let open = role("B Abierto", vec![Permission::new(Resource::Projects, [Action::Read])]);

        let only_restricted = Principal::new(user).with_roles(vec![restricted.clone()]);
        assert!(!only_restricted.allows(Resource::Projects, Action::Read, None));

        let both = Principal::new(user).with_roles(vec![restricted, open]);
        assert!(both.allows(Resource::Projects, Action::Read, None));
    }

    #[test]
    fn duplicate_entries_within_a_role_are_all_evaluated() {
        let user = Uuid::new_v4();
        let malformed = role(
            "Duplicado",
            vec![
                Permission::new(Resource::Documents, [Action::Read]),
                Permission::new(Resource::Documents, [Action::Create]),
            ],
        );
        let principal = Principal::new(user).with_roles(vec![malformed]);

        assert!(principal.allows(Resource::Documents, Action::Read, None));
        assert!(principal.allows(Resource::Documents, Action::Create, None));
        assert!(!principal.allows(Resource::Documents, Action::Delete, None));
    }

    #[test]
    fn effective_permissions_union_actions_and_keep_first_conditions() {
        let first = role(
            "Lectura",
            vec![Permission::new(Resource::Documents, [Action::Read]).with_conditions(Conditions::owner_only())],
        );
        let second = role(
            "Radicacion",
            vec![
                Permission::new(Resource::Documents, [Action::Create]),
                Permission::new(Resource::Reports, [Action::Read]),
            ],
        );

        let principal = Principal::new(Uuid::new_v4()).with_roles(vec![first, second]);
        let merged = principal.effective_permissions();

        assert_eq!(merged.len(), 2);
        let documents = merged.iter().find(|p| p.resource == Resource::Documents).unwrap();
        assert_eq!(documents.actions, BTreeSet::from([Action::Read, Action::Create]));
        assert_eq!(documents.conditions, Some(Conditions::owner_only()));
    }
}
