use std::sync::Arc;

use uuid::Uuid;

use super::defaults::default_roles;
use super::legacy::LegacyRoleFallback;
use super::permission::{Action, Permission, PermissionContext, Resource};
use super::principal::Principal;
use super::repository::RoleRepository;
use crate::errors::{AppError, AppResult};

/// Entry point of the permission engine.
///
/// Holds no role data of its own: every check reads the current assignments
/// through the injected repository.
#[derive(Clone)]
pub struct PermissionManager {
    repository: Arc<dyn RoleRepository>,
    fallback: LegacyRoleFallback,
}

impl PermissionManager {
    pub fn new(repository: Arc<dyn RoleRepository>) -> Self {
        Self {
            repository,
            fallback: LegacyRoleFallback::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: LegacyRoleFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Resolve the roles a user acts with, propagating storage errors.
    pub async fn try_principal(&self, user_id: Uuid) -> AppResult<Principal> {
        let Some(assignment) = self.repository.find_user_roles(user_id).await? else {
            tracing::debug!(user_id = %user_id, "unknown or inactive user");
            return Ok(Principal::new(user_id));
        };

        if !assignment.roles.is_empty() {
            return Ok(Principal::new(user_id).with_roles(assignment.roles));
        }

        let Some(user_type) = assignment.user_type.as_deref() else {
            return Ok(Principal::new(user_id));
        };

        let principal = match self.fallback.resolve(self.repository.as_ref(), user_type).await? {
            Some(role) => Principal::new(user_id).with_roles([role]).via_legacy_fallback(),
            None => Principal::new(user_id),
        };
        Ok(principal)
    }

    /// Like [`try_principal`](Self::try_principal) but a lookup failure yields
    /// a principal with no roles.
    pub async fn principal(&self, user_id: Uuid) -> Principal {
        match self.try_principal(user_id).await {
            Ok(principal) => principal,
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "role lookup failed; denying");
                Principal::new(user_id)
            }
        }
    }

    pub async fn has_permission(
        &self,
        user_id: Uuid,
        resource: Resource,
        action: Action,
        ctx: Option<&PermissionContext>,
    ) -> bool {
        self.principal(user_id).await.allows(resource, action, ctx)
    }

    /// String boundary for callers holding raw names; unknown names are an
    /// invalid argument, never a denial.
    pub async fn check(
        &self,
        user_id: Uuid,
        resource: &str,
        action: &str,
        ctx: Option<&PermissionContext>,
    ) -> AppResult<bool> {
        let resource: Resource = resource.parse()?;
        let action: Action = action.parse()?;
        Ok(self.has_permission(user_id, resource, action, ctx).await)
    }

    /// `Forbidden` unless the check passes.
    pub async fn require(
        &self,
        user_id: Uuid,
        resource: Resource,
        action: Action,
        ctx: Option<&PermissionContext>,
    ) -> AppResult<()> {
        if self.has_permission(user_id, resource, action, ctx).await {
            Ok(())
        } else {
            Err(AppError::forbidden(format!("not allowed to {action} {resource}")))
        }
    }

    pub async fn effective_permissions(&self, user_id: Uuid) -> AppResult<Vec<Permission>> {
        Ok(self.try_principal(user_id).await?.effective_permissions())
    }

    /// Insert the default roles when none exist. Returns how many were added.
    pub async fn seed_default_roles(&self) -> AppResult<usize> {
        let existing = self.repository.count_roles().await?;
        if existing > 0 {
            tracing::debug!(existing, "roles already present; skipping seed");
            return Ok(0);
        }

        let roles = default_roles();
        for role in &roles {
            self.repository.insert_role(role).await?;
        }

        tracing::info!(inserted = roles.len(), "seeded default roles");
        Ok(roles.len())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::authz::defaults;
    use crate::authz::permission::Conditions;
    use crate::authz::repository::UserRoles;
    use crate::models::role::Role;

    #[derive(Default)]
    struct FakeRoleRepository {
        users: HashMap<Uuid, UserRoles>,
        roles: Mutex<Vec<Role>>,
        fail: bool,
    }

    impl FakeRoleRepository {
        fn with_user(mut self, user_id: Uuid, user_type: Option<&str>, roles: Vec<Role>) -> Self {
            self.users.insert(
                user_id,
                UserRoles {
                    user_type: user_type.map(str::to_string),
                    roles,
                },
            );
            self
        }

        fn with_roles(self, roles: Vec<Role>) -> Self {
            Self {
                roles: Mutex::new(roles),
                ..self
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl RoleRepository for FakeRoleRepository {
        async fn find_user_roles(&self, user_id: Uuid) -> AppResult<Option<UserRoles>> {
            if self.fail {
                return Err(AppError::internal("storage unavailable"));
            }
            Ok(self.users.get(&user_id).cloned())
        }

        async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
            Ok(self
                .roles
                .lock()
                .await
                .iter()
                .find(|role| role.name.to_lowercase() == name.to_lowercase())
                .cloned())
        }

        async fn count_roles(&self) -> AppResult<i64> {
            Ok(self.roles.lock().await.len() as i64)
        }

        async fn insert_role(&self, role: &Role) -> AppResult<()> {
            self.roles.lock().await.push(role.clone());
            Ok(())
        }
    }

    fn manager(repository: FakeRoleRepository) -> PermissionManager {
        PermissionManager::new(Arc::new(repository))
    }

    fn project_owner_role() -> Role {
        Role::new(
            "Propietario",
            None,
            vec![Permission::new(Resource::Projects, [Action::Read, Action::Update])
                .with_conditions(Conditions::owner_only())],
        )
    }

    #[tokio::test]
    async fn user_without_roles_or_legacy_type_is_denied_everything() {
        let user = Uuid::new_v4();
        let manager = manager(FakeRoleRepository::default().with_user(user, None, vec![]));

        for resource in Resource::ALL {
            for action in Action::ALL {
                assert!(!manager.has_permission(user, resource, action, None).await);
            }
        }
    }

    #[tokio::test]
    async fn unknown_user_is_denied() {
        let manager = manager(FakeRoleRepository::default());
        assert!(!manager.has_permission(Uuid::new_v4(), Resource::Reports, Action::Read, None).await);
    }

    #[tokio::test]
    async fn owner_only_grant_depends_on_recorded_owner() {
        let user = Uuid::new_v4();
        let manager = manager(FakeRoleRepository::default().with_user(user, None, vec![project_owner_role()]));

        let own = PermissionContext::new().with_owner(user);
        let foreign = PermissionContext::new().with_owner(Uuid::new_v4());

        assert!(manager.has_permission(user, Resource::Projects, Action::Update, Some(&own)).await);
        assert!(!manager.has_permission(user, Resource::Projects, Action::Update, Some(&foreign)).await);
    }

    #[tokio::test]
    async fn effective_permissions_merge_actions_across_roles() {
        let user = Uuid::new_v4();
        let reader = Role::new("A", None, vec![Permission::new(Resource::Documents, [Action::Read])]);
        let creator = Role::new("B", None, vec![Permission::new(Resource::Documents, [Action::Create])]);
        let manager = manager(FakeRoleRepository::default().with_user(user, None, vec![reader, creator]));

        let permissions = manager.effective_permissions(user).await.unwrap();
        assert_eq!(permissions.len(), 1);
        assert_eq!(permissions[0].resource, Resource::Documents);
        assert_eq!(permissions[0].actions, BTreeSet::from([Action::Create, Action::Read]));
    }

    #[tokio::test]
    async fn seeding_twice_keeps_the_same_role_count() {
        let manager = manager(FakeRoleRepository::default());

        let first = manager.seed_default_roles().await.unwrap();
        let second = manager.seed_default_roles().await.unwrap();

        assert_eq!(first, 5);
        assert_eq!(second, 0);
        assert_eq!(manager.repository.count_roles().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn missing_state_fails_one_role_but_later_roles_still_count() {
        let user = Uuid::new_v4();
        let active_only = Role::new(
            "A Activos",
            None,
            vec![Permission::new(Resource::Projects, [Action::Read])
                .with_conditions(Conditions::default().with_states(["activo"]))],
        );
        let reader = Role::new("B Lector", None, vec![Permission::new(Resource::Projects, [Action::Read])]);

        let restricted = manager(FakeRoleRepository::default().with_user(user, None, vec![active_only.clone()]));
        assert!(!restricted.has_permission(user, Resource::Projects, Action::Read, None).await);

        let combined = manager(FakeRoleRepository::default().with_user(user, None, vec![active_only, reader]));
        assert!(combined.has_permission(user, Resource::Projects, Action::Read, None).await);
    }

    #[tokio::test]
    async fn admin_can_read_but_not_delete_users() {
        let user = Uuid::new_v4();
        let admin = defaults::default_roles()
            .into_iter()
            .find(|role| role.name == defaults::ADMIN)
            .unwrap();
        let manager = manager(FakeRoleRepository::default().with_user(user, None, vec![admin]));

        assert!(!manager.check(user, "USUARIOS", "eliminar", None).await.unwrap());
        assert!(manager.check(user, "USUARIOS", "leer", None).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_names_are_invalid_arguments() {
        let user = Uuid::new_v4();
        let manager = manager(FakeRoleRepository::default().with_user(user, None, vec![]));

        assert!(matches!(
            manager.check(user, "facturas", "leer", None).await,
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.check(user, "proyectos", "destruir", None).await,
            Err(AppError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn storage_failure_denies_instead_of_raising() {
        let manager = manager(FakeRoleRepository::failing());
        let user = Uuid::new_v4();

        assert!(!manager.has_permission(user, Resource::Projects, Action::Read, None).await);
        assert!(manager.require(user, Resource::Projects, Action::Read, None).await.is_err());
        assert!(manager.effective_permissions(user).await.is_err());
    }

    #[tokio::test]
    async fn legacy_user_type_resolves_through_lookup_table() {
        let user = Uuid::new_v4();
        let repository = FakeRoleRepository::default()
            .with_user(user, Some("contratista"), vec![])
            .with_roles(defaults::default_roles());
        let manager = manager(repository);

        let principal = manager.try_principal(user).await.unwrap();
        assert!(principal.legacy_fallback);
        assert_eq!(principal.role_names(), vec![defaults::CONTRACTOR.to_string()]);
        assert!(manager.has_permission(user, Resource::Projects, Action::Read, None).await);
        assert!(!manager.has_permission(user, Resource::Projects, Action::Delete, None).await);
    }

    #[tokio::test]
    async fn legacy_fallback_never_matches_substrings() {
        let user = Uuid::new_v4();
        let repository = FakeRoleRepository::default()
            .with_user(user, Some("super"), vec![])
            .with_roles(defaults::default_roles());
        let manager = manager(repository);

        let principal = manager.try_principal(user).await.unwrap();
        assert!(principal.roles.is_empty());
        assert!(!manager.has_permission(user, Resource::Users, Action::Read, None).await);
    }

    #[tokio::test]
    async fn assigned_roles_take_precedence_over_legacy_type() {
        let user = Uuid::new_v4();
        let repository = FakeRoleRepository::default()
            .with_user(user, Some("administrador"), vec![project_owner_role()])
            .with_roles(defaults::default_roles());
        let manager = manager(repository);

        let principal = manager.try_principal(user).await.unwrap();
        assert!(!principal.legacy_fallback);
        assert!(!manager.has_permission(user, Resource::Users, Action::Read, None).await);
    }
}
