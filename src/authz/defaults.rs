use super::permission::{Action, Conditions, Permission, Resource};
use crate::models::role::Role;

pub const SUPER_ADMIN: &str = "Super Administrador";
pub const ADMIN: &str = "Administrador";
pub const OVERSEER: &str = "Interventor";
pub const CONTRACTOR: &str = "Contratista";
pub const SUPERVISOR: &str = "Supervisor";

/// Roles inserted by the bootstrap seeding when the role table is empty.
pub fn default_roles() -> Vec<Role> {
    use Action::*;

    vec![
        Role::new(
            SUPER_ADMIN,
            Some("Acceso total a la plataforma".to_string()),
            Resource::ALL.into_iter().map(Permission::all).collect(),
        ),
        Role::new(
            ADMIN,
            Some("Administra usuarios, proyectos y documentos".to_string()),
            vec![
                Permission::new(Resource::Users, [Create, Read, Update]),
                Permission::new(Resource::Projects, [Create, Read, Update, Delete, Export]),
                Permission::new(Resource::Documents, [Create, Read, Update, Delete, Approve]),
                Permission::new(Resource::Reports, [Create, Read, Export]),
                Permission::new(Resource::Configuration, [Read]),
            ],
        ),
        Role::new(
            OVERSEER,
            Some("Vigila la ejecucion de los proyectos y aprueba documentos".to_string()),
            vec![
                Permission::new(Resource::Projects, [Read, Update]),
                Permission::new(Resource::Documents, [Create, Read, Update, Approve]),
                Permission::new(Resource::Reports, [Create, Read, Export]),
            ],
        ),
        Role::new(
            CONTRACTOR,
            Some("Radica y gestiona sus propios documentos".to_string()),
            vec![
                Permission::new(Resource::Projects, [Read]),
                Permission::new(Resource::Documents, [Create, Read, Update])
                    .with_conditions(Conditions::owner_only()),
                Permission::new(Resource::Reports, [Read]),
            ],
        ),
        Role::new(
            SUPERVISOR,
            Some("Revisa documentos radicados en proyectos activos".to_string()),
            vec![
                Permission::new(Resource::Projects, [Read]),
                Permission::new(Resource::Documents, [Read, Approve])
                    .with_conditions(Conditions::default().with_states(["radicado", "en_revision", "aprobado"])),
                Permission::new(Resource::Reports, [Read, Export]),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::validate_permissions;

    #[test]
    fn default_roles_are_well_formed() {
        let roles = default_roles();
        assert_eq!(roles.len(), 5);
        for role in &roles {
            validate_permissions(&role.permissions).unwrap();
            assert!(role.active);
        }
    }

    #[test]
    fn admin_cannot_delete_users() {
        let roles = default_roles();
        let admin = roles.iter().find(|r| r.name == ADMIN).unwrap();
        let users = admin.permissions_for(Resource::Users).next().unwrap();
        assert!(users.actions.contains(&Action::Read));
        assert!(!users.actions.contains(&Action::Delete));
    }
}
