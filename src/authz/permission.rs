use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Closed set of resource kinds guarded by the permission engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum Resource {
    #[serde(rename = "usuarios")]
    Users,
    #[serde(rename = "proyectos")]
    Projects,
    #[serde(rename = "documentos")]
    Documents,
    #[serde(rename = "reportes")]
    Reports,
    #[serde(rename = "configuracion")]
    Configuration,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Users,
        Resource::Projects,
        Resource::Documents,
        Resource::Reports,
        Resource::Configuration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Users => "usuarios",
            Resource::Projects => "proyectos",
            Resource::Documents => "documentos",
            Resource::Reports => "reportes",
            Resource::Configuration => "configuracion",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Resource::ALL
            .into_iter()
            .find(|resource| resource.as_str() == wanted)
            .ok_or_else(|| AppError::invalid_argument(format!("unknown resource '{s}'")))
    }
}

/// Closed set of actions a permission may grant on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum Action {
    #[serde(rename = "crear")]
    Create,
    #[serde(rename = "leer")]
    Read,
    #[serde(rename = "actualizar")]
    Update,
    #[serde(rename = "eliminar")]
    Delete,
    #[serde(rename = "aprobar")]
    Approve,
    #[serde(rename = "exportar")]
    Export,
    #[serde(rename = "configurar")]
    Configure,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Approve,
        Action::Export,
        Action::Configure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "crear",
            Action::Read => "leer",
            Action::Update => "actualizar",
            Action::Delete => "eliminar",
            Action::Approve => "aprobar",
            Action::Export => "exportar",
            Action::Configure => "configurar",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == wanted)
            .ok_or_else(|| AppError::invalid_argument(format!("unknown action '{s}'")))
    }
}

/// Restrictions attached to a grant. Empty lists place no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Conditions {
    /// Only the recorded owner of the target may act.
    #[serde(default)]
    pub owner_only: bool,
    /// Allowed values of the target's state field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<String>,
    /// Allowed values of the target's type field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
}

impl Conditions {
    pub fn owner_only() -> Self {
        Self {
            owner_only: true,
            ..Self::default()
        }
    }

    pub fn with_states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.states = states.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.owner_only && self.states.is_empty() && self.types.is_empty()
    }

    /// Evaluate every present condition for `user_id` acting on the target
    /// described by `ctx`. A present condition with no context to check fails.
    pub fn satisfied_by(&self, user_id: Uuid, ctx: Option<&PermissionContext>) -> bool {
        if self.owner_only {
            let owner = ctx.and_then(|c| c.owner_id);
            if owner != Some(user_id) {
                return false;
            }
        }

        if !self.states.is_empty() {
            match ctx.and_then(|c| c.state.as_deref()) {
                Some(state) if self.states.iter().any(|allowed| allowed == state) => {}
                _ => return false,
            }
        }

        if !self.types.is_empty() {
            match ctx.and_then(|c| c.kind.as_deref()) {
                Some(kind) if self.types.iter().any(|allowed| allowed == kind) => {}
                _ => return false,
            }
        }

        true
    }
}

/// One (resource, actions, conditions) entry of a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub resource: Resource,
    #[schema(value_type = Vec<Action>)]
    pub actions: BTreeSet<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,
}

impl Permission {
    pub fn new(resource: Resource, actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            resource,
            actions: actions.into_iter().collect(),
            conditions: None,
        }
    }

    pub fn all(resource: Resource) -> Self {
        Self::new(resource, Action::ALL)
    }

    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = if conditions.is_empty() { None } else { Some(conditions) };
        self
    }

    /// Whether this entry grants `action` to `user_id` on the target in `ctx`.
    pub fn grants(&self, action: Action, user_id: Uuid, ctx: Option<&PermissionContext>) -> bool {
        if !self.actions.contains(&action) {
            return false;
        }
        match &self.conditions {
            Some(conditions) => conditions.satisfied_by(user_id, ctx),
            None => true,
        }
    }
}

/// Attributes of the target entity an authorization check is made against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PermissionContext {
    #[serde(default)]
    pub owner_id: Option<Uuid>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl PermissionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(mut self, owner_id: Uuid) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_and_action_names_parse_case_insensitively() {
        assert_eq!("USUARIOS".parse::<Resource>().unwrap(), Resource::Users);
        assert_eq!(" leer ".parse::<Action>().unwrap(), Action::Read);
        assert!(matches!("facturas".parse::<Resource>(), Err(AppError::InvalidArgument(_))));
        assert!(matches!("borrar".parse::<Action>(), Err(AppError::InvalidArgument(_))));
    }

    #[test]
    fn wire_format_uses_spanish_names() {
        let permission = Permission::new(Resource::Projects, [Action::Update, Action::Read])
            .with_conditions(Conditions::owner_only());
        let json = serde_json::to_value(&permission).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "resource": "proyectos",
                "actions": ["leer", "actualizar"],
                "conditions": {"owner_only": true}
            })
        );
    }

    #[test]
    fn owner_condition_requires_matching_owner() {
        let user = Uuid::new_v4();
        let conditions = Conditions::owner_only();

        assert!(conditions.satisfied_by(user, Some(&PermissionContext::new().with_owner(user))));
        assert!(!conditions.satisfied_by(user, Some(&PermissionContext::new().with_owner(Uuid::new_v4()))));
        assert!(!conditions.satisfied_by(user, None));
    }

    #[test]
    fn state_and_type_conditions_fail_closed_without_context() {
        let user = Uuid::new_v4();
        let conditions = Conditions::default()
            .with_states(["activo"])
            .with_types(["obra"]);

        let full = PermissionContext::new().with_state("activo").with_kind("obra");
        assert!(conditions.satisfied_by(user, Some(&full)));

        let wrong_state = PermissionContext::new().with_state("suspendido").with_kind("obra");
        assert!(!conditions.satisfied_by(user, Some(&wrong_state)));

        let missing_type = PermissionContext::new().with_state("activo");
        assert!(!conditions.satisfied_by(user, Some(&missing_type)));
    }

    #[test]
    fn empty_conditions_collapse_to_none() {
        let permission = Permission::new(Resource::Reports, [Action::Read]).with_conditions(Conditions::default());
        assert!(permission.conditions.is_none());
        assert!(permission.grants(Action::Read, Uuid::new_v4(), None));
        assert!(!permission.grants(Action::Export, Uuid::new_v4(), None));
    }
}
