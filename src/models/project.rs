use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::PermissionContext;
use crate::errors::AppError;
use crate::events::Loggable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProjectState {
    #[default]
    Planeacion,
    Activo,
    Suspendido,
    Finalizado,
}

impl ProjectState {
    pub const ALL: [ProjectState; 4] = [
        ProjectState::Planeacion,
        ProjectState::Activo,
        ProjectState::Suspendido,
        ProjectState::Finalizado,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectState::Planeacion => "planeacion",
            ProjectState::Activo => "activo",
            ProjectState::Suspendido => "suspendido",
            ProjectState::Finalizado => "finalizado",
        }
    }
}

impl fmt::Display for ProjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| AppError::internal(format!("unknown project state '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    #[default]
    Obra,
    Consultoria,
    Interventoria,
}

impl ProjectKind {
    pub const ALL: [ProjectKind; 3] = [ProjectKind::Obra, ProjectKind::Consultoria, ProjectKind::Interventoria];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectKind::Obra => "obra",
            ProjectKind::Consultoria => "consultoria",
            ProjectKind::Interventoria => "interventoria",
        }
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::internal(format!("unknown project kind '{s}'")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: Uuid,
    /// Owner of the project.
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub contract_number: Option<String>,
    pub state: ProjectState,
    pub kind: ProjectKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn permission_context(&self) -> PermissionContext {
        PermissionContext::new()
            .with_owner(self.user_id)
            .with_state(self.state.as_str())
            .with_kind(self.kind.as_str())
    }
}

impl Loggable for Project {
    fn entity_type() -> &'static str { "project" }
    fn subject_id(&self) -> Uuid { self.id }
}

pub const PROJECT_COLUMNS: &str =
    "id, user_id, name, description, contract_number, state, kind, created_at, updated_at, deleted_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbProject {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub contract_number: Option<String>,
    pub state: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbProject> for Project {
    type Error = AppError;

    fn try_from(value: DbProject) -> Result<Self, Self::Error> {
        Ok(Project {
            id: value.id,
            user_id: value.user_id,
            name: value.name,
            description: value.description,
            contract_number: value.contract_number,
            state: value.state.parse()?,
            kind: value.kind.parse()?,
            created_at: value.created_at,
            updated_at: value.updated_at,
            deleted_at: value.deleted_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectCreateRequest {
    #[schema(example = "Puente vehicular Rio Negro")]
    pub name: String,
    #[schema(example = "Interventoria tecnica y administrativa de la obra.")]
    pub description: Option<String>,
    #[schema(example = "CT-2025-014")]
    pub contract_number: Option<String>,
    pub state: Option<ProjectState>,
    pub kind: Option<ProjectKind>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub contract_number: Option<String>,
    pub state: Option<ProjectState>,
    pub kind: Option<ProjectKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_values_round_trip_through_as_str() {
        for state in ProjectState::ALL {
            assert_eq!(state.as_str().parse::<ProjectState>().unwrap(), state);
        }
        for kind in ProjectKind::ALL {
            assert_eq!(kind.as_str().parse::<ProjectKind>().unwrap(), kind);
        }
        assert!("cerrado".parse::<ProjectState>().is_err());
    }

    #[test]
    fn permission_context_carries_owner_state_and_kind() {
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Via".to_string(),
            description: None,
            contract_number: None,
            state: ProjectState::Activo,
            kind: ProjectKind::Interventoria,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let ctx = project.permission_context();
        assert_eq!(ctx.owner_id, Some(project.user_id));
        assert_eq!(ctx.state.as_deref(), Some("activo"));
        assert_eq!(ctx.kind.as_deref(), Some("interventoria"));
    }
}
