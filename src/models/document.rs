use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::PermissionContext;
use crate::errors::AppError;
use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    #[default]
    Borrador,
    Radicado,
    EnRevision,
    Aprobado,
    Rechazado,
}

impl DocumentState {
    pub const ALL: [DocumentState; 5] = [
        DocumentState::Borrador,
        DocumentState::Radicado,
        DocumentState::EnRevision,
        DocumentState::Aprobado,
        DocumentState::Rechazado,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentState::Borrador => "borrador",
            DocumentState::Radicado => "radicado",
            DocumentState::EnRevision => "en_revision",
            DocumentState::Aprobado => "aprobado",
            DocumentState::Rechazado => "rechazado",
        }
    }

    /// Content may only change before filing or after a rejection.
    pub fn is_editable(&self) -> bool {
        matches!(self, DocumentState::Borrador | DocumentState::Rechazado)
    }

    pub fn can_transition_to(&self, next: DocumentState) -> bool {
        use DocumentState::*;
        matches!(
            (self, next),
            (Borrador, Radicado)
                | (Rechazado, Radicado)
                | (Radicado, EnRevision)
                | (Radicado, Aprobado)
                | (Radicado, Rechazado)
                | (EnRevision, Aprobado)
                | (EnRevision, Rechazado)
        )
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| AppError::internal(format!("unknown document state '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Acta,
    Informe,
    Oficio,
    Contrato,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::Acta,
        DocumentKind::Informe,
        DocumentKind::Oficio,
        DocumentKind::Contrato,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Acta => "acta",
            DocumentKind::Informe => "informe",
            DocumentKind::Oficio => "oficio",
            DocumentKind::Contrato => "contrato",
        }
    }
}

impl FromStr for DocumentKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::internal(format!("unknown document kind '{s}'")))
    }
}

/// A filed document (radicado) attached to a project.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Document {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Owner of the document.
    pub created_by: Uuid,
    pub title: String,
    #[schema(example = "RAD-2025-00042")]
    pub filing_number: String,
    pub kind: DocumentKind,
    pub state: DocumentState,
    pub notes: Option<String>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn permission_context(&self) -> PermissionContext {
        PermissionContext::new()
            .with_owner(self.created_by)
            .with_state(self.state.as_str())
            .with_kind(self.kind.as_str())
    }
}

impl Loggable for Document {
    fn entity_type() -> &'static str { "document" }
    fn subject_id(&self) -> Uuid { self.id }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "approved" | "rejected" => Severity::Critical,
            _ => Severity::Important,
        }
    }
}

pub const DOCUMENT_COLUMNS: &str = "id, project_id, created_by, title, filing_number, kind, state, notes, approved_by, approved_at, created_at, updated_at, deleted_at";

#[derive(Debug, Clone, FromRow)]
pub struct DbDocument {
    pub id: Uuid,
    pub project_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub filing_number: String,
    pub kind: String,
    pub state: String,
    pub notes: Option<String>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbDocument> for Document {
    type Error = AppError;

    fn try_from(value: DbDocument) -> Result<Self, Self::Error> {
        Ok(Document {
            id: value.id,
            project_id: value.project_id,
            created_by: value.created_by,
            title: value.title,
            filing_number: value.filing_number,
            kind: value.kind.parse()?,
            state: value.state.parse()?,
            notes: value.notes,
            approved_by: value.approved_by,
            approved_at: value.approved_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
            deleted_at: value.deleted_at,
        })
    }
}

/// `RAD-<year>-<sequence>`, sequence zero-padded to five digits.
pub fn filing_number(year: i32, sequence: i64) -> String {
    format!("RAD-{year}-{sequence:05}")
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentCreateRequest {
    #[schema(example = "Acta de inicio de obra")]
    pub title: String,
    pub kind: DocumentKind,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentUpdateRequest {
    pub title: Option<String>,
    pub kind: Option<DocumentKind>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DocumentReviewRequest {
    #[schema(example = "Falta la firma del residente")]
    pub notes: Option<String>,
}
