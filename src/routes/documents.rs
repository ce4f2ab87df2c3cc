use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Datelike;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Action, PermissionContext, Resource};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::AuthUser;
use crate::models::document::{
    filing_number, DbDocument, Document, DocumentCreateRequest, DocumentReviewRequest, DocumentState,
    DocumentUpdateRequest, DOCUMENT_COLUMNS,
};
use crate::models::pagination::{total_count_headers, Pagination};
use crate::routes::projects::fetch_project;
use crate::utils::{required_text, utc_now};

/// Mounted under `/projects/:id/documents`.
pub fn project_routes() -> Router<AppState> {
    Router::new().route("/", get(list_project_documents).post(create_document))
}

/// Mounted under `/documents`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_document).put(update_document).delete(delete_document))
        .route("/:id/submit", post(submit_document))
        .route("/:id/review", post(start_review))
        .route("/:id/approve", post(approve_document))
        .route("/:id/reject", post(reject_document))
}

async fn fetch_document(pool: &SqlitePool, id: Uuid) -> AppResult<Document> {
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ? AND deleted_at IS NULL");
    sqlx::query_as::<_, DbDocument>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("document not found"))?
        .try_into()
}

#[utoipa::path(
    get,
    path = "/projects/{id}/documents",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Project id"), Pagination),
    responses(
        (status = 200, description = "Readable documents of the project; total in X-Total-Count", body = [Document]),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_project_documents(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> AppResult<(HeaderMap, Json<Vec<Document>>)> {
    let project = fetch_project(&state.pool, project_id).await?;
    let principal = state.permissions.principal(auth.user_id).await;
    if !principal.allows(Resource::Projects, Action::Read, Some(&project.permission_context())) {
        return Err(AppError::forbidden("not allowed to leer proyectos"));
    }

    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE project_id = ? AND deleted_at IS NULL ORDER BY created_at DESC"
    );
    let rows = sqlx::query_as::<_, DbDocument>(&sql)
        .bind(project_id)
        .fetch_all(&state.pool)
        .await?;

    let mut readable = Vec::with_capacity(rows.len());
    for row in rows {
        let document = Document::try_from(row)?;
        if principal.allows(Resource::Documents, Action::Read, Some(&document.permission_context())) {
            readable.push(document);
        }
    }

    let (page, total) = pagination.apply(readable);
    Ok((total_count_headers(total), Json(page)))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/documents",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = DocumentCreateRequest,
    responses(
        (status = 201, description = "Draft document created with a filing number", body = Document),
        (status = 403, description = "Missing documentos:crear")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_document(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<DocumentCreateRequest>,
) -> AppResult<(StatusCode, Json<Document>)> {
    let project = fetch_project(&state.pool, project_id).await?;
    let principal = state.permissions.principal(auth.user_id).await;
    if !principal.allows(Resource::Projects, Action::Read, Some(&project.permission_context())) {
        return Err(AppError::forbidden("not allowed to leer proyectos"));
    }

    // The caller will own the new draft.
    let draft_ctx = PermissionContext::new()
        .with_owner(auth.user_id)
        .with_state(DocumentState::Borrador.as_str())
        .with_kind(payload.kind.as_str());
    if !principal.allows(Resource::Documents, Action::Create, Some(&draft_ctx)) {
        return Err(AppError::forbidden("not allowed to crear documentos"));
    }

    let title = required_text("title", &payload.title)?;
    let now = utc_now();
    let year = now.year();

    let mut tx = state.pool.begin().await?;
    let prefix = format!("RAD-{year}-%");
    let last: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(CAST(substr(filing_number, 10) AS INTEGER)), 0) FROM documents WHERE filing_number LIKE ?",
    )
    .bind(&prefix)
    .fetch_one(&mut *tx)
    .await?;

    let document = Document {
        id: Uuid::new_v4(),
        project_id,
        created_by: auth.user_id,
        title,
        filing_number: filing_number(year, last + 1),
        kind: payload.kind,
        state: DocumentState::Borrador,
        notes: payload.notes.filter(|n| !n.trim().is_empty()),
        approved_by: None,
        approved_at: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    sqlx::query(
        "INSERT INTO documents (id, project_id, created_by, title, filing_number, kind, state, notes, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(document.id)
    .bind(document.project_id)
    .bind(document.created_by)
    .bind(&document.title)
    .bind(&document.filing_number)
    .bind(document.kind.as_str())
    .bind(document.state.as_str())
    .bind(&document.notes)
    .bind(document.created_at)
    .bind(document.updated_at)
    .execute(&mut *tx)
    .await
    .map_err(|err| AppError::on_unique_violation(err, "filing number already taken; retry"))?;
    tx.commit().await?;

    log_activity(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &document,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(document)))
}

#[utoipa::path(
    get,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document detail", body = Document),
        (status = 403, description = "Missing documentos:leer for this document"),
        (status = 404, description = "Document not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_document(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Document>> {
    let document = fetch_document(&state.pool, id).await?;
    state
        .permissions
        .require(auth.user_id, Resource::Documents, Action::Read, Some(&document.permission_context()))
        .await?;

    Ok(Json(document))
}

#[utoipa::path(
    put,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = DocumentUpdateRequest,
    responses(
        (status = 200, description = "Document updated", body = Document),
        (status = 403, description = "Missing documentos:actualizar for this document"),
        (status = 409, description = "Document is no longer editable")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_document(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentUpdateRequest>,
) -> AppResult<Json<Document>> {
    let old = fetch_document(&state.pool, id).await?;
    state
        .permissions
        .require(auth.user_id, Resource::Documents, Action::Update, Some(&old.permission_context()))
        .await?;

    if !old.state.is_editable() {
        return Err(AppError::conflict(format!("document is {} and cannot be edited", old.state)));
    }

    let mut document = old.clone();
    if let Some(title) = payload.title.as_deref() {
        document.title = required_text("title", title)?;
    }
    if let Some(kind) = payload.kind {
        document.kind = kind;
    }
    if document.kind != old.kind {
        state
            .permissions
            .require(auth.user_id, Resource::Documents, Action::Update, Some(&document.permission_context()))
            .await?;
    }
    if payload.notes.is_some() {
        document.notes = payload.notes.filter(|n| !n.trim().is_empty());
    }
    document.updated_at = utc_now();

    sqlx::query("UPDATE documents SET title = ?, kind = ?, notes = ?, updated_at = ? WHERE id = ?")
        .bind(&document.title)
        .bind(document.kind.as_str())
        .bind(&document.notes)
        .bind(document.updated_at)
        .bind(document.id)
        .execute(&state.pool)
        .await?;

    log_activity(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &document,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(document))
}

#[utoipa::path(
    delete,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 204, description = "Document soft deleted"),
        (status = 403, description = "Missing documentos:eliminar")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_document(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut document = fetch_document(&state.pool, id).await?;
    state
        .permissions
        .require(auth.user_id, Resource::Documents, Action::Delete, Some(&document.permission_context()))
        .await?;

    let now = utc_now();
    sqlx::query("UPDATE documents SET deleted_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    document.deleted_at = Some(now);
    log_activity(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &document,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/documents/{id}/submit",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document filed (radicado)", body = Document),
        (status = 409, description = "Only drafts and rejected documents can be filed")
    ),
    security(("bearerAuth" = []))
)]
pub async fn submit_document(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Document>> {
    let transition = Transition {
        next: DocumentState::Radicado,
        action: Action::Update,
        event: "submitted",
        notes: None,
    };
    transition.apply(&state, auth.user_id, &headers, id).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/documents/{id}/review",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document moved to review", body = Document),
        (status = 409, description = "Only filed documents can enter review")
    ),
    security(("bearerAuth" = []))
)]
pub async fn start_review(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Document>> {
    let transition = Transition {
        next: DocumentState::EnRevision,
        action: Action::Approve,
        event: "review_started",
        notes: None,
    };
    transition.apply(&state, auth.user_id, &headers, id).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/documents/{id}/approve",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = DocumentReviewRequest,
    responses(
        (status = 200, description = "Document approved", body = Document),
        (status = 403, description = "Missing documentos:aprobar"),
        (status = 409, description = "Only filed or in-review documents can be approved")
    ),
    security(("bearerAuth" = []))
)]
pub async fn approve_document(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Option<Json<DocumentReviewRequest>>,
) -> AppResult<Json<Document>> {
    let transition = Transition {
        next: DocumentState::Aprobado,
        action: Action::Approve,
        event: "approved",
        notes: payload.and_then(|Json(body)| body.notes),
    };
    transition.apply(&state, auth.user_id, &headers, id).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/documents/{id}/reject",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = DocumentReviewRequest,
    responses(
        (status = 200, description = "Document rejected", body = Document),
        (status = 403, description = "Missing documentos:aprobar"),
        (status = 409, description = "Only filed or in-review documents can be rejected")
    ),
    security(("bearerAuth" = []))
)]
pub async fn reject_document(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Option<Json<DocumentReviewRequest>>,
) -> AppResult<Json<Document>> {
    let transition = Transition {
        next: DocumentState::Rechazado,
        action: Action::Approve,
        event: "rejected",
        notes: payload.and_then(|Json(body)| body.notes),
    };
    transition.apply(&state, auth.user_id, &headers, id).await.map(Json)
}

/// A workflow step: the permission is checked against the current state.
struct Transition {
    next: DocumentState,
    action: Action,
    event: &'static str,
    notes: Option<String>,
}

impl Transition {
    async fn apply(self, state: &AppState, actor: Uuid, headers: &HeaderMap, id: Uuid) -> AppResult<Document> {
        let old = fetch_document(&state.pool, id).await?;
        state
            .permissions
            .require(actor, Resource::Documents, self.action, Some(&old.permission_context()))
            .await?;

        if !old.state.can_transition_to(self.next) {
            return Err(AppError::conflict(format!(
                "cannot move document from {} to {}",
                old.state, self.next
            )));
        }

        let now = utc_now();
        let mut document = old.clone();
        document.state = self.next;
        document.updated_at = now;
        if let Some(notes) = self.notes.filter(|n| !n.trim().is_empty()) {
            document.notes = Some(notes);
        }
        match self.next {
            DocumentState::Aprobado => {
                document.approved_by = Some(actor);
                document.approved_at = Some(now);
            }
            DocumentState::Radicado => {
                document.approved_by = None;
                document.approved_at = None;
            }
            _ => {}
        }

        // Guarded on the old state so a concurrent transition loses cleanly.
        let result = sqlx::query(
            "UPDATE documents SET state = ?, notes = ?, approved_by = ?, approved_at = ?, updated_at = ? WHERE id = ? AND state = ?",
        )
        .bind(document.state.as_str())
        .bind(&document.notes)
        .bind(document.approved_by)
        .bind(document.approved_at)
        .bind(document.updated_at)
        .bind(document.id)
        .bind(old.state.as_str())
        .execute(&state.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::conflict("document changed concurrently; reload and retry"));
        }

        tracing::info!(
            document_id = %document.id,
            from = %old.state,
            to = %document.state,
            actor = %actor,
            "document state changed"
        );

        log_activity(
            &state.event_bus,
            self.event,
            Some(actor),
            &document,
            Some(&old),
            Some(RequestContext::from_headers(headers)),
        );

        Ok(document)
    }
}
