use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Action, Resource};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::AuthUser;
use crate::models::pagination::{total_count_headers, Pagination};
use crate::models::project::{DbProject, Project, ProjectCreateRequest, ProjectUpdateRequest, PROJECT_COLUMNS};
use crate::utils::{required_text, utc_now};

pub(crate) async fn fetch_project(pool: &SqlitePool, id: Uuid) -> AppResult<Project> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ? AND deleted_at IS NULL");
    sqlx::query_as::<_, DbProject>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("project not found"))?
        .try_into()
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Projects the caller may read, newest first.
#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    params(Pagination),
    responses((status = 200, description = "Readable projects; total in X-Total-Count", body = [Project])),
    security(("bearerAuth" = []))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<(HeaderMap, Json<Vec<Project>>)> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE deleted_at IS NULL ORDER BY created_at DESC");
    let rows = sqlx::query_as::<_, DbProject>(&sql).fetch_all(&state.pool).await?;

    // One role lookup for the whole list.
    let principal = state.permissions.principal(auth.user_id).await;
    let mut readable = Vec::with_capacity(rows.len());
    for row in rows {
        let project = Project::try_from(row)?;
        if principal.allows(Resource::Projects, Action::Read, Some(&project.permission_context())) {
            readable.push(project);
        }
    }

    let (page, total) = pagination.apply(readable);
    Ok((total_count_headers(total), Json(page)))
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = ProjectCreateRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 403, description = "Missing proyectos:crear")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    state
        .permissions
        .require(auth.user_id, Resource::Projects, Action::Create, None)
        .await?;

    let name = required_text("name", &payload.name)?;
    let now = utc_now();
    let project = Project {
        id: Uuid::new_v4(),
        user_id: auth.user_id,
        name,
        description: optional_text(payload.description.as_deref()),
        contract_number: optional_text(payload.contract_number.as_deref()),
        state: payload.state.unwrap_or_default(),
        kind: payload.kind.unwrap_or_default(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    sqlx::query(
        "INSERT INTO projects (id, user_id, name, description, contract_number, state, kind, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(project.id)
    .bind(project.user_id)
    .bind(&project.name)
    .bind(&project.description)
    .bind(&project.contract_number)
    .bind(project.state.as_str())
    .bind(project.kind.as_str())
    .bind(project.created_at)
    .bind(project.updated_at)
    .execute(&state.pool)
    .await?;

    log_activity(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &project,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project detail", body = Project),
        (status = 403, description = "Missing proyectos:leer"),
        (status = 404, description = "Project not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Project>> {
    let project = fetch_project(&state.pool, id).await?;
    state
        .permissions
        .require(auth.user_id, Resource::Projects, Action::Read, Some(&project.permission_context()))
        .await?;

    Ok(Json(project))
}

#[utoipa::path(
    put,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = ProjectUpdateRequest,
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 403, description = "Missing proyectos:actualizar for the stored or the requested state and kind")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProjectUpdateRequest>,
) -> AppResult<Json<Project>> {
    let old = fetch_project(&state.pool, id).await?;
    state
        .permissions
        .require(auth.user_id, Resource::Projects, Action::Update, Some(&old.permission_context()))
        .await?;

    let mut project = old.clone();
    if let Some(name) = payload.name.as_deref() {
        project.name = required_text("name", name)?;
    }
    if payload.description.is_some() {
        project.description = optional_text(payload.description.as_deref());
    }
    if payload.contract_number.is_some() {
        project.contract_number = optional_text(payload.contract_number.as_deref());
    }
    if let Some(state_value) = payload.state {
        project.state = state_value;
    }
    if let Some(kind) = payload.kind {
        project.kind = kind;
    }
    // A changed state or kind must also be allowed for the caller.
    if project.state != old.state || project.kind != old.kind {
        state
            .permissions
            .require(auth.user_id, Resource::Projects, Action::Update, Some(&project.permission_context()))
            .await?;
    }
    project.updated_at = utc_now();

    sqlx::query(
        "UPDATE projects SET name = ?, description = ?, contract_number = ?, state = ?, kind = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&project.name)
    .bind(&project.description)
    .bind(&project.contract_number)
    .bind(project.state.as_str())
    .bind(project.kind.as_str())
    .bind(project.updated_at)
    .bind(project.id)
    .execute(&state.pool)
    .await?;

    log_activity(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &project,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(project))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project soft deleted"),
        (status = 403, description = "Missing proyectos:eliminar")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut project = fetch_project(&state.pool, id).await?;
    state
        .permissions
        .require(auth.user_id, Resource::Projects, Action::Delete, Some(&project.permission_context()))
        .await?;

    let now = utc_now();
    let mut tx = state.pool.begin().await?;
    sqlx::query("UPDATE projects SET deleted_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE documents SET deleted_at = ?, updated_at = ? WHERE project_id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    project.deleted_at = Some(now);
    log_activity(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &project,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
