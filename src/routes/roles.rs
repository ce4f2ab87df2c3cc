//! Role administration.
//!
//! Role and assignment changes are logged with Critical severity.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Action, Resource};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::AuthUser;
use crate::models::role::{
    name_key, validate_permissions, AssignRoleRequest, CheckPermissionRequest, CheckPermissionResponse, DbRole,
    EffectivePermissions, Role, RoleCreateRequest, RoleUpdateRequest, SeedResponse, UserRole, ROLE_COLUMNS,
};
use crate::routes::users::fetch_user;
use crate::utils::required_text;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/check", post(check_permission))
        .route("/seed", post(seed_roles))
        .route("/users/:user_id", get(list_user_roles).post(assign_role))
        .route("/users/:user_id/effective-permissions", get(effective_permissions))
        .route("/users/:user_id/:role_id", delete(revoke_role))
        .route("/:id", get(get_role).put(update_role).delete(delete_role))
}

async fn fetch_role(pool: &SqlitePool, id: Uuid) -> AppResult<Role> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ?");
    sqlx::query_as::<_, DbRole>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("role not found"))?
        .try_into()
}

/// 409 when another role already uses `name` (case-insensitive).
async fn ensure_name_available(pool: &SqlitePool, name: &str, except: Option<Uuid>) -> AppResult<()> {
    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM roles WHERE name_key = ?")
        .bind(name_key(name))
        .fetch_optional(pool)
        .await?;

    match existing {
        Some(id) if Some(id) != except => Err(AppError::conflict(format!("role '{name}' already exists"))),
        _ => Ok(()),
    }
}

/// Assigning roles (or a legacy user type) requires configuracion:configurar
/// on top of usuarios:actualizar.
pub(crate) async fn require_role_admin(state: &AppState, actor: Uuid) -> AppResult<()> {
    state
        .permissions
        .require(actor, Resource::Users, Action::Update, None)
        .await?;
    state
        .permissions
        .require(actor, Resource::Configuration, Action::Configure, None)
        .await
}

// =============================================================================
// ROLES
// =============================================================================

#[utoipa::path(
    get,
    path = "/roles",
    tag = "Roles",
    responses(
        (status = 200, description = "All roles by name", body = [Role]),
        (status = 403, description = "Missing configuracion:leer")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Role>>> {
    state
        .permissions
        .require(auth.user_id, Resource::Configuration, Action::Read, None)
        .await?;

    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY name");
    let roles = sqlx::query_as::<_, DbRole>(&sql)
        .fetch_all(&state.pool)
        .await?
        .into_iter()
        .map(Role::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(roles))
}

#[utoipa::path(
    post,
    path = "/roles",
    tag = "Roles",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Blank name, empty action set or repeated resource"),
        (status = 403, description = "Missing configuracion:configurar"),
        (status = 409, description = "Role name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    state
        .permissions
        .require(auth.user_id, Resource::Configuration, Action::Configure, None)
        .await?;

    let role = payload.into_role()?;
    ensure_name_available(&state.pool, &role.name, None).await?;
    state.roles.insert_role(&role).await?;

    tracing::info!(role = %role.name, actor = %auth.user_id, "role created");
    log_activity(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/roles/{id}",
    tag = "Roles",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role detail", body = Role),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Role>> {
    state
        .permissions
        .require(auth.user_id, Resource::Configuration, Action::Read, None)
        .await?;

    Ok(Json(fetch_role(&state.pool, id).await?))
}

#[utoipa::path(
    put,
    path = "/roles/{id}",
    tag = "Roles",
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 409, description = "Role name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleUpdateRequest>,
) -> AppResult<Json<Role>> {
    state
        .permissions
        .require(auth.user_id, Resource::Configuration, Action::Configure, None)
        .await?;

    let old = fetch_role(&state.pool, id).await?;
    let mut role = old.clone();

    if let Some(name) = payload.name.as_deref() {
        let name = required_text("name", name)?;
        ensure_name_available(&state.pool, &name, Some(id)).await?;
        role.name = name;
    }
    if payload.description.is_some() {
        role.description = payload.description;
    }
    if let Some(permissions) = payload.permissions {
        validate_permissions(&permissions)?;
        role.permissions = permissions;
    }
    if let Some(active) = payload.active {
        role.active = active;
    }
    role.updated_at = Utc::now();

    let permissions = serde_json::to_string(&role.permissions)?;
    sqlx::query(
        "UPDATE roles SET name = ?, name_key = ?, description = ?, permissions = ?, active = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&role.name)
    .bind(name_key(&role.name))
    .bind(&role.description)
    .bind(permissions)
    .bind(role.active)
    .bind(role.updated_at)
    .bind(role.id)
    .execute(&state.pool)
    .await
    .map_err(|err| AppError::on_unique_violation(err, format!("role '{}' already exists", role.name)))?;

    log_activity(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &role,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/roles/{id}",
    tag = "Roles",
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Role is still assigned to users")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .permissions
        .require(auth.user_id, Resource::Configuration, Action::Configure, None)
        .await?;

    let role = fetch_role(&state.pool, id).await?;

    let assigned: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM user_roles WHERE role_id = ?")
        .bind(id)
        .fetch_one(&state.pool)
        .await?;
    if assigned > 0 {
        return Err(AppError::conflict(format!(
            "role '{}' is assigned to {assigned} user(s)",
            role.name
        )));
    }

    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    tracing::warn!(role = %role.name, actor = %auth.user_id, "role deleted");
    log_activity(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/roles/seed",
    tag = "Roles",
    responses(
        (status = 200, description = "Default roles inserted when the table was empty", body = SeedResponse),
        (status = 403, description = "Missing configuracion:configurar")
    ),
    security(("bearerAuth" = []))
)]
pub async fn seed_roles(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<SeedResponse>> {
    state
        .permissions
        .require(auth.user_id, Resource::Configuration, Action::Configure, None)
        .await?;

    let inserted = state.permissions.seed_default_roles().await?;
    Ok(Json(SeedResponse { inserted }))
}

// =============================================================================
// USER ASSIGNMENTS
// =============================================================================

#[utoipa::path(
    get,
    path = "/roles/users/{user_id}",
    tag = "Roles",
    params(("user_id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "Roles assigned to the user", body = [Role])),
    security(("bearerAuth" = []))
)]
pub async fn list_user_roles(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<Role>>> {
    if user_id != auth.user_id {
        state
            .permissions
            .require(auth.user_id, Resource::Users, Action::Read, None)
            .await?;
    }
    fetch_user(&state.pool, user_id).await?;

    let roles = sqlx::query_as::<_, DbRole>(
        r#"
        SELECT r.id, r.name, r.description, r.permissions, r.active, r.created_at, r.updated_at
        FROM roles r
        INNER JOIN user_roles ur ON r.id = ur.role_id
        WHERE ur.user_id = ?
        ORDER BY r.name
        "#,
    )
    .bind(user_id)
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .map(Role::try_from)
    .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(roles))
}

#[utoipa::path(
    post,
    path = "/roles/users/{user_id}",
    tag = "Roles",
    params(("user_id" = Uuid, Path, description = "User id")),
    request_body = AssignRoleRequest,
    responses(
        (status = 201, description = "Role assigned", body = UserRole),
        (status = 403, description = "Missing usuarios:actualizar or configuracion:configurar"),
        (status = 404, description = "User or role not found"),
        (status = 409, description = "Role already assigned")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AssignRoleRequest>,
) -> AppResult<(StatusCode, Json<UserRole>)> {
    require_role_admin(&state, auth.user_id).await?;

    fetch_user(&state.pool, user_id).await?;
    let role = fetch_role(&state.pool, payload.role_id).await?;

    let assignment = UserRole {
        user_id,
        role_id: role.id,
        created_at: Utc::now(),
    };

    sqlx::query("INSERT INTO user_roles (user_id, role_id, created_at) VALUES (?, ?, ?)")
        .bind(assignment.user_id)
        .bind(assignment.role_id)
        .bind(assignment.created_at)
        .execute(&state.pool)
        .await
        .map_err(|err| AppError::on_unique_violation(err, format!("role '{}' already assigned", role.name)))?;

    tracing::info!(user_id = %user_id, role = %role.name, actor = %auth.user_id, "role assigned");
    log_activity(
        &state.event_bus,
        "assigned",
        Some(auth.user_id),
        &assignment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(assignment)))
}

#[utoipa::path(
    delete,
    path = "/roles/users/{user_id}/{role_id}",
    tag = "Roles",
    params(
        ("user_id" = Uuid, Path, description = "User id"),
        ("role_id" = Uuid, Path, description = "Role id")
    ),
    responses(
        (status = 204, description = "Role revoked"),
        (status = 403, description = "Missing usuarios:actualizar or configuracion:configurar"),
        (status = 404, description = "Assignment not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    require_role_admin(&state, auth.user_id).await?;

    let assignment = sqlx::query_as::<_, (Uuid, Uuid, chrono::DateTime<Utc>)>(
        "SELECT user_id, role_id, created_at FROM user_roles WHERE user_id = ? AND role_id = ?",
    )
    .bind(user_id)
    .bind(role_id)
    .fetch_optional(&state.pool)
    .await?
    .map(|(user_id, role_id, created_at)| UserRole {
        user_id,
        role_id,
        created_at,
    })
    .ok_or_else(|| AppError::not_found("role assignment not found"))?;

    sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role_id = ?")
        .bind(user_id)
        .bind(role_id)
        .execute(&state.pool)
        .await?;

    tracing::info!(user_id = %user_id, role_id = %role_id, actor = %auth.user_id, "role revoked");
    log_activity(
        &state.event_bus,
        "revoked",
        Some(auth.user_id),
        &assignment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// CHECKS
// =============================================================================

#[utoipa::path(
    get,
    path = "/roles/users/{user_id}/effective-permissions",
    tag = "Roles",
    params(("user_id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "Merged permissions of the user", body = EffectivePermissions)),
    security(("bearerAuth" = []))
)]
pub async fn effective_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<EffectivePermissions>> {
    if user_id != auth.user_id {
        state
            .permissions
            .require(auth.user_id, Resource::Users, Action::Read, None)
            .await?;
    }

    let principal = state.permissions.try_principal(user_id).await?;
    Ok(Json(EffectivePermissions {
        user_id,
        roles: principal.role_names(),
        legacy_fallback: principal.legacy_fallback,
        permissions: principal.effective_permissions(),
    }))
}

/// Evaluate a single check. Checking another user requires `usuarios:leer`.
#[utoipa::path(
    post,
    path = "/roles/check",
    tag = "Roles",
    request_body = CheckPermissionRequest,
    responses(
        (status = 200, description = "Check result", body = CheckPermissionResponse),
        (status = 400, description = "Unknown resource or action")
    ),
    security(("bearerAuth" = []))
)]
pub async fn check_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CheckPermissionRequest>,
) -> AppResult<Json<CheckPermissionResponse>> {
    let resource: Resource = payload.resource.parse()?;
    let action: Action = payload.action.parse()?;

    let user_id = payload.user_id.unwrap_or(auth.user_id);
    if user_id != auth.user_id {
        state
            .permissions
            .require(auth.user_id, Resource::Users, Action::Read, None)
            .await?;
    }

    let allowed = state
        .permissions
        .has_permission(user_id, resource, action, payload.context.as_ref())
        .await;

    tracing::debug!(user_id = %user_id, resource = %resource, action = %action, allowed, "permission check");

    Ok(Json(CheckPermissionResponse {
        user_id,
        resource,
        action,
        allowed,
    }))
}
