use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Action, Resource};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::AuthUser;
use crate::models::pagination::{total_count_headers, Pagination};
use crate::models::user::{DbUser, User, UserUpdateRequest, USER_COLUMNS};
use crate::routes::roles::require_role_admin;
use crate::utils::{required_text, utc_now};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
}

pub(crate) async fn fetch_user(pool: &SqlitePool, id: Uuid) -> AppResult<DbUser> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted_at IS NULL");
    sqlx::query_as::<_, DbUser>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    params(Pagination),
    responses(
        (status = 200, description = "Users page; total in X-Total-Count", body = [User]),
        (status = 403, description = "Missing usuarios:leer")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<(HeaderMap, Json<Vec<User>>)> {
    state
        .permissions
        .require(auth.user_id, Resource::Users, Action::Read, None)
        .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE deleted_at IS NULL")
        .fetch_one(&state.pool)
        .await?;

    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY created_at ASC LIMIT ? OFFSET ?"
    );
    let users = sqlx::query_as::<_, DbUser>(&sql)
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(&state.pool)
        .await?
        .into_iter()
        .map(User::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok((total_count_headers(total.max(0) as usize), Json(users)))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User detail", body = User),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let user: User = fetch_user(&state.pool, id).await?.try_into()?;
    state
        .permissions
        .require(auth.user_id, Resource::Users, Action::Read, Some(&user.permission_context()))
        .await?;

    Ok(Json(user))
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 403, description = "Missing usuarios:actualizar, or configuracion:configurar to change user_type")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdateRequest>,
) -> AppResult<Json<User>> {
    let old: User = fetch_user(&state.pool, id).await?.try_into()?;
    state
        .permissions
        .require(auth.user_id, Resource::Users, Action::Update, Some(&old.permission_context()))
        .await?;

    let mut user = old.clone();
    if let Some(name) = payload.name.as_deref() {
        user.name = required_text("name", name)?;
    }
    if let Some(user_type) = payload.user_type.as_deref() {
        let user_type = user_type.trim();
        let user_type = (!user_type.is_empty()).then(|| user_type.to_lowercase());
        if user_type != user.user_type {
            // The legacy type resolves to a role, so it is guarded like a role assignment.
            require_role_admin(&state, auth.user_id).await?;
        }
        user.user_type = user_type;
    }
    if let Some(active) = payload.active {
        if !active && id == auth.user_id {
            return Err(AppError::bad_request("cannot deactivate your own account"));
        }
        user.active = active;
    }
    user.updated_at = utc_now();

    sqlx::query("UPDATE users SET name = ?, user_type = ?, active = ?, updated_at = ? WHERE id = ?")
        .bind(&user.name)
        .bind(&user.user_type)
        .bind(user.active)
        .bind(user.updated_at)
        .bind(user.id)
        .execute(&state.pool)
        .await?;

    log_activity(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &user,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User soft deleted"),
        (status = 400, description = "Cannot delete yourself"),
        (status = 403, description = "Missing usuarios:eliminar")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut user: User = fetch_user(&state.pool, id).await?.try_into()?;
    state
        .permissions
        .require(auth.user_id, Resource::Users, Action::Delete, Some(&user.permission_context()))
        .await?;

    if id == auth.user_id {
        return Err(AppError::bad_request("cannot delete your own account"));
    }

    let now = utc_now();
    sqlx::query("UPDATE users SET deleted_at = ?, active = 0, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&state.pool)
        .await?;

    user.deleted_at = Some(now);
    user.active = false;
    log_activity(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
