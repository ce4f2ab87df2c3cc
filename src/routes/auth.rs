use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::AppendHeaders;
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::jwt::{AuthUser, JwtConfig};
use crate::models::role::EffectivePermissions;
use crate::models::user::{AuthResponse, DbUser, LoginRequest, RegisterRequest, User, USER_COLUMNS};
use crate::routes::users::fetch_user;
use crate::utils::{hash_password, required_text, utc_now, validate_email, verify_password};

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid name, email or password"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let name = required_text("name", &payload.name)?;
    let email = validate_email(&payload.email)?;
    ensure_email_available(&state.pool, &email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = uuid::Uuid::new_v4();

    // New accounts start without roles; an administrator assigns them.
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, user_type, active, created_at, updated_at) VALUES (?, ?, ?, ?, NULL, 1, ?, ?)",
    )
    .bind(user_id)
    .bind(&name)
    .bind(&email)
    .bind(password_hash)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(|err| AppError::on_unique_violation(err, "email already in use"))?;

    let user: User = fetch_user(&state.pool, user_id).await?.try_into()?;
    let token = state.jwt.encode(user.id)?;

    log_activity(
        &state.event_bus,
        "registered",
        Some(user.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; also sets the token cookie", body = AuthResponse),
        (status = 401, description = "Invalid credentials or disabled account")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(AppendHeaders<[(axum::http::HeaderName, String); 1]>, Json<AuthResponse>)> {
    let email = payload.email.trim().to_lowercase();
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ? AND deleted_at IS NULL");
    let db_user = sqlx::query_as::<_, DbUser>(&sql)
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let password_ok = verify_password(&payload.password, &db_user.password_hash)?;
    if !password_ok {
        tracing::info!(email = %email, "failed login attempt");
        return Err(AppError::unauthorized("invalid credentials"));
    }
    if !db_user.active {
        return Err(AppError::unauthorized("account is disabled"));
    }

    let token = state.jwt.encode(db_user.id)?;
    let cookie = state.jwt.session_cookie(&token);
    let user: User = db_user.try_into()?;

    Ok((AppendHeaders([(SET_COOKIE, cookie)]), Json(AuthResponse { token, user })))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User)),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let user: User = fetch_user(&state.pool, auth.user_id).await?.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged; clears the token cookie", body = MessageResponse)),
    security(("bearerAuth" = []))
)]
pub async fn logout(
    _auth: AuthUser,
) -> AppResult<(AppendHeaders<[(axum::http::HeaderName, String); 1]>, Json<MessageResponse>)> {
    Ok((
        AppendHeaders([(SET_COOKIE, JwtConfig::cleared_cookie())]),
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    ))
}

/// The caller's merged permissions, for client-side permission hints.
#[utoipa::path(
    get,
    path = "/auth/permissions",
    tag = "Auth",
    responses((status = 200, description = "Effective permissions of the caller", body = EffectivePermissions)),
    security(("bearerAuth" = []))
)]
pub async fn my_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<EffectivePermissions>> {
    let principal = state.permissions.try_principal(auth.user_id).await?;

    Ok(Json(EffectivePermissions {
        user_id: auth.user_id,
        roles: principal.role_names(),
        legacy_fallback: principal.legacy_fallback,
        permissions: principal.effective_permissions(),
    }))
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ? AND deleted_at IS NULL")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}
