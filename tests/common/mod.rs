#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use interventoria::create_app;

/// Fresh SQLite file with migrations applied and default roles seeded.
/// Keep the `TempDir` alive for the duration of the test.
pub async fn setup() -> Result<(TempDir, SqlitePool, Router)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    Ok((dir, pool, app))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<TestResponse> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = body::to_bytes(response.into_body(), 10_485_760).await?;
    let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

    Ok(TestResponse { status, headers, body })
}

/// Register a user and return its id and token.
pub async fn register(app: &Router, name: &str, email: &str) -> Result<(Uuid, String)> {
    let resp = send(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "name": name, "email": email, "password": "password123" })),
    )
    .await?;
    assert_eq!(resp.status, StatusCode::CREATED, "register failed: {}", resp.body);

    let token = resp.body["token"].as_str().context("missing token")?.to_string();
    let id = resp.body["user"]["id"].as_str().context("missing user id")?.parse()?;
    Ok((id, token))
}

/// Assign a role by name straight in the database.
pub async fn grant_role(pool: &SqlitePool, user_id: Uuid, role_name: &str) -> Result<()> {
    let result = sqlx::query("INSERT INTO user_roles (user_id, role_id, created_at) SELECT ?, id, ? FROM roles WHERE name = ?")
        .bind(user_id)
        .bind(Utc::now())
        .bind(role_name)
        .execute(pool)
        .await?;
    anyhow::ensure!(result.rows_affected() == 1, "role '{role_name}' not found");
    Ok(())
}

/// Register a user holding `role_name`.
pub async fn user_with_role(app: &Router, pool: &SqlitePool, name: &str, email: &str, role_name: &str) -> Result<(Uuid, String)> {
    let (id, token) = register(app, name, email).await?;
    grant_role(pool, id, role_name).await?;
    Ok((id, token))
}
