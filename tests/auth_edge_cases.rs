use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;
use tower::util::ServiceExt;

mod common;
use common::{register, send, setup};

#[tokio::test]
async fn auth_edge_cases() -> Result<()> {
    let (_dir, pool, app) = setup().await?;

    // 1. Register with short password
    let resp = send(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "name": "Short Pass", "email": "short@example.com", "password": "short" })),
    )
    .await?;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST, "short password must be rejected");

    // 2. Register with valid user; a self-declared user_type is ignored
    let resp = send(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({
            "name": "Valid User",
            "email": "Valid@Example.com",
            "password": "password123",
            "user_type": "superadmin"
        })),
    )
    .await?;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.body["user"]["email"], "valid@example.com");
    assert!(resp.body["user"]["user_type"].is_null());
    assert!(resp.body["user"].get("password_hash").is_none());

    // 3. Same email in another case is a duplicate
    let resp = send(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "name": "Again", "email": "VALID@example.com", "password": "password123" })),
    )
    .await?;
    assert_eq!(resp.status, StatusCode::CONFLICT);

    // 4. Wrong password and unknown email
    let resp = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "valid@example.com", "password": "wrongpassword" })),
    )
    .await?;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let resp = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "nobody@example.com", "password": "password123" })),
    )
    .await?;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    // 5. Successful login sets an HttpOnly cookie usable instead of the header
    let resp = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "valid@example.com", "password": "password123" })),
    )
    .await?;
    assert_eq!(resp.status, StatusCode::OK);
    let cookie = resp
        .headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.starts_with("token="), "unexpected cookie: {cookie}");
    assert!(cookie.contains("HttpOnly"));

    let token_pair = cookie.split(';').next().unwrap_or_default().to_string();
    let req = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .header(header::COOKIE, token_pair)
        .body(Body::empty())?;
    let me = app.clone().oneshot(req).await?;
    assert_eq!(me.status(), StatusCode::OK, "cookie token must authenticate");

    // 6. Missing or garbage tokens
    let resp = send(&app, Method::GET, "/auth/me", None, None).await?;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    let resp = send(&app, Method::GET, "/auth/me", Some("not-a-jwt"), None).await?;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    let resp = send(&app, Method::GET, "/projects", None, None).await?;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    // 7. Logout clears the cookie
    let (_, token) = register(&app, "Logout User", "logout@example.com").await?;
    let resp = send(&app, Method::POST, "/auth/logout", Some(token.as_str()), None).await?;
    assert_eq!(resp.status, StatusCode::OK);
    let cleared = resp
        .headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(cleared.contains("Max-Age=0"));

    // 8. Deactivated accounts cannot log in
    sqlx::query("UPDATE users SET active = 0 WHERE email = ?")
        .bind("valid@example.com")
        .execute(&pool)
        .await?;
    let resp = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "valid@example.com", "password": "password123" })),
    )
    .await?;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn fresh_accounts_hold_no_permissions() -> Result<()> {
    let (_dir, _pool, app) = setup().await?;
    let (_, token) = register(&app, "Nadie", "nadie@example.com").await?;

    let resp = send(&app, Method::GET, "/auth/permissions", Some(token.as_str()), None).await?;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["roles"], json!([]));
    assert_eq!(resp.body["permissions"], json!([]));

    let resp = send(&app, Method::GET, "/projects", Some(token.as_str()), None).await?;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body, json!([]));

    let resp = send(
        &app,
        Method::POST,
        "/projects",
        Some(token.as_str()),
        Some(json!({ "name": "No autorizado" })),
    )
    .await?;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    Ok(())
}
