use std::sync::Arc;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

use interventoria::authz::{
    Action, Permission, PermissionContext, PermissionManager, Resource, RoleRepository, SqliteRoleRepository,
};
use interventoria::errors::AppError;
use interventoria::models::role::Role;

mod common;
use common::{grant_role, register, send, setup};

async fn set_user_type(pool: &sqlx::SqlitePool, user_id: Uuid, user_type: &str) -> Result<()> {
    sqlx::query("UPDATE users SET user_type = ? WHERE id = ?")
        .bind(user_type)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[tokio::test]
async fn legacy_user_types_resolve_through_the_table_only() -> Result<()> {
    let (_dir, pool, app) = setup().await?;

    let (contractor_id, contractor) = register(&app, "Legado", "legado@example.com").await?;
    set_user_type(&pool, contractor_id, "Contratista").await?;

    let resp = send(&app, Method::GET, "/auth/permissions", Some(contractor.as_str()), None).await?;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["legacy_fallback"], true);
    assert_eq!(resp.body["roles"], json!(["Contratista"]));

    // "administrador_externo" contains "administrador" but is not a known type
    let (outsider_id, outsider) = register(&app, "Externo", "externo@example.com").await?;
    set_user_type(&pool, outsider_id, "administrador_externo").await?;

    let resp = send(&app, Method::GET, "/auth/permissions", Some(outsider.as_str()), None).await?;
    assert_eq!(resp.body["roles"], json!([]));
    assert_eq!(resp.body["legacy_fallback"], false);
    let resp = send(&app, Method::GET, "/users", Some(outsider.as_str()), None).await?;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    // Assigned roles win over the legacy type
    let (mixed_id, mixed) = register(&app, "Mixto", "mixto@example.com").await?;
    set_user_type(&pool, mixed_id, "admin").await?;
    grant_role(&pool, mixed_id, "Supervisor").await?;

    let resp = send(&app, Method::GET, "/auth/permissions", Some(mixed.as_str()), None).await?;
    assert_eq!(resp.body["roles"], json!(["Supervisor"]));
    assert_eq!(resp.body["legacy_fallback"], false);
    let resp = send(&app, Method::GET, "/users", Some(mixed.as_str()), None).await?;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn manager_reads_assignments_from_sqlite() -> Result<()> {
    let (_dir, pool, app) = setup().await?;
    let repository = Arc::new(SqliteRoleRepository::new(pool.clone()));
    let manager = PermissionManager::new(repository.clone());

    assert_eq!(repository.count_roles().await?, 5);
    assert_eq!(manager.seed_default_roles().await?, 0);

    let role = repository.find_role_by_name("  interventor ").await?;
    assert_eq!(role.map(|r| r.name).as_deref(), Some("Interventor"));
    assert!(repository.find_role_by_name("Interv").await?.is_none());

    let (user_id, _) = register(&app, "Interventora", "interventora@example.com").await?;
    assert!(!manager.has_permission(user_id, Resource::Projects, Action::Read, None).await);

    grant_role(&pool, user_id, "Interventor").await?;
    assert!(manager.has_permission(user_id, Resource::Projects, Action::Update, None).await);
    assert!(!manager.has_permission(user_id, Resource::Projects, Action::Delete, None).await);
    assert!(manager.check(user_id, "Documentos", "APROBAR", None).await?);
    assert!(manager.check(user_id, "documentos", "firmar", None).await.is_err());

    // Contractor: owner-only document grants
    let (contractor_id, _) = register(&app, "Contratista", "contratista@example.com").await?;
    grant_role(&pool, contractor_id, "Contratista").await?;
    let own = PermissionContext::new().with_owner(contractor_id);
    let foreign = PermissionContext::new().with_owner(user_id);
    assert!(manager.has_permission(contractor_id, Resource::Documents, Action::Update, Some(&own)).await);
    assert!(!manager.has_permission(contractor_id, Resource::Documents, Action::Update, Some(&foreign)).await);

    // Unknown and deactivated users are denied
    assert!(!manager.has_permission(Uuid::new_v4(), Resource::Reports, Action::Read, None).await);
    sqlx::query("UPDATE users SET active = 0 WHERE id = ?")
        .bind(user_id)
        .execute(&pool)
        .await?;
    assert!(!manager.has_permission(user_id, Resource::Projects, Action::Read, None).await);
    assert!(manager.effective_permissions(user_id).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn accented_role_names_fold_case_like_rust_does() -> Result<()> {
    let (_dir, pool, app) = setup().await?;
    let repository = Arc::new(SqliteRoleRepository::new(pool.clone()));
    let manager = PermissionManager::new(repository.clone());

    let reports = || vec![Permission::new(Resource::Reports, [Action::Read])];
    repository.insert_role(&Role::new("ÁREA JURÍDICA", None, reports())).await?;

    let found = repository.find_role_by_name("área jurídica").await?;
    assert_eq!(found.map(|r| r.name).as_deref(), Some("ÁREA JURÍDICA"));

    let duplicate = repository.insert_role(&Role::new("Área Jurídica", None, reports())).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))), "got {duplicate:?}");
    assert_eq!(repository.count_roles().await?, 6);

    // A legacy type spelled in lowercase still resolves to the role
    let (user_id, _) = register(&app, "Abogada", "abogada@example.com").await?;
    set_user_type(&pool, user_id, "área jurídica").await?;
    assert!(manager.has_permission(user_id, Resource::Reports, Action::Read, None).await);

    Ok(())
}
