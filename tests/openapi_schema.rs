use serde_json::Value;

#[test]
fn openapi_describes_permission_model() -> anyhow::Result<()> {
    // Build the OpenAPI document the same way the server does
    let doc = interventoria::docs::build_openapi(8000);
    let v = serde_json::to_value(&doc)?;

    let schemas = v
        .pointer("/components/schemas")
        .and_then(Value::as_object)
        .expect("components.schemas must exist");

    for name in ["Role", "Permission", "Conditions", "PermissionContext", "Document", "Project", "EffectivePermissions"] {
        assert!(schemas.contains_key(name), "OpenAPI missing schema '{name}'");
    }

    let permission = schemas["Permission"]["properties"]
        .as_object()
        .expect("Permission.properties must exist");
    for key in ["resource", "actions", "conditions"] {
        assert!(permission.contains_key(key), "Permission schema missing '{key}'");
    }

    let resources = &schemas["Resource"]["enum"];
    assert_eq!(
        resources,
        &serde_json::json!(["usuarios", "proyectos", "documentos", "reportes", "configuracion"])
    );

    Ok(())
}

#[test]
fn openapi_lists_role_and_document_routes_with_bearer_auth() -> anyhow::Result<()> {
    let doc = interventoria::docs::build_openapi(8123);
    let v = serde_json::to_value(&doc)?;

    let paths = v.get("paths").and_then(Value::as_object).expect("paths must exist");
    for path in [
        "/roles",
        "/roles/check",
        "/roles/users/{user_id}/effective-permissions",
        "/projects/{id}/documents",
        "/documents/{id}/approve",
        "/reports/projects/export",
    ] {
        assert!(paths.contains_key(path), "OpenAPI missing path '{path}'");
    }

    assert!(v.pointer("/components/securitySchemes/bearerAuth").is_some());
    assert_eq!(
        v.pointer("/servers/0/url").and_then(Value::as_str),
        Some("http://localhost:8123")
    );

    Ok(())
}
