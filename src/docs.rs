use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::{OpenApi as OpenApiDoc, Server};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::authz;
use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::auth::logout,
        routes::auth::my_permissions,
        routes::users::list_users,
        routes::users::get_user,
        routes::users::update_user,
        routes::users::delete_user,
        routes::roles::list_roles,
        routes::roles::create_role,
        routes::roles::get_role,
        routes::roles::update_role,
        routes::roles::delete_role,
        routes::roles::seed_roles,
        routes::roles::list_user_roles,
        routes::roles::assign_role,
        routes::roles::revoke_role,
        routes::roles::effective_permissions,
        routes::roles::check_permission,
        routes::projects::list_projects,
        routes::projects::create_project,
        routes::projects::get_project,
        routes::projects::update_project,
        routes::projects::delete_project,
        routes::documents::list_project_documents,
        routes::documents::create_document,
        routes::documents::get_document,
        routes::documents::update_document,
        routes::documents::delete_document,
        routes::documents::submit_document,
        routes::documents::start_review,
        routes::documents::approve_document,
        routes::documents::reject_document,
        routes::reports::projects_report,
        routes::reports::export_projects_report
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::auth::MessageResponse,
            authz::Resource,
            authz::Action,
            authz::Conditions,
            authz::Permission,
            authz::PermissionContext,
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::user::UserUpdateRequest,
            models::role::Role,
            models::role::RoleCreateRequest,
            models::role::RoleUpdateRequest,
            models::role::UserRole,
            models::role::AssignRoleRequest,
            models::role::CheckPermissionRequest,
            models::role::CheckPermissionResponse,
            models::role::EffectivePermissions,
            models::role::SeedResponse,
            models::project::Project,
            models::project::ProjectState,
            models::project::ProjectKind,
            models::project::ProjectCreateRequest,
            models::project::ProjectUpdateRequest,
            models::document::Document,
            models::document::DocumentState,
            models::document::DocumentKind,
            models::document::DocumentCreateRequest,
            models::document::DocumentUpdateRequest,
            models::document::DocumentReviewRequest,
            models::report::CountByKey,
            models::report::ProjectsReport
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Service status"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Users", description = "User administration"),
        (name = "Roles", description = "Roles, assignments and permission checks"),
        (name = "Projects", description = "Project management"),
        (name = "Documents", description = "Filed documents and their review workflow"),
        (name = "Reports", description = "Portfolio reports")
    )
)]
pub struct ApiDoc;

/// Registers the `bearerAuth` scheme referenced by the handlers.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut OpenApiDoc) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// The generated document, pointed at the local server so Try-it-out works.
pub fn build_openapi(port: u16) -> OpenApiDoc {
    let mut doc = ApiDoc::openapi();
    doc.servers = Some(vec![Server::new(format!("http://localhost:{port}"))]);
    doc
}

pub fn swagger_routes(doc: OpenApiDoc) -> Router {
    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .with_credentials(true)
        .persist_authorization(true);

    let doc = Arc::new(doc);
    let json_route = get(move || {
        let doc = Arc::clone(&doc);
        async move { Json((*doc).clone()) }
    });

    Router::new()
        .route("/api-docs/openapi.json", json_route)
        .merge(SwaggerUi::new("/docs").config(swagger_config))
}
