use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::authz::{Action, Resource};
use crate::errors::AppResult;
use crate::jwt::AuthUser;
use crate::models::report::{CountByKey, ProjectsReport};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(projects_report))
        .route("/projects/export", get(export_projects_report))
}

async fn count_by(pool: &SqlitePool, sql: &str) -> AppResult<Vec<CountByKey>> {
    Ok(sqlx::query_as::<_, CountByKey>(sql).fetch_all(pool).await?)
}

async fn build_report(pool: &SqlitePool) -> AppResult<ProjectsReport> {
    let total_projects: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM projects WHERE deleted_at IS NULL")
        .fetch_one(pool)
        .await?;
    let total_documents: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM documents WHERE deleted_at IS NULL")
        .fetch_one(pool)
        .await?;

    Ok(ProjectsReport {
        total_projects,
        total_documents,
        projects_by_state: count_by(
            pool,
            "SELECT state AS key, COUNT(1) AS count FROM projects WHERE deleted_at IS NULL GROUP BY state ORDER BY state",
        )
        .await?,
        projects_by_kind: count_by(
            pool,
            "SELECT kind AS key, COUNT(1) AS count FROM projects WHERE deleted_at IS NULL GROUP BY kind ORDER BY kind",
        )
        .await?,
        documents_by_state: count_by(
            pool,
            "SELECT state AS key, COUNT(1) AS count FROM documents WHERE deleted_at IS NULL GROUP BY state ORDER BY state",
        )
        .await?,
    })
}

#[utoipa::path(
    get,
    path = "/reports/projects",
    tag = "Reports",
    responses(
        (status = 200, description = "Project and document counts", body = ProjectsReport),
        (status = 403, description = "Missing reportes:leer")
    ),
    security(("bearerAuth" = []))
)]
pub async fn projects_report(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<ProjectsReport>> {
    state
        .permissions
        .require(auth.user_id, Resource::Reports, Action::Read, None)
        .await?;

    Ok(Json(build_report(&state.pool).await?))
}

#[utoipa::path(
    get,
    path = "/reports/projects/export",
    tag = "Reports",
    responses(
        (status = 200, description = "Same counts as CSV", content_type = "text/csv", body = String),
        (status = 403, description = "Missing reportes:exportar")
    ),
    security(("bearerAuth" = []))
)]
pub async fn export_projects_report(State(state): State<AppState>, auth: AuthUser) -> AppResult<impl IntoResponse> {
    state
        .permissions
        .require(auth.user_id, Resource::Reports, Action::Export, None)
        .await?;

    let report = build_report(&state.pool).await?;
    tracing::info!(user_id = %auth.user_id, "projects report exported");

    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8"),
            (CONTENT_DISPOSITION, "attachment; filename=\"proyectos.csv\""),
        ],
        report.to_csv(),
    ))
}
