use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct CountByKey {
    pub key: String,
    pub count: i64,
}

/// Portfolio overview: live projects and documents grouped by state and type.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectsReport {
    pub total_projects: i64,
    pub total_documents: i64,
    pub projects_by_state: Vec<CountByKey>,
    pub projects_by_kind: Vec<CountByKey>,
    pub documents_by_state: Vec<CountByKey>,
}

impl ProjectsReport {
    /// `section,key,count` rows.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("section,key,count\n");
        let sections = [
            ("projects_by_state", &self.projects_by_state),
            ("projects_by_kind", &self.projects_by_kind),
            ("documents_by_state", &self.documents_by_state),
        ];
        for (section, rows) in sections {
            for row in rows {
                out.push_str(&format!("{section},{},{}\n", row.key, row.count));
            }
        }
        out.push_str(&format!("totals,projects,{}\n", self.total_projects));
        out.push_str(&format!("totals,documents,{}\n", self.total_documents));
        out
    }
}
