use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retention class of an activity-log entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Never auto-deleted: role and permission changes, deletions.
    Critical,
    #[default]
    Important,
    /// Safe to trim aggressively.
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Entities that can be recorded in the activity log.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of event names, e.g. `document` in `document.approved`.
    fn entity_type() -> &'static str;

    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" => Severity::Critical,
            "created" | "updated" => self.severity(),
            _ => Severity::Important,
        }
    }
}
