use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: ActivityPayload,
}

pub type EventBus = broadcast::Sender<DomainEvent>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<DomainEvent>) {
    broadcast::channel(1024)
}

/// Client details captured alongside an activity entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    #[serde(rename = "new")]
    pub current: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    pub severity: Severity,
}

/// Publish `<entity>.<action>` for `entity`. Never fails the caller: a full or
/// listener-less bus just drops the event.
pub fn log_activity<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
    old_entity: Option<&T>,
    context: Option<RequestContext>,
) {
    let payload = ActivityPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: old_entity.and_then(|e| serde_json::to_value(e).ok()),
        context,
        severity: entity.severity_for_action(action),
    };

    let event = DomainEvent {
        id: Uuid::new_v4(),
        name: format!("{}.{}", T::entity_type(), action),
        occurred_at: Utc::now(),
        actor_id,
        subject_id: Some(entity.subject_id()),
        payload,
    };

    if event_bus.send(event).is_err() {
        tracing::debug!("no activity listener attached; event dropped");
    }
}

fn describe(name: &str) -> &'static str {
    match name {
        "role.created" => "Role created",
        "role.updated" => "Role updated",
        "role.deleted" => "Role deleted",
        "user_role.assigned" => "Role assigned to user",
        "user_role.revoked" => "Role revoked from user",
        "user.registered" => "New user registered",
        "user.updated" => "User updated",
        "user.deleted" => "User deleted",
        "project.created" => "Project created",
        "project.updated" => "Project updated",
        "project.deleted" => "Project deleted",
        "document.created" => "Document created",
        "document.updated" => "Document updated",
        "document.submitted" => "Document filed",
        "document.review_started" => "Document under review",
        "document.approved" => "Document approved",
        "document.rejected" => "Document rejected",
        "document.deleted" => "Document deleted",
        _ => "System event",
    }
}

/// SHA-256 over the previous link's hash followed by this entry's payload.
pub fn chain_hash(prev_hash: Option<&str>, payload: &str) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

async fn persist(pool: &SqlitePool, event: &DomainEvent) -> Result<(), sqlx::Error> {
    let properties = serde_json::to_string(event).unwrap_or_default();
    let severity = event.payload.severity.as_str();

    sqlx::query(
        r#"
        INSERT INTO activity_log (id, event_name, description, actor_id, subject_id, occurred_at, properties, severity)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id)
    .bind(&event.name)
    .bind(describe(&event.name))
    .bind(event.actor_id)
    .bind(event.subject_id)
    .bind(event.occurred_at)
    .bind(&properties)
    .bind(severity)
    .execute(pool)
    .await?;

    let mut tx = pool.begin().await?;
    let prev_hash: Option<String> = sqlx::query_scalar("SELECT hash FROM event_store ORDER BY seq DESC LIMIT 1")
        .fetch_optional(&mut *tx)
        .await?;
    let hash = chain_hash(prev_hash.as_deref(), &properties);

    sqlx::query(
        r#"
        INSERT INTO event_store (event_id, event_name, occurred_at, actor_id, subject_id, payload, severity, prev_hash, hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id)
    .bind(&event.name)
    .bind(event.occurred_at)
    .bind(event.actor_id)
    .bind(event.subject_id)
    .bind(&properties)
    .bind(severity)
    .bind(&prev_hash)
    .bind(&hash)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

pub async fn start_activity_listener(mut rx: broadcast::Receiver<DomainEvent>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Err(err) = persist(&pool, &event).await {
                    tracing::error!(event = %event.name, error = %err, "failed to save activity log");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "activity listener lagged; events lost");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
