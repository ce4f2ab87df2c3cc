use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::role::{name_key, DbRole, Role, ROLE_COLUMNS};

/// What the engine needs to know about a user.
#[derive(Debug, Clone, Default)]
pub struct UserRoles {
    /// Legacy user-type field from before roles existed.
    pub user_type: Option<String>,
    /// Every assigned role, active or not, in name order.
    pub roles: Vec<Role>,
}

/// Storage port for the permission engine.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// `None` when the user does not exist, is deleted, or is deactivated.
    async fn find_user_roles(&self, user_id: Uuid) -> AppResult<Option<UserRoles>>;

    /// Case-insensitive exact name lookup.
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>>;

    async fn count_roles(&self) -> AppResult<i64>;

    async fn insert_role(&self, role: &Role) -> AppResult<()>;
}

/// SQLite adapter over the `users`, `roles` and `user_roles` tables.
#[derive(Debug, Clone)]
pub struct SqliteRoleRepository {
    pool: SqlitePool,
}

impl SqliteRoleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleRepository for SqliteRoleRepository {
    async fn find_user_roles(&self, user_id: Uuid) -> AppResult<Option<UserRoles>> {
        let user_type: Option<Option<String>> = sqlx::query_scalar(
            "SELECT user_type FROM users WHERE id = ? AND deleted_at IS NULL AND active = 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(user_type) = user_type else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, DbRole>(
            r#"
            SELECT r.id, r.name, r.description, r.permissions, r.active, r.created_at, r.updated_at
            FROM roles r
            INNER JOIN user_roles ur ON r.id = ur.role_id
            WHERE ur.user_id = ?
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let roles = rows
            .into_iter()
            .map(Role::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(UserRoles { user_type, roles }))
    }

    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name_key = ?");
        let row = sqlx::query_as::<_, DbRole>(&sql)
            .bind(name_key(name))
            .fetch_optional(&self.pool)
            .await?;

        row.map(Role::try_from).transpose()
    }

    async fn count_roles(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM roles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_role(&self, role: &Role) -> AppResult<()> {
        let permissions = serde_json::to_string(&role.permissions)?;

        sqlx::query(
            "INSERT INTO roles (id, name, name_key, description, permissions, active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(role.id)
        .bind(&role.name)
        .bind(name_key(&role.name))
        .bind(&role.description)
        .bind(permissions)
        .bind(role.active)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| AppError::on_unique_violation(err, format!("role '{}' already exists", role.name)))?;

        Ok(())
    }
}
