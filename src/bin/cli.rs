use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use uuid::Uuid;

use interventoria::authz::{PermissionManager, RoleRepository, SqliteRoleRepository};
use interventoria::config::load_env;
use interventoria::db;

#[derive(Parser, Debug)]
#[command(author, version, about = "interventoria maintenance tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Insert the default roles when the roles table is empty
    SeedRoles,
    /// Assign a role to a user, e.g. to bootstrap the first administrator
    GrantRole {
        /// Email of the user
        email: String,
        /// Role name, matched case-insensitively
        role: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            // connect() applies pending migrations
            db::init().await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = connect_without_migrating().await?;
            print_status(&pool).await?;
        }
        Commands::SeedRoles => {
            let pool = db::init().await?;
            let manager = PermissionManager::new(Arc::new(SqliteRoleRepository::new(pool)));
            let inserted = manager.seed_default_roles().await?;
            if inserted == 0 {
                println!("Roles already present; nothing seeded");
            } else {
                println!("Seeded {inserted} default roles");
            }
        }
        Commands::GrantRole { email, role } => {
            let pool = db::init().await?;
            grant_role(&pool, &email, &role).await?;
            println!("Granted '{role}' to {email}");
        }
    }

    Ok(())
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    // sqlx reads the version from the leading digits, so no separators.
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let filename = format!("{}_{}.sql", timestamp, sanitize_name(name));
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn connect_without_migrating() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePool::connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool) -> anyhow::Result<()> {
    let has_table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;

    let applied: HashSet<i64> = if has_table.is_some() {
        sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} Name", "Status", "Version");
    for migration in sqlx::migrate!().iter() {
        let status = if applied.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn grant_role(pool: &SqlitePool, email: &str, role_name: &str) -> anyhow::Result<()> {
    let user_id: Uuid = sqlx::query_scalar("SELECT id FROM users WHERE email = ? AND deleted_at IS NULL")
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no live user with email {email}"))?;

    let repository = SqliteRoleRepository::new(pool.clone());
    let role = repository
        .find_role_by_name(role_name)
        .await?
        .with_context(|| format!("no role named '{role_name}'"))?;

    sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id, created_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(role.id)
        .bind(Utc::now())
        .execute(pool)
        .await?;

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}
