//! Database module for SQLite persistence.
//!
//! SQLite holds templates, their version history, merge fields, plan links and
//! signed waivers. Version history and signed waivers are append-only, and the
//! schema enforces it with triggers.

mod repository;
mod signed;
mod versions;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS waiver_templates (
            id TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            name TEXT NOT NULL,
            content TEXT NOT NULL,
            description TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_default INTEGER NOT NULL DEFAULT 0,
            requires_guardian INTEGER NOT NULL DEFAULT 0,
            guardian_age_threshold INTEGER NOT NULL DEFAULT 18,
            current_version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS template_versions (
            id TEXT PRIMARY KEY,
            template_id TEXT NOT NULL REFERENCES waiver_templates(id),
            version INTEGER NOT NULL CHECK (version >= 1),
            name TEXT NOT NULL,
            content_snapshot TEXT NOT NULL,
            description TEXT,
            requires_guardian INTEGER NOT NULL,
            guardian_age_threshold INTEGER NOT NULL,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (template_id, version)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS merge_fields (
            id TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            key TEXT NOT NULL,
            label TEXT NOT NULL,
            default_value TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (organization_id, key)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS membership_plan_waivers (
            membership_plan_id TEXT NOT NULL,
            template_id TEXT NOT NULL REFERENCES waiver_templates(id),
            created_at TEXT NOT NULL,
            PRIMARY KEY (membership_plan_id, template_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signed_waivers (
            id TEXT PRIMARY KEY,
            waiver_template_id TEXT NOT NULL,
            template_version_used INTEGER NOT NULL,
            organization_name TEXT NOT NULL,
            waiver_name TEXT NOT NULL,
            member_id TEXT NOT NULL,
            member_membership_id TEXT,
            signature_asset TEXT NOT NULL,
            signed_by_name TEXT NOT NULL,
            signed_by_relationship TEXT NOT NULL,
            signed_by_email TEXT,
            member_first_name TEXT NOT NULL,
            member_last_name TEXT NOT NULL,
            member_email TEXT NOT NULL,
            member_date_of_birth TEXT,
            member_age_at_signing INTEGER,
            rendered_content TEXT NOT NULL,
            membership_json TEXT,
            ip_address TEXT,
            user_agent TEXT,
            signed_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS signed_waivers_no_update
        BEFORE UPDATE ON signed_waivers
        BEGIN
            SELECT RAISE(ABORT, 'signed waivers are write-once');
        END;

        CREATE TRIGGER IF NOT EXISTS signed_waivers_no_delete
        BEFORE DELETE ON signed_waivers
        BEGIN
            SELECT RAISE(ABORT, 'signed waivers are write-once');
        END;

        CREATE TRIGGER IF NOT EXISTS template_versions_no_update
        BEFORE UPDATE ON template_versions
        BEGIN
            SELECT RAISE(ABORT, 'template versions are immutable');
        END;

        CREATE TRIGGER IF NOT EXISTS template_versions_no_delete
        BEFORE DELETE ON template_versions
        BEGIN
            SELECT RAISE(ABORT, 'template versions are immutable');
        END;
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_templates_org ON waiver_templates(organization_id);
        CREATE INDEX IF NOT EXISTS idx_versions_template ON template_versions(template_id, version);
        CREATE INDEX IF NOT EXISTS idx_merge_fields_org ON merge_fields(organization_id);
        CREATE INDEX IF NOT EXISTS idx_signed_waivers_member ON signed_waivers(member_id, signed_at);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
