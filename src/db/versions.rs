//! Template version history.
//!
//! Versions are append-only: a row is written once, in the same transaction
//! that advances the template's `current_version`, and never touched again.

use chrono::Utc;
use sqlx::{Row, SqliteConnection};

use super::repository::{template_from_row, Repository, TEMPLATE_COLUMNS};
use crate::errors::AppError;
use crate::models::{validate_content, TemplateVersion, WaiverTemplate};

const VERSION_COLUMNS: &str = "id, template_id, version, name, content_snapshot, description, requires_guardian, guardian_age_threshold, created_by, created_at";

const SYSTEM_ACTOR: &str = "system";

impl Repository {
    /// Replace a template's content, recording the edit as a new version.
    pub async fn create_version(
        &self,
        template_id: &str,
        new_content: &str,
        actor: &str,
    ) -> Result<TemplateVersion, AppError> {
        validate_content(new_content)?;

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"UPDATE waiver_templates
               SET content = ?, updated_at = ?, current_version = current_version + 1
               WHERE id = ? AND deleted_at IS NULL
               RETURNING {}"#,
            TEMPLATE_COLUMNS
        ))
        .bind(new_content)
        .bind(&now)
        .bind(template_id)
        .fetch_optional(&mut *tx)
        .await?;

        let template = row
            .as_ref()
            .map(template_from_row)
            .ok_or_else(|| AppError::NotFound(format!("Template {} not found", template_id)))?;

        let version = insert_version(&mut tx, &template, actor).await?;
        tx.commit().await?;

        tracing::info!(
            template_id = %template_id,
            version = version.version,
            "Appended template version"
        );
        Ok(version)
    }

    /// Version history of a template, newest first. Deleted templates keep
    /// their history.
    pub async fn list_versions(&self, template_id: &str) -> Result<Vec<TemplateVersion>, AppError> {
        let exists = sqlx::query("SELECT 1 FROM waiver_templates WHERE id = ?")
            .bind(template_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!(
                "Template {} not found",
                template_id
            )));
        }

        let rows = sqlx::query(&format!(
            "SELECT {} FROM template_versions WHERE template_id = ? ORDER BY version DESC",
            VERSION_COLUMNS
        ))
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(version_from_row).collect())
    }

    /// Get a single version by its ID.
    pub async fn get_version(&self, version_id: &str) -> Result<Option<TemplateVersion>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM template_versions WHERE id = ?",
            VERSION_COLUMNS
        ))
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(version_from_row))
    }
}

/// Snapshot `template` at its `current_version`. Must run inside the
/// transaction that set that version.
pub(crate) async fn insert_version(
    conn: &mut SqliteConnection,
    template: &WaiverTemplate,
    actor: &str,
) -> Result<TemplateVersion, AppError> {
    let created_by = if actor.trim().is_empty() {
        SYSTEM_ACTOR
    } else {
        actor
    };

    let version = TemplateVersion {
        id: uuid::Uuid::new_v4().to_string(),
        template_id: template.id.clone(),
        version: template.current_version,
        name: template.name.clone(),
        content_snapshot: template.content.clone(),
        description: template.description.clone(),
        requires_guardian: template.requires_guardian,
        guardian_age_threshold: template.guardian_age_threshold,
        created_by: created_by.to_string(),
        created_at: Utc::now().to_rfc3339(),
    };

    sqlx::query(&format!(
        "INSERT INTO template_versions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        VERSION_COLUMNS
    ))
    .bind(&version.id)
    .bind(&version.template_id)
    .bind(version.version)
    .bind(&version.name)
    .bind(&version.content_snapshot)
    .bind(&version.description)
    .bind(version.requires_guardian as i32)
    .bind(version.guardian_age_threshold)
    .bind(&version.created_by)
    .bind(&version.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(version)
}

fn version_from_row(row: &sqlx::sqlite::SqliteRow) -> TemplateVersion {
    let requires_guardian: i32 = row.get("requires_guardian");
    TemplateVersion {
        id: row.get("id"),
        template_id: row.get("template_id"),
        version: row.get("version"),
        name: row.get("name"),
        content_snapshot: row.get("content_snapshot"),
        description: row.get("description"),
        requires_guardian: requires_guardian != 0,
        guardian_age_threshold: row.get("guardian_age_threshold"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::super::repository::tests::test_repo;
    use crate::errors::AppError;
    use crate::models::{CreateTemplateRequest, UpdateTemplateRequest};

    fn content(marker: &str) -> String {
        format!(
            "<p>{} By signing, the member accepts the inherent risks of martial arts training, including sparring, grappling and weapons practice.</p>",
            marker
        )
    }

    async fn seeded() -> (super::Repository, tempfile::TempDir, String) {
        let (repo, dir) = test_repo().await;
        let template = repo
            .create_template(&CreateTemplateRequest {
                organization_id: "org-1".to_string(),
                name: "Adult Waiver".to_string(),
                content: content("v1"),
                description: None,
                is_active: true,
                is_default: false,
                requires_guardian: false,
                guardian_age_threshold: 18,
                actor: "owner@example.com".to_string(),
            })
            .await
            .unwrap();
        (repo, dir, template.id)
    }

    #[tokio::test]
    async fn test_create_writes_version_one() {
        let (repo, _dir, id) = seeded().await;
        let versions = repo.list_versions(&id).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, 1);
        assert_eq!(versions[0].content_snapshot, content("v1"));
        assert_eq!(versions[0].created_by, "owner@example.com");
    }

    #[tokio::test]
    async fn test_versions_are_dense_and_newest_first() {
        let (repo, _dir, id) = seeded().await;
        repo.create_version(&id, &content("v2"), "editor").await.unwrap();
        repo.update_template(
            &id,
            &UpdateTemplateRequest {
                name: Some("Adult Waiver 2025".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let v4 = repo.create_version(&id, &content("v4"), "editor").await.unwrap();
        assert_eq!(v4.version, 4);
        assert_eq!(v4.name, "Adult Waiver 2025");

        let numbers: Vec<i64> = repo
            .list_versions(&id)
            .await
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(numbers, vec![4, 3, 2, 1]);

        let template = repo.get_template(&id).await.unwrap().unwrap();
        assert_eq!(template.current_version, 4);
        assert_eq!(template.content, content("v4"));
    }

    #[tokio::test]
    async fn test_old_versions_unchanged_by_later_edits() {
        let (repo, _dir, id) = seeded().await;
        let v1_id = repo.list_versions(&id).await.unwrap()[0].id.clone();
        repo.create_version(&id, &content("v2"), "editor").await.unwrap();

        let v1 = repo.get_version(&v1_id).await.unwrap().unwrap();
        assert_eq!(v1.version, 1);
        assert_eq!(v1.content_snapshot, content("v1"));
    }

    #[tokio::test]
    async fn test_version_rows_reject_update() {
        let (repo, _dir, id) = seeded().await;
        let result = sqlx::query("UPDATE template_versions SET content_snapshot = 'x' WHERE template_id = ?")
            .bind(&id)
            .execute(&repo.pool)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_content_leaves_template_untouched() {
        let (repo, _dir, id) = seeded().await;
        let err = repo.create_version(&id, "too short", "editor").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let template = repo.get_template(&id).await.unwrap().unwrap();
        assert_eq!(template.current_version, 1);
        assert_eq!(repo.list_versions(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_template() {
        let (repo, _dir, _id) = seeded().await;
        assert!(matches!(
            repo.create_version("missing", &content("v2"), "editor").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            repo.list_versions("missing").await,
            Err(AppError::NotFound(_))
        ));
    }
}
