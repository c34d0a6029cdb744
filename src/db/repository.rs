//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    CreateMergeFieldRequest, CreateTemplateRequest, MergeField, UpdateMergeFieldRequest,
    UpdateTemplateRequest, WaiverTemplate,
};

pub(crate) const TEMPLATE_COLUMNS: &str = "id, organization_id, name, content, description, is_active, is_default, requires_guardian, guardian_age_threshold, current_version, created_at, updated_at";

const MERGE_FIELD_COLUMNS: &str =
    "id, organization_id, key, label, default_value, description, created_at, updated_at";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(crate) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== TEMPLATE OPERATIONS ====================

    /// List live templates, optionally for one organization.
    pub async fn list_templates(
        &self,
        organization_id: Option<&str>,
    ) -> Result<Vec<WaiverTemplate>, AppError> {
        let rows = match organization_id {
            Some(org) => {
                sqlx::query(&format!(
                    "SELECT {} FROM waiver_templates WHERE deleted_at IS NULL AND organization_id = ? ORDER BY name",
                    TEMPLATE_COLUMNS
                ))
                .bind(org)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM waiver_templates WHERE deleted_at IS NULL ORDER BY name",
                    TEMPLATE_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(template_from_row).collect())
    }

    /// Get a live (not deleted) template by ID.
    pub async fn get_template(&self, id: &str) -> Result<Option<WaiverTemplate>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM waiver_templates WHERE id = ? AND deleted_at IS NULL",
            TEMPLATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(template_from_row))
    }

    /// Get a live template or fail with NotFound.
    pub async fn require_template(&self, id: &str) -> Result<WaiverTemplate, AppError> {
        self.get_template(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Template {} not found", id)))
    }

    /// Create a template together with its version 1.
    pub async fn create_template(
        &self,
        request: &CreateTemplateRequest,
    ) -> Result<WaiverTemplate, AppError> {
        request.validate()?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        if request.is_default {
            clear_default(&mut tx, &request.organization_id, &id).await?;
        }

        sqlx::query(
            "INSERT INTO waiver_templates (id, organization_id, name, content, description, is_active, is_default, requires_guardian, guardian_age_threshold, current_version, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)"
        )
        .bind(&id)
        .bind(&request.organization_id)
        .bind(&request.name)
        .bind(&request.content)
        .bind(&request.description)
        .bind(request.is_active as i32)
        .bind(request.is_default as i32)
        .bind(request.requires_guardian as i32)
        .bind(request.guardian_age_threshold)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let template = WaiverTemplate {
            id,
            organization_id: request.organization_id.clone(),
            name: request.name.clone(),
            content: request.content.clone(),
            description: request.description.clone(),
            is_active: request.is_active,
            is_default: request.is_default,
            requires_guardian: request.requires_guardian,
            guardian_age_threshold: request.guardian_age_threshold,
            current_version: 1,
            created_at: now.clone(),
            updated_at: now,
        };

        super::versions::insert_version(&mut tx, &template, &request.actor).await?;

        tx.commit().await?;

        tracing::info!(template_id = %template.id, "Created waiver template");
        Ok(template)
    }

    /// Update a template. Name, content, description and guardian edits
    /// append a version; activation and default flags do not.
    ///
    /// Concurrent edits are last-writer-wins on the row; the version history
    /// keeps every state either way.
    pub async fn update_template(
        &self,
        id: &str,
        request: &UpdateTemplateRequest,
    ) -> Result<WaiverTemplate, AppError> {
        request.validate()?;

        let versioned = request.name.is_some()
            || request.content.is_some()
            || request.description.is_some()
            || request.requires_guardian.is_some()
            || request.guardian_age_threshold.is_some();

        let mut tx = self.pool.begin().await?;

        // Write first: the transaction must take the write lock on its first statement.
        let row = sqlx::query(&format!(
            r#"UPDATE waiver_templates SET
                name = COALESCE(?, name),
                content = COALESCE(?, content),
                description = COALESCE(?, description),
                is_active = COALESCE(?, is_active),
                is_default = COALESCE(?, is_default),
                requires_guardian = COALESCE(?, requires_guardian),
                guardian_age_threshold = COALESCE(?, guardian_age_threshold),
                updated_at = ?,
                current_version = current_version + ?
            WHERE id = ? AND deleted_at IS NULL
            RETURNING {}"#,
            TEMPLATE_COLUMNS
        ))
        .bind(&request.name)
        .bind(&request.content)
        .bind(&request.description)
        .bind(request.is_active.map(|v| v as i32))
        .bind(request.is_default.map(|v| v as i32))
        .bind(request.requires_guardian.map(|v| v as i32))
        .bind(request.guardian_age_threshold)
        .bind(Utc::now().to_rfc3339())
        .bind(versioned as i64)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let template = row
            .as_ref()
            .map(template_from_row)
            .ok_or_else(|| AppError::NotFound(format!("Template {} not found", id)))?;

        if template.is_default {
            clear_default(&mut tx, &template.organization_id, &template.id).await?;
        }

        if versioned {
            super::versions::insert_version(&mut tx, &template, &request.actor).await?;
        }

        tx.commit().await?;

        if versioned {
            tracing::info!(
                template_id = %id,
                version = template.current_version,
                "Appended template version"
            );
        }

        Ok(template)
    }

    /// Soft-delete a template. Versions and signed records are untouched.
    pub async fn delete_template(&self, id: &str) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE waiver_templates SET deleted_at = ?, is_default = 0 WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Template {} not found", id)));
        }

        tracing::info!(template_id = %id, "Soft-deleted waiver template");
        Ok(())
    }

    // ==================== MEMBERSHIP PLAN LINKS ====================

    /// Active templates linked to a membership plan, default first.
    pub async fn waivers_for_membership(
        &self,
        membership_plan_id: &str,
    ) -> Result<Vec<WaiverTemplate>, AppError> {
        let columns = TEMPLATE_COLUMNS
            .split(", ")
            .map(|c| format!("t.{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = sqlx::query(&format!(
            r#"SELECT {} FROM waiver_templates t
               JOIN membership_plan_waivers l ON l.template_id = t.id
               WHERE l.membership_plan_id = ? AND t.is_active = 1 AND t.deleted_at IS NULL
               ORDER BY t.is_default DESC, t.name"#,
            columns
        ))
        .bind(membership_plan_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(template_from_row).collect())
    }

    /// Require a template for a membership plan. Linking twice is a no-op.
    pub async fn link_plan_waiver(
        &self,
        membership_plan_id: &str,
        template_id: &str,
    ) -> Result<(), AppError> {
        self.require_template(template_id).await?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT OR IGNORE INTO membership_plan_waivers (membership_plan_id, template_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(membership_plan_id)
        .bind(template_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn unlink_plan_waiver(
        &self,
        membership_plan_id: &str,
        template_id: &str,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "DELETE FROM membership_plan_waivers WHERE membership_plan_id = ? AND template_id = ?",
        )
        .bind(membership_plan_id)
        .bind(template_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Template {} is not linked to plan {}",
                template_id, membership_plan_id
            )));
        }
        Ok(())
    }

    // ==================== MERGE FIELD OPERATIONS ====================

    /// List merge fields for an organization.
    pub async fn list_merge_fields(
        &self,
        organization_id: &str,
    ) -> Result<Vec<MergeField>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM merge_fields WHERE organization_id = ? ORDER BY key",
            MERGE_FIELD_COLUMNS
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(merge_field_from_row).collect())
    }

    /// Get a merge field by ID.
    pub async fn get_merge_field(&self, id: &str) -> Result<Option<MergeField>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM merge_fields WHERE id = ?",
            MERGE_FIELD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(merge_field_from_row))
    }

    /// Organization default values keyed by merge-field key.
    pub async fn merge_field_defaults(
        &self,
        organization_id: &str,
    ) -> Result<HashMap<String, String>, AppError> {
        let rows = sqlx::query("SELECT key, default_value FROM merge_fields WHERE organization_id = ?")
            .bind(organization_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("key"), row.get("default_value")))
            .collect())
    }

    /// Create a merge field; keys are unique per organization.
    pub async fn create_merge_field(
        &self,
        request: &CreateMergeFieldRequest,
    ) -> Result<MergeField, AppError> {
        request.validate()?;
        self.ensure_key_free(&request.organization_id, &request.key, None)
            .await?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO merge_fields (id, organization_id, key, label, default_value, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(&request.organization_id)
        .bind(&request.key)
        .bind(&request.label)
        .bind(&request.default_value)
        .bind(&request.description)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(MergeField {
            id,
            organization_id: request.organization_id.clone(),
            key: request.key.clone(),
            label: request.label.clone(),
            default_value: request.default_value.clone(),
            description: request.description.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Update a merge field.
    pub async fn update_merge_field(
        &self,
        id: &str,
        request: &UpdateMergeFieldRequest,
    ) -> Result<MergeField, AppError> {
        request.validate()?;

        let existing = self
            .get_merge_field(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Merge field {} not found", id)))?;

        if let Some(key) = &request.key {
            if key != &existing.key {
                self.ensure_key_free(&existing.organization_id, key, Some(id))
                    .await?;
            }
        }

        let updated = MergeField {
            key: request.key.clone().unwrap_or(existing.key.clone()),
            label: request.label.clone().unwrap_or(existing.label.clone()),
            default_value: request
                .default_value
                .clone()
                .unwrap_or(existing.default_value.clone()),
            description: request.description.clone().or(existing.description.clone()),
            updated_at: Utc::now().to_rfc3339(),
            ..existing
        };

        sqlx::query(
            "UPDATE merge_fields SET key = ?, label = ?, default_value = ?, description = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&updated.key)
        .bind(&updated.label)
        .bind(&updated.default_value)
        .bind(&updated.description)
        .bind(&updated.updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(updated)
    }

    /// Delete a merge field. Templates referencing its key keep the token.
    pub async fn delete_merge_field(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM merge_fields WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Merge field {} not found", id)));
        }
        Ok(())
    }

    async fn ensure_key_free(
        &self,
        organization_id: &str,
        key: &str,
        except_id: Option<&str>,
    ) -> Result<(), AppError> {
        let row = sqlx::query("SELECT id FROM merge_fields WHERE organization_id = ? AND key = ?")
            .bind(organization_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) if Some(row.get::<String, _>("id").as_str()) != except_id => Err(
                AppError::Conflict(format!("Merge field key '{}' already exists", key)),
            ),
            _ => Ok(()),
        }
    }
}

/// Clear the default flag on every template of the organization except `keep_id`.
async fn clear_default(
    conn: &mut sqlx::SqliteConnection,
    organization_id: &str,
    keep_id: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE waiver_templates SET is_default = 0 WHERE organization_id = ? AND is_default = 1 AND id != ?",
    )
    .bind(organization_id)
    .bind(keep_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// Helper functions for row conversion

pub(crate) fn template_from_row(row: &sqlx::sqlite::SqliteRow) -> WaiverTemplate {
    let is_active: i32 = row.get("is_active");
    let is_default: i32 = row.get("is_default");
    let requires_guardian: i32 = row.get("requires_guardian");
    WaiverTemplate {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        name: row.get("name"),
        content: row.get("content"),
        description: row.get("description"),
        is_active: is_active != 0,
        is_default: is_default != 0,
        requires_guardian: requires_guardian != 0,
        guardian_age_threshold: row.get("guardian_age_threshold"),
        current_version: row.get("current_version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn merge_field_from_row(row: &sqlx::sqlite::SqliteRow) -> MergeField {
    MergeField {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        key: row.get("key"),
        label: row.get("label"),
        default_value: row.get("default_value"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    pub(crate) async fn test_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        (Repository::new(pool), temp_dir)
    }

    fn template_request(org: &str, name: &str, is_default: bool) -> CreateTemplateRequest {
        CreateTemplateRequest {
            organization_id: org.to_string(),
            name: name.to_string(),
            content: format!("<p>{}</p>", "I release <academy_name> from all claims. ".repeat(5)),
            description: None,
            is_active: true,
            is_default,
            requires_guardian: false,
            guardian_age_threshold: 18,
            actor: "owner".to_string(),
        }
    }

    fn field_request(org: &str, key: &str) -> CreateMergeFieldRequest {
        CreateMergeFieldRequest {
            organization_id: org.to_string(),
            key: key.to_string(),
            label: "Label".to_string(),
            default_value: "Value".to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_single_default_per_organization() {
        let (repo, _dir) = test_repo().await;
        let first = repo
            .create_template(&template_request("org-1", "First", true))
            .await
            .unwrap();
        let second = repo
            .create_template(&template_request("org-1", "Second", true))
            .await
            .unwrap();
        let other_org = repo
            .create_template(&template_request("org-2", "Other", true))
            .await
            .unwrap();

        assert!(!repo.get_template(&first.id).await.unwrap().unwrap().is_default);
        assert!(repo.get_template(&second.id).await.unwrap().unwrap().is_default);
        assert!(repo.get_template(&other_org.id).await.unwrap().unwrap().is_default);
    }

    #[tokio::test]
    async fn test_flag_only_update_does_not_version() {
        let (repo, _dir) = test_repo().await;
        let template = repo
            .create_template(&template_request("org-1", "Waiver", false))
            .await
            .unwrap();

        let updated = repo
            .update_template(
                &template.id,
                &UpdateTemplateRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.current_version, 1);
        assert!(!updated.is_active);

        let updated = repo
            .update_template(
                &template.id,
                &UpdateTemplateRequest {
                    requires_guardian: Some(true),
                    guardian_age_threshold: Some(16),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.current_version, 2);
        assert!(updated.requires_guardian);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_all_commit() {
        let (repo, _dir) = test_repo().await;
        let template = repo
            .create_template(&template_request("org-1", "Waiver", false))
            .await
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let repo = repo.clone();
                let id = template.id.clone();
                tokio::spawn(async move {
                    repo.update_template(
                        &id,
                        &UpdateTemplateRequest {
                            name: Some(format!("Waiver rev {}", i)),
                            ..Default::default()
                        },
                    )
                    .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let current = repo.get_template(&template.id).await.unwrap().unwrap();
        assert_eq!(current.current_version, 17);
        let versions: Vec<i64> = repo
            .list_versions(&template.id)
            .await
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(versions, (1..=17).rev().collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_update_default_clears_siblings() {
        let (repo, _dir) = test_repo().await;
        let first = repo
            .create_template(&template_request("org-1", "First", true))
            .await
            .unwrap();
        let second = repo
            .create_template(&template_request("org-1", "Second", false))
            .await
            .unwrap();

        let updated = repo
            .update_template(
                &second.id,
                &UpdateTemplateRequest {
                    is_default: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_default);
        assert_eq!(updated.name, "Second");
        assert!(!repo.get_template(&first.id).await.unwrap().unwrap().is_default);

        assert!(matches!(
            repo.update_template("missing", &UpdateTemplateRequest::default()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_template() {
        let (repo, _dir) = test_repo().await;
        let template = repo
            .create_template(&template_request("org-1", "Waiver", false))
            .await
            .unwrap();
        repo.delete_template(&template.id).await.unwrap();

        assert!(repo.get_template(&template.id).await.unwrap().is_none());
        assert!(repo.list_templates(Some("org-1")).await.unwrap().is_empty());
        assert!(matches!(
            repo.delete_template(&template.id).await,
            Err(AppError::NotFound(_))
        ));
        // History survives deletion.
        assert_eq!(repo.list_versions(&template.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_membership_waivers_filter_inactive() {
        let (repo, _dir) = test_repo().await;
        let active = repo
            .create_template(&template_request("org-1", "Active", false))
            .await
            .unwrap();
        let mut inactive_request = template_request("org-1", "Inactive", false);
        inactive_request.is_active = false;
        let inactive = repo.create_template(&inactive_request).await.unwrap();

        repo.link_plan_waiver("plan-1", &active.id).await.unwrap();
        repo.link_plan_waiver("plan-1", &active.id).await.unwrap();
        repo.link_plan_waiver("plan-1", &inactive.id).await.unwrap();

        let waivers = repo.waivers_for_membership("plan-1").await.unwrap();
        assert_eq!(waivers.len(), 1);
        assert_eq!(waivers[0].id, active.id);

        repo.unlink_plan_waiver("plan-1", &active.id).await.unwrap();
        assert!(repo.waivers_for_membership("plan-1").await.unwrap().is_empty());
        assert!(matches!(
            repo.link_plan_waiver("plan-1", "missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_merge_field_key_unique_per_organization() {
        let (repo, _dir) = test_repo().await;
        repo.create_merge_field(&field_request("org-1", "academy_name"))
            .await
            .unwrap();
        assert!(matches!(
            repo.create_merge_field(&field_request("org-1", "academy_name"))
                .await,
            Err(AppError::Conflict(_))
        ));
        repo.create_merge_field(&field_request("org-2", "academy_name"))
            .await
            .unwrap();

        let other = repo
            .create_merge_field(&field_request("org-1", "city"))
            .await
            .unwrap();
        let rename = UpdateMergeFieldRequest {
            key: Some("academy_name".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            repo.update_merge_field(&other.id, &rename).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_merge_field_defaults_map() {
        let (repo, _dir) = test_repo().await;
        let mut request = field_request("org-1", "academy_name");
        request.default_value = "Iron Fist Dojo".to_string();
        repo.create_merge_field(&request).await.unwrap();
        repo.create_merge_field(&field_request("org-2", "city"))
            .await
            .unwrap();

        let defaults = repo.merge_field_defaults("org-1").await.unwrap();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults["academy_name"], "Iron Fist Dojo");
    }

    #[tokio::test]
    async fn test_invalid_merge_field_rejected_before_write() {
        let (repo, _dir) = test_repo().await;
        let err = repo
            .create_merge_field(&field_request("org-1", "Academy-Name"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(repo.list_merge_fields("org-1").await.unwrap().is_empty());
    }
}
