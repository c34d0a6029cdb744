//! Signed waiver persistence. Rows are inserted once and only ever read.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

use super::repository::Repository;
use crate::errors::AppError;
use crate::models::{MembershipDetails, SignedWaiverRecord, SignerRelationship};

const SIGNED_COLUMNS: &str = "id, waiver_template_id, template_version_used, organization_name, waiver_name, member_id, member_membership_id, signature_asset, signed_by_name, signed_by_relationship, signed_by_email, member_first_name, member_last_name, member_email, member_date_of_birth, member_age_at_signing, rendered_content, membership_json, ip_address, user_agent, signed_at";

impl Repository {
    /// Persist a signed record in a single statement.
    pub async fn insert_signed_waiver(&self, record: &SignedWaiverRecord) -> Result<(), AppError> {
        let membership_json = record
            .membership
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(&format!(
            "INSERT INTO signed_waivers ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            SIGNED_COLUMNS
        ))
        .bind(&record.id)
        .bind(&record.waiver_template_id)
        .bind(record.template_version_used)
        .bind(&record.organization_name)
        .bind(&record.waiver_name)
        .bind(&record.member_id)
        .bind(&record.member_membership_id)
        .bind(&record.signature_asset)
        .bind(&record.signed_by_name)
        .bind(record.signed_by_relationship.as_str())
        .bind(&record.signed_by_email)
        .bind(&record.member_first_name)
        .bind(&record.member_last_name)
        .bind(&record.member_email)
        .bind(record.member_date_of_birth)
        .bind(record.member_age_at_signing)
        .bind(&record.rendered_content)
        .bind(&membership_json)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(record.signed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_signed_waiver(&self, id: &str) -> Result<Option<SignedWaiverRecord>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM signed_waivers WHERE id = ?",
            SIGNED_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(signed_from_row).transpose()
    }

    /// Every waiver a member has signed, newest first.
    pub async fn list_signed_waivers_for_member(
        &self,
        member_id: &str,
    ) -> Result<Vec<SignedWaiverRecord>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM signed_waivers WHERE member_id = ? ORDER BY signed_at DESC",
            SIGNED_COLUMNS
        ))
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(signed_from_row).collect()
    }
}

fn signed_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SignedWaiverRecord, AppError> {
    let relationship: String = row.get("signed_by_relationship");
    let signed_by_relationship = SignerRelationship::parse(&relationship).ok_or_else(|| {
        AppError::Internal(format!("Unknown signer relationship '{}'", relationship))
    })?;

    let membership_json: Option<String> = row.get("membership_json");
    let membership = membership_json
        .map(|json| serde_json::from_str::<MembershipDetails>(&json))
        .transpose()
        .map_err(|e| AppError::Internal(format!("Corrupt membership snapshot: {}", e)))?;

    let member_date_of_birth: Option<NaiveDate> = row.get("member_date_of_birth");
    let signed_at: DateTime<Utc> = row.get("signed_at");

    Ok(SignedWaiverRecord {
        id: row.get("id"),
        waiver_template_id: row.get("waiver_template_id"),
        template_version_used: row.get("template_version_used"),
        organization_name: row.get("organization_name"),
        waiver_name: row.get("waiver_name"),
        member_id: row.get("member_id"),
        member_membership_id: row.get("member_membership_id"),
        signature_asset: row.get("signature_asset"),
        signed_by_name: row.get("signed_by_name"),
        signed_by_relationship,
        signed_by_email: row.get("signed_by_email"),
        member_first_name: row.get("member_first_name"),
        member_last_name: row.get("member_last_name"),
        member_email: row.get("member_email"),
        member_date_of_birth,
        member_age_at_signing: row.get("member_age_at_signing"),
        rendered_content: row.get("rendered_content"),
        membership,
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        signed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::super::repository::tests::test_repo;
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(id: &str, member_id: &str, signed_at: DateTime<Utc>) -> SignedWaiverRecord {
        SignedWaiverRecord {
            id: id.to_string(),
            waiver_template_id: "tpl-1".to_string(),
            template_version_used: 3,
            organization_name: "Iron Fist Dojo".to_string(),
            waiver_name: "Youth Waiver".to_string(),
            member_id: member_id.to_string(),
            member_membership_id: Some("mm-1".to_string()),
            signature_asset: "data:image/png;base64,AAAA".to_string(),
            signed_by_name: "Pat Doe".to_string(),
            signed_by_relationship: SignerRelationship::LegalGuardian,
            signed_by_email: Some("pat@example.com".to_string()),
            member_first_name: "Sam".to_string(),
            member_last_name: "Doe".to_string(),
            member_email: "sam@example.com".to_string(),
            member_date_of_birth: NaiveDate::from_ymd_opt(2010, 6, 1),
            member_age_at_signing: Some(14),
            rendered_content: "<p>Sam Doe accepts the risks.</p>".to_string(),
            membership: Some(MembershipDetails {
                plan_name: "Youth Unlimited".to_string(),
                price_cents: 12_900,
                billing_period: Some("month".to_string()),
                coupon_code: Some("SPRING".to_string()),
                discounted_price_cents: Some(9_900),
                ..Default::default()
            }),
            ip_address: Some("203.0.113.7".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
            signed_at,
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let (repo, _dir) = test_repo().await;
        let signed_at = Utc.with_ymd_and_hms(2024, 9, 1, 15, 30, 0).unwrap();
        let original = record("sw-1", "member-1", signed_at);
        repo.insert_signed_waiver(&original).await.unwrap();

        let loaded = repo.get_signed_waiver("sw-1").await.unwrap().unwrap();
        assert_eq!(loaded.signed_at, signed_at);
        assert_eq!(loaded.signed_by_relationship, SignerRelationship::LegalGuardian);
        assert_eq!(loaded.member_date_of_birth, original.member_date_of_birth);
        assert_eq!(loaded.membership, original.membership);
        assert_eq!(loaded.rendered_content, original.rendered_content);
        assert_eq!(loaded.template_version_used, 3);

        assert!(repo.get_signed_waiver("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_member_history_newest_first() {
        let (repo, _dir) = test_repo().await;
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        repo.insert_signed_waiver(&record("old", "member-1", base))
            .await
            .unwrap();
        repo.insert_signed_waiver(&record("new", "member-1", base + Duration::days(30)))
            .await
            .unwrap();
        repo.insert_signed_waiver(&record("other", "member-2", base))
            .await
            .unwrap();

        let ids: Vec<String> = repo
            .list_signed_waivers_for_member("member-1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_signed_rows_are_write_once() {
        let (repo, _dir) = test_repo().await;
        let signed_at = Utc.with_ymd_and_hms(2024, 9, 1, 15, 30, 0).unwrap();
        repo.insert_signed_waiver(&record("sw-1", "member-1", signed_at))
            .await
            .unwrap();

        let update = sqlx::query("UPDATE signed_waivers SET rendered_content = 'edited' WHERE id = 'sw-1'")
            .execute(&repo.pool)
            .await;
        assert!(update.is_err());
        let delete = sqlx::query("DELETE FROM signed_waivers WHERE id = 'sw-1'")
            .execute(&repo.pool)
            .await;
        assert!(delete.is_err());

        let loaded = repo.get_signed_waiver("sw-1").await.unwrap().unwrap();
        assert_eq!(loaded.rendered_content, "<p>Sam Doe accepts the risks.</p>");

        // Same id twice is a conflict, not an overwrite.
        assert!(matches!(
            repo.insert_signed_waiver(&record("sw-1", "member-1", signed_at))
                .await,
            Err(AppError::Conflict(_))
        ));
    }
}
