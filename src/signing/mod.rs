//! Signed waiver record builder.
//!
//! Validates a signing submission against the template's guardian policy and
//! freezes the resolved text, signer identity and signature into a write-once
//! record. Validation collects every field error before anything is written.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::db::Repository;
use crate::errors::{AppError, FieldError};
use crate::guardian::{age_on, allowed_relationships, requires_guardian};
use crate::merge::{resolve_with_policy, Resolution, UnresolvedPolicy};
use crate::models::{
    into_result, SignWaiverRequest, SignedWaiverRecord, SignerRelationship, WaiverTemplate,
};

pub const MAX_SIGNER_NAME_LEN: usize = 100;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

fn is_email(value: &str) -> bool {
    EMAIL_RE.is_match(value.trim())
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Validate a submission and assemble the record it would produce.
///
/// `resolution` must come from `template`'s content as read alongside
/// `template.current_version`. Guardian rules are evaluated on the signing date.
pub fn build_record(
    request: &SignWaiverRequest,
    template: &WaiverTemplate,
    resolution: &Resolution,
    signed_at: DateTime<Utc>,
) -> Result<SignedWaiverRecord, AppError> {
    let signed_on = signed_at.date_naive();
    let mut errors = Vec::new();

    if is_blank(&request.member_id) {
        errors.push(FieldError::new("memberId", "Member is required"));
    }
    if is_blank(&request.organization_name) {
        errors.push(FieldError::new(
            "organizationName",
            "Organization name is required",
        ));
    }
    if is_blank(&request.member_first_name) {
        errors.push(FieldError::new("memberFirstName", "First name is required"));
    }
    if is_blank(&request.member_last_name) {
        errors.push(FieldError::new("memberLastName", "Last name is required"));
    }
    if is_blank(&request.member_email) {
        errors.push(FieldError::new("memberEmail", "Email is required"));
    } else if !is_email(&request.member_email) {
        errors.push(FieldError::new("memberEmail", "Email is not valid"));
    }
    if let Some(dob) = request.member_date_of_birth {
        if dob > signed_on {
            errors.push(FieldError::new(
                "memberDateOfBirth",
                "Date of birth cannot be in the future",
            ));
        }
    }

    if is_blank(&request.signature_asset) {
        errors.push(FieldError::new("signatureAsset", "Signature is required"));
    }
    let signer_name_len = request.signed_by_name.trim().chars().count();
    if signer_name_len == 0 {
        errors.push(FieldError::new("signedByName", "Signer name is required"));
    } else if signer_name_len > MAX_SIGNER_NAME_LEN {
        errors.push(FieldError::new(
            "signedByName",
            format!(
                "Signer name must be at most {} characters",
                MAX_SIGNER_NAME_LEN
            ),
        ));
    }
    if !request.agreed {
        errors.push(FieldError::new(
            "agreed",
            "You must agree to the waiver terms",
        ));
    }

    let guardian_required = requires_guardian(
        template.guardian_policy(),
        request.member_date_of_birth,
        signed_on,
    );
    let relationship = request.signed_by_relationship;
    if !allowed_relationships(guardian_required).contains(&relationship) {
        let message = if guardian_required {
            "A parent or guardian must sign for this member"
        } else {
            "Only the member may sign this waiver"
        };
        errors.push(FieldError::new("signedByRelationship", message));
    }

    let signed_by_email = request
        .signed_by_email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty());
    match signed_by_email {
        Some(email) if !is_email(email) => {
            errors.push(FieldError::new("signedByEmail", "Guardian email is not valid"));
        }
        None if guardian_required => {
            errors.push(FieldError::new(
                "signedByEmail",
                "Guardian email is required",
            ));
        }
        _ => {}
    }

    into_result(errors)?;

    Ok(SignedWaiverRecord {
        id: uuid::Uuid::new_v4().to_string(),
        waiver_template_id: template.id.clone(),
        template_version_used: template.current_version,
        organization_name: request.organization_name.trim().to_string(),
        waiver_name: template.name.clone(),
        member_id: request.member_id.clone(),
        member_membership_id: request.member_membership_id.clone(),
        signature_asset: request.signature_asset.clone(),
        signed_by_name: request.signed_by_name.trim().to_string(),
        signed_by_relationship: relationship,
        signed_by_email: signed_by_email.map(str::to_string),
        member_first_name: request.member_first_name.trim().to_string(),
        member_last_name: request.member_last_name.trim().to_string(),
        member_email: request.member_email.trim().to_string(),
        member_date_of_birth: request.member_date_of_birth,
        member_age_at_signing: request
            .member_date_of_birth
            .map(|dob| age_on(dob, signed_on)),
        rendered_content: resolution.resolved_content.clone(),
        membership: request.membership.clone(),
        ip_address: request.ip_address.clone(),
        user_agent: request.user_agent.clone(),
        signed_at,
    })
}

/// Resolve the live template, validate the submission and persist the record.
pub async fn sign_waiver(
    repo: &Repository,
    request: &SignWaiverRequest,
    policy: UnresolvedPolicy,
    signed_at: DateTime<Utc>,
) -> Result<SignedWaiverRecord, AppError> {
    if is_blank(&request.waiver_template_id) {
        return Err(AppError::invalid("waiverTemplateId", "Template is required"));
    }

    let template = repo.require_template(&request.waiver_template_id).await?;
    if !template.is_active {
        return Err(AppError::invalid(
            "waiverTemplateId",
            "Template is not active",
        ));
    }

    let defaults = repo.merge_field_defaults(&template.organization_id).await?;
    let resolution = resolve_with_policy(
        &template.content,
        &defaults,
        &request.merge_field_overrides,
        policy,
    );
    policy.enforce(&resolution)?;

    let record = build_record(request, &template, &resolution, signed_at)?;
    repo.insert_signed_waiver(&record).await?;

    if !resolution.unresolved_keys.is_empty() {
        tracing::warn!(
            signed_waiver_id = %record.id,
            unresolved = resolution.unresolved_keys.len(),
            "Signed waiver contains unresolved merge fields"
        );
    }
    tracing::info!(
        signed_waiver_id = %record.id,
        template_id = %template.id,
        version = record.template_version_used,
        guardian = record.signed_by_relationship != SignerRelationship::SelfSigner,
        "Recorded signed waiver"
    );

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use crate::models::{CreateMergeFieldRequest, CreateTemplateRequest, UpdateTemplateRequest};
    use chrono::{NaiveDate, TimeZone};
    use std::collections::HashMap;
    use tempfile::TempDir;

    const CONTENT: &str = "<p>I, <member_name>, release <academy_name> and its instructors from liability for injuries sustained while training.</p>";

    fn signed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 15, 30, 0).unwrap()
    }

    fn template(requires_guardian: bool, threshold: i64) -> WaiverTemplate {
        WaiverTemplate {
            id: "tpl-1".to_string(),
            organization_id: "org-1".to_string(),
            name: "Youth Waiver".to_string(),
            content: CONTENT.to_string(),
            description: None,
            is_active: true,
            is_default: false,
            requires_guardian,
            guardian_age_threshold: threshold,
            current_version: 2,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn resolution() -> Resolution {
        Resolution {
            resolved_content: "<p>Resolved text.</p>".to_string(),
            unresolved_keys: Vec::new(),
        }
    }

    fn request() -> SignWaiverRequest {
        SignWaiverRequest {
            waiver_template_id: "tpl-1".to_string(),
            organization_name: "Iron Fist Dojo".to_string(),
            member_id: "member-1".to_string(),
            member_first_name: "Sam".to_string(),
            member_last_name: "Doe".to_string(),
            member_email: "sam@example.com".to_string(),
            member_date_of_birth: NaiveDate::from_ymd_opt(2010, 6, 1),
            signature_asset: "data:image/png;base64,AAAA".to_string(),
            signed_by_name: "Sam Doe".to_string(),
            agreed: true,
            ..Default::default()
        }
    }

    fn fields(err: AppError) -> Vec<String> {
        err.field_errors().iter().map(|f| f.field.clone()).collect()
    }

    #[test]
    fn test_minor_without_guardian_email_rejected() {
        let mut req = request();
        req.signed_by_relationship = SignerRelationship::Parent;
        req.signed_by_name = "Pat Doe".to_string();
        let err = build_record(&req, &template(true, 16), &resolution(), signed_at()).unwrap_err();
        assert_eq!(fields(err), vec!["signedByEmail"]);
    }

    #[test]
    fn test_minor_signing_as_self_rejected() {
        let err = build_record(&request(), &template(true, 16), &resolution(), signed_at())
            .unwrap_err();
        assert_eq!(fields(err), vec!["signedByRelationship", "signedByEmail"]);
    }

    #[test]
    fn test_parent_with_email_accepted() {
        let mut req = request();
        req.signed_by_relationship = SignerRelationship::Parent;
        req.signed_by_name = "Pat Doe".to_string();
        req.signed_by_email = Some(" pat@example.com ".to_string());
        let record = build_record(&req, &template(true, 16), &resolution(), signed_at()).unwrap();
        assert_eq!(record.signed_by_relationship, SignerRelationship::Parent);
        assert_eq!(record.signed_by_email.as_deref(), Some("pat@example.com"));
        assert_eq!(record.member_age_at_signing, Some(14));
        assert_eq!(record.template_version_used, 2);
        assert_eq!(record.rendered_content, "<p>Resolved text.</p>");
        assert_eq!(record.waiver_name, "Youth Waiver");
    }

    #[test]
    fn test_adult_must_sign_as_self() {
        let mut req = request();
        req.member_date_of_birth = NaiveDate::from_ymd_opt(1990, 1, 1);
        req.signed_by_relationship = SignerRelationship::Guardian;
        req.signed_by_email = Some("g@example.com".to_string());
        let err = build_record(&req, &template(true, 16), &resolution(), signed_at()).unwrap_err();
        assert_eq!(fields(err), vec!["signedByRelationship"]);
    }

    #[test]
    fn test_unknown_birth_date_signs_as_self() {
        let mut req = request();
        req.member_date_of_birth = None;
        let record = build_record(&req, &template(true, 18), &resolution(), signed_at()).unwrap();
        assert_eq!(record.member_age_at_signing, None);
    }

    #[test]
    fn test_collects_every_missing_field() {
        let req = SignWaiverRequest {
            signed_by_name: "  ".to_string(),
            ..Default::default()
        };
        let err = build_record(&req, &template(false, 18), &resolution(), signed_at()).unwrap_err();
        assert_eq!(
            fields(err),
            vec![
                "memberId",
                "organizationName",
                "memberFirstName",
                "memberLastName",
                "memberEmail",
                "signatureAsset",
                "signedByName",
                "agreed",
            ]
        );
    }

    #[test]
    fn test_signer_name_length_limit() {
        let mut req = request();
        req.member_date_of_birth = None;
        req.signed_by_name = "n".repeat(101);
        let err = build_record(&req, &template(false, 18), &resolution(), signed_at()).unwrap_err();
        assert_eq!(fields(err), vec!["signedByName"]);

        req.signed_by_name = "n".repeat(100);
        assert!(build_record(&req, &template(false, 18), &resolution(), signed_at()).is_ok());
    }

    async fn seeded_repo(requires_guardian: bool, threshold: i64) -> (Repository, TempDir, String) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        let repo = Repository::new(pool);
        let template = repo
            .create_template(&CreateTemplateRequest {
                organization_id: "org-1".to_string(),
                name: "Youth Waiver".to_string(),
                content: CONTENT.to_string(),
                description: None,
                is_active: true,
                is_default: true,
                requires_guardian,
                guardian_age_threshold: threshold,
                actor: "owner".to_string(),
            })
            .await
            .unwrap();
        repo.create_merge_field(&CreateMergeFieldRequest {
            organization_id: "org-1".to_string(),
            key: "academy_name".to_string(),
            label: "Academy name".to_string(),
            default_value: "Iron Fist Dojo".to_string(),
            description: None,
        })
        .await
        .unwrap();
        (repo, temp_dir, template.id)
    }

    #[tokio::test]
    async fn test_guardian_scenario_end_to_end() {
        let (repo, _dir, template_id) = seeded_repo(true, 16).await;
        let mut req = request();
        req.waiver_template_id = template_id;
        req.signed_by_relationship = SignerRelationship::Parent;
        req.signed_by_name = "Pat Doe".to_string();
        req.merge_field_overrides = HashMap::from([(
            "member_name".to_string(),
            "Sam Doe".to_string(),
        )]);

        let err = sign_waiver(&repo, &req, UnresolvedPolicy::default(), signed_at())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(repo
            .list_signed_waivers_for_member("member-1")
            .await
            .unwrap()
            .is_empty());

        req.signed_by_email = Some("pat@example.com".to_string());
        let record = sign_waiver(&repo, &req, UnresolvedPolicy::default(), signed_at())
            .await
            .unwrap();
        assert_eq!(record.signed_by_relationship, SignerRelationship::Parent);
        assert_eq!(
            record.rendered_content,
            "<p>I, Sam Doe, release Iron Fist Dojo and its instructors from liability for injuries sustained while training.</p>"
        );

        let stored = repo.get_signed_waiver(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.rendered_content, record.rendered_content);
    }

    #[tokio::test]
    async fn test_template_edits_do_not_reach_signed_records() {
        let (repo, _dir, template_id) = seeded_repo(false, 18).await;
        let mut req = request();
        req.waiver_template_id = template_id.clone();
        req.member_date_of_birth = None;
        let record = sign_waiver(&repo, &req, UnresolvedPolicy::default(), signed_at())
            .await
            .unwrap();
        assert_eq!(record.template_version_used, 1);

        repo.update_template(
            &template_id,
            &UpdateTemplateRequest {
                content: Some(format!("<p>{}</p>", "Entirely new terms. ".repeat(10))),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let stored = repo.get_signed_waiver(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.rendered_content, record.rendered_content);
        assert_eq!(stored.template_version_used, 1);
        // No override for member_name, so the token stays verbatim.
        assert!(stored.rendered_content.contains("<member_name>"));
    }

    #[tokio::test]
    async fn test_reject_policy_blocks_unresolved() {
        let (repo, _dir, template_id) = seeded_repo(false, 18).await;
        let mut req = request();
        req.waiver_template_id = template_id;
        req.member_date_of_birth = None;
        let err = sign_waiver(&repo, &req, UnresolvedPolicy::Reject, signed_at())
            .await
            .unwrap_err();
        assert_eq!(fields(err), vec!["content"]);
    }

    #[tokio::test]
    async fn test_inactive_and_missing_templates() {
        let (repo, _dir, template_id) = seeded_repo(false, 18).await;
        repo.update_template(
            &template_id,
            &UpdateTemplateRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let mut req = request();
        req.waiver_template_id = template_id;
        let err = sign_waiver(&repo, &req, UnresolvedPolicy::default(), signed_at())
            .await
            .unwrap_err();
        assert_eq!(fields(err), vec!["waiverTemplateId"]);

        req.waiver_template_id = "missing".to_string();
        assert!(matches!(
            sign_waiver(&repo, &req, UnresolvedPolicy::default(), signed_at()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
