//! Signed waiver record model.
//!
//! A signed record is write-once: it freezes the exact text the signer saw,
//! so later template edits never reach it.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Who put their name to the waiver, relative to the member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerRelationship {
    #[default]
    #[serde(rename = "self")]
    SelfSigner,
    Parent,
    Guardian,
    LegalGuardian,
}

impl SignerRelationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerRelationship::SelfSigner => "self",
            SignerRelationship::Parent => "parent",
            SignerRelationship::Guardian => "guardian",
            SignerRelationship::LegalGuardian => "legal_guardian",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "self" => Some(SignerRelationship::SelfSigner),
            "parent" => Some(SignerRelationship::Parent),
            "guardian" => Some(SignerRelationship::Guardian),
            "legal_guardian" => Some(SignerRelationship::LegalGuardian),
            _ => None,
        }
    }

    /// Human-readable label used on the rendered document.
    pub fn label(&self) -> &'static str {
        match self {
            SignerRelationship::SelfSigner => "Self",
            SignerRelationship::Parent => "Parent",
            SignerRelationship::Guardian => "Guardian",
            SignerRelationship::LegalGuardian => "Legal Guardian",
        }
    }
}

/// Membership plan terms shown on the waiver, as agreed at signing.
///
/// Money is in integer cents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipDetails {
    pub plan_name: String,
    #[serde(default)]
    pub is_trial: bool,
    #[serde(default)]
    pub trial_days: Option<u32>,
    pub price_cents: i64,
    /// e.g. "month"; printed as "/month" after the price
    #[serde(default)]
    pub billing_period: Option<String>,
    #[serde(default)]
    pub payment_schedule: Option<String>,
    #[serde(default)]
    pub contract_length_months: Option<u32>,
    #[serde(default)]
    pub signup_fee_cents: Option<i64>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    /// Price after the coupon; present only when a coupon applies
    #[serde(default)]
    pub discounted_price_cents: Option<i64>,
}

/// The immutable record of a completed signing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedWaiverRecord {
    pub id: String,
    pub waiver_template_id: String,
    pub template_version_used: i64,
    pub organization_name: String,
    pub waiver_name: String,
    pub member_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_membership_id: Option<String>,
    pub signature_asset: String,
    pub signed_by_name: String,
    pub signed_by_relationship: SignerRelationship,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_by_email: Option<String>,
    pub member_first_name: String,
    pub member_last_name: String,
    pub member_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_age_at_signing: Option<i64>,
    /// The fully resolved text shown to the signer, verbatim
    pub rendered_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership: Option<MembershipDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub signed_at: DateTime<Utc>,
}

/// Request body for signing a waiver.
///
/// Everything defaults so that missing fields surface as validation errors
/// rather than parse failures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignWaiverRequest {
    pub waiver_template_id: String,
    pub organization_name: String,
    pub member_id: String,
    pub member_membership_id: Option<String>,
    pub member_first_name: String,
    pub member_last_name: String,
    pub member_email: String,
    pub member_date_of_birth: Option<NaiveDate>,
    /// `data:image/...;base64,` signature capture
    pub signature_asset: String,
    pub signed_by_name: String,
    pub signed_by_relationship: SignerRelationship,
    /// Guardian contact email; required when a guardian signs
    pub signed_by_email: Option<String>,
    pub agreed: bool,
    pub merge_field_overrides: HashMap<String, String>,
    pub membership: Option<MembershipDetails>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_wire_names() {
        let json = serde_json::to_string(&SignerRelationship::SelfSigner).unwrap();
        assert_eq!(json, "\"self\"");
        let parsed: SignerRelationship = serde_json::from_str("\"legal_guardian\"").unwrap();
        assert_eq!(parsed, SignerRelationship::LegalGuardian);
        for r in [
            SignerRelationship::SelfSigner,
            SignerRelationship::Parent,
            SignerRelationship::Guardian,
            SignerRelationship::LegalGuardian,
        ] {
            assert_eq!(SignerRelationship::parse(r.as_str()), Some(r));
        }
    }

    #[test]
    fn test_sign_request_defaults_missing_fields() {
        let request: SignWaiverRequest =
            serde_json::from_str(r#"{"waiverTemplateId": "t-1"}"#).unwrap();
        assert_eq!(request.waiver_template_id, "t-1");
        assert!(!request.agreed);
        assert!(request.signature_asset.is_empty());
        assert_eq!(request.signed_by_relationship, SignerRelationship::SelfSigner);
    }
}
