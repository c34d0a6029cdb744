//! Guardian signature policy derived from member age.

use chrono::{Datelike, NaiveDate};

use crate::models::SignerRelationship;

/// Lowest guardian age threshold a template may carry.
pub const MIN_GUARDIAN_AGE_THRESHOLD: i64 = 13;
/// Highest guardian age threshold a template may carry.
pub const MAX_GUARDIAN_AGE_THRESHOLD: i64 = 21;

/// The guardian settings of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardianPolicy {
    pub requires_guardian: bool,
    pub guardian_age_threshold: i64,
}

/// Calendar age on `as_of`; birthdays count from the day itself.
pub fn age_on(date_of_birth: NaiveDate, as_of: NaiveDate) -> i64 {
    let mut age = i64::from(as_of.year()) - i64::from(date_of_birth.year());
    if (as_of.month(), as_of.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age
}

/// Whether a guardian must countersign for this member.
///
/// An unknown date of birth is treated as able to self-sign.
pub fn requires_guardian(
    policy: GuardianPolicy,
    member_date_of_birth: Option<NaiveDate>,
    as_of: NaiveDate,
) -> bool {
    if !policy.requires_guardian {
        return false;
    }
    match member_date_of_birth {
        Some(dob) => age_on(dob, as_of) < policy.guardian_age_threshold,
        None => false,
    }
}

/// Relationships permitted for the signer given the guardian outcome.
pub fn allowed_relationships(guardian_required: bool) -> &'static [SignerRelationship] {
    if guardian_required {
        &[
            SignerRelationship::Parent,
            SignerRelationship::Guardian,
            SignerRelationship::LegalGuardian,
        ]
    } else {
        &[SignerRelationship::SelfSigner]
    }
}
