//! Waiver document rendering.
//!
//! Rendering is a pure, synchronous function of its input: content, member
//! and signer metadata, and the signature asset. Line breaks, page breaks and
//! section placement are deterministic; only the footer's generation
//! timestamp varies between runs.

pub mod layout;
pub mod metrics;
pub mod pdf;
pub mod signature;
pub mod text;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{MembershipDetails, SignedWaiverRecord, SignerRelationship};

pub use layout::{layout_document, DocumentLayout};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Everything the renderer needs; nothing is read from live tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInput {
    pub organization_name: String,
    pub waiver_name: String,
    pub template_version: i64,
    /// Resolved waiver text (markup allowed)
    pub content: String,
    pub member_first_name: String,
    pub member_last_name: String,
    pub member_email: String,
    #[serde(default)]
    pub signature_asset: String,
    pub signed_by_name: String,
    #[serde(default)]
    pub signed_by_relationship: SignerRelationship,
    pub signed_at: DateTime<Utc>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub membership: Option<MembershipDetails>,
}

impl DocumentInput {
    /// Input reproduced entirely from a frozen signing record.
    pub fn from_record(record: &SignedWaiverRecord) -> Self {
        Self {
            organization_name: record.organization_name.clone(),
            waiver_name: record.waiver_name.clone(),
            template_version: record.template_version_used,
            content: record.rendered_content.clone(),
            member_first_name: record.member_first_name.clone(),
            member_last_name: record.member_last_name.clone(),
            member_email: record.member_email.clone(),
            signature_asset: record.signature_asset.clone(),
            signed_by_name: record.signed_by_name.clone(),
            signed_by_relationship: record.signed_by_relationship,
            signed_at: record.signed_at,
            ip_address: record.ip_address.clone(),
            membership: record.membership.clone(),
        }
    }
}

/// A rendered document. Not persisted; regenerate on demand.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub page_count: usize,
}

/// A rendered document packaged for a file download.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
}

/// `waiver_<last>_<first>_<YYYY-MM-DD>.pdf`, whitespace runs collapsed to `_`.
pub fn filename(last_name: &str, first_name: &str, signed_on: NaiveDate) -> String {
    let part = |s: &str| s.split_whitespace().collect::<Vec<_>>().join("_");
    format!(
        "waiver_{}_{}_{}.pdf",
        part(last_name),
        part(first_name),
        signed_on.format("%Y-%m-%d")
    )
}

pub fn render(input: &DocumentInput) -> Result<RenderedDocument, AppError> {
    render_at(input, Utc::now())
}

/// Render with an explicit generation timestamp.
pub fn render_at(
    input: &DocumentInput,
    generated_at: DateTime<Utc>,
) -> Result<RenderedDocument, AppError> {
    let layout = layout_document(input, generated_at);
    let page_count = layout.page_count();
    let title = format!("{} - {}", input.organization_name, input.waiver_name);
    let bytes = pdf::write_pdf(&layout, &title)?;

    tracing::debug!(pages = page_count, bytes = bytes.len(), "Rendered waiver document");

    Ok(RenderedDocument {
        bytes,
        filename: filename(
            &input.member_last_name,
            &input.member_first_name,
            input.signed_at.date_naive(),
        ),
        page_count,
    })
}

/// Render and package for download.
pub fn render_for_download(input: &DocumentInput) -> Result<Download, AppError> {
    let document = render(input)?;
    Ok(Download {
        bytes: document.bytes,
        filename: document.filename,
        content_type: PDF_CONTENT_TYPE,
    })
}
