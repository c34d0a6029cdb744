//! Page layout: turns document input into a page plan of draw operations.
//!
//! All positions are millimetres from the top-left corner of the page. The
//! plan is backend-agnostic; `pdf` replays it.

use chrono::{DateTime, Utc};
use printpdf::image_crate::{DynamicImage, GenericImageView};

use super::metrics::{text_width, FontFace, PT_TO_MM};
use super::signature::{decode_signature, SignatureImage};
use super::text::{decode_text, normalize_content, paragraphs, wrap_text};
use super::DocumentInput;
use crate::models::{MembershipDetails, SignerRelationship};

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
pub const MARGIN_MM: f32 = 20.0;
pub const CONTENT_WIDTH_MM: f32 = PAGE_WIDTH_MM - 2.0 * MARGIN_MM;
/// Space kept free above the bottom margin for the footer.
pub const LINE_RESERVE_MM: f32 = 15.0;
pub const LINE_HEIGHT_FACTOR: f32 = 1.5;
pub const PARAGRAPH_GAP_MM: f32 = 3.0;

pub const ORG_NAME_SIZE: f32 = 18.0;
pub const TITLE_SIZE: f32 = 14.0;
pub const SECTION_SIZE: f32 = 12.0;
pub const BODY_SIZE: f32 = 10.0;
pub const FOOTER_SIZE: f32 = 8.0;

pub const SIGNATURE_BOX_WIDTH_MM: f32 = 80.0;
pub const SIGNATURE_BOX_HEIGHT_MM: f32 = 30.0;
const SIGNATURE_PADDING_MM: f32 = 2.0;

pub const SIGNATURE_FALLBACK_TEXT: &str = "Signature on file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Normal,
    Muted,
}

#[derive(Debug)]
pub enum DrawOp {
    Text {
        x: f32,
        baseline: f32,
        text: String,
        face: FontFace,
        size_pt: f32,
        tone: Tone,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        thickness_pt: f32,
        tone: Tone,
    },
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        thickness_pt: f32,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        image: DynamicImage,
    },
}

#[derive(Debug, Default)]
pub struct PageLayout {
    pub ops: Vec<DrawOp>,
}

impl PageLayout {
    /// Text of every text op on the page, in draw order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn has_image(&self) -> bool {
        self.ops.iter().any(|op| matches!(op, DrawOp::Image { .. }))
    }
}

#[derive(Debug)]
pub struct DocumentLayout {
    pub pages: Vec<PageLayout>,
}

impl DocumentLayout {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().flat_map(|p| p.texts())
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.texts().any(|t| t.contains(needle))
    }
}

/// Vertical write position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutCursor {
    pub page: usize,
    pub y: f32,
}

pub fn line_height(size_pt: f32) -> f32 {
    size_pt * PT_TO_MM * LINE_HEIGHT_FACTOR
}

/// Owns the pages and the cursor for one document; nothing outlives `finish`.
pub struct LayoutBuilder {
    pages: Vec<PageLayout>,
    cursor: LayoutCursor,
}

impl Default for LayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutBuilder {
    pub fn new() -> Self {
        Self {
            pages: vec![PageLayout::default()],
            cursor: LayoutCursor {
                page: 0,
                y: MARGIN_MM,
            },
        }
    }

    fn bottom_limit() -> f32 {
        PAGE_HEIGHT_MM - MARGIN_MM - LINE_RESERVE_MM
    }

    fn new_page(&mut self) {
        self.pages.push(PageLayout::default());
        self.cursor = LayoutCursor {
            page: self.pages.len() - 1,
            y: MARGIN_MM,
        };
    }

    /// Break to a new page if `height` more would cross the usable bottom.
    fn ensure_room(&mut self, height: f32) {
        if self.cursor.y + height > Self::bottom_limit() && self.cursor.y > MARGIN_MM {
            self.new_page();
        }
    }

    fn push(&mut self, op: DrawOp) {
        self.pages[self.cursor.page].ops.push(op);
    }

    pub fn gap(&mut self, mm: f32) {
        self.cursor.y += mm;
    }

    fn text_at(&mut self, x: f32, text: &str, face: FontFace, size_pt: f32, tone: Tone) {
        let baseline = self.cursor.y + line_height(size_pt) * 0.75;
        self.push(DrawOp::Text {
            x,
            baseline,
            text: text.to_string(),
            face,
            size_pt,
            tone,
        });
    }

    /// One line of text at the left margin.
    pub fn line(&mut self, text: &str, face: FontFace, size_pt: f32, tone: Tone) {
        let height = line_height(size_pt);
        self.ensure_room(height);
        self.text_at(MARGIN_MM, text, face, size_pt, tone);
        self.cursor.y += height;
    }

    /// Wrap `text` to the content width and center each resulting line.
    pub fn centered_line(&mut self, text: &str, face: FontFace, size_pt: f32) {
        let height = line_height(size_pt);
        for line in wrap_text(text, face, size_pt, CONTENT_WIDTH_MM) {
            self.ensure_room(height);
            let width = text_width(&line, face, size_pt);
            let x = MARGIN_MM + ((CONTENT_WIDTH_MM - width) / 2.0).max(0.0);
            self.text_at(x, &line, face, size_pt, Tone::Normal);
            self.cursor.y += height;
        }
    }

    pub fn wrapped(&mut self, text: &str, face: FontFace, size_pt: f32) {
        for line in wrap_text(text, face, size_pt, CONTENT_WIDTH_MM) {
            self.line(&line, face, size_pt, Tone::Normal);
        }
    }

    pub fn paragraph(&mut self, text: &str) {
        self.wrapped(text, FontFace::Regular, BODY_SIZE);
        self.gap(PARAGRAPH_GAP_MM);
    }

    pub fn rule(&mut self) {
        self.ensure_room(PARAGRAPH_GAP_MM);
        let y = self.cursor.y + 1.0;
        self.push(DrawOp::Line {
            x1: MARGIN_MM,
            y1: y,
            x2: PAGE_WIDTH_MM - MARGIN_MM,
            y2: y,
            thickness_pt: 0.5,
            tone: Tone::Muted,
        });
        self.cursor.y += PARAGRAPH_GAP_MM;
    }

    pub fn section_heading(&mut self, title: &str) {
        self.gap(PARAGRAPH_GAP_MM);
        // Keep the heading with at least one body line.
        self.ensure_room(line_height(SECTION_SIZE) + line_height(BODY_SIZE));
        self.line(title, FontFace::Bold, SECTION_SIZE, Tone::Normal);
    }

    pub fn labeled(&mut self, label: &str, value: &str) {
        self.wrapped(&format!("{}: {}", label, value), FontFace::Regular, BODY_SIZE);
    }

    /// Label, struck-through original price in a muted tone, then the
    /// discounted price, left to right on one line.
    pub fn struck_price_line(&mut self, label: &str, original: &str, discounted: &str) {
        let size = BODY_SIZE;
        let height = line_height(size);
        self.ensure_room(height);

        let face = FontFace::Regular;
        let space = text_width(" ", face, size);
        let label_x = MARGIN_MM;
        let original_x = label_x + text_width(label, face, size) + space;
        let original_width = text_width(original, face, size);
        let discounted_x = original_x + original_width + space;
        let baseline = self.cursor.y + height * 0.75;
        let strike_y = baseline - size * PT_TO_MM * 0.3;

        self.text_at(label_x, label, face, size, Tone::Normal);
        self.text_at(original_x, original, face, size, Tone::Muted);
        self.push(DrawOp::Line {
            x1: original_x,
            y1: strike_y,
            x2: original_x + original_width,
            y2: strike_y,
            thickness_pt: 0.5,
            tone: Tone::Muted,
        });
        self.text_at(discounted_x, discounted, face, size, Tone::Normal);
        self.cursor.y += height;
    }

    /// Signature region. Embedding failures fall back to text; assets that
    /// are not embeddable leave the region empty.
    pub fn signature_block(&mut self, signature: SignatureImage) {
        self.ensure_room(SIGNATURE_BOX_HEIGHT_MM);
        let x = MARGIN_MM;
        let y = self.cursor.y;

        match signature {
            SignatureImage::Decoded(image) => {
                self.push(DrawOp::Rect {
                    x,
                    y,
                    width: SIGNATURE_BOX_WIDTH_MM,
                    height: SIGNATURE_BOX_HEIGHT_MM,
                    thickness_pt: 0.5,
                });
                let (width, height) = fit_within(
                    &image,
                    SIGNATURE_BOX_WIDTH_MM - 2.0 * SIGNATURE_PADDING_MM,
                    SIGNATURE_BOX_HEIGHT_MM - 2.0 * SIGNATURE_PADDING_MM,
                );
                self.push(DrawOp::Image {
                    x: x + (SIGNATURE_BOX_WIDTH_MM - width) / 2.0,
                    y: y + (SIGNATURE_BOX_HEIGHT_MM - height) / 2.0,
                    width,
                    height,
                    image,
                });
            }
            SignatureImage::Failed(reason) => {
                tracing::warn!("Signature image could not be embedded: {}", reason);
                self.push(DrawOp::Rect {
                    x,
                    y,
                    width: SIGNATURE_BOX_WIDTH_MM,
                    height: SIGNATURE_BOX_HEIGHT_MM,
                    thickness_pt: 0.5,
                });
                self.push(DrawOp::Text {
                    x: x + SIGNATURE_PADDING_MM * 2.0,
                    baseline: y + SIGNATURE_BOX_HEIGHT_MM / 2.0,
                    text: SIGNATURE_FALLBACK_TEXT.to_string(),
                    face: FontFace::Regular,
                    size_pt: BODY_SIZE,
                    tone: Tone::Muted,
                });
            }
            SignatureImage::NotEmbeddable => {}
        }

        self.cursor.y += SIGNATURE_BOX_HEIGHT_MM + PARAGRAPH_GAP_MM;
    }

    /// Stamp `left` and a page counter at the bottom of every page.
    pub fn stamp_footers(&mut self, left: &str) {
        let total = self.pages.len();
        let baseline = PAGE_HEIGHT_MM - MARGIN_MM + line_height(FOOTER_SIZE) * 0.75;
        for (index, page) in self.pages.iter_mut().enumerate() {
            let counter = format!("Page {} of {}", index + 1, total);
            let counter_x =
                PAGE_WIDTH_MM - MARGIN_MM - text_width(&counter, FontFace::Regular, FOOTER_SIZE);
            page.ops.push(DrawOp::Text {
                x: MARGIN_MM,
                baseline,
                text: left.to_string(),
                face: FontFace::Regular,
                size_pt: FOOTER_SIZE,
                tone: Tone::Muted,
            });
            page.ops.push(DrawOp::Text {
                x: counter_x,
                baseline,
                text: counter,
                face: FontFace::Regular,
                size_pt: FOOTER_SIZE,
                tone: Tone::Muted,
            });
        }
    }

    pub fn finish(self) -> DocumentLayout {
        DocumentLayout { pages: self.pages }
    }
}

fn fit_within(image: &DynamicImage, max_width: f32, max_height: f32) -> (f32, f32) {
    let (px_w, px_h) = image.dimensions();
    let aspect = px_w as f32 / px_h.max(1) as f32;
    if max_width / aspect <= max_height {
        (max_width, max_width / aspect)
    } else {
        (max_height * aspect, max_height)
    }
}

/// `$12.34` from integer cents.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}

fn membership_section(builder: &mut LayoutBuilder, membership: &MembershipDetails) {
    builder.section_heading("Membership Details");
    builder.labeled("Plan", &membership.plan_name);
    if membership.is_trial {
        let trial = match membership.trial_days {
            Some(days) => format!("Yes ({} days)", days),
            None => "Yes".to_string(),
        };
        builder.labeled("Trial", &trial);
    }

    let period = membership
        .billing_period
        .as_deref()
        .map(|p| format!("/{}", p))
        .unwrap_or_default();
    let price_text = |cents: i64| {
        if cents <= 0 {
            "Free".to_string()
        } else {
            format!("{}{}", format_cents(cents), period)
        }
    };

    match membership.discounted_price_cents {
        Some(discounted) if membership.price_cents > 0 => {
            builder.struck_price_line(
                "Price:",
                &format_cents(membership.price_cents),
                &price_text(discounted),
            );
        }
        discounted => {
            let effective = discounted.unwrap_or(membership.price_cents);
            builder.labeled("Price", &price_text(effective));
        }
    }

    if let Some(schedule) = &membership.payment_schedule {
        builder.labeled("Payment Schedule", schedule);
    }
    if let Some(months) = membership.contract_length_months {
        let unit = if months == 1 { "month" } else { "months" };
        builder.labeled("Contract Length", &format!("{} {}", months, unit));
    }
    if let Some(fee) = membership.signup_fee_cents.filter(|f| *f > 0) {
        builder.labeled("Signup Fee", &format_cents(fee));
    }
}

/// Lay out a complete waiver document.
pub fn layout_document(input: &DocumentInput, generated_at: DateTime<Utc>) -> DocumentLayout {
    let mut builder = LayoutBuilder::new();

    builder.centered_line(&input.organization_name, FontFace::Bold, ORG_NAME_SIZE);
    builder.centered_line(&input.waiver_name, FontFace::Bold, TITLE_SIZE);
    builder.gap(PARAGRAPH_GAP_MM);
    builder.rule();

    builder.section_heading("Member Information");
    builder.labeled(
        "Name",
        &format!("{} {}", input.member_first_name, input.member_last_name),
    );
    builder.labeled("Email", &input.member_email);

    if let Some(membership) = &input.membership {
        membership_section(&mut builder, membership);
    }

    builder.gap(PARAGRAPH_GAP_MM);
    builder.rule();
    let normalized = normalize_content(&input.content);
    for paragraph in paragraphs(&normalized) {
        builder.paragraph(&decode_text(paragraph));
    }
    builder.rule();

    builder.section_heading("Signature");
    builder.labeled("Signed by", &input.signed_by_name);
    if input.signed_by_relationship != SignerRelationship::SelfSigner {
        builder.labeled("Relationship", input.signed_by_relationship.label());
    }
    builder.labeled(
        "Date Signed",
        &input.signed_at.format("%B %-d, %Y %H:%M UTC").to_string(),
    );
    if let Some(ip) = &input.ip_address {
        builder.labeled("IP Address", ip);
    }
    builder.gap(PARAGRAPH_GAP_MM);
    builder.signature_block(decode_signature(&input.signature_asset));

    builder.stamp_footers(&format!(
        "Template version {} | Generated {}",
        input.template_version,
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    builder.finish()
}
