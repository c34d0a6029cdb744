//! Signature asset decoding.
//!
//! Only `data:image/{png,jpeg,jpg};base64,` assets are embedded. Anything
//! else is skipped without an attempt.

use base64::{engine::general_purpose::STANDARD, Engine};
use printpdf::image_crate::{self, DynamicImage, GenericImageView, RgbImage};

const EMBEDDABLE_PREFIXES: &[&str] = &[
    "data:image/png;base64,",
    "data:image/jpeg;base64,",
    "data:image/jpg;base64,",
];

/// What the renderer can do with a signature asset.
#[derive(Debug)]
pub enum SignatureImage {
    /// Not an embeddable data URL; no embedding is attempted.
    NotEmbeddable,
    /// Decoded and flattened onto white, ready to place.
    Decoded(DynamicImage),
    /// Looked embeddable but could not be decoded.
    Failed(String),
}

/// True if the asset carries a recognized embedded-image prefix.
pub fn is_embeddable(asset: &str) -> bool {
    payload(asset).is_some()
}

fn payload(asset: &str) -> Option<&str> {
    EMBEDDABLE_PREFIXES
        .iter()
        .find_map(|prefix| asset.strip_prefix(prefix))
}

pub fn decode_signature(asset: &str) -> SignatureImage {
    let Some(encoded) = payload(asset) else {
        return SignatureImage::NotEmbeddable;
    };

    let bytes = match STANDARD.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(e) => return SignatureImage::Failed(format!("invalid base64: {}", e)),
    };

    match image_crate::load_from_memory(&bytes) {
        Ok(image) if image.width() > 0 && image.height() > 0 => {
            SignatureImage::Decoded(flatten_on_white(&image))
        }
        Ok(_) => SignatureImage::Failed("image has no pixels".to_string()),
        Err(e) => SignatureImage::Failed(format!("undecodable image: {}", e)),
    }
}

// Signature pads emit transparent PNGs; the PDF image has no alpha channel.
fn flatten_on_white(image: &DynamicImage) -> DynamicImage {
    let rgba = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        rgb.put_pixel(x, y, image_crate::Rgb([blend(r), blend(g), blend(b)]));
    }
    DynamicImage::ImageRgb8(rgb)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use printpdf::image_crate::{ImageOutputFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    /// A small transparent PNG with a dark stroke, as a data URL.
    pub(crate) fn png_data_url() -> String {
        let mut image = RgbaImage::from_pixel(40, 12, Rgba([0, 0, 0, 0]));
        for x in 2..38 {
            image.put_pixel(x, 6, Rgba([10, 10, 40, 255]));
        }
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(bytes))
    }

    #[test]
    fn test_plain_text_is_not_embeddable() {
        assert!(!is_embeddable("John Smith"));
        assert!(matches!(
            decode_signature("John Smith"),
            SignatureImage::NotEmbeddable
        ));
        assert!(matches!(
            decode_signature("data:image/svg+xml;base64,PHN2Zz4="),
            SignatureImage::NotEmbeddable
        ));
    }

    #[test]
    fn test_malformed_payload_fails() {
        assert!(matches!(
            decode_signature("data:image/png;base64,!!!not-base64!!!"),
            SignatureImage::Failed(_)
        ));
        let not_png = format!("data:image/png;base64,{}", STANDARD.encode(b"hello"));
        assert!(matches!(decode_signature(&not_png), SignatureImage::Failed(_)));
    }

    #[test]
    fn test_valid_png_decodes_flattened() {
        match decode_signature(&png_data_url()) {
            SignatureImage::Decoded(image) => {
                assert_eq!((image.width(), image.height()), (40, 12));
                let rgb = image.to_rgb8();
                // Transparent background becomes white.
                assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
                assert_eq!(rgb.get_pixel(10, 6).0, [10, 10, 40]);
            }
            other => panic!("expected decoded image, got {:?}", other),
        }
    }
}
