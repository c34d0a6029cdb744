//! PDF backend: replays a page plan through printpdf.

use printpdf::image_crate::GenericImageView;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfLayerReference, Point, Rgb,
};

use super::layout::{DocumentLayout, DrawOp, Tone, PAGE_HEIGHT_MM, PAGE_WIDTH_MM};
use super::metrics::FontFace;
use crate::errors::AppError;

const IMAGE_DPI: f32 = 300.0;
const LAYER_NAME: &str = "Waiver";

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl Fonts {
    fn get(&self, face: FontFace) -> &IndirectFontRef {
        match face {
            FontFace::Regular => &self.regular,
            FontFace::Bold => &self.bold,
        }
    }
}

fn color(tone: Tone) -> Color {
    match tone {
        Tone::Normal => Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)),
        Tone::Muted => Color::Rgb(Rgb::new(0.55, 0.55, 0.55, None)),
    }
}

// Layout measures from the top edge; PDF user space starts at the bottom.
fn point(x: f32, y_from_top: f32) -> Point {
    Point::new(Mm(x), Mm(PAGE_HEIGHT_MM - y_from_top))
}

/// Serialize a page plan into PDF bytes.
pub fn write_pdf(layout: &DocumentLayout, title: &str) -> Result<Vec<u8>, AppError> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER_NAME);
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold)?,
    };

    let mut first = Some((first_page, first_layer));
    for page in &layout.pages {
        let (page_index, layer_index) = match first.take() {
            Some(indices) => indices,
            None => doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER_NAME),
        };
        let layer = doc.get_page(page_index).get_layer(layer_index);
        for op in &page.ops {
            draw(&layer, &fonts, op);
        }
    }

    Ok(doc.save_to_bytes()?)
}

fn draw(layer: &PdfLayerReference, fonts: &Fonts, op: &DrawOp) {
    match op {
        DrawOp::Text {
            x,
            baseline,
            text,
            face,
            size_pt,
            tone,
        } => {
            layer.set_fill_color(color(*tone));
            layer.use_text(
                text.clone(),
                *size_pt,
                Mm(*x),
                Mm(PAGE_HEIGHT_MM - baseline),
                fonts.get(*face),
            );
        }
        DrawOp::Line {
            x1,
            y1,
            x2,
            y2,
            thickness_pt,
            tone,
        } => {
            layer.set_outline_color(color(*tone));
            layer.set_outline_thickness(*thickness_pt);
            layer.add_line(Line {
                points: vec![(point(*x1, *y1), false), (point(*x2, *y2), false)],
                is_closed: false,
            });
        }
        DrawOp::Rect {
            x,
            y,
            width,
            height,
            thickness_pt,
        } => {
            layer.set_outline_color(color(Tone::Muted));
            layer.set_outline_thickness(*thickness_pt);
            layer.add_line(Line {
                points: vec![
                    (point(*x, *y), false),
                    (point(x + width, *y), false),
                    (point(x + width, y + height), false),
                    (point(*x, y + height), false),
                ],
                is_closed: true,
            });
        }
        DrawOp::Image {
            x,
            y,
            width,
            height,
            image,
        } => {
            let native_width = image.width() as f32 * 25.4 / IMAGE_DPI;
            let native_height = image.height() as f32 * 25.4 / IMAGE_DPI;
            Image::from_dynamic_image(image).add_to_layer(
                layer.clone(),
                ImageTransform {
                    translate_x: Some(Mm(*x)),
                    translate_y: Some(Mm(PAGE_HEIGHT_MM - y - height)),
                    scale_x: Some(width / native_width),
                    scale_y: Some(height / native_height),
                    dpi: Some(IMAGE_DPI),
                    ..Default::default()
                },
            );
        }
    }
}
