//! Advance widths of the built-in PDF fonts used for layout.
//!
//! Values are the standard Helvetica AFM widths in 1/1000 em for printable
//! ASCII (0x20..=0x7E). Anything else measures as a digit.

/// Millimetres per PostScript point.
pub const PT_TO_MM: f32 = 25.4 / 72.0;

const FALLBACK_WIDTH: u16 = 556;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFace {
    Regular,
    Bold,
}

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

fn glyph_width(face: FontFace, c: char) -> u16 {
    let table = match face {
        FontFace::Regular => &HELVETICA,
        FontFace::Bold => &HELVETICA_BOLD,
    };
    match c {
        ' '..='~' => table[(c as usize) - 0x20],
        '\u{a0}' => table[0],
        _ => FALLBACK_WIDTH,
    }
}

/// Width of `text` in millimetres at `size_pt`.
pub fn text_width(text: &str, face: FontFace, size_pt: f32) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(glyph_width(face, c))).sum();
    units as f32 / 1000.0 * size_pt * PT_TO_MM
}
