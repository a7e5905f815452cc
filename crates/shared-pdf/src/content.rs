//! Content stream builders for overlays drawn on top of existing pages.

use lopdf::content::Operation;
use lopdf::{Object, StringFormat};

use crate::coords::Rect;

/// Base-14 fonts used for annotation text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
}

impl StandardFont {
    pub fn base_font(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
        }
    }

    /// Resource name prefix, e.g. `F1`, `FB1`
    pub fn resource_prefix(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "F",
            StandardFont::HelveticaBold => "FB",
        }
    }
}

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // :;<=>?@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    278, 278, 278, 469, 556, 333, // [\]^_`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a-m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n-z
    334, 260, 334, 584, // {|}~
];

/// Approximate rendered width of `text` in points. Bold is estimated from
/// the regular metrics.
pub fn text_width(text: &str, font: StandardFont, size: f64) -> f64 {
    let units: u32 = text
        .chars()
        .map(|c| match c as u32 {
            code @ 32..=126 => HELVETICA_WIDTHS[(code - 32) as usize] as u32,
            _ => 556,
        })
        .sum();
    let scale = match font {
        StandardFont::Helvetica => 1.0,
        StandardFont::HelveticaBold => 1.06,
    };
    units as f64 * size / 1000.0 * scale
}

/// Encode for a WinAnsiEncoding simple font. Characters outside Latin-1
/// become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            code @ (0x20..=0x7E | 0xA0..=0xFF) => code as u8,
            _ => b'?',
        })
        .collect()
}

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

/// `q w 0 0 h x y cm /name Do Q`
pub fn draw_image(resource_name: &str, rect: &Rect) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                real(rect.width),
                real(0.0),
                real(0.0),
                real(rect.height),
                real(rect.x),
                real(rect.y),
            ],
        ),
        Operation::new("Do", vec![Object::Name(resource_name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ]
}

/// One line of text in a gray fill, baseline at `(x, y)`
pub fn text_line(
    font_resource: &str,
    size: f64,
    gray: f64,
    x: f64,
    y: f64,
    text: &str,
) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(font_resource.as_bytes().to_vec()), real(size)],
        ),
        Operation::new("g", vec![real(gray)]),
        Operation::new("Td", vec![real(x), real(y)]),
        Operation::new(
            "Tj",
            vec![Object::String(
                encode_win_ansi(text),
                StringFormat::Hexadecimal,
            )],
        ),
        Operation::new("ET", vec![]),
    ]
}

/// Filled and stroked rectangle
pub fn framed_rect(rect: &Rect, fill_gray: f64, stroke_gray: f64, line_width: f64) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new("g", vec![real(fill_gray)]),
        Operation::new("G", vec![real(stroke_gray)]),
        Operation::new("w", vec![real(line_width)]),
        Operation::new(
            "re",
            vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)],
        ),
        Operation::new("B", vec![]),
        Operation::new("Q", vec![]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Content;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("Café"), vec![b'C', b'a', b'f', 0xE9]);
        assert_eq!(encode_win_ansi("日本"), b"??".to_vec());
    }

    #[test]
    fn test_text_width_scales_with_size() {
        let narrow = text_width("iiii", StandardFont::Helvetica, 10.0);
        let wide = text_width("WWWW", StandardFont::Helvetica, 10.0);
        assert!(wide > narrow * 3.0);
        assert_eq!(text_width("a", StandardFont::Helvetica, 1000.0), 556.0);
    }

    #[test]
    fn test_draw_image_encodes() {
        let rect = Rect {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 50.0,
        };
        let encoded = Content {
            operations: draw_image("Im1", &rect),
        }
        .encode()
        .unwrap();
        let text = String::from_utf8(encoded).unwrap();
        assert!(text.contains("/Im1 Do"), "{}", text);
        assert!(text.contains("cm"));
    }
}
