//! Generated documents and images for tests.
//!
//! Enabled by the `fixtures` feature; dependent crates turn it on from
//! `[dev-dependencies]` only.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::coords::PageBox;

/// An N-page document. MediaBox and a Helvetica `/F1` font live on the
/// page tree root, so every page inherits them. Each page shows `Page N`.
pub fn blank_document(pages: u32, size: PageBox) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids: Vec<Object> = Vec::new();
    for n in 1..=pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {}", n))]),
                Operation::new("ET", vec![]),
            ],
        };
        let encoded = content.encode().expect("fixture content encodes");
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "MediaBox" => vec![
                Object::Real(size.x as f32),
                Object::Real(size.y as f32),
                Object::Real(size.right() as f32),
                Object::Real(size.top() as f32),
            ],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("fixture document saves");
    buffer
}

/// RGBA PNG: transparent background with an opaque diagonal stroke
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let distance = (x as i64 * height as i64 - y as i64 * width as i64).abs();
            if distance <= width.max(height) as i64 {
                pixels.extend_from_slice(&[20, 20, 80, 255]);
            } else {
                pixels.extend_from_slice(&[255, 255, 255, 0]);
            }
        }
    }

    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().expect("png header");
    writer.write_image_data(&pixels).expect("png data");
    writer.finish().expect("png finish");
    out
}

pub fn png_data_url(width: u32, height: u32) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png_bytes(width, height)))
}

/// Just enough JPEG for header parsing: SOI, a baseline 3-component
/// frame header, EOI. Not renderable.
pub fn minimal_jpeg(width: u16, height: u16) -> Vec<u8> {
    let [h_hi, h_lo] = height.to_be_bytes();
    let [w_hi, w_lo] = width.to_be_bytes();
    vec![
        0xFF, 0xD8, // SOI
        0xFF, 0xC0, 0x00, 0x11, 0x08, h_hi, h_lo, w_hi, w_lo, 0x03, //
        0x01, 0x11, 0x00, //
        0x02, 0x11, 0x01, //
        0x03, 0x11, 0x01, //
        0xFF, 0xD9, // EOI
    ]
}

pub fn jpeg_data_url(width: u16, height: u16) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(minimal_jpeg(width, height)))
}
