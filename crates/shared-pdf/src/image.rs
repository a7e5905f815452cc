//! Signature image decoding and embedding as PDF image XObjects.
//!
//! PNG payloads are decoded and re-encoded as Flate streams, with any alpha
//! channel split into a soft mask. JPEG payloads are embedded unchanged with
//! the DCTDecode filter; only their header is parsed.

use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use jpeg_decoder::PixelFormat;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

#[derive(Debug, Error)]
pub enum ImageDecodeError {
    #[error("Invalid base64 image payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Unsupported image format (expected PNG or JPEG)")]
    UnsupportedFormat,

    #[error("Failed to decode PNG: {0}")]
    Png(#[from] png::DecodingError),

    #[error("Failed to decode JPEG: {0}")]
    Jpeg(#[from] jpeg_decoder::Error),

    #[error("Unsupported pixel layout: {0}")]
    UnsupportedPixels(String),

    #[error("Image has zero width or height")]
    Empty,

    #[error("Failed to compress image data: {0}")]
    Compress(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Identify the format from the payload's magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(PNG_MAGIC) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(JPEG_MAGIC) {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
enum Pixels {
    Dct {
        data: Vec<u8>,
        color_space: &'static str,
        cmyk: bool,
    },
    Flate {
        color: Vec<u8>,
        color_space: &'static str,
        alpha: Option<Vec<u8>>,
    },
}

/// A decoded signature, ready to embed
#[derive(Debug, Clone)]
pub struct SignatureImage {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pixels: Pixels,
}

impl SignatureImage {
    /// Accepts `data:image/...;base64,<payload>` or a bare base64 payload.
    pub fn from_data_url(data_url: &str) -> Result<Self, ImageDecodeError> {
        let payload = match data_url.trim().strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map(|(_, p)| p).unwrap_or(rest),
            None => data_url,
        };
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD.decode(cleaned.as_bytes())?;
        Self::decode(&bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ImageDecodeError> {
        match ImageFormat::sniff(bytes) {
            Some(ImageFormat::Png) => decode_png(bytes),
            Some(ImageFormat::Jpeg) => decode_jpeg(bytes),
            None => Err(ImageDecodeError::UnsupportedFormat),
        }
    }

    /// Pixel width over pixel height
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self.pixels, Pixels::Flate { alpha: Some(_), .. })
    }

    /// Add the image (and its soft mask, if any) to `doc`.
    pub fn embed(&self, doc: &mut Document) -> ObjectId {
        let width = self.width as i64;
        let height = self.height as i64;

        match &self.pixels {
            Pixels::Dct {
                data,
                color_space,
                cmyk,
            } => {
                let mut dict = dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "ColorSpace" => *color_space,
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                };
                if *cmyk {
                    // Adobe CMYK JPEGs are stored inverted
                    dict.set(
                        "Decode",
                        Object::Array(
                            [1, 0, 1, 0, 1, 0, 1, 0]
                                .iter()
                                .map(|v| Object::Integer(*v))
                                .collect(),
                        ),
                    );
                }
                doc.add_object(Stream::new(dict, data.clone()).with_compression(false))
            }
            Pixels::Flate {
                color,
                color_space,
                alpha,
            } => {
                let mut dict = dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "ColorSpace" => *color_space,
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                };
                if let Some(alpha) = alpha {
                    let smask = doc.add_object(
                        Stream::new(
                            dictionary! {
                                "Type" => "XObject",
                                "Subtype" => "Image",
                                "Width" => width,
                                "Height" => height,
                                "ColorSpace" => "DeviceGray",
                                "BitsPerComponent" => 8,
                                "Filter" => "FlateDecode",
                            },
                            alpha.clone(),
                        )
                        .with_compression(false),
                    );
                    dict.set("SMask", Object::Reference(smask));
                }
                doc.add_object(Stream::new(dict, color.clone()).with_compression(false))
            }
        }
    }
}

fn decode_png(bytes: &[u8]) -> Result<SignatureImage, ImageDecodeError> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info()?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf)?;
    let data = &buf[..frame.buffer_size()];

    if frame.width == 0 || frame.height == 0 {
        return Err(ImageDecodeError::Empty);
    }
    if frame.bit_depth != png::BitDepth::Eight {
        return Err(ImageDecodeError::UnsupportedPixels(format!(
            "{:?} bit PNG",
            frame.bit_depth
        )));
    }

    let (channels, color_space, has_alpha) = match frame.color_type {
        png::ColorType::Rgb => (3, "DeviceRGB", false),
        png::ColorType::Rgba => (3, "DeviceRGB", true),
        png::ColorType::Grayscale => (1, "DeviceGray", false),
        png::ColorType::GrayscaleAlpha => (1, "DeviceGray", true),
        other => {
            return Err(ImageDecodeError::UnsupportedPixels(format!(
                "{:?} PNG",
                other
            )))
        }
    };

    let (color, alpha) = if has_alpha {
        let stride = channels + 1;
        let pixel_count = data.len() / stride;
        let mut color = Vec::with_capacity(pixel_count * channels);
        let mut alpha = Vec::with_capacity(pixel_count);
        for px in data.chunks_exact(stride) {
            color.extend_from_slice(&px[..channels]);
            alpha.push(px[channels]);
        }
        (color, Some(alpha))
    } else {
        (data.to_vec(), None)
    };

    // A fully opaque mask adds nothing
    let alpha = alpha.filter(|a| a.iter().any(|v| *v != u8::MAX));

    Ok(SignatureImage {
        width: frame.width,
        height: frame.height,
        format: ImageFormat::Png,
        pixels: Pixels::Flate {
            color: zlib(&color)?,
            color_space,
            alpha: alpha.map(|a| zlib(&a)).transpose()?,
        },
    })
}

fn decode_jpeg(bytes: &[u8]) -> Result<SignatureImage, ImageDecodeError> {
    let mut decoder = jpeg_decoder::Decoder::new(bytes);
    decoder.read_info()?;
    let info = decoder
        .info()
        .ok_or_else(|| ImageDecodeError::UnsupportedPixels("JPEG without frame header".into()))?;

    if info.width == 0 || info.height == 0 {
        return Err(ImageDecodeError::Empty);
    }
    let (color_space, cmyk) = match info.pixel_format {
        PixelFormat::L8 => ("DeviceGray", false),
        PixelFormat::RGB24 => ("DeviceRGB", false),
        PixelFormat::CMYK32 => ("DeviceCMYK", true),
        other => {
            return Err(ImageDecodeError::UnsupportedPixels(format!(
                "{:?} JPEG",
                other
            )))
        }
    };

    Ok(SignatureImage {
        width: info.width as u32,
        height: info.height as u32,
        format: ImageFormat::Jpeg,
        pixels: Pixels::Dct {
            data: bytes.to_vec(),
            color_space,
            cmyk,
        },
    })
}

fn zlib(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
