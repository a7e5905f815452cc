//! Shared PDF handling utilities
//!
//! Page geometry and the browser-to-PDF coordinate transform, signature
//! image decoding, and helpers for drawing overlays onto existing pages.

pub mod content;
pub mod coords;
pub mod error;
pub mod image;
pub mod parser;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use content::StandardFont;
pub use coords::{clamp_to_page, fits_within, percent_to_pdf, PageBox, Rect};
pub use error::PdfError;
pub use image::{ImageDecodeError, ImageFormat, SignatureImage};
pub use parser::{DocumentInfo, PdfDocument};
