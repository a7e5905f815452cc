//! Draws signature images, with their timestamp and signer annotations,
//! onto the pages of an existing PDF.

use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::Utc;
use shared_pdf::content::{draw_image, text_line};
use shared_pdf::{
    clamp_to_page, fits_within, percent_to_pdf, DocumentInfo, PdfDocument, Rect, SignatureImage,
    StandardFont,
};
use shared_types::SignatureField;
use tracing::{debug, info};

use crate::error::SigningError;

/// Font size of the annotation lines under each signature
const ANNOTATION_SIZE: f64 = 8.0;
const ANNOTATION_GRAY: f64 = 0.4;
const TIMESTAMP_OFFSET: f64 = 15.0;
const SIGNER_OFFSET: f64 = 25.0;

pub const DEFAULT_PRODUCT_NAME: &str = "DocSign";

/// What to do with a signature box that extends past the page edge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoundsMode {
    /// Draw it where it was placed
    #[default]
    Permissive,
    /// Shift and shrink it onto the page
    Clamp,
    /// Fail the request
    Reject,
}

impl FromStr for BoundsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(BoundsMode::Permissive),
            "clamp" => Ok(BoundsMode::Clamp),
            "reject" => Ok(BoundsMode::Reject),
            other => Err(format!(
                "unknown bounds mode '{}' (expected permissive, clamp or reject)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompositorOptions {
    pub bounds: BoundsMode,
    pub budget_base: Duration,
    pub budget_per_op: Duration,
    /// Written into the Author and Producer metadata
    pub product_name: String,
}

impl Default for CompositorOptions {
    fn default() -> Self {
        Self {
            bounds: BoundsMode::Permissive,
            budget_base: Duration::from_secs(2),
            budget_per_op: Duration::from_millis(250),
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
        }
    }
}

impl CompositorOptions {
    /// `base + per_op × pages × max(signatures, 1)`
    pub fn budget_for(&self, pages: usize, signatures: usize) -> Duration {
        let ops = pages.saturating_mul(signatures.max(1));
        let ops = u32::try_from(ops).unwrap_or(u32::MAX);
        self.budget_base
            .saturating_add(self.budget_per_op.saturating_mul(ops))
    }
}

/// A signature that passed validation, with its decoded image and final box
struct Placement<'a> {
    field: &'a SignatureField,
    image: SignatureImage,
    rect: Rect,
}

#[derive(Debug, Clone, Default)]
pub struct SignatureCompositor {
    options: CompositorOptions,
}

impl SignatureCompositor {
    pub fn new(options: CompositorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompositorOptions {
        &self.options
    }

    /// Composite `signatures` onto `pdf` and return the new document bytes.
    pub fn compose(
        &self,
        pdf: &[u8],
        signatures: &[SignatureField],
        document_name: &str,
    ) -> Result<Vec<u8>, SigningError> {
        let mut doc = open(pdf)?;
        self.compose_into(&mut doc, signatures, document_name)?;
        Ok(doc.save_to_bytes()?)
    }

    /// Composite onto an already parsed document.
    ///
    /// Every field is validated and every image decoded before the first
    /// page is touched. On error the document may be partially modified and
    /// must be discarded.
    pub fn compose_into(
        &self,
        doc: &mut PdfDocument,
        signatures: &[SignatureField],
        document_name: &str,
    ) -> Result<(), SigningError> {
        let started = Instant::now();
        let page_count = doc.page_count();
        if page_count == 0 {
            return Err(SigningError::InvalidPdf("document has no pages".into()));
        }
        let budget = self.options.budget_for(page_count, signatures.len());

        for (index, field) in signatures.iter().enumerate() {
            check_field(index, field, page_count)?;
        }
        let placements = self.place(doc, signatures)?;

        doc.set_info(&DocumentInfo {
            title: format!("Signed: {}", document_name),
            author: self.options.product_name.clone(),
            subject: "Signed Document".to_string(),
            keywords: vec![
                "signed".to_string(),
                "document".to_string(),
                self.options.product_name.to_lowercase(),
            ],
            producer: self.options.product_name.clone(),
            modified_at: Utc::now(),
        });

        for placement in &placements {
            draw_placement(doc, placement)?;
            if started.elapsed() > budget {
                return Err(SigningError::BudgetExceeded {
                    budget_ms: budget.as_millis(),
                });
            }
        }

        info!(
            signatures = placements.len(),
            pages = page_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Composited signatures"
        );
        Ok(())
    }

    fn place<'a>(
        &self,
        doc: &PdfDocument,
        signatures: &'a [SignatureField],
    ) -> Result<Vec<Placement<'a>>, SigningError> {
        let mut placements = Vec::with_capacity(signatures.len());
        for (index, field) in signatures.iter().enumerate() {
            let image = SignatureImage::from_data_url(&field.image_data_url)
                .map_err(|source| SigningError::ImageDecode { index, source })?;
            let page_box = doc.page_box(field.page)?;
            let mut rect = percent_to_pdf(
                &page_box,
                field.x_percent,
                field.y_percent,
                field.width_percent,
                image.aspect_ratio(),
            );

            if !fits_within(&rect, &page_box) {
                match self.options.bounds {
                    BoundsMode::Permissive => {
                        debug!(index, page = field.page, "Signature extends past page edge");
                    }
                    BoundsMode::Clamp => rect = clamp_to_page(&rect, &page_box),
                    BoundsMode::Reject => {
                        return Err(SigningError::OutOfBounds {
                            index,
                            page: field.page,
                        })
                    }
                }
            }

            placements.push(Placement { field, image, rect });
        }
        Ok(placements)
    }
}

pub(crate) fn open(pdf: &[u8]) -> Result<PdfDocument, SigningError> {
    PdfDocument::from_bytes(pdf).map_err(|e| SigningError::InvalidPdf(e.to_string()))
}

fn check_field(index: usize, field: &SignatureField, page_count: usize) -> Result<(), SigningError> {
    if field.page == 0 || field.page as usize > page_count {
        return Err(SigningError::PageOutOfRange {
            index,
            page: field.page,
            page_count,
        });
    }

    let percentages = [
        ("xPercent", field.x_percent),
        ("yPercent", field.y_percent),
        ("widthPercent", field.width_percent),
    ];
    for (name, value) in percentages {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(SigningError::InvalidField {
                index,
                reason: format!("{} must be between 0 and 100, got {}", name, value),
            });
        }
    }
    if field.width_percent == 0.0 {
        return Err(SigningError::InvalidField {
            index,
            reason: "widthPercent must be greater than 0".into(),
        });
    }
    Ok(())
}

fn draw_placement(doc: &mut PdfDocument, placement: &Placement<'_>) -> Result<(), SigningError> {
    let field = placement.field;
    let rect = &placement.rect;
    let page_id = doc.page_id(field.page)?;

    let image_id = doc.add_image(&placement.image);
    let font_id = doc.standard_font(StandardFont::Helvetica);
    let image_name = doc.register_resource(page_id, "XObject", "Sig", image_id)?;
    let font_name = doc.register_resource(
        page_id,
        "Font",
        StandardFont::Helvetica.resource_prefix(),
        font_id,
    )?;

    let mut operations = draw_image(&image_name, rect);
    operations.extend(text_line(
        &font_name,
        ANNOTATION_SIZE,
        ANNOTATION_GRAY,
        rect.x,
        rect.y - TIMESTAMP_OFFSET,
        &format!("Signed: {}", field.signed_at.format("%Y-%m-%d %H:%M:%S UTC")),
    ));
    if let Some(name) = field.signer_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        operations.extend(text_line(
            &font_name,
            ANNOTATION_SIZE,
            ANNOTATION_GRAY,
            rect.x,
            rect.y - SIGNER_OFFSET,
            &format!("By: {}", name),
        ));
    }

    doc.overlay(page_id, operations)?;
    Ok(())
}
