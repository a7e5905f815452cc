//! The "Certificate of Completion" block drawn at the bottom of the last
//! page of a signed document.
//!
//! The box keeps the classic 120pt layout for a single line of signers and
//! grows by one line height per extra wrapped line, up to the height of the
//! page. Signers that still do not fit are summarised as `(+N more)`.

use chrono::{DateTime, SecondsFormat, Utc};
use shared_pdf::content::{framed_rect, text_line, text_width};
use shared_pdf::{PageBox, PdfDocument, Rect, StandardFont};
use tracing::debug;

use crate::compositor::{open, DEFAULT_PRODUCT_NAME};
use crate::error::SigningError;

pub const CERTIFICATE_TITLE: &str = "Certificate of Completion";

const MARGIN: f64 = 50.0;
const PADDING: f64 = 20.0;
const BASE_HEIGHT: f64 = 120.0;
const LINE_HEIGHT: f64 = 14.0;

const TITLE_SIZE: f64 = 14.0;
const BODY_SIZE: f64 = 10.0;
const FOOTER_SIZE: f64 = 8.0;

const FILL_GRAY: f64 = 0.97;
const BORDER_GRAY: f64 = 0.9;

const NO_SIGNERS: &str = "Document signed";
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq)]
pub struct CertificateLine {
    pub font: StandardFont,
    pub size: f64,
    pub gray: f64,
    pub x: f64,
    /// Baseline
    pub y: f64,
    pub text: String,
}

/// Position of the frame and every line of text, in page space
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateLayout {
    pub frame: Rect,
    pub lines: Vec<CertificateLine>,
}

impl CertificateLayout {
    pub fn compute(
        page: &PageBox,
        document_name: &str,
        signer_names: &[String],
        generated_at: DateTime<Utc>,
        product_name: &str,
    ) -> Self {
        let width = (page.width - 2.0 * MARGIN).max(0.0);
        let text_x = page.x + MARGIN + PADDING;
        let text_room = (width - 2.0 * PADDING).max(0.0);

        let max_height = (page.height - 2.0 * MARGIN).max(BASE_HEIGHT);
        let max_lines = ((max_height - BASE_HEIGHT) / LINE_HEIGHT).floor() as usize + 1;
        let signer_lines = signer_lines(signer_names, text_room, max_lines);

        let height = BASE_HEIGHT + (signer_lines.len() - 1) as f64 * LINE_HEIGHT;
        let frame = Rect {
            x: page.x + MARGIN,
            y: page.y + MARGIN,
            width,
            height,
        };
        let top = frame.top();

        let body = |y: f64, text: String| CertificateLine {
            font: StandardFont::Helvetica,
            size: BODY_SIZE,
            gray: 0.0,
            x: text_x,
            y,
            text,
        };

        let mut lines = vec![
            CertificateLine {
                font: StandardFont::HelveticaBold,
                size: TITLE_SIZE,
                gray: 0.3,
                x: text_x,
                y: top - 25.0,
                text: CERTIFICATE_TITLE.to_string(),
            },
            body(
                top - 45.0,
                fit_to_width(&format!("Document: {}", document_name), text_room),
            ),
        ];

        let mut y = top - 65.0;
        for (i, text) in signer_lines.into_iter().enumerate() {
            if i > 0 {
                y -= LINE_HEIGHT;
            }
            lines.push(body(y, text));
        }
        lines.push(body(
            y - 20.0,
            format!(
                "Timestamp: {}",
                generated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
        ));
        lines.push(CertificateLine {
            font: StandardFont::Helvetica,
            size: FOOTER_SIZE,
            gray: 0.5,
            x: text_x,
            y: frame.y + 15.0,
            text: format!("{} Document Management System", product_name),
        });

        Self { frame, lines }
    }
}

/// Comma-joined signer names wrapped to `max_width`, at most `max_lines`
/// lines. Never empty.
fn signer_lines(names: &[String], max_width: f64, max_lines: usize) -> Vec<String> {
    const PREFIX: &str = "Signers: ";

    let names: Vec<&str> = names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return vec![format!("{}{}", PREFIX, NO_SIGNERS)];
    }

    // (text, names on the line)
    let mut wrapped: Vec<(String, usize)> = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for (i, name) in names.iter().enumerate() {
        let piece = if i + 1 < names.len() {
            format!("{},", name)
        } else {
            name.to_string()
        };

        if count > 0 {
            let candidate = format!("{} {}", current, piece);
            if width(&candidate) <= max_width {
                current = candidate;
                count += 1;
                continue;
            }
            wrapped.push((std::mem::take(&mut current), count));
        }

        let lead = if wrapped.is_empty() { PREFIX } else { "" };
        current = fit_to_width(&format!("{}{}", lead, piece), max_width);
        count = 1;
    }
    wrapped.push((current, count));

    if wrapped.len() <= max_lines {
        return wrapped.into_iter().map(|(text, _)| text).collect();
    }

    wrapped.truncate(max_lines - 1);
    let shown: usize = wrapped.iter().map(|(_, n)| n).sum();
    let summary = format!("(+{} more)", names.len() - shown);
    let mut lines: Vec<String> = wrapped.into_iter().map(|(text, _)| text).collect();
    if lines.is_empty() {
        lines.push(format!("{}{}", PREFIX, summary));
    } else {
        lines.push(summary);
    }
    lines
}

fn width(text: &str) -> f64 {
    text_width(text, StandardFont::Helvetica, BODY_SIZE)
}

/// Cut `text` down, ending in `...`, until it fits in `max_width`
fn fit_to_width(text: &str, max_width: f64) -> String {
    if width(text) <= max_width {
        return text.to_string();
    }
    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate: String = chars.iter().collect::<String>() + ELLIPSIS;
        if width(&candidate) <= max_width {
            return candidate;
        }
    }
    ELLIPSIS.to_string()
}

#[derive(Debug, Clone)]
pub struct CertificateAppender {
    product_name: String,
}

impl Default for CertificateAppender {
    fn default() -> Self {
        Self::new(DEFAULT_PRODUCT_NAME)
    }
}

impl CertificateAppender {
    pub fn new(product_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
        }
    }

    /// Draw the certificate on the last page of `pdf` and return the new
    /// document bytes.
    pub fn append(
        &self,
        pdf: &[u8],
        document_name: &str,
        signer_names: &[String],
    ) -> Result<Vec<u8>, SigningError> {
        let mut doc = open(pdf)?;
        self.append_to(&mut doc, document_name, signer_names, Utc::now())?;
        Ok(doc.save_to_bytes()?)
    }

    pub fn append_to(
        &self,
        doc: &mut PdfDocument,
        document_name: &str,
        signer_names: &[String],
        generated_at: DateTime<Utc>,
    ) -> Result<CertificateLayout, SigningError> {
        let last_page = u32::try_from(doc.page_count()).unwrap_or(u32::MAX);
        if last_page == 0 {
            return Err(SigningError::InvalidPdf("document has no pages".into()));
        }
        let page_id = doc.page_id(last_page)?;
        let page_box = doc.page_box(last_page)?;
        let layout = CertificateLayout::compute(
            &page_box,
            document_name,
            signer_names,
            generated_at,
            &self.product_name,
        );

        let regular_id = doc.standard_font(StandardFont::Helvetica);
        let bold_id = doc.standard_font(StandardFont::HelveticaBold);
        let regular = doc.register_resource(
            page_id,
            "Font",
            StandardFont::Helvetica.resource_prefix(),
            regular_id,
        )?;
        let bold = doc.register_resource(
            page_id,
            "Font",
            StandardFont::HelveticaBold.resource_prefix(),
            bold_id,
        )?;

        let mut operations = framed_rect(&layout.frame, FILL_GRAY, BORDER_GRAY, 1.0);
        for line in &layout.lines {
            let font = match line.font {
                StandardFont::Helvetica => &regular,
                StandardFont::HelveticaBold => &bold,
            };
            operations.extend(text_line(
                font, line.size, line.gray, line.x, line.y, &line.text,
            ));
        }
        doc.overlay(page_id, operations)?;

        debug!(
            page = last_page,
            height = layout.frame.height,
            "Appended certificate"
        );
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use shared_pdf::{fits_within, fixtures};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn names(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("Signer Number {}", i)).collect()
    }

    fn layout(signers: &[String]) -> CertificateLayout {
        CertificateLayout::compute(&PageBox::LETTER, "contract.pdf", signers, at(), "DocSign")
    }

    fn texts(layout: &CertificateLayout) -> Vec<&str> {
        layout.lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn test_certificate_is_on_last_page() {
        let out = CertificateAppender::default()
            .append(
                &fixtures::blank_document(3, PageBox::LETTER),
                "contract.pdf",
                &["Ada Lovelace".to_string()],
            )
            .unwrap();
        let doc = PdfDocument::from_bytes(&out).unwrap();
        let last = doc.extract_text(&[3]).unwrap();
        assert!(last.contains(CERTIFICATE_TITLE), "{}", last);
        assert!(last.contains("Signers: Ada Lovelace"), "{}", last);
        assert!(last.contains("DocSign Document Management System"), "{}", last);
        assert!(!doc.extract_text(&[1]).unwrap().contains(CERTIFICATE_TITLE));
    }

    #[test]
    fn test_single_signer_uses_classic_layout() {
        let layout = layout(&["Ada Lovelace".to_string()]);
        assert_eq!(
            layout.frame,
            Rect {
                x: 50.0,
                y: 50.0,
                width: 512.0,
                height: 120.0
            }
        );
        assert_eq!(
            texts(&layout),
            vec![
                "Certificate of Completion",
                "Document: contract.pdf",
                "Signers: Ada Lovelace",
                "Timestamp: 2024-05-01T12:00:00.000Z",
                "DocSign Document Management System",
            ]
        );
        let ys: Vec<f64> = layout.lines.iter().map(|l| l.y).collect();
        assert_eq!(ys, vec![145.0, 125.0, 105.0, 85.0, 65.0]);
    }

    #[test]
    fn test_no_signers_uses_fallback() {
        let layout = layout(&["  ".to_string()]);
        assert!(texts(&layout).contains(&"Signers: Document signed"));
    }

    #[test]
    fn test_box_grows_with_wrapped_signers() {
        let layout = layout(&names(12));
        let signer_lines = layout.lines.len() - 4;
        assert!(signer_lines > 1);
        assert_eq!(
            layout.frame.height,
            BASE_HEIGHT + (signer_lines - 1) as f64 * LINE_HEIGHT
        );

        let joined = texts(&layout)[2..2 + signer_lines].join(" ");
        assert_eq!(
            joined,
            format!("Signers: {}", names(12).join(", "))
        );
    }

    #[test]
    fn test_huge_signer_list_is_capped() {
        let layout = layout(&names(1000));
        assert!(fits_within(&layout.frame, &PageBox::LETTER));
        let summary = layout
            .lines
            .iter()
            .find(|l| l.text.starts_with("(+"))
            .expect("summary line");
        assert!(summary.text.ends_with(" more)"));
        assert!(summary.y > layout.frame.y);
    }

    #[test]
    fn test_long_document_name_is_shortened() {
        let long = "x".repeat(400);
        let layout = CertificateLayout::compute(&PageBox::LETTER, &long, &[], at(), "DocSign");
        let line = &layout.lines[1];
        assert!(line.text.ends_with("..."));
        assert!(text_width(&line.text, StandardFont::Helvetica, BODY_SIZE) <= 512.0 - 40.0);
    }

    #[test]
    fn test_empty_pdf_bytes_fail() {
        assert!(matches!(
            CertificateAppender::default().append(b"", "a.pdf", &[]),
            Err(SigningError::InvalidPdf(_))
        ));
    }

    // ============================================================
    // Property Tests
    // ============================================================

    fn signer_list_strategy() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[A-Za-z ]{0,60}", 0..300)
    }

    fn page_strategy() -> impl Strategy<Value = PageBox> {
        (250.0f64..2000.0, 250.0f64..2000.0).prop_map(|(w, h)| PageBox::new(w, h))
    }

    proptest! {
        #[test]
        fn prop_certificate_stays_on_page(
            signers in signer_list_strategy(),
            page in page_strategy(),
        ) {
            let layout = CertificateLayout::compute(&page, "doc.pdf", &signers, at(), "DocSign");
            prop_assert!(fits_within(&layout.frame, &page));
            for line in &layout.lines {
                prop_assert!(line.y > layout.frame.y && line.y < layout.frame.top());
            }
        }
    }
}
