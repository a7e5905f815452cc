//! PDF parsing and manipulation using lopdf

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::content::StandardFont;
use crate::coords::PageBox;
use crate::error::PdfError;
use crate::image::SignatureImage;

/// Values for the document information dictionary
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: Vec<String>,
    pub producer: String,
    pub modified_at: DateTime<Utc>,
}

/// Wrapper around lopdf::Document for overlay-style edits
pub struct PdfDocument {
    doc: Document,
    fonts: HashMap<StandardFont, ObjectId>,
    isolated_pages: HashSet<ObjectId>,
}

impl PdfDocument {
    /// Load a PDF from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfError> {
        let doc = Document::load_mem(bytes).map_err(|e| PdfError::Parse(e.to_string()))?;
        tracing::debug!(
            version = %doc.version,
            pages = doc.get_pages().len(),
            bytes = bytes.len(),
            "Loaded PDF"
        );
        Ok(Self {
            doc,
            fonts: HashMap::new(),
            isolated_pages: HashSet::new(),
        })
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Page object ID for a 1-based page number
    pub fn page_id(&self, page: u32) -> Result<ObjectId, PdfError> {
        self.doc
            .get_pages()
            .get(&page)
            .copied()
            .ok_or(PdfError::PageNotFound {
                page,
                page_count: self.page_count(),
            })
    }

    /// MediaBox of a page, inherited through the page tree when the page
    /// has none of its own. Falls back to US Letter.
    pub fn page_box(&self, page: u32) -> Result<PageBox, PdfError> {
        let page_id = self.page_id(page)?;
        match self.inherited(page_id, b"MediaBox")? {
            Some(obj) => self.parse_rect(obj),
            None => Ok(PageBox::LETTER),
        }
    }

    /// Look up `key` on the node or its ancestors
    fn inherited(&self, node_id: ObjectId, key: &[u8]) -> Result<Option<&Object>, PdfError> {
        let mut current = Some(node_id);
        let mut visited = HashSet::new();
        while let Some(id) = current {
            if !visited.insert(id) {
                return Err(PdfError::Structure("cycle in page tree".to_string()));
            }
            let node = self.doc.get_dictionary(id)?;
            if let Ok(value) = node.get(key) {
                return Ok(Some(value));
            }
            current = node.get(b"Parent").and_then(Object::as_reference).ok();
        }
        Ok(None)
    }

    fn parse_rect(&self, obj: &Object) -> Result<PageBox, PdfError> {
        let arr = match obj {
            Object::Array(a) => a,
            Object::Reference(id) => self.doc.get_object(*id)?.as_array()?,
            _ => return Err(PdfError::Structure("MediaBox is not an array".to_string())),
        };
        if arr.len() != 4 {
            return Err(PdfError::Structure(format!(
                "MediaBox has {} elements, expected 4",
                arr.len()
            )));
        }

        let mut values = [0.0f64; 4];
        for (i, obj) in arr.iter().enumerate() {
            values[i] = self.extract_number(obj)?;
        }
        Ok(PageBox::from_corners(values[0], values[1], values[2], values[3]))
    }

    fn extract_number(&self, obj: &Object) -> Result<f64, PdfError> {
        match obj {
            Object::Integer(i) => Ok(*i as f64),
            Object::Real(r) => Ok(*r as f64),
            Object::Reference(id) => self.extract_number(self.doc.get_object(*id)?),
            _ => Err(PdfError::Structure("Expected number in rectangle".to_string())),
        }
    }

    fn resolve_dict<'a>(&'a self, obj: &'a Object) -> Result<&'a Dictionary, PdfError> {
        match obj {
            Object::Dictionary(d) => Ok(d),
            Object::Reference(id) => Ok(self.doc.get_dictionary(*id)?),
            _ => Err(PdfError::Structure("expected a dictionary".to_string())),
        }
    }

    /// Replace the document information dictionary entries we own.
    pub fn set_info(&mut self, info: &DocumentInfo) {
        let mut dict = self
            .doc
            .trailer
            .get(b"Info")
            .ok()
            .and_then(|obj| self.resolve_dict(obj).ok())
            .cloned()
            .unwrap_or_default();

        dict.set("Title", text_string(&info.title));
        dict.set("Author", text_string(&info.author));
        dict.set("Subject", text_string(&info.subject));
        dict.set("Keywords", text_string(&info.keywords.join(", ")));
        dict.set("Producer", text_string(&info.producer));
        dict.set("Creator", text_string(&info.producer));
        dict.set(
            "ModDate",
            Object::string_literal(info.modified_at.format("D:%Y%m%d%H%M%SZ").to_string()),
        );

        let info_id = self.doc.add_object(dict);
        self.doc.trailer.set("Info", Object::Reference(info_id));
    }

    /// Add an image XObject to the document (not yet placed on any page)
    pub fn add_image(&mut self, image: &SignatureImage) -> ObjectId {
        image.embed(&mut self.doc)
    }

    /// Shared font object for a base-14 font, created on first use
    pub fn standard_font(&mut self, font: StandardFont) -> ObjectId {
        if let Some(id) = self.fonts.get(&font) {
            return *id;
        }
        let id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_font(),
            "Encoding" => "WinAnsiEncoding",
        });
        self.fonts.insert(font, id);
        id
    }

    /// Make `target` reachable from the page's resources under `category`
    /// (`XObject`, `Font`) and return the name to use in content streams.
    ///
    /// The page's effective resources (own or inherited) are copied onto the
    /// page itself, so shared dictionaries are never modified.
    pub fn register_resource(
        &mut self,
        page_id: ObjectId,
        category: &str,
        prefix: &str,
        target: ObjectId,
    ) -> Result<String, PdfError> {
        let mut resources = match self.inherited(page_id, b"Resources")? {
            Some(obj) => self.resolve_dict(obj)?.clone(),
            None => Dictionary::new(),
        };
        let mut entries = match resources.get(category.as_bytes()) {
            Ok(obj) => self.resolve_dict(obj)?.clone(),
            Err(_) => Dictionary::new(),
        };

        let existing = entries
            .iter()
            .find(|(_, v)| v.as_reference().ok() == Some(target))
            .map(|(k, _)| String::from_utf8_lossy(k).into_owned());

        let name = match existing {
            Some(name) => name,
            None => {
                let mut n = 1;
                while entries.has(format!("{}{}", prefix, n).as_bytes()) {
                    n += 1;
                }
                format!("{}{}", prefix, n)
            }
        };
        entries.set(name.clone(), Object::Reference(target));
        resources.set(category, Object::Dictionary(entries));
        self.doc
            .get_dictionary_mut(page_id)?
            .set("Resources", Object::Dictionary(resources));

        Ok(name)
    }

    /// Append drawing operations to a page. The page's original content is
    /// wrapped in `q`/`Q` the first time so its graphics state cannot leak
    /// into the overlay.
    pub fn overlay(&mut self, page_id: ObjectId, operations: Vec<Operation>) -> Result<(), PdfError> {
        let encoded = Content { operations }
            .encode()
            .map_err(|e| PdfError::Encode(e.to_string()))?;
        let overlay_id = self.doc.add_object(Stream::new(Dictionary::new(), encoded));

        let existing: Vec<Object> = match self.doc.get_dictionary(page_id)?.get(b"Contents") {
            Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        };

        let mut contents = Vec::with_capacity(existing.len() + 3);
        if !existing.is_empty() && self.isolated_pages.insert(page_id) {
            let save = self
                .doc
                .add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
            let restore = self
                .doc
                .add_object(Stream::new(Dictionary::new(), b"Q\n".to_vec()));
            contents.push(Object::Reference(save));
            contents.extend(existing);
            contents.push(Object::Reference(restore));
        } else {
            contents.extend(existing);
        }
        contents.push(Object::Reference(overlay_id));

        self.doc
            .get_dictionary_mut(page_id)?
            .set("Contents", Object::Array(contents));
        Ok(())
    }

    /// Plain text of the given 1-based pages
    pub fn extract_text(&self, pages: &[u32]) -> Result<String, PdfError> {
        Ok(self.doc.extract_text(pages)?)
    }

    /// Read-only access to the underlying document
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Save the document to bytes
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, PdfError> {
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| PdfError::Save(e.to_string()))?;
        Ok(buffer)
    }
}

/// PDF text string: literal for ASCII, UTF-16BE with BOM otherwise
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::text_line;
    use crate::fixtures;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_bytes_html_fails() {
        let html = b"<!DOCTYPE html><html><body>Not a PDF</body></html>";
        assert!(matches!(
            PdfDocument::from_bytes(html),
            Err(PdfError::Parse(_))
        ));
    }

    #[test]
    fn test_from_bytes_empty_fails() {
        assert!(PdfDocument::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_page_count_and_missing_page() {
        let pdf = PdfDocument::from_bytes(&fixtures::blank_document(3, PageBox::LETTER)).unwrap();
        assert_eq!(pdf.page_count(), 3);
        assert!(pdf.page_id(3).is_ok());
        assert!(matches!(
            pdf.page_id(4),
            Err(PdfError::PageNotFound { page: 4, page_count: 3 })
        ));
    }

    #[test]
    fn test_media_box_inherited_from_page_tree() {
        let a4 = PageBox::new(595.0, 842.0);
        let pdf = PdfDocument::from_bytes(&fixtures::blank_document(2, a4)).unwrap();
        assert_eq!(pdf.page_box(2).unwrap(), a4);
    }

    #[test]
    fn test_register_resource_picks_unused_name() {
        let mut pdf = PdfDocument::from_bytes(&fixtures::blank_document(1, PageBox::LETTER)).unwrap();
        let page_id = pdf.page_id(1).unwrap();
        // The fixture already uses F1 for its own font
        let font = pdf.standard_font(StandardFont::Helvetica);
        let name = pdf.register_resource(page_id, "Font", "F", font).unwrap();
        assert_eq!(name, "F2");

        // Registering the same object again reuses its name
        let again = pdf.register_resource(page_id, "Font", "F", font).unwrap();
        assert_eq!(again, "F2");
    }

    #[test]
    fn test_overlay_text_is_extractable() {
        let mut pdf = PdfDocument::from_bytes(&fixtures::blank_document(1, PageBox::LETTER)).unwrap();
        let page_id = pdf.page_id(1).unwrap();
        let font = pdf.standard_font(StandardFont::Helvetica);
        let name = pdf.register_resource(page_id, "Font", "F", font).unwrap();
        pdf.overlay(page_id, text_line(&name, 12.0, 0.0, 72.0, 72.0, "Overlay marker"))
            .unwrap();

        let bytes = pdf.save_to_bytes().unwrap();
        let reloaded = PdfDocument::from_bytes(&bytes).unwrap();
        let text = reloaded.extract_text(&[1]).unwrap();
        assert!(text.contains("Overlay marker"), "{}", text);
        assert!(text.contains("Page 1"), "{}", text);
    }

    #[test]
    fn test_original_content_is_isolated_once() {
        let mut pdf = PdfDocument::from_bytes(&fixtures::blank_document(1, PageBox::LETTER)).unwrap();
        let page_id = pdf.page_id(1).unwrap();
        pdf.overlay(page_id, vec![]).unwrap();
        pdf.overlay(page_id, vec![]).unwrap();

        let contents = pdf
            .document()
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Contents")
            .unwrap()
            .as_array()
            .unwrap()
            .len();
        // q, original, Q, overlay, overlay
        assert_eq!(contents, 5);
    }

    #[test]
    fn test_set_info_unicode_title() {
        let mut pdf = PdfDocument::from_bytes(&fixtures::blank_document(1, PageBox::LETTER)).unwrap();
        pdf.set_info(&DocumentInfo {
            title: "Signed: Vertrag für Müller".to_string(),
            author: "Ada".to_string(),
            subject: "Signed Document".to_string(),
            keywords: vec!["signed".to_string(), "pdf".to_string()],
            producer: "DocSign".to_string(),
            modified_at: Utc::now(),
        });

        let info_id = pdf.document().trailer.get(b"Info").unwrap().as_reference().unwrap();
        let info = pdf.document().get_dictionary(info_id).unwrap();
        let title = info.get(b"Title").unwrap().as_str().unwrap();
        assert_eq!(&title[..2], &[0xFE, 0xFF]);
        assert_eq!(info.get(b"Keywords").unwrap().as_str().unwrap(), b"signed, pdf");
    }
}
