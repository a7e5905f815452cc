//! Upload acceptance rules shared by the browser-facing client and the server.
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. non-empty filename
//! 2. dangerous filename patterns
//! 3. size within `(0, max_file_size]`
//! 4. MIME type / extension allow-lists

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

/// 10 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub const DEFAULT_MAX_FILES: usize = 10;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Declared MIME types accepted without looking at the extension
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "text/csv",
    "text/plain",
    "application/csv",
    OCTET_STREAM,
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Extensions accepted when the MIME type is missing or generic
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "jpg", "jpeg", "png", "gif", "webp", "csv", "txt", "doc", "docx", "xls", "xlsx",
];

lazy_static! {
    static ref DANGEROUS_PATTERNS: Vec<Regex> = vec![
        // Directory traversal
        Regex::new(r"\.\.").unwrap(),
        // Characters Windows refuses in filenames
        Regex::new(r#"[<>:"|?*]"#).unwrap(),
        // Windows reserved device names, bare or with an extension
        Regex::new(r"(?i)^(CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])(\..*)?$").unwrap(),
        // Hidden files
        Regex::new(r"^\.").unwrap(),
        // Executables
        Regex::new(r"(?i)\.(exe|bat|cmd|scr|vbs|js|jar|com|pif)$").unwrap(),
        // Control characters and path separators
        Regex::new(r"[\x00-\x1f\x7f/\\]").unwrap(),
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid filename: filename must not be empty")]
    EmptyFileName,

    #[error("Filename \"{0}\" contains invalid or dangerous characters")]
    DangerousFileName(String),

    #[error("File \"{0}\" is empty")]
    EmptyFile(String),

    #[error("File \"{name}\" is too large ({size} bytes). Maximum size is {max} bytes.")]
    FileTooLarge { name: String, size: u64, max: u64 },

    #[error("File extension \".{extension}\" is not supported for \"{name}\". Allowed extensions: {}", ALLOWED_EXTENSIONS.join(", "))]
    UnsupportedExtension { name: String, extension: String },

    #[error("File type \"{mime_type}\" and extension \".{extension}\" are not supported for \"{name}\"")]
    UnsupportedType {
        name: String,
        mime_type: String,
        extension: String,
    },

    #[error("Too many files. Maximum {max} files allowed per request.")]
    TooManyFiles { count: usize, max: usize },

    #[error("No files provided")]
    NoFiles,
}

/// Configurable ceilings. Defaults: 10 MiB per file, 10 files per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_file_size: u64,
    pub max_files: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

/// What the validator needs to know about a file; the bytes never matter.
#[derive(Debug, Clone, Copy)]
pub struct FileCandidate<'a> {
    pub file_name: &'a str,
    pub size: u64,
    pub mime_type: &'a str,
}

impl<'a> FileCandidate<'a> {
    pub fn new(file_name: &'a str, size: u64, mime_type: &'a str) -> Self {
        Self {
            file_name,
            size,
            mime_type,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FileValidator {
    limits: ValidationLimits,
}

impl FileValidator {
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> ValidationLimits {
        self.limits
    }

    /// Classify one file. Pure: no I/O, same answer for the same input.
    pub fn validate(&self, file: &FileCandidate<'_>) -> Result<(), ValidationError> {
        let name = file.file_name;
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyFileName);
        }

        if is_dangerous_file_name(name) {
            return Err(ValidationError::DangerousFileName(name.to_string()));
        }

        if file.size == 0 {
            return Err(ValidationError::EmptyFile(name.to_string()));
        }
        if file.size > self.limits.max_file_size {
            return Err(ValidationError::FileTooLarge {
                name: name.to_string(),
                size: file.size,
                max: self.limits.max_file_size,
            });
        }

        let mime_type = normalize_mime(file.mime_type);
        let extension = file_extension(name);
        let extension_ok = ALLOWED_EXTENSIONS.contains(&extension.as_str());

        if mime_type == OCTET_STREAM || mime_type.is_empty() {
            if !extension_ok {
                return Err(ValidationError::UnsupportedExtension {
                    name: name.to_string(),
                    extension,
                });
            }
        } else if !ALLOWED_MIME_TYPES.contains(&mime_type.as_str()) && !extension_ok {
            return Err(ValidationError::UnsupportedType {
                name: name.to_string(),
                mime_type,
                extension,
            });
        }

        Ok(())
    }

    /// Reject a whole request by count alone, before any file is inspected.
    pub fn check_batch_size(&self, count: usize) -> Result<(), ValidationError> {
        if count == 0 {
            return Err(ValidationError::NoFiles);
        }
        if count > self.limits.max_files {
            return Err(ValidationError::TooManyFiles {
                count,
                max: self.limits.max_files,
            });
        }
        Ok(())
    }

    /// Batch cap first, then every file; the first failure wins.
    pub fn validate_all(&self, files: &[FileCandidate<'_>]) -> Result<(), ValidationError> {
        self.check_batch_size(files.len())?;
        files.iter().try_for_each(|f| self.validate(f))
    }
}

pub fn is_dangerous_file_name(name: &str) -> bool {
    DANGEROUS_PATTERNS.iter().any(|p| p.is_match(name))
}

/// Lowercased text after the last dot, or empty when there is none.
pub fn file_extension(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// Strip parameters (`; charset=...`) and lowercase.
pub fn normalize_mime(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn validator() -> FileValidator {
        FileValidator::default()
    }

    fn check(name: &str, size: u64, mime: &str) -> Result<(), ValidationError> {
        validator().validate(&FileCandidate::new(name, size, mime))
    }

    #[test]
    fn test_accepts_plain_pdf() {
        assert_eq!(check("contract.pdf", 1024, "application/pdf"), Ok(()));
    }

    #[test]
    fn test_rejects_empty_name() {
        assert_eq!(
            check("   ", 10, "application/pdf"),
            Err(ValidationError::EmptyFileName)
        );
    }

    #[test]
    fn test_dangerous_names_are_reported_with_the_name() {
        for name in [
            "../etc/passwd",
            "a\u{0000}.exe",
            ".hidden",
            "report<1>.pdf",
            "CON",
            "nul.txt",
            "lpt1",
            "setup.EXE",
            "script.js",
            "dir/file.pdf",
            "dir\\file.pdf",
            "tab\tname.pdf",
        ] {
            let err = check(name, 10, "application/pdf").unwrap_err();
            assert_eq!(err, ValidationError::DangerousFileName(name.to_string()));
            assert!(err.to_string().contains(name), "{}", err);
        }
    }

    #[test]
    fn test_reserved_prefix_is_not_reserved() {
        assert_eq!(check("console.pdf", 10, "application/pdf"), Ok(()));
        assert_eq!(check("COM10.pdf", 10, "application/pdf"), Ok(()));
    }

    #[test]
    fn test_size_boundary() {
        assert_eq!(check("a.pdf", DEFAULT_MAX_FILE_SIZE, "application/pdf"), Ok(()));
        assert_eq!(
            check("a.pdf", DEFAULT_MAX_FILE_SIZE + 1, "application/pdf"),
            Err(ValidationError::FileTooLarge {
                name: "a.pdf".to_string(),
                size: DEFAULT_MAX_FILE_SIZE + 1,
                max: DEFAULT_MAX_FILE_SIZE,
            })
        );
    }

    #[test]
    fn test_empty_file_rejected() {
        assert_eq!(
            check("a.pdf", 0, "application/pdf"),
            Err(ValidationError::EmptyFile("a.pdf".to_string()))
        );
    }

    #[test]
    fn test_octet_stream_requires_known_extension() {
        assert_eq!(check("scan.PDF", 10, OCTET_STREAM), Ok(()));
        assert_eq!(
            check("archive.zip", 10, OCTET_STREAM),
            Err(ValidationError::UnsupportedExtension {
                name: "archive.zip".to_string(),
                extension: "zip".to_string(),
            })
        );
        assert!(check("noext", 10, OCTET_STREAM).is_err());
    }

    #[test]
    fn test_mime_or_extension_is_enough() {
        // Unknown MIME, known extension
        assert_eq!(check("data.csv", 10, "application/x-weird"), Ok(()));
        // Known MIME, unknown extension
        assert_eq!(check("photo.heic", 10, "image/png"), Ok(()));
        // Neither
        let err = check("photo.heic", 10, "image/heic").unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedType {
                name: "photo.heic".to_string(),
                mime_type: "image/heic".to_string(),
                extension: "heic".to_string(),
            }
        );
        assert!(err.to_string().contains("photo.heic"));
    }

    #[test]
    fn test_mime_parameters_are_ignored() {
        assert_eq!(check("notes.bin", 10, "Text/Plain; charset=utf-8"), Ok(()));
    }

    #[test]
    fn test_batch_cap() {
        let v = validator();
        assert_eq!(v.check_batch_size(10), Ok(()));
        assert_eq!(
            v.check_batch_size(11),
            Err(ValidationError::TooManyFiles { count: 11, max: 10 })
        );
        assert_eq!(v.check_batch_size(0), Err(ValidationError::NoFiles));
    }

    #[test]
    fn test_batch_cap_wins_over_file_errors() {
        // Every file is invalid, but the count is checked first
        let names: Vec<String> = (0..11).map(|i| format!("../{}.exe", i)).collect();
        let files: Vec<_> = names
            .iter()
            .map(|n| FileCandidate::new(n, 0, "application/x-msdownload"))
            .collect();
        assert!(matches!(
            validator().validate_all(&files),
            Err(ValidationError::TooManyFiles { .. })
        ));

        // Ten invalid files reach per-file validation
        assert!(matches!(
            validator().validate_all(&files[..10]),
            Err(ValidationError::DangerousFileName(_))
        ));
    }

    #[test]
    fn test_custom_limits() {
        let v = FileValidator::new(ValidationLimits {
            max_file_size: 100,
            max_files: 2,
        });
        assert!(v.validate(&FileCandidate::new("a.pdf", 101, "application/pdf")).is_err());
        assert!(v.check_batch_size(3).is_err());
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("a.tar.GZ"), "gz");
        assert_eq!(file_extension("README"), "");
    }

    proptest! {
        #[test]
        fn prop_sizes_within_limit_accepted(size in 1u64..=DEFAULT_MAX_FILE_SIZE) {
            prop_assert!(check("doc.pdf", size, "application/pdf").is_ok());
        }

        #[test]
        fn prop_sizes_over_limit_rejected(extra in 1u64..1_000_000) {
            let result = check("doc.pdf", DEFAULT_MAX_FILE_SIZE + extra, "application/pdf");
            let is_too_large = matches!(result, Err(ValidationError::FileTooLarge { .. }));
            prop_assert!(is_too_large);
        }

        #[test]
        fn prop_traversal_always_rejected(prefix in "[a-z]{0,8}", suffix in "[a-z]{0,8}") {
            let name = format!("{}..{}.pdf", prefix, suffix);
            let is_dangerous = matches!(
                check(&name, 10, "application/pdf"),
                Err(ValidationError::DangerousFileName(_))
            );
            prop_assert!(is_dangerous);
        }

        #[test]
        fn prop_validation_is_deterministic(name in "\\PC{0,24}", size in 0u64..20_000_000) {
            prop_assert_eq!(
                check(&name, size, "application/pdf"),
                check(&name, size, "application/pdf")
            );
        }
    }
}
