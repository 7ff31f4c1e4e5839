//! Magic-byte file type detection.
//!
//! Uploads are classified from their leading bytes only. The file name
//! extension and the client-declared Content-Type are checked against that
//! classification but never used in its place.

use kyc_common::{AppError, AppResult};

/// File types recognised from their signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedType {
    Jpeg,
    Png,
    Webp,
    Pdf,
    Gif,
    Tiff,
    Zip,
    /// Windows PE / DOS `MZ` executable
    WindowsExecutable,
    /// ELF executable or shared object
    Elf,
}

impl SniffedType {
    /// MIME type reported for this file type.
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Pdf => "application/pdf",
            Self::Gif => "image/gif",
            Self::Tiff => "image/tiff",
            Self::Zip => "application/zip",
            Self::WindowsExecutable => "application/vnd.microsoft.portable-executable",
            Self::Elf => "application/x-elf",
        }
    }

    /// Whether the bytes are a native executable.
    #[must_use]
    pub const fn is_executable(self) -> bool {
        matches!(self, Self::WindowsExecutable | Self::Elf)
    }
}

/// Detect the file type from its leading bytes.
#[must_use]
pub fn sniff(data: &[u8]) -> Option<SniffedType> {
    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(SniffedType::Jpeg);
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(SniffedType::Png);
    }

    // WebP: RIFF....WEBP
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some(SniffedType::Webp);
    }

    // PDF: %PDF-
    if data.starts_with(b"%PDF-") {
        return Some(SniffedType::Pdf);
    }

    // GIF: GIF87a or GIF89a
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some(SniffedType::Gif);
    }

    // TIFF: little-endian II*\0 or big-endian MM\0*
    if data.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A]) {
        return Some(SniffedType::Tiff);
    }

    // ZIP: local file header, empty archive, or spanned archive
    if [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"]
        .iter()
        .any(|magic| data.starts_with(*magic))
    {
        return Some(SniffedType::Zip);
    }

    if data.starts_with(b"MZ") {
        return Some(SniffedType::WindowsExecutable);
    }

    if data.starts_with(b"\x7FELF") {
        return Some(SniffedType::Elf);
    }

    None
}

/// Lowercased MIME essence without parameters, with common aliases folded.
fn normalize_mime(mime: &str) -> String {
    let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        "application/x-pdf" => "application/pdf".to_string(),
        _ => essence,
    }
}

/// MIME type implied by the file name extension, if the extension is known.
fn extension_mime(original_name: &str) -> Option<String> {
    mime_guess::from_path(original_name)
        .first_raw()
        .map(normalize_mime)
        .filter(|mime| mime != "application/octet-stream")
}

/// Checks uploads against the configured allow-list.
#[derive(Debug, Clone)]
pub struct MagicByteValidator {
    allowed: Vec<String>,
}

impl MagicByteValidator {
    /// Create a validator accepting the given MIME types.
    #[must_use]
    pub fn new(allowed: &[String]) -> Self {
        Self {
            allowed: allowed.iter().map(|m| normalize_mime(m)).collect(),
        }
    }

    /// Whether `mime` is on the allow-list.
    #[must_use]
    pub fn is_allowed(&self, mime: &str) -> bool {
        let mime = normalize_mime(mime);
        self.allowed.iter().any(|m| *m == mime)
    }

    /// Validate one file, returning the detected MIME type.
    ///
    /// Errors are scoped to `field`. A recognised extension on
    /// `original_name` must agree with the detected type, and so must the
    /// declared type unless it is missing or `application/octet-stream`.
    pub fn validate(
        &self,
        field: &str,
        data: &[u8],
        original_name: &str,
        declared_mime: &str,
    ) -> AppResult<&'static str> {
        let Some(kind) = sniff(data) else {
            return Err(AppError::invalid_field(field, "unrecognized file type"));
        };
        let detected = kind.mime();

        if kind.is_executable() {
            return Err(AppError::invalid_field(
                field,
                format!("executable content is not accepted (detected {detected})"),
            ));
        }

        if !self.is_allowed(detected) {
            return Err(AppError::invalid_field(
                field,
                format!("file type {detected} is not allowed"),
            ));
        }

        if let Some(named) = extension_mime(original_name).filter(|named| named != detected) {
            return Err(AppError::invalid_field(
                field,
                format!("type mismatch: file name implies {named}, detected {detected}"),
            ));
        }

        let declared = normalize_mime(declared_mime);
        if !declared.is_empty() && declared != "application/octet-stream" && declared != detected {
            return Err(AppError::invalid_field(
                field,
                format!("type mismatch: declared {declared}, detected {detected}"),
            ));
        }

        Ok(detected)
    }
}
