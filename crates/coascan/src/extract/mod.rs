//! Text extraction from uploaded documents.
//!
//! The registry picks an extractor by declared MIME type. When that is
//! generic or unknown, a PDF header in the bytes wins over the storage key's
//! extension.

pub mod pdf;
pub mod text;

use crate::error::ExtractError;

/// PDF readers accept the header anywhere in the first kilobyte.
const PDF_HEADER_WINDOW: usize = 1024;
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Document formats the pipeline can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Text,
}

impl DocumentFormat {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" | "application/x-pdf" => Some(Self::Pdf),
            "text/plain" | "text/csv" | "text/markdown" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "text" | "csv" | "md" => Some(Self::Text),
            _ => None,
        }
    }

    /// Recognizes content by its leading bytes. Only PDF has a signature.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        let head = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
        head.windows(PDF_MAGIC.len())
            .any(|w| w == PDF_MAGIC)
            .then_some(Self::Pdf)
    }

    /// Resolves the format of a stored blob: declared MIME type, then the
    /// content signature, then a MIME type guessed from its key.
    pub fn detect(mime_type: &str, key: &str, bytes: &[u8]) -> Option<Self> {
        Self::from_mime(mime_type)
            .or_else(|| Self::sniff(bytes))
            .or_else(|| {
                mime_guess::from_path(key)
                    .first_raw()
                    .and_then(Self::from_mime)
            })
            .or_else(|| {
                key.rsplit_once('.')
                    .and_then(|(_, ext)| Self::from_extension(ext))
            })
    }
}

/// Extracts plain text from document bytes.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
    fn supports(&self, format: DocumentFormat) -> bool;
}

pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: vec![
                Box::new(text::PlainTextExtractor::new()),
                Box::new(pdf::PdfExtractor::new()),
            ],
        }
    }

    pub fn extract(&self, bytes: &[u8], mime_type: &str, key: &str) -> Result<String, ExtractError> {
        let format = DocumentFormat::detect(mime_type, key, bytes)
            .ok_or_else(|| ExtractError::UnsupportedFormat(mime_type.to_string()))?;

        for extractor in &self.extractors {
            if extractor.supports(format) {
                return extractor.extract(bytes);
            }
        }

        Err(ExtractError::UnsupportedFormat(mime_type.to_string()))
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Marker lopdf emits for glyphs in CID fonts it cannot decode.
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Below this many characters the alphanumeric ratio is not checked.
const MIN_TOTAL_CHARS: usize = 50;

/// Minimum share of alphanumeric characters for text to count as readable.
const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// Returns false for text that is empty, only decoding markers, or mostly
/// garbage glyphs. Such text is treated as if nothing was extracted.
pub fn is_usable_text(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");
    if cleaned.is_empty() {
        return false;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();
    !(total_chars > MIN_TOTAL_CHARS
        && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT)
}
