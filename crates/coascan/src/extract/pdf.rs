use crate::error::ExtractError;
use crate::extract::{DocumentFormat, TextExtractor};

/// Reads the embedded text layer of a PDF with lopdf, one line block per
/// page. Scanned PDFs with no text layer yield an empty string.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for PdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let _span = tracing::info_span!("extract.pdf", bytes = bytes.len()).entered();

        let doc = lopdf::Document::load_mem(bytes)
            .map_err(|e| ExtractError::PdfProcessing(format!("Failed to load PDF: {e}")))?;

        let pages: Vec<u32> = doc.get_pages().into_keys().collect();
        let mut unreadable = Vec::new();
        let text = pages
            .iter()
            .filter_map(|&page| match doc.extract_text(&[page]) {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::debug!(page, error = %e, "No text layer on page");
                    unreadable.push(page);
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        if !unreadable.is_empty() {
            tracing::warn!(
                pages = pages.len(),
                unreadable = ?unreadable,
                "Partial PDF text extraction"
            );
        }
        Ok(text)
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        format == DocumentFormat::Pdf
    }
}
