//! Page-by-page text extraction for paginated documents.

use crate::{Error, Result};
use async_trait::async_trait;

/// Text-extraction backend for one family of paginated documents.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Whether this extractor understands documents of `mime`.
    fn supports(&self, mime: &str) -> bool;

    /// Number of pages, or `Error::Extraction` for unreadable/protected documents.
    fn page_count(&self, document: &[u8]) -> Result<usize>;

    /// Text of the zero-based page `index`.
    async fn extract_page(&self, document: &[u8], index: usize) -> Result<String>;

    /// Total page count and the text of at most `max_pages` leading pages.
    ///
    /// Backends that parse the whole document up front override this to parse once.
    async fn extract_leading(
        &self,
        document: &[u8],
        max_pages: usize,
    ) -> Result<(usize, Vec<String>)> {
        let total = self.page_count(document)?;
        let mut pages = Vec::with_capacity(total.min(max_pages));
        for index in 0..total.min(max_pages) {
            pages.push(self.extract_page(document, index).await?);
        }
        Ok((total, pages))
    }
}

/// Plain-text and markdown documents, paginated on form feeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextPages;

impl PlainTextPages {
    fn decode(document: &[u8]) -> Result<&str> {
        std::str::from_utf8(document)
            .map_err(|e| Error::Extraction(format!("Document is not valid UTF-8: {}", e)))
    }
}

#[async_trait]
impl PageExtractor for PlainTextPages {
    fn supports(&self, mime: &str) -> bool {
        matches!(
            super::mime::essence(mime).as_str(),
            "text/plain" | "text/markdown"
        )
    }

    fn page_count(&self, document: &[u8]) -> Result<usize> {
        Ok(Self::decode(document)?.split('\x0C').count())
    }

    async fn extract_page(&self, document: &[u8], index: usize) -> Result<String> {
        Self::decode(document)?
            .split('\x0C')
            .nth(index)
            .map(|page| page.trim().to_string())
            .ok_or_else(|| Error::Extraction(format!("Page {} does not exist", index + 1)))
    }
}

/// Marker line written before each page's text.
pub fn page_marker(page_number: usize) -> String {
    format!("--- Page {} ---", page_number)
}

/// Extract at most `max_pages` pages and join them with page markers.
pub async fn extract_pages(
    extractor: &dyn PageExtractor,
    document: &[u8],
    max_pages: usize,
) -> Result<String> {
    let (total, pages) = extractor.extract_leading(document, max_pages).await?;
    if total > max_pages {
        tracing::info!(
            "Document has {} pages, extracting the first {}",
            total,
            max_pages
        );
    }

    let mut text = String::new();
    let mut has_content = false;
    for (index, page) in pages.iter().take(max_pages).enumerate() {
        has_content |= !page.trim().is_empty();
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&page_marker(index + 1));
        text.push('\n');
        text.push_str(page);
    }

    if !has_content {
        return Err(Error::Extraction(
            "Document contains no extractable text".to_string(),
        ));
    }

    Ok(text)
}
