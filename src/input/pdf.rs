//! PDF text extraction backed by `lopdf`.

use super::document::PageExtractor;
use crate::{Error, Result};
use async_trait::async_trait;
use lopdf::Document;

/// PDF documents, one page of text per PDF page.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfPages;

impl PdfPages {
    fn load(document: &[u8]) -> Result<Document> {
        let pdf = Document::load_mem(document)
            .map_err(|e| Error::Extraction(format!("PDF could not be read: {}", e)))?;
        if pdf.is_encrypted() {
            return Err(Error::Extraction("PDF is password-protected".to_string()));
        }
        Ok(pdf)
    }

    /// Page numbers (1-based, as stored in the PDF) in reading order.
    fn page_numbers(pdf: &Document) -> Vec<u32> {
        pdf.get_pages().into_keys().collect()
    }

    fn page_text(pdf: &Document, page_number: u32) -> Result<String> {
        pdf.extract_text(&[page_number])
            .map(|text| text.trim().to_string())
            .map_err(|e| {
                Error::Extraction(format!("Page {} could not be read: {}", page_number, e))
            })
    }

    fn extract_blocking(document: &[u8], max_pages: usize) -> Result<(usize, Vec<String>)> {
        let pdf = Self::load(document)?;
        let numbers = Self::page_numbers(&pdf);
        let pages = numbers
            .iter()
            .take(max_pages)
            .map(|&number| Self::page_text(&pdf, number))
            .collect::<Result<Vec<_>>>()?;
        Ok((numbers.len(), pages))
    }
}

#[async_trait]
impl PageExtractor for PdfPages {
    fn supports(&self, mime: &str) -> bool {
        super::mime::essence(mime) == "application/pdf"
    }

    fn page_count(&self, document: &[u8]) -> Result<usize> {
        Ok(Self::page_numbers(&Self::load(document)?).len())
    }

    async fn extract_page(&self, document: &[u8], index: usize) -> Result<String> {
        let bytes = document.to_vec();
        tokio::task::spawn_blocking(move || {
            let pdf = Self::load(&bytes)?;
            let number = Self::page_numbers(&pdf)
                .get(index)
                .copied()
                .ok_or_else(|| Error::Extraction(format!("Page {} does not exist", index + 1)))?;
            Self::page_text(&pdf, number)
        })
        .await
        .map_err(|e| Error::Extraction(format!("PDF extraction task failed: {}", e)))?
    }

    async fn extract_leading(
        &self,
        document: &[u8],
        max_pages: usize,
    ) -> Result<(usize, Vec<String>)> {
        let bytes = document.to_vec();
        tokio::task::spawn_blocking(move || Self::extract_blocking(&bytes, max_pages))
            .await
            .map_err(|e| Error::Extraction(format!("PDF extraction task failed: {}", e)))?
    }
}

#[cfg(test)]
mod test_support {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// A PDF whose page `n` shows the text `Chapter{n}`.
    pub fn sample_pdf(pages: usize) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for n in 1..=pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(format!("Chapter{}", n))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    pub fn to_bytes(mut doc: Document) -> Vec<u8> {
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{sample_pdf, to_bytes};
    use super::*;
    use crate::input::document::extract_pages;
    use lopdf::{dictionary, Object};

    #[tokio::test]
    async fn test_ten_page_pdf_capped_at_five() {
        let bytes = to_bytes(sample_pdf(10));

        let text = extract_pages(&PdfPages, &bytes, 5).await.unwrap();

        for n in 1..=5 {
            assert!(text.contains(&format!("--- Page {} ---", n)));
            assert!(text.contains(&format!("Chapter{}", n)));
        }
        assert!(!text.contains("--- Page 6 ---"));
        assert!(!text.contains("Chapter6"));
    }

    #[test]
    fn test_page_count() {
        let bytes = to_bytes(sample_pdf(3));
        assert_eq!(PdfPages.page_count(&bytes).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_single_page_lookup() {
        let bytes = to_bytes(sample_pdf(3));
        let page = PdfPages.extract_page(&bytes, 1).await.unwrap();
        assert!(page.contains("Chapter2"));

        let err = PdfPages.extract_page(&bytes, 3).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[tokio::test]
    async fn test_encrypted_pdf_is_extraction_error() {
        let mut doc = sample_pdf(2);
        doc.trailer.set(
            "Encrypt",
            dictionary! {
                "Filter" => "Standard",
                "V" => 1,
                "R" => 2,
                "O" => Object::string_literal(vec![0u8; 32]),
                "U" => Object::string_literal(vec![0u8; 32]),
                "P" => -4,
            },
        );
        let bytes = to_bytes(doc);

        let err = extract_pages(&PdfPages, &bytes, 20).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[tokio::test]
    async fn test_garbage_is_extraction_error() {
        let err = extract_pages(&PdfPages, b"%PDF-1.5 not really", 20)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn test_supports_pdf_only() {
        assert!(PdfPages.supports("application/pdf"));
        assert!(!PdfPages.supports("text/plain"));
    }
}
