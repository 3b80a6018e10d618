// src/pdf_extract.rs

use crate::config::OcrMode;
use crate::error::{Error, Result};
use crate::ocr::OcrEngine;
use async_trait::async_trait;
use lopdf::Document;
use tracing::{info, warn};

/// Anything that turns an uploaded document into the text sent to the model.
#[async_trait]
pub trait TextSource: Send + Sync {
    async fn read_text(&self, name: &str, bytes: &[u8]) -> Result<String>;
}

/// Per-page text pulled from the PDF's text layer.
#[derive(Debug)]
pub struct PdfPages {
    pub pages: Vec<String>,
    /// The text layer is missing or too thin to trust.
    pub scanned: bool,
}

/// Minimum number of non-whitespace characters we expect from a
/// "real" text PDF. Below this threshold we treat it as scanned.
const MIN_TEXT_CHARS: usize = 30;

/// Parse the PDF and extract text for every page, in page order.
pub fn extract_pages(pdf_bytes: &[u8]) -> Result<PdfPages> {
    let doc = Document::load_mem(pdf_bytes).map_err(|e| Error::Pdf(e.to_string()))?;

    let image_only = looks_like_scanned(&doc);

    let mut pages: Vec<String> = doc
        .get_pages()
        .keys()
        .map(|&page_num| match doc.extract_text(&[page_num]) {
            Ok(text) => text,
            Err(e) => {
                warn!(page = page_num, error = %e, "Page text extraction failed");
                String::new()
            }
        })
        .collect();

    if pages.iter().all(|p| p.trim().is_empty()) {
        match pdf_extract::extract_text_from_mem(pdf_bytes) {
            Ok(text) if !text.trim().is_empty() => {
                info!(chars = text.len(), "Per-page extraction empty, using whole-document text");
                match pages.first_mut() {
                    Some(first) => *first = text,
                    None => pages.push(text),
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "pdf-extract failed, may be scanned or corrupted"),
        }
    }

    let meaningful = pages
        .iter()
        .flat_map(|p| p.chars())
        .filter(|c| !c.is_whitespace())
        .count();
    info!(pages = pages.len(), chars = meaningful, "Text layer extracted");

    Ok(PdfPages {
        scanned: image_only || meaningful < MIN_TEXT_CHARS,
        pages,
    })
}

/// Heuristic: inspect the PDF object tree for signs that every page
/// is just a single image with no text operators.
///
/// We look at each page's `Resources` dictionary. If a page has
/// XObject images but **no** Font resources, it's almost certainly
/// a scanned page.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false;
    }

    let mut image_only_pages = 0;

    for object_id in pages.values() {
        let Ok(page_obj) = doc.get_object(*object_id) else {
            continue;
        };
        let Ok(page_dict) = page_obj.as_dict() else {
            continue;
        };

        let resources = page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok());

        let non_empty = |key: &[u8]| {
            resources
                .and_then(|res| res.get(key).ok())
                .and_then(|o| doc.dereference(o).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok())
                .is_some_and(|d| !d.is_empty())
        };

        if non_empty(b"XObject") && !non_empty(b"Font") {
            image_only_pages += 1;
        }
    }

    let total = pages.len();
    let ratio = image_only_pages as f64 / total as f64;
    info!(
        total_pages = total,
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    // If ≥80% of pages are image-only, treat the whole PDF as scanned
    ratio >= 0.8
}

/// Join text-layer and OCR output page by page: `text + "\n" + ocr` per
/// page, pages separated by `"\n"`. Unequal page counts pad with "".
pub fn combine_pages(text_pages: &[String], ocr_pages: Option<&[String]>) -> String {
    let Some(ocr_pages) = ocr_pages else {
        return text_pages.join("\n");
    };

    let count = text_pages.len().max(ocr_pages.len());
    (0..count)
        .map(|i| {
            let text = text_pages.get(i).map(String::as_str).unwrap_or_default();
            let ocr = ocr_pages.get(i).map(String::as_str).unwrap_or_default();
            format!("{text}\n{ocr}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text layer plus OCR, as configured.
pub struct PdfReader {
    ocr: OcrEngine,
    mode: OcrMode,
}

impl PdfReader {
    pub fn new(ocr: OcrEngine, mode: OcrMode) -> Self {
        Self { ocr, mode }
    }
}

#[async_trait]
impl TextSource for PdfReader {
    async fn read_text(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let pdf = extract_pages(bytes)?;

        let run_ocr = match self.mode {
            OcrMode::Always => true,
            OcrMode::WhenScanned => pdf.scanned,
            OcrMode::Never => false,
        };

        let ocr_pages = if run_ocr {
            let pages = self.ocr.ocr_pdf(bytes).await?;
            info!(document = %name, pages = pages.len(), "OCR complete");
            Some(pages)
        } else {
            info!(document = %name, scanned = pdf.scanned, mode = ?self.mode, "Skipping OCR");
            None
        };

        Ok(combine_pages(&pdf.pages, ocr_pages.as_deref()))
    }
}
