// src/ocr.rs

use crate::config::OcrSection;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Renders PDF pages with `pdftoppm` and reads them back with `tesseract`.
#[derive(Debug, Clone)]
pub struct OcrEngine {
    pdftoppm_path: String,
    tesseract_path: String,
    dpi: u32,
    language: String,
}

impl OcrEngine {
    pub fn new(cfg: &OcrSection) -> Self {
        Self {
            pdftoppm_path: cfg.pdftoppm_path.clone(),
            tesseract_path: cfg.tesseract_path.clone(),
            dpi: cfg.dpi,
            language: cfg.language.clone(),
        }
    }

    /// Both binaries answer a version query.
    pub async fn is_available(&self) -> bool {
        let pdftoppm = Command::new(&self.pdftoppm_path).arg("-v").output().await.is_ok();
        let tesseract = Command::new(&self.tesseract_path)
            .arg("--version")
            .output()
            .await
            .is_ok();

        if !pdftoppm {
            debug!(path = %self.pdftoppm_path, "pdftoppm not found");
        }
        if !tesseract {
            debug!(path = %self.tesseract_path, "tesseract not found");
        }
        pdftoppm && tesseract
    }

    /// OCR every page of the PDF. One string per page, in page order.
    pub async fn ocr_pdf(&self, pdf_bytes: &[u8]) -> Result<Vec<String>> {
        let scratch = tempfile::tempdir()?;
        let pdf_path = scratch.path().join("document.pdf");
        tokio::fs::write(&pdf_path, pdf_bytes).await?;

        let prefix = scratch.path().join("page");
        let rendered = Command::new(&self.pdftoppm_path)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(&pdf_path)
            .arg(&prefix)
            .output()
            .await
            .map_err(|e| Error::Ocr(format!("failed to run {}: {e}", self.pdftoppm_path)))?;

        if !rendered.status.success() {
            let stderr = String::from_utf8_lossy(&rendered.stderr);
            return Err(Error::Ocr(format!("pdftoppm failed: {}", stderr.trim())));
        }

        let images = page_images(scratch.path())?;
        if images.is_empty() {
            return Err(Error::Ocr("pdftoppm produced no images".to_string()));
        }
        info!(pages = images.len(), dpi = self.dpi, lang = %self.language, "Rendered pages for OCR");

        let mut pages = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            pages.push(self.ocr_image(image, i + 1).await?);
        }
        Ok(pages)
    }

    async fn ocr_image(&self, image: &Path, page: usize) -> Result<String> {
        let output = Command::new(&self.tesseract_path)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .await
            .map_err(|e| Error::Ocr(format!("failed to run {} on page {page}: {e}", self.tesseract_path)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(page, stderr = %stderr.trim(), "tesseract reported an error");
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// PNGs written by pdftoppm. Its page suffixes share one zero-padded
/// width, so a lexical sort is page order.
fn page_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "png"))
        .collect();
    images.sort();
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(pdftoppm: &str, tesseract: &str) -> OcrEngine {
        OcrEngine::new(&OcrSection {
            pdftoppm_path: pdftoppm.to_string(),
            tesseract_path: tesseract.to_string(),
            ..OcrSection::default()
        })
    }

    #[test]
    fn test_page_images_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-03.png", "page-01.png", "document.pdf", "page-02.png"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let images = page_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page-01.png", "page-02.png", "page-03.png"]);
    }

    #[tokio::test]
    async fn test_missing_pdftoppm_is_ocr_error() {
        let engine = engine_with("/nonexistent/bin/pdftoppm", "/nonexistent/bin/tesseract");
        let result = engine.ocr_pdf(b"%PDF-1.5").await;
        assert!(matches!(result, Err(Error::Ocr(_))));
    }

    #[tokio::test]
    async fn test_missing_tools_are_unavailable() {
        let engine = engine_with("/nonexistent/bin/pdftoppm", "/nonexistent/bin/tesseract");
        assert!(!engine.is_available().await);
    }
}
