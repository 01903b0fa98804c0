//! OCR through local tools (pdftoppm + tesseract)
//!
//! Used for images and as the fallback for PDFs without a usable text layer.

use std::path::Path;
use std::process::Command;

use crate::config::OcrConfig;
use crate::error::{Error, Result};
use crate::types::FileType;

/// Tesseract-backed OCR engine
#[derive(Debug, Clone)]
pub struct OcrEngine {
    config: OcrConfig,
}

impl OcrEngine {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    /// Whether OCR is enabled in configuration
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Check if tesseract OCR is available
    pub fn has_tesseract() -> bool {
        Command::new("tesseract")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Check if pdftoppm is available (for rasterizing PDF pages)
    pub fn has_pdftoppm() -> bool {
        Command::new("pdftoppm")
            .arg("-v")
            .output()
            .map(|_| true) // pdftoppm -v prints to stderr, existence is enough
            .unwrap_or(false)
    }

    /// Extract text from an image
    pub fn image_to_text(&self, data: &[u8], extension: &str) -> Result<String> {
        if !self.config.enabled {
            return Err(ocr_error("OCR is disabled"));
        }
        if !Self::has_tesseract() {
            return Err(missing_tools(FileType::Image));
        }

        let temp_dir = tempfile::Builder::new().prefix("doc-ingest-img-ocr-").tempdir()?;
        let image_path = temp_dir.path().join(format!("input.{}", extension.trim_start_matches('.')));
        std::fs::write(&image_path, data)?;

        let text = self.run_tesseract(&image_path)?;
        tracing::info!("Image OCR extracted {} characters", text.len());
        Ok(text)
    }

    /// Rasterize every PDF page and OCR it, returning text per page in order
    pub fn pdf_to_pages(&self, data: &[u8]) -> Result<Vec<String>> {
        if !self.config.enabled {
            return Err(ocr_error("OCR is disabled"));
        }
        if !Self::has_pdftoppm() || !Self::has_tesseract() {
            return Err(missing_tools(FileType::Pdf));
        }

        let temp_dir = tempfile::Builder::new().prefix("doc-ingest-ocr-").tempdir()?;
        let pdf_path = temp_dir.path().join("input.pdf");
        std::fs::write(&pdf_path, data)?;

        let prefix = temp_dir.path().join("page");
        let output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(self.config.dpi.to_string())
            .arg(&pdf_path)
            .arg(&prefix)
            .output()
            .map_err(|e| ocr_error(format!("pdftoppm failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ocr_error(format!("pdftoppm error: {}", stderr.trim())));
        }

        let mut page_images: Vec<_> = std::fs::read_dir(temp_dir.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();

        // pdftoppm zero-pads page numbers, so lexical order is page order
        page_images.sort();

        if page_images.is_empty() {
            return Err(ocr_error("pdftoppm produced no images"));
        }

        let mut pages = Vec::with_capacity(page_images.len());
        for (i, image_path) in page_images.iter().enumerate() {
            tracing::info!("OCR processing page {}/{}", i + 1, page_images.len());
            pages.push(self.run_tesseract(image_path)?);
        }

        Ok(pages)
    }

    fn run_tesseract(&self, image_path: &Path) -> Result<String> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language)
            .output()
            .map_err(|e| ocr_error(format!("tesseract failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ocr_error(format!("tesseract error: {}", stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Join per-page OCR output with page markers
pub fn join_ocr_pages(pages: &[String]) -> String {
    let mut text = String::new();
    for (i, page) in pages.iter().enumerate() {
        text.push_str(&format!("Page {}:\n{}\n\n", i + 1, page));
    }
    text
}

fn ocr_error(message: impl Into<String>) -> Error {
    Error::extraction("ocr", message)
}

fn missing_tools(file_type: FileType) -> Error {
    match file_type.required_tools() {
        Some(tools) => ocr_error(format!("{} OCR requires {}", file_type.display_name(), tools)),
        None => ocr_error("OCR tools are not installed"),
    }
}
