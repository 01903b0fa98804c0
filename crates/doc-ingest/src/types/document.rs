//! Source file and chunk types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Supported file types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// PDF document (text layer, OCR fallback)
    Pdf,
    /// Microsoft Word document (.docx)
    Docx,
    /// Microsoft PowerPoint presentation (.pptx)
    Pptx,
    /// Plain text file
    Txt,
    /// Image (jpg/jpeg/png) - requires tesseract
    Image,
}

impl FileType {
    /// Detect file type from extension (case-insensitive, leading dot allowed)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "txt" => Some(Self::Txt),
            "jpg" | "jpeg" | "png" => Some(Self::Image),
            _ => None,
        }
    }

    /// Detect file type from a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "Word Document (.docx)",
            Self::Pptx => "PowerPoint (.pptx)",
            Self::Txt => "Text File",
            Self::Image => "Image",
        }
    }

    /// External tools needed for OCR of this file type
    pub fn required_tools(&self) -> Option<&'static str> {
        match self {
            Self::Image => Some("tesseract OCR (apt install tesseract-ocr)"),
            Self::Pdf => Some("poppler-utils (pdftoppm) and tesseract for scanned PDFs"),
            _ => None,
        }
    }
}

/// A file discovered at the start of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Location on disk
    pub path: PathBuf,
    /// Type inferred from the extension
    pub file_type: FileType,
    /// Lowercase suffix including the dot, e.g. ".pdf"
    pub extension: String,
    /// File size in bytes
    pub size: u64,
}

impl SourceFile {
    /// Inspect a path on disk
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        let file_type = FileType::from_extension(&extension).ok_or_else(|| {
            Error::UnsupportedFileType(format!("{} ({})", extension, path.display()))
        })?;

        let metadata = std::fs::metadata(&path)
            .map_err(|e| Error::extraction(path.display().to_string(), format!("File not found: {}", e)))?;

        Ok(Self {
            path,
            file_type,
            extension: format!(".{}", extension),
            size: metadata.len(),
        })
    }

    /// File name without directories
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Path rendered for logs and payloads
    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    /// Metadata copied into every chunk of this file
    pub fn chunk_metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            filename: self.filename(),
            file_path: self.display_path(),
            file_type: self.extension.clone(),
            file_size: self.size,
        }
    }
}

/// Source metadata carried by each chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub filename: String,
    pub file_path: String,
    pub file_type: String,
    pub file_size: u64,
}

/// A bounded text segment of one source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Text content
    pub text: String,
    /// Zero-based position among sibling chunks
    pub chunk_index: usize,
    /// Number of chunks produced for the source
    pub total_chunks: usize,
    /// Source file metadata
    pub metadata: ChunkMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension(".docx"), Some(FileType::Docx));
        assert_eq!(FileType::from_extension("JPEG"), Some(FileType::Image));
        assert_eq!(FileType::from_extension("png"), Some(FileType::Image));
        assert_eq!(FileType::from_extension("doc"), None);
        assert_eq!(FileType::from_extension("xlsx"), None);
    }

    #[test]
    fn test_required_tools() {
        assert!(FileType::Image.required_tools().unwrap().contains("tesseract"));
        assert!(FileType::Pdf.required_tools().unwrap().contains("pdftoppm"));
        assert_eq!(FileType::Docx.required_tools(), None);
        assert_eq!(FileType::Txt.required_tools(), None);
    }

    #[test]
    fn test_source_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Notes.TXT");
        std::fs::write(&path, "hello").unwrap();

        let source = SourceFile::from_path(&path).unwrap();
        assert_eq!(source.file_type, FileType::Txt);
        assert_eq!(source.extension, ".txt");
        assert_eq!(source.size, 5);
        assert_eq!(source.filename(), "Notes.TXT");

        let meta = source.chunk_metadata();
        assert_eq!(meta.file_type, ".txt");
        assert_eq!(meta.file_size, 5);
    }

    #[test]
    fn test_source_file_rejects_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.xlsx");
        std::fs::write(&path, "x").unwrap();
        assert!(matches!(
            SourceFile::from_path(&path),
            Err(Error::UnsupportedFileType(_))
        ));
    }
}
