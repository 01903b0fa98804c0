//! Text extraction, OCR fallback and chunking

mod chunker;
mod extractor;
mod ocr;

pub use chunker::TextChunker;
pub use extractor::{FormatExtractor, TextExtractor};
pub use ocr::{join_ocr_pages, OcrEngine};
