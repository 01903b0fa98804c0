//! Per-format text extraction with OCR fallback

use std::collections::HashMap;
use std::io::Read;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::config::OcrConfig;
use crate::error::{Error, Result};
use crate::types::{FileType, SourceFile};

use super::ocr::{join_ocr_pages, OcrEngine};

/// How long pdf-extract may run before the text layer is given up on
const PDF_EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

/// Decodes one file format into raw text
pub trait FormatExtractor: Send + Sync {
    /// Extract text from the file bytes; `name` is used in errors and logs
    fn extract(&self, name: &str, data: &[u8]) -> Result<String>;

    /// Decoder name for logging
    fn name(&self) -> &'static str;
}

/// Text extractor dispatching on file type through a lookup table
pub struct TextExtractor {
    decoders: HashMap<FileType, Box<dyn FormatExtractor>>,
}

impl TextExtractor {
    /// Build the decoder table for every supported format
    pub fn new(ocr_config: OcrConfig) -> Self {
        let min_text_chars = ocr_config.min_text_chars;
        let ocr = OcrEngine::new(ocr_config);

        let mut decoders: HashMap<FileType, Box<dyn FormatExtractor>> = HashMap::new();
        decoders.insert(
            FileType::Pdf,
            Box::new(PdfExtractor {
                ocr: ocr.clone(),
                min_text_chars,
            }),
        );
        decoders.insert(FileType::Docx, Box::new(DocxExtractor));
        decoders.insert(FileType::Pptx, Box::new(PptxExtractor));
        decoders.insert(FileType::Txt, Box::new(PlainTextExtractor));
        decoders.insert(FileType::Image, Box::new(ImageExtractor { ocr }));

        Self { decoders }
    }

    /// Read a source file and extract its text
    pub fn extract(&self, file: &SourceFile) -> Result<String> {
        let name = file.display_path();
        let data = std::fs::read(&file.path)
            .map_err(|e| Error::extraction(&name, format!("Failed to read file: {}", e)))?;

        self.extract_bytes(file.file_type, &name, &data)
    }

    /// Extract text from in-memory bytes of a known type
    pub fn extract_bytes(&self, file_type: FileType, name: &str, data: &[u8]) -> Result<String> {
        let decoder = self
            .decoders
            .get(&file_type)
            .ok_or_else(|| Error::UnsupportedFileType(format!("{:?} ({})", file_type, name)))?;

        tracing::debug!("[{}] Extracting with {} decoder", name, decoder.name());

        decoder.extract(name, data).map_err(|e| match e {
            Error::Extraction { message, .. } => Error::extraction(name, message),
            other => Error::extraction(name, other.to_string()),
        })
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new(OcrConfig::default())
    }
}

/// PDF: text layer page by page, OCR when the layer is missing
struct PdfExtractor {
    ocr: OcrEngine,
    min_text_chars: usize,
}

impl FormatExtractor for PdfExtractor {
    fn extract(&self, name: &str, data: &[u8]) -> Result<String> {
        match extract_pdf_text_layer(name, data) {
            Ok(text) => {
                if text.trim().chars().count() >= self.min_text_chars {
                    return Ok(text);
                }

                tracing::info!(
                    "[{}] Text layer has {} characters, trying OCR",
                    name,
                    text.trim().chars().count()
                );
                match self.ocr.pdf_to_pages(data) {
                    Ok(pages) if pages.iter().any(|p| !p.trim().is_empty()) => {
                        Ok(join_ocr_pages(&pages))
                    }
                    Ok(_) => {
                        tracing::warn!("[{}] OCR produced no text", name);
                        Ok(text)
                    }
                    Err(e) => {
                        tracing::warn!("[{}] PDF OCR failed: {}", name, e);
                        Ok(text)
                    }
                }
            }
            Err(primary) => {
                tracing::error!("[{}] PDF extraction failed: {}", name, primary);
                match self.ocr.pdf_to_pages(data) {
                    Ok(pages) if pages.iter().any(|p| !p.trim().is_empty()) => {
                        Ok(join_ocr_pages(&pages))
                    }
                    Ok(_) => Err(primary),
                    Err(ocr_error) => {
                        tracing::error!("[{}] PDF OCR also failed: {}", name, ocr_error);
                        Err(primary)
                    }
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "pdf"
    }
}

/// Extract the embedded text layer, one page at a time
fn extract_pdf_text_layer(name: &str, data: &[u8]) -> Result<String> {
    let doc = match lopdf::Document::load_mem(data) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!("[{}] lopdf could not load PDF: {}, trying pdf-extract", name, e);
            let text = extract_pdf_with_timeout(name, data)?;
            return Ok(cleanup_pdf_text(&text));
        }
    };

    let mut text = String::new();
    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                tracing::debug!("[{}] Could not extract text from page {}: {}", name, page_number, e);
            }
        }
    }

    Ok(cleanup_pdf_text(&text))
}

/// Whole-document extraction with pdf-extract on a watchdog thread
fn extract_pdf_with_timeout(name: &str, data: &[u8]) -> Result<String> {
    let data_vec = data.to_vec();
    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        let result = pdf_extract::extract_text_from_mem(&data_vec);
        let _ = tx.send(result.map_err(|e| e.to_string()));
    });

    match rx.recv_timeout(PDF_EXTRACT_TIMEOUT) {
        Ok(Ok(text)) => {
            let _ = handle.join();
            Ok(text)
        }
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(Error::extraction(name, format!("Failed to load PDF: {}", e)))
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            // The thread cannot be killed; it is left to finish on its own
            Err(Error::extraction(
                name,
                format!("PDF extraction timeout after {}s", PDF_EXTRACT_TIMEOUT.as_secs()),
            ))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(Error::extraction(name, "PDF extraction thread crashed"))
        }
    }
}

/// Normalize ligatures, quotes and stray control characters from PDF text
fn cleanup_pdf_text(text: &str) -> String {
    text.replace('\0', "")
        .replace('\u{00A0}', " ")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// DOCX: paragraphs first, then table cells
struct DocxExtractor;

impl FormatExtractor for DocxExtractor {
    fn extract(&self, name: &str, data: &[u8]) -> Result<String> {
        let docx = docx_rs::read_docx(data).map_err(|e| Error::extraction(name, e.to_string()))?;

        let mut text = String::new();
        let mut tables = Vec::new();

        for child in &docx.document.children {
            match child {
                docx_rs::DocumentChild::Paragraph(p) => {
                    let paragraph = docx_paragraph_text(p);
                    if !paragraph.trim().is_empty() {
                        text.push_str(&paragraph);
                        text.push('\n');
                    }
                }
                docx_rs::DocumentChild::Table(table) => tables.push(table),
                _ => {}
            }
        }

        for table in tables {
            for cell in docx_table_cells(table) {
                if !cell.trim().is_empty() {
                    text.push_str(&cell);
                    text.push('\n');
                }
            }
        }

        Ok(text)
    }

    fn name(&self) -> &'static str {
        "docx"
    }
}

fn docx_paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    push_paragraph_children(&paragraph.children, &mut text);
    text
}

fn push_paragraph_children(children: &[docx_rs::ParagraphChild], text: &mut String) {
    for child in children {
        match child {
            docx_rs::ParagraphChild::Run(run) => {
                for run_child in &run.children {
                    match run_child {
                        docx_rs::RunChild::Text(t) => text.push_str(&t.text),
                        docx_rs::RunChild::Tab(_) => text.push('\t'),
                        _ => {}
                    }
                }
            }
            docx_rs::ParagraphChild::Hyperlink(link) => push_paragraph_children(&link.children, text),
            _ => {}
        }
    }
}

/// Cell texts in row-major order; a cell's paragraphs are joined by newlines
#[allow(irrefutable_let_patterns)]
fn docx_table_cells(table: &docx_rs::Table) -> Vec<String> {
    let mut cells = Vec::new();
    for row in &table.rows {
        let docx_rs::TableChild::TableRow(row) = row;
        for cell in &row.cells {
            let docx_rs::TableRowChild::TableCell(cell) = cell;
            let paragraphs: Vec<String> = cell
                .children
                .iter()
                .filter_map(|content| match content {
                    docx_rs::TableCellContent::Paragraph(p) => Some(docx_paragraph_text(p)),
                    _ => None,
                })
                .collect();
            cells.push(paragraphs.join("\n"));
        }
    }
    cells
}

/// PPTX: shape text per slide under a slide header
struct PptxExtractor;

impl FormatExtractor for PptxExtractor {
    fn extract(&self, name: &str, data: &[u8]) -> Result<String> {
        let cursor = std::io::Cursor::new(data);
        let mut archive =
            zip::ZipArchive::new(cursor).map_err(|e| Error::extraction(name, e.to_string()))?;

        // ppt/slides/slide1.xml, slide2.xml, ... sorted by number
        let mut slides: Vec<(u32, String)> = archive
            .file_names()
            .filter_map(|file_name| {
                let number = file_name
                    .strip_prefix("ppt/slides/slide")?
                    .strip_suffix(".xml")?
                    .parse::<u32>()
                    .ok()?;
                Some((number, file_name.to_string()))
            })
            .collect();
        slides.sort_by_key(|(number, _)| *number);

        let mut text = String::new();
        for (index, (_, slide_name)) in slides.iter().enumerate() {
            let mut xml = String::new();
            archive
                .by_name(slide_name)
                .map_err(|e| Error::extraction(name, e.to_string()))?
                .read_to_string(&mut xml)
                .map_err(|e| Error::extraction(name, format!("{}: {}", slide_name, e)))?;

            text.push_str(&format!("Slide {}:\n", index + 1));
            for shape in pptx_shape_texts(&xml)
                .map_err(|e| Error::extraction(name, format!("{}: {}", slide_name, e)))?
            {
                text.push_str(&shape);
                text.push('\n');
            }
            text.push('\n');
        }

        Ok(text)
    }

    fn name(&self) -> &'static str {
        "pptx"
    }
}

/// Text of every non-blank shape in a slide, in document order
fn pptx_shape_texts(xml: &str) -> std::result::Result<Vec<String>, quick_xml::Error> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);

    let mut shapes = Vec::new();
    let mut shape_depth = 0usize;
    let mut paragraphs: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut in_paragraph = false;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"sp" => {
                    if shape_depth == 0 {
                        paragraphs.clear();
                    }
                    shape_depth += 1;
                }
                b"p" if shape_depth > 0 => {
                    in_paragraph = true;
                    paragraph.clear();
                }
                b"t" if in_paragraph => in_text = true,
                _ => {}
            },
            Event::Empty(e) => {
                if in_paragraph && e.local_name().as_ref() == b"br" {
                    paragraph.push('\n');
                }
            }
            Event::Text(e) => {
                if in_text {
                    paragraph.push_str(&e.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if in_paragraph => {
                    in_paragraph = false;
                    paragraphs.push(std::mem::take(&mut paragraph));
                }
                b"sp" if shape_depth > 0 => {
                    shape_depth -= 1;
                    if shape_depth == 0 {
                        let shape = paragraphs.join("\n");
                        paragraphs.clear();
                        if !shape.trim().is_empty() {
                            shapes.push(shape);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(shapes)
}

/// TXT: UTF-8 with undecodable sequences dropped
struct PlainTextExtractor;

impl FormatExtractor for PlainTextExtractor {
    fn extract(&self, _name: &str, data: &[u8]) -> Result<String> {
        Ok(decode_utf8_ignoring_invalid(data))
    }

    fn name(&self) -> &'static str {
        "txt"
    }
}

fn decode_utf8_ignoring_invalid(mut data: &[u8]) -> String {
    let mut text = String::with_capacity(data.len());
    loop {
        match std::str::from_utf8(data) {
            Ok(valid) => {
                text.push_str(valid);
                return text;
            }
            Err(e) => {
                let (valid, rest) = data.split_at(e.valid_up_to());
                text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let skip = e.error_len().unwrap_or(rest.len());
                data = &rest[skip..];
            }
        }
    }
}

/// Images: OCR only
struct ImageExtractor {
    ocr: OcrEngine,
}

impl FormatExtractor for ImageExtractor {
    fn extract(&self, name: &str, data: &[u8]) -> Result<String> {
        let extension = name.rsplit('.').next().unwrap_or("png").to_lowercase();
        self.ocr.image_to_text(data, &extension)
    }

    fn name(&self) -> &'static str {
        "image"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_ocr() -> TextExtractor {
        TextExtractor::new(OcrConfig {
            enabled: false,
            ..OcrConfig::default()
        })
    }

    fn build_pdf(text: &str) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn build_pptx(slides: &[&str]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            // Written out of order to check numeric sorting
            for (i, body) in slides.iter().enumerate().rev() {
                zip.start_file(format!("ppt/slides/slide{}.xml", i + 1), options)
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.start_file("ppt/slides/_rels/slide1.xml.rels", options).unwrap();
            zip.write_all(b"<Relationships/>").unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    fn slide(shapes: &[&[&str]]) -> String {
        let mut xml = String::from(
            r#"<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree>"#,
        );
        for paragraphs in shapes {
            xml.push_str("<p:sp><p:txBody>");
            for p in *paragraphs {
                xml.push_str(&format!("<a:p><a:r><a:t>{}</a:t></a:r></a:p>", p));
            }
            xml.push_str("</p:txBody></p:sp>");
        }
        xml.push_str("</p:spTree></p:cSld></p:sld>");
        xml
    }

    #[test]
    fn test_txt_drops_invalid_bytes() {
        let extractor = no_ocr();
        let data = b"caf\xc3\xa9 \xff\xfebar\xc3";
        let text = extractor.extract_bytes(FileType::Txt, "a.txt", data).unwrap();
        assert_eq!(text, "café bar");
    }

    #[test]
    fn test_pdf_text_layer() {
        let extractor = no_ocr();
        let pdf = build_pdf("Hello from the text layer");
        let text = extractor.extract_bytes(FileType::Pdf, "hello.pdf", &pdf).unwrap();
        assert!(text.contains("Hello"), "got {:?}", text);
    }

    #[test]
    fn test_corrupt_pdf_fails() {
        let extractor = no_ocr();
        let err = extractor
            .extract_bytes(FileType::Pdf, "broken.pdf", b"%PDF-1.4 this is not a pdf")
            .unwrap_err();
        match err {
            Error::Extraction { path, .. } => assert_eq!(path, "broken.pdf"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_docx_paragraphs_then_tables() {
        use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};

        let table = Table::new(vec![TableRow::new(vec![
            TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text("Cell A"))),
            TableCell::new(),
            TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text("Cell B"))),
        ])]);

        let mut buf = std::io::Cursor::new(Vec::new());
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Title")))
            .add_table(table)
            .add_paragraph(Paragraph::new())
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Body text")))
            .build()
            .pack(&mut buf)
            .unwrap();

        let extractor = no_ocr();
        let text = extractor
            .extract_bytes(FileType::Docx, "doc.docx", buf.get_ref())
            .unwrap();
        assert_eq!(text, "Title\nBody text\nCell A\nCell B\n");
    }

    #[test]
    fn test_pptx_slides_in_order() {
        let slide1 = slide(&[&["Welcome"], &["Line one", "Line two"]]);
        let slide2 = slide(&[&["  "], &["Q&amp;A"]]);
        let pptx = build_pptx(&[&slide1, &slide2]);

        let extractor = no_ocr();
        let text = extractor.extract_bytes(FileType::Pptx, "deck.pptx", &pptx).unwrap();
        assert_eq!(
            text,
            "Slide 1:\nWelcome\nLine one\nLine two\n\nSlide 2:\nQ&A\n\n"
        );
    }

    #[test]
    fn test_corrupt_pptx_fails() {
        let extractor = no_ocr();
        assert!(matches!(
            extractor.extract_bytes(FileType::Pptx, "deck.pptx", b"not a zip"),
            Err(Error::Extraction { .. })
        ));
    }

    #[test]
    fn test_image_without_ocr_fails() {
        let extractor = no_ocr();
        assert!(matches!(
            extractor.extract_bytes(FileType::Image, "scan.png", b"\x89PNG"),
            Err(Error::Extraction { .. })
        ));
    }

    #[test]
    fn test_extract_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Line one\nLine two").unwrap();
        let source = SourceFile::from_path(&path).unwrap();

        let text = no_ocr().extract(&source).unwrap();
        assert_eq!(text, "Line one\nLine two");
    }

    #[test]
    fn test_cleanup_pdf_text() {
        let cleaned = cleanup_pdf_text("  \u{FB01}le\0 \n\n \u{201C}quoted\u{201D}  ");
        assert_eq!(cleaned, "file\n\"quoted\"");
    }
}
