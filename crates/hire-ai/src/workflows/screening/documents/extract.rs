
use tracing::{debug, warn};

use super::policy::DocumentFormat;

/// Failure classes of text extraction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),
}

const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
const MIN_LEGACY_RUN: usize = 4;

/// Stateless converter from document bytes to plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(
        &self,
        bytes: &[u8],
        extension: &str,
        content_type: &str,
    ) -> Result<String, ExtractionError> {
        let format = DocumentFormat::detect(extension, content_type).ok_or_else(|| {
            ExtractionError::UnsupportedFormat(if extension.is_empty() {
                content_type.to_string()
            } else {
                format!(".{extension}")
            })
        })?;

        self.extract_format(bytes, format)
    }

    pub fn extract_format(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<String, ExtractionError> {
        let raw = match format {
            DocumentFormat::Pdf => pdf_text(bytes)?,
            DocumentFormat::Docx => docx_text(bytes)?,
            DocumentFormat::Doc => legacy_doc_text(bytes)?,
            DocumentFormat::PlainText => plain_text(bytes)?,
        };

        let text = normalize_whitespace(&raw);
        if text.is_empty() {
            return Err(ExtractionError::ExtractionFailed(
                "document contains no extractable text".to_string(),
            ));
        }

        debug!(?format, chars = text.chars().count(), "extracted document text");
        Ok(text)
    }
}

fn failed(err: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::ExtractionFailed(err.to_string())
}

fn pdf_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let document = lopdf::Document::load_mem(bytes).map_err(failed)?;
    if document.is_encrypted() {
        return Err(ExtractionError::ExtractionFailed(
            "PDF is encrypted".to_string(),
        ));
    }

    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return Err(ExtractionError::ExtractionFailed(
            "PDF has no pages".to_string(),
        ));
    }

    let mut text = String::new();
    for page in pages {
        match document.extract_text(&[page]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(err) => warn!(page, error = %err, "skipping unreadable PDF page"),
        }
    }
    Ok(text)
}

fn docx_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let docx = docx_rs::read_docx(bytes).map_err(failed)?;

    let mut text = String::new();
    for child in &docx.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(paragraph) => {
                push_paragraph(&mut text, paragraph);
            }
            docx_rs::DocumentChild::Table(table) => push_table(&mut text, table),
            _ => {}
        }
    }
    Ok(text)
}

fn push_paragraph(out: &mut String, paragraph: &docx_rs::Paragraph) {
    for child in &paragraph.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                match run_child {
                    docx_rs::RunChild::Text(text) => out.push_str(&text.text),
                    docx_rs::RunChild::Tab(_) => out.push('\t'),
                    docx_rs::RunChild::Break(_) => out.push('\n'),
                    _ => {}
                }
            }
        }
    }
    out.push('\n');
}

fn push_table(out: &mut String, table: &docx_rs::Table) {
    for docx_rs::TableChild::TableRow(row) in &table.rows {
        for docx_rs::TableRowChild::TableCell(cell) in &row.cells {
            for content in &cell.children {
                if let docx_rs::TableCellContent::Paragraph(paragraph) = content {
                    push_paragraph(out, paragraph);
                }
            }
        }
    }
}

/// Binary Word files keep their body as UTF-16LE runs inside an OLE container;
/// only runs with at least a few alphanumeric characters are kept.
fn legacy_doc_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    if !bytes.starts_with(&OLE_SIGNATURE) {
        return Err(ExtractionError::ExtractionFailed(
            "not a Word 97-2003 document".to_string(),
        ));
    }

    let mut text = String::new();
    let mut run = String::new();
    for pair in bytes[OLE_SIGNATURE.len()..].chunks_exact(2) {
        let unit = u16::from_le_bytes([pair[0], pair[1]]);
        match char::from_u32(u32::from(unit)) {
            Some(ch) if is_legacy_text_char(ch) => run.push(ch),
            _ => flush_run(&mut text, &mut run),
        }
    }
    flush_run(&mut text, &mut run);
    Ok(text)
}

fn is_legacy_text_char(ch: char) -> bool {
    ch == '\r' || ch == '\n' || ch == '\t' || (!ch.is_control() && ch != '\u{FFFD}')
}

fn flush_run(text: &mut String, run: &mut String) {
    if run.chars().filter(|ch| ch.is_alphanumeric()).count() >= MIN_LEGACY_RUN {
        text.push_str(run);
        text.push('\n');
    }
    run.clear();
}

fn plain_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let body = bytes.strip_prefix(&UTF8_BOM).unwrap_or(bytes);
    std::str::from_utf8(body)
        .map(str::to_string)
        .map_err(|err| ExtractionError::ExtractionFailed(format!("text is not valid UTF-8: {err}")))
}

/// Collapse horizontal whitespace, trim lines, and keep at most one blank line in a row.
pub(crate) fn normalize_whitespace(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0;

    for line in raw.replace("\r\n", "\n").replace('\r', "\n").lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run == 1 && !lines.is_empty() {
                lines.push(String::new());
            }
        } else {
            blank_run = 0;
            lines.push(collapsed);
        }
    }

    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Build a minimal DOCX with one run per paragraph.
#[cfg(test)]
pub(crate) fn docx_from_paragraphs(paragraphs: &[&str]) -> Result<Vec<u8>, ExtractionError> {
    let mut docx = docx_rs::Docx::new();
    for paragraph in paragraphs {
        docx = docx.add_paragraph(
            docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text(*paragraph)),
        );
    }

    let mut buffer = std::io::Cursor::new(Vec::new());
    docx.build().pack(&mut buffer).map_err(failed)?;
    Ok(buffer.into_inner())
}
