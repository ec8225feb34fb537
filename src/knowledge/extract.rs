use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

const WORD_BODY_PART: &str = "word/document.xml";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    Word,
    Pdf,
}

impl DocumentKind {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Word => "Word",
            DocumentKind::Pdf => "PDF",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Supported(DocumentKind),
    /// Recognized but not readable, e.g. legacy binary `.doc`.
    Unsupported,
    Ignored,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid Word container: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("malformed Word XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("unreadable PDF: {0}")]
    Pdf(#[from] lopdf::Error),
}

pub fn classify(path: &Path) -> Classification {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("docx") => Classification::Supported(DocumentKind::Word),
        Some("pdf") => Classification::Supported(DocumentKind::Pdf),
        Some("doc") => Classification::Unsupported,
        _ => Classification::Ignored,
    }
}

pub fn extract(path: &Path, kind: DocumentKind) -> Result<String, ExtractError> {
    match kind {
        DocumentKind::Word => extract_word(path),
        DocumentKind::Pdf => extract_pdf(path),
    }
}

/// Non-blank paragraphs of the document body, newline separated.
fn extract_word(path: &Path) -> Result<String, ExtractError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

    let mut xml = String::new();
    archive.by_name(WORD_BODY_PART)?.read_to_string(&mut xml)?;

    let paragraphs = word_paragraphs(&xml)?;
    Ok(paragraphs
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Paragraph texts in document order. Paragraphs nested in text boxes are emitted after the
/// paragraph that anchors them; `mc:Fallback` copies of alternate content are skipped.
fn word_paragraphs(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    // Open paragraphs, innermost last
    let mut open: Vec<String> = Vec::new();
    // Closed text-box paragraphs waiting for their anchor paragraph to close
    let mut nested: Vec<String> = Vec::new();
    let mut in_text = false;
    let mut fallback_depth = 0usize;

    loop {
        let event = reader.read_event()?;

        if fallback_depth > 0 {
            match &event {
                Event::Start(e) if e.local_name().as_ref() == b"Fallback" => fallback_depth += 1,
                Event::End(e) if e.local_name().as_ref() == b"Fallback" => fallback_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => open.push(String::new()),
                b"t" => in_text = true,
                b"Fallback" => fallback_depth = 1,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => {
                    if let Some(current) = open.last_mut() {
                        current.push('\t');
                    }
                }
                b"br" | b"cr" => {
                    if let Some(current) = open.last_mut() {
                        current.push('\n');
                    }
                }
                b"p" => close_paragraph(String::new(), &open, &mut paragraphs, &mut nested),
                _ => {}
            },
            Event::Text(e) if in_text => {
                if let Some(current) = open.last_mut() {
                    current.push_str(&e.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(current) = open.pop() {
                        close_paragraph(current, &open, &mut paragraphs, &mut nested);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

fn close_paragraph(
    text: String,
    open: &[String],
    paragraphs: &mut Vec<String>,
    nested: &mut Vec<String>,
) {
    if open.is_empty() {
        paragraphs.push(text);
        paragraphs.append(nested);
    } else {
        nested.push(text);
    }
}

/// Page texts in page order; pages without extractable text contribute nothing.
fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    let document = lopdf::Document::load(path)?;
    let mut text = String::new();

    for page_number in document.get_pages().keys() {
        match document.extract_text(&[*page_number]) {
            Ok(page_text) if !page_text.trim().is_empty() => {
                text.push_str(page_text.trim_end());
                text.push('\n');
            }
            Ok(_) => {}
            Err(e) => debug!("No text on page {} of {}: {}", page_number, path.display(), e),
        }
    }

    Ok(text)
}
