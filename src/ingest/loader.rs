//! Document loaders
//!
//! Each supported file type is turned into one or more `LoadedDocument`s.
//! Paged and tabular formats keep a locator so answers can cite the page or
//! row a passage came from.

use crate::error::{BuzzbotError, Result};
use crate::index::Locator;
use docx_rs::{DocumentChild, FromXML, ParagraphChild, RunChild};
use std::fs;
use std::io::Read;
use std::path::Path;
use walkdir::WalkDir;

/// Extensions picked up during ingestion (lower case)
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["txt", "md", "csv", "docx", "pdf"];

/// Text extracted from a file, or from one page or row of it
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub text: String,
    pub source: String,
    pub locator: Option<Locator>,
}

impl LoadedDocument {
    fn new(text: String, path: &Path, locator: Option<Locator>) -> Self {
        Self {
            text,
            source: path.display().to_string(),
            locator,
        }
    }
}

/// Whether `path` has one of the supported extensions
pub fn is_supported(path: &Path) -> bool {
    extension(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Load every supported file below `dir`
///
/// Files are visited in name order. A file that fails to load is logged and
/// skipped; the remaining files are still returned.
pub fn load_directory(dir: &Path) -> Vec<LoadedDocument> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if !is_supported(path) {
            tracing::debug!(path = %path.display(), "Skipping unsupported file");
            continue;
        }
        match load_file(path) {
            Ok(mut loaded) => {
                tracing::debug!(path = %path.display(), documents = loaded.len(), "Loaded file");
                documents.append(&mut loaded);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to load file: {:#}", e);
            }
        }
    }

    documents
}

/// Load a single file according to its extension
pub fn load_file(path: &Path) -> Result<Vec<LoadedDocument>> {
    match extension(path).as_deref() {
        Some("txt") | Some("md") => load_text(path),
        Some("csv") => load_csv(path),
        Some("docx") => load_docx(path),
        Some("pdf") => load_pdf(path),
        _ => Err(BuzzbotError::DocumentLoad(format!(
            "Unsupported file type: {}",
            path.display()
        ))
        .into()),
    }
}

fn read_to_string(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| {
        BuzzbotError::DocumentLoad(format!("Failed to read {}: {}", path.display(), e))
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn load_text(path: &Path) -> Result<Vec<LoadedDocument>> {
    let text = read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![LoadedDocument::new(text, path, None)])
}

/// One document per data row, rendered as `header: value` lines
fn load_csv(path: &Path) -> Result<Vec<LoadedDocument>> {
    let text = read_to_string(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.trim_start_matches('\u{feff}').as_bytes());
    let csv_error = |e: csv::Error| {
        BuzzbotError::DocumentLoad(format!("Malformed CSV {}: {}", path.display(), e))
    };

    let headers = reader.headers().map_err(csv_error)?.clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let mut documents = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error)?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        let lines: Vec<String> = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let value = record.get(i).unwrap_or("");
                format!("{}: {}", header.trim(), value.trim())
            })
            .collect();
        documents.push(LoadedDocument::new(
            lines.join("\n"),
            path,
            Some(Locator::Row(row as u32)),
        ));
    }
    Ok(documents)
}

fn load_docx(path: &Path) -> Result<Vec<LoadedDocument>> {
    let file = fs::File::open(path).map_err(|e| {
        BuzzbotError::DocumentLoad(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| {
        BuzzbotError::DocumentLoad(format!("Not a docx archive {}: {}", path.display(), e))
    })?;
    let mut entry = archive.by_name("word/document.xml").map_err(|e| {
        BuzzbotError::DocumentLoad(format!("Missing document body in {}: {}", path.display(), e))
    })?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml).map_err(|e| {
        BuzzbotError::DocumentLoad(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let text = docx_text(&xml).map_err(|e| {
        BuzzbotError::DocumentLoad(format!("Failed to parse {}: {}", path.display(), e))
    })?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![LoadedDocument::new(text, path, None)])
}

/// Plain text of a WordprocessingML body, one line per paragraph
pub(crate) fn docx_text(xml: &str) -> std::result::Result<String, docx_rs::ReaderError> {
    let document = docx_rs::Document::from_xml(xml.as_bytes())?;

    let mut paragraphs = Vec::new();
    for child in &document.children {
        let DocumentChild::Paragraph(paragraph) = child else {
            continue;
        };
        let mut line = String::new();
        for run in paragraph.children.iter().filter_map(|c| match c {
            ParagraphChild::Run(run) => Some(run),
            _ => None,
        }) {
            for piece in &run.children {
                match piece {
                    RunChild::Text(t) => line.push_str(&t.text),
                    RunChild::Tab(_) => line.push('\t'),
                    RunChild::Break(_) => line.push('\n'),
                    _ => {}
                }
            }
        }
        paragraphs.push(line);
    }

    Ok(paragraphs
        .iter()
        .flat_map(|p| p.lines())
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

/// One document per page with text
fn load_pdf(path: &Path) -> Result<Vec<LoadedDocument>> {
    let doc = lopdf::Document::load(path).map_err(|e| {
        BuzzbotError::DocumentLoad(format!("Failed to parse PDF {}: {}", path.display(), e))
    })?;

    let mut documents = Vec::new();
    for (page_num, page_id) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(text) if !text.trim().is_empty() => {
                documents.push(LoadedDocument::new(
                    text,
                    path,
                    Some(Locator::Page(page_num.saturating_sub(1))),
                ));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    page = page_num,
                    "Failed to extract text from page id={:?}: {}",
                    page_id,
                    e
                );
            }
        }
    }
    Ok(documents)
}
