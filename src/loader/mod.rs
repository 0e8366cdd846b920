//! Document loading dispatch for the supported source formats.
//!
//! Each format tag maps to an independent loading strategy producing an
//! ordered sequence of logical documents. Loading either fully succeeds or
//! fails for the whole source; no partial results are returned.

use calamine::{Reader, open_workbook_auto};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while resolving and parsing a source document.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Source reference could not be resolved on the filesystem.
    #[error("Source not found: {0}")]
    NotFound(String),
    /// Declared format tag is not one of the supported variants.
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),
    /// An underlying parser failed; carries the original message.
    #[error("Failed to load document: {0}")]
    Parse(String),
}

/// Closed set of supported file-format tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// PDF file, loaded as one logical document (not paginated).
    Pdf,
    /// Workbook file, one logical document per non-empty sheet.
    Spreadsheet,
    /// Plain text file.
    Text,
    /// Raw HTML markup; no tag stripping is performed at this layer.
    Html,
}

impl FileType {
    /// Lowercase tag persisted in chunk metadata and result records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Spreadsheet => "spreadsheet",
            Self::Text => "text",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "spreadsheet" => Ok(Self::Spreadsheet),
            "text" => Ok(Self::Text),
            "html" => Ok(Self::Html),
            other => Err(LoadError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// One logical text document produced by the loader.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Raw text content.
    pub content: String,
    /// Metadata seeded with the source reference plus per-variant tags.
    pub metadata: Map<String, Value>,
}

impl LoadedDocument {
    fn new(content: String, source: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("source".into(), Value::String(source.to_string()));
        Self { content, metadata }
    }
}

/// Load a source into an ordered sequence of logical documents.
///
/// The source must resolve on the filesystem; parse failures are wrapped as
/// [`LoadError::Parse`] carrying the original message.
pub fn load_document(source: &str, file_type: FileType) -> Result<Vec<LoadedDocument>, LoadError> {
    tracing::info!(source, file_type = %file_type, "Loading document");

    if !Path::new(source).exists() {
        return Err(LoadError::NotFound(source.to_string()));
    }

    let documents = match file_type {
        FileType::Pdf => load_pdf(source)?,
        FileType::Spreadsheet => load_spreadsheet(source)?,
        FileType::Text | FileType::Html => load_plain(source)?,
    };

    tracing::debug!(
        source,
        documents = documents.len(),
        "Document loaded successfully"
    );
    Ok(documents)
}

/// Load the entire PDF as a single logical document.
fn load_pdf(source: &str) -> Result<Vec<LoadedDocument>, LoadError> {
    let bytes = std::fs::read(source).map_err(|err| LoadError::Parse(err.to_string()))?;
    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|err| LoadError::Parse(err.to_string()))?;
    Ok(vec![LoadedDocument::new(text, source)])
}

/// Flatten each non-empty sheet into tab-separated lines, one document per sheet.
fn load_spreadsheet(source: &str) -> Result<Vec<LoadedDocument>, LoadError> {
    let mut workbook =
        open_workbook_auto(source).map_err(|err| LoadError::Parse(err.to_string()))?;

    let mut documents = Vec::new();
    for sheet_name in workbook.sheet_names().to_owned() {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|err| LoadError::Parse(err.to_string()))?;

        let content = range
            .rows()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.to_string())
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect::<Vec<_>>()
            .join("\n");

        if content.trim().is_empty() {
            continue;
        }

        let mut document = LoadedDocument::new(content, source);
        document
            .metadata
            .insert("sheet".into(), Value::String(sheet_name.clone()));
        documents.push(document);
    }

    tracing::debug!(source, sheets = documents.len(), "Spreadsheet loaded");
    Ok(documents)
}

/// Load the raw file content as a single logical document.
fn load_plain(source: &str) -> Result<Vec<LoadedDocument>, LoadError> {
    let content = std::fs::read_to_string(source).map_err(|err| LoadError::Parse(err.to_string()))?;
    Ok(vec![LoadedDocument::new(content, source)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name_hint: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "docpipe-{}-{}",
            crate::model::generate_id(),
            name_hint
        ));
        std::fs::write(&path, contents).expect("write temp file");
        path
    }

    #[test]
    fn file_type_parses_known_tags() {
        assert_eq!("pdf".parse::<FileType>().unwrap(), FileType::Pdf);
        assert_eq!(
            "Spreadsheet".parse::<FileType>().unwrap(),
            FileType::Spreadsheet
        );
        assert_eq!(" text ".parse::<FileType>().unwrap(), FileType::Text);
        assert_eq!("html".parse::<FileType>().unwrap(), FileType::Html);
    }

    #[test]
    fn file_type_rejects_unknown_tags() {
        let error = "docx".parse::<FileType>().unwrap_err();
        assert!(matches!(error, LoadError::UnsupportedFormat(tag) if tag == "docx"));
    }

    #[test]
    fn missing_source_is_not_found() {
        let error = load_document("/nonexistent/docpipe-test.txt", FileType::Text).unwrap_err();
        assert!(matches!(error, LoadError::NotFound(_)));
    }

    #[test]
    fn text_source_loads_as_single_document() {
        let path = temp_file("plain.txt", "Hello world.\nSecond line.");
        let docs = load_document(path.to_str().unwrap(), FileType::Text).expect("load");
        std::fs::remove_file(&path).ok();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "Hello world.\nSecond line.");
        assert_eq!(
            docs[0].metadata.get("source").and_then(Value::as_str),
            path.to_str()
        );
    }

    #[test]
    fn html_source_keeps_raw_markup() {
        let path = temp_file("page.html", "<html><body><p>Hi</p></body></html>");
        let docs = load_document(path.to_str().unwrap(), FileType::Html).expect("load");
        std::fs::remove_file(&path).ok();

        assert_eq!(docs.len(), 1);
        assert!(docs[0].content.contains("<p>Hi</p>"));
    }

    #[test]
    fn loading_is_idempotent_for_identical_sources() {
        let path = temp_file("repeat.txt", "stable content");
        let first = load_document(path.to_str().unwrap(), FileType::Text).expect("first load");
        let second = load_document(path.to_str().unwrap(), FileType::Text).expect("second load");
        std::fs::remove_file(&path).ok();

        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].content, second[0].content);
    }
}
