//! Source loaders: PDF bytes, web pages and plain text.
//!
//! Loaders only produce text. Splitting, embedding and storage happen in
//! [`crate::ingest`]. Every loader returns at least one [`RawDocument`] or an
//! error; a source with no extractable text is an error, never an empty list.

use std::path::Path;
use thiserror::Error;

use crate::models::RawDocument;

/// Leading bytes of every PDF file.
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Loader failure. Always the caller's fault (bad file, bad URL), so it
/// converts into an input error at the service boundary.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{0} is not a PDF file")]
    NotPdf(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("failed to fetch page: {0}")]
    Fetch(String),
    #[error("file is not valid UTF-8 text: {0}")]
    Encoding(String),
    #[error("failed to read file: {0}")]
    Io(String),
    #[error("{0} contains no extractable text")]
    Empty(String),
}

/// Extract one document per page from PDF bytes.
///
/// Runs the extractor on a blocking thread. pdf-extract can panic on
/// malformed input; a panicked task is reported as [`LoadError::Pdf`].
/// Pages with no text are dropped, but at least one page must survive.
pub async fn load_pdf(file_name: &str, bytes: Vec<u8>) -> Result<Vec<RawDocument>, LoadError> {
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(LoadError::NotPdf(file_name.to_string()));
    }

    let pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| LoadError::Pdf(format!("extractor aborted: {}", e)))?
    .map_err(LoadError::Pdf)?;

    let docs: Vec<RawDocument> = pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| RawDocument {
            source: file_name.to_string(),
            page: Some(i as u32 + 1),
            text,
        })
        .collect();

    if docs.is_empty() {
        return Err(LoadError::Empty(file_name.to_string()));
    }
    Ok(docs)
}

/// Fetch a web page and keep the visible text of its `<body>`.
pub async fn load_web(client: &reqwest::Client, url: &str) -> Result<RawDocument, LoadError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| LoadError::Fetch(format!("{}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LoadError::Fetch(format!(
            "unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }

    let response = client
        .get(parsed)
        .send()
        .await
        .map_err(|e| LoadError::Fetch(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(LoadError::Fetch(format!("{} returned {}", url, status)));
    }

    let html = response
        .text()
        .await
        .map_err(|e| LoadError::Fetch(e.to_string()))?;

    let text = html_to_text(&html);
    if text.trim().is_empty() {
        return Err(LoadError::Empty(url.to_string()));
    }

    Ok(RawDocument {
        source: url.to_string(),
        page: None,
        text,
    })
}

/// Read a UTF-8 text file from disk.
pub async fn load_text_file(path: &Path) -> Result<RawDocument, LoadError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| LoadError::Io(format!("{}: {}", path.display(), e)))?;
    load_text_bytes(&path.display().to_string(), bytes)
}

/// Decode uploaded bytes as UTF-8 text.
pub fn load_text_bytes(source: &str, bytes: Vec<u8>) -> Result<RawDocument, LoadError> {
    let text = String::from_utf8(bytes).map_err(|e| LoadError::Encoding(e.to_string()))?;
    if text.trim().is_empty() {
        return Err(LoadError::Empty(source.to_string()));
    }
    Ok(RawDocument {
        source: source.to_string(),
        page: None,
        text,
    })
}

/// Body text of an HTML page, one text node per line.
///
/// `<script>`, `<style>` and `<noscript>` contents are skipped.
pub fn html_to_text(html: &str) -> String {
    let document = scraper::Html::parse_document(html);
    let Ok(body_selector) = scraper::Selector::parse("body") else {
        return String::new();
    };

    let root = match document.select(&body_selector).next() {
        Some(body) => body,
        None => document.root_element(),
    };

    let mut out = String::new();
    collect_text(root, &mut out);
    out
}

fn collect_text(element: scraper::ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_el) = scraper::ElementRef::wrap(child) {
            match child_el.value().name() {
                "script" | "style" | "noscript" | "template" => continue,
                _ => collect_text(child_el, out),
            }
        } else if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(trimmed);
            }
        }
    }
}
