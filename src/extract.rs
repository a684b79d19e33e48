//! Text extraction for the supported source formats (PDF, HTML, JSON).
//!
//! Extraction works on bytes and never touches the filesystem; the loader
//! decides which extractor applies and attaches path metadata.

use scraper::{Html, Selector};

/// Elements whose text content is never part of the readable document.
const SKIPPED_HTML_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    Html(String),
    Json(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Html(e) => write!(f, "HTML extraction failed: {}", e),
            ExtractError::Json(e) => write!(f, "JSON parsing failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracts text page by page. Index `i` of the result is page `i`
/// (0-based).
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Readable content of an HTML page.
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlText {
    pub title: Option<String>,
    pub text: String,
}

/// Extracts the visible text of an HTML document, one line per text node.
pub fn extract_html(bytes: &[u8]) -> Result<HtmlText, ExtractError> {
    let html = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&html);

    let title_selector =
        Selector::parse("title").map_err(|e| ExtractError::Html(e.to_string()))?;
    let body_selector = Selector::parse("body").map_err(|e| ExtractError::Html(e.to_string()))?;

    let title = document
        .select(&title_selector)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let root = document
        .select(&body_selector)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut lines: Vec<String> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let skipped = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| SKIPPED_HTML_ELEMENTS.contains(&e.name()))
                .unwrap_or(false)
        });
        if skipped {
            continue;
        }
        let line = collapse_whitespace(text);
        if !line.is_empty() {
            lines.push(line);
        }
    }

    Ok(HtmlText {
        title,
        text: lines.join("\n"),
    })
}

/// Parses the whole file as one JSON value and re-serialises it, keeping
/// its structure as text rather than flattening fields.
pub fn extract_json(bytes: &[u8]) -> Result<String, ExtractError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| ExtractError::Json(e.to_string()))?;
    serde_json::to_string_pretty(&value).map_err(|e| ExtractError::Json(e.to_string()))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
