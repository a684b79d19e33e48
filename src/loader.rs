//! Document loading from disk.
//!
//! Formats form a closed set, [`SourceKind`]; adding a format means adding a
//! variant. There are two entry points with deliberately different failure
//! policies:
//!
//! - [`load_directory`] scans the data directory and is *soft*: a missing or
//!   empty directory yields no documents and a logged diagnostic, and a file
//!   that fails to load is skipped with a warning.
//! - [`load_paths`] loads an explicit list supplied by a caller and is
//!   *strict*: every path must resolve under the allowed root and carry a
//!   supported extension, and the first bad path fails the whole batch.

use std::path::{Component, Path, PathBuf};

use crate::error::{RagError, Result};
use crate::extract;
use crate::models::Document;

/// File extensions accepted by the loader, lower-case, without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "html", "htm", "json"];

/// The supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Html,
    Json,
}

impl SourceKind {
    /// Picks the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(SourceKind::Pdf),
            "html" | "htm" => Some(SourceKind::Html),
            "json" => Some(SourceKind::Json),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            SourceKind::Pdf => "application/pdf",
            SourceKind::Html => "text/html",
            SourceKind::Json => "application/json",
        }
    }

    /// Turns raw file bytes into documents tagged with `source`.
    pub fn extract(self, bytes: &[u8], path: &Path) -> Result<Vec<Document>> {
        let source = path.display().to_string();
        let docs = match self {
            SourceKind::Pdf => extract::extract_pdf_pages(bytes)
                .map_err(|e| RagError::extraction(path, e.to_string()))?
                .into_iter()
                .enumerate()
                .filter(|(_, text)| !text.trim().is_empty())
                .map(|(page, text)| Document::new(text, &source).with_meta("page", page as u64))
                .collect(),
            SourceKind::Html => {
                let html = extract::extract_html(bytes)
                    .map_err(|e| RagError::extraction(path, e.to_string()))?;
                let mut doc = Document::new(html.text, &source);
                if let Some(title) = html.title {
                    doc = doc.with_meta("title", title);
                }
                vec![doc]
            }
            SourceKind::Json => {
                let text = extract::extract_json(bytes)
                    .map_err(|e| RagError::extraction(path, e.to_string()))?;
                vec![Document::new(text, &source).with_meta("seq_num", 1u64)]
            }
        };
        Ok(docs
            .into_iter()
            .map(|d| d.with_meta("content_type", self.content_type()))
            .collect())
    }
}

/// Loads a single file, dispatching on its extension.
pub fn load_file(path: &Path) -> Result<Vec<Document>> {
    let kind =
        SourceKind::from_path(path).ok_or_else(|| RagError::UnsupportedFormat(path.to_path_buf()))?;
    if !path.exists() {
        return Err(RagError::NotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    let docs = kind.extract(&bytes, path)?;
    tracing::debug!(path = %path.display(), records = docs.len(), "loaded file");
    Ok(docs)
}

/// Scans `dir` (non-recursively) for supported files and loads them.
///
/// Never fails: a missing directory, a directory without supported files,
/// and individual unreadable files are all logged and produce fewer (or
/// no) documents.
pub fn load_directory(dir: &Path) -> Vec<Document> {
    if !dir.is_dir() {
        tracing::warn!(
            "{} does not exist. Create it and add .html, .pdf, or .json files.",
            dir.display()
        );
        return Vec::new();
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Cannot list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| SourceKind::from_path(path).is_some() && path.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        tracing::warn!(
            "No .html, .pdf, or .json files found in {}. Add at least one document.",
            dir.display()
        );
        return Vec::new();
    }

    let mut documents = Vec::new();
    for path in &files {
        match load_file(path) {
            Ok(docs) => documents.extend(docs),
            Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
        }
    }

    tracing::info!(
        files = files.len(),
        documents = documents.len(),
        dir = %dir.display(),
        "directory scan complete"
    );
    documents
}

/// Loads an explicit list of paths; the first invalid or unloadable path
/// aborts the batch and nothing is returned.
pub fn load_paths(paths: &[String], allowed_root: &Path) -> Result<Vec<Document>> {
    let resolved = paths
        .iter()
        .map(|raw| resolve_allowed_path(raw, allowed_root))
        .collect::<Result<Vec<_>>>()?;

    let mut documents = Vec::new();
    for path in &resolved {
        documents.extend(load_file(path)?);
    }
    Ok(documents)
}

/// Validates a caller-supplied path against the allowed root.
///
/// Relative paths resolve against `allowed_root`. The check is lexical
/// first (so `..` cannot climb out), then repeated on the canonical path
/// so a symlink cannot point outside the root either.
pub fn resolve_allowed_path(raw: &str, allowed_root: &Path) -> Result<PathBuf> {
    if raw.trim().is_empty() {
        return Err(RagError::path_not_allowed(raw, "empty path"));
    }

    let root = absolute(allowed_root)?;
    let candidate = Path::new(raw);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let normalized = normalize_lexically(&joined);

    if !normalized.starts_with(&root) {
        return Err(RagError::path_not_allowed(
            raw,
            format!("outside the allowed root {}", root.display()),
        ));
    }
    if SourceKind::from_path(&normalized).is_none() {
        return Err(RagError::path_not_allowed(
            raw,
            format!(
                "unsupported extension, expected one of: {}",
                SUPPORTED_EXTENSIONS.join(", ")
            ),
        ));
    }
    if !normalized.exists() {
        return Err(RagError::NotFound(normalized));
    }
    if !normalized.is_file() {
        return Err(RagError::path_not_allowed(raw, "not a regular file"));
    }

    let canonical = normalized.canonicalize()?;
    let canonical_root = root.canonicalize()?;
    if !canonical.starts_with(&canonical_root) {
        return Err(RagError::path_not_allowed(
            raw,
            "resolves outside the allowed root",
        ));
    }

    Ok(normalized)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize_lexically(path))
    } else {
        Ok(normalize_lexically(&std::env::current_dir()?.join(path)))
    }
}

/// Folds `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn kind_from_extension_is_case_insensitive() {
        assert_eq!(SourceKind::from_path(Path::new("a/B.PDF")), Some(SourceKind::Pdf));
        assert_eq!(SourceKind::from_path(Path::new("x.htm")), Some(SourceKind::Html));
        assert_eq!(SourceKind::from_path(Path::new("x.Json")), Some(SourceKind::Json));
        assert_eq!(SourceKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(SourceKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn load_file_unsupported_and_missing() {
        let tmp = TempDir::new().unwrap();
        let txt = tmp.path().join("notes.txt");
        fs::write(&txt, "hello").unwrap();
        assert!(matches!(load_file(&txt), Err(RagError::UnsupportedFormat(_))));
        assert!(matches!(
            load_file(&tmp.path().join("gone.json")),
            Err(RagError::NotFound(_))
        ));
    }

    #[test]
    fn json_file_keeps_source_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pump.json");
        fs::write(&path, r#"{"model": "P-100"}"#).unwrap();
        let docs = load_file(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source(), Some(path.display().to_string().as_str()));
        assert_eq!(docs[0].metadata["seq_num"], 1);
        assert!(docs[0].text.contains("P-100"));
    }

    #[test]
    fn directory_missing_is_soft() {
        let tmp = TempDir::new().unwrap();
        assert!(load_directory(&tmp.path().join("nope")).is_empty());
    }

    #[test]
    fn directory_skips_bad_files_and_unsupported() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("good.json"), r#"{"ok": true}"#).unwrap();
        fs::write(tmp.path().join("bad.json"), "{broken").unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();
        fs::write(tmp.path().join("page.html"), "<p>hello page</p>").unwrap();

        let docs = load_directory(tmp.path());
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().any(|d| d.text.contains("\"ok\": true")));
        assert!(docs.iter().any(|d| d.text.contains("hello page")));
    }

    #[test]
    fn explicit_path_outside_root_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = resolve_allowed_path("/etc/passwd", tmp.path()).unwrap_err();
        assert!(matches!(err, RagError::PathNotAllowed { .. }));
    }

    #[test]
    fn explicit_path_climbing_out_rejected() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("project");
        fs::create_dir_all(&root).unwrap();
        fs::write(tmp.path().join("secret.json"), "{}").unwrap();
        let err = resolve_allowed_path("../secret.json", &root).unwrap_err();
        assert!(matches!(err, RagError::PathNotAllowed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_pointing_outside_root_rejected() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("project");
        fs::create_dir_all(&root).unwrap();
        let secret = tmp.path().join("secret.json");
        fs::write(&secret, r#"{"token": "x"}"#).unwrap();
        std::os::unix::fs::symlink(&secret, root.join("link.json")).unwrap();

        let err = resolve_allowed_path("link.json", &root).unwrap_err();
        assert!(matches!(err, RagError::PathNotAllowed { .. }), "got {:?}", err);
        assert!(load_paths(&["link.json".to_string()], &root).is_err());

        // Links that stay inside the root are fine.
        fs::write(root.join("real.json"), r#"{"ok": 1}"#).unwrap();
        std::os::unix::fs::symlink(root.join("real.json"), root.join("alias.json")).unwrap();
        assert!(resolve_allowed_path("alias.json", &root).is_ok());
    }

    #[test]
    fn explicit_path_bad_extension_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        let err = resolve_allowed_path("notes.txt", tmp.path()).unwrap_err();
        assert!(matches!(err, RagError::PathNotAllowed { .. }));
    }

    #[test]
    fn explicit_path_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = resolve_allowed_path("data/absent.pdf", tmp.path()).unwrap_err();
        assert!(matches!(err, RagError::NotFound(_)));
    }

    #[test]
    fn load_paths_fails_whole_batch_on_one_bad_path() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.json"), r#"{"a": 1}"#).unwrap();
        let paths = vec!["a.json".to_string(), "/etc/passwd".to_string()];
        assert!(load_paths(&paths, tmp.path()).is_err());

        let ok = load_paths(&["a.json".to_string()], tmp.path()).unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn normalize_folds_dot_components() {
        assert_eq!(
            normalize_lexically(Path::new("/srv/app/./data/../data/x.pdf")),
            PathBuf::from("/srv/app/data/x.pdf")
        );
    }
}
