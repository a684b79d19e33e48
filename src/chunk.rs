//! Recursive character text splitter.
//!
//! Splits document text into windows of at most `chunk_size` characters,
//! preferring natural boundaries. The splitter tries separators from
//! coarsest to finest (`"\n\n"`, `"\n"`, `" "`, then individual
//! characters) and only falls back to a finer one for pieces that are still
//! too large.
//!
//! # Algorithm
//!
//! 1. Pick the first separator that occurs in the text; split on it,
//!    keeping the separator at the start of the following piece.
//! 2. Pieces shorter than `chunk_size` are queued; an oversized piece
//!    flushes the queue and is split recursively with the finer separators.
//! 3. Queued pieces are merged greedily into windows of up to `chunk_size`
//!    characters. When a window is emitted, whole pieces from its tail
//!    totalling at most `chunk_overlap` characters are carried into the next
//!    window.
//! 4. Windows are trimmed of surrounding whitespace; empty windows are
//!    dropped.
//!
//! Lengths are counted in Unicode scalar values, never bytes.
//!
//! # Example
//!
//! ```rust
//! use grounded_answers::chunk::TextSplitter;
//!
//! let splitter = TextSplitter::new(1000, 200);
//! let chunks = splitter.split_text("Short note.\n\nSecond paragraph.");
//! assert_eq!(chunks.len(), 1);
//! ```

use std::collections::VecDeque;

use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Document};

/// Separators in decreasing granularity. The empty separator means
/// "split into characters".
const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits documents in order. Every chunk inherits its document's
    /// metadata unchanged; `chunk_index` restarts at 0 for each document.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            for (index, text) in self.split_text(&doc.text).into_iter().enumerate() {
                chunks.push(Chunk {
                    id: Uuid::new_v4().to_string(),
                    chunk_index: index as i64,
                    text,
                    metadata: doc.metadata.clone(),
                });
            }
        }
        chunks
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                finer = &[];
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut out = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                out.extend(self.merge_pieces(&pending));
                pending.clear();
            }
            if finer.is_empty() {
                if let Some(trimmed) = non_empty_trimmed(piece) {
                    out.push(trimmed);
                }
            } else {
                out.extend(self.split_recursive(piece, finer));
            }
        }

        if !pending.is_empty() {
            out.extend(self.merge_pieces(&pending));
        }
        out
    }

    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let mut windows = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(window) = join_pieces(&current) {
                    windows.push(window);
                }
                // Keep at most `chunk_overlap` characters of tail context,
                // and always leave room for the incoming piece.
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(front);
                }
            }
            current.push_back(piece);
            total += len;
        }

        if let Some(window) = join_pieces(&current) {
            windows.push(window);
        }
        windows
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

/// Splits on `separator`, attaching each separator occurrence to the start
/// of the piece that follows it. Empty pieces are dropped.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn join_pieces(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    non_empty_trimmed(&joined)
}

fn non_empty_trimmed(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
