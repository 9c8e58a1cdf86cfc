//! Context assembly for answer generation.
//!
//! Retrieved documents become numbered `[i] content` blocks for the prompt
//! and a citation list in the same order, so `[i]` in an answer refers to
//! `citations[i - 1]`.

use serde::{Deserialize, Serialize};

use crate::search::ChunkDocument;

const SNIPPET_MAX_CHARS: usize = 200;
const TITLE_MAX_CHARS: usize = 50;
const ELLIPSIS: &str = "...";

/// A citation shown next to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub link: String,
    pub snippet: String,
}

/// Cuts `text` to at most `max_chars` characters, ending in `...` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

pub fn snippet(content: &str) -> String {
    truncate_chars(content, SNIPPET_MAX_CHARS)
}

/// Chat title derived from the first question.
pub fn derive_title(text: &str) -> String {
    truncate_chars(text, TITLE_MAX_CHARS)
}

/// Returns the prompt context and its citations, both in ranked order.
pub fn build_context(documents: &[ChunkDocument]) -> (String, Vec<Source>) {
    let mut blocks = Vec::with_capacity(documents.len());
    let mut sources = Vec::with_capacity(documents.len());

    for (i, doc) in documents.iter().enumerate() {
        blocks.push(format!("[{}] {}", i + 1, doc.content));
        sources.push(Source {
            id: doc.id.clone(),
            link: doc.link.clone(),
            snippet: snippet(&doc.content),
        });
    }

    (blocks.join("\n\n"), sources)
}
