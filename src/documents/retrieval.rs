//! Text extraction and keyword retrieval over a user's uploaded documents.
//!
//! This stands in for the embedding/vector-search pipeline: documents are
//! split into overlapping word windows and scored by query-term overlap.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "csv", "json", "html", "htm", "xml", "rst", "log", "yaml", "yml",
    "toml",
];
pub const MAX_CONTENT_CHARS: usize = 50_000;
pub const CHUNK_WORDS: usize = 128;
pub const CHUNK_OVERLAP: usize = 10;
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Unsupported file type for extraction.")]
    Unsupported,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceMetadata {
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Passage {
    pub text: String,
    pub score: f32,
    pub metadata: SourceMetadata,
}

pub fn extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

pub fn is_supported(filename: &str) -> bool {
    extension(filename).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Decodes the upload as text, strips markup for html/xml, and truncates to
/// `MAX_CONTENT_CHARS`.
pub fn extract_text(filename: &str, body: &[u8]) -> Result<String, ExtractError> {
    lazy_static! {
        static ref TAG_RE: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
    }

    let ext = extension(filename).ok_or(ExtractError::Unsupported)?;
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ExtractError::Unsupported);
    }

    let raw = String::from_utf8_lossy(body);
    let text = match ext.as_str() {
        "html" | "htm" | "xml" => TAG_RE.replace_all(&raw, " ").into_owned(),
        _ => raw.into_owned(),
    };

    Ok(truncate_chars(&text, MAX_CONTENT_CHARS))
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Overlapping windows of `CHUNK_WORDS` words.
pub fn chunk(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let step = CHUNK_WORDS - CHUNK_OVERLAP;
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + CHUNK_WORDS).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn terms(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .map(str::to_lowercase)
        .collect()
}

/// Scores every chunk of every document against `query` and returns the best
/// `top_k`, highest score first. Chunks sharing no term with the query are
/// dropped.
pub fn rank(query: &str, documents: &[(String, String)], top_k: usize) -> Vec<Passage> {
    let query_terms = terms(query);
    if query_terms.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let mut passages: Vec<Passage> = documents
        .iter()
        .flat_map(|(filename, text)| {
            chunk(text).into_iter().map(move |c| (filename.clone(), c))
        })
        .filter_map(|(filename, text)| {
            let chunk_terms = terms(&text);
            let hits = query_terms.intersection(&chunk_terms).count();
            (hits > 0).then(|| Passage {
                score: hits as f32 / query_terms.len() as f32,
                text,
                metadata: SourceMetadata { filename },
            })
        })
        .collect();

    passages.sort_by(|a, b| b.score.total_cmp(&a.score));
    passages.truncate(top_k);
    passages
}

/// Builds a plain-text answer from the retrieved passages.
pub fn compose_answer(passages: &[Passage]) -> String {
    if passages.is_empty() {
        return "I could not find anything relevant in your documents.".to_string();
    }
    let mut answer = String::from("Based on your documents:\n");
    for p in passages {
        answer.push_str(&format!("\n[{}] {}\n", p.metadata.filename, p.text));
    }
    answer
}
