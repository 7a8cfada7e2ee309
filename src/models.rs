//! Core data models used throughout filehound.
//!
//! These types represent the indexed files, chunks, vectors, and search
//! results that flow through the indexing and retrieval pipeline.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Metadata for one indexed file, keyed by absolute path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub path: String,
    pub filename: String,
    /// Lower-cased extension including the leading dot, or empty.
    pub extension: String,
    /// SHA-256 of the full byte content, lower-case hex.
    pub content_hash: String,
    pub size_bytes: i64,
    /// Unix seconds.
    pub modified_at: i64,
    /// Unix seconds.
    pub indexed_at: i64,
    pub preview: String,
    pub is_hidden: bool,
    pub is_binary: bool,
    pub language: Option<String>,
    pub line_count: Option<i64>,
}

/// One window of a file's text produced by the chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_index: i64,
    /// Char offset of the window start in the source text.
    pub start: usize,
    /// Stored text, bounded by `max_stored_chars`.
    pub text: String,
    /// Text sent to the embedding provider; may equal `text`.
    pub embed_text: String,
}

/// A stored vector for one chunk of one file.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub file_path: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub vector: Vec<f32>,
    pub model: String,
    pub created_at: i64,
}

/// A chunk-level hit from the embedding index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticResult {
    pub file_path: String,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub score: f64,
}

/// Which part of a file a fuzzy hit matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FuzzyMatchType {
    Filename,
    Content,
}

/// A file-level hit from the fuzzy searcher. `score` is on a 0–100 scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuzzyResult {
    pub file_path: String,
    pub filename: String,
    pub match_type: FuzzyMatchType,
    pub matched_text: String,
    pub score: f64,
}

/// Which searcher(s) contributed to a fused result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Semantic,
    Fuzzy,
    Both,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchType::Semantic => "semantic",
            MatchType::Fuzzy => "fuzzy",
            MatchType::Both => "both",
        };
        f.write_str(s)
    }
}

/// A ranked search hit returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub file_path: String,
    /// Fused score in `[0.0, 1.0]` for weights summing to 1.
    pub score: f64,
    pub match_type: MatchType,
    pub preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_score: Option<f64>,
    /// Normalized to `[0.0, 1.0]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuzzy_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Semantic,
    Fuzzy,
    Combined,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Semantic => "semantic",
            SearchMode::Fuzzy => "fuzzy",
            SearchMode::Combined => "combined",
        }
    }
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "semantic" => Ok(SearchMode::Semantic),
            "fuzzy" => Ok(SearchMode::Fuzzy),
            "combined" => Ok(SearchMode::Combined),
            other => Err(Error::config(format!(
                "Unknown search mode: {}. Use semantic, fuzzy, or combined.",
                other
            ))),
        }
    }
}

/// Ranked results of one query plus timing.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub mode: SearchMode,
    pub results: Vec<SearchResult>,
    pub duration_ms: u64,
}

/// Counts returned by a directory indexing run.
///
/// `indexed` counts every file whose record was written, binary ones
/// included; `binary` is the subset recorded without content.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub indexed: u64,
    pub skipped: u64,
    pub errors: u64,
    /// Files recorded as binary (metadata only, never embedded).
    pub binary: u64,
    pub chunks: u64,
    pub pruned: u64,
    pub cancelled: bool,
    pub error_details: Vec<(String, String)>,
}

/// One row of the diagnostic query log.
#[derive(Debug, Clone, Serialize)]
pub struct QueryLogEntry {
    pub query: String,
    pub mode: String,
    pub result_count: i64,
    pub duration_ms: i64,
    pub searched_at: i64,
}
