//! Weighted fusion of semantic and fuzzy hits into one ranking.

use std::collections::HashMap;

use crate::chunk::truncate_chars;
use crate::error::{Error, Result};
use crate::models::{FuzzyResult, MatchType, SearchResult, SemanticResult};

/// Relative weights of the two searchers. Need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub semantic: f64,
    pub fuzzy: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            semantic: 0.6,
            fuzzy: 0.4,
        }
    }
}

impl FusionWeights {
    pub fn validate(&self) -> Result<()> {
        if self.semantic < 0.0 || self.fuzzy < 0.0 {
            return Err(Error::config("fusion weights must be >= 0"));
        }
        let sum = self.semantic + self.fuzzy;
        if sum.is_nan() || sum <= 0.0 {
            return Err(Error::config("fusion weights must have a positive sum"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Entry {
    semantic: f64,
    fuzzy: f64,
    preview: Option<String>,
}

/// Merge both result lists per file path.
///
/// Each path keeps its best similarity and its best fuzzy score (scaled to
/// 0–1). A path missing from one list contributes 0 for that term. The
/// preview comes from the first semantic chunk seen for the path, else from
/// the first fuzzy hit, truncated to `preview_chars`.
pub fn fuse(
    semantic: &[SemanticResult],
    fuzzy: &[FuzzyResult],
    top_k: usize,
    weights: &FusionWeights,
    preview_chars: usize,
) -> Vec<SearchResult> {
    let mut by_path: HashMap<&str, Entry> = HashMap::new();

    for hit in semantic {
        let entry = by_path.entry(hit.file_path.as_str()).or_default();
        entry.semantic = entry.semantic.max(hit.score);
        if entry.preview.is_none() {
            entry.preview = Some(truncate_chars(&hit.chunk_text, preview_chars));
        }
    }

    for hit in fuzzy {
        let entry = by_path.entry(hit.file_path.as_str()).or_default();
        entry.fuzzy = entry.fuzzy.max(hit.score / 100.0);
        if entry.preview.is_none() {
            entry.preview = Some(truncate_chars(&hit.matched_text, preview_chars));
        }
    }

    let mut results: Vec<SearchResult> = by_path
        .into_iter()
        .map(|(path, e)| {
            let match_type = match (e.semantic > 0.0, e.fuzzy > 0.0) {
                (true, true) => MatchType::Both,
                (false, true) => MatchType::Fuzzy,
                _ => MatchType::Semantic,
            };
            SearchResult {
                file_path: path.to_string(),
                score: weights.semantic * e.semantic + weights.fuzzy * e.fuzzy,
                match_type,
                preview: e.preview.unwrap_or_default(),
                semantic_score: (e.semantic > 0.0).then_some(e.semantic),
                fuzzy_score: (e.fuzzy > 0.0).then_some(e.fuzzy),
            }
        })
        .collect();

    sort_results(&mut results);
    results.truncate(top_k);
    results
}

/// Score descending, ties by ascending path.
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.file_path.cmp(&b.file_path))
    });
}
