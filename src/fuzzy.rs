//! Approximate filename and content matching.
//!
//! Scores use [`partial_ratio`]: the best normalized indel similarity
//! (from `rapidfuzz`) between the shorter string and any equally long (or
//! edge-truncated) window of the longer one, on a 0–100 scale. Filenames
//! are scored first;
//! only files whose filename score falls below `filename_threshold` get
//! their content preview scored, and content scores are scaled by
//! `content_weight` so a filename hit outranks an equal content hit.
//!
//! Content scoring slides the query across the whole preview, so only the
//! first `max_query_chars` query chars take part in it.

use crate::error::{Error, Result};
use crate::models::{FileRecord, FuzzyMatchType, FuzzyResult};
use crate::store::ContentStore;
use rapidfuzz::distance::indel;

/// Tunables for [`FuzzySearcher`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyParams {
    /// Default minimum score (0–100) used by the engine.
    pub min_score: f64,
    /// Multiplier applied to content scores.
    pub content_weight: f64,
    /// Snippet context on each side of a content match, in chars.
    pub context_chars: usize,
    /// Filename scores at or above this skip content scoring.
    pub filename_threshold: f64,
    /// Snippet length when the query probe does not occur in the preview.
    pub fallback_chars: usize,
    /// Number of leading query chars used to locate the snippet.
    pub probe_chars: usize,
    /// Query chars considered when scoring content.
    pub max_query_chars: usize,
}

impl Default for FuzzyParams {
    fn default() -> Self {
        Self {
            min_score: 60.0,
            content_weight: 0.8,
            context_chars: 50,
            filename_threshold: 80.0,
            fallback_chars: 100,
            probe_chars: 3,
            max_query_chars: 128,
        }
    }
}

#[derive(Clone)]
pub struct FuzzySearcher {
    store: ContentStore,
    params: FuzzyParams,
}

impl FuzzySearcher {
    pub fn new(store: ContentStore, params: FuzzyParams) -> Self {
        Self { store, params }
    }

    pub fn params(&self) -> &FuzzyParams {
        &self.params
    }

    /// Files matching `query` by name or content, best first.
    ///
    /// Binary files take part in filename matching only.
    pub async fn search(
        &self,
        query: &str,
        path_prefix: Option<&str>,
        extensions: Option<&[String]>,
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<FuzzyResult>> {
        if top_k == 0 {
            return Err(Error::config("top_k must be >= 1"));
        }
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.store.list_searchable(path_prefix, extensions).await?;
        let mut results: Vec<FuzzyResult> = records
            .iter()
            .filter_map(|r| self.score_record(&query, r))
            .filter(|r| r.score >= min_score)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        results.truncate(top_k);
        Ok(results)
    }

    /// Best applicable score for one record. `query` is already lower-cased.
    fn score_record(&self, query: &str, record: &FileRecord) -> Option<FuzzyResult> {
        let filename_score = partial_ratio(query, &record.filename.to_lowercase());

        let mut best = FuzzyResult {
            file_path: record.path.clone(),
            filename: record.filename.clone(),
            match_type: FuzzyMatchType::Filename,
            matched_text: record.filename.clone(),
            score: filename_score,
        };

        if filename_score < self.params.filename_threshold
            && !record.is_binary
            && !record.preview.is_empty()
        {
            let capped: String = query.chars().take(self.params.max_query_chars).collect();
            let raw = partial_ratio(&capped, &record.preview.to_lowercase());
            let content_score = raw * self.params.content_weight;
            if content_score > best.score {
                best.match_type = FuzzyMatchType::Content;
                best.matched_text = self.snippet(&record.preview, query);
                best.score = content_score;
            }
        }

        (best.score > 0.0).then_some(best)
    }

    /// Window of `context_chars` on each side of the first occurrence of the
    /// query's leading chars, or the start of the preview.
    fn snippet(&self, preview: &str, query: &str) -> String {
        let text: Vec<char> = preview.chars().collect();
        let probe: Vec<char> = query.chars().take(self.params.probe_chars).collect();

        match find_ignore_case(&text, &probe) {
            Some(pos) => {
                let start = pos.saturating_sub(self.params.context_chars);
                let end = (pos + probe.len() + self.params.context_chars).min(text.len());
                text[start..end].iter().collect()
            }
            None => text.iter().take(self.params.fallback_chars).collect(),
        }
    }
}

fn find_ignore_case(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| {
        w.iter()
            .zip(needle)
            .all(|(a, b)| a == b || a.to_lowercase().eq(b.to_lowercase()))
    })
}

/// Partial similarity of two strings on a 0–100 scale.
///
/// The shorter string is slid across the longer one; the score is the best
/// [`ratio`] against any full-length window, or against a prefix or suffix
/// of the longer string shorter than the needle. Strings of equal length
/// are also compared in the swapped direction. Case-sensitive; an empty
/// input scores 0.
pub fn partial_ratio(s1: &str, s2: &str) -> f64 {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    if a.len() == b.len() {
        let forward = partial_windows(&a, &b);
        if forward >= 100.0 {
            return forward;
        }
        return forward.max(partial_windows(&b, &a));
    }

    if a.len() < b.len() {
        partial_windows(&a, &b)
    } else {
        partial_windows(&b, &a)
    }
}

fn partial_windows(needle: &[char], haystack: &[char]) -> f64 {
    let n = needle.len();
    let m = haystack.len();
    let mut best = 0.0f64;

    for i in 1..n.min(m + 1) {
        best = best.max(ratio(needle, &haystack[..i]));
        if best >= 100.0 {
            return 100.0;
        }
    }

    if n <= m {
        for i in 0..=(m - n) {
            best = best.max(ratio(needle, &haystack[i..i + n]));
            if best >= 100.0 {
                return 100.0;
            }
        }
    }

    let first_suffix = if n <= m { m - n + 1 } else { 1 };
    for i in first_suffix..m {
        best = best.max(ratio(needle, &haystack[i..]));
        if best >= 100.0 {
            return 100.0;
        }
    }

    best
}

/// Normalized indel similarity on a 0–100 scale.
pub fn ratio(a: &[char], b: &[char]) -> f64 {
    indel::normalized_similarity(a.iter().copied(), b.iter().copied()) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate;
    use tempfile::TempDir;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.1
    }

    #[test]
    fn test_ratio_basics() {
        let c = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(ratio(&c("abc"), &c("abc")), 100.0);
        assert_eq!(ratio(&c("abc"), &c("xyz")), 0.0);
        assert!(approx(ratio(&c("abcd"), &c("abef")), 50.0));
    }

    #[test]
    fn test_partial_ratio_substring_is_perfect() {
        assert_eq!(partial_ratio("auth", "src/auth_handler.py"), 100.0);
        assert_eq!(partial_ratio("src/auth_handler.py", "auth"), 100.0);
    }

    #[test]
    fn test_partial_ratio_empty() {
        assert_eq!(partial_ratio("", "abc"), 0.0);
        assert_eq!(partial_ratio("abc", ""), 0.0);
    }

    #[test]
    fn test_partial_ratio_prefix_window() {
        // "config" is a prefix of the filename and shares 6 chars with the query.
        assert!(approx(partial_ratio("auth config", "config.yaml"), 70.6));
        assert!(approx(partial_ratio("auth config", "auth.py"), 72.7));
    }

    #[test]
    fn test_partial_ratio_unrelated_low() {
        assert!(partial_ratio("database", "logo.png") < 60.0);
    }

    #[test]
    fn test_find_ignore_case() {
        let h: Vec<char> = "Hello AUTH world".chars().collect();
        let n: Vec<char> = "aut".chars().collect();
        assert_eq!(find_ignore_case(&h, &n), Some(6));
        assert_eq!(find_ignore_case(&h, &['z']), None);
        assert_eq!(find_ignore_case(&h, &[]), None);
    }

    fn record(path: &str, preview: &str, binary: bool) -> FileRecord {
        let filename = path.rsplit('/').next().unwrap_or(path).to_string();
        FileRecord {
            path: path.to_string(),
            extension: crate::walk::extension_of(std::path::Path::new(path)),
            filename,
            content_hash: format!("hash-{}", path),
            size_bytes: preview.len() as i64,
            modified_at: 0,
            indexed_at: 0,
            preview: preview.to_string(),
            is_hidden: false,
            is_binary: binary,
            language: None,
            line_count: None,
        }
    }

    async fn searcher_with(records: &[FileRecord]) -> (TempDir, FuzzySearcher) {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join("fuzzy.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        let store = ContentStore::new(pool);
        for r in records {
            store.upsert(r).await.unwrap();
        }
        (tmp, FuzzySearcher::new(store, FuzzyParams::default()))
    }

    #[tokio::test]
    async fn test_filename_beats_content() {
        let (_tmp, searcher) = searcher_with(&[
            record("/p/src/auth.py", "def login(): pass", false),
            record("/p/config.yaml", "auth:\n  enabled: true", false),
            record("/p/logo.png", "", true),
        ])
        .await;

        let results = searcher
            .search("auth config", None, None, 10, 60.0)
            .await
            .unwrap();
        let paths: Vec<&str> = results.iter().map(|r| r.file_path.as_str()).collect();
        assert_eq!(paths, vec!["/p/src/auth.py", "/p/config.yaml"]);
        assert_eq!(results[0].match_type, FuzzyMatchType::Filename);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_content_match_weighted_with_snippet() {
        let body = format!("{}needle_token here{}", "a ".repeat(60), " z".repeat(60));
        let (_tmp, searcher) = searcher_with(&[record("/p/readme.txt", &body, false)]).await;

        let results = searcher
            .search("needle_token", None, None, 10, 60.0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.match_type, FuzzyMatchType::Content);
        assert!(approx(r.score, 80.0));
        assert!(r.matched_text.contains("needle_token"));
        assert!(r.matched_text.chars().count() <= 50 + 3 + 50);
    }

    #[tokio::test]
    async fn test_long_query_is_capped_for_content() {
        let body = format!("{}needle_token here{}", "a ".repeat(60), " z".repeat(60));
        let (_tmp, searcher) = searcher_with(&[record("/p/readme.txt", &body, false)]).await;
        let capped = FuzzySearcher::new(
            searcher.store.clone(),
            FuzzyParams {
                max_query_chars: 12,
                ..FuzzyParams::default()
            },
        );

        let query = "needle_token and more words";
        let full = searcher.search(query, None, None, 10, 0.0).await.unwrap();
        let hits = capped.search(query, None, None, 10, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_type, FuzzyMatchType::Content);
        assert!(approx(hits[0].score, 80.0));
        assert!(full.is_empty() || full[0].score < hits[0].score);
    }

    #[test]
    fn test_ratio_empty_pair_is_identical() {
        assert_eq!(ratio(&[], &[]), 100.0);
    }

    #[tokio::test]
    async fn test_snippet_fallback_to_preview_start() {
        let searcher = FuzzySearcher::new(
            ContentStore::new(
                sqlx::sqlite::SqlitePoolOptions::new()
                    .connect_lazy("sqlite::memory:")
                    .unwrap(),
            ),
            FuzzyParams::default(),
        );
        let preview = "x".repeat(300);
        assert_eq!(searcher.snippet(&preview, "qqq"), "x".repeat(100));
    }

    #[tokio::test]
    async fn test_binary_files_match_by_filename_only() {
        let (_tmp, searcher) = searcher_with(&[record("/p/database.bin", "", true)]).await;
        let hits = searcher.search("database", None, None, 5, 60.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_type, FuzzyMatchType::Filename);
    }

    #[tokio::test]
    async fn test_min_score_prefix_and_top_k() {
        let (_tmp, searcher) = searcher_with(&[
            record("/a/report.md", "", false),
            record("/a/report2.md", "", false),
            record("/b/report.md", "", false),
        ])
        .await;

        let all = searcher.search("report", None, None, 10, 60.0).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].score > w[1].score
            || (w[0].score == w[1].score && w[0].file_path < w[1].file_path)));

        let scoped = searcher
            .search("report", Some("/a/"), None, 10, 60.0)
            .await
            .unwrap();
        assert!(scoped.iter().all(|r| r.file_path.starts_with("/a/")));
        assert_eq!(scoped.len(), 2);

        let top1 = searcher.search("report", None, None, 1, 60.0).await.unwrap();
        assert_eq!(top1.len(), 1);

        let strict = searcher.search("repxrt", None, None, 10, 99.0).await.unwrap();
        assert!(strict.is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_and_zero_top_k() {
        let (_tmp, searcher) = searcher_with(&[record("/a/x.md", "", false)]).await;
        assert!(searcher.search("   ", None, None, 5, 0.0).await.unwrap().is_empty());
        assert!(matches!(
            searcher.search("x", None, None, 0, 0.0).await,
            Err(Error::Config(_))
        ));
    }
}
