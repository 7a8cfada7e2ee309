//! Query surface over one index database.
//!
//! [`SearchEngine`] owns the connection pool and the components built on
//! it (content store, embedding index, indexer and both searchers) and
//! exposes the operations callers use: index a directory, search, look up
//! one file, statistics, the query log, and clearing the index.
//!
//! # Search modes
//!
//! | Mode | Sources | Score |
//! |------|---------|-------|
//! | `semantic` | embedding index, ranked per file | best chunk similarity |
//! | `fuzzy` | filename / preview matching | fuzzy score / 100 |
//! | `combined` | both, `2 × top_k` candidate files each | weighted fusion |
//!
//! In `combined` mode a disabled provider contributes no semantic
//! candidates; any other provider failure is returned to the caller.

use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::db;
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::fusion::{fuse, FusionWeights};
use crate::fuzzy::{FuzzyParams, FuzzySearcher};
use crate::indexer::{CancelToken, IndexOptions, Indexer};
use crate::migrate;
use crate::models::{
    FileRecord, IndexReport, QueryLogEntry, SearchMode, SearchResponse, SearchResult,
};
use crate::semantic::SemanticSearcher;
use crate::stats::{self, IndexStats};
use crate::store::ContentStore;
use crate::vector_index::EmbeddingIndex;
use crate::walk;

/// Search tunables, decoupled from application config.
#[derive(Debug, Clone, Copy)]
pub struct SearchSettings {
    pub weights: FusionWeights,
    pub fuzzy: FuzzyParams,
    pub semantic_min_score: f64,
    pub preview_chars: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            fuzzy: FuzzyParams::default(),
            semantic_min_score: 0.5,
            preview_chars: 200,
        }
    }
}

/// One search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// Restrict results to this file or directory.
    pub path: Option<std::path::PathBuf>,
    pub mode: SearchMode,
    pub top_k: usize,
    pub extensions: Option<Vec<String>>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, mode: SearchMode, top_k: usize) -> Self {
        Self {
            query: query.into(),
            path: None,
            mode,
            top_k,
            extensions: None,
        }
    }
}

pub struct SearchEngine {
    pool: SqlitePool,
    store: ContentStore,
    index: EmbeddingIndex,
    provider: Arc<dyn EmbeddingProvider>,
    indexer: Indexer,
    semantic: SemanticSearcher,
    fuzzy: FuzzySearcher,
    settings: SearchSettings,
}

impl SearchEngine {
    /// Open (creating if needed) the database at `db_path` and migrate it.
    pub async fn open(
        db_path: &Path,
        provider: Arc<dyn EmbeddingProvider>,
        settings: SearchSettings,
    ) -> Result<Self> {
        settings.weights.validate()?;
        let pool = db::connect(db_path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool, provider, settings))
    }

    pub fn new(
        pool: SqlitePool,
        provider: Arc<dyn EmbeddingProvider>,
        settings: SearchSettings,
    ) -> Self {
        let store = ContentStore::new(pool.clone());
        let index = EmbeddingIndex::new(pool.clone());
        Self {
            indexer: Indexer::new(store.clone(), index.clone(), provider.clone()),
            semantic: SemanticSearcher::new(index.clone(), provider.clone()),
            fuzzy: FuzzySearcher::new(store.clone(), settings.fuzzy),
            pool,
            store,
            index,
            provider,
            settings,
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    pub async fn index_directory(
        &self,
        root: &Path,
        options: &IndexOptions,
        cancel: &CancelToken,
    ) -> Result<IndexReport> {
        self.indexer.index_directory(root, options, cancel).await
    }

    pub async fn prune(&self, root: &Path) -> Result<u64> {
        self.indexer.prune(root).await
    }

    /// Run one query and record it in the query log.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        if request.top_k == 0 {
            return Err(Error::config("top_k must be >= 1"));
        }

        let started = Instant::now();
        let query = request.query.trim();
        let results = if query.is_empty() {
            Vec::new()
        } else {
            let prefix = request.path.as_deref().map(path_prefix);
            let extensions = request.extensions.as_ref().map(|exts| {
                exts.iter()
                    .map(|e| walk::normalize_extension(e))
                    .collect::<Vec<_>>()
            });
            self.run_mode(
                query,
                request.mode,
                request.top_k,
                prefix.as_deref(),
                extensions.as_deref(),
            )
            .await?
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        debug!(
            query,
            mode = request.mode.as_str(),
            results = results.len(),
            duration_ms,
            "search finished"
        );
        self.log_query(query, request.mode, results.len(), duration_ms)
            .await;

        Ok(SearchResponse {
            query: query.to_string(),
            mode: request.mode,
            results,
            duration_ms,
        })
    }

    async fn run_mode(
        &self,
        query: &str,
        mode: SearchMode,
        top_k: usize,
        prefix: Option<&str>,
        extensions: Option<&[String]>,
    ) -> Result<Vec<SearchResult>> {
        let fuzzy_min = self.settings.fuzzy.min_score;
        let semantic_min = self.settings.semantic_min_score;
        let preview = self.settings.preview_chars;

        match mode {
            SearchMode::Semantic => {
                let hits = self
                    .semantic
                    .search_files(query, prefix, extensions, top_k, semantic_min)
                    .await?;
                let only_semantic = FusionWeights {
                    semantic: 1.0,
                    fuzzy: 0.0,
                };
                Ok(fuse(&hits, &[], top_k, &only_semantic, preview))
            }
            SearchMode::Fuzzy => {
                let hits = self
                    .fuzzy
                    .search(query, prefix, extensions, top_k, fuzzy_min)
                    .await?;
                let only_fuzzy = FusionWeights {
                    semantic: 0.0,
                    fuzzy: 1.0,
                };
                Ok(fuse(&[], &hits, top_k, &only_fuzzy, preview))
            }
            SearchMode::Combined => {
                let candidates = top_k.saturating_mul(2);
                let semantic_hits = if self.provider.is_enabled() {
                    self.semantic
                        .search_files(query, prefix, extensions, candidates, semantic_min)
                        .await?
                } else {
                    Vec::new()
                };
                let fuzzy_hits = self
                    .fuzzy
                    .search(query, prefix, extensions, candidates, fuzzy_min)
                    .await?;
                Ok(fuse(
                    &semantic_hits,
                    &fuzzy_hits,
                    top_k,
                    &self.settings.weights,
                    preview,
                ))
            }
        }
    }

    /// Metadata for one indexed file.
    pub async fn get(&self, path: &Path) -> Result<FileRecord> {
        let resolved = walk::resolve_path(path);
        self.store.get(&resolved.to_string_lossy()).await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        stats::collect(&self.pool, &self.store, &self.index).await
    }

    /// Delete every file, vector and query log entry. Returns the number of
    /// files removed.
    pub async fn clear(&self) -> Result<u64> {
        self.index.clear().await?;
        let removed = self.store.clear().await?;
        self.clear_history().await?;
        Ok(removed)
    }

    /// Most recent query log entries, newest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<QueryLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT query, mode, result_count, duration_ms, searched_at
            FROM search_history
            ORDER BY searched_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| QueryLogEntry {
                query: r.get("query"),
                mode: r.get("mode"),
                result_count: r.get("result_count"),
                duration_ms: r.get("duration_ms"),
                searched_at: r.get("searched_at"),
            })
            .collect())
    }

    pub async fn clear_history(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM search_history")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Best effort: a failed write never fails the search.
    async fn log_query(&self, query: &str, mode: SearchMode, count: usize, duration_ms: u64) {
        let result = sqlx::query(
            r#"
            INSERT INTO search_history (query, mode, result_count, duration_ms, searched_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(query)
        .bind(mode.as_str())
        .bind(count as i64)
        .bind(duration_ms as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(error = %e, "failed to record search history");
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Directories match everything below them; anything else is a raw prefix.
fn path_prefix(path: &Path) -> String {
    let resolved = walk::resolve_path(path);
    if resolved.is_dir() {
        walk::dir_prefix(&resolved)
    } else {
        resolved.to_string_lossy().to_string()
    }
}
