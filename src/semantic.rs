//! Query-side semantic search: embed the query, rank stored chunks.

use std::sync::Arc;
use tracing::debug;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::SemanticResult;
use crate::vector_index::{EmbeddingIndex, VectorQuery};

#[derive(Clone)]
pub struct SemanticSearcher {
    index: EmbeddingIndex,
    provider: Arc<dyn EmbeddingProvider>,
}

impl SemanticSearcher {
    pub fn new(index: EmbeddingIndex, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { index, provider }
    }

    /// Chunks similar to `query`, best first.
    ///
    /// A failing provider yields [`Error::Provider`]; an empty index yields
    /// an empty list.
    pub async fn search(
        &self,
        query: &str,
        path_prefix: Option<&str>,
        extensions: Option<&[String]>,
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<SemanticResult>> {
        self.run(query, path_prefix, extensions, top_k, min_score, false)
            .await
    }

    /// Like [`search`](Self::search), but ranks files by their best chunk
    /// and returns up to `top_k` distinct files.
    pub async fn search_files(
        &self,
        query: &str,
        path_prefix: Option<&str>,
        extensions: Option<&[String]>,
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<SemanticResult>> {
        self.run(query, path_prefix, extensions, top_k, min_score, true)
            .await
    }

    async fn run(
        &self,
        query: &str,
        path_prefix: Option<&str>,
        extensions: Option<&[String]>,
        top_k: usize,
        min_score: f64,
        per_file: bool,
    ) -> Result<Vec<SemanticResult>> {
        if top_k == 0 {
            return Err(Error::config("top_k must be >= 1"));
        }
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let (vector, model) = embed_query(self.provider.as_ref(), query).await?;
        debug!(model = %model, dims = vector.len(), per_file, "embedded query");

        let q = VectorQuery {
            vector: &vector,
            model: &model,
            path_prefix,
            extensions,
            top_k,
            min_score,
        };
        if per_file {
            self.index.query_files(&q).await
        } else {
            self.index.query(&q).await
        }
    }
}
