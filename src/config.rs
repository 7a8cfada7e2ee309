//! TOML configuration parsing and validation.
//!
//! The core never reads configuration on its own: the binary loads a
//! [`Config`] once and converts its sections into the explicit parameter
//! structs each component takes ([`ChunkParams`], [`IndexOptions`],
//! [`FuzzyParams`], [`FusionWeights`]).
//!
//! Every section is optional; a missing file section falls back to the
//! defaults below.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::ChunkParams;
use crate::error::{Error, Result};
use crate::fusion::FusionWeights;
use crate::fuzzy::FuzzyParams;
use crate::indexer::IndexOptions;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/filehound.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
    #[serde(default = "default_max_chars")]
    pub max_stored_chars: usize,
    #[serde(default = "default_max_chars")]
    pub max_embed_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
            max_stored_chars: default_max_chars(),
            max_embed_chars: default_max_chars(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_max_chars() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "default_true")]
    pub ignore_hidden: bool,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_binary_probe_bytes")]
    pub binary_probe_bytes: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            preview_chars: default_preview_chars(),
            ignore_hidden: true,
            max_file_size: default_max_file_size(),
            binary_probe_bytes: default_binary_probe_bytes(),
            workers: default_workers(),
            embed_timeout_secs: default_embed_timeout_secs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_preview_chars() -> usize {
    1000
}
fn default_true() -> bool {
    true
}
fn default_max_file_size() -> u64 {
    1_000_000
}
fn default_binary_probe_bytes() -> usize {
    8192
}
fn default_workers() -> usize {
    4
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_fuzzy_weight")]
    pub fuzzy_weight: f64,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_semantic_min_score")]
    pub semantic_min_score: f64,
    #[serde(default = "default_fuzzy_min_score")]
    pub fuzzy_min_score: f64,
    #[serde(default = "default_content_match_weight")]
    pub content_match_weight: f64,
    #[serde(default = "default_snippet_context_chars")]
    pub snippet_context_chars: usize,
    #[serde(default = "default_result_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "default_fuzzy_max_query_chars")]
    pub fuzzy_max_query_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            fuzzy_weight: default_fuzzy_weight(),
            default_top_k: default_top_k(),
            semantic_min_score: default_semantic_min_score(),
            fuzzy_min_score: default_fuzzy_min_score(),
            content_match_weight: default_content_match_weight(),
            snippet_context_chars: default_snippet_context_chars(),
            preview_chars: default_result_preview_chars(),
            fuzzy_max_query_chars: default_fuzzy_max_query_chars(),
        }
    }
}

fn default_semantic_weight() -> f64 {
    0.6
}
fn default_fuzzy_weight() -> f64 {
    0.4
}
fn default_top_k() -> usize {
    10
}
fn default_semantic_min_score() -> f64 {
    0.5
}
fn default_fuzzy_min_score() -> f64 {
    60.0
}
fn default_content_match_weight() -> f64 {
    0.8
}
fn default_snippet_context_chars() -> usize {
    50
}
fn default_result_preview_chars() -> usize {
    200
}
fn default_fuzzy_max_query_chars() -> usize {
    128
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for HTTP providers (Ollama, OpenAI-compatible gateways).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    pub fn chunk_params(&self) -> ChunkParams {
        ChunkParams {
            size: self.chunking.size,
            overlap: self.chunking.overlap,
            max_stored_chars: self.chunking.max_stored_chars,
            max_embed_chars: self.chunking.max_embed_chars,
        }
    }

    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            extensions: None,
            ignore_hidden: self.indexing.ignore_hidden,
            force: false,
            prune: false,
            chunk: self.chunk_params(),
            preview_chars: self.indexing.preview_chars,
            max_file_size: self.indexing.max_file_size,
            binary_probe_bytes: self.indexing.binary_probe_bytes,
            exclude_globs: self.indexing.exclude_globs.clone(),
            workers: self.indexing.workers,
            embed_timeout: std::time::Duration::from_secs(self.indexing.embed_timeout_secs),
        }
    }

    pub fn fuzzy_params(&self) -> FuzzyParams {
        FuzzyParams {
            min_score: self.search.fuzzy_min_score,
            content_weight: self.search.content_match_weight,
            context_chars: self.search.snippet_context_chars,
            max_query_chars: self.search.fuzzy_max_query_chars,
            ..FuzzyParams::default()
        }
    }

    pub fn fusion_weights(&self) -> FusionWeights {
        FusionWeights {
            semantic: self.search.semantic_weight,
            fuzzy: self.search.fuzzy_weight,
        }
    }

    /// Check every cross-field constraint; called by [`load_config`].
    pub fn validate(&self) -> Result<()> {
        self.chunk_params().validate()?;
        if self.chunking.max_stored_chars == 0 || self.chunking.max_embed_chars == 0 {
            return Err(Error::config("chunking max chars must be > 0"));
        }

        self.fusion_weights().validate()?;

        if self.search.default_top_k < 1 {
            return Err(Error::config("search.default_top_k must be >= 1"));
        }
        if !(0.0..=100.0).contains(&self.search.fuzzy_min_score) {
            return Err(Error::config("search.fuzzy_min_score must be in [0, 100]"));
        }
        if !(0.0..=1.0).contains(&self.search.content_match_weight) {
            return Err(Error::config(
                "search.content_match_weight must be in [0.0, 1.0]",
            ));
        }
        if self.search.fuzzy_max_query_chars == 0 {
            return Err(Error::config("search.fuzzy_max_query_chars must be >= 1"));
        }
        if self.indexing.workers == 0 {
            return Err(Error::config("indexing.workers must be >= 1"));
        }

        match self.embedding.provider.as_str() {
            "disabled" | "hash" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    return Err(Error::config(format!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    )));
                }
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    return Err(Error::config(format!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    )));
                }
            }
            other => {
                return Err(Error::config(format!(
                    "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
                    other
                )))
            }
        }
        if self.embedding.is_enabled() && self.embedding.batch_size == 0 {
            return Err(Error::config("embedding.batch_size must be > 0"));
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))?;
    config.validate()?;
    Ok(config)
}
