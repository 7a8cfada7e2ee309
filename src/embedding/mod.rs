//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`HashProvider`]**: deterministic, offline feature-hashing embedder.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API with retry and backoff.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalProvider`**: runs models locally via fastembed (`local-embeddings` feature).
//!
//! # Provider Selection
//!
//! A [`ProviderFactory`] maps a provider tag (`"disabled"`, `"hash"`,
//! `"openai"`, `"ollama"`, `"local"`) to a constructor. A [`ProviderCache`]
//! keeps one instance per `(tag, model)`; it is owned by whoever composes
//! the application and passed down by reference.
//!
//! ```rust
//! # use filehound::config::EmbeddingConfig;
//! # use filehound::embedding::{ProviderCache, ProviderFactory};
//! let factory = ProviderFactory::with_defaults();
//! let cache = ProviderCache::new();
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let provider = cache.get_or_create(&factory, &config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```
//!
//! # Batch contract
//!
//! `embed` returns one vector per input text, in input order, all with the
//! same dimensionality, or fails for the whole batch. [`check_batch`]
//! enforces this on every provider response.

mod http;
#[cfg(feature = "local-embeddings")]
mod local;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

pub use http::{OllamaProvider, OpenAIProvider};
#[cfg(feature = "local-embeddings")]
pub use local::LocalProvider;

/// Vectors for one batch, plus the model that produced them.
#[derive(Debug, Clone)]
pub struct Embeddings {
    pub vectors: Vec<Vec<f32>>,
    pub model: String,
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// `false` for providers that can never produce vectors; the indexer
    /// then stores file metadata without vectors.
    fn is_enabled(&self) -> bool {
        true
    }
    /// Embed a batch of texts. Fails atomically for the whole batch.
    async fn embed(&self, texts: &[String]) -> Result<Embeddings>;
}

/// Embed a single query text (a one-element batch).
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<(Vec<f32>, String)> {
    let batch = provider.embed(&[text.to_string()]).await?;
    let model = batch.model;
    batch
        .vectors
        .into_iter()
        .next()
        .map(|v| (v, model))
        .ok_or_else(|| Error::provider("Empty embedding response"))
}

/// Validate a provider response against the request size.
pub fn check_batch(expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected {
        return Err(Error::provider(format!(
            "provider returned {} vectors for {} inputs",
            vectors.len(),
            expected
        )));
    }
    if let Some(first) = vectors.first() {
        if first.is_empty() {
            return Err(Error::provider("provider returned an empty vector"));
        }
        if vectors.iter().any(|v| v.len() != first.len()) {
            return Err(Error::provider(
                "provider returned vectors of mixed dimensionality",
            ));
        }
    }
    Ok(())
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    fn is_enabled(&self) -> bool {
        false
    }
    async fn embed(&self, _texts: &[String]) -> Result<Embeddings> {
        Err(Error::provider("Embedding provider is disabled"))
    }
}

// ============ Hash Provider ============

const HASH_DEFAULT_DIMS: usize = 256;

/// Deterministic offline embedder.
///
/// Each lower-cased alphanumeric token and each of its char trigrams is
/// hashed (SHA-256) into a signed bucket; the resulting vector is
/// L2-normalized. Texts sharing words or word fragments get a positive
/// cosine similarity, identical texts get `1.0`. No network, no model
/// download; intended for tests and air-gapped use.
pub struct HashProvider {
    model: String,
    dims: usize,
}

impl HashProvider {
    pub fn new(dims: usize) -> Self {
        Self {
            model: format!("feature-hash-{}", dims),
            dims,
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let dims = config.dims.unwrap_or(HASH_DEFAULT_DIMS);
        if dims == 0 {
            return Err(Error::config("embedding.dims must be > 0"));
        }
        let mut provider = Self::new(dims);
        if let Some(model) = &config.model {
            provider.model = model.clone();
        }
        Ok(provider)
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let lower = text.to_lowercase();

        for token in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            self.add_feature(&mut v, token, 1.0);
            let chars: Vec<char> = token.chars().collect();
            if chars.len() > 3 {
                for tri in chars.windows(3) {
                    let gram: String = tri.iter().collect();
                    self.add_feature(&mut v, &format!("#{}", gram), 0.5);
                }
            }
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut idx_bytes = [0u8; 8];
        idx_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(idx_bytes) % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        Ok(Embeddings {
            vectors: texts.iter().map(|t| self.embed_one(t)).collect(),
            model: self.model.clone(),
        })
    }
}

// ============ Factory and cache ============

/// Constructor for one provider type.
pub type ProviderConstructor = fn(&EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>>;

/// Maps provider tags to constructors.
///
/// | Tag | Provider |
/// |-----|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"hash"` | [`HashProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (feature `local-embeddings`) |
pub struct ProviderFactory {
    constructors: HashMap<String, ProviderConstructor>,
}

impl ProviderFactory {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut factory = Self::empty();
        factory.register("disabled", |_| Ok(Arc::new(DisabledProvider)));
        factory.register("hash", |c| Ok(Arc::new(HashProvider::from_config(c)?)));
        factory.register("openai", |c| Ok(Arc::new(OpenAIProvider::new(c)?)));
        factory.register("ollama", |c| Ok(Arc::new(OllamaProvider::new(c)?)));
        #[cfg(feature = "local-embeddings")]
        factory.register("local", |c| Ok(Arc::new(LocalProvider::new(c)?)));
        #[cfg(not(feature = "local-embeddings"))]
        factory.register("local", |_| {
            Err(Error::config(
                "Local embedding provider requires --features local-embeddings",
            ))
        });
        factory
    }

    pub fn register(&mut self, tag: &str, constructor: ProviderConstructor) {
        self.constructors.insert(tag.to_string(), constructor);
    }

    pub fn create(&self, config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        let constructor = self.constructors.get(&config.provider).ok_or_else(|| {
            Error::config(format!("Unknown embedding provider: {}", config.provider))
        })?;
        constructor(config)
    }
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// One provider instance per `(tag, model)`.
#[derive(Default)]
pub struct ProviderCache {
    instances: Mutex<HashMap<(String, String), Arc<dyn EmbeddingProvider>>>,
}

impl ProviderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &self,
        factory: &ProviderFactory,
        config: &EmbeddingConfig,
    ) -> Result<Arc<dyn EmbeddingProvider>> {
        let key = (
            config.provider.clone(),
            config.model.clone().unwrap_or_default(),
        );
        let mut instances = self
            .instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = instances.get(&key) {
            return Ok(existing.clone());
        }
        let provider = factory.create(config)?;
        instances.insert(key, provider.clone());
        Ok(provider)
    }

    pub fn len(&self) -> usize {
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_index::cosine_similarity;

    fn hash_config() -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "hash".to_string(),
            ..EmbeddingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let err = DisabledProvider.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[tokio::test]
    async fn test_hash_provider_deterministic() {
        let p = HashProvider::new(64);
        let a = p.embed(&["hello world".to_string()]).await.unwrap();
        let b = p.embed(&["hello world".to_string()]).await.unwrap();
        assert_eq!(a.vectors, b.vectors);
        assert_eq!(a.vectors[0].len(), 64);
        assert_eq!(a.model, "feature-hash-64");
    }

    #[test]
    fn test_hash_provider_similarity_tracks_overlap() {
        let p = HashProvider::new(256);
        let q = p.embed_one("user login handler");
        let near = p.embed_one("the login handler for users");
        let far = p.embed_one("kubernetes deployment manifest");
        let identical = p.embed_one("user login handler");
        assert!((cosine_similarity(&q, &identical) - 1.0).abs() < 1e-5);
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_hash_provider_empty_text_is_zero_vector() {
        let v = HashProvider::new(16).embed_one("  ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_embed_query_returns_model() {
        let p = HashProvider::new(32);
        let (vec, model) = embed_query(&p, "find me").await.unwrap();
        assert_eq!(vec.len(), 32);
        assert_eq!(model, p.model_name());
    }

    #[test]
    fn test_check_batch() {
        assert!(check_batch(2, &[vec![1.0], vec![2.0]]).is_ok());
        assert!(check_batch(3, &[vec![1.0], vec![2.0]]).is_err());
        assert!(check_batch(2, &[vec![1.0], vec![2.0, 3.0]]).is_err());
        assert!(check_batch(1, &[vec![]]).is_err());
        assert!(check_batch(0, &[]).is_ok());
    }

    #[test]
    fn test_factory_unknown_tag() {
        let factory = ProviderFactory::with_defaults();
        let config = EmbeddingConfig {
            provider: "nope".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(factory.create(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_factory_custom_registration() {
        let mut factory = ProviderFactory::empty();
        factory.register("tiny", |_| Ok(Arc::new(HashProvider::new(4))));
        let config = EmbeddingConfig {
            provider: "tiny".to_string(),
            ..EmbeddingConfig::default()
        };
        assert_eq!(factory.create(&config).unwrap().dims(), 4);
    }

    #[test]
    fn test_cache_reuses_instances() {
        let factory = ProviderFactory::with_defaults();
        let cache = ProviderCache::new();
        let a = cache.get_or_create(&factory, &hash_config()).unwrap();
        let b = cache.get_or_create(&factory, &hash_config()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);

        let other = EmbeddingConfig {
            model: Some("other".to_string()),
            ..hash_config()
        };
        let c = cache.get_or_create(&factory, &other).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.model_name(), "other");
        assert_eq!(cache.len(), 2);
    }
}
