//! Local inference via fastembed.
//!
//! Models are downloaded on first use from Hugging Face and cached; after
//! that no network calls are needed. Inference runs on the blocking pool.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::{check_batch, EmbeddingProvider, Embeddings};
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";

pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    engine: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());
        // Fail on unknown names at construction, not on first embed.
        to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or_else(|| default_dims(&model_name));

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size.max(1),
            engine: Arc::new(Mutex::new(None)),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Embeddings> {
        let engine = self.engine.clone();
        let model_name = self.model_name.clone();
        let batch_size = self.batch_size;
        let inputs = texts.to_vec();

        let vectors = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut guard = engine
                .lock()
                .map_err(|_| Error::provider("local embedding model lock poisoned"))?;
            if guard.is_none() {
                let options = fastembed::InitOptions::new(to_fastembed_model(&model_name)?)
                    .with_show_download_progress(false);
                let model = fastembed::TextEmbedding::try_new(options).map_err(|e| {
                    Error::provider(format!("Failed to initialize local embedding model: {}", e))
                })?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| Error::provider("local embedding model unavailable"))?;
            model
                .embed(inputs, Some(batch_size))
                .map_err(|e| Error::provider(format!("Local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| Error::provider(format!("local embedding task failed: {}", e)))??;

        check_batch(texts.len(), &vectors)?;
        Ok(Embeddings {
            vectors,
            model: self.model_name.clone(),
        })
    }
}

fn default_dims(name: &str) -> usize {
    match name {
        "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-base" => 768,
        "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
        _ => 384,
    }
}

fn to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => Err(Error::config(format!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ))),
    }
}
