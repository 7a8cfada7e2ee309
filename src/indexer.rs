//! Directory indexing pipeline.
//!
//! Coordinates walk → scan → change detection → chunking → embedding →
//! storage for every file under a root. Files are processed concurrently
//! on a bounded worker pool; one file's failure is logged, counted and
//! never aborts the run.
//!
//! Per file:
//! 1. read and hash the content (binary files are detected here);
//! 2. skip when the stored hash matches, the file already has vectors from
//!    the active model (if it should have any) and `force` is off;
//! 3. for text, chunk and embed all chunks in one batched provider call;
//! 4. upsert the [`FileRecord`] and replace its vectors in one transaction.
//!
//! Embedding runs before anything is written, so a provider failure leaves
//! the previous record and vectors in place and the file is retried on the
//! next run.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::chunk::{chunk_text, ChunkParams};
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::models::{Chunk, FileRecord, IndexReport};
use crate::store::ContentStore;
use crate::vector_index::EmbeddingIndex;
use crate::walk::{self, ScanLimits, WalkEntry, WalkFilter};

/// Options for one [`Indexer::index_directory`] run.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Normalized extensions to admit; `None` admits all.
    pub extensions: Option<Vec<String>>,
    pub ignore_hidden: bool,
    /// Re-index files whose hash is unchanged.
    pub force: bool,
    /// Delete records of vanished files under the root after the walk.
    pub prune: bool,
    pub chunk: ChunkParams,
    pub preview_chars: usize,
    pub max_file_size: u64,
    pub binary_probe_bytes: usize,
    pub exclude_globs: Vec<String>,
    pub workers: usize,
    pub embed_timeout: Duration,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            extensions: None,
            ignore_hidden: true,
            force: false,
            prune: false,
            chunk: ChunkParams::default(),
            preview_chars: 1000,
            max_file_size: 1_000_000,
            binary_probe_bytes: 8192,
            exclude_globs: Vec::new(),
            workers: 4,
            embed_timeout: Duration::from_secs(30),
        }
    }
}

impl IndexOptions {
    fn walk_filter(&self) -> WalkFilter {
        WalkFilter {
            ignore_hidden: self.ignore_hidden,
            extensions: self
                .extensions
                .as_ref()
                .map(|exts| exts.iter().map(|e| walk::normalize_extension(e)).collect()),
            exclude_globs: self.exclude_globs.clone(),
        }
    }

    fn scan_limits(&self) -> ScanLimits {
        ScanLimits {
            preview_chars: self.preview_chars,
            max_file_size: self.max_file_size,
            binary_probe_bytes: self.binary_probe_bytes,
        }
    }
}

/// Cooperative cancellation flag shared between a run and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Counters {
    indexed: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
    binary: AtomicU64,
    chunks: AtomicU64,
    error_details: Mutex<Vec<(String, String)>>,
}

impl Counters {
    fn record_error(&self, path: String, message: String) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.error_details
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((path, message));
    }

    fn snapshot(&self, pruned: u64, cancelled: bool) -> IndexReport {
        IndexReport {
            indexed: self.indexed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            binary: self.binary.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
            pruned,
            cancelled,
            error_details: self
                .error_details
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
        }
    }
}

enum FileOutcome {
    Indexed { chunks: u64, binary: bool },
    Skipped,
    Cancelled,
}

/// Shared state for the per-file tasks.
#[derive(Clone)]
struct Pipeline {
    store: ContentStore,
    index: EmbeddingIndex,
    provider: Arc<dyn EmbeddingProvider>,
    options: Arc<IndexOptions>,
    cancel: CancelToken,
}

#[derive(Clone)]
pub struct Indexer {
    store: ContentStore,
    index: EmbeddingIndex,
    provider: Arc<dyn EmbeddingProvider>,
}

impl Indexer {
    pub fn new(
        store: ContentStore,
        index: EmbeddingIndex,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            index,
            provider,
        }
    }

    /// Index every eligible file under `root`.
    ///
    /// Fails only for problems with the run itself (missing root, invalid
    /// options); per-file failures are reported in the returned counts.
    pub async fn index_directory(
        &self,
        root: &Path,
        options: &IndexOptions,
        cancel: &CancelToken,
    ) -> Result<IndexReport> {
        options.chunk.validate()?;
        if options.workers == 0 {
            return Err(Error::config("workers must be >= 1"));
        }

        let root = walk::resolve_path(root);
        let filter = options.walk_filter();
        let walk_root = root.clone();
        let outcome = tokio::task::spawn_blocking(move || walk::walk_files(&walk_root, &filter))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        info!(
            root = %root.display(),
            files = outcome.files.len(),
            workers = options.workers,
            "indexing directory"
        );

        let counters = Arc::new(Counters::default());
        for (path, message) in outcome.errors {
            warn!(path = %path, error = %message, "failed to read directory entry");
            counters.record_error(path, message);
        }

        let pipeline = Pipeline {
            store: self.store.clone(),
            index: self.index.clone(),
            provider: self.provider.clone(),
            options: Arc::new(options.clone()),
            cancel: cancel.clone(),
        };
        let semaphore = Arc::new(Semaphore::new(options.workers));
        let mut tasks = JoinSet::new();

        for entry in outcome.files {
            if cancel.is_cancelled() {
                break;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| Error::Cancelled)?;
            let pipeline = pipeline.clone();
            let counters = counters.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let path = entry.path.to_string_lossy().to_string();
                match pipeline.process_file(entry).await {
                    Ok(FileOutcome::Indexed { chunks, binary }) => {
                        counters.indexed.fetch_add(1, Ordering::Relaxed);
                        counters.chunks.fetch_add(chunks, Ordering::Relaxed);
                        if binary {
                            counters.binary.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Ok(FileOutcome::Skipped) => {
                        counters.skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(FileOutcome::Cancelled) => {}
                    Err(e) => {
                        warn!(path = %path, error = %e, "failed to index file");
                        counters.record_error(path, e.to_string());
                    }
                }
            });

            while let Some(joined) = tasks.try_join_next() {
                log_join_failure(joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            log_join_failure(joined);
        }

        let cancelled = cancel.is_cancelled();
        let pruned = if options.prune && !cancelled {
            self.prune(&root).await?
        } else {
            0
        };

        let report = counters.snapshot(pruned, cancelled);

        info!(
            indexed = report.indexed,
            skipped = report.skipped,
            errors = report.errors,
            binary = report.binary,
            chunks = report.chunks,
            pruned = report.pruned,
            cancelled = report.cancelled,
            "indexing finished"
        );

        Ok(report)
    }

    /// Delete records under `root` whose files no longer exist.
    ///
    /// Vectors go with their records. Returns the number of records removed.
    pub async fn prune(&self, root: &Path) -> Result<u64> {
        let root = walk::resolve_path(root);
        let mut candidates = self.store.list(Some(&walk::dir_prefix(&root))).await?;
        if let Some(exact) = self.store.find(&root.to_string_lossy()).await? {
            candidates.push(exact);
        }

        let mut removed = 0u64;
        for record in candidates {
            if !Path::new(&record.path).exists() && self.store.delete(&record.path).await? {
                debug!(path = %record.path, "pruned vanished file");
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn log_join_failure(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        warn!(error = %e, "indexing task panicked");
    }
}

impl Pipeline {
    async fn process_file(&self, entry: WalkEntry) -> Result<FileOutcome> {
        if self.cancel.is_cancelled() {
            return Ok(FileOutcome::Cancelled);
        }

        let limits = self.options.scan_limits();
        let scanned = tokio::task::spawn_blocking(move || {
            walk::scan_file(&entry.path, entry.is_hidden, &limits)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        let record = scanned.record;
        let chunks = match &scanned.text {
            Some(text) if self.provider.is_enabled() => chunk_text(text, &self.options.chunk)?,
            _ => Vec::new(),
        };

        if !self.options.force && self.is_current(&record, &chunks).await? {
            return Ok(FileOutcome::Skipped);
        }

        let (vectors, model) = self.embed_chunks(&chunks).await?;

        if self.cancel.is_cancelled() {
            return Ok(FileOutcome::Cancelled);
        }

        self.index
            .commit_file(&record, &chunks, &vectors, &model)
            .await?;

        debug!(path = %record.path, chunks = chunks.len(), binary = record.is_binary, "indexed file");
        Ok(FileOutcome::Indexed {
            chunks: chunks.len() as u64,
            binary: record.is_binary,
        })
    }

    /// Same content hash, and vectors from the active model wherever the
    /// file should have any.
    async fn is_current(&self, record: &FileRecord, chunks: &[Chunk]) -> Result<bool> {
        let Some(existing) = self.store.find(&record.path).await? else {
            return Ok(false);
        };
        if existing.content_hash != record.content_hash {
            return Ok(false);
        }
        if chunks.is_empty() {
            return Ok(true);
        }
        self.index
            .has_vectors(&record.path, self.provider.model_name())
            .await
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<(Vec<Vec<f32>>, String)> {
        if chunks.is_empty() {
            return Ok((Vec::new(), self.provider.model_name().to_string()));
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.embed_text.clone()).collect();
        let timeout = self.options.embed_timeout;
        let batch = tokio::time::timeout(timeout, self.provider.embed(&texts))
            .await
            .map_err(|_| Error::Timeout(timeout.as_secs()))??;
        Ok((batch.vectors, batch.model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::embedding::{DisabledProvider, Embeddings, HashProvider};
    use crate::migrate;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, _texts: &[String]) -> Result<Embeddings> {
            Err(Error::provider("upstream unavailable"))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        fn model_name(&self) -> &str {
            "slow"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, texts: &[String]) -> Result<Embeddings> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Embeddings {
                vectors: vec![vec![1.0; 4]; texts.len()],
                model: "slow".to_string(),
            })
        }
    }

    async fn setup(provider: Arc<dyn EmbeddingProvider>) -> (TempDir, Indexer, ContentStore, EmbeddingIndex) {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join("db/test.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        let store = ContentStore::new(pool.clone());
        let index = EmbeddingIndex::new(pool);
        let indexer = Indexer::new(store.clone(), index.clone(), provider);
        (tmp, indexer, store, index)
    }

    fn write_tree(root: &Path) {
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/auth.py"), "def login(user):\n    return True\n").unwrap();
        fs::write(root.join("config.yaml"), "auth:\n  enabled: true\n").unwrap();
        fs::write(root.join("logo.png"), [0x89, b'P', b'N', b'G', 0, 0, 0, 1]).unwrap();
    }

    #[tokio::test]
    async fn test_index_then_reindex_is_idempotent() {
        let (tmp, indexer, store, index) = setup(Arc::new(HashProvider::new(32))).await;
        let root = tmp.path().join("tree");
        write_tree(&root);

        let first = indexer
            .index_directory(&root, &IndexOptions::default(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(first.indexed, 3);
        assert_eq!(first.binary, 1);
        assert_eq!(first.errors, 0);
        assert_eq!(first.chunks, 2);
        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(index.count().await.unwrap(), 2);

        let second = indexer
            .index_directory(&root, &IndexOptions::default(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(second.indexed, 0);
        assert_eq!(second.skipped, 3);
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_force_reindexes_unchanged_files() {
        let (tmp, indexer, _store, _index) = setup(Arc::new(HashProvider::new(16))).await;
        let root = tmp.path().join("tree");
        write_tree(&root);
        let opts = IndexOptions::default();
        indexer.index_directory(&root, &opts, &CancelToken::new()).await.unwrap();

        let forced = IndexOptions {
            force: true,
            ..IndexOptions::default()
        };
        let report = indexer.index_directory(&root, &forced, &CancelToken::new()).await.unwrap();
        assert_eq!(report.indexed, 3);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn test_changed_file_replaces_vectors() {
        let (tmp, indexer, store, index) = setup(Arc::new(HashProvider::new(16))).await;
        let root = tmp.path().join("tree");
        fs::create_dir_all(&root).unwrap();
        let file = root.join("notes.txt");
        fs::write(&file, "x".repeat(1000)).unwrap();
        let opts = IndexOptions::default();
        indexer.index_directory(&root, &opts, &CancelToken::new()).await.unwrap();
        let path = walk::resolve_path(&file).to_string_lossy().to_string();
        assert_eq!(index.records_for_file(&path).await.unwrap().len(), 3);
        let old_hash = store.get(&path).await.unwrap().content_hash;

        fs::write(&file, "short now").unwrap();
        let report = indexer.index_directory(&root, &opts, &CancelToken::new()).await.unwrap();
        assert_eq!(report.indexed, 1);
        let records = index.records_for_file(&path).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].chunk_text, "short now");
        assert_ne!(store.get(&path).await.unwrap().content_hash, old_hash);
    }

    #[tokio::test]
    async fn test_provider_failure_counts_errors_and_continues() {
        let (tmp, indexer, store, index) = setup(Arc::new(FailingProvider)).await;
        let root = tmp.path().join("tree");
        write_tree(&root);

        let report = indexer
            .index_directory(&root, &IndexOptions::default(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(report.errors, 2);
        assert_eq!(report.error_details.len(), 2);
        assert_eq!(report.indexed, 1);
        assert_eq!(report.binary, 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enabling_provider_embeds_unchanged_files() {
        let (tmp, indexer, store, index) = setup(Arc::new(DisabledProvider)).await;
        let root = tmp.path().join("tree");
        write_tree(&root);
        let opts = IndexOptions::default();
        indexer.index_directory(&root, &opts, &CancelToken::new()).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);

        let embedding = Indexer::new(store, index.clone(), Arc::new(HashProvider::new(16)));
        let report = embedding.index_directory(&root, &opts, &CancelToken::new()).await.unwrap();
        assert_eq!(report.indexed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(index.count().await.unwrap(), 2);

        let again = embedding.index_directory(&root, &opts, &CancelToken::new()).await.unwrap();
        assert_eq!(again.indexed, 0);
        assert_eq!(again.skipped, 3);
    }

    #[tokio::test]
    async fn test_disabled_provider_stores_metadata_only() {
        let (tmp, indexer, store, index) = setup(Arc::new(DisabledProvider)).await;
        let root = tmp.path().join("tree");
        write_tree(&root);

        let report = indexer
            .index_directory(&root, &IndexOptions::default(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(report.indexed, 3);
        assert_eq!(report.errors, 0);
        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_embed_timeout_is_an_error() {
        let (tmp, indexer, _store, _index) = setup(Arc::new(SlowProvider)).await;
        let root = tmp.path().join("tree");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), "slow text").unwrap();

        let opts = IndexOptions {
            embed_timeout: Duration::from_millis(50),
            ..IndexOptions::default()
        };
        let report = indexer.index_directory(&root, &opts, &CancelToken::new()).await.unwrap();
        assert_eq!(report.errors, 1);
        assert!(report.error_details[0].1.contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() {
        let (tmp, indexer, store, _index) = setup(Arc::new(HashProvider::new(8))).await;
        let root = tmp.path().join("tree");
        write_tree(&root);
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = indexer
            .index_directory(&root, &IndexOptions::default(), &cancel)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.indexed, 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_extension_filter_and_hidden() {
        let (tmp, indexer, store, _index) = setup(Arc::new(HashProvider::new(8))).await;
        let root = tmp.path().join("tree");
        write_tree(&root);
        fs::write(root.join(".hidden.py"), "secret = 1").unwrap();

        let opts = IndexOptions {
            extensions: Some(vec!["PY".to_string()]),
            ..IndexOptions::default()
        };
        let report = indexer.index_directory(&root, &opts, &CancelToken::new()).await.unwrap();
        assert_eq!(report.indexed, 1);
        let records = store.list(None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "auth.py");

        let with_hidden = IndexOptions {
            ignore_hidden: false,
            ..opts
        };
        let report = indexer
            .index_directory(&root, &with_hidden, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(report.skipped, 1);
        assert!(store.list(None).await.unwrap().iter().any(|r| r.is_hidden));
    }

    #[tokio::test]
    async fn test_prune_removes_vanished_files() {
        let (tmp, indexer, store, index) = setup(Arc::new(HashProvider::new(8))).await;
        let root = tmp.path().join("tree");
        write_tree(&root);
        indexer
            .index_directory(&root, &IndexOptions::default(), &CancelToken::new())
            .await
            .unwrap();

        fs::remove_file(root.join("src/auth.py")).unwrap();
        let opts = IndexOptions {
            prune: true,
            ..IndexOptions::default()
        };
        let report = indexer.index_directory(&root, &opts, &CancelToken::new()).await.unwrap();
        assert_eq!(report.pruned, 1);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_root_fails() {
        let (tmp, indexer, _store, _index) = setup(Arc::new(HashProvider::new(8))).await;
        let err = indexer
            .index_directory(&tmp.path().join("nope"), &IndexOptions::default(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let (tmp, indexer, _store, _index) = setup(Arc::new(HashProvider::new(8))).await;
        let opts = IndexOptions {
            workers: 0,
            ..IndexOptions::default()
        };
        let err = indexer
            .index_directory(tmp.path(), &opts, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
