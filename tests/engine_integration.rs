//! Library-level tests: index a scratch tree through `SearchEngine` and
//! query it with the offline `hash` provider.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use filehound::embedding::{DisabledProvider, EmbeddingProvider, HashProvider};
use filehound::engine::{SearchEngine, SearchRequest, SearchSettings};
use filehound::error::Error;
use filehound::indexer::{CancelToken, IndexOptions};
use filehound::models::{IndexReport, MatchType, SearchMode};

async fn open_engine(tmp: &TempDir, provider: Arc<dyn EmbeddingProvider>) -> SearchEngine {
    SearchEngine::open(
        &tmp.path().join("db/index.sqlite"),
        provider,
        SearchSettings::default(),
    )
    .await
    .unwrap()
}

async fn index(engine: &SearchEngine, root: &Path) -> IndexReport {
    engine
        .index_directory(root, &IndexOptions::default(), &CancelToken::new())
        .await
        .unwrap()
}

fn project(tmp: &TempDir) -> std::path::PathBuf {
    let root = tmp.path().join("project");
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("src/auth.py"), "def login(user):\n    return True\n").unwrap();
    fs::write(root.join("config.yaml"), "auth:\n  enabled: true\n").unwrap();
    fs::write(root.join("alpha.txt"), "alpha beta gamma\n").unwrap();
    fs::write(root.join("notes.md"), "completely unrelated words here\n").unwrap();
    root
}

#[tokio::test]
async fn test_reindex_unchanged_tree_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let root = project(&tmp);
    let engine = open_engine(&tmp, Arc::new(HashProvider::new(256))).await;

    let first = index(&engine, &root).await;
    assert_eq!(first.indexed, 4);
    assert_eq!(first.errors, 0);
    let chunks_after_first = engine.stats().await.unwrap().chunks;

    let second = index(&engine, &root).await;
    assert_eq!(second.indexed, 0);
    assert_eq!(second.skipped, 4);

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.files, 4);
    assert_eq!(stats.chunks, chunks_after_first);
}

#[tokio::test]
async fn test_changed_file_is_reindexed() {
    let tmp = TempDir::new().unwrap();
    let root = project(&tmp);
    let engine = open_engine(&tmp, Arc::new(HashProvider::new(256))).await;
    index(&engine, &root).await;

    let before = engine.get(&root.join("alpha.txt")).await.unwrap();
    fs::write(root.join("alpha.txt"), "delta epsilon zeta\n").unwrap();

    let report = index(&engine, &root).await;
    assert_eq!(report.indexed, 1);
    assert_eq!(report.skipped, 3);

    let after = engine.get(&root.join("alpha.txt")).await.unwrap();
    assert_ne!(before.content_hash, after.content_hash);
    assert!(after.preview.contains("epsilon"));

    let records = engine
        .index()
        .records_for_file(&after.path)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].chunk_text.contains("epsilon"));
}

#[tokio::test]
async fn test_force_reindexes_everything() {
    let tmp = TempDir::new().unwrap();
    let root = project(&tmp);
    let engine = open_engine(&tmp, Arc::new(HashProvider::new(64))).await;
    index(&engine, &root).await;

    let options = IndexOptions {
        force: true,
        ..IndexOptions::default()
    };
    let report = engine
        .index_directory(&root, &options, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(report.indexed, 4);
    assert_eq!(report.skipped, 0);
}

#[tokio::test]
async fn test_binary_file_matches_by_name_only() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("assets");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("logo.png"), [0x89, b'P', b'N', b'G', 0x00, 0x01, 0x02]).unwrap();
    let engine = open_engine(&tmp, Arc::new(HashProvider::new(64))).await;

    let report = index(&engine, &root).await;
    assert_eq!(report.indexed, 1);
    assert_eq!(report.binary, 1);
    assert_eq!(report.chunks, 0);

    let record = engine.get(&root.join("logo.png")).await.unwrap();
    assert!(record.is_binary);
    assert!(record.preview.is_empty());

    let response = engine
        .search(&SearchRequest::new("logo", SearchMode::Fuzzy, 5))
        .await
        .unwrap();
    assert_eq!(response.results.len(), 1);
    assert!(response.results[0].file_path.ends_with("logo.png"));

    let response = engine
        .search(&SearchRequest::new("png", SearchMode::Semantic, 5))
        .await
        .unwrap();
    assert!(response.results.is_empty());
}

#[tokio::test]
async fn test_fuzzy_ranking_for_two_word_query() {
    let tmp = TempDir::new().unwrap();
    let root = project(&tmp);
    let engine = open_engine(&tmp, Arc::new(DisabledProvider)).await;
    index(&engine, &root).await;

    let response = engine
        .search(&SearchRequest::new("auth config", SearchMode::Fuzzy, 10))
        .await
        .unwrap();
    let paths: Vec<&str> = response
        .results
        .iter()
        .map(|r| r.file_path.as_str())
        .collect();
    assert_eq!(paths.len(), 2);
    assert!(paths[0].ends_with("auth.py"));
    assert!(paths[1].ends_with("config.yaml"));
    assert!(response.results[0].score > response.results[1].score);
}

#[tokio::test]
async fn test_semantic_exact_text_ranks_first() {
    let tmp = TempDir::new().unwrap();
    let root = project(&tmp);
    let engine = open_engine(&tmp, Arc::new(HashProvider::new(256))).await;
    index(&engine, &root).await;

    let response = engine
        .search(&SearchRequest::new("alpha beta gamma", SearchMode::Semantic, 5))
        .await
        .unwrap();
    assert_eq!(response.results.len(), 1);
    let top = &response.results[0];
    assert!(top.file_path.ends_with("alpha.txt"));
    assert_eq!(top.match_type, MatchType::Semantic);
    assert!(top.score > 0.99);
    assert!(top.preview.contains("alpha beta gamma"));
}

#[tokio::test]
async fn test_combined_mode_fuses_both_sources() {
    let tmp = TempDir::new().unwrap();
    let root = project(&tmp);
    let engine = open_engine(&tmp, Arc::new(HashProvider::new(256))).await;
    index(&engine, &root).await;

    let response = engine
        .search(&SearchRequest::new("alpha beta gamma", SearchMode::Combined, 5))
        .await
        .unwrap();
    let top = &response.results[0];
    assert!(top.file_path.ends_with("alpha.txt"));
    assert_eq!(top.match_type, MatchType::Both);
    assert!(top.semantic_score.unwrap() > 0.99);
    // Content match at full strength, scaled by the content multiplier.
    assert!((top.fuzzy_score.unwrap() - 0.8).abs() < 1e-9);
    assert!((top.score - (0.6 * top.semantic_score.unwrap() + 0.4 * 0.8)).abs() < 1e-9);
}

#[tokio::test]
async fn test_smaller_top_k_is_a_prefix() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("reports");
    fs::create_dir_all(&root).unwrap();
    for name in ["report.txt", "reports.csv", "report_2024.md", "rapport.txt", "summary.txt"] {
        fs::write(root.join(name), format!("contents of {}\n", name)).unwrap();
    }
    let engine = open_engine(&tmp, Arc::new(DisabledProvider)).await;
    index(&engine, &root).await;

    let wide = engine
        .search(&SearchRequest::new("report", SearchMode::Fuzzy, 4))
        .await
        .unwrap()
        .results;
    for k in 1..=wide.len() {
        let narrow = engine
            .search(&SearchRequest::new("report", SearchMode::Fuzzy, k))
            .await
            .unwrap()
            .results;
        assert_eq!(narrow.len(), k);
        assert_eq!(narrow[..], wide[..k]);
    }
}

#[tokio::test]
async fn test_unrelated_query_scores_below_threshold() {
    let tmp = TempDir::new().unwrap();
    let root = project(&tmp);
    let engine = open_engine(&tmp, Arc::new(DisabledProvider)).await;
    index(&engine, &root).await;

    let response = engine
        .search(&SearchRequest::new("xqzvkw", SearchMode::Fuzzy, 10))
        .await
        .unwrap();
    assert!(response.results.is_empty());
}

#[tokio::test]
async fn test_deleted_files_are_pruned() {
    let tmp = TempDir::new().unwrap();
    let root = project(&tmp);
    let engine = open_engine(&tmp, Arc::new(HashProvider::new(64))).await;
    index(&engine, &root).await;

    fs::remove_file(root.join("notes.md")).unwrap();
    let options = IndexOptions {
        prune: true,
        ..IndexOptions::default()
    };
    let report = engine
        .index_directory(&root, &options, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(report.pruned, 1);
    assert!(matches!(
        engine.get(&root.join("notes.md")).await,
        Err(Error::NotFound(_))
    ));
    assert_eq!(engine.stats().await.unwrap().files, 3);
}

#[tokio::test]
async fn test_missing_root_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let engine = open_engine(&tmp, Arc::new(DisabledProvider)).await;
    let err = engine
        .index_directory(
            &tmp.path().join("nope"),
            &IndexOptions::default(),
            &CancelToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_cancelled_run_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let root = project(&tmp);
    let engine = open_engine(&tmp, Arc::new(HashProvider::new(64))).await;

    let cancel = CancelToken::new();
    cancel.cancel();
    let report = engine
        .index_directory(&root, &IndexOptions::default(), &cancel)
        .await
        .unwrap();
    assert!(report.cancelled);
    assert_eq!(report.indexed, 0);
    assert_eq!(engine.stats().await.unwrap().files, 0);
}

#[tokio::test]
async fn test_combined_two_word_query_with_embeddings() {
    let tmp = TempDir::new().unwrap();
    let root = project(&tmp);
    let engine = open_engine(&tmp, Arc::new(HashProvider::new(256))).await;
    index(&engine, &root).await;

    let response = engine
        .search(&SearchRequest::new("auth config", SearchMode::Combined, 10))
        .await
        .unwrap();
    let results = &response.results;
    assert!(results.iter().any(|r| r.file_path.ends_with("auth.py")));
    assert!(results.iter().any(|r| r.file_path.ends_with("config.yaml")));
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    let narrow = engine
        .search(&SearchRequest::new("auth config", SearchMode::Combined, 1))
        .await
        .unwrap();
    assert_eq!(narrow.results.len(), 1);
}

#[tokio::test]
async fn test_many_chunk_file_does_not_crowd_out_others() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("docs");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("a_long.txt"), "alpha beta gamma ".repeat(200)).unwrap();
    fs::write(root.join("b_short.txt"), "alpha beta gamma delta\n").unwrap();
    let engine = open_engine(&tmp, Arc::new(HashProvider::new(256))).await;

    let report = index(&engine, &root).await;
    assert!(report.chunks > 4);

    let response = engine
        .search(&SearchRequest::new("alpha beta gamma", SearchMode::Semantic, 2))
        .await
        .unwrap();
    let paths: Vec<&str> = response
        .results
        .iter()
        .map(|r| r.file_path.as_str())
        .collect();
    assert_eq!(paths.len(), 2);
    assert!(paths.iter().any(|p| p.ends_with("a_long.txt")));
    assert!(paths.iter().any(|p| p.ends_with("b_short.txt")));
}
