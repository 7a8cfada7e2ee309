//! Index statistics.
//!
//! Summarizes what is indexed: file and binary counts, vector counts per
//! embedding model, the most common languages, and the database size.
//! Used by `fh stats` to give confidence that indexing and embedding work.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::store::ContentStore;
use crate::vector_index::EmbeddingIndex;

/// Vector count for one `(model, dims)` partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStats {
    pub model: String,
    pub dims: i64,
    pub chunks: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub files: i64,
    pub binary_files: i64,
    pub chunks: i64,
    pub models: Vec<ModelStats>,
    pub languages: Vec<(String, i64)>,
    pub db_size_bytes: u64,
    pub searches: i64,
    pub last_indexed_at: Option<i64>,
}

impl IndexStats {
    pub fn has_embeddings(&self) -> bool {
        self.chunks > 0
    }
}

pub async fn collect(
    pool: &SqlitePool,
    store: &ContentStore,
    index: &EmbeddingIndex,
) -> Result<IndexStats> {
    let models = index
        .partitions()
        .await?
        .into_iter()
        .map(|(model, dims, chunks)| ModelStats {
            model,
            dims,
            chunks,
        })
        .collect();

    let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
        .fetch_one(pool)
        .await?;
    let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
        .fetch_one(pool)
        .await?;
    let searches: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_history")
        .fetch_one(pool)
        .await?;
    let last_indexed_at: Option<i64> = sqlx::query_scalar("SELECT MAX(indexed_at) FROM files")
        .fetch_one(pool)
        .await?;

    Ok(IndexStats {
        files: store.count().await?,
        binary_files: store.count_binary().await?,
        chunks: index.count().await?,
        models,
        languages: store.language_counts(10).await?,
        db_size_bytes: (page_count.max(0) * page_size.max(0)) as u64,
        searches,
        last_indexed_at,
    })
}

/// Human-readable summary, one line per fact.
pub fn render(stats: &IndexStats, db_path: &str) -> String {
    let mut out = String::new();
    out.push_str("filehound index stats\n");
    out.push_str("=====================\n\n");
    out.push_str(&format!("  Database:    {}\n", db_path));
    out.push_str(&format!("  Size:        {}\n\n", format_bytes(stats.db_size_bytes)));
    out.push_str(&format!("  Files:       {}\n", stats.files));
    out.push_str(&format!("  Binary:      {}\n", stats.binary_files));
    out.push_str(&format!("  Chunks:      {}\n", stats.chunks));
    out.push_str(&format!("  Searches:    {}\n", stats.searches));
    out.push_str(&format!(
        "  Last index:  {}\n",
        stats
            .last_indexed_at
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    ));

    if !stats.models.is_empty() {
        out.push_str("\n  By model:\n");
        out.push_str(&format!("  {:<32} {:>6} {:>8}\n", "MODEL", "DIMS", "CHUNKS"));
        out.push_str(&format!("  {}\n", "-".repeat(48)));
        for m in &stats.models {
            out.push_str(&format!("  {:<32} {:>6} {:>8}\n", m.model, m.dims, m.chunks));
        }
    }

    if !stats.languages.is_empty() {
        out.push_str("\n  Languages:\n");
        for (lang, n) in &stats.languages {
            out.push_str(&format!("  {:<16} {:>8}\n", lang, n));
        }
    }

    out
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        format_ts_iso(ts)
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_relative_time() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
    }

    #[test]
    fn test_render_lists_models_and_languages() {
        let stats = IndexStats {
            files: 3,
            binary_files: 1,
            chunks: 2,
            models: vec![ModelStats {
                model: "feature-hash-256".to_string(),
                dims: 256,
                chunks: 2,
            }],
            languages: vec![("python".to_string(), 1)],
            db_size_bytes: 4096,
            searches: 0,
            last_indexed_at: None,
        };
        let text = render(&stats, "/tmp/x.sqlite");
        assert!(text.contains("feature-hash-256"));
        assert!(text.contains("python"));
        assert!(text.contains("4.0 KB"));
        assert!(text.contains("never"));
        assert!(stats.has_embeddings());
    }
}
