//! Schema creation. Idempotent: safe to run on every start.
//!
//! Three logical tables live in one database file:
//!
//! | Table | Owner |
//! |-------|-------|
//! | `files` | [`ContentStore`](crate::store::ContentStore) |
//! | `embeddings` | [`EmbeddingIndex`](crate::vector_index::EmbeddingIndex) |
//! | `search_history` | query log (diagnostics only) |

use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            filename TEXT NOT NULL,
            extension TEXT NOT NULL DEFAULT '',
            content_hash TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            modified_at INTEGER NOT NULL,
            indexed_at INTEGER NOT NULL,
            preview TEXT NOT NULL DEFAULT '',
            is_hidden INTEGER NOT NULL DEFAULT 0,
            is_binary INTEGER NOT NULL DEFAULT 0,
            language TEXT,
            line_count INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One vector per (file, model, chunk). Deleting a file cascades.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            file_id INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            chunk_text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (file_id, model, chunk_index),
            FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query TEXT NOT NULL,
            mode TEXT NOT NULL,
            result_count INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            searched_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // `files.path` already carries the UNIQUE index used for prefix ranges.
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_extension ON files(extension)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_language ON files(language)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_embeddings_model_dims ON embeddings(model, dims)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_search_history_at ON search_history(searched_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
