//! Content-addressed file metadata store.
//!
//! [`ContentStore`] owns the `files` table: at most one [`FileRecord`] per
//! absolute path, with the content hash deciding whether a file must be
//! re-embedded. Deleting a record cascades to its vectors in the
//! `embeddings` table.
//!
//! Prefix listing is a range scan on the unique `path` index
//! (`path >= prefix AND path < upper_bound(prefix)`), so it never degrades
//! into a full table scan for large trees.

use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};
use crate::models::FileRecord;

const SELECT_COLUMNS: &str = "path, filename, extension, content_hash, size_bytes, modified_at, \
     indexed_at, preview, is_hidden, is_binary, language, line_count";

#[derive(Clone)]
pub struct ContentStore {
    pool: SqlitePool,
}

impl ContentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace the record for `record.path`.
    ///
    /// Returns `true` when no record existed or the stored hash differed.
    pub async fn upsert(&self, record: &FileRecord) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let (_, changed) = upsert_record(&mut *tx, record).await?;
        tx.commit().await?;
        Ok(changed)
    }

    /// Fetch the record for `path`, failing with [`Error::NotFound`].
    pub async fn get(&self, path: &str) -> Result<FileRecord> {
        self.find(path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file not indexed: {}", path)))
    }

    pub async fn find(&self, path: &str) -> Result<Option<FileRecord>> {
        let sql = format!("SELECT {} FROM files WHERE path = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_record))
    }

    /// Row id for `path`, used as the owning key for vectors.
    pub async fn file_id(&self, path: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM files WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    /// Delete the record for `path` and, by cascade, all of its vectors.
    pub async fn delete(&self, path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All records whose path starts with `prefix` (all records if `None`),
    /// ordered by path.
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<FileRecord>> {
        self.list_filtered(prefix, None).await
    }

    /// Records under `prefix`, optionally restricted to a set of
    /// extensions. This is the candidate set for fuzzy search; binary
    /// records are included so their filenames stay matchable.
    pub async fn list_searchable(
        &self,
        prefix: Option<&str>,
        extensions: Option<&[String]>,
    ) -> Result<Vec<FileRecord>> {
        self.list_filtered(prefix, extensions).await
    }

    async fn list_filtered(
        &self,
        prefix: Option<&str>,
        extensions: Option<&[String]>,
    ) -> Result<Vec<FileRecord>> {
        let mut sql = format!("SELECT {} FROM files WHERE 1 = 1", SELECT_COLUMNS);
        let range = prefix.filter(|p| !p.is_empty()).map(prefix_range);

        if let Some((_, upper)) = &range {
            sql.push_str(" AND path >= ?");
            if upper.is_some() {
                sql.push_str(" AND path < ?");
            }
        }
        let exts = extensions.filter(|e| !e.is_empty());
        if let Some(exts) = exts {
            let placeholders = vec!["?"; exts.len()].join(", ");
            sql.push_str(&format!(" AND extension IN ({})", placeholders));
        }
        sql.push_str(" ORDER BY path ASC");

        let mut query = sqlx::query(&sql);
        if let Some((lower, upper)) = &range {
            query = query.bind(lower.clone());
            if let Some(upper) = upper {
                query = query.bind(upper.clone());
            }
        }
        if let Some(exts) = exts {
            for ext in exts {
                query = query.bind(ext.clone());
            }
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn count_binary(&self) -> Result<i64> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE is_binary = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Most common language tags, descending by file count.
    pub async fn language_counts(&self, limit: i64) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT language, COUNT(*) AS n
            FROM files
            WHERE language IS NOT NULL
            GROUP BY language
            ORDER BY n DESC, language ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>("language"), r.get::<i64, _>("n")))
            .collect())
    }

    /// Delete every record (vectors cascade). Returns the number removed.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM files").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// Upsert inside the caller's transaction. Returns the row id and whether
/// the content hash changed.
pub(crate) async fn upsert_record(
    conn: &mut SqliteConnection,
    record: &FileRecord,
) -> Result<(i64, bool)> {
    let previous: Option<String> =
        sqlx::query_scalar("SELECT content_hash FROM files WHERE path = ?")
            .bind(&record.path)
            .fetch_optional(&mut *conn)
            .await?;

    sqlx::query(
        r#"
        INSERT INTO files (path, filename, extension, content_hash, size_bytes, modified_at,
                           indexed_at, preview, is_hidden, is_binary, language, line_count)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            filename = excluded.filename,
            extension = excluded.extension,
            content_hash = excluded.content_hash,
            size_bytes = excluded.size_bytes,
            modified_at = excluded.modified_at,
            indexed_at = excluded.indexed_at,
            preview = excluded.preview,
            is_hidden = excluded.is_hidden,
            is_binary = excluded.is_binary,
            language = excluded.language,
            line_count = excluded.line_count
        "#,
    )
    .bind(&record.path)
    .bind(&record.filename)
    .bind(&record.extension)
    .bind(&record.content_hash)
    .bind(record.size_bytes)
    .bind(record.modified_at)
    .bind(record.indexed_at)
    .bind(&record.preview)
    .bind(record.is_hidden)
    .bind(record.is_binary)
    .bind(&record.language)
    .bind(record.line_count)
    .execute(&mut *conn)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM files WHERE path = ?")
        .bind(&record.path)
        .fetch_one(&mut *conn)
        .await?;

    Ok((id, previous.as_deref() != Some(record.content_hash.as_str())))
}

fn row_to_record(row: &SqliteRow) -> FileRecord {
    FileRecord {
        path: row.get("path"),
        filename: row.get("filename"),
        extension: row.get("extension"),
        content_hash: row.get("content_hash"),
        size_bytes: row.get("size_bytes"),
        modified_at: row.get("modified_at"),
        indexed_at: row.get("indexed_at"),
        preview: row.get("preview"),
        is_hidden: row.get("is_hidden"),
        is_binary: row.get("is_binary"),
        language: row.get("language"),
        line_count: row.get("line_count"),
    }
}

/// Half-open `[lower, upper)` range of strings starting with `prefix`
/// under SQLite's binary collation. `upper` is `None` when no finite bound
/// exists.
pub(crate) fn prefix_range(prefix: &str) -> (String, Option<String>) {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = next_char(last) {
            chars.push(next);
            return (prefix.to_string(), Some(chars.into_iter().collect()));
        }
    }
    (prefix.to_string(), None)
}

fn next_char(c: char) -> Option<char> {
    let mut code = c as u32 + 1;
    while code <= char::MAX as u32 {
        if let Some(next) = char::from_u32(code) {
            return Some(next);
        }
        code += 1;
    }
    None
}
