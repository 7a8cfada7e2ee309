//! Per-chunk vector storage and brute-force similarity search.
//!
//! [`EmbeddingIndex`] owns the `embeddings` table. Vectors are keyed by
//! `(file, model, chunk_index)` and stored as little-endian `f32` BLOBs.
//!
//! # Replacement
//!
//! [`EmbeddingIndex::commit_file`] writes a file's record and swaps its
//! vectors inside one transaction, so a stored content hash always
//! describes the stored vectors. Writers to the same path are serialized
//! by a fixed set of lock stripes. Readers either see the old set or the
//! new set, never a mix.
//!
//! # Querying
//!
//! The index is partitioned by model identifier and dimensionality: a
//! query only compares against vectors produced by the same model with the
//! same number of dimensions. Every candidate in the partition is scored
//! with cosine similarity and candidates below `min_score` are dropped.
//! [`EmbeddingIndex::query`] ranks chunks; [`EmbeddingIndex::query_files`]
//! keeps the best chunk of each file and ranks files. Both order by score
//! (desc), path (asc), chunk index (asc) before truncating to `top_k`.

use sqlx::sqlite::SqliteConnection;
use sqlx::{Row, SqlitePool};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{Chunk, EmbeddingRecord, FileRecord, SemanticResult};
use crate::store::{prefix_range, upsert_record};

const LOCK_STRIPES: usize = 64;

/// Inputs for one similarity query.
#[derive(Debug, Clone)]
pub struct VectorQuery<'a> {
    pub vector: &'a [f32],
    /// Model that produced `vector`; selects the comparable partition.
    pub model: &'a str,
    pub path_prefix: Option<&'a str>,
    pub extensions: Option<&'a [String]>,
    pub top_k: usize,
    pub min_score: f64,
}

#[derive(Clone)]
pub struct EmbeddingIndex {
    pool: SqlitePool,
    write_locks: Arc<Vec<tokio::sync::Mutex<()>>>,
}

impl EmbeddingIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_locks: Arc::new((0..LOCK_STRIPES).map(|_| tokio::sync::Mutex::new(())).collect()),
        }
    }

    fn stripe(&self, path: &str) -> &tokio::sync::Mutex<()> {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        &self.write_locks[(hasher.finish() as usize) % self.write_locks.len()]
    }

    /// Upsert `record` and swap its vectors in one transaction.
    ///
    /// `chunks` and `vectors` pair up by position and must have the same
    /// length; an empty set clears the file's vectors. On any failure
    /// neither the record nor the vectors change. Returns the file id.
    pub async fn commit_file(
        &self,
        record: &FileRecord,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
    ) -> Result<i64> {
        check_pairs(chunks, vectors)?;

        let _guard = self.stripe(&record.path).lock().await;
        let mut tx = self.pool.begin().await?;
        let (file_id, _) = upsert_record(&mut *tx, record).await?;
        write_vectors(&mut *tx, file_id, chunks, vectors, model).await?;
        tx.commit().await?;
        Ok(file_id)
    }

    /// Swap the vectors stored for an existing file.
    pub async fn replace(
        &self,
        file_id: i64,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
    ) -> Result<()> {
        check_pairs(chunks, vectors)?;

        let mut tx = self.pool.begin().await?;
        let path: String = sqlx::query_scalar("SELECT path FROM files WHERE id = ?")
            .bind(file_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file id {}", file_id)))?;
        let _guard = self.stripe(&path).lock().await;
        write_vectors(&mut *tx, file_id, chunks, vectors, model).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Whether `path` has any vectors produced by `model`.
    pub async fn has_vectors(&self, path: &str, model: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM embeddings e
            JOIN files f ON f.id = e.file_id
            WHERE f.path = ? AND e.model = ?
            LIMIT 1
            "#,
        )
        .bind(path)
        .bind(model)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// Chunks most similar to `q.vector`, best first.
    ///
    /// An empty index (or empty partition) yields an empty result.
    pub async fn query(&self, q: &VectorQuery<'_>) -> Result<Vec<SemanticResult>> {
        let mut results = self.scan(q).await?;
        results.sort_by(compare_semantic);
        results.truncate(q.top_k);
        Ok(results)
    }

    /// Files most similar to `q.vector`, one hit per file (its best chunk),
    /// best first. `q.top_k` counts files, not chunks.
    pub async fn query_files(&self, q: &VectorQuery<'_>) -> Result<Vec<SemanticResult>> {
        let mut results = best_per_file(self.scan(q).await?);
        results.sort_by(compare_semantic);
        results.truncate(q.top_k);
        Ok(results)
    }

    /// Every chunk in the query's partition scoring at least `min_score`.
    async fn scan(&self, q: &VectorQuery<'_>) -> Result<Vec<SemanticResult>> {
        if q.top_k == 0 {
            return Err(Error::config("top_k must be >= 1"));
        }
        if q.vector.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r#"
            SELECT f.path, e.chunk_index, e.chunk_text, e.embedding
            FROM embeddings e
            JOIN files f ON f.id = e.file_id
            WHERE e.model = ? AND e.dims = ?
            "#,
        );
        let range = q.path_prefix.filter(|p| !p.is_empty()).map(prefix_range);
        if let Some((_, upper)) = &range {
            sql.push_str(" AND f.path >= ?");
            if upper.is_some() {
                sql.push_str(" AND f.path < ?");
            }
        }
        let exts = q.extensions.filter(|e| !e.is_empty());
        if let Some(exts) = exts {
            let placeholders = vec!["?"; exts.len()].join(", ");
            sql.push_str(&format!(" AND f.extension IN ({})", placeholders));
        }

        let mut query = sqlx::query(&sql)
            .bind(q.model)
            .bind(q.vector.len() as i64);
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

        Ok(rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                let score = cosine_similarity(q.vector, &stored) as f64;
                if score < q.min_score {
                    return None;
                }
                Some(SemanticResult {
                    file_path: row.get("path"),
                    chunk_index: row.get("chunk_index"),
                    chunk_text: row.get("chunk_text"),
                    score,
                })
            })
            .collect())
    }

    /// All vectors stored for `path`, ordered by model then chunk index.
    pub async fn records_for_file(&self, path: &str) -> Result<Vec<EmbeddingRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT f.path, e.chunk_index, e.chunk_text, e.embedding, e.model, e.created_at
            FROM embeddings e
            JOIN files f ON f.id = e.file_id
            WHERE f.path = ?
            ORDER BY e.model ASC, e.chunk_index ASC
            "#,
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                EmbeddingRecord {
                    file_path: row.get("path"),
                    chunk_index: row.get("chunk_index"),
                    chunk_text: row.get("chunk_text"),
                    vector: blob_to_vec(&blob),
                    model: row.get("model"),
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Vector counts per `(model, dims)` partition.
    pub async fn partitions(&self) -> Result<Vec<(String, i64, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT model, dims, COUNT(*) AS n
            FROM embeddings
            GROUP BY model, dims
            ORDER BY n DESC, model ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get("model"), r.get("dims"), r.get("n")))
            .collect())
    }

    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM embeddings")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn check_pairs(chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
        return Err(Error::provider(format!(
            "expected {} vectors, got {}",
            chunks.len(),
            vectors.len()
        )));
    }
    if let Some(first) = vectors.first() {
        if first.is_empty() || vectors.iter().any(|v| v.len() != first.len()) {
            return Err(Error::provider(
                "embedding batch has inconsistent or empty dimensionality",
            ));
        }
    }
    Ok(())
}

async fn write_vectors(
    conn: &mut SqliteConnection,
    file_id: i64,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    model: &str,
) -> Result<()> {
    sqlx::query("DELETE FROM embeddings WHERE file_id = ?")
        .bind(file_id)
        .execute(&mut *conn)
        .await?;

    let now = chrono::Utc::now().timestamp();
    for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
        sqlx::query(
            r#"
            INSERT INTO embeddings (file_id, chunk_index, chunk_text, embedding, model, dims, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(file_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(vec_to_blob(vector))
        .bind(model)
        .bind(vector.len() as i64)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Keep the highest-scoring chunk of each path; ties go to the lower
/// chunk index.
pub(crate) fn best_per_file(hits: Vec<SemanticResult>) -> Vec<SemanticResult> {
    let mut best: HashMap<String, SemanticResult> = HashMap::new();
    for hit in hits {
        match best.get(&hit.file_path) {
            Some(current) if compare_semantic(current, &hit) != Ordering::Greater => {}
            _ => {
                best.insert(hit.file_path.clone(), hit);
            }
        }
    }
    best.into_values().collect()
}

/// Score desc, then path asc, then chunk index asc.
pub(crate) fn compare_semantic(a: &SemanticResult, b: &SemanticResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.file_path.cmp(&b.file_path))
        .then(a.chunk_index.cmp(&b.chunk_index))
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use filehound::vector_index::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
