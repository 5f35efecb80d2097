//! Per-collection vector index.
//!
//! Each collection's index is a SQLite database at
//! `vectorstores/<saved_name>/index.sqlite` holding chunk text, source and
//! embedding BLOB. Search is brute-force cosine similarity over every
//! stored vector, which is fine at single-document scale.
//!
//! Chunks are de-duplicated by content hash, so re-adding a document only
//! embeds what is new. An index is marked complete once building
//! finishes; an interrupted build is treated as absent and resumed by the
//! next [`build_index`] call.

use anyhow::{bail, Context, Result};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::chunk::TextSplitter;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use crate::models::{Chunk, Document, ScoredChunk};
use crate::{db, migrate};

pub const INDEX_FILE: &str = "index.sqlite";

const META_MODEL: &str = "model";
const META_DIMS: &str = "dims";
const META_COMPLETE: &str = "complete";

pub struct VectorIndex {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    dir: PathBuf,
    batch_size: usize,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dir", &self.dir)
            .field("model", &self.embedder.model_name())
            .finish()
    }
}

impl VectorIndex {
    /// Opens the index in `dir`, creating it if needed.
    ///
    /// Fails if the index was built with a different embedding model, since
    /// its vectors would not be comparable with new query vectors.
    pub async fn open(dir: &Path, embedder: Arc<dyn Embedder>, batch_size: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;
        let pool = db::connect(&dir.join(INDEX_FILE)).await?;
        migrate::run_migrations(&pool).await?;

        let index = Self {
            pool,
            embedder,
            dir: dir.to_path_buf(),
            batch_size: batch_size.max(1),
        };
        index.check_model().await?;
        Ok(index)
    }

    async fn check_model(&self) -> Result<()> {
        let model = self.embedder.model_name().to_string();
        let dims = self.embedder.dims().to_string();
        match self.meta(META_MODEL).await? {
            None => {
                self.set_meta(META_MODEL, &model).await?;
                self.set_meta(META_DIMS, &dims).await?;
            }
            Some(stored) if stored != model => bail!(
                "index in {} was built with embedding model '{}', but '{}' is configured; \
                 delete the collection and upload it again",
                self.dir.display(),
                stored,
                model
            ),
            Some(_) => {}
        }
        Ok(())
    }

    async fn meta(&self, key: &str) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO index_meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn is_complete(&self) -> Result<bool> {
        Ok(self.meta(META_COMPLETE).await?.as_deref() == Some("1"))
    }

    async fn mark_complete(&self) -> Result<()> {
        self.set_meta(META_COMPLETE, "1").await
    }

    /// Embeds and stores chunks whose hash is not already present.
    /// Returns how many were inserted.
    pub async fn add_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for chunk in chunks {
            if !seen.insert(chunk.hash.as_str()) {
                continue;
            }
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM chunks WHERE hash = ?")
                .bind(&chunk.hash)
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_none() {
                pending.push(chunk);
            }
        }

        let mut inserted = 0;
        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                bail!(
                    "embedding provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                );
            }

            let now = chrono::Utc::now().timestamp();
            let mut tx = self.pool.begin().await?;
            for (chunk, vector) in batch.iter().zip(vectors.iter()) {
                let result = sqlx::query(
                    "INSERT OR IGNORE INTO chunks
                     (id, chunk_index, source, source_row, text, hash, embedding, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(Uuid::new_v4().to_string())
                .bind(chunk.index)
                .bind(&chunk.source)
                .bind(chunk.row.map(|r| r as i64))
                .bind(&chunk.text)
                .bind(&chunk.hash)
                .bind(vec_to_blob(vector))
                .bind(now)
                .execute(&mut *tx)
                .await?;
                inserted += result.rows_affected() as usize;
            }
            tx.commit().await?;
            tracing::debug!(dir = %self.dir.display(), batch = batch.len(), "embedded batch");
        }
        Ok(inserted)
    }

    /// Returns the `k` chunks most similar to `query`, best first.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_query(query).await?;

        let rows = sqlx::query(
            "SELECT text, source, source_row, embedding FROM chunks ORDER BY chunk_index",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let source_row: Option<i64> = row.get("source_row");
                ScoredChunk {
                    text: row.get("text"),
                    source: row.get("source"),
                    row: source_row.map(|r| r as usize),
                    score: cosine_similarity(&query_vec, &blob_to_vec(&blob)),
                }
            })
            .collect();

        // Stable sort: equal scores keep document order.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    pub async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Closes the database connections. Called before the index directory
    /// is removed.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Whether `dir` holds an index database (complete or not).
pub fn index_exists(dir: &Path) -> bool {
    dir.join(INDEX_FILE).is_file()
}

/// Splits `documents`, embeds the chunks into the index in `dir` and marks
/// it complete. Resumes a previously interrupted build.
pub async fn build_index(
    documents: &[Document],
    dir: &Path,
    embedder: Arc<dyn Embedder>,
    splitter: &TextSplitter,
    batch_size: usize,
) -> Result<VectorIndex> {
    let chunks = splitter.split_documents(documents);
    if chunks.is_empty() {
        bail!("nothing to index: documents produced no text chunks");
    }

    let index = VectorIndex::open(dir, embedder, batch_size).await?;
    let inserted = index.add_chunks(&chunks).await?;
    index.mark_complete().await?;
    tracing::info!(
        dir = %dir.display(),
        chunks = chunks.len(),
        inserted,
        "vector index built"
    );
    Ok(index)
}

/// Opens the index in `dir` if a complete one exists.
pub async fn load_index_if_exists(
    dir: &Path,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
) -> Result<Option<VectorIndex>> {
    if !index_exists(dir) {
        return Ok(None);
    }
    let index = VectorIndex::open(dir, embedder, batch_size).await?;
    if !index.is_complete().await? {
        tracing::warn!(dir = %dir.display(), "found incomplete vector index; it will be rebuilt");
        index.close().await;
        return Ok(None);
    }
    Ok(Some(index))
}
