//! On-disk format of the vector index.
//!
//! An index directory holds a single SQLite database, `index.sqlite`:
//!
//! ```sql
//! index_meta(model TEXT, dims INTEGER, created_at INTEGER)   -- one row
//! entries(position INTEGER PRIMARY KEY, chunk_id TEXT, chunk_index INTEGER,
//!         text TEXT, metadata_json TEXT, vector BLOB)
//! ```
//!
//! Writes never modify a live index. [`write_index`] builds a complete
//! database in a sibling directory, closes it, and renames it over the
//! target, so a reader sees either the old generation or the new one.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{RagError, Result};
use crate::models::{Chunk, Metadata};

pub const INDEX_FILE: &str = "index.sqlite";

/// Header row of a persisted index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
    pub model: String,
    pub dims: usize,
    pub created_at: i64,
}

/// A chunk with its embedding as stored on disk.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// True when `dir` looks like a persisted index.
pub fn index_exists(dir: &Path) -> bool {
    dir.join(INDEX_FILE).is_file()
}

async fn connect(db_path: &Path, create: bool) -> Result<SqlitePool> {
    let mut options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(create)
        .read_only(!create);
    if create {
        // No -wal/-shm side files: the directory must be complete once the
        // pool is closed.
        options = options.journal_mode(SqliteJournalMode::Delete);
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            position INTEGER PRIMARY KEY,
            chunk_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            vector BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Reads a whole index directory.
///
/// A missing directory, a missing database file, or a database without
/// the expected tables all report [`RagError::IndexNotFound`].
pub async fn read_index(dir: &Path) -> Result<(IndexMeta, Vec<StoredEntry>)> {
    let db_path = dir.join(INDEX_FILE);
    if !dir.is_dir() {
        return Err(RagError::index_not_found(dir, "directory does not exist"));
    }
    if !db_path.is_file() {
        return Err(RagError::index_not_found(
            dir,
            format!("{} is missing", INDEX_FILE),
        ));
    }

    let pool = connect(&db_path, false)
        .await
        .map_err(|e| RagError::index_not_found(dir, e.to_string()))?;
    let result = read_all(&pool).await;
    pool.close().await;

    result.map_err(|e| match e {
        RagError::Index(reason) => RagError::index_not_found(dir, reason),
        other => other,
    })
}

async fn read_all(pool: &SqlitePool) -> Result<(IndexMeta, Vec<StoredEntry>)> {
    let meta_row = sqlx::query("SELECT model, dims, created_at FROM index_meta LIMIT 1")
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| RagError::Index("index_meta has no header row".to_string()))?;

    let dims: i64 = meta_row.try_get("dims")?;
    let meta = IndexMeta {
        model: meta_row.try_get("model")?,
        dims: usize::try_from(dims)
            .map_err(|_| RagError::Index(format!("invalid dimension count {}", dims)))?,
        created_at: meta_row.try_get("created_at")?,
    };

    let rows = sqlx::query(
        r#"
        SELECT chunk_id, chunk_index, text, metadata_json, vector
        FROM entries
        ORDER BY position
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in &rows {
        let metadata_json: String = row.try_get("metadata_json")?;
        let metadata: Metadata = serde_json::from_str(&metadata_json)?;
        let blob: Vec<u8> = row.try_get("vector")?;
        let vector = blob_to_vec(&blob);
        if vector.len() != meta.dims {
            return Err(RagError::Index(format!(
                "entry has {} dimensions, index declares {}",
                vector.len(),
                meta.dims
            )));
        }
        entries.push(StoredEntry {
            chunk: Chunk {
                id: row.try_get("chunk_id")?,
                chunk_index: row.try_get("chunk_index")?,
                text: row.try_get("text")?,
                metadata,
            },
            vector,
        });
    }

    Ok((meta, entries))
}

/// Replaces the index at `dir` with `entries`.
///
/// The new generation is written to `<dir>.tmp-<uuid>`, then swapped in
/// with renames; the previous generation is removed afterwards. On error
/// the temporary directory is cleaned up and `dir` is left untouched.
pub async fn write_index(dir: &Path, model: &str, dims: usize, entries: &[StoredEntry]) -> Result<()> {
    let staging = sibling(dir, "tmp");
    std::fs::create_dir_all(&staging)?;

    if let Err(e) = write_generation(&staging, model, dims, entries).await {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }

    let retired = if dir.exists() {
        let retired = sibling(dir, "old");
        if let Err(e) = std::fs::rename(dir, &retired) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e.into());
        }
        Some(retired)
    } else {
        None
    };

    if let Err(e) = std::fs::rename(&staging, dir) {
        // Put the previous generation back before reporting.
        if let Some(retired) = &retired {
            let _ = std::fs::rename(retired, dir);
        }
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e.into());
    }

    if let Some(retired) = retired {
        if let Err(e) = std::fs::remove_dir_all(&retired) {
            tracing::warn!("Could not remove previous index {}: {}", retired.display(), e);
        }
    }

    tracing::debug!(dir = %dir.display(), entries = entries.len(), "index written");
    Ok(())
}

async fn write_generation(
    staging: &Path,
    model: &str,
    dims: usize,
    entries: &[StoredEntry],
) -> Result<()> {
    let pool = connect(&staging.join(INDEX_FILE), true).await?;
    let result = insert_all(&pool, model, dims, entries).await;
    pool.close().await;
    result
}

async fn insert_all(pool: &SqlitePool, model: &str, dims: usize, entries: &[StoredEntry]) -> Result<()> {
    create_schema(pool).await?;

    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO index_meta (model, dims, created_at) VALUES (?, ?, ?)")
        .bind(model)
        .bind(dims as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

    for (position, entry) in entries.iter().enumerate() {
        let metadata_json = serde_json::to_string(&entry.chunk.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO entries (position, chunk_id, chunk_index, text, metadata_json, vector)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position as i64)
        .bind(&entry.chunk.id)
        .bind(entry.chunk.chunk_index)
        .bind(&entry.chunk.text)
        .bind(&metadata_json)
        .bind(vec_to_blob(&entry.vector))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// `<parent>/<name>.<tag>-<uuid>`, on the same filesystem as `dir` so the
/// final rename is atomic.
fn sibling(dir: &Path, tag: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    let file = format!("{}.{}-{}", name, tag, Uuid::new_v4());
    match dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(file),
        _ => PathBuf::from(file),
    }
}
