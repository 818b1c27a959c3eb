//! SQLite storage for embedded chunks, with an FTS5 keyword index.
//!
//! Vectors live in a BLOB column and are scanned in Rust. The first insert
//! fixes the collection's dimensionality and, when enabled, creates the
//! external-content FTS5 table over chunk text and segmented identifier
//! terms. Writes are expected to come from one caller at a time; the
//! connection mutex only makes the handle shareable.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sift_core::{ChunkType, Result, SearchResult, SiftError, SourceChunk};
use sift_embed::text::{identifier_terms, tokenize};
use sift_embed::vector::squared_distance;
use tracing::{debug, warn};

use crate::rank::{reciprocal_rank_fusion, similarity_from_squared_distance};

const DIMENSIONS_KEY: &str = "embedding_dimensions";
const LEXICAL_KEY: &str = "lexical";

/// Columns read by [`read_chunk`], qualified for the `chunks c` alias.
const CHUNK_COLUMNS: &str = "c.chunk_id, c.file_path, c.start_line, c.end_line, c.text, \
     c.chunk_type, c.language, c.created_at, c.sequence_index";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS files (
        path TEXT PRIMARY KEY,
        content_hash TEXT NOT NULL,
        indexed_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chunk_id TEXT NOT NULL UNIQUE,
        file_path TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        text TEXT NOT NULL,
        terms TEXT NOT NULL,
        chunk_type TEXT NOT NULL,
        language TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        sequence_index INTEGER NOT NULL,
        vector BLOB NOT NULL
    );

    CREATE INDEX IF NOT EXISTS chunks_by_file ON chunks(file_path);
";

const LEXICAL_SCHEMA: &str = "
    CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
        text, terms,
        content='chunks', content_rowid='id'
    );

    CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
        INSERT INTO chunks_fts(rowid, text, terms) VALUES (new.id, new.text, new.terms);
    END;

    CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
        INSERT INTO chunks_fts(chunks_fts, rowid, text, terms)
        VALUES ('delete', old.id, old.text, old.terms);
    END;

    CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
        INSERT INTO chunks_fts(chunks_fts, rowid, text, terms)
        VALUES ('delete', old.id, old.text, old.terms);
        INSERT INTO chunks_fts(rowid, text, terms) VALUES (new.id, new.text, new.terms);
    END;

    INSERT INTO chunks_fts(chunks_fts) VALUES ('rebuild');
";

const DROP_LEXICAL: &str = "
    DROP TRIGGER IF EXISTS chunks_ai;
    DROP TRIGGER IF EXISTS chunks_ad;
    DROP TRIGGER IF EXISTS chunks_au;
    DROP TABLE IF EXISTS chunks_fts;
";

/// Index statistics.
///
/// # Examples
///
/// ```
/// use sift_index::store::VectorIndex;
///
/// let index = VectorIndex::in_memory(true).unwrap();
/// let stats = index.stats().unwrap();
/// assert_eq!(stats.chunk_count, 0);
/// assert_eq!(stats.file_count, 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub chunk_count: usize,
    /// Distinct files with at least one stored chunk.
    pub file_count: usize,
    pub storage_bytes: u64,
}

/// Persistent vector collection over [`SourceChunk`]s.
pub struct VectorIndex {
    conn: Mutex<Connection>,
    lexical: bool,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("lexical", &self.lexical)
            .finish_non_exhaustive()
    }
}

fn db(context: &'static str) -> impl Fn(rusqlite::Error) -> SiftError {
    move |e| SiftError::Database(format!("{context}: {e}"))
}

impl VectorIndex {
    /// Open or create the database at `path`, creating parent directories.
    ///
    /// `lexical` controls whether the keyword index is built on first insert.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Database`] if the database cannot be opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use sift_index::store::VectorIndex;
    ///
    /// let index = VectorIndex::open(Path::new(".sift/index.db"), true).unwrap();
    /// ```
    pub fn open(path: &Path, lexical: bool) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SiftError::Database(format!("failed to create index directory: {e}"))
            })?;
        }
        let conn = Connection::open(path).map_err(db("failed to open database"))?;
        Self::with_connection(conn, lexical)
    }

    /// A throwaway in-memory index.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Database`] if schema creation fails.
    pub fn in_memory(lexical: bool) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db("failed to create in-memory database"))?;
        Self::with_connection(conn, lexical)
    }

    fn with_connection(conn: Connection, lexical: bool) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(db("failed to create schema"))?;
        Ok(Self {
            conn: Mutex::new(conn),
            lexical,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Vector dimensionality fixed by the first insert, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Database`] on query failure or corrupt metadata.
    pub fn dimensions(&self) -> Result<Option<usize>> {
        dimensions(&self.conn())
    }

    /// Whether the collection holds anything to search.
    pub fn is_ready(&self) -> Result<bool> {
        Ok(chunk_count(&self.conn())? > 0)
    }

    /// Whether keyword search is backed by an FTS5 table.
    pub fn lexical_available(&self) -> Result<bool> {
        lexical_table_exists(&self.conn())
    }

    /// Upsert every chunk that carries a non-empty vector. Returns how many
    /// were stored.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::SchemaMismatch`] if the vectors disagree with
    /// the collection's dimensionality (or with each other), and
    /// [`SiftError::Database`] on write failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use sift_core::{ChunkType, SourceChunk};
    /// use sift_index::store::VectorIndex;
    ///
    /// let index = VectorIndex::in_memory(true).unwrap();
    /// let mut chunk = SourceChunk::new("src/main.rs", 1, 3, "fn main() {}".into(), ChunkType::Function, "rust", 0);
    /// chunk.vector = Some(vec![1.0, 0.0]);
    /// assert_eq!(index.insert(&[chunk]).unwrap(), 1);
    /// assert_eq!(index.dimensions().unwrap(), Some(2));
    /// ```
    pub fn insert(&self, chunks: &[SourceChunk]) -> Result<usize> {
        self.write(None, chunks)
    }

    /// Swap a file's stored chunks for `chunks` in one transaction. The
    /// file's recorded hash is dropped with its old rows. On error nothing
    /// is changed.
    ///
    /// # Errors
    ///
    /// Same as [`VectorIndex::insert`].
    pub fn replace_file(&self, file_path: &str, chunks: &[SourceChunk]) -> Result<usize> {
        self.write(Some(file_path), chunks)
    }

    fn write(&self, replace: Option<&str>, chunks: &[SourceChunk]) -> Result<usize> {
        let storable: Vec<(&SourceChunk, &Vec<f32>)> = chunks
            .iter()
            .filter_map(|c| c.vector.as_ref().filter(|v| !v.is_empty()).map(|v| (c, v)))
            .collect();
        let requested = storable.first().map(|(_, v)| v.len());
        if replace.is_none() && requested.is_none() {
            return Ok(0);
        }

        let mut conn = self.conn();
        if let Some(requested) = requested {
            if let Some((_, odd)) = storable.iter().find(|(_, v)| v.len() != requested) {
                return Err(SiftError::SchemaMismatch {
                    existing: requested,
                    requested: odd.len(),
                });
            }
            match dimensions(&conn)? {
                Some(existing) if existing != requested => {
                    return Err(SiftError::SchemaMismatch {
                        existing,
                        requested,
                    });
                }
                Some(_) => {}
                None => self.initialize(&conn, requested)?,
            }
        }

        let tx = conn.transaction().map_err(db("failed to begin transaction"))?;
        if let Some(path) = replace {
            tx.execute("DELETE FROM chunks WHERE file_path = ?1", params![path])
                .map_err(db("failed to delete chunks"))?;
            tx.execute("DELETE FROM files WHERE path = ?1", params![path])
                .map_err(db("failed to delete file record"))?;
        }
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO chunks
                     (chunk_id, file_path, start_line, end_line, text, terms, chunk_type,
                      language, created_at, sequence_index, vector)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(chunk_id) DO UPDATE SET
                        file_path = excluded.file_path,
                        start_line = excluded.start_line,
                        end_line = excluded.end_line,
                        text = excluded.text,
                        terms = excluded.terms,
                        chunk_type = excluded.chunk_type,
                        language = excluded.language,
                        created_at = excluded.created_at,
                        sequence_index = excluded.sequence_index,
                        vector = excluded.vector",
                )
                .map_err(db("failed to prepare insert"))?;
            for (chunk, vector) in &storable {
                stmt.execute(params![
                    chunk.id,
                    chunk.file_path,
                    chunk.start_line,
                    chunk.end_line,
                    chunk.text,
                    identifier_terms(&chunk.text, usize::MAX).join(" "),
                    chunk.chunk_type.as_str(),
                    chunk.language,
                    chunk.created_at.timestamp_millis(),
                    chunk.sequence_index,
                    floats_to_bytes(vector),
                ])
                .map_err(db("failed to insert chunk"))?;
            }
        }
        tx.commit().map_err(db("failed to commit chunks"))?;
        debug!(count = storable.len(), "stored chunks");
        Ok(storable.len())
    }

    /// First insert: record dimensionality and try to build the keyword index.
    fn initialize(&self, conn: &Connection, dimensions: usize) -> Result<()> {
        set_metadata(conn, DIMENSIONS_KEY, &dimensions.to_string())?;
        if !self.lexical {
            return set_metadata(conn, LEXICAL_KEY, "off");
        }
        match conn.execute_batch(LEXICAL_SCHEMA) {
            Ok(()) => set_metadata(conn, LEXICAL_KEY, "on"),
            Err(e) => {
                warn!(error = %e, "FTS5 unavailable, keyword search disabled");
                // A partial build would leave triggers pointing at nothing.
                conn.execute_batch(DROP_LEXICAL)
                    .map_err(db("failed to remove partial keyword index"))?;
                set_metadata(conn, LEXICAL_KEY, "off")
            }
        }
    }

    /// Nearest chunks to `query` by squared L2 distance.
    ///
    /// Over-fetches twice `limit` by raw distance, converts to similarity,
    /// drops anything under `min_similarity` and truncates to `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::IndexNotReady`] on an empty collection and
    /// [`SiftError::SchemaMismatch`] for a query of the wrong length.
    pub fn vector_search(
        &self,
        query: &[f32],
        limit: usize,
        min_similarity: f64,
    ) -> Result<Vec<SearchResult>> {
        let conn = self.conn();
        ensure_ready(&conn, query.len())?;

        let mut stmt = conn
            .prepare("SELECT id, vector FROM chunks")
            .map_err(db("failed to prepare vector scan"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)))
            .map_err(db("failed to scan vectors"))?;

        let mut scored: Vec<(f64, i64)> = Vec::new();
        for row in rows {
            let (id, bytes) = row.map_err(db("failed to read vector"))?;
            let vector = bytes_to_floats(&bytes);
            if vector.len() != query.len() {
                continue;
            }
            scored.push((f64::from(squared_distance(query, &vector)), id));
        }
        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        scored.truncate(limit.saturating_mul(2));

        let mut results = Vec::new();
        for (distance, id) in scored {
            let similarity = similarity_from_squared_distance(distance);
            if similarity < min_similarity {
                continue;
            }
            if let Some(chunk) = chunk_by_rowid(&conn, id)? {
                results.push(SearchResult::new(chunk, similarity));
            }
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    /// Chunks matching any query word, best BM25 match first. Empty when no
    /// keyword index exists.
    ///
    /// # Errors
    ///
    /// Returns [`SiftError::Database`] on query failure.
    pub fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<SourceChunk>> {
        Ok(self
            .keyword_rows(query, limit)?
            .into_iter()
            .map(|(chunk, _)| chunk)
            .collect())
    }

    fn keyword_rows(&self, query: &str, limit: usize) -> Result<Vec<(SourceChunk, Vec<f32>)>> {
        let fts_query = sanitize_fts_query(query);
        let conn = self.conn();
        if fts_query.is_empty() || !lexical_table_exists(&conn)? {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {CHUNK_COLUMNS}, c.vector FROM chunks_fts f
             JOIN chunks c ON c.id = f.rowid
             WHERE chunks_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql).map_err(db("failed to prepare keyword query"))?;
        let rows = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                Ok((read_chunk(row)?, bytes_to_floats(&row.get::<_, Vec<u8>>(9)?)))
            })
            .map_err(db("keyword query failed"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db("failed to read keyword row"))
    }

    /// Vector and keyword search fused with Reciprocal Rank Fusion.
    ///
    /// Keyword hits take their similarity from their stored vector and are
    /// not filtered by `min_similarity`. Without a keyword index this is
    /// plain [`vector_search`](Self::vector_search).
    ///
    /// # Errors
    ///
    /// Same as [`vector_search`](Self::vector_search).
    pub fn hybrid_search(
        &self,
        query_text: &str,
        query_vector: &[f32],
        limit: usize,
        min_similarity: f64,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let fetch = limit.saturating_mul(2);
        let vector_hits = self.vector_search(query_vector, fetch, min_similarity)?;
        if !self.lexical_available()? {
            return Ok(vector_hits.into_iter().take(limit).collect());
        }
        let keyword_hits: Vec<SearchResult> = self
            .keyword_rows(query_text, fetch)?
            .into_iter()
            .map(|(chunk, vector)| {
                let similarity = if vector.len() == query_vector.len() {
                    similarity_from_squared_distance(f64::from(squared_distance(query_vector, &vector)))
                } else {
                    0.0
                };
                SearchResult::new(chunk, similarity)
            })
            .collect();

        let mut fused = reciprocal_rank_fusion(&[vector_hits, keyword_hits], k);
        fused.truncate(limit);
        Ok(fused)
    }

    /// Every stored chunk of one file, in line order.
    pub fn chunks_for_file(&self, file_path: &str) -> Result<Vec<SourceChunk>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.file_path = ?1 ORDER BY c.start_line"
        );
        let mut stmt = conn.prepare(&sql).map_err(db("failed to prepare file query"))?;
        let rows = stmt
            .query_map(params![file_path], read_chunk)
            .map_err(db("file query failed"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db("failed to read chunk"))
    }

    /// Remove a file's chunks and its recorded hash. Returns the number of
    /// chunks removed.
    pub fn delete_file(&self, file_path: &str) -> Result<usize> {
        let conn = self.conn();
        let removed = conn
            .execute("DELETE FROM chunks WHERE file_path = ?1", params![file_path])
            .map_err(db("failed to delete chunks"))?;
        conn.execute("DELETE FROM files WHERE path = ?1", params![file_path])
            .map_err(db("failed to delete file record"))?;
        Ok(removed)
    }

    /// Drop every chunk, file record and the fixed dimensionality.
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(DROP_LEXICAL)
            .map_err(db("failed to drop keyword index"))?;
        conn.execute_batch("DELETE FROM chunks; DELETE FROM files; DELETE FROM metadata;")
            .map_err(db("failed to clear index"))?;
        Ok(())
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let conn = self.conn();
        let file_count: i64 = conn
            .query_row("SELECT COUNT(DISTINCT file_path) FROM chunks", [], |row| row.get(0))
            .map_err(db("failed to count files"))?;
        let page_count: i64 = conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);
        let page_size: i64 = conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(4096);
        Ok(IndexStats {
            chunk_count: chunk_count(&conn)?,
            file_count: usize::try_from(file_count).unwrap_or(0),
            storage_bytes: u64::try_from(page_count * page_size).unwrap_or(0),
        })
    }

    /// Record the content hash a file was indexed at.
    pub fn record_file(&self, file_path: &str, content_hash: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO files (path, content_hash, indexed_at) VALUES (?1, ?2, ?3)",
                params![file_path, content_hash, Utc::now().timestamp()],
            )
            .map_err(db("failed to record file"))?;
        Ok(())
    }

    pub fn file_hash(&self, file_path: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT content_hash FROM files WHERE path = ?1",
                params![file_path],
                |row| row.get(0),
            )
            .optional()
            .map_err(db("failed to get file hash"))
    }

    /// Every path with either stored chunks or a recorded hash.
    pub fn indexed_files(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT path FROM files UNION SELECT DISTINCT file_path FROM chunks ORDER BY 1")
            .map_err(db("failed to prepare file list"))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(db("failed to list files"))?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .map_err(db("failed to read file path"))
    }
}

fn chunk_count(conn: &Connection) -> Result<usize> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
        .map_err(db("failed to count chunks"))?;
    Ok(usize::try_from(count).unwrap_or(0))
}

fn ensure_ready(conn: &Connection, query_dimensions: usize) -> Result<()> {
    let Some(existing) = dimensions(conn)? else {
        return Err(SiftError::IndexNotReady);
    };
    if chunk_count(conn)? == 0 {
        return Err(SiftError::IndexNotReady);
    }
    if existing != query_dimensions {
        return Err(SiftError::SchemaMismatch {
            existing,
            requested: query_dimensions,
        });
    }
    Ok(())
}

fn dimensions(conn: &Connection) -> Result<Option<usize>> {
    let Some(value) = get_metadata(conn, DIMENSIONS_KEY)? else {
        return Ok(None);
    };
    value
        .parse()
        .map(Some)
        .map_err(|_| SiftError::Database(format!("corrupted dimension metadata in index: '{value}'")))
}

fn lexical_table_exists(conn: &Connection) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'chunks_fts'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(db("failed to inspect schema"))?;
    Ok(found.is_some())
}

fn get_metadata(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |row| row.get(0))
        .optional()
        .map_err(db("failed to get metadata"))
}

fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        params![key, value],
    )
    .map_err(db("failed to set metadata"))?;
    Ok(())
}

fn chunk_by_rowid(conn: &Connection, id: i64) -> Result<Option<SourceChunk>> {
    let sql = format!("SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.id = ?1");
    conn.query_row(&sql, params![id], read_chunk)
        .optional()
        .map_err(db("failed to load chunk"))
}

/// Read the [`CHUNK_COLUMNS`] prefix of a row. The vector is not loaded.
fn read_chunk(row: &Row<'_>) -> rusqlite::Result<SourceChunk> {
    let chunk_type: String = row.get(5)?;
    let created_ms: i64 = row.get(7)?;
    Ok(SourceChunk {
        id: row.get(0)?,
        file_path: row.get(1)?,
        start_line: row.get(2)?,
        end_line: row.get(3)?,
        text: row.get(4)?,
        chunk_type: ChunkType::from_str(&chunk_type).unwrap_or(ChunkType::Unknown),
        language: row.get(6)?,
        created_at: DateTime::from_timestamp_millis(created_ms).unwrap_or_default(),
        sequence_index: row.get(8)?,
        vector: None,
    })
}

/// Quote each query word (and the parts of compound identifiers) and OR
/// them together, so FTS5 operators in user input are inert.
fn sanitize_fts_query(query: &str) -> String {
    let mut seen = HashSet::new();
    let raw = query.split_whitespace().map(|w| {
        w.chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect::<String>()
            .to_lowercase()
    });
    raw.chain(tokenize(query))
        .filter(|w| !w.is_empty() && seen.insert(w.clone()))
        .map(|w| format!("\"{w}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    floats.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
