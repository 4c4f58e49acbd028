//! SQLite + FTS5 backed [`ChunkStore`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use chunk_model::{Chunk, ChunkKind, ConformanceIndexEntry};
use lru::LruCache;
use rusqlite::{params, Connection, OptionalExtension};
use std::num::NonZeroUsize;

use crate::error::StoreError;
use crate::fts::sanitize;
use crate::migrations::run_migrations;

/// Durable keyed store of chunks with lexical search and path-scoped bulk
/// operations. Single writer per index; all operations here take the
/// same connection-guarding mutex, which also gives us the "all or
/// nothing per call" failure model for free.
pub struct SqliteChunkStore {
    conn: Mutex<Connection>,
    term_freq_cache: Mutex<LruCache<String, i64>>,
}

/// Minimum LRU bound for the term-frequency cache.
const TERM_FREQ_CACHE_MIN: usize = 100;

impl SqliteChunkStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            term_freq_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(TERM_FREQ_CACHE_MIN).expect("nonzero"),
            )),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            term_freq_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(TERM_FREQ_CACHE_MIN).expect("nonzero"),
            )),
        })
    }

    fn invalidate_term_freq_cache(&self) {
        self.term_freq_cache.lock().unwrap().clear();
    }

    fn insert_one(tx: &rusqlite::Transaction<'_>, chunk: &Chunk) -> Result<(), StoreError> {
        tx.execute(
            "INSERT INTO chunks (
                id, path, content, start_line, end_line, kind, symbols, refs,
                token_count, file_hash, created_at, signature, breadcrumb,
                language, doc_comment, content_hash, generated_description,
                conformances, is_type_declaration
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)",
            params![
                chunk.id,
                chunk.path,
                chunk.content,
                chunk.start_line,
                chunk.end_line,
                chunk.kind.as_str(),
                serde_json::to_string(&chunk.symbols)?,
                serde_json::to_string(&chunk.references)?,
                chunk.token_count,
                chunk.file_hash,
                chunk.created_at.to_rfc3339(),
                chunk.signature,
                chunk.breadcrumb,
                chunk.language,
                chunk.doc_comment,
                chunk.content_hash,
                chunk.generated_description,
                serde_json::to_string(&chunk.conformances)?,
                chunk.is_type_declaration as i64,
            ],
        )?;
        Ok(())
    }

    fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Chunk, String)> {
        let kind_raw: String = row.get("kind")?;
        let symbols_raw: String = row.get("symbols")?;
        let refs_raw: String = row.get("refs")?;
        let conformances_raw: String = row.get("conformances")?;
        let created_raw: String = row.get("created_at")?;

        let symbols: Vec<String> = serde_json::from_str(&symbols_raw).unwrap_or_default();
        let references: Vec<String> = serde_json::from_str(&refs_raw).unwrap_or_default();
        let conformances: Vec<String> = serde_json::from_str(&conformances_raw).unwrap_or_default();
        let created_at: DateTime<Utc> = created_raw
            .parse()
            .unwrap_or_else(|_| Utc::now());

        let id: String = row.get("id")?;
        let chunk = Chunk {
            id: id.clone(),
            path: row.get("path")?,
            content: row.get("content")?,
            start_line: row.get("start_line")?,
            end_line: row.get("end_line")?,
            kind: ChunkKind::Other, // placeholder, corrected by caller using `kind_raw`
            symbols,
            references,
            conformances,
            is_type_declaration: row.get::<_, i64>("is_type_declaration")? != 0,
            signature: row.get("signature")?,
            breadcrumb: row.get("breadcrumb")?,
            doc_comment: row.get("doc_comment")?,
            token_count: row.get("token_count")?,
            language: row.get("language")?,
            file_hash: row.get("file_hash")?,
            content_hash: row.get("content_hash")?,
            generated_description: row.get("generated_description")?,
            created_at,
        };
        Ok((chunk, kind_raw))
    }

    fn finalize_kind(mut chunk: Chunk, kind_raw: String) -> Result<Chunk, StoreError> {
        chunk.kind = ChunkKind::parse(&kind_raw).map_err(|_| StoreError::InvalidKind {
            chunk_id: chunk.id.clone(),
            raw: kind_raw,
        })?;
        Ok(chunk)
    }

    pub fn insert(&self, chunk: &Chunk) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::insert_one(&tx, chunk)?;
        tx.commit()?;
        self.invalidate_term_freq_cache();
        Ok(())
    }

    pub fn insert_batch(&self, chunks: &[Chunk]) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for chunk in chunks {
            Self::insert_one(&tx, chunk)?;
        }
        tx.commit()?;
        self.invalidate_term_freq_cache();
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Chunk>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM chunks WHERE id = ?1")?;
        let found = stmt
            .query_row(params![id], Self::row_to_chunk)
            .optional()?;
        found.map(|(c, k)| Self::finalize_kind(c, k)).transpose()
    }

    pub fn get_by_path(&self, path: &str) -> Result<Vec<Chunk>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM chunks WHERE path = ?1 ORDER BY start_line ASC")?;
        let rows = stmt.query_map(params![path], Self::row_to_chunk)?;
        let mut out = Vec::new();
        for row in rows {
            let (c, k) = row?;
            out.push(Self::finalize_kind(c, k)?);
        }
        Ok(out)
    }

    pub fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT * FROM chunks WHERE id IN ({placeholders})");
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> =
            ids.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params.as_slice(), Self::row_to_chunk)?;
        let mut out = Vec::new();
        for row in rows {
            let (c, k) = row?;
            out.push(Self::finalize_kind(c, k)?);
        }
        Ok(out)
    }

    pub fn get_by_content_hashes(
        &self,
        hashes: &[String],
    ) -> Result<HashMap<String, Chunk>, StoreError> {
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = hashes.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT * FROM chunks WHERE content_hash IN ({placeholders})");
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> =
            hashes.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params.as_slice(), Self::row_to_chunk)?;
        let mut out = HashMap::new();
        for row in rows {
            let (c, k) = row?;
            let chunk = Self::finalize_kind(c, k)?;
            out.insert(chunk.content_hash.clone(), chunk);
        }
        Ok(out)
    }

    pub fn update(&self, chunk: &Chunk) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE chunks SET
                path=?2, content=?3, start_line=?4, end_line=?5, kind=?6,
                symbols=?7, refs=?8, token_count=?9, file_hash=?10,
                signature=?11, breadcrumb=?12, language=?13, doc_comment=?14,
                content_hash=?15, generated_description=?16, conformances=?17,
                is_type_declaration=?18
             WHERE id=?1",
            params![
                chunk.id,
                chunk.path,
                chunk.content,
                chunk.start_line,
                chunk.end_line,
                chunk.kind.as_str(),
                serde_json::to_string(&chunk.symbols)?,
                serde_json::to_string(&chunk.references)?,
                chunk.token_count,
                chunk.file_hash,
                chunk.signature,
                chunk.breadcrumb,
                chunk.language,
                chunk.doc_comment,
                chunk.content_hash,
                chunk.generated_description,
                serde_json::to_string(&chunk.conformances)?,
                chunk.is_type_declaration as i64,
            ],
        )?;
        drop(conn);
        self.invalidate_term_freq_cache();
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM chunks WHERE id = ?1", params![id])?;
        drop(conn);
        self.invalidate_term_freq_cache();
        Ok(())
    }

    pub fn delete_by_path(&self, path: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM chunks WHERE path = ?1", params![path])?;
        drop(conn);
        self.invalidate_term_freq_cache();
        Ok(n)
    }

    /// BM25-ranked full-text search. The underlying engine returns a
    /// negative-weighted score; we negate it so higher is always better.
    pub fn search_fts(&self, query: &str, limit: usize) -> Result<Vec<(Chunk, f64)>, StoreError> {
        let match_expr = sanitize(query);
        if match_expr.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT c.*, bm25(chunks_fts) AS rank
             FROM chunks_fts
             JOIN chunks c ON c.rowid = chunks_fts.rowid
             WHERE chunks_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![match_expr, limit as i64], |row| {
            let (chunk, kind_raw) = Self::row_to_chunk(row)?;
            let rank: f64 = row.get("rank")?;
            Ok((chunk, kind_raw, rank))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (chunk, kind_raw, rank) = row?;
            let chunk = Self::finalize_kind(chunk, kind_raw)?;
            out.push((chunk, -rank));
        }
        Ok(out)
    }

    /// Chunks declaring a type that conforms to `protocol_name`, answered
    /// via the secondary index on `conformance_index(protocol_name)`.
    pub fn find_conforming_types(&self, protocol_name: &str) -> Result<Vec<Chunk>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT c.* FROM chunks c
             JOIN conformance_index ci ON ci.chunk_id = c.id
             WHERE ci.protocol_name = ?1 AND c.is_type_declaration = 1",
        )?;
        let rows = stmt.query_map(params![protocol_name], Self::row_to_chunk)?;
        let mut out = Vec::new();
        for row in rows {
            let (c, k) = row?;
            out.push(Self::finalize_kind(c, k)?);
        }
        Ok(out)
    }

    /// Document frequency for `term`, LRU-cached (bound ≥100), invalidated
    /// on every mutating call.
    pub fn get_term_frequency(&self, term: &str) -> Result<i64, StoreError> {
        if let Some(hit) = self.term_freq_cache.lock().unwrap().get(term) {
            return Ok(*hit);
        }
        let conn = self.conn.lock().unwrap();
        let match_expr = format!("\"{}\"", term.replace('"', "\"\""));
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM chunks_fts WHERE chunks_fts MATCH ?1",
                params![match_expr],
                |row| row.get(0),
            )
            .unwrap_or(0);
        drop(conn);
        self.term_freq_cache.lock().unwrap().put(term.to_string(), count);
        Ok(count)
    }

    pub fn get_file_hash(&self, path: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let hash = conn
            .query_row(
                "SELECT hash FROM file_hashes WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    pub fn set_file_hash(&self, path: &str, hash: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO file_hashes(path, hash, indexed_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(path) DO UPDATE SET hash=excluded.hash, indexed_at=excluded.indexed_at",
            params![path, hash, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn conformances_for(&self, chunk_id: &str) -> Result<Vec<ConformanceIndexEntry>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT chunk_id, protocol_name FROM conformance_index WHERE chunk_id = ?1")?;
        let rows = stmt.query_map(params![chunk_id], |row| {
            Ok(ConformanceIndexEntry {
                chunk_id: row.get(0)?,
                protocol_name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "DELETE FROM chunks; DELETE FROM info_snippets; DELETE FROM file_hashes; DELETE FROM conformance_index;",
        )?;
        drop(conn);
        self.invalidate_term_freq_cache();
        Ok(())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunk_model::hash::sha256_hex;

    fn sample_chunk(id: &str, path: &str, content: &str) -> Chunk {
        let file_hash = sha256_hex(content.as_bytes());
        let content_hash = file_hash.clone();
        Chunk::new(id, path, content, 1, 3, ChunkKind::Function, "rust", file_hash, content_hash)
    }

    #[test]
    fn insert_then_get_round_trips() {
        let store = SqliteChunkStore::open_in_memory().unwrap();
        let chunk = sample_chunk("c1", "a.rs", "fn main() {}");
        store.insert(&chunk).unwrap();
        let fetched = store.get("c1").unwrap().unwrap();
        assert_eq!(fetched.content, chunk.content);
        assert_eq!(fetched.kind, ChunkKind::Function);
    }

    #[test]
    fn count_reflects_inserts_and_deletes() {
        let store = SqliteChunkStore::open_in_memory().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        store.insert(&sample_chunk("c1", "a.rs", "fn one() {}")).unwrap();
        store.insert(&sample_chunk("c2", "b.rs", "fn two() {}")).unwrap();
        assert_eq!(store.count().unwrap(), 2);
        store.delete("c1").unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn delete_removes_chunk_and_fts_and_conformance_rows() {
        let store = SqliteChunkStore::open_in_memory().unwrap();
        let mut chunk = sample_chunk("c1", "a.rs", "struct Foo {}");
        chunk.is_type_declaration = true;
        chunk.conformances = vec!["Equatable".into()];
        store.insert(&chunk).unwrap();
        assert_eq!(store.find_conforming_types("Equatable").unwrap().len(), 1);

        store.delete("c1").unwrap();
        assert!(store.get("c1").unwrap().is_none());
        assert!(store.find_conforming_types("Equatable").unwrap().is_empty());
        assert!(store.search_fts("Foo", 10).unwrap().is_empty());
    }

    #[test]
    fn search_fts_ranks_and_negates_bm25_score() {
        let store = SqliteChunkStore::open_in_memory().unwrap();
        store.insert(&sample_chunk("c1", "a.rs", "fn unique_needle() {}")).unwrap();
        store.insert(&sample_chunk("c2", "b.rs", "fn other() {}")).unwrap();
        let hits = store.search_fts("needle", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, "c1");
        assert!(hits[0].1 >= 0.0, "negated bm25 score should read higher-is-better");
    }

    #[test]
    fn get_by_content_hashes_enables_reuse_lookup() {
        let store = SqliteChunkStore::open_in_memory().unwrap();
        let chunk = sample_chunk("c1", "a.rs", "fn shared() {}");
        let hash = chunk.content_hash.clone();
        store.insert(&chunk).unwrap();
        let found = store.get_by_content_hashes(&[hash.clone()]).unwrap();
        assert_eq!(found.get(&hash).unwrap().id, "c1");
    }

    #[test]
    fn term_frequency_cache_is_invalidated_on_mutation() {
        let store = SqliteChunkStore::open_in_memory().unwrap();
        assert_eq!(store.get_term_frequency("Rarely").unwrap(), 0);
        store.insert(&sample_chunk("c1", "a.rs", "fn Rarely_used() {}")).unwrap();
        // cache was warmed at 0 before insert; after insert+invalidate the
        // next lookup must reflect the new row, not the stale cached value.
        assert_eq!(store.get_term_frequency("Rarely").unwrap(), 1);
    }

    #[test]
    fn file_hash_upsert_is_keyed_by_path() {
        let store = SqliteChunkStore::open_in_memory().unwrap();
        assert!(store.get_file_hash("a.rs").unwrap().is_none());
        store.set_file_hash("a.rs", &"a".repeat(64)).unwrap();
        assert_eq!(store.get_file_hash("a.rs").unwrap().unwrap(), "a".repeat(64));
        store.set_file_hash("a.rs", &"b".repeat(64)).unwrap();
        assert_eq!(store.get_file_hash("a.rs").unwrap().unwrap(), "b".repeat(64));
    }
}
