//! Chunk store (SQLite + FTS5) and vector store (HNSW).

pub mod error;
pub mod fts;
pub mod hnsw_store;
pub mod manifest;
pub mod migrations;
pub mod sqlite_store;

pub use error::StoreError;
pub use hnsw_store::{HnswParams, HnswVectorStore};
pub use manifest::Manifest;
pub use sqlite_store::SqliteChunkStore;

use std::collections::HashMap;

use chunk_model::Chunk;

/// Durable keyed store of chunks with lexical search and path-scoped bulk
/// operations. Implemented by [`SqliteChunkStore`].
pub trait ChunkStore: Send + Sync {
    fn insert(&self, chunk: &Chunk) -> Result<(), StoreError>;
    fn insert_batch(&self, chunks: &[Chunk]) -> Result<(), StoreError>;
    fn get(&self, id: &str) -> Result<Option<Chunk>, StoreError>;
    fn get_by_path(&self, path: &str) -> Result<Vec<Chunk>, StoreError>;
    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>, StoreError>;
    fn get_by_content_hashes(&self, hashes: &[String]) -> Result<HashMap<String, Chunk>, StoreError>;
    fn update(&self, chunk: &Chunk) -> Result<(), StoreError>;
    fn delete(&self, id: &str) -> Result<(), StoreError>;
    fn delete_by_path(&self, path: &str) -> Result<usize, StoreError>;
    fn search_fts(&self, query: &str, limit: usize) -> Result<Vec<(Chunk, f64)>, StoreError>;
    fn find_conforming_types(&self, protocol_name: &str) -> Result<Vec<Chunk>, StoreError>;
    fn get_term_frequency(&self, term: &str) -> Result<i64, StoreError>;
    fn get_file_hash(&self, path: &str) -> Result<Option<String>, StoreError>;
    fn set_file_hash(&self, path: &str, hash: &str) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
    fn count(&self) -> Result<usize, StoreError>;
}

impl ChunkStore for SqliteChunkStore {
    fn insert(&self, chunk: &Chunk) -> Result<(), StoreError> {
        SqliteChunkStore::insert(self, chunk)
    }
    fn insert_batch(&self, chunks: &[Chunk]) -> Result<(), StoreError> {
        SqliteChunkStore::insert_batch(self, chunks)
    }
    fn get(&self, id: &str) -> Result<Option<Chunk>, StoreError> {
        SqliteChunkStore::get(self, id)
    }
    fn get_by_path(&self, path: &str) -> Result<Vec<Chunk>, StoreError> {
        SqliteChunkStore::get_by_path(self, path)
    }
    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Chunk>, StoreError> {
        SqliteChunkStore::get_by_ids(self, ids)
    }
    fn get_by_content_hashes(&self, hashes: &[String]) -> Result<HashMap<String, Chunk>, StoreError> {
        SqliteChunkStore::get_by_content_hashes(self, hashes)
    }
    fn update(&self, chunk: &Chunk) -> Result<(), StoreError> {
        SqliteChunkStore::update(self, chunk)
    }
    fn delete(&self, id: &str) -> Result<(), StoreError> {
        SqliteChunkStore::delete(self, id)
    }
    fn delete_by_path(&self, path: &str) -> Result<usize, StoreError> {
        SqliteChunkStore::delete_by_path(self, path)
    }
    fn search_fts(&self, query: &str, limit: usize) -> Result<Vec<(Chunk, f64)>, StoreError> {
        SqliteChunkStore::search_fts(self, query, limit)
    }
    fn find_conforming_types(&self, protocol_name: &str) -> Result<Vec<Chunk>, StoreError> {
        SqliteChunkStore::find_conforming_types(self, protocol_name)
    }
    fn get_term_frequency(&self, term: &str) -> Result<i64, StoreError> {
        SqliteChunkStore::get_term_frequency(self, term)
    }
    fn get_file_hash(&self, path: &str) -> Result<Option<String>, StoreError> {
        SqliteChunkStore::get_file_hash(self, path)
    }
    fn set_file_hash(&self, path: &str, hash: &str) -> Result<(), StoreError> {
        SqliteChunkStore::set_file_hash(self, path, hash)
    }
    fn clear(&self) -> Result<(), StoreError> {
        SqliteChunkStore::clear(self)
    }
    fn count(&self) -> Result<usize, StoreError> {
        SqliteChunkStore::count(self)
    }
}

/// Approximate nearest-neighbor index over chunk-id-keyed vectors.
/// Implemented by [`HnswVectorStore`].
pub trait VectorStore: Send + Sync {
    fn insert(&self, id: &str, vector: &[f32]) -> Result<(), StoreError>;
    fn insert_batch(&self, pairs: &[(String, Vec<f32>)]) -> Result<(), StoreError>;
    fn get(&self, id: &str) -> Result<Option<Vec<f32>>, StoreError>;
    fn delete(&self, id: &str) -> Result<(), StoreError>;
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>, StoreError>;
    fn size(&self) -> usize;
    fn clear(&self) -> Result<(), StoreError>;
    fn save(&self) -> Result<(), StoreError>;
    fn load(&self) -> Result<(), StoreError>;
    fn dimension(&self) -> Option<usize>;
}

impl VectorStore for HnswVectorStore {
    fn insert(&self, id: &str, vector: &[f32]) -> Result<(), StoreError> {
        HnswVectorStore::insert(self, id, vector)
    }
    fn insert_batch(&self, pairs: &[(String, Vec<f32>)]) -> Result<(), StoreError> {
        HnswVectorStore::insert_batch(self, pairs)
    }
    fn get(&self, id: &str) -> Result<Option<Vec<f32>>, StoreError> {
        HnswVectorStore::get(self, id)
    }
    fn delete(&self, id: &str) -> Result<(), StoreError> {
        HnswVectorStore::delete(self, id)
    }
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>, StoreError> {
        HnswVectorStore::search(self, query, k)
    }
    fn size(&self) -> usize {
        HnswVectorStore::size(self)
    }
    fn clear(&self) -> Result<(), StoreError> {
        HnswVectorStore::clear(self)
    }
    fn save(&self) -> Result<(), StoreError> {
        HnswVectorStore::save(self)
    }
    fn load(&self) -> Result<(), StoreError> {
        HnswVectorStore::load(self)
    }
    fn dimension(&self) -> Option<usize> {
        HnswVectorStore::dimension(self)
    }
}
