//! HNSW-backed [`VectorStore`].
//!
//! `hnsw_rs` graphs are append-only and must be created with a capacity
//! ceiling; we track tombstones ourselves (true deletion isn't supported by
//! the graph) and keep every inserted vector in memory so the graph can be
//! rebuilt at double capacity when the ceiling is reached, and so
//! `save()`/`load()` can round-trip without relying on `hnsw_rs`'s own
//! (graph-only) serialization to recover raw vectors.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use hnsw_rs::dist::DistCosine;
use hnsw_rs::hnsw::Hnsw;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::manifest::Manifest;

const DEFAULT_MAX_NB_CONNECTION: usize = 16;
const DEFAULT_MAX_LAYER: usize = 16;
const DEFAULT_EF_CONSTRUCTION: usize = 200;
const DEFAULT_EF_SEARCH: usize = 64;
const INITIAL_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HnswParams {
    pub max_nb_connection: usize,
    pub max_layer: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            max_nb_connection: DEFAULT_MAX_NB_CONNECTION,
            max_layer: DEFAULT_MAX_LAYER,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Mapping {
    /// internal id -> (chunk id, tombstoned, raw vector)
    entries: Vec<MappingEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingEntry {
    id: String,
    tombstoned: bool,
    vector: Vec<f32>,
}

struct Inner {
    hnsw: Hnsw<'static, f32, DistCosine>,
    id_to_internal: HashMap<String, usize>,
    internal_to_id: Vec<Option<String>>,
    tombstoned: HashSet<usize>,
    capacity: usize,
    vectors: Vec<Vec<f32>>,
}

/// Approximate nearest-neighbor search over D-dimensional vectors keyed by
/// chunk id. `D` is fixed for the lifetime of the store once the first
/// vector is inserted.
pub struct HnswVectorStore {
    dir: PathBuf,
    params: HnswParams,
    dimension: RwLock<Option<usize>>,
    inner: RwLock<Inner>,
}

fn new_graph(capacity: usize, params: &HnswParams) -> Hnsw<'static, f32, DistCosine> {
    Hnsw::new(
        params.max_nb_connection,
        capacity,
        params.max_layer,
        params.ef_construction,
        DistCosine {},
    )
}

impl HnswVectorStore {
    pub fn new(dir: impl Into<PathBuf>, params: HnswParams) -> Self {
        let dir = dir.into();
        let manifest = Manifest::load(&dir).ok().flatten();
        let dimension = manifest.as_ref().and_then(|m| m.dimension);
        Self {
            dir,
            params,
            dimension: RwLock::new(dimension),
            inner: RwLock::new(Inner {
                hnsw: new_graph(INITIAL_CAPACITY, &params),
                id_to_internal: HashMap::new(),
                internal_to_id: Vec::new(),
                tombstoned: HashSet::new(),
                capacity: INITIAL_CAPACITY,
                vectors: Vec::new(),
            }),
        }
    }

    pub fn dimension(&self) -> Option<usize> {
        *self.dimension.read().unwrap()
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), StoreError> {
        let mut dim = self.dimension.write().unwrap();
        match *dim {
            Some(expected) if expected != vector.len() => Err(StoreError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }),
            Some(_) => Ok(()),
            None => {
                *dim = Some(vector.len());
                Ok(())
            }
        }
    }

    fn rebuild_if_needed(inner: &mut Inner, params: &HnswParams, incoming: usize) {
        if inner.internal_to_id.len() + incoming <= inner.capacity {
            return;
        }
        let mut new_capacity = inner.capacity * 2;
        while new_capacity < inner.internal_to_id.len() + incoming {
            new_capacity *= 2;
        }
        let graph = new_graph(new_capacity, params);
        for (internal_id, vector) in inner.vectors.iter().enumerate() {
            if !inner.tombstoned.contains(&internal_id) {
                graph.insert((vector.as_slice(), internal_id));
            }
        }
        inner.hnsw = graph;
        inner.capacity = new_capacity;
        tracing::debug!(new_capacity, "rebuilt hnsw graph at larger capacity");
    }

    pub fn insert(&self, id: &str, vector: &[f32]) -> Result<(), StoreError> {
        self.check_dimension(vector)?;
        let mut inner = self.inner.write().unwrap();
        Self::rebuild_if_needed(&mut inner, &self.params, 1);

        if let Some(&existing) = inner.id_to_internal.get(id) {
            inner.tombstoned.insert(existing);
        }
        let internal_id = inner.internal_to_id.len();
        inner.hnsw.insert((vector, internal_id));
        inner.internal_to_id.push(Some(id.to_string()));
        inner.vectors.push(vector.to_vec());
        inner.id_to_internal.insert(id.to_string(), internal_id);
        Ok(())
    }

    pub fn insert_batch(&self, pairs: &[(String, Vec<f32>)]) -> Result<(), StoreError> {
        if pairs.is_empty() {
            return Ok(());
        }
        for (_, v) in pairs {
            self.check_dimension(v)?;
        }
        let mut inner = self.inner.write().unwrap();
        Self::rebuild_if_needed(&mut inner, &self.params, pairs.len());
        for (id, vector) in pairs {
            if let Some(&existing) = inner.id_to_internal.get(id) {
                inner.tombstoned.insert(existing);
            }
            let internal_id = inner.internal_to_id.len();
            inner.hnsw.insert((vector.as_slice(), internal_id));
            inner.internal_to_id.push(Some(id.clone()));
            inner.vectors.push(vector.clone());
            inner.id_to_internal.insert(id.clone(), internal_id);
        }
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(&internal_id) = inner.id_to_internal.get(id) {
            inner.tombstoned.insert(internal_id);
            inner.id_to_internal.remove(id);
        }
        Ok(())
    }

    /// Fetches a previously inserted vector by id, letting callers migrate
    /// it to a new id without a fresh embed call. `None` if `id` was never
    /// inserted or has since been deleted.
    pub fn get(&self, id: &str) -> Result<Option<Vec<f32>>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.id_to_internal.get(id).map(|&internal| inner.vectors[internal].clone()))
    }

    /// Top-`k` `(id, distance)`, lower distance = closer. Tombstoned ids
    /// are never returned; we oversample until `k` live results are found
    /// or the graph is exhausted.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let inner = self.inner.read().unwrap();
        if inner.internal_to_id.is_empty() {
            return Ok(Vec::new());
        }
        let mut fetch = k;
        loop {
            let ef = fetch.max(self.params.ef_search);
            let neighbours = inner.hnsw.search(query, fetch, ef);
            let mut out = Vec::with_capacity(k);
            for n in &neighbours {
                if inner.tombstoned.contains(&n.d_id) {
                    continue;
                }
                if let Some(Some(id)) = inner.internal_to_id.get(n.d_id) {
                    out.push((id.clone(), n.distance));
                }
                if out.len() >= k {
                    break;
                }
            }
            if out.len() >= k || fetch >= inner.internal_to_id.len() {
                out.truncate(k);
                return Ok(out);
            }
            fetch = (fetch * 2).min(inner.internal_to_id.len());
        }
    }

    pub fn size(&self) -> usize {
        let inner = self.inner.read().unwrap();
        inner.internal_to_id.len() - inner.tombstoned.len()
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        *inner = Inner {
            hnsw: new_graph(INITIAL_CAPACITY, &self.params),
            id_to_internal: HashMap::new(),
            internal_to_id: Vec::new(),
            tombstoned: HashSet::new(),
            capacity: INITIAL_CAPACITY,
            vectors: Vec::new(),
        };
        *self.dimension.write().unwrap() = None;
        Ok(())
    }

    /// Persist vectors and the id mapping. In-memory writes are not
    /// durable until this is called.
    pub fn save(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let inner = self.inner.read().unwrap();

        let mapping = Mapping {
            entries: inner
                .internal_to_id
                .iter()
                .enumerate()
                .filter_map(|(internal_id, id)| {
                    id.as_ref().map(|id| MappingEntry {
                        id: id.clone(),
                        tombstoned: inner.tombstoned.contains(&internal_id),
                        vector: inner.vectors[internal_id].clone(),
                    })
                })
                .collect(),
        };
        let mapping_path = self.dir.join("vectors.mapping.json");
        std::fs::write(&mapping_path, serde_json::to_string(&mapping)?)?;

        // hnsw_rs's own graph dump, kept alongside the mapping file; the
        // pair is referred to collectively as `vectors.bin` in the index
        // directory layout.
        let basename = "vectors".to_string();
        inner
            .hnsw
            .file_dump(&self.dir, &basename)
            .map_err(StoreError::VectorIndex)?;

        Manifest {
            dimension: *self.dimension.read().unwrap(),
            metric: "cosine".to_string(),
        }
        .save(&self.dir)?;

        Ok(())
    }

    /// Restore the last saved state, rebuilding the graph from the
    /// persisted raw vectors (simpler and more robust than trusting
    /// `hnsw_rs`'s own reload across versions, at the cost of a rebuild).
    pub fn load(&self) -> Result<(), StoreError> {
        let mapping_path = self.dir.join("vectors.mapping.json");
        if !mapping_path.exists() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(&mapping_path)?;
        let mapping: Mapping = serde_json::from_str(&raw)?;

        let manifest = Manifest::load(&self.dir)?.unwrap_or_default();
        let dimension = manifest.dimension.or_else(|| {
            mapping.entries.first().map(|e| e.vector.len())
        });

        let capacity = (mapping.entries.len().max(1) * 2).max(INITIAL_CAPACITY);
        let graph = new_graph(capacity, &self.params);
        let mut id_to_internal = HashMap::new();
        let mut internal_to_id = Vec::with_capacity(mapping.entries.len());
        let mut tombstoned = HashSet::new();
        let mut vectors = Vec::with_capacity(mapping.entries.len());

        for (internal_id, entry) in mapping.entries.into_iter().enumerate() {
            if !entry.tombstoned {
                graph.insert((entry.vector.as_slice(), internal_id));
                id_to_internal.insert(entry.id.clone(), internal_id);
            } else {
                tombstoned.insert(internal_id);
            }
            internal_to_id.push(Some(entry.id));
            vectors.push(entry.vector);
        }

        let mut inner = self.inner.write().unwrap();
        *inner = Inner {
            hnsw: graph,
            id_to_internal,
            internal_to_id,
            tombstoned,
            capacity,
            vectors,
        };
        *self.dimension.write().unwrap() = dimension;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> HnswVectorStore {
        HnswVectorStore::new(
            tempfile::tempdir().unwrap().into_path(),
            HnswParams::default(),
        )
    }

    #[test]
    fn insert_then_search_finds_nearest() {
        let store = store();
        store.insert("a", &[1.0, 0.0, 0.0]).unwrap();
        store.insert("b", &[0.0, 1.0, 0.0]).unwrap();
        let hits = store.search(&[0.9, 0.1, 0.0], 1).unwrap();
        assert_eq!(hits[0].0, "a");
    }

    #[test]
    fn dimension_mismatch_is_rejected_atomically() {
        let store = store();
        store.insert("a", &[1.0, 0.0]).unwrap();
        let err = store.insert("b", &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { expected: 2, actual: 3 }));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn deleted_ids_never_returned_by_search() {
        let store = store();
        store.insert("a", &[1.0, 0.0]).unwrap();
        store.insert("b", &[0.9, 0.1]).unwrap();
        store.delete("a").unwrap();
        let hits = store.search(&[1.0, 0.0], 5).unwrap();
        assert!(hits.iter().all(|(id, _)| id != "a"));
    }

    #[test]
    fn empty_search_and_zero_k_return_empty() {
        let store = store();
        assert!(store.search(&[1.0, 0.0], 0).unwrap().is_empty());
        assert!(store.search(&[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn get_returns_the_stored_vector_and_none_after_delete() {
        let store = store();
        store.insert("a", &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(vec![1.0, 2.0, 3.0]));
        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("missing").unwrap(), None);
    }
}
