//! `manifest.json` — the index directory's schema/dimension/metric record.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub dimension: Option<usize>,
    pub metric: String,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            dimension: None,
            metric: "cosine".to_string(),
        }
    }
}

impl Manifest {
    pub fn load(dir: &Path) -> Result<Option<Manifest>, StoreError> {
        let path = dir.join("manifest.json");
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save(&self, dir: &Path) -> Result<(), StoreError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("manifest.json");
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
