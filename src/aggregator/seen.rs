use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::Result;
use crate::utils::fs::write_json;

pub const SEEN_FILE: &str = "seen_hashes.json";

/// Content hashes already delivered. Without a cache directory nothing is persisted.
#[derive(Debug, Default)]
pub struct SeenStore {
    path: Option<PathBuf>,
    hashes: BTreeSet<String>,
}

impl SeenStore {
    pub fn load(cache_dir: Option<&Path>) -> Result<Self> {
        let Some(dir) = cache_dir else {
            return Ok(Self::default());
        };

        let path = dir.join(SEEN_FILE);
        let hashes = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            BTreeSet::new()
        };
        debug!(path = %path.display(), count = hashes.len(), "Loaded seen feed items");

        Ok(Self { path: Some(path), hashes })
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    /// Returns `true` when `hash` was not seen before.
    pub fn insert(&mut self, hash: impl Into<String>) -> bool {
        self.hashes.insert(hash.into())
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => write_json(path, &self.hashes),
            None => Ok(()),
        }
    }
}
