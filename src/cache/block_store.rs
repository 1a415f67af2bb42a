//! Storage for out-of-line embedded data blocks.

use std::fs;
use std::path::{Path, PathBuf};

use dashmap::DashMap;

use super::{CacheError, CacheResult};

/// Keyed storage of encoded blocks.
pub trait BlockStore: Send + Sync {
    fn put(&self, key: &str, data: &[u8]) -> CacheResult<()>;
    fn get(&self, key: &str) -> CacheResult<Vec<u8>>;
    fn contains(&self, key: &str) -> bool;
    fn remove(&self, key: &str) -> CacheResult<bool>;
}

/// Blocks as files in one directory.
///
/// Writes go to a uniquely named temporary file in the same directory and
/// are then renamed over the target, so a reader never sees a partial block
/// and a failed write leaves the previous block intact.
#[derive(Debug, Clone)]
pub struct FileBlockStore {
    dir: PathBuf,
}

impl FileBlockStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, key: &str) -> PathBuf {
        // Keys are digests plus an index; anything else is flattened.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.block", safe))
    }
}

impl BlockStore for FileBlockStore {
    fn put(&self, key: &str, data: &[u8]) -> CacheResult<()> {
        let target = self.path_of(key);
        let temp = self
            .dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        if let Err(err) = fs::write(&temp, data).and_then(|_| fs::rename(&temp, &target)) {
            tracing::warn!(key, error = %err, "block write failed");
            let _ = fs::remove_file(&temp);
            return Err(err.into());
        }
        tracing::trace!(key, bytes = data.len(), "block stored");
        Ok(())
    }

    fn get(&self, key: &str) -> CacheResult<Vec<u8>> {
        match fs::read(self.path_of(key)) {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(CacheError::MissingBlock(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.path_of(key).is_file()
    }

    fn remove(&self, key: &str) -> CacheResult<bool> {
        match fs::remove_file(self.path_of(key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// Blocks in memory. For tests and short-lived plans.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: DashMap<String, Vec<u8>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl BlockStore for MemoryBlockStore {
    fn put(&self, key: &str, data: &[u8]) -> CacheResult<()> {
        self.blocks.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> CacheResult<Vec<u8>> {
        self.blocks
            .get(key)
            .map(|b| b.value().clone())
            .ok_or_else(|| CacheError::MissingBlock(key.to_string()))
    }

    fn contains(&self, key: &str) -> bool {
        self.blocks.contains_key(key)
    }

    fn remove(&self, key: &str) -> CacheResult<bool> {
        Ok(self.blocks.remove(key).is_some())
    }
}
