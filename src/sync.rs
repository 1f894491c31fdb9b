//! Chain snapshot synchronization
//!
//! Fetches the canonical chain from the authority before each round and
//! overwrites a local cache file verbatim. Purely best-effort: the caller
//! logs a failure and mines on with whatever cached state exists.

use crate::client::AuthorityClient;
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Keeps a local cache of the canonical chain snapshot
pub struct ChainSynchronizer {
    authority: Arc<AuthorityClient>,
    cache_file: PathBuf,
}

impl ChainSynchronizer {
    /// Create a synchronizer writing to the given cache file
    pub fn new(authority: Arc<AuthorityClient>, cache_file: impl Into<PathBuf>) -> Self {
        Self {
            authority,
            cache_file: cache_file.into(),
        }
    }

    /// Fetch the chain snapshot and overwrite the local cache
    pub async fn sync(&self) -> Result<()> {
        debug!("Synchronizing chain snapshot");
        let snapshot = self.authority.get_chain_snapshot().await?;
        write_cache(&self.cache_file, &snapshot).await?;

        info!(
            bytes = snapshot.len(),
            path = %self.cache_file.display(),
            "Chain snapshot cached"
        );
        Ok(())
    }

    /// Path of the cache file this synchronizer maintains
    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }
}

/// Overwrite the cache file, creating its directory if absent
async fn write_cache(path: &Path, snapshot: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, snapshot).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_cache_creates_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chaindata").join("blockchain.json");

        write_cache(&path, br#"{"chain":[]}"#).await.unwrap();

        let written = tokio::fs::read(&path).await.unwrap();
        assert_eq!(written, br#"{"chain":[]}"#);
    }

    #[tokio::test]
    async fn test_write_cache_overwrites_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blockchain.json");

        write_cache(&path, b"old snapshot").await.unwrap();
        write_cache(&path, b"new snapshot").await.unwrap();

        let written = tokio::fs::read(&path).await.unwrap();
        assert_eq!(written, b"new snapshot");
    }
}
