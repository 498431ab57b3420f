use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheEntry, CacheError};
use crate::helpers::time::Clock;
use crate::utils::constants::{CACHE_DIR_NAME, CACHE_FILE_EXTENSION};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One JSON file per key. Writes go to a temporary sibling file which is
/// then renamed over the target, so readers never observe a partial entry.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileCache {
    /// Create the cache rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
        Ok(Self { dir, clock })
    }

    /// `<tmp>/mpesa_cache`
    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join(CACHE_DIR_NAME)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the entry for `key`; the key itself never reaches the
    /// file system.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(format!("{digest}.{CACHE_FILE_EXTENSION}"))
    }

    fn tmp_path(&self, target: &Path) -> PathBuf {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        target.with_extension(format!("{}.{}.tmp", std::process::id(), n))
    }

    async fn remove(&self, path: &Path) -> Result<(), CacheError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(path, e)),
        }
    }

    /// Remove `path` only while it still holds `seen`, so an entry another
    /// writer renamed into place after our read survives. The window between
    /// the re-read and the unlink is not covered.
    pub(crate) async fn remove_if_unchanged(&self, path: &Path, seen: &str) -> Result<bool, CacheError> {
        match fs::read_to_string(path).await {
            Ok(current) if current == seen => {
                self.remove(path).await?;
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(path, e)),
        }
    }
}

#[async_trait]
impl Cache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let path = self.entry_path(key);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("cache entry '{}' is unreadable, dropping it: {}", path.display(), err);
                self.remove_if_unchanged(&path, &raw).await?;
                return Ok(None);
            }
        };

        if entry.is_expired(self.clock.now()) {
            debug!("cache entry '{}' expired at {}", path.display(), entry.expires_at);
            self.remove_if_unchanged(&path, &raw).await?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, payload: Value, ttl_seconds: u64) -> Result<(), CacheError> {
        let entry = CacheEntry::new(payload, self.clock.now(), ttl_seconds);
        let bytes = serde_json::to_vec(&entry).map_err(|source| CacheError::Encode {
            key: key.to_owned(),
            source,
        })?;

        let path = self.entry_path(key);
        let tmp = self.tmp_path(&path);
        if let Err(e) = write_private(&tmp, &bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_error(&tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_error(&path, e));
        }
        debug!("cache entry '{}' written, ttl {}s", path.display(), ttl_seconds);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.remove(&self.entry_path(key)).await
    }
}

async fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(path, bytes).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}
