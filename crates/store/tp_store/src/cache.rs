//! The build-once, reuse-forever cache layer.
//!
//! [`get_or_build`] wraps the store builder in a file-lock-protected archive:
//! the first run converts and persists, every later run loads the archive back
//! into memory. The backing is injectable so tests can run against an
//! in-memory map instead of real disk and lock files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use tp_episode::{RotationTransformer, ShapeMeta};

use crate::{
    archive, build_store, lock::FileLock, ArchiveError, ColumnarStore, StoreError, TranscodeConfig,
};

/// The archive file name, one per source directory.
pub const ARCHIVE_FILE_NAME: &str = "cache.tps";

// ----------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Build(#[from] StoreError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("failed to lock {path:?}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ----------------------------------------------------------------------------

/// Held for the whole check-then-build-or-load sequence; released on drop.
pub struct CacheGuard {
    _lock: Option<FileLock>,
}

/// Where archives live, keyed by canonical source-directory path.
pub trait CacheBacking {
    /// Serialize a store under `key`. Must not leave a partial entry behind on
    /// failure.
    fn store(&self, key: &Path, store: &ColumnarStore) -> Result<(), CacheError>;

    /// Load the store cached under `key`, if any.
    fn load(&self, key: &Path) -> Result<Option<ColumnarStore>, CacheError>;

    /// Exclusively lock `key` for the duration of the returned guard.
    fn lock(&self, key: &Path) -> Result<CacheGuard, CacheError>;
}

// ----------------------------------------------------------------------------

/// The production backing: a `.tps` archive next to the episodes, plus a
/// companion lock file.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskBacking;

impl DiskBacking {
    fn archive_path(key: &Path) -> PathBuf {
        key.join(ARCHIVE_FILE_NAME)
    }
}

impl CacheBacking for DiskBacking {
    fn store(&self, key: &Path, store: &ColumnarStore) -> Result<(), CacheError> {
        let path = Self::archive_path(key);
        if let Err(err) = archive::write_archive(&path, store) {
            // No corrupt-cache invariant: a failed write must not leave a
            // partial archive for the next run to trip over.
            std::fs::remove_file(&path).ok();
            return Err(err.into());
        }
        Ok(())
    }

    fn load(&self, key: &Path) -> Result<Option<ColumnarStore>, CacheError> {
        let path = Self::archive_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(archive::read_archive(&path)?))
    }

    fn lock(&self, key: &Path) -> Result<CacheGuard, CacheError> {
        let mut path = Self::archive_path(key).into_os_string();
        path.push(".lock");
        let path = PathBuf::from(path);

        let lock = FileLock::acquire(&path).map_err(|source| CacheError::Lock {
            path: path.clone(),
            source,
        })?;
        Ok(CacheGuard { _lock: Some(lock) })
    }
}

// ----------------------------------------------------------------------------

/// An in-memory backing for tests: no disk, no lock files, single process.
#[derive(Debug, Default)]
pub struct MemoryBacking {
    entries: Mutex<HashMap<PathBuf, ColumnarStore>>,
}

impl CacheBacking for MemoryBacking {
    fn store(&self, key: &Path, store: &ColumnarStore) -> Result<(), CacheError> {
        self.entries.lock().insert(key.to_owned(), store.clone());
        Ok(())
    }

    fn load(&self, key: &Path) -> Result<Option<ColumnarStore>, CacheError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn lock(&self, _key: &Path) -> Result<CacheGuard, CacheError> {
        Ok(CacheGuard { _lock: None })
    }
}

// ----------------------------------------------------------------------------

/// Build the store for `source_dir`, or load it from the cache if a previous
/// run already built it.
///
/// The lock is taken *before* the existence check and held until the archive
/// is fully written or fully loaded, so concurrent builders serialize and no
/// reader can observe a half-written archive. Any error during build or
/// serialization propagates with no archive left behind, so the next
/// invocation retries cleanly.
pub fn get_or_build(
    source_dir: &Path,
    shape_meta: &ShapeMeta,
    transformer: &RotationTransformer,
    config: &TranscodeConfig,
    backing: &dyn CacheBacking,
) -> Result<ColumnarStore, CacheError> {
    let key = std::fs::canonicalize(source_dir).map_err(|source| CacheError::Io {
        path: source_dir.to_owned(),
        source,
    })?;

    tp_log::debug!("acquiring cache lock for {key:?}");
    let _guard = backing.lock(&key)?;

    if let Some(store) = backing.load(&key)? {
        tp_log::info!("loaded cached store for {key:?}");
        return Ok(store);
    }

    tp_log::info!("no cached store for {key:?}, converting");
    let store = match build_store(&key, shape_meta, transformer, config) {
        Ok(store) => store,
        Err(err) => {
            tp_log::warn!(
                "conversion of {key:?} failed: {}",
                tp_error::format_ref(&err)
            );
            return Err(err.into());
        }
    };
    backing.store(&key, &store)?;

    Ok(store)
}
