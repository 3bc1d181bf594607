//! Bulk directory content lookup interface.
//!
//! The batcher never talks to storage directly. It hands sets of directories to
//! a [`DirContentLoader`] and fans the answers back out to waiting callers.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{DirContent, MetricDir};

/// Failure of a bulk content lookup.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backing store could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The lookup did not finish in time.
    #[error("backend lookup timed out after {timeout_ms}ms")]
    Timeout {
        /// Elapsed time before giving up
        timeout_ms: u64,
    },

    /// The backing store reported a failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A lower-level I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Resolves a set of directories into their content in one call.
///
/// Implementations are expected to return an entry for every requested
/// directory. Missing entries are reported to the affected callers as
/// [`crate::SearchError::InconsistentBatchResult`].
#[async_trait]
pub trait DirContentLoader: Send + Sync + 'static {
    /// Loads the content of every directory in `dirs`.
    async fn load_dirs_content(
        &self,
        dirs: &HashSet<MetricDir>,
    ) -> Result<HashMap<MetricDir, DirContent>, BackendError>;
}

/// In-memory directory store.
///
/// Answers with the registered content for known directories and leaves
/// unknown ones out of the response.
#[derive(Debug, Default)]
pub struct MemoryDirStore {
    dirs: RwLock<HashMap<MetricDir, DirContent>>,
}

impl MemoryDirStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the content of a directory.
    pub fn insert(&self, dir: MetricDir, content: DirContent) {
        self.dirs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dir, content);
    }

    /// Number of registered directories.
    pub fn len(&self) -> usize {
        self.dirs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no directory is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DirContentLoader for MemoryDirStore {
    async fn load_dirs_content(
        &self,
        dirs: &HashSet<MetricDir>,
    ) -> Result<HashMap<MetricDir, DirContent>, BackendError> {
        let known = self.dirs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(dirs
            .iter()
            .filter_map(|dir| known.get(dir).map(|content| (dir.clone(), content.clone())))
            .collect())
    }
}
