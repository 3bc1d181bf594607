//! Error types for the metric search core.

use std::sync::Arc;

use thiserror::Error;

use crate::backend::BackendError;
use crate::status::MetricStatus;
use crate::types::MetricDir;

/// Errors surfaced by status decoding and directory content loading.
///
/// The type is `Clone` so a single batch outcome can be delivered to every
/// caller that was folded into that batch.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// The bulk lookup itself failed. Shared by every caller in the batch.
    #[error("backend lookup failed: {0}")]
    Backend(#[source] Arc<BackendError>),

    /// The backend answered but left out some of the requested directories.
    #[error("backend returned no content for {} dirs: {}", dirs.len(), format_dirs(dirs))]
    InconsistentBatchResult {
        /// Directories missing from the response
        dirs: Vec<MetricDir>,
    },

    /// A persisted status id outside the known set.
    #[error("no metric status for id {0}")]
    UnknownStatusId(i64),

    /// An automatic status write that the transition table forbids.
    #[error("status transition {from:?} -> {to:?} is restricted")]
    RestrictedTransition {
        /// Current status
        from: MetricStatus,
        /// Requested status
        to: MetricStatus,
    },

    /// The batch holding this request went away without answering it.
    #[error("batch dropped before resolving dir '{0}'")]
    BatchDropped(MetricDir),

    /// Batcher or search configuration rejected at construction time.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl From<BackendError> for SearchError {
    fn from(e: BackendError) -> Self {
        SearchError::Backend(Arc::new(e))
    }
}

fn format_dirs(dirs: &[MetricDir]) -> String {
    dirs.iter()
        .map(|d| d.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result alias for metric search operations.
pub type Result<T> = std::result::Result<T, SearchError>;
