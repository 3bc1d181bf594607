#![warn(missing_docs)]

//! Metric tree search core: node status model and batched directory content loading

pub mod backend;
pub mod batcher;
pub mod config;
pub mod error;
pub mod status;
pub mod types;

pub use backend::{BackendError, DirContentLoader, MemoryDirStore};
pub use batcher::{BatcherStats, DirContentBatcher};
pub use config::{BatcherConfig, SearchConfig};
pub use error::{Result, SearchError};
pub use status::MetricStatus;
pub use types::{ChildEntry, DirContent, MetricDir};
