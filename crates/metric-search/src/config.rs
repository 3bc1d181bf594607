//! Search core configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Tuning of the directory content batcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Maximum number of bulk lookups in flight, fast path and batches combined.
    pub max_parallel_requests: usize,
    /// Maximum number of distinct directories in one batch.
    pub max_batch_size: usize,
    /// Delay between creating a batch and running it.
    pub batch_aggregation_time_ms: u64,
}

impl BatcherConfig {
    /// Creates a config from the three batcher knobs.
    pub fn new(
        max_parallel_requests: usize,
        max_batch_size: usize,
        batch_aggregation_time_ms: u64,
    ) -> Self {
        Self {
            max_parallel_requests,
            max_batch_size,
            batch_aggregation_time_ms,
        }
    }

    /// Aggregation window as a Duration.
    pub fn batch_aggregation_time(&self) -> Duration {
        Duration::from_millis(self.batch_aggregation_time_ms)
    }

    /// Rejects zero-sized permit pools and batches.
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_requests == 0 {
            return Err(SearchError::InvalidConfig(
                "max_parallel_requests must be > 0".to_string(),
            ));
        }
        if self.max_parallel_requests > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(SearchError::InvalidConfig(format!(
                "max_parallel_requests must be <= {}",
                tokio::sync::Semaphore::MAX_PERMITS
            )));
        }
        if self.max_batch_size == 0 {
            return Err(SearchError::InvalidConfig(
                "max_batch_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_parallel_requests: 3,
            max_batch_size: 2000,
            batch_aggregation_time_ms: 50,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Directory content batcher settings.
    pub batcher: BatcherConfig,
}

impl SearchConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SearchConfig =
            toml::from_str(s).map_err(|e| SearchError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SearchError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.batcher.validate()
    }
}
