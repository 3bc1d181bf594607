//! Batched directory content loading.
//!
//! Callers ask for the content of one directory at a time, while the backend
//! is cheapest when asked for many directories at once. [`DirContentBatcher`]
//! sits between the two:
//!
//! - If a backend permit is free, the request goes straight to the backend as
//!   a single-directory lookup.
//! - Otherwise the request joins the current open batch (creating one if there
//!   is none or the open one is full). A batch fires once its aggregation delay
//!   has elapsed, waits for a permit, issues one bulk lookup for all of its
//!   directories and fans the answers back out.
//!
//! The permit pool bounds the number of bulk lookups in flight across both
//! paths. Joining a batch and detaching it for execution happen under the same
//! lock, so a request that joined a batch is always part of that batch's
//! lookup.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error};

use crate::backend::DirContentLoader;
use crate::config::BatcherConfig;
use crate::error::{Result, SearchError};
use crate::types::{DirContent, MetricDir};

type ContentResult = Result<Arc<DirContent>>;
type Waiters = Vec<oneshot::Sender<ContentResult>>;

/// Snapshot of batcher counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatcherStats {
    /// Requests served by a direct single-directory lookup.
    pub fast_path_loads: u64,
    /// Batches created.
    pub batches_created: u64,
    /// Batches that issued their bulk lookup.
    pub batches_executed: u64,
    /// Distinct directories sent in bulk lookups.
    pub batched_dirs: u64,
    /// Requests that found their directory already pending in the open batch.
    pub dedup_joins: u64,
    /// Bulk or single lookups that failed in the backend.
    pub backend_failures: u64,
    /// Requested directories the backend left out of a successful response.
    pub omitted_dirs: u64,
}

#[derive(Default)]
struct Counters {
    fast_path_loads: AtomicU64,
    batches_created: AtomicU64,
    batches_executed: AtomicU64,
    batched_dirs: AtomicU64,
    dedup_joins: AtomicU64,
    backend_failures: AtomicU64,
    omitted_dirs: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> BatcherStats {
        BatcherStats {
            fast_path_loads: self.fast_path_loads.load(Ordering::Relaxed),
            batches_created: self.batches_created.load(Ordering::Relaxed),
            batches_executed: self.batches_executed.load(Ordering::Relaxed),
            batched_dirs: self.batched_dirs.load(Ordering::Relaxed),
            dedup_joins: self.dedup_joins.load(Ordering::Relaxed),
            backend_failures: self.backend_failures.load(Ordering::Relaxed),
            omitted_dirs: self.omitted_dirs.load(Ordering::Relaxed),
        }
    }
}

/// Pending requests of one batch, keyed by directory.
///
/// Every waiter on the same directory receives the same outcome.
struct Batch {
    id: u64,
    requests: Mutex<HashMap<MetricDir, Waiters>>,
}

impl Batch {
    fn new(id: u64) -> Self {
        Self {
            id,
            requests: Mutex::new(HashMap::new()),
        }
    }

    fn size(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Adds a waiter for `dir`. Returns true if the directory was already pending.
    fn join(&self, dir: &MetricDir) -> (oneshot::Receiver<ContentResult>, bool) {
        let (tx, rx) = oneshot::channel();
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let existing = match requests.get_mut(dir) {
            Some(waiters) => {
                waiters.push(tx);
                true
            }
            None => {
                requests.insert(dir.clone(), vec![tx]);
                false
            }
        };
        (rx, existing)
    }

    fn take_requests(&self) -> HashMap<MetricDir, Waiters> {
        std::mem::take(&mut *self.requests.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn resolve(waiters: Waiters, outcome: ContentResult) {
    for tx in waiters {
        // The caller may have stopped waiting; nothing to do then.
        let _ = tx.send(outcome.clone());
    }
}

struct Inner<L> {
    loader: Arc<L>,
    config: BatcherConfig,
    permits: Semaphore,
    // Membership of the installed batch only changes while this lock is held.
    current: Mutex<Option<Arc<Batch>>>,
    next_batch_id: AtomicU64,
    stats: Counters,
}

impl<L: DirContentLoader> Inner<L> {
    async fn load_single(&self, dir: &MetricDir) -> ContentResult {
        let mut request = HashSet::with_capacity(1);
        request.insert(dir.clone());

        let mut contents = match self.loader.load_dirs_content(&request).await {
            Ok(contents) => contents,
            Err(e) => {
                self.stats.backend_failures.fetch_add(1, Ordering::Relaxed);
                error!("Failed to load content for dir {}: {}", dir, e);
                return Err(e.into());
            }
        };

        match contents.remove(dir) {
            Some(content) => Ok(Arc::new(content)),
            None => {
                self.stats.omitted_dirs.fetch_add(1, Ordering::Relaxed);
                error!("No data for dir {}", dir);
                Err(SearchError::InconsistentBatchResult {
                    dirs: vec![dir.clone()],
                })
            }
        }
    }

    fn join_current_batch(
        self: &Arc<Self>,
        dir: &MetricDir,
    ) -> oneshot::Receiver<ContentResult> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);

        let batch = match current.as_ref() {
            Some(batch) if batch.size() < self.config.max_batch_size => Arc::clone(batch),
            _ => {
                let batch = self.schedule_batch();
                *current = Some(Arc::clone(&batch));
                batch
            }
        };

        let (rx, existing) = batch.join(dir);
        if existing {
            self.stats.dedup_joins.fetch_add(1, Ordering::Relaxed);
        }
        rx
    }

    fn schedule_batch(self: &Arc<Self>) -> Arc<Batch> {
        let batch = Arc::new(Batch::new(self.next_batch_id.fetch_add(1, Ordering::Relaxed)));
        self.stats.batches_created.fetch_add(1, Ordering::Relaxed);
        debug!("Created dir content batch {}", batch.id);

        let inner = Arc::clone(self);
        let scheduled = Arc::clone(&batch);
        let delay = self.config.batch_aggregation_time();
        // Detached: dropping the handle never cancels a scheduled batch.
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.run_batch(scheduled).await;
        });
        batch
    }

    /// Uninstalls `batch` if it is still current and freezes its membership.
    fn detach(&self, batch: &Arc<Batch>) -> HashMap<MetricDir, Waiters> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(current.as_ref(), Some(c) if Arc::ptr_eq(c, batch)) {
            *current = None;
        }
        batch.take_requests()
    }

    async fn run_batch(&self, batch: Arc<Batch>) {
        // The pool is never closed, so this only returns once a permit frees up.
        let Ok(_permit) = self.permits.acquire().await else {
            let dropped = self.detach(&batch);
            error!(
                "Permit pool closed, dropping batch {} with {} dirs",
                batch.id,
                dropped.len()
            );
            return;
        };

        let mut pending = self.detach(&batch);
        if pending.is_empty() {
            return;
        }
        let dirs: HashSet<MetricDir> = pending.keys().cloned().collect();

        self.stats.batches_executed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .batched_dirs
            .fetch_add(dirs.len() as u64, Ordering::Relaxed);
        debug!(batch = batch.id, dirs = dirs.len(), "Running dir content batch");

        let contents = match self.loader.load_dirs_content(&dirs).await {
            Ok(contents) => contents,
            Err(e) => {
                self.stats.backend_failures.fetch_add(1, Ordering::Relaxed);
                let mut failed: Vec<&MetricDir> = dirs.iter().collect();
                failed.sort();
                error!(
                    batch = batch.id,
                    "Failed to load content for dirs {:?}: {}", failed, e
                );
                let err = SearchError::from(e);
                for waiters in pending.into_values() {
                    resolve(waiters, Err(err.clone()));
                }
                return;
            }
        };

        for (dir, content) in contents {
            match pending.remove(&dir) {
                Some(waiters) => resolve(waiters, Ok(Arc::new(content))),
                None => debug!(batch = batch.id, "Ignoring unrequested dir {}", dir),
            }
        }

        if !pending.is_empty() {
            let mut omitted: Vec<MetricDir> = pending.keys().cloned().collect();
            omitted.sort();
            self.stats
                .omitted_dirs
                .fetch_add(omitted.len() as u64, Ordering::Relaxed);
            error!(
                batch = batch.id,
                "{} requests without data for dirs: {:?}",
                omitted.len(),
                omitted
            );
            let err = SearchError::InconsistentBatchResult { dirs: omitted };
            for waiters in pending.into_values() {
                resolve(waiters, Err(err.clone()));
            }
        }
    }
}

/// Coordinates concurrent directory content requests against a bulk loader.
///
/// Cloning is cheap and shares the permit pool, the open batch and the counters.
pub struct DirContentBatcher<L> {
    inner: Arc<Inner<L>>,
}

impl<L> Clone for DirContentBatcher<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: DirContentLoader> DirContentBatcher<L> {
    /// Creates a batcher in front of `loader`.
    ///
    /// Returns an error if the config has a zero permit pool or batch size.
    /// Batches are scheduled on the ambient tokio runtime.
    pub fn new(loader: Arc<L>, config: BatcherConfig) -> Result<Self> {
        config.validate()?;
        let permits = Semaphore::new(config.max_parallel_requests);
        Ok(Self {
            inner: Arc::new(Inner {
                loader,
                config,
                permits,
                current: Mutex::new(None),
                next_batch_id: AtomicU64::new(1),
                stats: Counters::default(),
            }),
        })
    }

    /// Loads the content of one directory.
    ///
    /// Runs immediately when a backend permit is free, otherwise waits for the
    /// batch it joined to run. Fails with the backend's error if the lookup
    /// failed, or with [`SearchError::InconsistentBatchResult`] if the backend
    /// answered without this directory.
    pub async fn load_dir_content(&self, dir: &MetricDir) -> Result<Arc<DirContent>> {
        if let Ok(_permit) = self.inner.permits.try_acquire() {
            self.inner
                .stats
                .fast_path_loads
                .fetch_add(1, Ordering::Relaxed);
            return self.inner.load_single(dir).await;
        }

        let rx = self.inner.join_current_batch(dir);
        rx.await
            .map_err(|_| SearchError::BatchDropped(dir.clone()))?
    }

    /// Returns the number of backend permits currently free.
    pub fn available_permits(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> BatcherStats {
        self.inner.stats.snapshot()
    }

    /// Returns the batcher configuration.
    pub fn config(&self) -> &BatcherConfig {
        &self.inner.config
    }

    /// Returns the underlying loader.
    pub fn loader(&self) -> &Arc<L> {
        &self.inner.loader
    }
}
