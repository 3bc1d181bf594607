//! Common test utilities: an instrumented directory content loader.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

use metric_search::{
    BackendError, BatcherConfig, ChildEntry, DirContent, DirContentBatcher, DirContentLoader,
    MetricDir, MetricStatus, Result,
};

/// Directory whose lookup blocks until released, holding its backend permit.
pub const BLOCKER: &str = "blocker.";

/// Loader that records every bulk call and can be told to fail, omit or stall.
pub struct MockLoader {
    calls: Mutex<Vec<Vec<MetricDir>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    failing: HashSet<MetricDir>,
    omitted: HashSet<MetricDir>,
    latency: Duration,
    entered: Notify,
    release: Semaphore,
}

impl MockLoader {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            failing: HashSet::new(),
            omitted: HashSet::new(),
            latency: Duration::ZERO,
            entered: Notify::new(),
            release: Semaphore::new(0),
        }
    }

    /// Any bulk call containing one of these dirs fails.
    pub fn failing(mut self, dirs: &[&str]) -> Self {
        self.failing = dirs.iter().map(|d| MetricDir::new(*d)).collect();
        self
    }

    /// These dirs are left out of successful responses.
    pub fn omitting(mut self, dirs: &[&str]) -> Self {
        self.omitted = dirs.iter().map(|d| MetricDir::new(*d)).collect();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every bulk call so far, keys sorted.
    pub fn calls(&self) -> Vec<Vec<MetricDir>> {
        self.calls.lock().unwrap().clone()
    }

    /// Bulk calls that did not include the blocker.
    pub fn batch_calls(&self) -> Vec<Vec<MetricDir>> {
        let blocker = MetricDir::new(BLOCKER);
        self.calls()
            .into_iter()
            .filter(|call| !call.contains(&blocker))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Waits until a blocker lookup is stalled inside the loader.
    pub async fn wait_blocked(&self) {
        self.entered.notified().await;
    }

    /// Lets one stalled blocker lookup finish.
    pub fn release_blocker(&self) {
        self.release.add_permits(1);
    }
}

/// Content the mock returns for a dir: a single metric named after it.
pub fn content_for(dir: &MetricDir) -> DirContent {
    DirContent::new(
        vec![],
        vec![ChildEntry::new(format!("{}metric", dir.as_str()), MetricStatus::Simple)],
    )
}

#[async_trait]
impl DirContentLoader for MockLoader {
    async fn load_dirs_content(
        &self,
        dirs: &HashSet<MetricDir>,
    ) -> std::result::Result<HashMap<MetricDir, DirContent>, BackendError> {
        let mut sorted: Vec<MetricDir> = dirs.iter().cloned().collect();
        sorted.sort();
        self.calls.lock().unwrap().push(sorted);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if dirs.contains(&MetricDir::new(BLOCKER)) {
            self.entered.notify_one();
            self.release.acquire().await.unwrap().forget();
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if dirs.iter().any(|d| self.failing.contains(d)) {
            return Err(BackendError::Unavailable("injected failure".to_string()));
        }
        Ok(dirs
            .iter()
            .filter(|d| !self.omitted.contains(*d))
            .map(|d| (d.clone(), content_for(d)))
            .collect())
    }
}

pub fn batcher(
    loader: MockLoader,
    max_parallel_requests: usize,
    max_batch_size: usize,
    batch_aggregation_time_ms: u64,
) -> DirContentBatcher<MockLoader> {
    DirContentBatcher::new(
        Arc::new(loader),
        BatcherConfig::new(max_parallel_requests, max_batch_size, batch_aggregation_time_ms),
    )
    .unwrap()
}

pub fn spawn_load(
    batcher: &DirContentBatcher<MockLoader>,
    dir: &str,
) -> JoinHandle<Result<Arc<DirContent>>> {
    let batcher = batcher.clone();
    let dir = MetricDir::new(dir);
    tokio::spawn(async move { batcher.load_dir_content(&dir).await })
}

/// Occupies one backend permit with a stalled blocker lookup.
pub async fn saturate(batcher: &DirContentBatcher<MockLoader>) -> JoinHandle<Result<Arc<DirContent>>> {
    let handle = spawn_load(batcher, BLOCKER);
    batcher.loader().wait_blocked().await;
    handle
}

/// Lets every ready task run without reaching the aggregation deadline.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn dirs(paths: &[&str]) -> Vec<MetricDir> {
    paths.iter().map(|p| MetricDir::new(*p)).collect()
}
