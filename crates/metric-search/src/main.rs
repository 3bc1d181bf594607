#![warn(missing_docs)]

//! Metric search demo: resolves directory content through the batcher

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use metric_search::{
    ChildEntry, DirContent, DirContentBatcher, MemoryDirStore, MetricDir, MetricStatus,
    SearchConfig,
};

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "metric-search", about = "Resolve metric tree directories through the content batcher")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long, env = "METRIC_SEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Directories to resolve, as dotted paths ending with '.'
    #[arg(short, long, value_delimiter = ',', default_value = "one_min.,one_min.host1.,one_min.host2.")]
    dirs: Vec<String>,
}

fn demo_store() -> MemoryDirStore {
    let store = MemoryDirStore::new();
    let root = MetricDir::ROOT.child("one_min");
    store.insert(
        MetricDir::ROOT,
        DirContent::new(vec![ChildEntry::new("one_min", MetricStatus::Simple)], vec![]),
    );
    store.insert(
        root.clone(),
        DirContent::new(
            vec![
                ChildEntry::new("host1", MetricStatus::Simple),
                ChildEntry::new("host2", MetricStatus::AutoHidden),
                ChildEntry::new("host3", MetricStatus::Ban),
            ],
            vec![],
        ),
    );
    for (host, status) in [("host1", MetricStatus::Approved), ("host2", MetricStatus::Hidden)] {
        store.insert(
            root.child(host),
            DirContent::new(
                vec![],
                vec![
                    ChildEntry::new("cpu", status),
                    ChildEntry::new("mem", MetricStatus::Simple),
                ],
            ),
        );
    }
    store
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SearchConfig::load(path)?,
        None => SearchConfig::default(),
    };
    tracing::info!("Metric search starting with {:?}", config.batcher);

    let batcher = DirContentBatcher::new(Arc::new(demo_store()), config.batcher)?;

    let mut tasks = Vec::with_capacity(args.dirs.len());
    for path in args.dirs {
        let batcher = batcher.clone();
        tasks.push(tokio::spawn(async move {
            let dir = MetricDir::new(path);
            let result = batcher.load_dir_content(&dir).await;
            (dir, result)
        }));
    }

    for task in tasks {
        let (dir, result) = task.await?;
        match result {
            Ok(content) => {
                let dirs: Vec<&str> = content.visible_dirs().map(|e| e.name.as_str()).collect();
                let metrics: Vec<&str> =
                    content.visible_metrics().map(|e| e.name.as_str()).collect();
                tracing::info!(
                    "{}: {} children, visible dirs {:?}, visible metrics {:?}, all hidden: {}",
                    dir,
                    content.len(),
                    dirs,
                    metrics,
                    content.all_hidden()
                );
            }
            Err(e) => tracing::warn!("{}: {}", dir, e),
        }
    }

    tracing::info!("Batcher stats: {:?}", batcher.stats());
    Ok(())
}
