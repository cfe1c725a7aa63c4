//! Worker stats keyed for clustered or single mode

use tracing::warn;

use crate::config::Mode;
use crate::models::{StatsDocument, WorkerEntry};
use crate::Metrics;

/// Key for a per-worker sample, e.g. `backlog.worker0.backlog`
pub fn worker_key(graph: &str, index: i64, metric: &str) -> String {
    format!("{}.worker{}.{}", graph, index, metric)
}

/// Flat worker stats for the configured mode
///
/// The mode always comes from configuration; the document is never used
/// to guess it.
pub fn shape_worker_stats(doc: &StatsDocument, mode: Mode) -> Metrics {
    match mode {
        Mode::Clustered => clustered(doc),
        Mode::Single => single(doc),
    }
}

fn clustered(doc: &StatsDocument) -> Metrics {
    let mut metrics = Metrics::new();

    metrics.insert("workers".into(), doc.workers as f64);
    metrics.insert("spawn_workers".into(), doc.booted_workers as f64);
    metrics.insert("removed_workers".into(), doc.old_workers as f64);
    metrics.insert("phase".into(), doc.phase as f64);

    for worker in &doc.worker_status {
        insert_worker(&mut metrics, worker);
    }

    metrics
}

fn insert_worker(metrics: &mut Metrics, worker: &WorkerEntry) {
    let status = &worker.last_status;
    let backlog_key = worker_key("backlog", worker.index, "backlog");

    if metrics.contains_key(&backlog_key) {
        warn!(
            index = worker.index,
            pid = worker.pid,
            "Duplicate worker index in worker_status, later entry wins"
        );
    }

    metrics.insert(backlog_key, status.backlog.unwrap_or(0.0));
    metrics.insert(
        worker_key("running", worker.index, "running"),
        status.running.unwrap_or(0.0),
    );
    if let Some(pool_capacity) = status.pool_capacity {
        metrics.insert(
            worker_key("running", worker.index, "pool_capacity"),
            pool_capacity,
        );
    }
}

fn single(doc: &StatsDocument) -> Metrics {
    let mut metrics = Metrics::new();

    metrics.insert("backlog".into(), doc.backlog.unwrap_or(0.0));
    metrics.insert("running".into(), doc.running.unwrap_or(0.0));
    if let Some(pool_capacity) = doc.pool_capacity {
        metrics.insert("pool_capacity".into(), pool_capacity);
    }

    metrics
}
