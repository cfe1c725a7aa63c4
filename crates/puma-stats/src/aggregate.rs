//! Merging stats and GC metrics, plus cross-worker summaries

use tracing::warn;

use crate::error::{PumaError, Result};
use crate::models::{WorkerEntry, WorkerStatus};
use crate::Metrics;

/// Per-worker quantities that get max/min/ave/sum summaries
const SUMMARIZED: &[(&str, fn(&WorkerStatus) -> Option<f64>)] =
    &[("backlog", backlog), ("running", running)];

fn backlog(status: &WorkerStatus) -> Option<f64> {
    status.backlog
}

fn running(status: &WorkerStatus) -> Option<f64> {
    status.running
}

/// max/min/average/sum of one quantity across workers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub max: f64,
    pub min: f64,
    pub ave: f64,
    pub sum: f64,
}

impl Summary {
    /// `None` for an empty input
    pub fn of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut iter = values.into_iter();
        let first = iter.next()?;

        let mut summary = Summary {
            max: first,
            min: first,
            ave: 0.0,
            sum: first,
        };
        let mut count = 1usize;

        for value in iter {
            if value > summary.max {
                summary.max = value;
            }
            if value < summary.min {
                summary.min = value;
            }
            summary.sum += value;
            count += 1;
        }
        summary.ave = summary.sum / count as f64;

        Some(summary)
    }

    fn insert_into(&self, metrics: &mut Metrics, name: &str) {
        for (stat, value) in [
            ("max", self.max),
            ("min", self.min),
            ("ave", self.ave),
            ("sum", self.sum),
        ] {
            insert_checked(metrics, format!("{}_{}", stat, name), value);
        }
    }
}

/// `max_backlog`, `ave_running`, ... across all workers
///
/// Fails with [`PumaError::NoWorkers`] on an empty worker list instead of
/// producing NaN averages. Workers that have not checked in count as 0,
/// matching their per-worker keys.
pub fn worker_summaries(workers: &[WorkerEntry]) -> Result<Metrics> {
    if workers.is_empty() {
        return Err(PumaError::NoWorkers);
    }

    let mut metrics = Metrics::new();
    for (name, read) in SUMMARIZED {
        let values = workers
            .iter()
            .map(|worker| read(&worker.last_status).unwrap_or(0.0));
        if let Some(summary) = Summary::of(values) {
            summary.insert_into(&mut metrics, name);
        }
    }

    Ok(metrics)
}

/// Union of base stats and GC metrics, with worker summaries when `workers`
/// is given (clustered mode)
///
/// Key namespaces are disjoint by construction; a collision is logged and
/// the later source (GC, then summaries) wins.
pub fn aggregate(
    base: Metrics,
    gc: Option<Metrics>,
    workers: Option<&[WorkerEntry]>,
) -> Result<Metrics> {
    let mut merged = base;

    if let Some(gc) = gc {
        for (key, value) in gc {
            insert_checked(&mut merged, key, value);
        }
    }

    if let Some(workers) = workers {
        for (key, value) in worker_summaries(workers)? {
            insert_checked(&mut merged, key, value);
        }
    }

    Ok(merged)
}

fn insert_checked(metrics: &mut Metrics, key: String, value: f64) {
    if let Some(previous) = metrics.insert(key.clone(), value) {
        warn!(key = %key, previous, value, "Metric key collision, overwriting");
    }
}
