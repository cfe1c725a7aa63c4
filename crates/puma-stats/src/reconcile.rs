//! Canonical GC metrics from version-specific `GC.stat` fields
//!
//! Ruby renamed several `GC.stat` keys between 2.0 and 2.2 (and dropped a
//! few in 2.4). Each canonical metric lists the names it has carried,
//! oldest first. Reconciliation takes the first alias present in the
//! document; a metric with no alias present is left out of the result
//! rather than reported as zero.

use tracing::{debug, warn};

use crate::models::GcDocument;
use crate::Metrics;

/// A canonical metric and the raw field names it may be reported under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalMetric {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

const fn metric(name: &'static str, aliases: &'static [&'static str]) -> CanonicalMetric {
    CanonicalMetric { name, aliases }
}

/// Alias table for `/gc-stats`, in reporting order
pub const GC_METRICS: &[CanonicalMetric] = &[
    // gc.count
    metric("total", &["count"]),
    metric("minor", &["minor_gc_count"]),
    metric("major", &["major_gc_count"]),
    // gc.heap_slot
    metric("available_slots", &["heap_available_slots"]),
    metric(
        "live_slots",
        &["heap_live_num", "heap_live_slot", "heap_live_slots"],
    ),
    metric(
        "free_slots",
        &["heap_free_num", "heap_free_slot", "heap_free_slots"],
    ),
    metric(
        "final_slots",
        &["heap_final_num", "heap_final_slot", "heap_final_slots"],
    ),
    metric("marked_slots", &["heap_marked_slots"]),
    // gc.old_objects
    metric("old_count", &["old_object", "old_objects"]),
    metric("old_limit", &["old_object_limit", "old_objects_limit"]),
    // gc.old_malloc
    metric(
        "old_malloc_bytes",
        &["oldmalloc_increase", "oldmalloc_increase_bytes"],
    ),
    metric(
        "old_malloc_limit",
        &["oldmalloc_limit", "oldmalloc_increase_bytes_limit"],
    ),
];

/// First alias of `metric` that is set in `doc`, with its value
///
/// When a malformed document sets more than one alias the earliest
/// declared one wins.
pub fn first_set(doc: &GcDocument, metric: &CanonicalMetric) -> Option<(&'static str, f64)> {
    let mut present = metric
        .aliases
        .iter()
        .filter_map(|alias| doc.get(alias).map(|value| (*alias, value)));

    let chosen = present.next()?;
    let ignored: Vec<&str> = present.map(|(alias, _)| alias).collect();
    if !ignored.is_empty() {
        warn!(
            metric = metric.name,
            chosen = chosen.0,
            ignored = ?ignored,
            "Multiple gc-stats aliases set for one metric"
        );
    }

    Some(chosen)
}

/// Reconcile with an explicit alias table
pub fn reconcile_with(doc: &GcDocument, table: &[CanonicalMetric]) -> Metrics {
    let mut metrics = Metrics::new();

    for metric in table {
        match first_set(doc, metric) {
            Some((alias, value)) => {
                debug!(metric = metric.name, alias, value, "Reconciled gc metric");
                metrics.insert(metric.name.to_string(), value);
            }
            None => debug!(metric = metric.name, "No alias reported, omitting"),
        }
    }

    metrics
}

/// Canonical GC metrics for one `/gc-stats` document
pub fn reconcile_gc(doc: &GcDocument) -> Metrics {
    reconcile_with(doc, GC_METRICS)
}
