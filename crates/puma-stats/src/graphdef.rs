//! Graph definitions declared to the metrics platform
//!
//! The set of graphs depends only on whether GC stats are collected and on
//! the deployment mode, never on polled data. A fresh definition is built
//! for every call, nothing is shared or patched in place.

use serde::Serialize;

use crate::config::Mode;

/// One metric line within a graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphMetric {
    pub name: &'static str,
    pub label: &'static str,
    /// Report as rate of change rather than raw value
    pub diff: bool,
    pub stacked: bool,
}

/// A named group of metrics drawn together
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Graph {
    /// Group name, may contain a `#` wildcard segment
    pub name: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    pub metrics: Vec<GraphMetric>,
}

impl Graph {
    fn integer(name: &'static str, label: &'static str, metrics: Vec<GraphMetric>) -> Self {
        Self {
            name,
            label,
            unit: "integer",
            metrics,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.name.split('.').any(|segment| segment == "#")
    }
}

fn gauge(name: &'static str, label: &'static str) -> GraphMetric {
    GraphMetric {
        name,
        label,
        diff: false,
        stacked: false,
    }
}

fn stacked(name: &'static str, label: &'static str) -> GraphMetric {
    GraphMetric {
        stacked: true,
        ..gauge(name, label)
    }
}

fn counter(name: &'static str, label: &'static str) -> GraphMetric {
    GraphMetric {
        diff: true,
        ..gauge(name, label)
    }
}

/// Ordered set of graphs for one configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphDefinition {
    graphs: Vec<Graph>,
}

impl GraphDefinition {
    pub fn for_config(with_gc: bool, mode: Mode) -> Self {
        let mut graphs = match mode {
            Mode::Clustered => clustered_graphs(),
            Mode::Single => single_graphs(),
        };
        if with_gc {
            graphs.extend(gc_graphs());
        }
        Self { graphs }
    }

    pub fn graphs(&self) -> &[Graph] {
        &self.graphs
    }

    pub fn get(&self, name: &str) -> Option<&Graph> {
        self.graphs.iter().find(|graph| graph.name == name)
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

fn clustered_graphs() -> Vec<Graph> {
    vec![
        Graph::integer(
            "workers",
            "Puma Workers",
            vec![
                gauge("workers", "Active workers"),
                counter("spawn_workers", "Spawn workers"),
                counter("removed_workers", "Removed workers"),
            ],
        ),
        Graph::integer("phase", "Puma Phase", vec![gauge("phase", "Active phase")]),
        Graph::integer("backlog.#", "Puma Backlog", vec![stacked("backlog", "Backlog")]),
        Graph::integer(
            "running.#",
            "Puma Running Thread",
            vec![
                stacked("running", "Running"),
                gauge("pool_capacity", "Pool Capacity"),
            ],
        ),
        Graph::integer(
            "backlog_summary",
            "Puma Backlog Summary",
            vec![
                gauge("max_backlog", "Max backlog"),
                gauge("min_backlog", "Min backlog"),
                gauge("ave_backlog", "Average backlog"),
                gauge("sum_backlog", "Total backlog"),
            ],
        ),
        Graph::integer(
            "running_summary",
            "Puma Running Thread Summary",
            vec![
                gauge("max_running", "Max running"),
                gauge("min_running", "Min running"),
                gauge("ave_running", "Average running"),
                gauge("sum_running", "Total running"),
            ],
        ),
    ]
}

fn single_graphs() -> Vec<Graph> {
    vec![
        Graph::integer("backlog", "Puma Backlog", vec![stacked("backlog", "Backlog")]),
        Graph::integer(
            "running",
            "Puma Running Thread",
            vec![stacked("running", "Running")],
        ),
        Graph::integer(
            "pool_capacity",
            "Puma Pool Capacity",
            vec![stacked("pool_capacity", "Pool Capacity")],
        ),
    ]
}

fn gc_graphs() -> Vec<Graph> {
    vec![
        Graph::integer(
            "gc.count",
            "Puma GC Count",
            vec![
                gauge("total", "Total GC count"),
                stacked("minor", "Minor GC count"),
                stacked("major", "Major GC count"),
            ],
        ),
        Graph::integer(
            "gc.heap_slot",
            "Puma GC Heap Slot",
            vec![
                gauge("available_slots", "Heap available slots"),
                stacked("live_slots", "Heap live slots"),
                stacked("free_slots", "Heap free slots"),
                gauge("final_slots", "Heap final slots"),
                gauge("marked_slots", "Heap marked slots"),
            ],
        ),
        Graph::integer(
            "gc.old_objects",
            "Puma GC Old Objects",
            vec![
                gauge("old_count", "Old Objects"),
                stacked("old_limit", "Old Objects Limit"),
            ],
        ),
        Graph::integer(
            "gc.old_malloc",
            "Puma GC Old Malloc Increase",
            vec![
                gauge("old_malloc_bytes", "Old Malloc Increase Bytes"),
                stacked("old_malloc_limit", "Old Malloc Increase Bytes Limit"),
            ],
        ),
    ]
}
