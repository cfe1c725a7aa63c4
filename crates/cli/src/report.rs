//! mackerel-agent plugin protocol
//!
//! Metrics are printed as `{prefix}.{graph}.{metric}\t{value}\t{epoch}`
//! lines. Graph names may hold a `#` segment that matches any single key
//! segment, which is how per-worker keys land in one graph. Metrics marked
//! `diff` are reported as a per-minute rate against the previous run,
//! whose raw values are kept in a small JSON state file.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use puma_stats::{GraphDefinition, Metrics};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::output::format_value;

/// Set by mackerel-agent when it asks for graph definitions
const META_ENV: &str = "MACKEREL_AGENT_PLUGIN_META";

/// Previous samples older than this are not used for rates
const MAX_DIFF_INTERVAL_SECS: i64 = 600;

pub fn meta_requested() -> bool {
    std::env::var_os(META_ENV).is_some_and(|value| !value.is_empty())
}

#[derive(Serialize)]
struct Meta<'a> {
    graphs: BTreeMap<String, GraphMeta<'a>>,
}

#[derive(Serialize)]
struct GraphMeta<'a> {
    label: &'a str,
    unit: &'a str,
    metrics: Vec<MetricMeta<'a>>,
}

#[derive(Serialize)]
struct MetricMeta<'a> {
    name: &'a str,
    label: &'a str,
    stacked: bool,
}

/// Graph definition JSON, keyed by `{prefix}.{graph}`
pub fn meta_json(prefix: &str, definition: &GraphDefinition) -> Result<String> {
    let graphs = definition
        .graphs()
        .iter()
        .map(|graph| {
            let meta = GraphMeta {
                label: graph.label,
                unit: graph.unit,
                metrics: graph
                    .metrics
                    .iter()
                    .map(|metric| MetricMeta {
                        name: metric.name,
                        label: metric.label,
                        stacked: metric.stacked,
                    })
                    .collect(),
            };
            (format!("{}.{}", prefix, graph.name), meta)
        })
        .collect();

    serde_json::to_string(&Meta { graphs }).context("Failed to serialize graph definition")
}

pub fn print_meta(prefix: &str, definition: &GraphDefinition) -> Result<()> {
    println!("# mackerel-agent-plugin");
    println!("{}", meta_json(prefix, definition)?);
    Ok(())
}

/// One metric matched to a graph
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub value: f64,
    pub diff: bool,
}

/// Raw values of `diff` metrics from the previous run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffState {
    pub timestamp: i64,
    pub values: BTreeMap<String, f64>,
}

impl DiffState {
    /// `None` when there is no usable state yet
    pub fn load(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "No previous state");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Ignoring unreadable state file");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string(self).context("Failed to serialize state")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write state file {}", path.display()))
    }

    /// Per-minute rate of `name` since this state was recorded
    pub fn rate(&self, name: &str, value: f64, now: i64) -> Option<f64> {
        let last = *self.values.get(name)?;
        let elapsed = now - self.timestamp;

        if elapsed <= 0 || elapsed > MAX_DIFF_INTERVAL_SECS {
            debug!(metric = name, elapsed, "Previous sample out of range, skipping");
            return None;
        }

        let delta = value - last;
        if delta < 0.0 {
            debug!(metric = name, last, value, "Counter went backwards, skipping");
            return None;
        }

        Some(delta * 60.0 / elapsed as f64)
    }
}

/// Renders polled metrics according to a graph definition
pub struct Reporter<'a> {
    prefix: &'a str,
    definition: &'a GraphDefinition,
}

impl<'a> Reporter<'a> {
    pub fn new(prefix: &'a str, definition: &'a GraphDefinition) -> Self {
        Self { prefix, definition }
    }

    /// Metrics that belong to a graph, with their full names. Keys that no
    /// graph declares are dropped.
    pub fn samples(&self, metrics: &Metrics) -> Vec<Sample> {
        let mut samples = Vec::new();

        for graph in self.definition.graphs() {
            for metric in &graph.metrics {
                if graph.is_wildcard() {
                    let pattern: Vec<&str> = graph
                        .name
                        .split('.')
                        .chain(std::iter::once(metric.name))
                        .collect();
                    for (key, value) in metrics {
                        if key_matches(&pattern, key) {
                            samples.push(Sample {
                                name: format!("{}.{}", self.prefix, key),
                                value: *value,
                                diff: metric.diff,
                            });
                        }
                    }
                } else if let Some(value) = metrics.get(metric.name) {
                    samples.push(Sample {
                        name: format!("{}.{}.{}", self.prefix, graph.name, metric.name),
                        value: *value,
                        diff: metric.diff,
                    });
                }
            }
        }

        samples
    }

    /// Output lines plus the state to keep for the next run
    pub fn lines(
        &self,
        metrics: &Metrics,
        previous: Option<&DiffState>,
        now: i64,
    ) -> (Vec<String>, DiffState) {
        let mut state = DiffState {
            timestamp: now,
            values: BTreeMap::new(),
        };
        let mut lines = Vec::new();

        for sample in self.samples(metrics) {
            let value = if sample.diff {
                state.values.insert(sample.name.clone(), sample.value);
                match previous.and_then(|prev| prev.rate(&sample.name, sample.value, now)) {
                    Some(rate) => rate,
                    None => continue,
                }
            } else {
                sample.value
            };
            lines.push(format!("{}\t{}\t{}", sample.name, format_value(value), now));
        }

        (lines, state)
    }

    fn has_diff(&self) -> bool {
        self.definition
            .graphs()
            .iter()
            .any(|graph| graph.metrics.iter().any(|metric| metric.diff))
    }

    /// Print metric lines, updating the state file when rates are involved
    pub fn print(&self, metrics: &Metrics, state_path: &Path, now: i64) {
        if !self.has_diff() {
            let (lines, _) = self.lines(metrics, None, now);
            for line in lines {
                println!("{}", line);
            }
            return;
        }

        let previous = DiffState::load(state_path);
        let (lines, state) = self.lines(metrics, previous.as_ref(), now);
        for line in lines {
            println!("{}", line);
        }

        if let Err(err) = state.save(state_path) {
            warn!(error = %format!("{:#}", err), "Rates will be skipped on the next run");
        }
    }
}

fn key_matches(pattern: &[&str], key: &str) -> bool {
    let segments: Vec<&str> = key.split('.').collect();
    segments.len() == pattern.len()
        && pattern
            .iter()
            .zip(&segments)
            .all(|(expected, actual)| *expected == "#" || expected == actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use puma_stats::Mode;

    fn clustered_metrics() -> Metrics {
        [
            ("workers", 2.0),
            ("spawn_workers", 10.0),
            ("removed_workers", 4.0),
            ("phase", 0.0),
            ("backlog.worker0.backlog", 1.0),
            ("backlog.worker1.backlog", 3.0),
            ("running.worker0.running", 5.0),
            ("running.worker0.pool_capacity", 2.0),
            ("max_backlog", 3.0),
            ("unknown_key", 1.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn test_samples_match_graphs() {
        let definition = GraphDefinition::for_config(false, Mode::Clustered);
        let reporter = Reporter::new("puma", &definition);

        let names: Vec<String> = reporter
            .samples(&clustered_metrics())
            .into_iter()
            .map(|sample| sample.name)
            .collect();

        assert!(names.contains(&"puma.workers.workers".to_string()));
        assert!(names.contains(&"puma.phase.phase".to_string()));
        assert!(names.contains(&"puma.backlog.worker0.backlog".to_string()));
        assert!(names.contains(&"puma.backlog.worker1.backlog".to_string()));
        assert!(names.contains(&"puma.running.worker0.running".to_string()));
        assert!(names.contains(&"puma.running.worker0.pool_capacity".to_string()));
        assert!(names.contains(&"puma.backlog_summary.max_backlog".to_string()));
        assert!(!names.iter().any(|name| name.contains("unknown_key")));
        assert_eq!(names.len(), 9);
    }

    #[test]
    fn test_single_samples() {
        let definition = GraphDefinition::for_config(false, Mode::Single);
        let reporter = Reporter::new("app", &definition);
        let metrics: Metrics = [("backlog".to_string(), 0.0), ("running".to_string(), 4.0)]
            .into_iter()
            .collect();

        let samples = reporter.samples(&metrics);
        assert_eq!(
            samples,
            vec![
                Sample {
                    name: "app.backlog.backlog".into(),
                    value: 0.0,
                    diff: false
                },
                Sample {
                    name: "app.running.running".into(),
                    value: 4.0,
                    diff: false
                },
            ]
        );
    }

    #[test]
    fn test_first_run_skips_diff_metrics() {
        let definition = GraphDefinition::for_config(false, Mode::Clustered);
        let reporter = Reporter::new("puma", &definition);

        let (lines, state) = reporter.lines(&clustered_metrics(), None, 1_000);

        assert!(lines.contains(&"puma.workers.workers\t2\t1000".to_string()));
        assert!(!lines.iter().any(|line| line.contains("spawn_workers")));
        assert_eq!(state.timestamp, 1_000);
        assert_eq!(state.values["puma.workers.spawn_workers"], 10.0);
        assert_eq!(state.values["puma.workers.removed_workers"], 4.0);
    }

    #[test]
    fn test_diff_metrics_as_rate() {
        let definition = GraphDefinition::for_config(false, Mode::Clustered);
        let reporter = Reporter::new("puma", &definition);
        let (_, previous) = reporter.lines(&clustered_metrics(), None, 1_000);

        let mut metrics = clustered_metrics();
        metrics.insert("spawn_workers".into(), 12.0);
        metrics.insert("removed_workers".into(), 1.0);
        let (lines, _) = reporter.lines(&metrics, Some(&previous), 1_120);

        // 2 spawned over two minutes
        assert!(lines.contains(&"puma.workers.spawn_workers\t1\t1120".to_string()));
        // counter went backwards
        assert!(!lines.iter().any(|line| line.contains("removed_workers")));
    }

    #[test]
    fn test_rate_window() {
        let state = DiffState {
            timestamp: 100,
            values: [("a".to_string(), 5.0)].into_iter().collect(),
        };
        assert_eq!(state.rate("a", 8.0, 160), Some(3.0));
        assert_eq!(state.rate("a", 8.0, 100), None);
        assert_eq!(state.rate("a", 8.0, 100 + MAX_DIFF_INTERVAL_SECS + 1), None);
        assert_eq!(state.rate("b", 8.0, 160), None);
    }

    #[test]
    fn test_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mackerel-plugin-puma");
        assert!(DiffState::load(&path).is_none());

        let state = DiffState {
            timestamp: 42,
            values: [("puma.workers.spawn_workers".to_string(), 3.0)]
                .into_iter()
                .collect(),
        };
        state.save(&path).unwrap();
        assert_eq!(DiffState::load(&path), Some(state));

        std::fs::write(&path, "garbage").unwrap();
        assert!(DiffState::load(&path).is_none());
    }

    #[test]
    fn test_meta_json() {
        let definition = GraphDefinition::for_config(true, Mode::Single);
        let json: serde_json::Value =
            serde_json::from_str(&meta_json("puma", &definition).unwrap()).unwrap();

        let graphs = json["graphs"].as_object().unwrap();
        assert_eq!(graphs.len(), 7);
        assert_eq!(graphs["puma.gc.count"]["label"], "Puma GC Count");
        assert_eq!(graphs["puma.gc.count"]["unit"], "integer");
        assert_eq!(graphs["puma.gc.count"]["metrics"][1]["name"], "minor");
        assert_eq!(graphs["puma.gc.count"]["metrics"][1]["stacked"], true);
    }

    #[test]
    fn test_key_matches() {
        assert!(key_matches(&["backlog", "#", "backlog"], "backlog.worker3.backlog"));
        assert!(!key_matches(&["backlog", "#", "backlog"], "backlog.backlog"));
        assert!(!key_matches(&["running", "#", "running"], "running.worker0.pool_capacity"));
    }
}
