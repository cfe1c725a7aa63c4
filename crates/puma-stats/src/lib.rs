//! Stats normalization for Puma application servers
//!
//! This crate provides the core functionality for:
//! - Fetching `/stats` and `/gc-stats` over TCP or a unix domain socket
//! - Decoding payloads that differ across Puma and Ruby versions
//! - Reconciling renamed GC fields into canonical metric names
//! - Shaping worker stats for clustered or single mode
//! - Aggregating everything into one flat metric mapping
//! - Declaring how those metrics are grouped into graphs

pub mod aggregate;
pub mod config;
pub mod error;
pub mod graphdef;
pub mod models;
pub mod poll;
pub mod reconcile;
pub mod shape;
pub mod transport;

mod flex;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

pub use config::{Endpoint, Mode, PluginConfig, PluginConfigBuilder, StatsKind};
pub use error::{PumaError, Result};
pub use graphdef::{Graph, GraphDefinition, GraphMetric};
pub use models::{GcDocument, StatsDocument, WorkerEntry, WorkerStatus};
pub use poll::Poller;
pub use transport::{create_transport, HttpTransport, StatsTransport, UnixSocketTransport};

/// Flat mapping of metric key to sample value for one poll
pub type Metrics = BTreeMap<String, f64>;
