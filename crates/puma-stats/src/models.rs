//! Decoded documents from the Puma control server
//!
//! `/stats` has a small, mostly stable shape and is decoded into typed
//! structs. `/gc-stats` is `GC.stat` from whatever Ruby the server runs,
//! whose field names changed across releases, so it is kept as a plain
//! name to value map and interpreted by [`crate::reconcile`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::StatsKind;
use crate::error::{PumaError, Result};
use crate::flex;

/// Decoded `/stats` document
///
/// Only one of `worker_status` and the single-mode fields is meaningful
/// for a given server; which one is decided by configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatsDocument {
    #[serde(deserialize_with = "flex::int")]
    pub workers: i64,
    #[serde(deserialize_with = "flex::int")]
    pub phase: i64,
    #[serde(deserialize_with = "flex::int")]
    pub booted_workers: i64,
    #[serde(deserialize_with = "flex::int")]
    pub old_workers: i64,
    pub worker_status: Vec<WorkerEntry>,

    // Single mode
    #[serde(deserialize_with = "flex::opt_float")]
    pub backlog: Option<f64>,
    #[serde(deserialize_with = "flex::opt_float")]
    pub running: Option<f64>,
    #[serde(deserialize_with = "flex::opt_float")]
    pub pool_capacity: Option<f64>,
    #[serde(deserialize_with = "flex::opt_float")]
    pub max_threads: Option<f64>,
    #[serde(deserialize_with = "flex::opt_float")]
    pub requests_count: Option<f64>,
}

impl StatsDocument {
    pub fn decode(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|source| PumaError::Decode {
            kind: StatsKind::Stats,
            source,
        })
    }
}

/// One worker's snapshot inside `worker_status`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerEntry {
    #[serde(deserialize_with = "flex::int")]
    pub pid: i64,
    #[serde(deserialize_with = "flex::int")]
    pub index: i64,
    #[serde(deserialize_with = "flex::int")]
    pub phase: i64,
    #[serde(deserialize_with = "flex::flag")]
    pub booted: bool,
    #[serde(deserialize_with = "flex::opt_timestamp")]
    pub last_checkin: Option<DateTime<Utc>>,
    pub last_status: WorkerStatus,
}

/// Thread pool status of one worker. A worker that has not checked in yet
/// reports an empty object; Puma before 3.9 never sends `pool_capacity`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerStatus {
    #[serde(deserialize_with = "flex::opt_float")]
    pub backlog: Option<f64>,
    #[serde(deserialize_with = "flex::opt_float")]
    pub running: Option<f64>,
    #[serde(deserialize_with = "flex::opt_float")]
    pub pool_capacity: Option<f64>,
    #[serde(deserialize_with = "flex::opt_float")]
    pub max_threads: Option<f64>,
    #[serde(deserialize_with = "flex::opt_float")]
    pub requests_count: Option<f64>,
}

/// Decoded `/gc-stats` document
///
/// Holds only the fields that carried a number. A field that is absent
/// reads as `None`, which is different from a field reported as `0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcDocument {
    fields: BTreeMap<String, f64>,
}

impl GcDocument {
    pub fn decode(body: &[u8]) -> Result<Self> {
        let object: Map<String, Value> =
            serde_json::from_slice(body).map_err(|source| PumaError::Decode {
                kind: StatsKind::GcStats,
                source,
            })?;

        let mut fields = BTreeMap::new();
        for (name, value) in object {
            match flex::number(&value) {
                Some(number) => {
                    fields.insert(name, number);
                }
                None => debug!(field = %name, value = %value, "Ignoring non-numeric gc field"),
            }
        }

        Ok(Self { fields })
    }

    /// Value of a raw `GC.stat` field, `None` when the field is unset
    pub fn get(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for GcDocument {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
