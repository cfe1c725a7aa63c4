//! One poll-and-normalize cycle
//!
//! `/stats` is fetched first, then `/gc-stats` when GC reporting is on.
//! The requests run strictly one after another and any failure aborts the
//! whole cycle; there is no partial result.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::aggregate::aggregate;
use crate::config::{Mode, PluginConfig, StatsKind};
use crate::error::Result;
use crate::models::{GcDocument, StatsDocument};
use crate::reconcile::reconcile_gc;
use crate::shape::shape_worker_stats;
use crate::transport::{create_transport, StatsTransport};
use crate::Metrics;

/// Polls one Puma control server
pub struct Poller {
    transport: Arc<dyn StatsTransport>,
    with_gc: bool,
    mode: Mode,
}

impl Poller {
    pub fn new(transport: Arc<dyn StatsTransport>, with_gc: bool, mode: Mode) -> Self {
        Self {
            transport,
            with_gc,
            mode,
        }
    }

    /// Poller using the transport the configuration asks for
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        Ok(Self::new(
            create_transport(config)?,
            config.with_gc,
            config.mode,
        ))
    }

    /// Fetch and normalize all stats into one flat mapping
    pub async fn poll(&self) -> Result<Metrics> {
        let start = Instant::now();

        let stats = self.fetch_stats().await?;
        let base = shape_worker_stats(&stats, self.mode);

        let gc = if self.with_gc {
            let gc = self.fetch_gc_stats().await?;
            Some(reconcile_gc(&gc))
        } else {
            None
        };

        let workers = match self.mode {
            Mode::Clustered => Some(stats.worker_status.as_slice()),
            Mode::Single => None,
        };
        let metrics = aggregate(base, gc, workers)?;

        info!(
            endpoint = %self.transport.endpoint(),
            metrics = metrics.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Poll complete"
        );

        Ok(metrics)
    }

    pub async fn fetch_stats(&self) -> Result<StatsDocument> {
        let body = self.transport.fetch(StatsKind::Stats).await?;
        let stats = StatsDocument::decode(&body)?;
        debug!(
            workers = stats.workers,
            reported = stats.worker_status.len(),
            phase = stats.phase,
            "Decoded stats"
        );
        Ok(stats)
    }

    pub async fn fetch_gc_stats(&self) -> Result<GcDocument> {
        let body = self.transport.fetch(StatsKind::GcStats).await?;
        let gc = GcDocument::decode(&body)?;
        debug!(fields = gc.len(), "Decoded gc-stats");
        Ok(gc)
    }
}
