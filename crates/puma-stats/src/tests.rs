//! Pipeline tests for a full poll cycle
//!
//! These tests use an in-memory transport so the decode, reconcile, shape
//! and aggregate steps run together without a live server.

#[cfg(test)]
mod poll_tests {
    use crate::config::{Mode, StatsKind};
    use crate::error::{PumaError, Result};
    use crate::poll::Poller;
    use crate::transport::StatsTransport;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    const CLUSTERED_STATS: &str = r#"{
        "workers": 2,
        "phase": 0,
        "booted_workers": 2,
        "old_workers": 0,
        "worker_status": [
            {"pid": 6161, "index": 0, "phase": 0, "booted": true,
             "last_checkin": "2017-04-30T05:37:59Z",
             "last_status": {"backlog": 1, "running": 5, "pool_capacity": 4}},
            {"pid": 6162, "index": 1, "phase": 0, "booted": true,
             "last_checkin": "2017-04-30T05:37:59Z",
             "last_status": {"backlog": 1, "running": 5, "pool_capacity": 4}}
        ]
    }"#;

    const SINGLE_STATS: &str = r#"{"backlog": 0, "running": 5, "pool_capacity": 3, "max_threads": 5}"#;

    const RUBY22_GC: &str = r#"{
        "count": 5,
        "minor_gc_count": 3,
        "major_gc_count": 2,
        "heap_live_slots": 29204,
        "heap_free_slots": 961,
        "heap_final_slots": 0,
        "heap_marked_slots": 8805,
        "heap_available_slots": 30165,
        "old_objects": 7418,
        "old_objects_limit": 10932,
        "oldmalloc_increase_bytes": 153288,
        "oldmalloc_increase_bytes_limit": 16777216
    }"#;

    /// Canned responses per endpoint, recording the order of requests
    struct FakeTransport {
        stats: std::result::Result<&'static str, &'static str>,
        gc_stats: std::result::Result<&'static str, &'static str>,
        calls: Mutex<Vec<StatsKind>>,
    }

    impl FakeTransport {
        fn new(
            stats: std::result::Result<&'static str, &'static str>,
            gc_stats: std::result::Result<&'static str, &'static str>,
        ) -> Arc<Self> {
            Arc::new(Self {
                stats,
                gc_stats,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<StatsKind> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StatsTransport for FakeTransport {
        async fn fetch(&self, kind: StatsKind) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(kind);
            let canned = match kind {
                StatsKind::Stats => self.stats,
                StatsKind::GcStats => self.gc_stats,
            };
            match canned {
                Ok(body) => Ok(body.as_bytes().to_vec()),
                Err(status) => Err(PumaError::Remote {
                    endpoint: format!("fake/{}", kind),
                    status: status.to_string(),
                }),
            }
        }

        fn endpoint(&self) -> String {
            "fake".to_string()
        }
    }

    #[tokio::test]
    async fn test_clustered_poll_without_gc() {
        let transport = FakeTransport::new(Ok(CLUSTERED_STATS), Err("500 Internal Server Error"));
        let poller = Poller::new(transport.clone(), false, Mode::Clustered);

        let metrics = poller.poll().await.unwrap();

        assert_eq!(transport.calls(), vec![StatsKind::Stats]);
        assert_eq!(metrics["workers"], 2.0);
        assert_eq!(metrics["backlog.worker0.backlog"], 1.0);
        assert_eq!(metrics["running.worker1.pool_capacity"], 4.0);
        assert_eq!(metrics["max_backlog"], 1.0);
        assert_eq!(metrics["ave_running"], 5.0);
        assert!(!metrics.contains_key("total"));
        // 4 top-level + 6 per-worker + 8 summaries
        assert_eq!(metrics.len(), 18);
    }

    #[tokio::test]
    async fn test_clustered_poll_with_gc() {
        let transport = FakeTransport::new(Ok(CLUSTERED_STATS), Ok(RUBY22_GC));
        let poller = Poller::new(transport.clone(), true, Mode::Clustered);

        let metrics = poller.poll().await.unwrap();

        assert_eq!(transport.calls(), vec![StatsKind::Stats, StatsKind::GcStats]);
        assert_eq!(metrics.len(), 18 + 12);
        assert_eq!(metrics["total"], 5.0);
        assert_eq!(metrics["old_malloc_limit"], 16777216.0);
    }

    #[tokio::test]
    async fn test_single_poll() {
        let transport = FakeTransport::new(Ok(SINGLE_STATS), Ok(RUBY22_GC));
        let poller = Poller::new(transport, true, Mode::Single);

        let metrics = poller.poll().await.unwrap();

        assert_eq!(metrics["backlog"], 0.0);
        assert_eq!(metrics["running"], 5.0);
        assert_eq!(metrics["pool_capacity"], 3.0);
        assert!(metrics.keys().all(|key| !key.contains(".worker")));
        assert!(!metrics.contains_key("max_backlog"));
        assert_eq!(metrics.len(), 3 + 12);
    }

    #[tokio::test]
    async fn test_gc_failure_fails_whole_poll() {
        let transport = FakeTransport::new(Ok(CLUSTERED_STATS), Err("404 Not Found"));
        let poller = Poller::new(transport, true, Mode::Clustered);

        let err = poller.poll().await.unwrap_err();
        match err {
            PumaError::Remote { status, .. } => assert_eq!(status, "404 Not Found"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stats_failure_skips_gc() {
        let transport = FakeTransport::new(Err("403 Forbidden"), Ok(RUBY22_GC));
        let poller = Poller::new(transport.clone(), true, Mode::Clustered);

        assert!(poller.poll().await.is_err());
        assert_eq!(transport.calls(), vec![StatsKind::Stats]);
    }

    #[tokio::test]
    async fn test_malformed_gc_stats() {
        let transport = FakeTransport::new(Ok(CLUSTERED_STATS), Ok("{\"count\": 4,"));
        let poller = Poller::new(transport, true, Mode::Clustered);

        let err = poller.poll().await.unwrap_err();
        assert!(matches!(
            err,
            PumaError::Decode {
                kind: StatsKind::GcStats,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_clustered_without_workers() {
        let transport = FakeTransport::new(
            Ok(r#"{"workers": 0, "worker_status": []}"#),
            Ok(RUBY22_GC),
        );
        let poller = Poller::new(transport, false, Mode::Clustered);

        let err = poller.poll().await.unwrap_err();
        assert!(matches!(err, PumaError::NoWorkers));
    }

    #[test]
    fn test_poll_is_repeatable() {
        let transport = FakeTransport::new(Ok(CLUSTERED_STATS), Ok(RUBY22_GC));
        let poller = Poller::new(transport, true, Mode::Clustered);

        let first = tokio_test::block_on(poller.poll()).unwrap();
        let second = tokio_test::block_on(poller.poll()).unwrap();
        assert_eq!(first, second);
    }
}
