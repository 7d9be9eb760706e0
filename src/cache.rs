//! Time-windowed memoization of provider samples.
//!
//! Two independently-TTL'd slots (the full metrics snapshot and the ranked
//! process list) bound the provider call rate no matter how many sessions
//! are connected. Each slot's refresh is serialized behind its own async
//! mutex: concurrent readers that find the slot stale wait for the single
//! in-flight refresh and share its result instead of piling onto the
//! provider. Refreshes of the two slots are independent and may overlap.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::processes::ProcessSnapshotter;
use crate::provider::MetricProvider;
use crate::snapshot::{CpuUsage, MemoryUsage, MetricsSnapshot, ProcessRecord};

/// A cached value plus the instant it was captured. `captured_at == None`
/// marks the slot invalidated: the value is kept only as a stale fallback.
struct Slot<T> {
    value: Option<T>,
    captured_at: Option<Instant>,
}

impl<T> Slot<T> {
    fn empty() -> Self {
        Slot {
            value: None,
            captured_at: None,
        }
    }

    fn fresh(&self, ttl: Duration) -> bool {
        matches!((&self.value, self.captured_at), (Some(_), Some(at)) if at.elapsed() < ttl)
    }

    fn store(&mut self, value: T) {
        self.value = Some(value);
        self.captured_at = Some(Instant::now());
    }
}

pub struct SampleCache {
    provider: Arc<dyn MetricProvider>,
    snapshotter: ProcessSnapshotter,
    metrics_ttl: Duration,
    processes_ttl: Duration,
    metrics: Mutex<Slot<MetricsSnapshot>>,
    processes: Mutex<Slot<Vec<ProcessRecord>>>,
}

impl SampleCache {
    pub fn new(
        provider: Arc<dyn MetricProvider>,
        snapshotter: ProcessSnapshotter,
        metrics_ttl: Duration,
        processes_ttl: Duration,
    ) -> Self {
        Self {
            provider,
            snapshotter,
            metrics_ttl,
            processes_ttl,
            metrics: Mutex::new(Slot::empty()),
            processes: Mutex::new(Slot::empty()),
        }
    }

    /// Current metrics snapshot, recomputed only when stale or forced.
    ///
    /// Provider failure never escalates past this boundary: the stale value
    /// is served when one exists, otherwise a zeroed placeholder.
    pub async fn metrics(&self, force: bool) -> MetricsSnapshot {
        let mut slot = self.metrics.lock().await;
        if !force && slot.fresh(self.metrics_ttl) {
            return slot.value.clone().expect("fresh slot holds a value");
        }
        match self.refresh_metrics().await {
            Ok(snapshot) => {
                slot.store(snapshot.clone());
                snapshot
            }
            Err(reason) => {
                warn!("metrics refresh failed, serving cached snapshot: {reason}");
                slot.value
                    .clone()
                    .unwrap_or_else(MetricsSnapshot::unavailable)
            }
        }
    }

    /// Current ranked process view, recomputed only when stale or forced.
    pub async fn processes(&self, force: bool) -> Vec<ProcessRecord> {
        let mut slot = self.processes.lock().await;
        if !force && slot.fresh(self.processes_ttl) {
            return slot.value.clone().expect("fresh slot holds a value");
        }
        match self.refresh_processes().await {
            Ok(records) => {
                slot.store(records.clone());
                records
            }
            Err(reason) => {
                warn!("process refresh failed, serving cached list: {reason}");
                slot.value.clone().unwrap_or_default()
            }
        }
    }

    /// Drop the process slot's freshness so the next read recomputes. The
    /// old value stays behind as a stale fallback.
    pub async fn invalidate_processes(&self) {
        let mut slot = self.processes.lock().await;
        slot.captured_at = None;
        debug!("process cache invalidated");
    }

    /// Age of the cached metrics snapshot, for /health.
    pub async fn metrics_age(&self) -> Option<Duration> {
        self.metrics.lock().await.captured_at.map(|at| at.elapsed())
    }

    /// Age of the cached process list, for /health.
    pub async fn processes_age(&self) -> Option<Duration> {
        self.processes
            .lock()
            .await
            .captured_at
            .map(|at| at.elapsed())
    }

    /// One sampling pass: dispatch the independent sub-queries concurrently
    /// and join before assembly, so all fields come from roughly the same
    /// instant. CPU and memory are required; the rest degrade to defaults.
    async fn refresh_metrics(&self) -> Result<MetricsSnapshot, String> {
        let (cpu, memory, disks, host, temperature) = tokio::join!(
            self.provider.cpu(),
            self.provider.memory(),
            self.provider.disks(),
            self.provider.host(),
            self.provider.temperature(),
        );

        let cpu = cpu.map_err(|e| format!("cpu: {e}"))?;
        let memory = memory.map_err(|e| format!("memory: {e}"))?;
        let disks = disks.unwrap_or_else(|e| {
            debug!("disk query degraded: {e}");
            Vec::new()
        });
        let host = host.unwrap_or_else(|e| {
            debug!("host query degraded: {e}");
            Default::default()
        });
        let temperature = temperature.unwrap_or_else(|e| {
            debug!("temperature query degraded: {e}");
            None
        });

        let cores = cpu.per_core.len();
        let average = if cores > 0 {
            cpu.per_core.iter().sum::<f32>() / cores as f32
        } else {
            0.0
        };
        let mem_percentage = if memory.total > 0 {
            (memory.used as f64 / memory.total as f64) * 100.0
        } else {
            0.0
        };

        Ok(MetricsSnapshot {
            timestamp: chrono::Utc::now().timestamp_millis(),
            boot_time: host.boot_time_secs,
            memory: MemoryUsage {
                total: memory.total,
                used: memory.used,
                free: memory.free,
                percentage: mem_percentage,
                swap_total: memory.swap_total,
                swap_used: memory.swap_used,
                swap_free: memory.swap_free,
            },
            cpu: CpuUsage {
                cores,
                per_core: cpu.per_core,
                average,
                temperature,
                frequency_mhz: cpu.frequency_mhz,
            },
            load_average: host.load_avg,
            uptime_secs: host.uptime_secs,
            disks,
            processes: Vec::new(),
        })
    }

    async fn refresh_processes(&self) -> Result<Vec<ProcessRecord>, String> {
        let (table, users, memory) = tokio::join!(
            self.provider.processes(),
            self.provider.users(),
            self.provider.memory(),
        );

        let table = table.map_err(|e| format!("process table: {e}"))?;
        let users = users.unwrap_or_else(|e| {
            debug!("user table degraded: {e}");
            Default::default()
        });
        let total_memory = memory.map(|m| m.total).unwrap_or_else(|e| {
            debug!("memory totals degraded: {e}");
            0
        });

        Ok(self.snapshotter.build(table, &users, total_memory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use std::sync::atomic::Ordering;

    fn cache_with(provider: Arc<MockProvider>, metrics_ttl_ms: u64) -> SampleCache {
        SampleCache::new(
            provider,
            ProcessSnapshotter::default(),
            Duration::from_millis(metrics_ttl_ms),
            Duration::from_millis(30_000),
        )
    }

    #[tokio::test]
    async fn fresh_read_returns_cached_snapshot_without_recompute() {
        let provider = Arc::new(MockProvider::new());
        let cache = cache_with(provider.clone(), 1_000);

        let first = cache.metrics(false).await;
        let second = cache.metrics(false).await;

        assert_eq!(provider.cpu_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.timestamp, second.timestamp);
    }

    #[tokio::test]
    async fn stale_read_recomputes_with_strictly_newer_timestamp() {
        let provider = Arc::new(MockProvider::new());
        let cache = cache_with(provider.clone(), 10);

        let first = cache.metrics(false).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = cache.metrics(false).await;

        assert_eq!(provider.cpu_calls.load(Ordering::SeqCst), 2);
        assert!(second.timestamp > first.timestamp);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_stale_reads_trigger_one_refresh() {
        let provider = Arc::new(MockProvider::new());
        *provider.query_delay.lock().unwrap() = Duration::from_millis(50);
        let cache = Arc::new(cache_with(provider.clone(), 1_000));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.metrics(false).await }));
        }
        let mut timestamps = Vec::new();
        for h in handles {
            timestamps.push(h.await.unwrap().timestamp);
        }

        assert_eq!(provider.cpu_calls.load(Ordering::SeqCst), 1);
        // Every waiter received the coalesced result.
        assert!(timestamps.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn force_bypasses_freshness() {
        let provider = Arc::new(MockProvider::new());
        let cache = cache_with(provider.clone(), 60_000);

        cache.metrics(true).await;
        cache.metrics(true).await;

        assert_eq!(provider.cpu_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provider_failure_serves_stale_value() {
        let provider = Arc::new(MockProvider::new());
        let cache = cache_with(provider.clone(), 10);

        let first = cache.metrics(false).await;
        provider.fail_cpu.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = cache.metrics(false).await;

        assert_eq!(first.timestamp, second.timestamp);
        assert_eq!(second.cpu.cores, 2);
    }

    #[tokio::test]
    async fn provider_failure_without_cache_yields_placeholder() {
        let provider = Arc::new(MockProvider::new());
        provider.fail_cpu.store(true, Ordering::SeqCst);
        let cache = cache_with(provider.clone(), 1_000);

        let snapshot = cache.metrics(false).await;
        assert_eq!(snapshot.cpu.cores, 0);
        assert_eq!(snapshot.memory.total, 0);
    }

    #[tokio::test]
    async fn invalidation_forces_next_process_read_to_recompute() {
        let provider = Arc::new(MockProvider::new());
        let cache = cache_with(provider.clone(), 1_000);

        cache.processes(false).await;
        cache.processes(false).await;
        assert_eq!(provider.process_calls.load(Ordering::SeqCst), 1);

        cache.invalidate_processes().await;
        cache.processes(false).await;
        assert_eq!(provider.process_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn process_failure_serves_stale_list_after_invalidation() {
        let provider = Arc::new(MockProvider::with_processes(vec![
            crate::provider::ProcessSample {
                pid: 7,
                name: "worker".into(),
                cpu_percent: 12.0,
                memory_bytes: 1024,
                ..Default::default()
            },
        ]));
        let cache = cache_with(provider.clone(), 1_000);

        let first = cache.processes(false).await;
        assert_eq!(first.len(), 1);

        provider.fail_processes.store(true, Ordering::SeqCst);
        cache.invalidate_processes().await;
        let second = cache.processes(false).await;

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].pid, 7);
    }
}
