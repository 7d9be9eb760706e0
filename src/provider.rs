//! Query interfaces to the OS-facing collaborators.
//!
//! The sampling engine never talks to the operating system directly: it goes
//! through `MetricProvider` for telemetry queries and `ProcessProbe` for
//! signal delivery. Production implementations live in `system.rs`; tests
//! substitute in-memory fakes.

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use thiserror::Error;

use crate::snapshot::{DiskUsage, SystemDescription};

/// Raw per-core CPU sample before snapshot assembly.
#[derive(Debug, Clone, Default)]
pub struct CpuSample {
    pub per_core: Vec<f32>,
    pub frequency_mhz: u64,
}

/// Raw memory counters in bytes.
#[derive(Debug, Clone, Default)]
pub struct MemorySample {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub swap_total: u64,
    pub swap_used: u64,
    pub swap_free: u64,
}

/// Boot time, uptime and load averages captured together.
#[derive(Debug, Clone, Default)]
pub struct HostSample {
    pub boot_time_secs: u64,
    pub uptime_secs: u64,
    pub load_avg: [f64; 3],
}

/// One row of the raw process table, before filtering and ranking.
#[derive(Debug, Clone, Default)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub status: String,
    pub start_time_secs: u64,
    pub uid: Option<u32>,
    pub command: String,
    pub exe_path: String,
}

/// uid -> account name mapping used to resolve process ownership.
pub type UserTable = HashMap<u32, String>;

/// Error from a provider query. Callers treat every variant the same way
/// (degrade or fall back to cached data); the message is for the log.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Telemetry query capability. Queries are independent and may be dispatched
/// concurrently; each has non-trivial, variable latency.
#[async_trait]
pub trait MetricProvider: Send + Sync {
    async fn cpu(&self) -> ProviderResult<CpuSample>;
    async fn memory(&self) -> ProviderResult<MemorySample>;
    async fn disks(&self) -> ProviderResult<Vec<DiskUsage>>;
    async fn host(&self) -> ProviderResult<HostSample>;
    /// Hottest sensor in °C, `None` when the host exposes no sensors.
    async fn temperature(&self) -> ProviderResult<Option<f32>>;
    async fn processes(&self) -> ProviderResult<Vec<ProcessSample>>;
    async fn users(&self) -> ProviderResult<UserTable>;
    async fn description(&self) -> ProviderResult<SystemDescription>;
}

/// Three-way liveness answer from a zero-effect signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Exists,
    NotFound,
    /// The pid exists but is owned by someone we may not signal. Counts as
    /// "exists" for existence checks.
    PermissionDenied,
}

/// Error from dispatching a real signal.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no such process")]
    NotFound,
    #[error("operation not permitted")]
    PermissionDenied,
    #[error("signal failed: {0}")]
    Signal(String),
}

/// Signal-delivery capability used by the termination state machine.
pub trait ProcessProbe: Send + Sync {
    fn liveness(&self, pid: u32) -> Liveness;
    /// Ask the process to exit (SIGTERM-equivalent).
    fn terminate(&self, pid: u32) -> Result<(), ProbeError>;
    /// Force the process down (SIGKILL-equivalent).
    fn kill(&self, pid: u32) -> Result<(), ProbeError>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory fakes shared by the engine tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Counting provider: records how many refresh cycles each query family
    /// sees and can inject latency or failure.
    #[derive(Default)]
    pub struct MockProvider {
        pub cpu_calls: AtomicUsize,
        pub process_calls: AtomicUsize,
        pub fail_cpu: std::sync::atomic::AtomicBool,
        pub fail_processes: std::sync::atomic::AtomicBool,
        pub query_delay: Mutex<Duration>,
        pub process_table: Mutex<Vec<ProcessSample>>,
        pub user_table: Mutex<UserTable>,
    }

    impl MockProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_processes(table: Vec<ProcessSample>) -> Self {
            let p = Self::default();
            *p.process_table.lock().unwrap() = table;
            p
        }

        async fn delay(&self) {
            let d = *self.query_delay.lock().unwrap();
            if !d.is_zero() {
                tokio::time::sleep(d).await;
            }
        }
    }

    #[async_trait]
    impl MetricProvider for MockProvider {
        async fn cpu(&self) -> ProviderResult<CpuSample> {
            self.cpu_calls.fetch_add(1, Ordering::SeqCst);
            self.delay().await;
            if self.fail_cpu.load(Ordering::SeqCst) {
                return Err(ProviderError("cpu query refused".into()));
            }
            Ok(CpuSample {
                per_core: vec![12.5, 50.0],
                frequency_mhz: 2400,
            })
        }

        async fn memory(&self) -> ProviderResult<MemorySample> {
            self.delay().await;
            Ok(MemorySample {
                total: 8 * 1024 * 1024 * 1024,
                used: 2 * 1024 * 1024 * 1024,
                free: 6 * 1024 * 1024 * 1024,
                swap_total: 1024,
                swap_used: 0,
                swap_free: 1024,
            })
        }

        async fn disks(&self) -> ProviderResult<Vec<DiskUsage>> {
            Ok(Vec::new())
        }

        async fn host(&self) -> ProviderResult<HostSample> {
            Ok(HostSample {
                boot_time_secs: 1_700_000_000,
                uptime_secs: 3600,
                load_avg: [0.5, 0.4, 0.3],
            })
        }

        async fn temperature(&self) -> ProviderResult<Option<f32>> {
            Ok(Some(41.0))
        }

        async fn processes(&self) -> ProviderResult<Vec<ProcessSample>> {
            self.process_calls.fetch_add(1, Ordering::SeqCst);
            self.delay().await;
            if self.fail_processes.load(Ordering::SeqCst) {
                return Err(ProviderError("process table refused".into()));
            }
            Ok(self.process_table.lock().unwrap().clone())
        }

        async fn users(&self) -> ProviderResult<UserTable> {
            Ok(self.user_table.lock().unwrap().clone())
        }

        async fn description(&self) -> ProviderResult<SystemDescription> {
            Ok(SystemDescription {
                hostname: "testhost".into(),
                os_name: "Linux".into(),
                cpu_cores: 2,
                ..Default::default()
            })
        }
    }

    /// Scripted probe: answers liveness from a queue and records every
    /// signal it is asked to send.
    #[derive(Default)]
    pub struct MockProbe {
        /// Answers consumed front-to-back; the last one repeats.
        pub liveness_script: Mutex<Vec<Liveness>>,
        pub terminated: Mutex<Vec<u32>>,
        pub killed: Mutex<Vec<u32>>,
        pub terminate_error: Mutex<Option<ProbeError>>,
    }

    impl MockProbe {
        pub fn scripted(script: Vec<Liveness>) -> Self {
            let p = Self::default();
            *p.liveness_script.lock().unwrap() = script;
            p
        }
    }

    impl ProcessProbe for MockProbe {
        fn liveness(&self, _pid: u32) -> Liveness {
            let mut script = self.liveness_script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script.first().copied().unwrap_or(Liveness::NotFound)
            }
        }

        fn terminate(&self, pid: u32) -> Result<(), ProbeError> {
            if let Some(err) = self.terminate_error.lock().unwrap().take() {
                return Err(err);
            }
            self.terminated.lock().unwrap().push(pid);
            Ok(())
        }

        fn kill(&self, pid: u32) -> Result<(), ProbeError> {
            self.killed.lock().unwrap().push(pid);
            Ok(())
        }
    }
}
