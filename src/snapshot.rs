//! Value and wire types pushed to connected clients.
//! Keep this module minimal and stable; it defines the wire format.

use serde::{Deserialize, Serialize};

/// Memory usage breakdown in bytes, plus used percentage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percentage: f64,
    pub swap_total: u64,
    pub swap_used: u64,
    pub swap_free: u64,
}

/// CPU load at sampling time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuUsage {
    pub cores: usize,
    /// Per-core load in percent, one entry per logical core.
    pub per_core: Vec<f32>,
    pub average: f32,
    /// Hottest sensor reading in °C, when the host exposes one.
    pub temperature: Option<f32>,
    pub frequency_mhz: u64,
}

/// Usage of one mounted filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskUsage {
    pub device: String,
    pub fs_type: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percentage: f64,
    pub mount_point: String,
}

/// One row of the ranked process view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    /// Clamped to [0, 100].
    pub cpu_percent: f32,
    pub memory_percent: f64,
    pub memory_bytes: u64,
    pub status: String,
    /// Seconds since the epoch at which the process started.
    pub started_at: u64,
    pub user: String,
    pub command: String,
    pub exe_path: String,
}

/// One full sampling pass over the host. Never mutated after assembly; a new
/// pass produces a new snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Milliseconds since the epoch at assembly time.
    pub timestamp: i64,
    /// Seconds since the epoch at which the host booted.
    pub boot_time: u64,
    pub memory: MemoryUsage,
    pub cpu: CpuUsage,
    pub load_average: [f64; 3],
    pub uptime_secs: u64,
    pub disks: Vec<DiskUsage>,
    /// Placeholder in the periodic stream; process data travels separately.
    pub processes: Vec<ProcessRecord>,
}

impl MetricsSnapshot {
    /// Zeroed snapshot served when the provider fails before any sample
    /// has been cached.
    pub fn unavailable() -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            ..Default::default()
        }
    }
}

/// Static-ish hardware/OS facts, sent once per session at connect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemDescription {
    pub hostname: String,
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
    pub arch: String,
    pub cpu_brand: String,
    pub cpu_cores: usize,
    pub total_memory: u64,
}

/// Server-to-client push messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum PushMessage {
    SystemInfo(SystemDescription),
    Metrics(MetricsSnapshot),
    ProcessData(Vec<ProcessRecord>),
    ProcessKilled { pid: u32 },
}

/// Client-to-server requests carried on the push channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientRequest {
    RequestProcesses,
}
