//! Production OS-facing collaborators.
//!
//! `SysinfoProvider` answers telemetry queries through the `sysinfo` crate;
//! `OsProbe` delivers signals through `nix`. Both sit behind the traits in
//! `provider.rs` so the engine never depends on the concrete mechanism.

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use sysinfo::{
    Components, CpuRefreshKind, Disks, MemoryRefreshKind, ProcessRefreshKind, RefreshKind, System,
    UpdateKind, Users,
};
use tokio::sync::Mutex;

use crate::provider::{
    CpuSample, HostSample, Liveness, MemorySample, MetricProvider, ProbeError, ProcessProbe,
    ProcessSample, ProviderError, ProviderResult, UserTable,
};
use crate::snapshot::{DiskUsage, SystemDescription};

/// Telemetry provider backed by `sysinfo`.
///
/// A single `System` instance is reused across refreshes so CPU usage can be
/// derived as a delta between consecutive samples. The first CPU sample after
/// startup therefore reads as zero; the cache warm-up in `main` primes it
/// before any client connects.
pub struct SysinfoProvider {
    sys: Mutex<System>,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::new().with_cpu_usage().with_frequency())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            sys: Mutex::new(sys),
        }
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentage of a disk in use, from total and available space.
fn disk_percentage(total: u64, available: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let used = total.saturating_sub(available);
    (used as f64 / total as f64) * 100.0
}

#[async_trait]
impl MetricProvider for SysinfoProvider {
    async fn cpu(&self) -> ProviderResult<CpuSample> {
        let mut sys = self.sys.lock().await;
        sys.refresh_cpu_specifics(CpuRefreshKind::new().with_cpu_usage().with_frequency());
        let per_core: Vec<f32> = sys.cpus().iter().map(|c| c.cpu_usage()).collect();
        if per_core.is_empty() {
            return Err(ProviderError("no cpus reported".into()));
        }
        let frequency_mhz = sys.cpus().first().map(|c| c.frequency()).unwrap_or(0);
        Ok(CpuSample {
            per_core,
            frequency_mhz,
        })
    }

    async fn memory(&self) -> ProviderResult<MemorySample> {
        let mut sys = self.sys.lock().await;
        sys.refresh_memory();
        if sys.total_memory() == 0 {
            return Err(ProviderError("no memory reported".into()));
        }
        Ok(MemorySample {
            total: sys.total_memory(),
            used: sys.used_memory(),
            free: sys.free_memory(),
            swap_total: sys.total_swap(),
            swap_used: sys.used_swap(),
            swap_free: sys.free_swap(),
        })
    }

    async fn disks(&self) -> ProviderResult<Vec<DiskUsage>> {
        let disks = Disks::new_with_refreshed_list();
        Ok(disks
            .iter()
            .map(|d| {
                let total = d.total_space();
                let available = d.available_space();
                DiskUsage {
                    device: d.name().to_string_lossy().to_string(),
                    fs_type: d.file_system().to_string_lossy().to_string(),
                    total,
                    used: total.saturating_sub(available),
                    free: available,
                    percentage: disk_percentage(total, available),
                    mount_point: d.mount_point().to_string_lossy().to_string(),
                }
            })
            .collect())
    }

    async fn host(&self) -> ProviderResult<HostSample> {
        let load = System::load_average();
        Ok(HostSample {
            boot_time_secs: System::boot_time(),
            uptime_secs: System::uptime(),
            load_avg: [load.one, load.five, load.fifteen],
        })
    }

    async fn temperature(&self) -> ProviderResult<Option<f32>> {
        let components = Components::new_with_refreshed_list();
        Ok(components
            .iter()
            .map(|c| c.temperature())
            .filter(|t| t.is_finite())
            .fold(None, |acc: Option<f32>, t| Some(acc.map_or(t, |a| a.max(t)))))
    }

    async fn processes(&self) -> ProviderResult<Vec<ProcessSample>> {
        let mut sys = self.sys.lock().await;
        sys.refresh_specifics(
            RefreshKind::new().with_processes(
                ProcessRefreshKind::new()
                    .with_cpu()
                    .with_memory()
                    .with_user(UpdateKind::OnlyIfNotSet)
                    .with_cmd(UpdateKind::OnlyIfNotSet)
                    .with_exe(UpdateKind::OnlyIfNotSet),
            ),
        );

        // sysinfo reports process CPU against a single core; normalize so
        // 100% means "all cores busy".
        let core_count = sys.cpus().len().max(1) as f32;

        Ok(sys
            .processes()
            .values()
            .filter(|p| p.thread_kind().is_none())
            .map(|p| ProcessSample {
                pid: p.pid().as_u32(),
                name: p.name().to_string_lossy().to_string(),
                cpu_percent: p.cpu_usage() / core_count,
                memory_bytes: p.memory(),
                status: p.status().to_string(),
                start_time_secs: p.start_time(),
                uid: p.user_id().map(|u| **u),
                command: p
                    .cmd()
                    .iter()
                    .map(|s| s.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" "),
                exe_path: p
                    .exe()
                    .map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn users(&self) -> ProviderResult<UserTable> {
        let users = Users::new_with_refreshed_list();
        Ok(users
            .iter()
            .map(|u| (**u.id(), u.name().to_string()))
            .collect())
    }

    async fn description(&self) -> ProviderResult<SystemDescription> {
        let sys = self.sys.lock().await;
        Ok(SystemDescription {
            hostname: System::host_name().unwrap_or_else(|| "unknown".into()),
            os_name: System::name().unwrap_or_else(|| "unknown".into()),
            os_version: System::os_version().unwrap_or_else(|| "unknown".into()),
            kernel_version: System::kernel_version().unwrap_or_else(|| "unknown".into()),
            arch: System::cpu_arch().unwrap_or_else(|| "unknown".into()),
            cpu_brand: sys
                .cpus()
                .first()
                .map(|c| c.brand().to_string())
                .unwrap_or_default(),
            cpu_cores: sys.cpus().len(),
            total_memory: sys.total_memory(),
        })
    }
}

/// Signal delivery through `nix`. Liveness uses the zero-effect signal:
/// EPERM means the pid exists under another owner; only ESRCH means absent.
pub struct OsProbe;

fn map_errno(e: Errno) -> ProbeError {
    match e {
        Errno::ESRCH => ProbeError::NotFound,
        Errno::EPERM => ProbeError::PermissionDenied,
        other => ProbeError::Signal(other.desc().to_string()),
    }
}

impl ProcessProbe for OsProbe {
    fn liveness(&self, pid: u32) -> Liveness {
        match signal::kill(Pid::from_raw(pid as i32), None) {
            Ok(()) => Liveness::Exists,
            Err(Errno::EPERM) => Liveness::PermissionDenied,
            Err(_) => Liveness::NotFound,
        }
    }

    fn terminate(&self, pid: u32) -> Result<(), ProbeError> {
        signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(map_errno)
    }

    fn kill(&self, pid: u32) -> Result<(), ProbeError> {
        signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL).map_err(map_errno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_percentage_handles_empty_disk() {
        assert_eq!(disk_percentage(0, 0), 0.0);
    }

    #[test]
    fn disk_percentage_is_used_fraction() {
        let pct = disk_percentage(1000, 250);
        assert!((pct - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn probe_reports_own_pid_alive() {
        let probe = OsProbe;
        assert_eq!(probe.liveness(std::process::id()), Liveness::Exists);
    }

    #[test]
    fn probe_reports_bogus_pid_absent() {
        // Linux pid space is bounded well below this.
        let probe = OsProbe;
        assert_eq!(probe.liveness(3_999_999), Liveness::NotFound);
    }
}
