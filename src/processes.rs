//! Ranked, filtered process views built from the raw provider table.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::provider::{ProcessSample, UserTable};
use crate::snapshot::ProcessRecord;

/// Which slice of the process table gets delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessView {
    /// Top consumers above the resource floor (canonical).
    Top,
    /// Rotating window over the full sorted table, advancing one page per
    /// build (legacy variant kept behind config).
    Rotating,
}

pub struct ProcessSnapshotter {
    top_n: usize,
    cpu_floor: f32,
    memory_floor: f64,
    view: ProcessView,
    /// Cursor for the rotating view, persisted across builds.
    rotate_offset: AtomicUsize,
}

impl Default for ProcessSnapshotter {
    fn default() -> Self {
        Self::new(10, 0.1, 0.1, ProcessView::Top)
    }
}

impl ProcessSnapshotter {
    pub fn new(top_n: usize, cpu_floor: f32, memory_floor: f64, view: ProcessView) -> Self {
        Self {
            top_n,
            cpu_floor,
            memory_floor,
            view,
            rotate_offset: AtomicUsize::new(0),
        }
    }

    /// Build the delivered view from one raw table pass.
    ///
    /// Sorting is stable: rows with equal CPU and memory keep their original
    /// table order, so equally-loaded entries do not jitter between builds.
    pub fn build(
        &self,
        raw: Vec<ProcessSample>,
        users: &UserTable,
        total_memory: u64,
    ) -> Vec<ProcessRecord> {
        let mut records: Vec<ProcessRecord> = raw
            .into_iter()
            .map(|s| coerce(s, users, total_memory))
            .collect();

        match self.view {
            ProcessView::Top => {
                records
                    .retain(|r| r.cpu_percent > self.cpu_floor || r.memory_percent > self.memory_floor);
                sort_by_load(&mut records);
                records.truncate(self.top_n);
                records
            }
            ProcessView::Rotating => {
                sort_by_load(&mut records);
                if records.is_empty() {
                    return records;
                }
                let len = records.len();
                let offset = self.rotate_offset.load(Ordering::SeqCst) % len;
                let page: Vec<ProcessRecord> = records
                    .iter()
                    .cycle()
                    .skip(offset)
                    .take(self.top_n.min(len))
                    .cloned()
                    .collect();
                self.rotate_offset
                    .store((offset + self.top_n) % len, Ordering::SeqCst);
                page
            }
        }
    }
}

/// Descending CPU, ties broken by descending memory share.
fn sort_by_load(records: &mut [ProcessRecord]) {
    records.sort_by(|a, b| {
        b.cpu_percent
            .partial_cmp(&a.cpu_percent)
            .unwrap_or(CmpOrdering::Equal)
            .then_with(|| {
                b.memory_percent
                    .partial_cmp(&a.memory_percent)
                    .unwrap_or(CmpOrdering::Equal)
            })
    });
}

/// Turn one raw row into a record, coercing anything missing or NaN-like to
/// a safe default instead of failing the build.
fn coerce(sample: ProcessSample, users: &UserTable, total_memory: u64) -> ProcessRecord {
    let cpu_percent = if sample.cpu_percent.is_finite() {
        sample.cpu_percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let memory_percent = if total_memory > 0 {
        (sample.memory_bytes as f64 / total_memory as f64) * 100.0
    } else {
        0.0
    };
    let user = sample
        .uid
        .and_then(|uid| users.get(&uid).cloned())
        .unwrap_or_else(|| "system".to_string());

    ProcessRecord {
        pid: sample.pid,
        name: non_empty_or(sample.name, "unknown"),
        cpu_percent,
        memory_percent,
        memory_bytes: sample.memory_bytes,
        status: non_empty_or(sample.status, "unknown"),
        started_at: sample.start_time_secs,
        user,
        command: sample.command,
        exe_path: sample.exe_path,
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashMap;

    fn sample(pid: u32, cpu: f32, memory_bytes: u64) -> ProcessSample {
        ProcessSample {
            pid,
            name: format!("proc-{pid}"),
            cpu_percent: cpu,
            memory_bytes,
            ..Default::default()
        }
    }

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn filters_floor_and_sorts_descending_with_stable_ties() {
        let snap = ProcessSnapshotter::default();
        let raw = vec![
            sample(1, 10.0, 0),
            sample(2, 10.0, 0),
            sample(3, 30.0, 0),
            sample(4, 0.05, 0),
        ];
        let out = snap.build(raw, &AHashMap::new(), 8 * GIB);

        let pids: Vec<u32> = out.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![3, 1, 2]);
    }

    #[test]
    fn memory_share_breaks_cpu_ties() {
        let snap = ProcessSnapshotter::default();
        let raw = vec![sample(1, 10.0, GIB), sample(2, 10.0, 4 * GIB)];
        let out = snap.build(raw, &AHashMap::new(), 8 * GIB);

        assert_eq!(out[0].pid, 2);
        assert_eq!(out[1].pid, 1);
    }

    #[test]
    fn memory_hogs_survive_the_cpu_floor() {
        let snap = ProcessSnapshotter::default();
        // Negligible CPU but 12.5% of physical memory.
        let raw = vec![sample(1, 0.0, GIB)];
        let out = snap.build(raw, &AHashMap::new(), 8 * GIB);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn caps_at_top_n() {
        let snap = ProcessSnapshotter::new(3, 0.1, 0.1, ProcessView::Top);
        let raw = (1..=9).map(|i| sample(i, i as f32, 0)).collect();
        let out = snap.build(raw, &AHashMap::new(), 8 * GIB);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].pid, 9);
    }

    #[test]
    fn coerces_nan_and_out_of_range_cpu() {
        let snap = ProcessSnapshotter::default();
        let mut a = sample(1, f32::NAN, 2 * GIB);
        a.name = String::new();
        let b = sample(2, 250.0, 0);
        let out = snap.build(vec![a, b], &AHashMap::new(), 8 * GIB);

        let by_pid = |pid| out.iter().find(|r| r.pid == pid).unwrap();
        assert_eq!(by_pid(1).cpu_percent, 0.0);
        assert_eq!(by_pid(1).name, "unknown");
        assert_eq!(by_pid(2).cpu_percent, 100.0);
    }

    #[test]
    fn resolves_users_with_system_fallback() {
        let snap = ProcessSnapshotter::default();
        let mut users = AHashMap::new();
        users.insert(1000, "alice".to_string());

        let mut known = sample(1, 5.0, 0);
        known.uid = Some(1000);
        let mut unknown = sample(2, 5.0, 0);
        unknown.uid = Some(4321);
        let none = sample(3, 5.0, 0);

        let out = snap.build(vec![known, unknown, none], &users, 8 * GIB);
        assert_eq!(out[0].user, "alice");
        assert_eq!(out[1].user, "system");
        assert_eq!(out[2].user, "system");
    }

    #[test]
    fn rotating_view_pages_through_sorted_table_with_wraparound() {
        let snap = ProcessSnapshotter::new(2, 0.1, 0.1, ProcessView::Rotating);
        let users = AHashMap::new();
        // Sorted order by CPU desc: pids 5,4,3,2,1.
        let raw = || (1..=5).map(|i| sample(i, i as f32, 0)).collect::<Vec<_>>();

        let page1: Vec<u32> = snap.build(raw(), &users, GIB).iter().map(|r| r.pid).collect();
        let page2: Vec<u32> = snap.build(raw(), &users, GIB).iter().map(|r| r.pid).collect();
        let page3: Vec<u32> = snap.build(raw(), &users, GIB).iter().map(|r| r.pid).collect();

        assert_eq!(page1, vec![5, 4]);
        assert_eq!(page2, vec![3, 2]);
        // Offset wraps modulo the table length.
        assert_eq!(page3, vec![1, 5]);
    }
}
