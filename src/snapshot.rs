use crate::collectors::HostCounters;
use serde::Serialize;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * 1024 * 1024;

/// One sampling pass, as served by `GET /metrics`.
///
/// The disk and network `*_bytes` fields are cumulative totals since boot,
/// not rates. To get throughput, difference two snapshots and divide by the
/// gap between their timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub cpu_percent: Vec<f64>,
    pub cpu_overall: f64,
    /// MiB
    pub memory_total: u64,
    pub memory_used: u64,
    pub memory_available: u64,
    pub memory_percent: f64,
    /// GiB, root filesystem only
    pub disk_total: u64,
    pub disk_used: u64,
    pub disk_free: u64,
    pub disk_percent: f64,
    /// KiB read across all block devices since boot.
    pub disk_read_bytes: u64,
    /// KiB written across all block devices since boot.
    pub disk_write_bytes: u64,
    /// KiB sent across all interfaces since boot.
    pub net_sent_bytes: u64,
    /// KiB received across all interfaces since boot.
    pub net_recv_bytes: u64,
    /// Celsius
    pub temperature: f64,
    /// RPM
    pub fan_speed: u32,
    pub uptime: u64,
    pub timestamp: i64,
}

impl MetricsSnapshot {
    pub fn from_counters(
        counters: HostCounters,
        temperature: f64,
        fan_speed: u32,
        timestamp: i64,
    ) -> Self {
        let cpu_percent: Vec<f64> = counters
            .cpu_per_core
            .into_iter()
            .map(non_negative)
            .collect();
        let cpu_overall = if cpu_percent.is_empty() {
            0.0
        } else {
            cpu_percent.iter().sum::<f64>() / cpu_percent.len() as f64
        };

        // Same arithmetic as df: reserved blocks count neither as used nor
        // as available.
        let disk_used_bytes = counters
            .disk_total_bytes
            .saturating_sub(counters.disk_free_bytes);
        let disk_usable_bytes = disk_used_bytes.saturating_add(counters.disk_available_bytes);

        Self {
            cpu_percent,
            cpu_overall,
            memory_total: counters.memory_total_bytes / MIB,
            memory_used: counters.memory_used_bytes / MIB,
            memory_available: counters.memory_available_bytes / MIB,
            memory_percent: percent(counters.memory_used_bytes, counters.memory_total_bytes),
            disk_total: counters.disk_total_bytes / GIB,
            disk_used: disk_used_bytes / GIB,
            disk_free: counters.disk_available_bytes / GIB,
            disk_percent: percent(disk_used_bytes, disk_usable_bytes),
            disk_read_bytes: counters.disk_read_bytes_total / KIB,
            disk_write_bytes: counters.disk_write_bytes_total / KIB,
            net_sent_bytes: counters.net_sent_bytes_total / KIB,
            net_recv_bytes: counters.net_recv_bytes_total / KIB,
            temperature: non_negative(temperature),
            fan_speed,
            uptime: counters.uptime_seconds,
            timestamp: timestamp.max(0),
        }
    }

    /// All-zero snapshot stamped with `timestamp`.
    pub fn empty_at(timestamp: i64) -> Self {
        Self {
            timestamp: timestamp.max(0),
            ..Self::default()
        }
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}
