pub mod system;
pub mod thermal;

use crate::snapshot::MetricsSnapshot;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thermal::{FanSpeedSource, TemperatureSource};
use tracing::debug;

pub const DEFAULT_CPU_WINDOW: Duration = Duration::from_secs(1);

/// Raw OS counters in bytes, before unit conversion.
#[derive(Debug, Clone, Default)]
pub struct HostCounters {
    pub cpu_per_core: Vec<f64>,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    pub memory_available_bytes: u64,
    pub disk_total_bytes: u64,
    /// Free blocks, including those reserved for root.
    pub disk_free_bytes: u64,
    /// Free blocks an unprivileged user may allocate.
    pub disk_available_bytes: u64,
    pub disk_read_bytes_total: u64,
    pub disk_write_bytes_total: u64,
    pub net_sent_bytes_total: u64,
    pub net_recv_bytes_total: u64,
    pub uptime_seconds: u64,
}

/// A sub-query that fell back to zero values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectSource {
    Cpu,
    Memory,
    Disk,
    DiskIo,
    Temperature,
    FanSpeed,
}

impl CollectSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CollectSource::Cpu => "cpu",
            CollectSource::Memory => "memory",
            CollectSource::Disk => "disk",
            CollectSource::DiskIo => "disk_io",
            CollectSource::Temperature => "temperature",
            CollectSource::FanSpeed => "fan_speed",
        }
    }
}

impl fmt::Display for CollectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Takes a fresh snapshot per call. Holds only read-only sources, so it can
/// be shared across request handlers without locking.
#[derive(Clone)]
pub struct Sampler {
    temperature: Arc<dyn TemperatureSource>,
    fan: Arc<dyn FanSpeedSource>,
    cpu_window: Duration,
}

impl Sampler {
    pub fn new(temperature: Arc<dyn TemperatureSource>, fan: Arc<dyn FanSpeedSource>) -> Self {
        Self {
            temperature,
            fan,
            cpu_window: DEFAULT_CPU_WINDOW,
        }
    }

    #[cfg(test)]
    pub fn with_cpu_window(mut self, cpu_window: Duration) -> Self {
        self.cpu_window = cpu_window;
        self
    }

    /// Snapshot only, for callers that do not count degraded sources.
    #[cfg(test)]
    pub fn sample(&self) -> MetricsSnapshot {
        self.sample_with_report().0
    }

    /// Blocks for the CPU window. Never fails; broken sources read as zero
    /// and are listed next to the snapshot.
    pub fn sample_with_report(&self) -> (MetricsSnapshot, Vec<CollectSource>) {
        let (counters, mut degraded) = system::collect_host(self.cpu_window);

        let temperature = match thermal::read_temperature(self.temperature.as_ref()) {
            Ok(celsius) => celsius,
            Err(err) => {
                debug!(error = %err, "temperature unavailable");
                degraded.push(CollectSource::Temperature);
                0.0
            }
        };

        let fan_speed = thermal::read_fan_speed(self.fan.as_ref()).unwrap_or_else(|| {
            degraded.push(CollectSource::FanSpeed);
            0
        });

        let snapshot =
            MetricsSnapshot::from_counters(counters, temperature, fan_speed, now_unix());
        (snapshot, degraded)
    }
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
