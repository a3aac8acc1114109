use crate::collectors::{CollectSource, HostCounters};
#[cfg(target_os = "linux")]
use std::fs;
use std::path::Path;
use std::time::Duration;
use sysinfo::{CpuExt, DiskExt, NetworkExt, NetworksExt, System, SystemExt};
use tracing::debug;

const SECTOR_BYTES: u64 = 512;

/// Reads OS counters, blocking for `cpu_window` to measure per-core usage.
///
/// Every call owns its own `System`, so nothing carries over between samples.
pub fn collect_host(cpu_window: Duration) -> (HostCounters, Vec<CollectSource>) {
    let mut degraded = Vec::new();
    let mut system = System::new();

    system.refresh_cpu();
    std::thread::sleep(cpu_window);
    system.refresh_cpu();
    let cpu_per_core: Vec<f64> = system
        .cpus()
        .iter()
        .map(|c| c.cpu_usage() as f64)
        .collect();
    if cpu_per_core.is_empty() {
        degraded.push(CollectSource::Cpu);
    }

    system.refresh_memory();
    let memory_total_bytes = system.total_memory();
    if memory_total_bytes == 0 {
        degraded.push(CollectSource::Memory);
    }

    let root = read_root_space().or_else(|| {
        system.refresh_disks_list();
        system.refresh_disks();
        system
            .disks()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .map(|d| RootSpace {
                total: d.total_space(),
                free: d.available_space(),
                available: d.available_space(),
            })
    });
    let root = root.unwrap_or_else(|| {
        degraded.push(CollectSource::Disk);
        RootSpace::default()
    });

    let (disk_read_bytes_total, disk_write_bytes_total) = match read_disk_io() {
        Some(totals) => totals,
        None => {
            degraded.push(CollectSource::DiskIo);
            (0, 0)
        }
    };

    system.refresh_networks_list();
    system.refresh_networks();
    let (net_recv_bytes_total, net_sent_bytes_total) = system
        .networks()
        .iter()
        .fold((0_u64, 0_u64), |(rx, tx), (_, data)| {
            (
                rx.saturating_add(data.total_received()),
                tx.saturating_add(data.total_transmitted()),
            )
        });

    let counters = HostCounters {
        cpu_per_core,
        memory_total_bytes,
        memory_used_bytes: system.used_memory(),
        memory_available_bytes: system.available_memory(),
        disk_total_bytes: root.total,
        disk_free_bytes: root.free,
        disk_available_bytes: root.available,
        disk_read_bytes_total,
        disk_write_bytes_total,
        net_sent_bytes_total,
        net_recv_bytes_total,
        uptime_seconds: system.uptime(),
    };
    (counters, degraded)
}

#[derive(Debug, Default, Clone, Copy)]
struct RootSpace {
    total: u64,
    free: u64,
    available: u64,
}

/// statvfs of `/`, sized in fragments the way `df` reports it.
#[cfg(unix)]
fn read_root_space() -> Option<RootSpace> {
    match nix::sys::statvfs::statvfs("/") {
        Ok(st) => {
            let frsize = st.fragment_size() as u64;
            Some(RootSpace {
                total: (st.blocks() as u64).saturating_mul(frsize),
                free: (st.blocks_free() as u64).saturating_mul(frsize),
                available: (st.blocks_available() as u64).saturating_mul(frsize),
            })
        }
        Err(err) => {
            debug!(error = %err, "statvfs of / failed");
            None
        }
    }
}

#[cfg(not(unix))]
fn read_root_space() -> Option<RootSpace> {
    None
}

#[cfg(target_os = "linux")]
fn read_disk_io() -> Option<(u64, u64)> {
    match fs::read_to_string("/proc/diskstats") {
        Ok(raw) => Some(parse_diskstats(&raw)),
        Err(err) => {
            debug!(error = %err, "failed to read /proc/diskstats");
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn read_disk_io() -> Option<(u64, u64)> {
    debug!("disk io counters are only read on linux");
    None
}

/// Sums read and written bytes over every device line of `/proc/diskstats`.
pub fn parse_diskstats(raw: &str) -> (u64, u64) {
    let mut read = 0_u64;
    let mut written = 0_u64;
    for line in raw.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 {
            continue;
        }
        let (Ok(sectors_read), Ok(sectors_written)) =
            (parts[5].parse::<u64>(), parts[9].parse::<u64>())
        else {
            continue;
        };
        read = read.saturating_add(sectors_read.saturating_mul(SECTOR_BYTES));
        written = written.saturating_add(sectors_written.saturating_mul(SECTOR_BYTES));
    }
    (read, written)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISKSTATS: &str = "\
 179       0 mmcblk0 5010 1200 400000 3000 900 800 20000 5000 0 6000 8000 0 0 0 0
 179       1 mmcblk0p1 120 0 2048 50 2 0 8 1 0 40 51 0 0 0 0
   8       0 sda 10 0 16 1 4 0 8 1 0 2 2
   7       0 loop0 0 0 0 0
";

    #[test]
    fn diskstats_sums_sectors_as_bytes() {
        let (read, written) = parse_diskstats(DISKSTATS);
        assert_eq!(read, (400_000 + 2048 + 16) * 512);
        assert_eq!(written, (20_000 + 8 + 8) * 512);
    }

    #[test]
    fn diskstats_skips_short_and_garbled_lines() {
        let raw = "8 0 sda x 0 bad 0 0 0 0 0 0 0 0\n1 2 3\n";
        assert_eq!(parse_diskstats(raw), (0, 0));
        assert_eq!(parse_diskstats(""), (0, 0));
    }

    #[test]
    fn host_counters_are_consistent() {
        let (counters, _) = collect_host(Duration::from_millis(100));
        assert!(counters
            .cpu_per_core
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0));
        assert!(counters.memory_used_bytes <= counters.memory_total_bytes);
        assert!(counters.disk_available_bytes <= counters.disk_free_bytes);
        assert!(counters.disk_free_bytes <= counters.disk_total_bytes);
    }
}
