//! Process memory readings from procfs and cgroups.

use std::path::Path;

use serde::Serialize;

const CGROUP_V2_LIMIT: &str = "/sys/fs/cgroup/memory.max";
const CGROUP_V1_LIMIT: &str = "/sys/fs/cgroup/memory/memory.limit_in_bytes";
const MEMINFO: &str = "/proc/meminfo";

/// cgroup v1 reports "no limit" as a value near `i64::MAX`.
const UNLIMITED_THRESHOLD: u64 = 1 << 60;

/// Resident memory relative to the effective limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryReading {
    pub used_bytes: u64,
    pub limit_bytes: u64,
    pub percent: f64,
}

impl MemoryReading {
    pub fn new(used_bytes: u64, limit_bytes: u64) -> Self {
        let percent = if limit_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / limit_bytes as f64 * 100.0
        };
        Self {
            used_bytes,
            limit_bytes,
            percent,
        }
    }
}

/// Read the current resident set size (RSS) of this process from `/proc/self/status`.
///
/// Returns the value in bytes. Only works on Linux; returns an error on other platforms.
pub fn read_rss_bytes() -> std::io::Result<u64> {
    let status = std::fs::read_to_string("/proc/self/status")?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            return parse_kb(rest)
                .map(|kb| kb * 1024)
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "bad VmRSS"));
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "VmRSS not found in /proc/self/status",
    ))
}

/// Effective memory limit: the cgroup limit when one is set, else total RAM.
pub fn read_memory_limit_bytes() -> Option<u64> {
    [CGROUP_V2_LIMIT, CGROUP_V1_LIMIT]
        .into_iter()
        .find_map(|path| read_to_string(path).and_then(|raw| parse_cgroup_limit(&raw)))
        .or_else(|| read_to_string(MEMINFO).and_then(|raw| parse_meminfo_total(&raw)))
}

/// Current reading, or `None` where the platform does not expose one.
pub fn read_memory() -> Option<MemoryReading> {
    let used = read_rss_bytes().ok()?;
    let limit = read_memory_limit_bytes()?;
    Some(MemoryReading::new(used, limit))
}

fn read_to_string(path: impl AsRef<Path>) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

fn parse_kb(value: &str) -> Option<u64> {
    value.trim().trim_end_matches("kB").trim().parse().ok()
}

/// Parse a cgroup limit file. `max` and sentinel values mean unlimited.
fn parse_cgroup_limit(raw: &str) -> Option<u64> {
    let value: u64 = raw.trim().parse().ok()?;
    (value > 0 && value < UNLIMITED_THRESHOLD).then_some(value)
}

fn parse_meminfo_total(raw: &str) -> Option<u64> {
    raw.lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))
        .and_then(parse_kb)
        .map(|kb| kb * 1024)
}
