//! Process resource gauges
//!
//! Read from `/proc/self` on Linux. Other platforms report nothing.

use crate::events::ServiceEvent;

/// Clock ticks per second used by `/proc/self/stat` (USER_HZ)
const CLOCK_TICKS_PER_SECOND: f64 = 100.0;

/// One sample of process resource usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessSnapshot {
    pub resident_memory_bytes: Option<u64>,
    pub cpu_seconds: Option<f64>,
}

impl ProcessSnapshot {
    /// Sample the current process
    #[cfg(target_os = "linux")]
    pub fn capture() -> Self {
        let resident_memory_bytes = std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| parse_vm_rss(&status));
        let cpu_seconds = std::fs::read_to_string("/proc/self/stat")
            .ok()
            .and_then(|stat| parse_cpu_ticks(&stat))
            .map(|ticks| ticks as f64 / CLOCK_TICKS_PER_SECOND);

        Self {
            resident_memory_bytes,
            cpu_seconds,
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn capture() -> Self {
        Self::default()
    }

    /// Publish the sample as gauges
    pub fn record(&self) {
        ServiceEvent::Process {
            resident_memory_bytes: self.resident_memory_bytes,
            cpu_seconds: self.cpu_seconds,
        }
        .record();
    }
}

/// `VmRSS:   1234 kB` from `/proc/self/status`, in bytes
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}

/// utime + stime from `/proc/self/stat`, in clock ticks
///
/// The command name may contain spaces and parentheses, so fields are
/// counted from the last `)`.
fn parse_cpu_ticks(stat: &str) -> Option<u64> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    // Fields after the name start at `state` (field 3); utime is field 14.
    let utime: u64 = fields.nth(11)?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(utime + stime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tsentiscope\nVmPeak:\t  9000 kB\nVmRSS:\t  2048 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss(status), Some(2048 * 1024));
        assert_eq!(parse_vm_rss("Name:\tx\n"), None);
    }

    #[test]
    fn test_parse_cpu_ticks_with_odd_name() {
        let stat = "4242 (sentiscope (x) y) S 1 4242 4242 0 -1 4194560 900 0 0 0 150 25 0 0 20 0 4 0";
        assert_eq!(parse_cpu_ticks(stat), Some(175));
        assert_eq!(parse_cpu_ticks("garbage"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_capture_reads_proc() {
        let snapshot = ProcessSnapshot::capture();
        assert!(snapshot.resident_memory_bytes.unwrap_or(0) > 0);
        assert!(snapshot.cpu_seconds.is_some());
    }
}
