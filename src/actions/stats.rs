//! Execution statistics.
//!
//! Captures process CPU time (user + system, via `getrusage`) and wall
//! time around one action run. Stats are best-effort: a failing
//! `getrusage` reports zero CPU rather than failing the action.

use std::mem::MaybeUninit;
use std::time::Instant;

use serde::Serialize;

/// CPU and wall time consumed by one action execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StatsResult {
    /// Process CPU time consumed, in nanoseconds.
    #[serde(rename = "cpuTimeNs")]
    pub cpu_time_ns: u64,
    /// Wall clock time elapsed, in milliseconds.
    #[serde(rename = "wallTimeMs")]
    pub wall_time_ms: u64,
}

/// Collects stats between `start` and `stop`.
#[derive(Debug)]
pub struct StatsCollector {
    started_at: Instant,
    initial_cpu_ns: u64,
}

impl StatsCollector {
    /// Starts a collection.
    #[must_use]
    pub fn start() -> Self {
        Self {
            initial_cpu_ns: process_cpu_ns(),
            started_at: Instant::now(),
        }
    }

    /// Stops the collection and returns the consumed times.
    #[must_use]
    pub fn stop(self) -> StatsResult {
        StatsResult {
            cpu_time_ns: process_cpu_ns().saturating_sub(self.initial_cpu_ns),
            wall_time_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }
}

/// Process CPU time (user + system) in nanoseconds, zero on failure.
fn process_cpu_ns() -> u64 {
    let mut usage = MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: usage points to writable memory of the right layout.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return 0;
    }
    // SAFETY: getrusage initialized the struct on success.
    let usage = unsafe { usage.assume_init() };
    timeval_ns(usage.ru_utime) + timeval_ns(usage.ru_stime)
}

fn timeval_ns(tv: libc::timeval) -> u64 {
    (tv.tv_sec.max(0) as u64) * 1_000_000_000 + (tv.tv_usec.max(0) as u64) * 1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_reports_monotonic_times() {
        let collector = StatsCollector::start();
        // burn a little CPU so the counters move
        let mut acc = 0u64;
        for i in 0..200_000u64 {
            acc = acc.wrapping_add(i * i);
        }
        std::hint::black_box(acc);

        let stats = collector.stop();
        assert!(stats.cpu_time_ns > 0);
    }

    #[test]
    fn json_field_names_are_stable() {
        let stats = StatsResult {
            cpu_time_ns: 42,
            wall_time_ms: 7,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert_eq!(json, r#"{"cpuTimeNs":42,"wallTimeMs":7}"#);
    }
}
