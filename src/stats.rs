use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ::time::{format_description::well_known, OffsetDateTime};

/// Process-wide attempt counters shared by every worker. Only ever incremented.
#[derive(Debug)]
pub struct RunStats {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    started: Instant,
    started_at: String,
}

/// Point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub elapsed: Duration,
}

impl StatsSnapshot {
    /// Attempts per second; zero until a tenth of a second has passed.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.1 {
            self.attempts as f64 / secs
        } else {
            0.0
        }
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            started: Instant::now(),
            started_at: now_rfc3339(),
        }
    }

    pub fn record(&self, success: bool) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }

    /// Wall-clock start of the run, RFC 3339.
    pub fn started_at(&self) -> &str {
        &self.started_at
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints a single status line at most once per second, whoever calls it.
#[derive(Debug)]
pub struct ProgressReporter {
    enabled: bool,
    last_second: AtomicU64,
    reports: AtomicU64,
}

impl ProgressReporter {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            last_second: AtomicU64::new(0),
            reports: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Status lines printed so far.
    pub fn reports(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }

    /// Claim the report slot for the second `snap` falls in.
    ///
    /// Exactly one caller wins per elapsed second; the first second and any second at or
    /// before the last reported one never win.
    pub fn should_report(&self, snap: &StatsSnapshot) -> bool {
        if !self.enabled {
            return false;
        }
        let second = snap.elapsed.as_secs();
        let mut last = self.last_second.load(Ordering::Relaxed);
        while second > last {
            match self.last_second.compare_exchange_weak(
                last,
                second,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(current) => last = current,
            }
        }
        false
    }

    /// Returns whether a line was printed.
    pub fn maybe_report(&self, stats: &RunStats) -> bool {
        let snap = stats.snapshot();
        if !self.should_report(&snap) {
            return false;
        }
        let mut err = io::stderr().lock();
        let _ = write!(err, "\r{}", status_line(&snap));
        let _ = err.flush();
        self.reports.fetch_add(1, Ordering::Relaxed);
        true
    }
}

pub fn status_line(snap: &StatsSnapshot) -> String {
    format!(
        "[*] Attempts: {} | Success: {} | Failed: {} | Rate: {:.0}/s | Elapsed: {:.0}s",
        snap.attempts,
        snap.successes,
        snap.failures,
        snap.rate(),
        snap.elapsed.as_secs_f64()
    )
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_splits_success_and_failure() {
        let stats = RunStats::new();
        stats.record(true);
        stats.record(false);
        stats.record(false);
        let snap = stats.snapshot();
        assert_eq!(snap.attempts, 3);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 2);
    }

    #[test]
    fn rate_uses_elapsed_seconds() {
        let snap = StatsSnapshot {
            attempts: 500,
            successes: 0,
            failures: 500,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(snap.rate(), 250.0);
        let early = StatsSnapshot {
            elapsed: Duration::from_millis(5),
            ..snap
        };
        assert_eq!(early.rate(), 0.0);
    }

    #[test]
    fn reporter_is_rate_limited() {
        let stats = RunStats::new();
        let reporter = ProgressReporter::new(true);
        // Nothing during the first second of the run.
        assert!(!reporter.maybe_report(&stats));
        let disabled = ProgressReporter::new(false);
        assert!(!disabled.maybe_report(&stats));
        assert_eq!(reporter.reports(), 0);
    }

    fn at_secs(secs: f64) -> StatsSnapshot {
        StatsSnapshot {
            attempts: 10,
            successes: 1,
            failures: 9,
            elapsed: Duration::from_secs_f64(secs),
        }
    }

    #[test]
    fn one_report_per_elapsed_second() {
        let reporter = ProgressReporter::new(true);
        assert!(reporter.should_report(&at_secs(2.1)));
        assert!(!reporter.should_report(&at_secs(2.7)));
        assert!(reporter.should_report(&at_secs(3.0)));
        assert!(!reporter.should_report(&at_secs(1.5)));
        assert!(!reporter.should_report(&at_secs(3.9)));
    }

    #[test]
    fn concurrent_callers_share_one_slot() {
        let reporter = ProgressReporter::new(true);
        let snap = at_secs(5.2);
        let wins = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| reporter.should_report(&snap)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|&won| won)
                .count()
        });
        assert_eq!(wins, 1);
    }
}
