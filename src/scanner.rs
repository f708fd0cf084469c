use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use mio::{Events, Poll, Token};
use tokio_util::sync::CancellationToken;

use crate::attempt::{Attempt, Progress, State};
use crate::config::ScanConfig;
use crate::dispatch::WorkCursor;
use crate::error::{AttemptError, ScanError};
use crate::negotiation::{self, REQUEST_LEN};
use crate::sink::ResultSink;
use crate::stats::{ProgressReporter, RunStats};
use crate::types::{AttemptResult, RunSummary};
use crate::workspace::WorkSpace;

/// Longest single wait on the poller, so cancellation is noticed promptly.
const MAX_POLL_WAIT: Duration = Duration::from_millis(100);
const MAX_EVENTS: usize = 1024;
/// How often the progress thread checks whether a new second has started.
const PROGRESS_TICK: Duration = Duration::from_millis(100);

/// Everything one run shares across its workers.
///
/// - The work cursor hands out disjoint index ranges.
/// - Counters are only touched through atomic increments.
/// - The sink serializes output lines behind its own lock.
/// - The cancellation token is polled at every batch boundary and inside the event loop.
pub struct Scanner {
    workspace: WorkSpace,
    config: ScanConfig,
    cursor: WorkCursor,
    stats: RunStats,
    sink: ResultSink,
    reporter: ProgressReporter,
    cancel: CancellationToken,
}

impl Scanner {
    pub fn new(
        workspace: WorkSpace,
        config: ScanConfig,
        sink: ResultSink,
        cancel: CancellationToken,
    ) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self {
            cursor: WorkCursor::new(workspace.size()),
            reporter: ProgressReporter::new(config.progress),
            stats: RunStats::new(),
            workspace,
            config,
            sink,
            cancel,
        })
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Progress lines printed during the run.
    pub fn progress_reports(&self) -> u64 {
        self.reporter.reports()
    }

    /// Run every worker to completion, append the summary to the sink and return it.
    ///
    /// Blocks the calling thread. Fails only if no worker could create its poller or the
    /// summary cannot be written.
    pub fn run(&self) -> Result<RunSummary, ScanError> {
        info!(
            "scanning {} combinations with {} workers x batch {}",
            self.workspace.size(),
            self.config.workers,
            self.config.batch_size
        );

        let workers_done = AtomicBool::new(false);
        let failed = thread::scope(|scope| {
            if self.reporter.is_enabled() {
                let done = &workers_done;
                let spawned = thread::Builder::new()
                    .name(String::from("progress"))
                    .spawn_scoped(scope, move || self.report_progress(done));
                if let Err(e) = spawned {
                    warn!("failed to spawn progress reporter: {e}");
                }
            }

            let mut handles = Vec::with_capacity(self.config.workers);
            for id in 0..self.config.workers {
                let spawned = thread::Builder::new()
                    .name(format!("worker-{id}"))
                    .spawn_scoped(scope, move || self.worker(id));
                match spawned {
                    Ok(h) => handles.push(h),
                    Err(e) => error!("failed to spawn worker {id}: {e}"),
                }
            }
            let mut failed = self.config.workers - handles.len();
            for h in handles {
                match h.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!("worker aborted: {e}");
                        failed += 1;
                    }
                    Err(_) => {
                        error!("worker panicked");
                        failed += 1;
                    }
                }
            }
            workers_done.store(true, Ordering::Release);
            failed
        });

        if failed == self.config.workers && !self.workspace.is_empty() {
            return Err(ScanError::AllWorkersFailed(failed));
        }

        let summary = self.summary();
        self.sink.write_summary(&summary)?;
        info!(
            "done: {} attempts, {} successful, {} failed in {:.2}s",
            summary.attempts, summary.successes, summary.failures, summary.elapsed_secs
        );
        Ok(summary)
    }

    /// Snapshot of the run so far in summary form.
    pub fn summary(&self) -> RunSummary {
        let snap = self.stats.snapshot();
        RunSummary {
            started_at: self.stats.started_at().to_string(),
            elapsed_secs: snap.elapsed.as_secs_f64(),
            total_space: self.workspace.size(),
            attempts: snap.attempts,
            successes: snap.successes,
            failures: snap.failures,
            rate: snap.rate(),
            workers: self.config.workers,
            batch_size: self.config.batch_size,
            cancelled: self.cancel.is_cancelled(),
        }
    }

    fn worker(&self, id: usize) -> Result<(), ScanError> {
        let mut engine = BatchEngine::new(&self.config)?;
        debug!("worker {id} started");
        let mut batches = 0u64;
        while !self.cancel.is_cancelled() {
            let range = self.cursor.take(self.config.batch_size as u64);
            if range.is_empty() {
                break;
            }
            let results = engine.run_batch(&self.workspace, range, &self.cancel);
            for r in &results {
                self.stats.record(r.success);
            }
            if let Err(e) = self.sink.write_batch(&results) {
                warn!("worker {id}: failed to write results: {e}");
            }
            batches += 1;
        }
        debug!("worker {id} finished after {batches} batches");
        Ok(())
    }

    /// Ticks independently of batch completion, so a long batch still shows progress.
    fn report_progress(&self, done: &AtomicBool) {
        while !done.load(Ordering::Acquire) && !self.cancel.is_cancelled() {
            self.reporter.maybe_report(&self.stats);
            thread::sleep(PROGRESS_TICK);
        }
    }
}

/// Per-worker event loop: one poller, one receive buffer, one pre-encoded request.
pub struct BatchEngine {
    poll: Poll,
    events: Events,
    buf: Vec<u8>,
    request: [u8; REQUEST_LEN],
    port: u16,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl BatchEngine {
    pub fn new(config: &ScanConfig) -> Result<Self, ScanError> {
        Ok(Self {
            poll: Poll::new().map_err(ScanError::Poller)?,
            events: Events::with_capacity(config.batch_size.clamp(1, MAX_EVENTS)),
            buf: vec![0u8; config.recv_buffer],
            request: negotiation::encode_request(config.requested_protocols),
            port: config.port,
            connect_timeout: config.connect_timeout(),
            response_timeout: config.response_timeout(),
        })
    }

    /// Drive every index in `range` to completion. Yields exactly one result per index.
    pub fn run_batch(
        &mut self,
        workspace: &WorkSpace,
        range: Range<u64>,
        cancel: &CancellationToken,
    ) -> Vec<AttemptResult> {
        let mut attempts: Vec<Attempt> = range
            .filter_map(|i| workspace.get(i).map(|t| Attempt::new(i, t, self.port)))
            .collect();

        let mut active = 0usize;
        for (slot, attempt) in attempts.iter_mut().enumerate() {
            if attempt.start(self.poll.registry(), Token(slot), self.connect_timeout)
                == Progress::Pending
            {
                active += 1;
            }
        }

        while active > 0 {
            if cancel.is_cancelled() {
                debug!("cancelled with {active} attempts in flight");
                break;
            }
            // Expired attempts are swept per deadline below; an empty wakeup does not fail the batch.
            let wait = next_wait(&attempts, Instant::now());
            if let Err(e) = self.poll.poll(&mut self.events, Some(wait)) {
                if e.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                warn!("poll failed, abandoning batch: {e}");
                break;
            }

            for event in self.events.iter() {
                let slot = event.token().0;
                let Some(attempt) = attempts.get_mut(slot) else {
                    continue;
                };
                if attempt.is_done() {
                    continue;
                }
                let hangup = event.is_read_closed() && event.is_write_closed();
                let mut step = Progress::Pending;
                if event.is_error() || hangup {
                    // Data that arrived before the hang-up still wins.
                    if event.is_readable() && attempt.state() == State::AwaitingResponse {
                        step = attempt.on_readable(&mut self.buf);
                    }
                    if step == Progress::Pending {
                        step = attempt.on_error();
                    }
                } else {
                    if event.is_writable() && attempt.state() == State::Connecting {
                        step = attempt.on_writable(
                            self.poll.registry(),
                            Token(slot),
                            &self.request,
                            self.response_timeout,
                        );
                    }
                    if step == Progress::Pending
                        && event.is_readable()
                        && attempt.state() == State::AwaitingResponse
                    {
                        step = attempt.on_readable(&mut self.buf);
                    }
                }
                if step == Progress::Finished {
                    active -= 1;
                }
            }

            let now = Instant::now();
            for attempt in attempts.iter_mut() {
                if attempt.timed_out(now) {
                    active -= 1;
                }
            }
        }

        // Abandoned attempts still count: each pulled index yields one result.
        let cancelled = cancel.is_cancelled();
        for attempt in attempts.iter_mut().filter(|a| !a.is_done()) {
            attempt.abort(if cancelled {
                AttemptError::Cancelled
            } else {
                AttemptError::Timeout
            });
        }
        attempts.into_iter().map(Attempt::into_result).collect()
    }
}

/// Time until the nearest in-flight deadline, capped by [`MAX_POLL_WAIT`].
fn next_wait(attempts: &[Attempt], now: Instant) -> Duration {
    attempts
        .iter()
        .filter_map(Attempt::deadline)
        .min()
        .map(|d| d.saturating_duration_since(now))
        .unwrap_or(MAX_POLL_WAIT)
        .min(MAX_POLL_WAIT)
}
