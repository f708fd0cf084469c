use std::io::{self, Write};
use std::sync::Mutex;

use crate::types::{AttemptResult, RunSummary};

/// Append-only destination for result lines, shared by every worker.
///
/// Lines are formatted before the lock is taken and written under it, so output from
/// different workers never interleaves.
pub struct ResultSink {
    out: Mutex<Box<dyn Write + Send>>,
    verbose: bool,
    echo: bool,
}

impl ResultSink {
    /// `verbose` also writes failures; `echo` prints successes to stdout as well.
    pub fn new(out: impl Write + Send + 'static, verbose: bool, echo: bool) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            verbose,
            echo,
        }
    }

    /// Write every line of a finished batch. Returns how many lines were written.
    pub fn write_batch(&self, results: &[AttemptResult]) -> io::Result<usize> {
        let mut buf = String::new();
        let mut written = 0;
        for r in results {
            if r.success || self.verbose {
                buf.push_str(&format_line(r));
                buf.push('\n');
                written += 1;
            }
        }
        if written == 0 {
            return Ok(0);
        }
        let mut out = self.lock()?;
        out.write_all(buf.as_bytes())?;
        out.flush()?;
        if self.echo {
            let mut stdout = io::stdout().lock();
            for r in results.iter().filter(|r| r.success) {
                writeln!(stdout, "\n[+] SUCCESS: {}", describe(r))?;
            }
        }
        Ok(written)
    }

    pub fn write_summary(&self, summary: &RunSummary) -> io::Result<()> {
        let text = format_summary(summary);
        let mut out = self.lock()?;
        out.write_all(text.as_bytes())?;
        out.flush()
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, Box<dyn Write + Send>>> {
        self.out
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "output lock poisoned"))
    }
}

/// `[SUCCESS] ip:port - user:pass - TLS (0.012s)` or `[FAILED] ... - timeout (2.000s)`.
pub fn format_line(r: &AttemptResult) -> String {
    let tag = if r.success { "[SUCCESS]" } else { "[FAILED]" };
    format!("{tag} {}", describe(r))
}

fn describe(r: &AttemptResult) -> String {
    let detail = match (r.success, r.protocol) {
        (true, Some(p)) => p.label().to_string(),
        _ => r.message.clone(),
    };
    format!(
        "{}:{} - {}:{} - {} ({:.3}s)",
        r.target,
        r.port,
        r.username,
        r.password,
        detail,
        r.elapsed.as_secs_f64()
    )
}

pub fn format_summary(s: &RunSummary) -> String {
    let mut text = String::from("\n# Final Summary\n");
    text.push_str(&format!("# Started: {}\n", s.started_at));
    text.push_str(&format!("# Total time: {:.2} seconds\n", s.elapsed_secs));
    text.push_str(&format!("# Work space: {}\n", s.total_space));
    text.push_str(&format!("# Total attempts: {}\n", s.attempts));
    text.push_str(&format!("# Successful: {}\n", s.successes));
    text.push_str(&format!("# Failed: {}\n", s.failures));
    text.push_str(&format!("# Average rate: {:.0} attempts/second\n", s.rate));
    text.push_str(&format!("# Threads: {}\n", s.workers));
    text.push_str(&format!("# Batch size: {}\n", s.batch_size));
    if s.cancelled {
        text.push_str("# Interrupted before completion\n");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Protocol;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn result(success: bool) -> AttemptResult {
        AttemptResult {
            index: 0,
            target: "10.0.0.5".into(),
            port: 3389,
            username: "admin".into(),
            password: "hunter2".into(),
            success,
            protocol: success.then_some(Protocol::Nla),
            elapsed: Duration::from_millis(42),
            message: if success { "RDP service detected" } else { "timeout" }.into(),
        }
    }

    #[test]
    fn success_line_format() {
        assert_eq!(
            format_line(&result(true)),
            "[SUCCESS] 10.0.0.5:3389 - admin:hunter2 - NLA (0.042s)"
        );
        assert_eq!(
            format_line(&result(false)),
            "[FAILED] 10.0.0.5:3389 - admin:hunter2 - timeout (0.042s)"
        );
    }

    #[test]
    fn failures_only_written_when_verbose() {
        let buf = SharedBuf::default();
        let sink = ResultSink::new(buf.clone(), false, false);
        assert_eq!(sink.write_batch(&[result(true), result(false)]).unwrap(), 1);
        assert_eq!(buf.text().lines().count(), 1);

        let buf = SharedBuf::default();
        let sink = ResultSink::new(buf.clone(), true, false);
        assert_eq!(sink.write_batch(&[result(true), result(false)]).unwrap(), 2);
        assert!(buf.text().contains("[FAILED]"));
    }

    #[test]
    fn summary_block() {
        let buf = SharedBuf::default();
        let sink = ResultSink::new(buf.clone(), false, false);
        let summary = RunSummary {
            attempts: 10,
            successes: 4,
            failures: 6,
            workers: 2,
            batch_size: 5,
            ..RunSummary::default()
        };
        sink.write_summary(&summary).unwrap();
        let text = buf.text();
        assert!(text.contains("# Final Summary"));
        assert!(text.contains("# Total attempts: 10"));
        assert!(text.contains("# Successful: 4"));
        assert!(!text.contains("Interrupted"));
    }
}
