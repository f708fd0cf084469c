use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use rdp_sweep::config::{self, Preset, ScanConfig};
use rdp_sweep::scanner::Scanner;
use rdp_sweep::sink::ResultSink;
use rdp_sweep::stats::status_line;
use rdp_sweep::types::RunSummary;
use rdp_sweep::workspace::WorkSpace;
use rdp_sweep::{targets, wordlist};

/// rdp-sweep — probe RDP endpoints across a targets x usernames x passwords work space
/// and record which security protocol each one negotiates.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rdp-sweep",
    version,
    about = "Probe RDP endpoints and classify their negotiated security protocol (RDP/TLS/NLA/RDSTLS).",
    long_about = None
)]
struct Cli {
    /// Targets file: one IPv4/IPv6 address or IPv4 CIDR per line.
    #[arg(short = 'i', long)]
    targets: PathBuf,

    /// Usernames file (one per line).
    #[arg(short = 'u', long)]
    usernames: PathBuf,

    /// Passwords file (one per line).
    #[arg(short = 'p', long)]
    passwords: PathBuf,

    /// Output results file (truncated, then appended to).
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Optional TOML file with scan settings; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Settings bundle applied after the config file.
    #[arg(long, value_enum)]
    preset: Option<Preset>,

    /// RDP port.
    #[arg(short = 'P', long, env = "RDP_SWEEP_PORT")]
    port: Option<u16>,

    /// Worker threads, each with its own poller.
    #[arg(short = 't', long, env = "RDP_SWEEP_WORKERS")]
    workers: Option<usize>,

    /// Concurrent attempts per worker.
    #[arg(short = 'b', long = "batch-size", env = "RDP_SWEEP_BATCH")]
    batch_size: Option<usize>,

    /// Connect timeout in milliseconds.
    #[arg(long = "connect-timeout-ms")]
    connect_timeout_ms: Option<u64>,

    /// Response timeout in milliseconds, counted from when the request is sent.
    #[arg(long = "response-timeout-ms")]
    response_timeout_ms: Option<u64>,

    /// Also write failed attempts to the output.
    #[arg(short = 'v', long, default_value_t = false)]
    verbose: bool,

    /// Do not echo successes to the console.
    #[arg(short = 'f', long, default_value_t = false)]
    quiet: bool,

    /// Disable the once-per-second progress line.
    #[arg(long = "no-progress", default_value_t = false)]
    no_progress: bool,

    /// Write the final summary as pretty JSON to this path.
    #[arg(long = "summary-json")]
    summary_json: Option<PathBuf>,

    /// Open-file limit to request; defaults to workers x batch size + 256.
    #[arg(long)]
    ulimit: Option<u64>,
}

impl Cli {
    fn scan_config(&self) -> Result<ScanConfig> {
        let mut cfg = match &self.config {
            Some(path) => config::load_config_from_path(path)?,
            None => ScanConfig::default(),
        };
        if let Some(preset) = self.preset {
            preset.apply(&mut cfg);
        }
        if let Some(v) = self.port {
            cfg.port = v;
        }
        if let Some(v) = self.workers {
            cfg.workers = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.connect_timeout_ms {
            cfg.connect_timeout_ms = v;
        }
        if let Some(v) = self.response_timeout_ms {
            cfg.response_timeout_ms = v;
        }
        cfg.verbose |= self.verbose;
        cfg.quiet |= self.quiet;
        if self.no_progress {
            cfg.progress = false;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let cfg = cli.scan_config()?;

    let targets = targets::expand_targets(&wordlist::load_list_from_path(&cli.targets)?)?;
    let usernames = wordlist::load_list_from_path(&cli.usernames)?;
    let passwords = wordlist::load_list_from_path(&cli.passwords)?;
    info!(
        "loaded {} targets, {} usernames, {} passwords",
        targets.len(),
        usernames.len(),
        passwords.len()
    );
    let workspace = WorkSpace::new(targets, usernames, passwords)?;

    println!("rdp-sweep configuration:");
    println!("  targets      : {}", workspace.targets().len());
    println!("  usernames    : {}", workspace.usernames().len());
    println!("  passwords    : {}", workspace.passwords().len());
    println!("  combinations : {}", workspace.size());
    println!("  port         : {}", cfg.port);
    println!("  workers      : {}", cfg.workers);
    println!("  batch_size   : {}", cfg.batch_size);
    println!("  connect_ms   : {}", cfg.connect_timeout_ms);
    println!("  response_ms  : {}", cfg.response_timeout_ms);
    println!("  verbose      : {}", cfg.verbose);
    println!("  output       : {}", cli.output.display());

    adjust_nofile_limit(cli.ulimit.unwrap_or(cfg.max_open_sockets() + 256));

    let file = File::create(&cli.output)
        .with_context(|| format!("cannot create output file {}", cli.output.display()))?;
    let sink = ResultSink::new(BufWriter::new(file), cfg.verbose, !cfg.quiet);

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    let scanner = Arc::new(Scanner::new(workspace, cfg, sink, cancel)?);
    let runner = Arc::clone(&scanner);
    let summary = tokio::task::spawn_blocking(move || runner.run())
        .await
        .context("scan task failed")??;

    println!("\n\n{}", status_line(&scanner.stats().snapshot()));
    print_summary(&summary, &cli.output);

    if let Some(path) = cli.summary_json.as_deref() {
        if let Err(e) = write_summary_json(path, &summary) {
            eprintln!("Failed to write JSON summary to {}: {}", path.display(), e);
        } else {
            println!("Wrote JSON summary to {}", path.display());
        }
    }
    Ok(())
}

/// Cancel the scan on Ctrl+C or SIGTERM. In-flight sockets are still closed by the workers.
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        eprintln!("\n[!] Received stop signal, finishing in-flight attempts...");
        cancel.cancel();
    });
}

#[cfg(unix)]
fn adjust_nofile_limit(wanted: u64) {
    match rlimit::increase_nofile_limit(wanted) {
        Ok(got) if got >= wanted => info!("open-file limit set to {got}"),
        Ok(got) => warn!(
            "open-file limit is {got}, below the {wanted} sockets this scan may open; \
             excess attempts will fail"
        ),
        Err(e) => warn!("could not raise open-file limit: {e}"),
    }
}

#[cfg(not(unix))]
fn adjust_nofile_limit(_wanted: u64) {}

fn print_summary(s: &RunSummary, output: &Path) {
    println!("[*] Scan {}!", if s.cancelled { "interrupted" } else { "completed" });
    println!("[*] Total time: {:.2} seconds", s.elapsed_secs);
    println!("[*] Total attempts: {} of {}", s.attempts, s.total_space);
    println!("[*] Successful: {}", s.successes);
    println!("[*] Failed: {}", s.failures);
    println!("[*] Average rate: {:.0} attempts/second", s.rate);
    println!("[*] Results saved to: {}", output.display());
}

fn write_summary_json(path: &Path, summary: &RunSummary) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, summary)?;
    Ok(())
}
