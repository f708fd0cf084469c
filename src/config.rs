use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::negotiation::{DEFAULT_REQUESTED, KNOWN_PROTOCOLS, MIN_RESPONSE_LEN};

pub const DEFAULT_PORT: u16 = 3389;
pub const MAX_WORKERS: usize = 1000;
pub const MAX_BATCH_SIZE: usize = 10_000;
pub const MAX_RECV_BUFFER: usize = 64 * 1024;

/// Tunables for one scan run. Every field has a default so partial TOML files work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub port: u16,
    pub workers: usize,
    pub batch_size: usize,
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
    /// Also write failed attempts to the output.
    pub verbose: bool,
    /// Do not echo successes to stdout.
    pub quiet: bool,
    /// Print the rate-limited progress line to stderr.
    pub progress: bool,
    pub requested_protocols: u32,
    pub recv_buffer: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            workers: 100,
            batch_size: 50,
            connect_timeout_ms: 2000,
            response_timeout_ms: 3000,
            verbose: false,
            quiet: false,
            progress: true,
            requested_protocols: DEFAULT_REQUESTED,
            recv_buffer: 8192,
        }
    }
}

impl ScanConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Upper bound on sockets open at once across all workers.
    pub fn max_open_sockets(&self) -> u64 {
        self.workers as u64 * self.batch_size as u64
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(ConfigError::Workers {
                got: self.workers,
                max: MAX_WORKERS,
            });
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(ConfigError::BatchSize {
                got: self.batch_size,
                max: MAX_BATCH_SIZE,
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("connect"));
        }
        if self.response_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("response"));
        }
        if !(MIN_RESPONSE_LEN..=MAX_RECV_BUFFER).contains(&self.recv_buffer) {
            return Err(ConfigError::RecvBuffer {
                got: self.recv_buffer,
                min: MIN_RESPONSE_LEN,
                max: MAX_RECV_BUFFER,
            });
        }
        if self.requested_protocols & !KNOWN_PROTOCOLS != 0 {
            return Err(ConfigError::ProtocolMask(self.requested_protocols));
        }
        Ok(())
    }
}

/// Named bundles of settings, applied on top of the file configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
    /// Suppress console echo of successes.
    Fast,
    /// More workers, shorter connect timeout.
    Aggressive,
    /// Maximum concurrency, short timeouts, quiet.
    Ultra,
}

impl Preset {
    pub fn apply(self, cfg: &mut ScanConfig) {
        match self {
            Preset::Fast => cfg.quiet = true,
            Preset::Aggressive => {
                cfg.workers = 500;
                cfg.connect_timeout_ms = 1000;
            }
            Preset::Ultra => {
                cfg.workers = 800;
                cfg.batch_size = 100;
                cfg.connect_timeout_ms = 1000;
                cfg.response_timeout_ms = 2000;
                cfg.quiet = true;
            }
        }
    }
}

pub fn parse_config_str(s: &str) -> Result<ScanConfig> {
    toml::from_str(s).context("invalid scan configuration")
}

pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<ScanConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read config file: {}", path.as_ref().display()))?;
    parse_config_str(&content)
        .with_context(|| format!("in config file: {}", path.as_ref().display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ScanConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = parse_config_str("workers = 8\nconnect_timeout_ms = 250\n").unwrap();
        assert_eq!(cfg.workers, 8);
        assert_eq!(cfg.connect_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.batch_size, 50);
    }

    #[test]
    fn unknown_protocol_bits_rejected() {
        let cfg = ScanConfig {
            requested_protocols: 0x10,
            ..ScanConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ProtocolMask(0x10)));
    }

    #[test]
    fn zero_workers_rejected() {
        let cfg = ScanConfig {
            workers: 0,
            ..ScanConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Workers { got: 0, .. })));
    }

    #[test]
    fn tiny_recv_buffer_rejected() {
        let cfg = ScanConfig {
            recv_buffer: 8,
            ..ScanConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::RecvBuffer { .. })));
    }

    #[test]
    fn ultra_preset() {
        let mut cfg = ScanConfig::default();
        Preset::Ultra.apply(&mut cfg);
        assert_eq!(cfg.workers, 800);
        assert!(cfg.quiet);
        assert!(cfg.validate().is_ok());
    }
}
