//! Error types for the probe engine and its configuration.

use std::io;
use thiserror::Error;

/// Why a single attempt ended in failure. Never propagates past the batch engine.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("socket setup failed: {0}")]
    Setup(#[source] io::Error),

    #[error("poller registration failed: {0}")]
    Register(#[source] io::Error),

    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("connection error")]
    Hangup,

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("short write: sent {sent} of {expected} bytes")]
    ShortWrite { sent: usize, expected: usize },

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("connection closed by peer")]
    Closed,

    #[error("invalid response: {0}")]
    InvalidResponse(#[from] DecodeError),

    #[error("timeout")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}

/// Reasons the negotiation codec rejects a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated ({len} bytes)")]
    TooShort { len: usize },

    #[error("bad TPKT header")]
    BadTpkt,

    #[error("not a connection confirm (type {0:#04x})")]
    NotConnectionConfirm(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("port must be non-zero")]
    ZeroPort,

    #[error("workers must be between 1 and {max} (got {got})")]
    Workers { got: usize, max: usize },

    #[error("batch size must be between 1 and {max} (got {got})")]
    BatchSize { got: usize, max: usize },

    #[error("{0} timeout must be non-zero")]
    ZeroTimeout(&'static str),

    #[error("receive buffer must be between {min} and {max} bytes (got {got})")]
    RecvBuffer { got: usize, min: usize, max: usize },

    #[error("requested protocol mask {0:#x} has unknown bits")]
    ProtocolMask(u32),

    #[error("work space size overflows 64 bits")]
    WorkSpaceOverflow,
}

/// Errors that end a worker or the whole run.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to create readiness poller: {0}")]
    Poller(#[source] io::Error),

    #[error("all {0} workers failed to start")]
    AllWorkersFailed(usize),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("output error: {0}")]
    Output(#[from] io::Error),
}
