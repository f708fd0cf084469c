use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Security layer a server selected in its negotiation response.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    #[serde(rename = "RDP")]
    Rdp,
    #[serde(rename = "TLS")]
    Tls,
    #[serde(rename = "NLA")]
    Nla,
    #[serde(rename = "RDSTLS")]
    Rdstls,
    Unknown,
}

impl Protocol {
    pub fn label(self) -> &'static str {
        match self {
            Protocol::Rdp => "RDP",
            Protocol::Tls => "TLS",
            Protocol::Nla => "NLA",
            Protocol::Rdstls => "RDSTLS",
            Protocol::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one connection attempt, produced exactly once when the attempt completes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttemptResult {
    /// Linear index of the (target, username, password) triple.
    pub index: u64,
    pub target: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub success: bool,
    pub protocol: Option<Protocol>,
    pub elapsed: Duration,
    pub message: String,
}

/// Aggregate counters written once after every worker has joined.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub started_at: String,
    pub elapsed_secs: f64,
    pub total_space: u64,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub rate: f64,
    pub workers: usize,
    pub batch_size: usize,
    pub cancelled: bool,
}
