//! Library crate for rdp-sweep: the batch negotiation-probe engine and its collaborators.
pub mod attempt;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod negotiation;
pub mod scanner;
pub mod sink;
pub mod stats;
pub mod targets;
pub mod types;
pub mod wordlist;
pub mod workspace;
