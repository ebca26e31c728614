//! # CLI Interface
//!
//! Command-line arguments for `tessera-node` via `clap` derive. Every
//! configurable value has an environment-variable fallback so container
//! deployments can run the bare `run` subcommand with their environment
//! doing the talking.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Tessera ledger node.
///
/// The authoritative single-instance node of a Tessera network: chain,
/// transfer log, name registry, staking, and the JSON/WebSocket API.
#[derive(Parser, Debug)]
#[command(
    name = "tessera-node",
    about = "Tessera ledger node",
    version,
    propagate_version = true
)]
pub struct TesseraNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Data directory holding the ledger database.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Bind address for the HTTP and WebSocket API.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Externally reachable base URL, used when minting per-session
    /// WebSocket URLs.
    #[arg(long, env = "PUBLIC_URL", default_value = "http://127.0.0.1:8080")]
    pub public_url: String,

    /// Runtime environment: production, development, or test.
    #[arg(long, env = "NODE_ENV", default_value = "development")]
    pub node_env: String,

    /// Enable proof-of-work block production. Mutually exclusive with
    /// staking; when both are requested, mining wins and staking is
    /// forced off.
    #[arg(long, env = "MINING_ENABLED")]
    pub mining_enabled: bool,

    /// Enable proof-of-stake block production.
    #[arg(long, env = "STAKING_ENABLED")]
    pub staking_enabled: bool,

    /// Create the genesis block on an empty chain at startup.
    #[arg(long, env = "GEN_GENESIS")]
    pub gen_genesis: bool,

    /// Accept any nonce regardless of difficulty. Debug affordance,
    /// ignored in production mode.
    #[arg(long, env = "FREE_NONCE_SUBMISSION")]
    pub free_nonce_submission: bool,

    /// Log verbosity level: trace, debug, info, warn, error.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "auto")]
    pub log_format: LogFormat,
}

/// Log output format, validated at argument-parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Decide from NODE_ENV: JSON in production, pretty elsewhere.
    Auto,
    /// Human-readable output for a terminal.
    Pretty,
    /// JSON lines for log aggregation.
    Json,
}

impl RunArgs {
    pub fn is_production(&self) -> bool {
        self.node_env.eq_ignore_ascii_case("production")
    }

    pub fn is_test(&self) -> bool {
        self.node_env.eq_ignore_ascii_case("test")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
