// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Tessera Node
//!
//! Entry point for the `tessera-node` binary. Parses CLI arguments,
//! initializes logging, wires the kernel engines to the session
//! registry, starts the background ticks, and serves the HTTP/WS API.
//!
//! Subcommands:
//!
//! - `run`     — start the node
//! - `version` — print build version information

mod api;
mod cli;
mod logging;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use tessera_protocol::blocks::BlockEngine;
use tessera_protocol::config::Constants;
use tessera_protocol::events::{EventSink, MessageRouter, SessionRegistry};
use tessera_protocol::ledger::AddressLedger;
use tessera_protocol::names::NameRegistry;
use tessera_protocol::staking::StakingEngine;
use tessera_protocol::storage::{FastState, Store};
use tessera_protocol::tick;
use tessera_protocol::transaction::TransactionEngine;

use cli::{Commands, RunArgs, TesseraNodeCli};

/// Interval between work-over-time samples.
const WORK_SAMPLE_INTERVAL: Duration = Duration::from_secs(60);

/// Interval between auth-log prune passes.
const AUTH_LOG_PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TesseraNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

async fn run_node(args: RunArgs) -> Result<()> {
    logging::init(&args.log_level, args.log_format, args.is_production());

    info!(
        bind = %args.bind,
        public_url = %args.public_url,
        node_env = %args.node_env,
        mining = args.mining_enabled,
        staking = args.staking_enabled,
        "starting tessera-node"
    );

    // --- Persistent storage ---
    let store = if args.is_test() {
        Arc::new(Store::open_temporary().context("failed to open temporary store")?)
    } else {
        let db_path = args.data_dir.join("db");
        std::fs::create_dir_all(&args.data_dir).with_context(|| {
            format!("failed to create data directory: {}", args.data_dir.display())
        })?;
        Arc::new(
            Store::open(&db_path)
                .with_context(|| format!("failed to open store at {}", db_path.display()))?,
        )
    };
    info!("store opened");

    // --- Fast state & production flags ---
    let constants = Arc::new(Constants::default());
    let fast = Arc::new(FastState::new(&constants));
    fast.set_production_flags(args.mining_enabled, args.staking_enabled);
    if args.mining_enabled && args.staking_enabled {
        warn!("mining and staking both requested; staking forced off");
    }
    if args.free_nonce_submission {
        if args.is_production() {
            warn!("free nonce submission requested in production; ignored");
        } else {
            fast.set_free_nonce_submission(true);
            warn!("free nonce submission enabled: any nonce is a valid solution");
        }
    }

    // --- Engines & sessions ---
    let registry = Arc::new(SessionRegistry::new());
    let sink: Arc<dyn EventSink> = registry.clone() as Arc<dyn EventSink>;

    let ledger = Arc::new(AddressLedger::new(
        Arc::clone(&store),
        Arc::clone(&constants),
    ));
    let names = Arc::new(NameRegistry::new(
        Arc::clone(&store),
        Arc::clone(&constants),
        Arc::clone(&ledger),
        Arc::clone(&sink),
    ));
    let transactions = Arc::new(TransactionEngine::new(
        Arc::clone(&store),
        Arc::clone(&constants),
        Arc::clone(&ledger),
        Arc::clone(&sink),
    ));
    let blocks = Arc::new(BlockEngine::new(
        Arc::clone(&store),
        Arc::clone(&fast),
        Arc::clone(&constants),
        Arc::clone(&ledger),
        Arc::clone(&sink),
    ));
    let staking = Arc::new(StakingEngine::new(
        Arc::clone(&store),
        Arc::clone(&fast),
        Arc::clone(&constants),
        Arc::clone(&ledger),
        Arc::clone(&sink),
    ));

    // --- Genesis ---
    if args.gen_genesis {
        if let Some(genesis) = blocks.ensure_genesis()? {
            info!(id = genesis.id, "genesis block generated");
        }
    } else if blocks.latest().is_ok() {
        fast.set_genesis_genned();
    }

    let router = Arc::new(MessageRouter::new(
        Arc::clone(&constants),
        Arc::clone(&fast),
        Arc::clone(&ledger),
        Arc::clone(&names),
        Arc::clone(&transactions),
        Arc::clone(&blocks),
        Arc::clone(&staking),
    ));

    // --- Application state & router ---
    let app_state = api::AppState {
        constants: Arc::clone(&constants),
        fast: Arc::clone(&fast),
        store: Arc::clone(&store),
        ledger: Arc::clone(&ledger),
        names,
        transactions,
        blocks,
        staking: Arc::clone(&staking),
        registry,
        router,
        public_url: args.public_url.clone(),
        production: args.is_production(),
        started: Utc::now(),
    };
    let app = api::create_router(app_state)
        .into_make_service_with_connect_info::<SocketAddr>();

    // --- Background ticks ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(tick::run_work_sampler(
        Arc::clone(&fast),
        WORK_SAMPLE_INTERVAL,
        shutdown_rx.clone(),
    ));
    tokio::spawn(tick::run_auth_log_pruner(
        Arc::clone(&ledger),
        AUTH_LOG_PRUNE_INTERVAL,
        shutdown_rx.clone(),
    ));
    tokio::spawn(tick::run_validator_epochs(
        Arc::clone(&staking),
        Arc::clone(&fast),
        Duration::from_secs(constants.seconds_per_block),
        shutdown_rx,
    ));

    // --- Serve ---
    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind API listener on {}", args.bind))?;
    info!("API listening on {}", args.bind);

    tokio::select! {
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, draining");
        }
    }

    let _ = shutdown_tx.send(true);
    store.flush().context("final store flush failed")?;
    info!("tessera-node stopped");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("tessera-node {}", env!("CARGO_PKG_VERSION"));
    println!(
        "wallet protocol v{}",
        tessera_protocol::config::WALLET_VERSION
    );
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
