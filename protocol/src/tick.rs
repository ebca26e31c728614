//! # Scheduled Ticks
//!
//! The three background loops a running node drives:
//!
//! 1. a one-minute sampler pushing current work into the
//!    work-over-time ring,
//! 2. an hourly auth-log prune,
//! 3. the staking epoch: validator election every `seconds_per_block`
//!    seconds while staking is enabled.
//!
//! Each loop watches a `tokio::sync::watch` shutdown channel and exits
//! cleanly between iterations. Tick bodies catch and log their own
//! errors — a failed prune or election must never kill the scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::ledger::AddressLedger;
use crate::staking::StakingEngine;
use crate::storage::FastState;

/// Wait for the next tick or a shutdown signal. Returns `false` when
/// the loop should exit.
async fn next_tick(period: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(period) => true,
        _ = shutdown.changed() => false,
    }
}

/// Sample current work into the ring once per `period`.
pub async fn run_work_sampler(
    fast: Arc<FastState>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(period_secs = period.as_secs(), "work sampler started");
    while next_tick(period, &mut shutdown).await {
        fast.sample_work();
        debug!(work = fast.work(), "work sampled");
    }
    info!("work sampler stopped");
}

/// Prune auth-log entries past their retention once per `period`.
pub async fn run_auth_log_pruner(
    ledger: Arc<AddressLedger>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(period_secs = period.as_secs(), "auth-log pruner started");
    while next_tick(period, &mut shutdown).await {
        match ledger.prune_auth_log() {
            Ok(0) => {}
            Ok(removed) => info!(removed, "auth log pruned"),
            Err(e) => warn!(error = %e, "auth-log prune failed"),
        }
    }
    info!("auth-log pruner stopped");
}

/// Run the validator election every `period` while staking is enabled.
pub async fn run_validator_epochs(
    staking: Arc<StakingEngine>,
    fast: Arc<FastState>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(period_secs = period.as_secs(), "validator epoch tick started");
    while next_tick(period, &mut shutdown).await {
        if !fast.staking_enabled() {
            continue;
        }
        match staking.run_validator_tick() {
            Ok(validator) if validator.is_empty() => {
                debug!("epoch tick: no eligible stakers")
            }
            Ok(validator) => debug!(%validator, "epoch tick: validator elected"),
            Err(e) => warn!(error = %e, "validator tick failed"),
        }
    }
    info!("validator epoch tick stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
