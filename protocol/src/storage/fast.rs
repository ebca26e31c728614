//! # Fast State Store
//!
//! Process-wide mutable values that every request path reads and a
//! handful of paths write: the current work threshold, the elected
//! validator, block-production flags, the MOTD, and the work-over-time
//! ring. None of it is durable — a restarted node begins with the
//! defaults (`work = max_work`, no validator) and reconverges.
//!
//! Writes are serialized behind one `parking_lot::RwLock`; readers may
//! observe values one tick stale relative to the durable store, which
//! every consumer tolerates.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::config::{Constants, WORK_OVER_TIME_CAP};

#[derive(Debug)]
struct Inner {
    work: u64,
    validator: String,
    mining_enabled: bool,
    staking_enabled: bool,
    free_nonce_submission: bool,
    genesis_genned: bool,
    motd: String,
    motd_date: DateTime<Utc>,
    /// Newest first, capped at [`WORK_OVER_TIME_CAP`].
    work_over_time: VecDeque<u64>,
}

/// The process-local key/value state of the node.
#[derive(Debug)]
pub struct FastState {
    inner: RwLock<Inner>,
}

impl FastState {
    /// Fresh state: work at `max_work`, no validator, production flags
    /// off until the node's configuration switches them on.
    pub fn new(constants: &Constants) -> Self {
        Self {
            inner: RwLock::new(Inner {
                work: constants.max_work,
                validator: String::new(),
                mining_enabled: false,
                staking_enabled: false,
                free_nonce_submission: false,
                genesis_genned: false,
                motd: "Welcome to Tessera!".to_string(),
                motd_date: Utc::now(),
                work_over_time: VecDeque::with_capacity(WORK_OVER_TIME_CAP),
            }),
        }
    }

    // -- Work ---------------------------------------------------------------

    pub fn work(&self) -> u64 {
        self.inner.read().work
    }

    pub fn set_work(&self, work: u64) {
        self.inner.write().work = work;
    }

    /// Record the current work into the ring, evicting the oldest sample
    /// once the 24-hour window is full.
    pub fn sample_work(&self) {
        let mut inner = self.inner.write();
        let work = inner.work;
        inner.work_over_time.push_front(work);
        inner.work_over_time.truncate(WORK_OVER_TIME_CAP);
    }

    /// The ring, newest first.
    pub fn work_over_time(&self) -> Vec<u64> {
        self.inner.read().work_over_time.iter().copied().collect()
    }

    // -- Validator ----------------------------------------------------------

    pub fn validator(&self) -> String {
        self.inner.read().validator.clone()
    }

    pub fn set_validator(&self, validator: &str) {
        self.inner.write().validator = validator.to_string();
    }

    // -- Flags --------------------------------------------------------------

    pub fn mining_enabled(&self) -> bool {
        self.inner.read().mining_enabled
    }

    pub fn staking_enabled(&self) -> bool {
        self.inner.read().staking_enabled
    }

    /// Apply the startup production flags. Mining and staking are
    /// mutually exclusive; mining wins when both are requested.
    pub fn set_production_flags(&self, mining: bool, staking: bool) {
        let mut inner = self.inner.write();
        inner.mining_enabled = mining;
        inner.staking_enabled = staking && !mining;
    }

    pub fn free_nonce_submission(&self) -> bool {
        self.inner.read().free_nonce_submission
    }

    /// Debug affordance: accept any nonce regardless of difficulty. The
    /// node only sets this outside production mode.
    pub fn set_free_nonce_submission(&self, on: bool) {
        self.inner.write().free_nonce_submission = on;
    }

    pub fn genesis_genned(&self) -> bool {
        self.inner.read().genesis_genned
    }

    pub fn set_genesis_genned(&self) {
        self.inner.write().genesis_genned = true;
    }

    // -- MOTD ---------------------------------------------------------------

    pub fn motd(&self) -> (String, DateTime<Utc>) {
        let inner = self.inner.read();
        (inner.motd.clone(), inner.motd_date)
    }

    pub fn set_motd(&self, motd: &str) {
        let mut inner = self.inner.write();
        inner.motd = motd.to_string();
        inner.motd_date = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> FastState {
        FastState::new(&Constants::default())
    }

    #[test]
    fn defaults_match_restart_semantics() {
        let fast = fresh();
        assert_eq!(fast.work(), Constants::default().max_work);
        assert_eq!(fast.validator(), "");
        assert!(!fast.mining_enabled());
        assert!(!fast.staking_enabled());
        assert!(!fast.free_nonce_submission());
        assert!(fast.work_over_time().is_empty());
    }

    #[test]
    fn mining_forces_staking_off() {
        let fast = fresh();
        fast.set_production_flags(true, true);
        assert!(fast.mining_enabled());
        assert!(!fast.staking_enabled());

        fast.set_production_flags(false, true);
        assert!(!fast.mining_enabled());
        assert!(fast.staking_enabled());
    }

    #[test]
    fn work_ring_is_newest_first_and_capped() {
        let fast = fresh();
        for w in 1..=(WORK_OVER_TIME_CAP as u64 + 10) {
            fast.set_work(w);
            fast.sample_work();
        }
        let ring = fast.work_over_time();
        assert_eq!(ring.len(), WORK_OVER_TIME_CAP);
        assert_eq!(ring[0], WORK_OVER_TIME_CAP as u64 + 10);
        assert_eq!(*ring.last().unwrap(), 11);
    }

    #[test]
    fn motd_updates_stamp_date() {
        let fast = fresh();
        let (_, before) = fast.motd();
        fast.set_motd("scheduled maintenance at noon");
        let (motd, after) = fast.motd();
        assert_eq!(motd, "scheduled maintenance at noon");
        assert!(after >= before);
    }

    #[test]
    fn validator_roundtrip() {
        let fast = fresh();
        fast.set_validator("taaaaaaaaa");
        assert_eq!(fast.validator(), "taaaaaaaaa");
        fast.set_validator("");
        assert_eq!(fast.validator(), "");
    }
}
