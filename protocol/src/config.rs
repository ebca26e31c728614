//! # Protocol Configuration & Constants
//!
//! Every protocol-level magic number in Tessera lives here. The values
//! below define the economics of the network: block rewards, name cost,
//! work retargeting, and the staking penalty. They are surfaced verbatim
//! through the `/motd` endpoint so wallets can discover them instead of
//! hardcoding their own copies.
//!
//! Engines never read these module constants directly — they receive a
//! [`Constants`] snapshot at construction time, which keeps tests free to
//! build permissive variants (e.g. an unclamped `max_work`).

// ---------------------------------------------------------------------------
// Protocol Constants
// ---------------------------------------------------------------------------

/// Wallet protocol generation advertised to clients.
pub const WALLET_VERSION: u32 = 16;

/// Maximum accepted nonce length, in bytes, for block submissions.
pub const NONCE_MAX_SIZE: usize = 24;

/// Cost of registering a name, in TST. Also the initial value of the
/// name's `unpaid` counter.
pub const NAME_COST: u64 = 500;

/// Lower clamp for the mining work threshold.
pub const MIN_WORK: u64 = 100;

/// Upper clamp for the mining work threshold. Also the work value a
/// freshly started node begins at.
pub const MAX_WORK: u64 = 100_000;

/// Smoothing factor applied per block when retargeting work toward the
/// observed block interval.
pub const WORK_FACTOR: f64 = 0.025;

/// Target seconds between blocks. Doubles as the staking epoch length:
/// the validator lottery runs once per this interval.
pub const SECONDS_PER_BLOCK: u64 = 60;

/// Stake confiscated from a validator that lets its epoch lapse without
/// producing a block. Matches [`NAME_COST`].
pub const VALIDATOR_PENALTY: u64 = 500;

/// Single-character prefix of every v2 address.
pub const ADDRESS_PREFIX: char = 't';

/// Name suffix, without the dot: names resolve as `<name>.tst`.
pub const NAME_SUFFIX: &str = "tst";

/// Block height below which the base block reward is 25 TST. From this
/// height on the base reward drops to 1 TST and the unpaid-name and
/// penalty bonuses dominate.
pub const BASE_VALUE_CUTOVER: u64 = 325;

/// Auth-log entries older than this many days are pruned.
pub const AUTH_LOG_RETENTION_DAYS: i64 = 30;

/// Window within which repeated auth attempts from the same
/// `(ip, address, type)` triple are not logged again.
pub const AUTH_LOG_DEDUP_MINUTES: i64 = 30;

/// Capacity of the work-over-time ring: 24 hours of one-per-minute
/// samples.
pub const WORK_OVER_TIME_CAP: usize = 1440;

/// Seconds a freshly issued WebSocket session token stays claimable.
pub const WS_TOKEN_TTL_SECS: i64 = 30;

/// Per-session WebSocket outbox depth. A session that falls this many
/// events behind starts losing events rather than stalling broadcasts.
pub const SESSION_OUTBOX_CAPACITY: usize = 512;

// ---------------------------------------------------------------------------
// Constants snapshot
// ---------------------------------------------------------------------------

/// Read-only configuration threaded through every engine.
///
/// The default snapshot mirrors the module constants above. Tests build
/// modified copies to explore edge cases without touching global state.
#[derive(Debug, Clone)]
pub struct Constants {
    pub wallet_version: u32,
    pub nonce_max_size: usize,
    pub name_cost: u64,
    pub min_work: u64,
    pub max_work: u64,
    pub work_factor: f64,
    pub seconds_per_block: u64,
    pub validator_penalty: u64,
    pub address_prefix: char,
    pub name_suffix: &'static str,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            wallet_version: WALLET_VERSION,
            nonce_max_size: NONCE_MAX_SIZE,
            name_cost: NAME_COST,
            min_work: MIN_WORK,
            max_work: MAX_WORK,
            work_factor: WORK_FACTOR,
            seconds_per_block: SECONDS_PER_BLOCK,
            validator_penalty: VALIDATOR_PENALTY,
            address_prefix: ADDRESS_PREFIX,
            name_suffix: NAME_SUFFIX,
        }
    }
}

impl Constants {
    /// Base reward for the block following height `last_id`.
    pub fn base_block_value(&self, last_id: u64) -> u64 {
        if last_id < BASE_VALUE_CUTOVER {
            25
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_bounds_are_ordered() {
        assert!(MIN_WORK < MAX_WORK);
        assert!(WORK_FACTOR > 0.0 && WORK_FACTOR < 1.0);
    }

    #[test]
    fn validator_penalty_matches_name_cost() {
        assert_eq!(VALIDATOR_PENALTY, NAME_COST);
    }

    #[test]
    fn base_value_drops_at_cutover() {
        let c = Constants::default();
        assert_eq!(c.base_block_value(1), 25);
        assert_eq!(c.base_block_value(BASE_VALUE_CUTOVER - 1), 25);
        assert_eq!(c.base_block_value(BASE_VALUE_CUTOVER), 1);
        assert_eq!(c.base_block_value(1_000_000), 1);
    }

    #[test]
    fn defaults_match_module_constants() {
        let c = Constants::default();
        assert_eq!(c.wallet_version, 16);
        assert_eq!(c.nonce_max_size, 24);
        assert_eq!(c.name_cost, 500);
        assert_eq!(c.min_work, 100);
        assert_eq!(c.max_work, 100_000);
        assert_eq!(c.seconds_per_block, 60);
        assert_eq!(c.address_prefix, 't');
        assert_eq!(c.name_suffix, "tst");
    }
}
