//! End-to-end integration tests for the Tessera kernel.
//!
//! These exercise the full node lifecycle across engine boundaries:
//! genesis bootstrap, mined blocks with reward bonuses, transfers with
//! name routing, the name lifecycle, the staking state machine with
//! validator election and penalties, and event fan-out to a connected
//! session.
//!
//! Each test stands alone with its own temporary store. No shared
//! state, no ordering dependencies.

use std::sync::Arc;

use tessera_protocol::blocks::BlockEngine;
use tessera_protocol::config::Constants;
use tessera_protocol::crypto::address::make_v2_address;
use tessera_protocol::events::{EventSink, SessionRegistry};
use tessera_protocol::ledger::AddressLedger;
use tessera_protocol::names::NameRegistry;
use tessera_protocol::staking::StakingEngine;
use tessera_protocol::storage::{FastState, Store};
use tessera_protocol::transaction::{TransactionEngine, TransactionType};
use tessera_protocol::{NodeError, RequestMeta};

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

/// The full engine stack over one temporary store, with the session
/// registry wired in as the event sink.
struct Node {
    store: Arc<Store>,
    fast: Arc<FastState>,
    ledger: Arc<AddressLedger>,
    names: Arc<NameRegistry>,
    transactions: Arc<TransactionEngine>,
    blocks: Arc<BlockEngine>,
    staking: Arc<StakingEngine>,
    registry: Arc<SessionRegistry>,
}

fn node() -> Node {
    let store = Arc::new(Store::open_temporary().expect("temp store"));
    let constants = Arc::new(Constants::default());
    let fast = Arc::new(FastState::new(&constants));
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

    blocks.ensure_genesis().expect("genesis");
    Node {
        store,
        fast,
        ledger,
        names,
        transactions,
        blocks,
        staking,
        registry,
    }
}

fn meta() -> RequestMeta {
    RequestMeta::internal()
}

/// Puts the node in mining mode with an unbounded work threshold so any
/// nonce is a valid solution.
fn enable_easy_mining(node: &Node) {
    node.fast.set_production_flags(true, false);
    node.fast.set_work(u64::MAX);
}

/// Mine `count` blocks to `address`, returning the total reward paid.
fn mine(node: &Node, address: &str, count: u64) -> u64 {
    let mut earned = 0;
    for i in 0..count {
        let accepted = node
            .blocks
            .submit(&meta(), address, &[i as u8, 1])
            .expect("block accepted");
        earned += accepted.block.value;
    }
    earned
}

// ---------------------------------------------------------------------------
// 1. Mine, then move the money around
// ---------------------------------------------------------------------------

#[test]
fn mined_rewards_flow_through_transfers() {
    let node = node();
    enable_easy_mining(&node);

    let miner = make_v2_address("miner", 't');
    let earned = mine(&node, &miner, 4);
    assert_eq!(earned, 100); // 4 blocks x 25 base reward

    let miner_row = node.ledger.require(&miner).unwrap();
    assert_eq!(miner_row.balance, 100);
    assert_eq!(miner_row.totalin, 100);

    // The chain advanced past genesis with linked hashes.
    let tip = node.blocks.latest().unwrap();
    assert_eq!(tip.id, 5);

    // Move 30 to a fresh wallet.
    let friend = make_v2_address("friend", 't');
    let tx = node
        .transactions
        .send(&meta(), "miner", &friend, 30, Some("message=thanks"))
        .unwrap();
    assert_eq!(tx.transaction_type(), TransactionType::Transfer);

    let miner_row = node.ledger.require(&miner).unwrap();
    let friend_row = node.ledger.require(&friend).unwrap();
    assert_eq!(miner_row.balance, 70);
    assert_eq!(miner_row.totalout, 30);
    assert_eq!(friend_row.balance, 30);
    assert_eq!(friend_row.totalin, 30);

    // Ledger history: 4 mined rows + 1 transfer.
    let (all, total) = node.transactions.list(10, 0, true, false).unwrap();
    assert_eq!(total, 5);
    assert_eq!(all[0].transaction_type(), TransactionType::Transfer);
    let (unmined, mined_excluded_total) = node.transactions.list(10, 0, true, true).unwrap();
    assert_eq!(mined_excluded_total, 1);
    assert_eq!(unmined[0].value, 30);
}

// ---------------------------------------------------------------------------
// 2. Name lifecycle feeds block rewards
// ---------------------------------------------------------------------------

#[test]
fn name_lifecycle_and_reward_bonus() {
    let node = node();
    enable_easy_mining(&node);

    let miner = make_v2_address("miner", 't');
    mine(&node, &miner, 20); // 500 TST, enough for one name

    let name = node.names.purchase(&meta(), "miner", "example").unwrap();
    assert_eq!(name.unpaid, 500);
    assert_eq!(node.names.bonus().unwrap(), 1);
    assert_eq!(node.ledger.require(&miner).unwrap().balance, 0);

    // The next block pays base + 1 name bonus and decays the counter.
    let accepted = node.blocks.submit(&meta(), &miner, &[99]).unwrap();
    assert_eq!(accepted.block.value, 26);
    assert_eq!(node.store.name("example").unwrap().unwrap().unpaid, 499);

    // Route a payment through the name.
    let patron = make_v2_address("patron", 't');
    mine(&node, &patron, 2);
    let tx = node
        .transactions
        .send(&meta(), "patron", "donate@example.tst", 10, None)
        .unwrap();
    assert_eq!(tx.to, miner);
    assert_eq!(tx.sent_metaname.as_deref(), Some("donate"));
    assert_eq!(tx.sent_name.as_deref(), Some("example"));

    // Transfer the name away; the new owner receives future routes.
    let heir = make_v2_address("heir", 't');
    node.names
        .transfer(&meta(), "miner", "example", &heir)
        .unwrap();
    let routed = node
        .transactions
        .send(&meta(), "patron", "example.tst", 5, None)
        .unwrap();
    assert_eq!(routed.to, heir);

    // Original owner sticks.
    let row = node.names.get("example").unwrap();
    assert_eq!(row.owner, heir);
    assert_eq!(row.original_owner, miner);
}

// ---------------------------------------------------------------------------
// 3. Staking: deposit, election, lapse, penalty payout
// ---------------------------------------------------------------------------

#[test]
fn staking_lifecycle_with_lapse_penalty() {
    let node = node();
    enable_easy_mining(&node);

    let staker = make_v2_address("staker", 't');
    mine(&node, &staker, 40); // 1000 TST

    // Switch the node to staking mode.
    node.fast.set_production_flags(false, true);

    let row = node.staking.deposit(&meta(), "staker", 400).unwrap();
    assert_eq!(row.balance, 600);
    assert_eq!(row.stake, 400);
    assert!(row.stake_active);

    // Sole active staker: the lottery must elect them.
    let elected = node.staking.run_validator_tick().unwrap();
    assert_eq!(elected, staker);

    // The elected validator produces its block; the election clears and
    // no penalty applies.
    let accepted = node.blocks.submit(&meta(), &staker, &[7]).unwrap();
    assert_eq!(accepted.block.address, staker);
    assert_eq!(node.fast.validator(), "");
    assert_eq!(node.ledger.require(&staker).unwrap().penalty, 0);

    // Re-elect, then lapse: the next tick penalizes.
    node.staking.run_validator_tick().unwrap();
    node.staking.run_validator_tick().unwrap();
    let row = node.ledger.require(&staker).unwrap();
    assert_eq!(row.stake, 0);
    assert_eq!(row.penalty, 400);
    assert!(!row.stake_active);

    // The penalty pays back out through block rewards. Switch back to
    // mining to produce without an election.
    node.fast.set_production_flags(true, false);
    node.fast.set_work(u64::MAX);
    let accepted = node.blocks.submit(&meta(), &staker, &[8]).unwrap();
    assert_eq!(accepted.block.value, 26); // base 25 + 1 penalized address
    assert_eq!(node.ledger.require(&staker).unwrap().penalty, 399);
}

#[test]
fn deposit_withdraw_round_trip_is_neutral() {
    let node = node();
    enable_easy_mining(&node);
    let staker = make_v2_address("staker", 't');
    mine(&node, &staker, 40);
    let before = node.ledger.require(&staker).unwrap();

    node.staking.deposit(&meta(), "staker", 777).unwrap();
    let after = node.staking.withdraw(&meta(), "staker", 777).unwrap();

    assert_eq!(after.balance, before.balance);
    assert_eq!(after.stake, 0);
    assert!(!after.stake_active);

    // Both movements exist as staking-typed ledger rows.
    let (rows, _) = node.transactions.list(2, 0, true, false).unwrap();
    assert_eq!(rows[0].transaction_type(), TransactionType::Staking);
    assert_eq!(rows[1].transaction_type(), TransactionType::Staking);
}

// ---------------------------------------------------------------------------
// 4. Events reach subscribed sessions
// ---------------------------------------------------------------------------

#[test]
fn sessions_observe_the_chain() {
    let node = node();
    enable_easy_mining(&node);
    let miner = make_v2_address("miner", 't');

    // One authenticated session with default subscriptions
    // (blocks + ownTransactions), one guest subscribed to nothing.
    let (_session, mut rx) = node
        .registry
        .connect(Some(miner.clone()), RequestMeta::internal());
    let (guest, mut guest_rx) = node.registry.connect(None, RequestMeta::internal());
    guest.unsubscribe(tessera_protocol::events::EventCategory::Blocks);
    guest.unsubscribe(tessera_protocol::events::EventCategory::OwnTransactions);

    mine(&node, &miner, 1);

    // The miner's session sees the block event and its own reward
    // transaction, in broadcast order.
    let first: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(first["event"], "block");
    assert_eq!(first["block"]["address"], miner.as_str());
    let second: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(second["event"], "transaction");
    assert_eq!(second["transaction"]["type"], "mined");
    assert!(rx.try_recv().is_err());

    // The unsubscribed guest saw nothing.
    assert!(guest_rx.try_recv().is_err());

    // A transfer to someone else does not hit ownTransactions.
    let other = make_v2_address("other", 't');
    let bystander = make_v2_address("bystander", 't');
    mine(&node, &other, 1);
    rx.try_recv().unwrap(); // other's block event (blocks subscription)
    node.transactions
        .send(&meta(), "other", &bystander, 5, None)
        .unwrap();
    assert!(rx.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// 5. Concurrency: racing submissions serialize onto distinct heights
// ---------------------------------------------------------------------------

#[test]
fn concurrent_submissions_serialize() {
    let node = node();
    enable_easy_mining(&node);
    let node = Arc::new(node);

    let miners: Vec<String> = (0..4)
        .map(|i| make_v2_address(&format!("m{i}"), 't'))
        .collect();

    let handles: Vec<_> = miners
        .iter()
        .map(|miner| {
            let node = Arc::clone(&node);
            let miner = miner.clone();
            std::thread::spawn(move || node.blocks.submit(&meta(), &miner, &[42]))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    // Distinct miners hash differently, so with unbounded work all can
    // land; each accepted block must sit at its own height.
    assert!(accepted >= 1);
    let tip = node.blocks.latest().unwrap();
    assert_eq!(tip.id, 1 + accepted as u64);

    // With the threshold floored, further submissions stop at the gate.
    node.fast.set_work(0);
    let err = node
        .blocks
        .submit(&meta(), &miners[0], &[42])
        .unwrap_err();
    assert!(matches!(err, NodeError::SolutionIncorrect));
}

// ---------------------------------------------------------------------------
// 6. The whole-node smoke pass
// ---------------------------------------------------------------------------

#[test]
fn full_node_smoke() {
    let node = node();
    enable_easy_mining(&node);

    let alice = make_v2_address("alice", 't');
    mine(&node, &alice, 25);

    // Addresses surface through the ledger queries.
    let (richest, _) = node.ledger.rich(1, 0).unwrap();
    assert_eq!(richest[0].address, alice);

    // Buy a name, set its record.
    node.names.purchase(&meta(), "alice", "wallet").unwrap();
    node.names
        .update_a_record(&meta(), "alice", "wallet", Some("pay.example.org"))
        .unwrap();
    assert_eq!(
        node.names.get("wallet.tst").unwrap().a.as_deref(),
        Some("pay.example.org")
    );

    // Work surface is live.
    node.fast.sample_work();
    assert_eq!(node.fast.work_over_time().len(), 1);
    let detailed = node.blocks.work_detailed().unwrap();
    assert_eq!(detailed.unpaid, 1);
    assert_eq!(detailed.block_value, detailed.base_value + 1);

    // The auth log recorded mining and auth activity, and pruning a
    // fresh log removes nothing.
    assert_eq!(node.ledger.prune_auth_log().unwrap(), 0);
}
