use fairhand_engine::hand::Outcome;
use fairhand_engine::resolve::resolve_hand;
use fairhand_engine::rules::TableRules;
use fairhand_engine::types::{Address, RequestId, Seed};
use fairhand_web::schema::{HandSettled, HandStarted, RandomFulfilled};
use fairhand_web::{
    capture_test_logs, CachedHand, ChainEvent, EventWatcher, HandCache, HandRecord, HandStore,
    LedgerLog, MemoryLogSource, MemoryStore, PipelineSettings, SubscriptionError, WatcherError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const TABLE: Address = Address([0x7a; 20]);
const PLAYER: Address = Address([0x11; 20]);
const TOKEN: Address = Address([0x22; 20]);
const POLL: Duration = Duration::from_millis(10);
const MAX_POLLS: usize = 3_000;

struct Harness {
    source: MemoryLogSource,
    store: Arc<MemoryStore>,
    watcher: EventWatcher,
}

fn harness() -> Harness {
    let source = MemoryLogSource::new();
    let store = Arc::new(MemoryStore::new());
    let settings = PipelineSettings {
        table_address: TABLE,
        ..Default::default()
    };
    let watcher = EventWatcher::new(
        Arc::new(source.clone()),
        Arc::clone(&store) as Arc<dyn HandStore>,
        Arc::clone(&store) as Arc<dyn HandCache>,
        TableRules::default(),
        settings,
    );
    Harness {
        source,
        store,
        watcher,
    }
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..MAX_POLLS {
        if condition() {
            return;
        }
        tokio::time::sleep(POLL).await;
    }
    panic!("timed out waiting for {what}");
}

async fn wait_for_record(
    store: &MemoryStore,
    hand_id: u64,
    ready: impl Fn(&HandRecord) -> bool,
) -> HandRecord {
    for _ in 0..MAX_POLLS {
        if let Ok(Some(record)) = store.load_hand(hand_id).await {
            if ready(&record) {
                return record;
            }
        }
        tokio::time::sleep(POLL).await;
    }
    panic!("hand {hand_id} never reached the expected state");
}

fn started(hand_id: u64, amount: u128) -> LedgerLog {
    ChainEvent::HandStarted(HandStarted {
        hand_id,
        player: PLAYER,
        token: TOKEN,
        amount,
        request_id: RequestId([0x33; 32]),
        premium: false,
    })
    .to_log(TABLE)
}

fn fulfilled(hand_id: u64, seed: Seed) -> LedgerLog {
    ChainEvent::RandomFulfilled(RandomFulfilled { hand_id, seed }).to_log(TABLE)
}

fn settled(hand_id: u64, pnl: i128, payout_amount: u128) -> LedgerLog {
    ChainEvent::HandSettled(HandSettled {
        hand_id,
        player: PLAYER,
        pnl,
        payout_token: TOKEN,
        payout_amount,
        fee_a: 1,
        fee_b: 2,
        premium: false,
    })
    .to_log(TABLE)
}

async fn subscribed(h: &Harness) {
    let source = h.source.clone();
    wait_until("a live subscription", move || source.active_subscriptions() == 1).await;
}

#[tokio::test(start_paused = true)]
async fn hand_flows_from_start_to_settlement() {
    let mut h = harness();
    h.watcher.start().expect("start");
    subscribed(&h).await;

    let seed = Seed([5; 32]);
    assert_eq!(h.source.publish(started(7, 100)), 1);
    h.source.publish(fulfilled(7, seed));

    let record = wait_for_record(&h.store, 7, |r| r.result.is_some()).await;
    let expected =
        resolve_hand(7, PLAYER, TOKEN, 100, &seed, &TableRules::default()).expect("resolve");
    assert_eq!(record.result.as_ref(), Some(&expected));
    assert_eq!(record.request_id, Some(RequestId([0x33; 32])));
    assert_eq!(
        h.store.get(7).await.expect("cache"),
        Some(CachedHand::Resolved { result: expected })
    );

    h.source.publish(settled(7, 100, 200));
    let record = wait_for_record(&h.store, 7, |r| r.settlement.is_some()).await;
    let settlement = record.settlement.expect("settlement");
    assert_eq!(settlement.outcome, Outcome::Win);
    assert_eq!(settlement.payout_amount, 200);

    let store = Arc::clone(&h.store);
    wait_until("player metrics", move || {
        matches!(store.metrics(&PLAYER), Ok(Some(m)) if m.hands == 1)
    })
    .await;
    assert_eq!(h.store.get(7).await.expect("cache"), None);

    h.watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn resolution_reads_the_store_when_the_cache_is_cold() {
    let mut h = harness();
    h.watcher.start().expect("start");
    subscribed(&h).await;

    h.source.publish(started(8, 50));
    wait_for_record(&h.store, 8, |_| true).await;
    h.store.delete(8).await.expect("evict");

    let seed = Seed([3; 32]);
    h.source.publish(fulfilled(8, seed));
    let record = wait_for_record(&h.store, 8, |r| r.result.is_some()).await;
    let expected =
        resolve_hand(8, PLAYER, TOKEN, 50, &seed, &TableRules::default()).expect("resolve");
    assert_eq!(record.result, Some(expected));

    h.watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn refused_subscription_is_retried_after_the_delay() {
    let mut h = harness();
    h.source
        .refuse_next_subscribe(SubscriptionError::Connect("node offline".into()));
    let began = Instant::now();
    h.watcher.start().expect("start");

    subscribed(&h).await;
    assert_eq!(h.source.subscribe_calls(), 2);
    assert!(began.elapsed() >= Duration::from_secs(5));

    h.source.publish(started(9, 10));
    let record = wait_for_record(&h.store, 9, |_| true).await;
    assert_eq!(record.amount, 10);

    h.watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn broken_stream_resubscribes_and_keeps_routing() {
    let mut h = harness();
    h.watcher.start().expect("start");
    subscribed(&h).await;

    h.source
        .break_subscriptions(SubscriptionError::Transport("connection reset".into()));
    let source = h.source.clone();
    wait_until("a second subscription", move || {
        source.subscribe_calls() == 2 && source.active_subscriptions() == 1
    })
    .await;

    h.source.publish(started(10, 25));
    h.source.publish(fulfilled(10, Seed([18; 32])));
    let record = wait_for_record(&h.store, 10, |r| r.result.is_some()).await;
    assert_eq!(record.result.map(|r| r.outcome), Some(Outcome::Win));

    h.watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_events_are_logged_and_skipped() {
    let (logs, _guard) = capture_test_logs();
    let mut h = harness();
    h.watcher.start().expect("start");
    subscribed(&h).await;

    let mut short = started(11, 10);
    short.data.truncate(64);
    h.source.publish(short);
    h.source.publish(LedgerLog {
        address: TABLE,
        topics: vec![[0xee; 32]],
        data: vec![0; 96],
        block_number: Some(3),
    });
    h.source.publish(started(12, 10));

    wait_for_record(&h.store, 12, |_| true).await;
    let dropped = logs.matching("dropping malformed event");
    assert_eq!(dropped.len(), 2);
    assert!(dropped[0]
        .field("error")
        .is_some_and(|e| e.contains("payload is 64 bytes")));
    assert!(dropped[1]
        .field("error")
        .is_some_and(|e| e.contains("unrecognized event signature")));
    assert_eq!(h.store.load_hand(11).await.expect("load"), None);

    h.watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_result_write_is_retried() {
    let mut h = harness();
    h.store.fail_result_writes(2);
    h.watcher.start().expect("start");
    subscribed(&h).await;

    h.source.publish(started(13, 40));
    h.source.publish(fulfilled(13, Seed([0; 32])));
    wait_for_record(&h.store, 13, |r| r.result.is_some()).await;
    assert_eq!(h.store.result_attempts(), 3);

    h.watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_are_logged_as_errors() {
    let (logs, _guard) = capture_test_logs();
    let mut h = harness();
    h.store.fail_result_writes(3);
    h.watcher.start().expect("start");
    subscribed(&h).await;

    h.source.publish(started(14, 40));
    h.source.publish(fulfilled(14, Seed([0; 32])));
    let probe = logs.clone();
    wait_until("the give-up log line", move || {
        !probe.matching("giving up on hand result write").is_empty()
    })
    .await;

    let record = h.store.load_hand(14).await.expect("load").expect("record");
    assert_eq!(record.result, None);
    assert_eq!(h.store.result_attempts(), 3);
    let entry = &logs.matching("giving up on hand result write")[0];
    assert_eq!(entry.level, tracing::Level::ERROR);

    h.watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn settled_hand_is_not_recached_by_a_late_result() {
    let mut h = harness();
    h.store.fail_result_writes(1);
    h.watcher.start().expect("start");
    subscribed(&h).await;

    h.source.publish(started(40, 20));
    h.source.publish(fulfilled(40, Seed([5; 32])));
    h.source.publish(settled(40, -20, 0));

    let record = wait_for_record(&h.store, 40, |r| {
        r.result.is_some() && r.settlement.is_some()
    })
    .await;
    assert_eq!(h.store.result_attempts(), 2);
    assert_eq!(record.settlement.map(|s| s.outcome), Some(Outcome::Lose));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.store.get(40).await.expect("cache"), None);

    h.watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn slow_result_write_does_not_hold_up_new_events() {
    let mut h = harness();
    h.store.fail_result_writes(1);
    h.watcher.start().expect("start");
    subscribed(&h).await;

    h.source.publish(started(41, 20));
    h.source.publish(fulfilled(41, Seed([5; 32])));
    let store = Arc::clone(&h.store);
    wait_until("the first failed write", move || store.result_attempts() == 1).await;

    let began = Instant::now();
    h.source.publish(started(42, 30));
    let record = wait_for_record(&h.store, 42, |_| true).await;
    assert_eq!(record.amount, 30);
    assert!(began.elapsed() < PipelineSettings::default().persist_backoff);
    let first = h.store.load_hand(41).await.expect("load").expect("record");
    assert_eq!(first.result, None);

    wait_for_record(&h.store, 41, |r| r.result.is_some()).await;
    assert_eq!(h.store.result_attempts(), 2);

    h.watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unsaved_start_still_resolves_from_the_cache() {
    let mut h = harness();
    h.store.fail_hand_starts(1);
    h.watcher.start().expect("start");
    subscribed(&h).await;

    h.source.publish(started(15, 70));
    let store = Arc::clone(&h.store);
    wait_until("the pending cache entry", move || {
        store.cached_hands().unwrap_or(0) == 1
    })
    .await;
    h.source.publish(fulfilled(15, Seed([5; 32])));

    let record = wait_for_record(&h.store, 15, |r| r.result.is_some()).await;
    assert_eq!(record.request_id, None);
    assert_eq!(record.amount, 70);

    h.watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn randomness_for_an_unknown_hand_is_ignored() {
    let (logs, _guard) = capture_test_logs();
    let mut h = harness();
    h.watcher.start().expect("start");
    subscribed(&h).await;

    h.source.publish(fulfilled(99, Seed([1; 32])));
    h.source.publish(started(16, 10));
    wait_for_record(&h.store, 16, |_| true).await;

    assert_eq!(h.store.load_hand(99).await.expect("load"), None);
    let warned = logs.matching("randomness for unknown hand");
    assert_eq!(warned.len(), 1);
    assert_eq!(warned[0].field("hand_id"), Some("99"));

    h.watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn settlement_sign_decides_the_recorded_outcome() {
    let mut h = harness();
    h.watcher.start().expect("start");
    subscribed(&h).await;

    for (hand_id, pnl, payout, outcome) in [
        (20, -30, 0, Outcome::Lose),
        (21, 0, 30, Outcome::Push),
        (22, 45, 75, Outcome::Win),
    ] {
        h.source.publish(started(hand_id, 30));
        h.source.publish(settled(hand_id, pnl, payout));
        let record = wait_for_record(&h.store, hand_id, |r| r.settlement.is_some()).await;
        let settlement = record.settlement.expect("settlement");
        assert_eq!(settlement.outcome, outcome);
        assert_eq!(settlement.pnl, pnl);
    }

    let store = Arc::clone(&h.store);
    wait_until("metrics over three hands", move || {
        matches!(store.metrics(&PLAYER), Ok(Some(m)) if m.hands == 3)
    })
    .await;
    let metrics = h.store.metrics(&PLAYER).expect("read").expect("metrics");
    assert_eq!((metrics.wins, metrics.losses, metrics.pushes), (1, 1, 1));
    assert_eq!(metrics.net_pnl, 15);

    h.watcher.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_the_loop_and_closes_the_source() {
    let mut h = harness();
    h.watcher.start().expect("start");
    assert_eq!(h.watcher.start(), Err(WatcherError::AlreadyRunning));
    subscribed(&h).await;

    h.watcher.stop().await;
    assert!(!h.watcher.is_running());
    assert!(h.source.is_closed());
    assert_eq!(h.source.active_subscriptions(), 0);
    assert_eq!(h.source.publish(started(30, 1)), 0);

    assert_eq!(h.watcher.start(), Err(WatcherError::Stopped));
    assert!(!h.watcher.is_running());
    assert_eq!(h.source.subscribe_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_the_resubscribe_wait() {
    let mut h = harness();
    h.source
        .refuse_next_subscribe(SubscriptionError::Connect("node offline".into()));
    h.watcher.start().expect("start");
    let source = h.source.clone();
    wait_until("the first attempt", move || source.subscribe_calls() == 1).await;

    let began = Instant::now();
    h.watcher.stop().await;
    assert!(began.elapsed() < Duration::from_secs(5));
    assert!(h.source.is_closed());
    assert_eq!(h.source.subscribe_calls(), 1);
}
