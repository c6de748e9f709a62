//! Durable hand records and the short-lived hand cache.
//!
//! Both are traits so a SQL database or a networked cache can be dropped in;
//! [`MemoryStore`] implements both in-process and can inject write failures.

use crate::schema::HandSettled;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fairhand_engine::hand::Outcome;
use fairhand_engine::resolve::HandResult;
use fairhand_engine::types::{amount_str, Address, Amount, HandId, RequestId, Seed};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Hands considered when recomputing player metrics.
pub const METRICS_WINDOW: usize = 100;

/// What the pipeline knows about a hand once it has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandMeta {
    pub hand_id: HandId,
    pub player: Address,
    pub token: Address,
    #[serde(with = "amount_str")]
    pub amount: Amount,
    pub request_id: RequestId,
    #[serde(default)]
    pub premium: bool,
    pub created_at: DateTime<Utc>,
}

/// Cache entry, tagged by how far the hand has progressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CachedHand {
    PendingRandomness { hand: HandMeta },
    RandomnessFulfilled { hand: HandMeta, seed: Seed },
    Resolved { result: HandResult },
}

impl CachedHand {
    pub fn status(&self) -> &'static str {
        match self {
            CachedHand::PendingRandomness { .. } => "pending_randomness",
            CachedHand::RandomnessFulfilled { .. } => "randomness_fulfilled",
            CachedHand::Resolved { .. } => "resolved",
        }
    }

    pub fn hand(&self) -> Option<&HandMeta> {
        match self {
            CachedHand::PendingRandomness { hand }
            | CachedHand::RandomnessFulfilled { hand, .. } => Some(hand),
            CachedHand::Resolved { .. } => None,
        }
    }
}

/// On-ledger settlement of a hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub outcome: Outcome,
    #[serde(with = "signed_str")]
    pub pnl: i128,
    pub payout_token: Address,
    #[serde(with = "amount_str")]
    pub payout_amount: Amount,
    #[serde(with = "amount_str")]
    pub fee_a: Amount,
    #[serde(with = "amount_str")]
    pub fee_b: Amount,
    pub settled_at: DateTime<Utc>,
}

impl Settlement {
    /// Positive profit is a win, zero a push, negative a loss.
    pub fn from_event(event: &HandSettled) -> Self {
        let outcome = match event.pnl {
            pnl if pnl > 0 => Outcome::Win,
            0 => Outcome::Push,
            _ => Outcome::Lose,
        };
        Self {
            outcome,
            pnl: event.pnl,
            payout_token: event.payout_token,
            payout_amount: event.payout_amount,
            fee_a: event.fee_a,
            fee_b: event.fee_b,
            settled_at: Utc::now(),
        }
    }
}

/// Stored hand with whatever stages have completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandRecord {
    pub hand_id: HandId,
    pub player: Address,
    pub token: Address,
    #[serde(with = "amount_str")]
    pub amount: Amount,
    /// Absent when the start event was never persisted.
    pub request_id: Option<RequestId>,
    pub premium: bool,
    pub created_at: DateTime<Utc>,
    pub result: Option<HandResult>,
    pub settlement: Option<Settlement>,
}

impl HandRecord {
    pub fn meta(&self) -> Option<HandMeta> {
        Some(HandMeta {
            hand_id: self.hand_id,
            player: self.player,
            token: self.token,
            amount: self.amount,
            request_id: self.request_id?,
            premium: self.premium,
            created_at: self.created_at,
        })
    }
}

impl From<&HandMeta> for HandRecord {
    fn from(hand: &HandMeta) -> Self {
        Self {
            hand_id: hand.hand_id,
            player: hand.player,
            token: hand.token,
            amount: hand.amount,
            request_id: Some(hand.request_id),
            premium: hand.premium,
            created_at: hand.created_at,
            result: None,
            settlement: None,
        }
    }
}

/// Rolling performance over a player's most recent settled hands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMetrics {
    pub player: Address,
    pub hands: usize,
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    #[serde(with = "signed_str")]
    pub net_pnl: i128,
    #[serde(with = "amount_str")]
    pub avg_bet: Amount,
    /// Net result per 100 units wagered, in basis points of the average bet.
    pub ev_per_100: f64,
    /// Win percentage.
    pub skill_score: f64,
    pub updated_at: DateTime<Utc>,
}

impl PlayerMetrics {
    /// Metrics over `hands`, each a (wager, settlement) pair.
    pub fn compute<'a, I>(player: Address, hands: I) -> Self
    where
        I: IntoIterator<Item = (Amount, &'a Settlement)>,
    {
        let mut metrics = PlayerMetrics {
            player,
            hands: 0,
            wins: 0,
            losses: 0,
            pushes: 0,
            net_pnl: 0,
            avg_bet: 0,
            ev_per_100: 0.0,
            skill_score: 0.0,
            updated_at: Utc::now(),
        };
        let mut wagered: Amount = 0;
        for (amount, settlement) in hands {
            metrics.hands += 1;
            match settlement.outcome {
                Outcome::Win => metrics.wins += 1,
                Outcome::Lose => metrics.losses += 1,
                Outcome::Push => metrics.pushes += 1,
            }
            let net = signed(settlement.payout_amount).saturating_sub(signed(amount));
            metrics.net_pnl = metrics.net_pnl.saturating_add(net);
            wagered = wagered.saturating_add(amount);
        }
        if metrics.hands == 0 {
            return metrics;
        }
        metrics.avg_bet = wagered / metrics.hands as u128;
        if wagered > 0 {
            metrics.ev_per_100 = metrics.net_pnl as f64 / wagered as f64 * 10_000.0;
        }
        metrics.skill_score = metrics.wins as f64 / metrics.hands as f64 * 100.0;
        metrics
    }
}

fn signed(amount: Amount) -> i128 {
    i128::try_from(amount).unwrap_or(i128::MAX)
}

/// Signed amounts as decimal strings.
pub mod signed_str {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &i128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i128, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("hand {0} not found")]
    UnknownHand(HandId),
    #[error("storage lock poisoned")]
    StoragePoisoned,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable hand storage.
#[async_trait]
pub trait HandStore: Send + Sync {
    async fn save_hand_start(&self, hand: &HandMeta) -> Result<(), StoreError>;

    async fn load_hand(&self, hand_id: HandId) -> Result<Option<HandRecord>, StoreError>;

    /// Writes a computed result, creating the record if the start was never saved.
    async fn save_hand_result(&self, result: &HandResult) -> Result<(), StoreError>;

    async fn update_hand_settlement(
        &self,
        hand_id: HandId,
        settlement: &Settlement,
    ) -> Result<(), StoreError>;

    async fn recompute_metrics(&self, player: Address) -> Result<PlayerMetrics, StoreError>;
}

/// Expiring per-hand cache.
#[async_trait]
pub trait HandCache: Send + Sync {
    async fn get(&self, hand_id: HandId) -> Result<Option<CachedHand>, StoreError>;

    async fn set(
        &self,
        hand_id: HandId,
        entry: CachedHand,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Replaces a live entry and restarts its TTL. Returns false when absent.
    async fn update(
        &self,
        hand_id: HandId,
        entry: CachedHand,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, hand_id: HandId) -> Result<(), StoreError>;
}

/// In-process store and cache.
#[derive(Debug, Default)]
pub struct MemoryStore {
    hands: RwLock<BTreeMap<HandId, HandRecord>>,
    /// Each player's latest settled hand ids, oldest first, capped at the
    /// metrics window.
    settled: RwLock<HashMap<Address, VecDeque<HandId>>>,
    metrics: RwLock<HashMap<Address, PlayerMetrics>>,
    cache: RwLock<HashMap<HandId, (CachedHand, Instant)>>,
    failing_starts: AtomicUsize,
    failing_results: AtomicUsize,
    result_attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` hand-start writes.
    pub fn fail_hand_starts(&self, count: usize) {
        self.failing_starts.store(count, Ordering::Release);
    }

    /// Fails the next `count` result writes.
    pub fn fail_result_writes(&self, count: usize) {
        self.failing_results.store(count, Ordering::Release);
    }

    /// Result writes attempted so far, failed ones included.
    pub fn result_attempts(&self) -> usize {
        self.result_attempts.load(Ordering::Acquire)
    }

    pub fn metrics(&self, player: &Address) -> Result<Option<PlayerMetrics>, StoreError> {
        let metrics = self
            .metrics
            .read()
            .map_err(|_| StoreError::StoragePoisoned)?;
        Ok(metrics.get(player).cloned())
    }

    /// Live cache entries.
    pub fn cached_hands(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let cache = self.cache.read().map_err(|_| StoreError::StoragePoisoned)?;
        Ok(cache.values().filter(|(_, expires)| *expires > now).count())
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl HandStore for MemoryStore {
    async fn save_hand_start(&self, hand: &HandMeta) -> Result<(), StoreError> {
        if Self::take_failure(&self.failing_starts) {
            return Err(StoreError::Unavailable("hand start write refused".to_string()));
        }
        let mut hands = self.hands.write().map_err(|_| StoreError::StoragePoisoned)?;
        hands
            .entry(hand.hand_id)
            .and_modify(|record| record.request_id = Some(hand.request_id))
            .or_insert_with(|| HandRecord::from(hand));
        Ok(())
    }

    async fn load_hand(&self, hand_id: HandId) -> Result<Option<HandRecord>, StoreError> {
        let hands = self.hands.read().map_err(|_| StoreError::StoragePoisoned)?;
        Ok(hands.get(&hand_id).cloned())
    }

    async fn save_hand_result(&self, result: &HandResult) -> Result<(), StoreError> {
        self.result_attempts.fetch_add(1, Ordering::AcqRel);
        if Self::take_failure(&self.failing_results) {
            return Err(StoreError::Unavailable("result write refused".to_string()));
        }
        let mut hands = self.hands.write().map_err(|_| StoreError::StoragePoisoned)?;
        let record = hands.entry(result.hand_id).or_insert_with(|| HandRecord {
            hand_id: result.hand_id,
            player: result.player,
            token: result.token,
            amount: result.amount,
            request_id: None,
            premium: false,
            created_at: Utc::now(),
            result: None,
            settlement: None,
        });
        record.result = Some(result.clone());
        Ok(())
    }

    async fn update_hand_settlement(
        &self,
        hand_id: HandId,
        settlement: &Settlement,
    ) -> Result<(), StoreError> {
        let mut hands = self.hands.write().map_err(|_| StoreError::StoragePoisoned)?;
        let record = hands
            .get_mut(&hand_id)
            .ok_or(StoreError::UnknownHand(hand_id))?;
        let first = record.settlement.is_none();
        let player = record.player;
        record.settlement = Some(settlement.clone());
        drop(hands);

        if first {
            let mut settled = self.settled.write().map_err(|_| StoreError::StoragePoisoned)?;
            let recent = settled.entry(player).or_default();
            recent.push_back(hand_id);
            if recent.len() > METRICS_WINDOW {
                recent.pop_front();
            }
        }
        Ok(())
    }

    async fn recompute_metrics(&self, player: Address) -> Result<PlayerMetrics, StoreError> {
        let computed = {
            let hands = self.hands.read().map_err(|_| StoreError::StoragePoisoned)?;
            let settled = self.settled.read().map_err(|_| StoreError::StoragePoisoned)?;
            let recent = settled
                .get(&player)
                .into_iter()
                .flat_map(|ids| ids.iter().rev())
                .filter_map(|id| hands.get(id))
                .filter_map(|record| Some((record.amount, record.settlement.as_ref()?)));
            PlayerMetrics::compute(player, recent)
        };
        self.metrics
            .write()
            .map_err(|_| StoreError::StoragePoisoned)?
            .insert(player, computed.clone());
        Ok(computed)
    }
}

#[async_trait]
impl HandCache for MemoryStore {
    async fn get(&self, hand_id: HandId) -> Result<Option<CachedHand>, StoreError> {
        let cache = self.cache.read().map_err(|_| StoreError::StoragePoisoned)?;
        Ok(cache
            .get(&hand_id)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(entry, _)| entry.clone()))
    }

    async fn set(
        &self,
        hand_id: HandId,
        entry: CachedHand,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut cache = self.cache.write().map_err(|_| StoreError::StoragePoisoned)?;
        cache.retain(|_, (_, expires)| *expires > now);
        cache.insert(hand_id, (entry, now + ttl));
        Ok(())
    }

    async fn update(
        &self,
        hand_id: HandId,
        entry: CachedHand,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut cache = self.cache.write().map_err(|_| StoreError::StoragePoisoned)?;
        match cache.get_mut(&hand_id) {
            Some(slot) if slot.1 > now => {
                *slot = (entry, now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, hand_id: HandId) -> Result<(), StoreError> {
        let mut cache = self.cache.write().map_err(|_| StoreError::StoragePoisoned)?;
        cache.remove(&hand_id);
        Ok(())
    }
}
