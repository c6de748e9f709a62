//! Long-lived consumer of the table contract's event log.
//!
//! The loop decodes and dispatches each entry inline. Hand resolution and
//! metrics recomputation run as separate tasks in a [`JoinSet`] so slow
//! storage never stalls consumption. Transport failures end the current
//! subscription only; the loop waits `resubscribe_delay` and tries again.

use crate::ledger::{LedgerLog, LogSource};
use crate::schema::{decode_log, ChainEvent, HandSettled, HandStarted, RandomFulfilled};
use crate::settings::PipelineSettings;
use crate::store::{CachedHand, HandCache, HandMeta, HandStore, Settlement, StoreError};
use chrono::Utc;
use fairhand_engine::resolve::{resolve_hand, HandResult};
use fairhand_engine::rules::TableRules;
use fairhand_engine::types::{HandId, Seed};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WatcherError {
    #[error("watcher is already running")]
    AlreadyRunning,
    #[error("watcher was stopped and its log source closed")]
    Stopped,
}

/// Everything a dispatched event needs, shared with spawned tasks.
struct Pipeline {
    source: Arc<dyn LogSource>,
    store: Arc<dyn HandStore>,
    cache: Arc<dyn HandCache>,
    rules: TableRules,
    settings: PipelineSettings,
}

pub struct EventWatcher {
    pipeline: Arc<Pipeline>,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    stopped: bool,
}

impl EventWatcher {
    pub fn new(
        source: Arc<dyn LogSource>,
        store: Arc<dyn HandStore>,
        cache: Arc<dyn HandCache>,
        rules: TableRules,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                source,
                store,
                cache,
                rules,
                settings,
            }),
            stop_tx: None,
            task: None,
            stopped: false,
        }
    }

    /// Spawns the consumption loop on the current runtime. A watcher cannot
    /// be restarted once [`stop`](Self::stop) has closed its log source.
    pub fn start(&mut self) -> Result<(), WatcherError> {
        if self.stopped {
            return Err(WatcherError::Stopped);
        }
        if self.is_running() {
            return Err(WatcherError::AlreadyRunning);
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let pipeline = Arc::clone(&self.pipeline);
        self.task = Some(tokio::spawn(pipeline.run(stop_rx)));
        self.stop_tx = Some(stop_tx);
        info!(
            table = %self.pipeline.settings.table_address,
            ws_url = %self.pipeline.settings.ws_url,
            "event watcher started"
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signals the loop, waits for it and its in-flight tasks to finish, and
    /// only returns after the log source has been closed.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(task) = self.task.take() {
            self.stopped = true;
            if let Err(err) = task.await {
                error!(error = %err, "event watcher loop panicked");
                self.pipeline.source.close().await;
            }
        }
        info!("event watcher stopped");
    }
}

impl Pipeline {
    async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let address = self.settings.table_address;
        let delay = self.settings.resubscribe_delay;
        let mut tasks = JoinSet::new();

        'watch: loop {
            if *stop.borrow() {
                break;
            }
            let subscribed = tokio::select! {
                _ = stop.changed() => break 'watch,
                result = self.source.subscribe(address) => result,
            };

            match subscribed {
                Ok(mut subscription) => {
                    info!(table = %address, "subscribed to table events");
                    let reason = loop {
                        tokio::select! {
                            _ = stop.changed() => break 'watch,
                            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                                reap(joined)
                            }
                            item = subscription.next() => match item {
                                Some(Ok(log)) => self.dispatch(log, &mut tasks).await,
                                Some(Err(err)) => break err.to_string(),
                                None => break "subscription ended".to_string(),
                            },
                        }
                    };
                    warn!(
                        reason = %reason,
                        delay_ms = delay.as_millis() as u64,
                        "log subscription lost, resubscribing"
                    );
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "log subscription failed, retrying"
                    );
                }
            }

            tokio::select! {
                _ = stop.changed() => break 'watch,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        while let Some(joined) = tasks.join_next().await {
            reap(joined);
        }
        self.source.close().await;
        debug!("event loop exited");
    }

    async fn dispatch(self: &Arc<Self>, log: LedgerLog, tasks: &mut JoinSet<()>) {
        let event = match decode_log(&log) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, block = ?log.block_number, "dropping malformed event");
                return;
            }
        };
        debug!(hand_id = event.hand_id(), event = %event.kind(), "event received");

        match event {
            ChainEvent::HandStarted(started) => self.on_hand_started(started).await,
            ChainEvent::RandomFulfilled(fulfilled) => {
                self.on_random_fulfilled(fulfilled, tasks).await
            }
            ChainEvent::HandSettled(settled) => self.on_hand_settled(settled, tasks).await,
        }
    }

    async fn on_hand_started(&self, started: HandStarted) {
        let hand = HandMeta {
            hand_id: started.hand_id,
            player: started.player,
            token: started.token,
            amount: started.amount,
            request_id: started.request_id,
            premium: started.premium,
            created_at: Utc::now(),
        };
        info!(
            hand_id = hand.hand_id,
            player = %hand.player,
            amount = %hand.amount,
            premium = hand.premium,
            "hand started"
        );

        // The cache entry is still written so resolution can proceed.
        if let Err(err) = self.store.save_hand_start(&hand).await {
            error!(hand_id = hand.hand_id, error = %err, "failed to persist hand start");
        }
        let hand_id = hand.hand_id;
        let entry = CachedHand::PendingRandomness { hand };
        if let Err(err) = self.cache.set(hand_id, entry, self.settings.pending_ttl).await {
            warn!(hand_id, error = %err, "failed to cache pending hand");
        }
    }

    async fn on_random_fulfilled(
        self: &Arc<Self>,
        fulfilled: RandomFulfilled,
        tasks: &mut JoinSet<()>,
    ) {
        let hand_id = fulfilled.hand_id;
        let Some(hand) = self.pending_hand(hand_id).await else {
            return;
        };
        info!(hand_id, seed = %fulfilled.seed, "randomness fulfilled");

        let entry = CachedHand::RandomnessFulfilled {
            hand: hand.clone(),
            seed: fulfilled.seed,
        };
        match self.cache.update(hand_id, entry.clone(), self.settings.pending_ttl).await {
            Ok(true) => {}
            Ok(false) => {
                if let Err(err) = self.cache.set(hand_id, entry, self.settings.pending_ttl).await {
                    warn!(hand_id, error = %err, "failed to cache fulfilled hand");
                }
            }
            Err(err) => warn!(hand_id, error = %err, "failed to update cached hand"),
        }

        let pipeline = Arc::clone(self);
        tasks.spawn(async move { pipeline.resolve(hand, fulfilled.seed).await });
    }

    /// Hand awaiting resolution, from the cache or else the durable record.
    async fn pending_hand(&self, hand_id: HandId) -> Option<HandMeta> {
        match self.cache.get(hand_id).await {
            Ok(Some(CachedHand::Resolved { .. })) => {
                debug!(hand_id, "hand already resolved, ignoring randomness");
                return None;
            }
            Ok(Some(cached)) => return cached.hand().cloned(),
            Ok(None) => {}
            Err(err) => warn!(hand_id, error = %err, "hand cache unavailable"),
        }

        match self.store.load_hand(hand_id).await {
            Ok(Some(record)) if record.result.is_some() => {
                debug!(hand_id, "hand already resolved, ignoring randomness");
                None
            }
            Ok(Some(record)) => record.meta(),
            Ok(None) => {
                warn!(hand_id, "randomness for unknown hand");
                None
            }
            Err(err) => {
                error!(hand_id, error = %err, "failed to load hand");
                None
            }
        }
    }

    async fn resolve(&self, hand: HandMeta, seed: Seed) {
        let hand_id = hand.hand_id;
        let result = match resolve_hand(
            hand_id,
            hand.player,
            hand.token,
            hand.amount,
            &seed,
            &self.rules,
        ) {
            Ok(result) => result,
            Err(err) => {
                error!(hand_id, error = %err, "hand resolution failed");
                return;
            }
        };
        info!(
            hand_id,
            outcome = %result.outcome,
            payout = %result.payout,
            "hand resolved"
        );

        if let Err(err) = self.persist(&result).await {
            error!(
                hand_id,
                attempts = self.settings.persist_attempts,
                error = %err,
                "giving up on hand result write"
            );
            return;
        }
        // Only replaces a live entry. Settlement may already have evicted it.
        let entry = CachedHand::Resolved { result };
        match self.cache.update(hand_id, entry, self.settings.resolved_ttl).await {
            Ok(true) => {}
            Ok(false) => debug!(hand_id, "hand left the cache before resolving"),
            Err(err) => warn!(hand_id, error = %err, "failed to cache resolved hand"),
        }
    }

    /// Bounded retry with linear backoff. Resolution is pure, so rewriting
    /// the same result is safe.
    async fn persist(&self, result: &HandResult) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            match self.store.save_hand_result(result).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.settings.persist_attempts => {
                    warn!(
                        hand_id = result.hand_id,
                        attempt,
                        error = %err,
                        "hand result write failed, retrying"
                    );
                    tokio::time::sleep(self.settings.persist_backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn on_hand_settled(&self, settled: HandSettled, tasks: &mut JoinSet<()>) {
        let hand_id = settled.hand_id;
        let settlement = Settlement::from_event(&settled);
        info!(
            hand_id,
            player = %settled.player,
            outcome = %settlement.outcome,
            pnl = %settlement.pnl,
            "hand settled"
        );

        if let Err(err) = self.store.update_hand_settlement(hand_id, &settlement).await {
            error!(hand_id, error = %err, "failed to persist settlement");
        }

        let store = Arc::clone(&self.store);
        let player = settled.player;
        tasks.spawn(async move {
            match store.recompute_metrics(player).await {
                Ok(metrics) => debug!(
                    player = %player,
                    hands = metrics.hands,
                    ev_per_100 = metrics.ev_per_100,
                    "player metrics updated"
                ),
                Err(err) => warn!(player = %player, error = %err, "metrics recomputation failed"),
            }
        });

        if let Err(err) = self.cache.delete(hand_id).await {
            warn!(hand_id, error = %err, "failed to evict cached hand");
        }
    }
}

fn reap(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        error!(error = %err, "pipeline task failed");
    }
}
