//! Subscription contract for the remote ledger's event log, plus an
//! in-process source used by tests and by the server when no node is wired in.

use async_trait::async_trait;
use fairhand_engine::types::Address;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc;

const LOG_CHANNEL_BUFFER: usize = 1024;

/// One 32-byte ABI word.
pub type Word = [u8; 32];

/// Raw log entry: indexed topics plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerLog {
    pub address: Address,
    pub topics: Vec<Word>,
    pub data: Vec<u8>,
    pub block_number: Option<u64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("failed to subscribe: {0}")]
    Connect(String),
    #[error("subscription transport error: {0}")]
    Transport(String),
    #[error("log source closed")]
    Closed,
}

pub type LogItem = Result<LedgerLog, SubscriptionError>;

/// Live feed of log entries. Dropping it ends the subscription.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<LogItem>,
}

impl Subscription {
    pub fn new(receiver: mpsc::Receiver<LogItem>) -> Self {
        Self { receiver }
    }

    pub fn channel() -> (mpsc::Sender<LogItem>, Subscription) {
        let (tx, rx) = mpsc::channel(LOG_CHANNEL_BUFFER);
        (tx, Subscription::new(rx))
    }

    /// Next entry or transport error; `None` once the source hung up.
    pub async fn next(&mut self) -> Option<LogItem> {
        self.receiver.recv().await
    }
}

/// A source of contract logs, keyed by contract address.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn subscribe(&self, address: Address) -> Result<Subscription, SubscriptionError>;

    /// Releases the underlying connection.
    async fn close(&self);
}

/// Log source backed by in-process channels.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSource {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    subscribers: Mutex<Vec<(Address, mpsc::Sender<LogItem>)>>,
    refusals: Mutex<VecDeque<SubscriptionError>>,
    subscribe_calls: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryLogSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<(Address, mpsc::Sender<LogItem>)>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Delivers `log` to every live subscription on its address. Returns how
    /// many subscriptions received it.
    pub fn publish(&self, log: LedgerLog) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|(_, tx)| !tx.is_closed());
        let mut delivered = 0;
        for (address, tx) in subscribers.iter() {
            if *address != log.address {
                continue;
            }
            match tx.try_send(Ok(log.clone())) {
                Ok(()) => delivered += 1,
                Err(err) => tracing::warn!(error = %err, "dropping log for slow subscriber"),
            }
        }
        delivered
    }

    /// Breaks every live subscription with `error`, as a dropped socket would.
    pub fn break_subscriptions(&self, error: SubscriptionError) {
        let subscribers = std::mem::take(&mut *self.subscribers());
        for (_, tx) in subscribers {
            let _ = tx.try_send(Err(error.clone()));
        }
    }

    /// Makes the next subscribe attempt fail with `error`.
    pub fn refuse_next_subscribe(&self, error: SubscriptionError) {
        self.inner
            .refusals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(error);
    }

    pub fn subscribe_calls(&self) -> usize {
        self.inner.subscribe_calls.load(Ordering::Acquire)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscribers()
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl LogSource for MemoryLogSource {
    async fn subscribe(&self, address: Address) -> Result<Subscription, SubscriptionError> {
        self.inner.subscribe_calls.fetch_add(1, Ordering::AcqRel);
        if self.is_closed() {
            return Err(SubscriptionError::Closed);
        }
        let refusal = self
            .inner
            .refusals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        if let Some(error) = refusal {
            return Err(error);
        }

        let (tx, subscription) = Subscription::channel();
        self.subscribers().push((address, tx));
        tracing::debug!(%address, "log subscription opened");
        Ok(subscription)
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.subscribers().clear();
        tracing::debug!("log source closed");
    }
}
