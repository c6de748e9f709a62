//! Async side of the fair-hand table: the event pipeline that follows the
//! table contract's log and resolves hands once randomness arrives, plus a
//! thin HTTP adapter over the interactive table session.

pub mod errors;
pub mod handlers;
pub mod ledger;
pub mod logging;
pub mod schema;
pub mod server;
pub mod settings;
pub mod store;
pub mod watcher;

pub use errors::{ErrorResponse, ErrorSeverity, IntoErrorResponse};
pub use ledger::{LedgerLog, LogSource, MemoryLogSource, Subscription, SubscriptionError};
pub use logging::{capture_test_logs, init_logging, LogEntry, LogFormat, TestLogSubscriber};
pub use schema::{decode_log, ChainEvent, EventKind, MalformedEvent};
pub use server::{AppContext, ServerConfig, ServerError, ServerHandle, WebServer};
pub use settings::{AppSettings, PipelineSettings, SettingsError};
pub use store::{
    CachedHand, HandCache, HandMeta, HandRecord, HandStore, MemoryStore, PlayerMetrics,
    Settlement, StoreError,
};
pub use watcher::{EventWatcher, WatcherError};
