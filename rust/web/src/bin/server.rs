//! Table server: HTTP adapter plus the event watcher.
//!
//! Usage: cargo run -p fairhand_web --bin fairhand-server
//!
//! Configuration comes from the environment (`HOST`, `PORT`, `TABLE_ADDRESS`,
//! `RPC_URL`, `WS_RPC_URL`, `RUST_LOG`, `LOG_FORMAT`).

use fairhand_engine::engine::TableEngine;
use fairhand_web::{
    init_logging, AppContext, AppSettings, EventWatcher, HandStore, LogFormat, MemoryLogSource,
    MemoryStore, ServerConfig, WebServer,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LogFormat::from_env())?;

    let settings = AppSettings::from_env()?;
    tracing::info!(
        host = %settings.host,
        port = settings.port,
        table = %settings.pipeline.table_address,
        decks = settings.rules.num_decks,
        "starting fairhand server"
    );

    let engine = Arc::new(TableEngine::new(settings.rules.clone())?);
    let store = Arc::new(MemoryStore::new());
    // No ledger client is linked in; the in-process source stays idle until fed.
    let source = Arc::new(MemoryLogSource::new());

    let mut watcher = EventWatcher::new(
        source,
        Arc::clone(&store) as Arc<dyn HandStore>,
        store.clone(),
        settings.rules.clone(),
        settings.pipeline.clone(),
    );
    watcher.start()?;

    let context = AppContext::new_with_dependencies(
        ServerConfig::new(settings.host.clone(), settings.port),
        engine,
        store,
    );
    let handle = WebServer::from_context(context).start().await?;
    println!("Fairhand server running on http://{}", handle.address());
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    watcher.stop().await;
    handle.shutdown().await?;
    Ok(())
}
