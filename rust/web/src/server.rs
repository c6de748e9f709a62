use crate::handlers;
use crate::store::{HandStore, MemoryStore};
use fairhand_engine::engine::TableEngine;
use fairhand_engine::errors::GameError;
use fairhand_engine::rules::TableRules;
use fairhand_engine::types::HandId;
use std::convert::Infallible;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;
use warp::filters::BoxedFilter;
use warp::reply::{Reply, Response};
use warp::Filter;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    host: String,
    port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn for_tests() -> Self {
        Self::new("127.0.0.1", 0)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Shared components handed to every route.
#[derive(Clone)]
pub struct AppContext {
    config: ServerConfig,
    engine: Arc<TableEngine>,
    store: Arc<dyn HandStore>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("rules", self.engine.rules())
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn new(config: ServerConfig, rules: TableRules) -> Result<Self, ServerError> {
        let engine = Arc::new(TableEngine::new(rules)?);
        let store: Arc<dyn HandStore> = Arc::new(MemoryStore::new());
        Ok(Self::new_with_dependencies(config, engine, store))
    }

    pub fn new_with_dependencies(
        config: ServerConfig,
        engine: Arc<TableEngine>,
        store: Arc<dyn HandStore>,
    ) -> Self {
        Self {
            config,
            engine,
            store,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn engine(&self) -> Arc<TableEngine> {
        Arc::clone(&self.engine)
    }

    pub fn store(&self) -> Arc<dyn HandStore> {
        Arc::clone(&self.store)
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Engine error: {0}")]
    EngineError(#[from] GameError),
}

#[derive(Debug, Clone)]
pub struct WebServer {
    context: AppContext,
}

impl WebServer {
    pub fn new(config: ServerConfig, rules: TableRules) -> Result<Self, ServerError> {
        let context = AppContext::new(config, rules)?;
        Ok(Self { context })
    }

    pub fn from_context(context: AppContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let WebServer { context } = self;
        let bind_addr = Self::bind_addr(context.config())?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let routes = Self::routes(&context);
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
        };

        let (addr, server_future) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(bind_addr, shutdown_signal)
            .map_err(Self::map_warp_error)?;

        info!(%addr, "web server listening");

        let task = tokio::spawn(async move {
            server_future.await;
            Ok(())
        });

        Ok(ServerHandle::new(addr, shutdown_tx, task, context))
    }

    fn bind_addr(config: &ServerConfig) -> Result<SocketAddr, ServerError> {
        let host = config.host();

        if let Ok(addr) = host.parse::<SocketAddr>() {
            return Ok(addr);
        }

        if let Ok(ip) = host.parse::<std::net::IpAddr>() {
            return Ok(SocketAddr::new(ip, config.port()));
        }

        let candidate = format!("{}:{}", host, config.port());
        let mut addrs = candidate.to_socket_addrs().map_err(|err| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`: {err}"))
        })?;

        addrs.next().ok_or_else(|| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`"))
        })
    }

    fn map_warp_error(err: warp::Error) -> ServerError {
        use std::error::Error as StdError;

        if let Some(source) = err.source() {
            if let Some(io_err) = source.downcast_ref::<std::io::Error>() {
                let recreated = std::io::Error::new(io_err.kind(), io_err.to_string());
                return ServerError::BindError(recreated);
            }
        }

        ServerError::ConfigError(err.to_string())
    }

    /// Every route the server exposes, without binding a socket.
    pub fn routes(context: &AppContext) -> BoxedFilter<(Response,)> {
        Self::health_route()
            .or(Self::engine_routes(context))
            .unify()
            .or(Self::hand_routes(context))
            .unify()
            .boxed()
    }

    fn health_route() -> BoxedFilter<(Response,)> {
        warp::path("health")
            .and(warp::get())
            .and(warp::path::end())
            .map(|| handlers::health().into_response())
            .boxed()
    }

    fn engine_routes(context: &AppContext) -> BoxedFilter<(Response,)> {
        let engine = context.engine();

        let state = warp::path!("api" / "engine" / "state")
            .and(warp::get())
            .and(Self::with_engine(engine.clone()))
            .then(handlers::get_state);

        let bet = warp::path!("api" / "engine" / "bet")
            .and(warp::post())
            .and(Self::with_engine(engine.clone()))
            .and(warp::body::json::<handlers::StartHandRequest>())
            .then(handlers::start_hand);

        let deal = warp::path!("api" / "engine" / "deal")
            .and(warp::post())
            .and(Self::with_engine(engine.clone()))
            .and(warp::body::json::<handlers::DealRequest>())
            .then(handlers::deal);

        let counting = warp::path!("api" / "engine" / "counting")
            .and(warp::post())
            .and(Self::with_engine(engine.clone()))
            .and(warp::body::json::<handlers::CountingRequest>())
            .then(handlers::update_counting);

        let reset = warp::path!("api" / "engine" / "reset")
            .and(warp::post())
            .and(Self::with_engine(engine.clone()))
            .then(handlers::reset);

        let hit = warp::path!("api" / "game" / "hit")
            .and(warp::post())
            .and(Self::with_engine(engine.clone()))
            .then(handlers::hit);

        let stand = warp::path!("api" / "game" / "stand")
            .and(warp::post())
            .and(Self::with_engine(engine.clone()))
            .then(handlers::stand);

        let dealer = warp::path!("api" / "game" / "dealer")
            .and(warp::post())
            .and(Self::with_engine(engine.clone()))
            .then(handlers::dealer_play);

        let resolve = warp::path!("api" / "game" / "resolve")
            .and(warp::post())
            .and(Self::with_engine(engine))
            .then(handlers::resolve);

        state
            .or(bet)
            .unify()
            .or(deal)
            .unify()
            .or(counting)
            .unify()
            .or(reset)
            .unify()
            .or(hit)
            .unify()
            .or(stand)
            .unify()
            .or(dealer)
            .unify()
            .or(resolve)
            .unify()
            .boxed()
    }

    fn hand_routes(context: &AppContext) -> BoxedFilter<(Response,)> {
        let store = context.store();

        warp::path!("api" / "hands" / HandId)
            .and(warp::get())
            .and(Self::with_store(store))
            .then(|hand_id: HandId, store: Arc<dyn HandStore>| {
                handlers::get_hand(store, hand_id)
            })
            .boxed()
    }

    fn with_engine(
        engine: Arc<TableEngine>,
    ) -> impl Filter<Extract = (Arc<TableEngine>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&engine))
    }

    fn with_store(
        store: Arc<dyn HandStore>,
    ) -> impl Filter<Extract = (Arc<dyn HandStore>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&store))
    }
}

#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), ServerError>>>,
    context: AppContext,
}

impl ServerHandle {
    fn new(
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<Result<(), ServerError>>,
        context: AppContext,
    ) -> Self {
        Self {
            addr,
            shutdown: Some(shutdown),
            task: Some(task),
            context,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(result) => result?,
                Err(err) => {
                    return Err(ServerError::ConfigError(format!(
                        "server task join error: {err}"
                    )))
                }
            }
        }

        info!("web server stopped");
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
