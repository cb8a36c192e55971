use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use ironfhir_core::LuidGenerator;
use ironfhir_db_memory::{MemoryStore, NaiveSearchOracle, StoreConfig};
use ironfhir_storage::DynResourceStore;
use ironfhir_tx::BundleProcessor;

use crate::config::AppConfig;
use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub processor: Arc<BundleProcessor>,
    pub base_url: String,
}

pub struct ServerBuilder {
    config: AppConfig,
    luids: Option<LuidGenerator>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::from_env(),
            luids: None,
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Fixes the id generator, for deterministic tests.
    pub fn with_luid_generator(mut self, luids: LuidGenerator) -> Self {
        self.luids = Some(luids);
        self
    }

    pub fn build(self) -> Server {
        let store = Arc::new(MemoryStore::with_config(StoreConfig {
            width: self.config.store.pool_width,
            queue_depth: self.config.store.queue_depth,
            write_timeout: self.config.write_timeout(),
        }));
        let oracle = Arc::new(NaiveSearchOracle::new(&store));
        let dyn_store: DynResourceStore = store.clone();
        let mut processor =
            BundleProcessor::new(dyn_store, oracle, self.config.base_url.clone());
        if let Some(luids) = self.luids {
            processor = processor.with_luid_generator(luids);
        }
        let state = AppState {
            store,
            processor: Arc::new(processor),
            base_url: self.config.base_url.trim_end_matches('/').to_string(),
        };
        Server {
            config: self.config,
            state,
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Server {
    config: AppConfig,
    state: AppState,
}

impl Server {
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/", axum::routing::post(handlers::process_bundle))
            .route("/health", get(handlers::health))
            .route(
                "/{resource_type}/{id}",
                get(handlers::read_resource)
                    .put(handlers::update_resource)
                    .delete(handlers::delete_resource),
            )
            .route(
                "/{resource_type}/{id}/_history",
                get(handlers::resource_history),
            )
            .route(
                "/{resource_type}/{id}/_history/{vid}",
                get(handlers::read_version),
            )
            .with_state(state)
    }

    pub async fn run(self) -> std::io::Result<()> {
        let addr = self.config.addr();
        let router = Self::router(self.state);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, base_url = %self.config.base_url, "server listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
