use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use unisync_client::HttpExternalApi;
use unisync_core::{DynExternalApi, EventBroadcaster};
use unisync_db_memory::InMemorySyncStateStorage;
use unisync_engine::{
    ConflictRetryer, Controller, Debouncer, ReferenceResolver, SyncEngine, SyncStateObjectLookup,
    SyncStateStore,
};
use unisync_storage::{DynStorage, EventedStorage};

use crate::{config::AppConfig, handlers, metrics};

/// Shared state of the admin API handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SyncStateStore>,
    pub resolver: Arc<ReferenceResolver>,
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .route("/api/sync-states", get(handlers::list_sync_states))
        .route(
            "/api/sync-states/{resource_type}/{name}",
            get(handlers::get_sync_state),
        )
        .route(
            "/api/sources",
            post(handlers::register_source).delete(handlers::unregister_source),
        )
        .route("/api/resolve", post(handlers::resolve_references))
        .with_state(state)
        .layer(middleware::from_fn(track_http_metrics))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                    )
                })
                .on_response(
                    |res: &Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        tracing::debug!(
                            http.status = res.status().as_u16(),
                            elapsed_ms = latency.as_millis() as u64,
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(cfg.server.body_limit_bytes))
}

async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    // Route templates keep label cardinality bounded.
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());

    let response = next.run(req).await;
    metrics::record_http_request(&method, &route, response.status().as_u16(), started.elapsed());
    response
}

pub struct ServerBuilder {
    config: AppConfig,
    api: Option<DynExternalApi>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            api: None,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Replaces the HTTP client built from `api` configuration.
    pub fn with_external_api(mut self, api: DynExternalApi) -> Self {
        self.api = Some(api);
        self
    }

    pub fn build(self) -> anyhow::Result<UnisyncServer> {
        let cfg = self.config;
        let api: DynExternalApi = match self.api {
            Some(api) => api,
            None => Arc::new(HttpExternalApi::new(cfg.api.clone())?),
        };

        let broadcaster = EventBroadcaster::new_shared();
        let storage: DynStorage = Arc::new(EventedStorage::new(
            InMemorySyncStateStorage::new(),
            broadcaster.clone(),
        ));
        let settings = cfg.engine.settings();
        let store = Arc::new(SyncStateStore::new(
            storage.clone(),
            ConflictRetryer::new(settings.conflict_attempts),
            Arc::new(Debouncer::new(cfg.engine.debounce_window())),
        ));
        let resolver = Arc::new(ReferenceResolver::new(
            Arc::new(SyncStateObjectLookup::new(storage)),
            api.clone(),
            settings.api_timeout,
        ));
        let engine = Arc::new(SyncEngine::new(store.clone(), api, settings));
        let controller = Controller::new(engine, broadcaster, cfg.engine.controller_settings());

        let app = build_app(AppState { store, resolver }, &cfg);
        Ok(UnisyncServer {
            addr: cfg.addr(),
            app,
            controller,
        })
    }
}

pub struct UnisyncServer {
    addr: SocketAddr,
    app: Router,
    controller: Controller,
}

impl UnisyncServer {
    /// Serves the admin API and runs the controller until Ctrl+C.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let cancel = CancellationToken::new();
        let controller = Arc::new(self.controller);
        let controller_task = tokio::spawn({
            let controller = controller.clone();
            let cancel = cancel.clone();
            async move { controller.run(cancel).await }
        });

        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal(cancel.clone()))
            .await;

        cancel.cancel();
        if let Err(e) = controller_task.await {
            tracing::error!(error = %e, "Controller task failed");
        }
        served?;
        Ok(())
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown signal received"),
        _ = cancel.cancelled() => {}
    }
}
