//! imock HTTP surface.
//!
//! Resources are not registered ahead of time: `/{resource}` routes resolve the name
//! against the live store on every request, so a reload that adds or drops a resource
//! takes effect without rebuilding the router.
//!
//! Layer order (outermost first): CORS, request log, chaos, body limit, handlers. Chaos
//! runs before any handler touches the store.

#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use imock_api::ResourceApi;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

mod chaos;
mod config;
mod request_log;
mod routes;

pub use config::{ChaosConfig, ChaosRoll, ServerConfig, DEFAULT_CHAOS_PERCENT, DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT};
pub use request_log::{format_latency, RequestLog};
pub use routes::{HttpError, LIMIT_HEADER, PAGE_HEADER, TOTAL_COUNT_HEADER};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: Arc<dyn ResourceApi>,
}

/// Built router plus the sender side of its request log.
pub struct Server {
    router: Router,
    log_tx: broadcast::Sender<RequestLog>,
}

impl Server {
    pub fn new(api: Arc<dyn ResourceApi>, config: &ServerConfig) -> Self {
        let (log_tx, _) = broadcast::channel(config.request_log_capacity.max(1));
        let router = router(api, config, log_tx.clone());
        Self { router, log_tx }
    }

    /// Live stream of served requests. Lagging receivers skip entries.
    pub fn subscribe_log(&self) -> broadcast::Receiver<RequestLog> { self.log_tx.subscribe() }

    pub fn router(&self) -> Router { self.router.clone() }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "server: listening");
        }
        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;
        info!("server: stopped");
        Ok(())
    }
}

/// Assemble the full route table and middleware stack.
pub fn router(api: Arc<dyn ResourceApi>, config: &ServerConfig, log_tx: broadcast::Sender<RequestLog>) -> Router {
    let state = AppState { api };
    let mut app = Router::new()
        .route("/health", get(routes::health))
        .route("/db", get(routes::db))
        .route("/{resource}", get(routes::list).post(routes::create))
        .route(
            "/{resource}/{id}",
            get(routes::get_one).put(routes::replace).patch(routes::patch).delete(routes::delete),
        )
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .with_state(state);

    if let Some(chaos) = config.chaos {
        info!(fail_percent = chaos.fail_percent(), "server: chaos enabled");
        app = app.layer(axum::middleware::from_fn_with_state(chaos, chaos::inject));
    }
    app = app.layer(axum::middleware::from_fn_with_state(log_tx, request_log::record));
    if config.cors {
        app = app.layer(cors_layer());
    }
    app
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .expose_headers([TOTAL_COUNT_HEADER, PAGE_HEADER, LIMIT_HEADER])
}
