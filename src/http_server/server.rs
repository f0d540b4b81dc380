//! # HTTP Server
//!
//! Combines every route module behind one middleware that answers
//! `OPTIONS`, enforces access control on mutating methods and decorates
//! responses with the configured headers.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{ConfigResult, RestApiConfig};

use super::access::{AccessPolicy, ClientCertificate};
use super::cluster_routes::cluster_routes;
use super::config_routes::config_routes;
use super::control_routes::control_routes;
use super::health_routes::health_routes;
use super::restart_routes::restart_routes;
use super::state::ApiState;
use super::switchover_routes::switchover_routes;

/// Build the combined router with all endpoints
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .merge(health_routes(Arc::clone(&state)))
        .merge(cluster_routes(Arc::clone(&state)))
        .merge(config_routes(Arc::clone(&state)))
        .merge(switchover_routes(Arc::clone(&state)))
        .merge(restart_routes(Arc::clone(&state)))
        .merge(control_routes(Arc::clone(&state)))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(Arc::clone(&state), control_layer))
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> Response {
    StatusCode::NOT_FOUND.into_response()
}

async fn control_layer(State(state): State<Arc<ApiState>>, request: Request, next: Next) -> Response {
    state.metrics.increment_requests();
    let policy = state.policy.load();

    let mut response = if *request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else if AccessPolicy::applies_to(request.method()) {
        let client = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let has_certificate = request.extensions().get::<ClientCertificate>().is_some();
        let cluster = state.snapshot.current();
        let verdict = policy
            .check(client, request.headers(), has_certificate, cluster.as_deref())
            .await;
        match verdict {
            Ok(()) => next.run(request).await,
            Err(denied) => {
                warn!(
                    client = ?client,
                    method = %request.method(),
                    path = %request.uri().path(),
                    reason = denied.message(),
                    "request denied"
                );
                state.metrics.increment_access_denied();
                denied.into_response()
            }
        }
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    if let Some(server) = policy.server_header.as_deref() {
        if let Ok(value) = HeaderValue::from_str(server) {
            headers.insert(header::SERVER, value);
        }
    }
    for (name, value) in &policy.extra_headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "invalid extra header skipped"),
        }
    }
    response
}

// ==================
// Listener
// ==================

fn bind(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog.max(1))
}

/// REST API listener with hot-reloadable settings.
pub struct ApiServer {
    state: Arc<ApiState>,
    config: Mutex<RestApiConfig>,
    listen: watch::Sender<SocketAddr>,
}

impl ApiServer {
    /// Validate `config` and install its access policy. Blocking: allow-list
    /// host names are resolved here.
    pub fn new(state: Arc<ApiState>, config: RestApiConfig) -> ConfigResult<Self> {
        config.validate()?;
        let addr = config.listen_addr()?;
        state.policy.store(AccessPolicy::from_config(&config));
        let (listen, _) = watch::channel(addr);
        Ok(Self {
            state,
            config: Mutex::new(config),
            listen,
        })
    }

    pub fn state(&self) -> &Arc<ApiState> {
        &self.state
    }

    pub fn listen_addr(&self) -> SocketAddr {
        *self.listen.borrow()
    }

    /// Apply a new `restapi` section. Access settings are swapped in place;
    /// the socket is rebound only when the listen address changed.
    pub async fn reload_config(&self, config: RestApiConfig) -> ConfigResult<()> {
        config.validate()?;
        let addr = config.listen_addr()?;

        let resolved = config.clone();
        let policy = match tokio::task::spawn_blocking(move || AccessPolicy::from_config(&resolved)).await {
            Ok(policy) => policy,
            Err(err) => {
                warn!(error = %err, "access policy rebuild failed, resolving inline");
                AccessPolicy::from_config(&config)
            }
        };
        self.state.policy.store(policy);

        let mut current = match self.config.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if current.listen_addr().ok() != Some(addr) {
            info!(%addr, "listen address changed, rebinding");
            self.listen.send_replace(addr);
        }
        *current = config;
        info!("REST API configuration reloaded");
        Ok(())
    }

    fn backlog(&self) -> u32 {
        match self.config.lock() {
            Ok(guard) => guard.request_queue_size,
            Err(poisoned) => poisoned.into_inner().request_queue_size,
        }
    }

    /// Serve until shutdown, rebinding whenever the listen address changes.
    pub async fn serve(&self) -> io::Result<()> {
        let mut listen = self.listen.subscribe();
        while !self.state.shutdown.is_triggered() {
            let addr = *listen.borrow_and_update();
            let listener = bind(addr, self.backlog())?;
            info!(%addr, "REST API listening");

            let app = build_router(Arc::clone(&self.state));
            let shutdown = Arc::clone(&self.state.shutdown);
            let mut changed = listen.clone();
            let stop = async move {
                tokio::select! {
                    _ = shutdown.wait() => {}
                    _ = changed.changed() => {}
                }
            };
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(stop)
            .await?;
        }
        info!("REST API stopped");
        Ok(())
    }
}
