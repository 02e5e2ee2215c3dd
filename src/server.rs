//! Gateway server: router assembly, listener and lifecycle.

use crate::chain::{ChainVerifier, RpcChainVerifier};
use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::event::{create_event_channel, GatewayEvent, GatewayEventsChannel, GatewayEventsSender};
use crate::gateway::{require_upload_authorization, UploadAuthorizer};
use crate::proxy::{forward_upstream, UpstreamProxy};
use crate::session::{Clock, SessionStore, SessionSweeper, SystemClock};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Builder for constructing a gateway.
pub struct GatewayBuilder {
    config: GatewayConfig,
    verifier: Option<Arc<dyn ChainVerifier>>,
    clock: Arc<dyn Clock>,
}

impl GatewayBuilder {
    /// Create a new gateway builder with the given configuration.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            verifier: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `verifier` instead of the JSON-RPC verifier built from config.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn ChainVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Use `clock` for session expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate config, wire the router and bind the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the listener
    /// cannot be bound.
    pub async fn build(self) -> Result<RunningGateway> {
        self.config.validate()?;
        info!("Building postage-gate with config: {:?}", self.config);

        let verifier = match self.verifier {
            Some(verifier) => verifier,
            None => Arc::new(RpcChainVerifier::new(
                &self.config.chain.rpc_url,
                self.config.chain.registry_address.as_deref(),
            )?),
        };
        let check_batch_payer = self.config.chain.registry_address.is_some();
        if !check_batch_payer {
            warn!("No batch registry configured: uploads are checked by signature only");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, _) = create_event_channel();

        let sessions = SessionStore::new(self.config.session.duration(), self.clock);
        let authorizer = Arc::new(
            UploadAuthorizer::new(verifier, sessions.clone())
                .with_batch_payer_check(check_batch_payer)
                .with_events(events_tx.clone()),
        );
        let proxy = UpstreamProxy::new(&self.config.upstream_url)?;
        info!(
            "Forwarding to {}, sessions last {:?}, swept every {:?}",
            proxy.base(),
            sessions.lifetime(),
            self.config.session.sweep_interval()
        );
        let router = router(authorizer, proxy);

        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        let local_addr = listener.local_addr()?;

        Ok(RunningGateway {
            config: self.config,
            listener: Some(listener),
            local_addr,
            router,
            sessions,
            shutdown_tx,
            shutdown_rx,
            events_tx,
        })
    }
}

/// Assemble the gateway router: every path is forwarded upstream, with
/// upload authorization in front.
pub fn router(authorizer: Arc<UploadAuthorizer>, proxy: UpstreamProxy) -> Router {
    Router::new()
        .fallback(forward_upstream)
        .with_state(proxy)
        .layer(axum::middleware::from_fn_with_state(
            authorizer,
            require_upload_authorization,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Request handler panicked: {details}");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

/// A bound gateway.
pub struct RunningGateway {
    config: GatewayConfig,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    router: Router,
    sessions: SessionStore,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: GatewayEventsSender,
}

impl RunningGateway {
    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The live session store.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Subscribe to gateway events.
    #[must_use]
    pub fn subscribe_events(&self) -> GatewayEventsChannel {
        self.events_tx.subscribe()
    }

    /// A handle that stops [`run`](Self::run) when sent `true`.
    #[must_use]
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Serve until shutdown is requested, Ctrl-C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway was already run or the server fails.
    pub async fn run(&mut self) -> Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| Error::Server("gateway already running".to_string()))?;

        info!("postage-gate listening on {}", self.local_addr);
        let _ = self.events_tx.send(GatewayEvent::Started {
            addr: self.local_addr,
        });

        let sweep_interval = self.config.session.sweep_interval();
        let sweeper = SessionSweeper::new(self.sessions.clone(), sweep_interval)
            .with_events(self.events_tx.clone())
            .spawn(self.shutdown_rx.clone());

        let shutdown_tx = self.shutdown_tx.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();
        let served = axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown_rx) => {
                        info!("Shutdown signal received");
                    }
                    _ = os_signal() => {
                        let _ = shutdown_tx.send(true);
                    }
                }
            })
            .await;

        // Covers the server exiting on its own.
        self.shutdown();
        if let Err(e) = sweeper.await {
            warn!("Session sweeper task ended abnormally: {e}");
        }

        let _ = self.events_tx.send(GatewayEvent::ShuttingDown);
        info!("Gateway shutdown complete");
        served.map_err(|e| Error::Server(e.to_string()))
    }

    /// Request the gateway to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn os_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Ctrl-C received, initiating shutdown"),
        () = terminate => info!("SIGTERM received, initiating shutdown"),
    }
}
