use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::oneshot;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use reactrack_engine::TurnController;

use crate::error::ServerError;
use crate::signature::{SignatureVerifier, SIGNATURE_HEADER};
use crate::webhook::{self, WebhookPayload};

pub const GREETING: &str = "Hello, my name is ReaCTrack, your personal bot!";

/// Server configuration.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub verify_token: SecretString,
    pub app_secret: SecretString,
    pub request_timeout: Duration,
}

impl ServerConfig {
    pub fn new(verify_token: SecretString, app_secret: SecretString) -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            verify_token,
            app_secret,
            request_timeout: Duration::from_secs(20),
        }
    }
}

/// Shared application state passed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<TurnController>,
    pub verify_token: Arc<SecretString>,
    pub signatures: Arc<SignatureVerifier>,
}

/// Build the axum router with all routes.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(greeting))
        .route("/webhook", get(verify_subscription).post(receive_events))
        .route("/webhook/", get(verify_subscription).post(receive_events))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve. Returns a handle that keeps the server running.
pub async fn start(
    config: ServerConfig,
    controller: Arc<TurnController>,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState {
        controller,
        verify_token: Arc::new(config.verify_token),
        signatures: Arc::new(SignatureVerifier::new(config.app_secret)),
    };
    let router = build_router(state, config.request_timeout);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "reactrack server started");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %e, "server terminated");
        }
    });

    Ok(ServerHandle {
        addr,
        shutdown: Some(shutdown_tx),
        server,
    })
}

/// Handle returned by [`start`].
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.server).await;
    }
}

/// GET /
async fn greeting() -> &'static str {
    GREETING
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /webhook: subscription handshake.
async fn verify_subscription(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<String, ServerError> {
    let token_matches =
        params.verify_token.as_deref() == Some(state.verify_token.expose_secret());
    if params.mode.as_deref() == Some("subscribe") && token_matches {
        tracing::info!("webhook subscription verified");
        Ok(params.challenge.unwrap_or_default())
    } else {
        Err(ServerError::Verification)
    }
}

/// POST /webhook: signed event delivery.
async fn receive_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ServerError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    state.signatures.verify(signature, &body)?;

    let payload: WebhookPayload =
        serde_json::from_slice(&body).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    if payload.object != "page" {
        return Err(ServerError::UnsupportedObject(payload.object));
    }

    let mut events = 0usize;
    for entry in &payload.entry {
        for event in &entry.messaging {
            webhook::dispatch(&state.controller, event);
            events += 1;
        }
    }
    tracing::debug!(entries = payload.entry.len(), events, "webhook delivery dispatched");
    Ok(StatusCode::OK)
}
