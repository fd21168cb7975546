//! Gateway HTTP server: handshake, event ingestion and health probe.

use crate::config::{self, Config, HEALTH_PATH};
use crate::dispatch::Dispatcher;
use crate::events::{self, DecodeError, Envelope};
use crate::gateway::protocol::{answer_handshake, VerifyParams, ACK_NOT_OK, ACK_OK};
use crate::handlers::HandlerRegistry;
use crate::outbound::GraphApiClient;
use crate::signature::{self, SignatureError, SIGNATURE_HEADER};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Why a POST was answered with the "not ok" acknowledgment.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("signature rejected: {0}")]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Shared state for the gateway (config, resolved secrets, dispatcher).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    /// Handshake token after env overrides.
    pub verify_token: Option<String>,
    /// App secret after env overrides; only consulted when verification is enabled.
    pub app_secret: Option<String>,
}

impl GatewayState {
    pub fn new(config: Config, dispatcher: Dispatcher) -> Self {
        let verify_token = config::resolve_verify_token(&config);
        let app_secret = config::resolve_app_secret(&config);
        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            verify_token,
            app_secret,
        }
    }

    /// Verify (when enabled) and decode one POST body.
    fn ingest(&self, headers: &HeaderMap, body: &[u8]) -> Result<Envelope, IngestError> {
        if self.config.webhook.verify_signature {
            let header = match headers.get(SIGNATURE_HEADER) {
                Some(v) => Some(v.to_str().map_err(|_| {
                    SignatureError::MalformedHeader(String::from_utf8_lossy(v.as_bytes()).into_owned())
                })?),
                None => None,
            };
            signature::verify(body, header, self.app_secret.as_deref())?;
        }
        Ok(events::decode(body)?)
    }
}

/// Routes for the webhook path and the health probe.
pub fn router(state: GatewayState) -> Router {
    let path = state.config.webhook.path.trim().to_string();
    Router::new()
        .route(HEALTH_PATH, get(health_http))
        .route(&path, get(webhook_handshake).post(webhook_event))
        .with_state(state)
}

/// Serve the webhook until SIGINT/SIGTERM. Handlers must be registered in `registry`
/// beforehand; the registry is shared with every request.
pub async fn run_gateway(config: Config, registry: Arc<HandlerRegistry>) -> Result<()> {
    config::validate(&config)?;
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) && !config.webhook.verify_signature {
        log::warn!(
            "gateway bound to {} with signature verification disabled; unsigned payloads will be accepted (set webhook.verifySignature and webhook.appSecret or PAGEHOOK_APP_SECRET)",
            bind
        );
    }
    if config.webhook.verify_signature && config::resolve_app_secret(&config).is_none() {
        log::warn!("signature verification enabled but no app secret configured; every event delivery will be rejected");
    }
    if config::resolve_verify_token(&config).is_none() {
        log::warn!("no verify token configured; subscription handshakes will be rejected");
    }
    let credential = config::resolve_page_token(&config).unwrap_or_else(|| {
        log::warn!("no page access token configured; replies will fail");
        String::new()
    });

    let outbound = Arc::new(GraphApiClient::new(config.page.api_base.clone()));
    log::debug!("send API base: {}", outbound.api_base());
    let dispatcher = Dispatcher::new(registry, credential, outbound);
    let port = config.gateway.port;
    let path = config.webhook.path.clone();
    let app = router(GatewayState::new(config, dispatcher));

    let bind_addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {} (webhook path {})", bind_addr, path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining in-flight requests");
}

/// GET <webhook path> answers the subscription handshake. A query that does not parse
/// is answered like a token mismatch.
async fn webhook_handshake(
    State(state): State<GatewayState>,
    query: Option<Query<VerifyParams>>,
) -> String {
    let params = query.map(|Query(p)| p).unwrap_or_default();
    let accepted = state.verify_token.is_some()
        && state.verify_token.as_deref() == params.verify_token.as_deref();
    if accepted {
        log::info!("webhook handshake accepted");
    } else {
        log::warn!("webhook handshake rejected: verify token mismatch");
    }
    answer_handshake(&params, state.verify_token.as_deref())
}

/// POST <webhook path> verifies, decodes and dispatches one envelope. Always 200; the
/// body tells ok from not ok.
async fn webhook_event(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> &'static str {
    match state.ingest(&headers, &body) {
        Ok(envelope) => {
            state.dispatcher.dispatch(envelope).await;
            ACK_OK
        }
        Err(e) => {
            log::warn!("webhook: {}", e);
            ACK_NOT_OK
        }
    }
}

/// GET /health returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
    }))
}
