//! # twoparty-peer
//!
//! Counterparty service: accepts websocket connections on `/ws` and runs a
//! [`Responder`] per connection against a shared share store.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, task::JoinHandle};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn, Instrument};
use twoparty_core::{
    wire::{Frame, FrameBody, RoundRequest, RoundResponse},
    MemoryShareStore, ProtocolConfig, Responder,
};
use uuid::Uuid;

/// State shared by all connections
#[derive(Clone, Default)]
pub struct PeerState {
    pub store: MemoryShareStore,
    pub config: ProtocolConfig,
}

impl PeerState {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            store: MemoryShareStore::new(),
            config,
        }
    }
}

pub fn router(state: PeerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Serve until the listener fails
pub async fn serve(listener: TcpListener, state: PeerState) -> std::io::Result<()> {
    if let Ok(address) = listener.local_addr() {
        info!(%address, "Peer listening");
    }
    axum::serve(listener, router(state)).await
}

/// Periodically drop shares that rotation superseded more than
/// `retention` ago
pub fn spawn_cleanup(store: MemoryShareStore, retention: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let removed = store.cleanup(retention);
            if removed > 0 {
                info!(removed, "Dropped superseded shares");
            }
        }
    })
}

async fn health(State(state): State<PeerState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "twoparty-peer",
        "version": env!("CARGO_PKG_VERSION"),
        "shares": state.store.len(),
    }))
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<PeerState>) -> impl IntoResponse {
    let connection = Uuid::new_v4().simple().to_string();
    ws.on_upgrade(move |socket| {
        handle_websocket(socket, state)
            .instrument(tracing::info_span!("connection", id = %connection))
    })
}

async fn handle_websocket(socket: WebSocket, state: PeerState) {
    let (mut sender, mut receiver) = socket.split();
    let mut responder = Responder::new(Arc::new(state.store.clone()), state.config.clone());
    debug!("Connection opened");

    while let Some(message) = receiver.next().await {
        let bytes = match message {
            Ok(Message::Binary(bytes)) => bytes,
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "Receive failed");
                break;
            }
        };

        let frame = match Frame::from_bytes(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping connection after malformed frame");
                break;
            }
        };
        let FrameBody::Request(request) = frame.body else {
            warn!(seq = frame.seq, "Dropping connection after unexpected response frame");
            break;
        };

        let (next, response) = match respond(responder, request).await {
            Some(answer) => answer,
            None => return,
        };
        responder = next;
        let reply = match Frame::new(frame.seq, FrameBody::Response(response)).to_bytes() {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Could not encode response");
                break;
            }
        };
        if let Err(e) = sender.send(Message::Binary(reply)).await {
            debug!(error = %e, "Send failed");
            break;
        }
    }

    if responder.is_busy() {
        debug!("Connection closed with an operation in flight");
    }
    debug!("Connection closed");
}

/// Run one step off the async executor; Paillier proofs are slow
async fn respond(mut responder: Responder, request: RoundRequest) -> Option<(Responder, RoundResponse)> {
    let result = tokio::task::spawn_blocking(move || {
        let response = responder.handle(&request);
        (responder, response)
    })
    .await;
    match result {
        Ok(answer) => Some(answer),
        Err(e) => {
            warn!(error = %e, "Responder task failed");
            None
        }
    }
}
