// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! WebSocket transport.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, Instrument};

use super::connection::{Gateway, OUTBOUND_BUFFER};
use crate::error::{ProtocolError, TransportError};

/// Router serving the WebSocket endpoint at `ws_path` and `GET /health`.
pub fn router(gateway: Arc<Gateway>, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(upgrade))
        .route("/health", get(health))
        .with_state(gateway)
}

/// Bind `addr` and serve `router` until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, router: Router, shutdown: F) -> Result<(), TransportError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TransportError::BindFailed {
            endpoint: addr.to_string(),
            message: e.to_string(),
        })?;
    serve_on(listener, router, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve_on<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<(), TransportError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "WebSocket listener ready");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| TransportError::from_io_error("serving websocket", e))
}

async fn upgrade(ws: WebSocketUpgrade, State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, gateway))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: &'static str,
    connected_sessions: usize,
    live_users: usize,
}

async fn health(State(gateway): State<Arc<Gateway>>) -> Json<Health> {
    let ctx = gateway.context();
    Json(Health {
        status: "ok",
        connected_sessions: ctx.sessions.connected_count(),
        live_users: ctx.live_inputs.user_count(),
    })
}

async fn handle_socket(socket: WebSocket, gateway: Arc<Gateway>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
    let mut session = gateway.connect(tx, "ws");
    let span = session.span().clone();

    let writer = tokio::spawn(
        async move {
            while let Some(msg) = rx.recv().await {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(error = %e, "Failed to encode outbound message");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    debug!("WebSocket peer gone");
                    break;
                }
            }
            let _ = sink.close().await;
        }
        .instrument(span.clone()),
    );

    async {
        while let Some(frame) = stream.next().await {
            let result = match frame {
                Ok(Message::Text(text)) => session.handle_frame(&text).await,
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => session.handle_frame(text).await,
                    Err(_) => {
                        session
                            .reject(ProtocolError::Unsupported("binary frame is not UTF-8".to_string()))
                            .await
                    }
                },
                Ok(Message::Close(_)) => break,
                // Pings are answered by the websocket layer.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Ok(()),
                Err(e) => {
                    debug!(error = %e, "WebSocket read failed");
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
    }
    .instrument(span.clone())
    .await;

    session.close();
    drop(session);
    let _ = writer.await;
}
