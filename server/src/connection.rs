use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use hyper::header::{HeaderValue, CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use tungstenite::handshake::derive_accept_key;
use tungstenite::protocol::Role;
use tungstenite::Message;
use uuid::Uuid;

use shared::types::UserFacingError;

use crate::context::Context;
use crate::guards::{run_guards, Guard, RawArgs};
use crate::view::{full, internal_error_response, translate_error, ResponseBody, View};
use crate::AppState;

// ---------------------------------------------------------------------------
// Persistent connections
// ---------------------------------------------------------------------------
//
// A connection is a WebSocket endpoint built on the same per-request
// context as views: cookies resolve the session, guards run before the
// upgrade completes.  Lifecycle is on_open, zero or more on_message
// calls, then on_close, on one task per connection.

/// Outbound half of a connection.  `send` serializes to JSON and queues
/// a text frame; delivery is asynchronous.
#[derive(Clone)]
pub struct Sender {
    id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
}

impl Sender {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn send<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        let text = serde_json::to_string(value).context("Failed to serialize frame")?;
        self.tx
            .send(Message::Text(text.into()))
            .map_err(|_| anyhow!("Connection closed"))
    }
}

pub trait Connection: Send {
    fn on_open<'a>(&'a mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }

    /// One decoded JSON message from the client.
    fn on_message<'a>(
        &'a mut self,
        message: Value,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn on_close<'a>(&'a mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

pub type ConnectionFactory = fn(Arc<Context>, Sender) -> Box<dyn Connection>;

// ---------------------------------------------------------------------------
// Upgrade handling
// ---------------------------------------------------------------------------

fn is_websocket_request(req: &Request<hyper::body::Incoming>) -> bool {
    req.headers()
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
        && req.headers().contains_key(SEC_WEBSOCKET_KEY)
}

/// Accept a WebSocket upgrade for a matched connection route: prepare
/// the context, run the route guards, then hand the socket to a task
/// driving the `Connection` lifecycle.
pub async fn handle_upgrade(
    mut req: Request<hyper::body::Incoming>,
    state: AppState,
    page_name: &'static str,
    mut route_params: HashMap<String, String>,
    guards: Vec<Guard>,
    factory: ConnectionFactory,
    peer_addr: Option<String>,
) -> Response<ResponseBody> {
    if !is_websocket_request(&req) {
        let mut response = Response::new(full("websocket upgrade required"));
        *response.status_mut() = StatusCode::BAD_REQUEST;
        return response;
    }

    let accept_key = req
        .headers()
        .get(SEC_WEBSOCKET_KEY)
        .map(|key| derive_accept_key(key.as_bytes()));

    // Take the upgrade future before consuming the request; it resolves
    // once the 101 response has gone out.
    let upgrade = hyper::upgrade::on(&mut req);
    let (parts, _body) = req.into_parts();

    let ctx = match Context::prepare(&state, &parts, &mut route_params, page_name, peer_addr.as_deref())
        .await
    {
        Ok(ctx) => Arc::new(ctx),
        Err(err) => return internal_error_response(false, &err),
    };

    let view = View { ctx: ctx.clone() };
    if ctx.domain.is_none() {
        let err = UserFacingError::DomainNotFound(ctx.domain_id.clone());
        return translate_error(&view, &err)
            .unwrap_or_else(|e| internal_error_response(false, &e));
    }
    if let Err(err) = run_guards(&ctx, &guards, &RawArgs::new()) {
        return match err.downcast_ref::<UserFacingError>() {
            Some(user_err) => translate_error(&view, user_err)
                .unwrap_or_else(|e| internal_error_response(false, &e)),
            None => internal_error_response(false, &err),
        };
    }

    tokio::spawn(async move {
        match upgrade.await {
            Ok(upgraded) => {
                let ws = WebSocketStream::from_raw_socket(
                    TokioIo::new(upgraded),
                    Role::Server,
                    None,
                )
                .await;
                if let Err(err) = drive_connection(ws, ctx, factory).await {
                    warn!("Connection ended with error: {:?}", err);
                }
            }
            Err(err) => warn!("WebSocket upgrade failed: {}", err),
        }
    });

    let mut response = Response::new(full(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    response
        .headers_mut()
        .insert(UPGRADE, HeaderValue::from_static("websocket"));
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    if let Some(Ok(accept)) = accept_key.map(|k| HeaderValue::from_str(&k)) {
        response.headers_mut().insert(SEC_WEBSOCKET_ACCEPT, accept);
    }
    response
}

async fn drive_connection<S>(
    ws: WebSocketStream<S>,
    ctx: Arc<Context>,
    factory: ConnectionFactory,
) -> Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let connection_id = Uuid::new_v4();
    info!("Connection {} open (domain {})", connection_id, ctx.domain_id);

    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sender = Sender {
        id: connection_id,
        tx,
    };
    let mut connection = factory(ctx, sender);

    connection.on_open().await?;

    let result = loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(frame) => {
                        if let Err(err) = sink.send(frame).await {
                            break Err(anyhow!("Failed to send frame: {}", err));
                        }
                    }
                    // All senders dropped; nothing left to deliver.
                    None => break Ok(()),
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Value>(&text) {
                            Ok(message) => connection.on_message(message).await?,
                            Err(err) => {
                                debug!("Dropping malformed frame: {}", err);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(err) = sink.send(Message::Pong(payload)).await {
                            break Err(anyhow!("Failed to send pong: {}", err));
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break Err(anyhow!("WebSocket error: {}", err)),
                }
            }
        }
    };

    connection.on_close().await?;
    info!("Connection {} closed", connection_id);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        sender: Sender,
        seen: Vec<Value>,
    }

    impl Connection for Recorder {
        fn on_message<'a>(
            &'a mut self,
            message: Value,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
            Box::pin(async move {
                self.sender.send(&serde_json::json!({"echo": message.clone()}))?;
                self.seen.push(message);
                Ok(())
            })
        }
    }

    #[test]
    fn sender_serializes_to_text_frames() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = Sender {
            id: Uuid::new_v4(),
            tx,
        };
        sender.send(&serde_json::json!({"star": true})).unwrap();
        match tokio_test::block_on(rx.recv()) {
            Some(Message::Text(text)) => {
                assert_eq!(text.as_str(), r#"{"star":true}"#);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn sender_fails_after_receiver_drops() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sender = Sender {
            id: Uuid::new_v4(),
            tx,
        };
        assert!(sender.send(&serde_json::json!({})).is_err());
    }

    #[tokio::test]
    async fn default_lifecycle_hooks_are_noops() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut recorder = Recorder {
            sender: Sender {
                id: Uuid::new_v4(),
                tx,
            },
            seen: Vec::new(),
        };
        recorder.on_open().await.unwrap();
        recorder
            .on_message(serde_json::json!({"a": 1}))
            .await
            .unwrap();
        recorder.on_close().await.unwrap();
        assert_eq!(recorder.seen, vec![serde_json::json!({"a": 1})]);
    }
}
