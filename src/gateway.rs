//! WebSocket endpoint turning each connection into a hub subscriber.
//!
//! The channel is output-only: inbound frames are read just to notice when the
//! peer goes away and are otherwise discarded.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::hub::{Hub, Subscription};

/// Router state for the `/ws` endpoint.
#[derive(Clone, Debug)]
pub struct GatewayState {
    pub hub: Arc<Hub>,
    /// Upper bound on writing one frame to a viewer.
    pub write_timeout: Duration,
}

/// Why a subscriber's connection ended.
#[derive(Debug)]
enum Disconnect {
    /// Close frame or end of stream from the peer
    PeerClosed,
    ReadError(axum::Error),
    SendFailed(axum::Error),
    /// A frame could not be written within the write timeout
    SendTimedOut,
    /// The hub dropped the subscriber after a failed delivery
    Evicted,
}

/// Upgrades the request and serves the connection as a subscriber.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_failed_upgrade(|e| warn!(error = %e, "failed to upgrade connection"))
        .on_upgrade(move |socket| serve_subscriber(socket, state.hub, state.write_timeout))
}

/// Registers `socket` with `hub` and forwards broadcasts until the
/// connection ends, then unregisters it.
///
/// No history is replayed and there is no resume: a reconnecting viewer only
/// sees what is broadcast after it registers again. A frame that cannot be
/// written within `write_timeout` ends the connection like a failed send.
pub async fn serve_subscriber(socket: WebSocket, hub: Arc<Hub>, write_timeout: Duration) {
    let subscription = hub.register();
    let id = subscription.id();
    debug!(subscriber = id, "viewer connected");

    let (mut sink, mut stream) = socket.split();

    // The subscription is consumed, so it is unregistered before the socket
    // is torn down
    let reason = forward(subscription, &mut sink, &mut stream, write_timeout).await;
    let _ = timeout(write_timeout, sink.close()).await;

    match reason {
        Disconnect::PeerClosed => debug!(subscriber = id, "viewer disconnected"),
        Disconnect::Evicted => debug!(subscriber = id, "viewer evicted"),
        Disconnect::SendTimedOut => debug!(subscriber = id, "viewer stopped reading"),
        Disconnect::ReadError(e) | Disconnect::SendFailed(e) => {
            debug!(subscriber = id, error = %e, "viewer connection failed")
        }
    }
}

async fn forward<S, R>(
    mut subscription: Subscription,
    sink: &mut S,
    stream: &mut R,
    write_timeout: Duration,
) -> Disconnect
where
    S: Sink<Message, Error = axum::Error> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        tokio::select! {
            message = subscription.recv() => match message {
                Some(text) => {
                    let frame = Message::Text(text.to_string().into());
                    match timeout(write_timeout, sink.send(frame)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => break Disconnect::SendFailed(e),
                        Err(_) => break Disconnect::SendTimedOut,
                    }
                }
                None => break Disconnect::Evicted,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break Disconnect::PeerClosed,
                Some(Err(e)) => break Disconnect::ReadError(e),
                Some(Ok(_)) => {}
            },
        }
    }
}
