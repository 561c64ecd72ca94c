//! WebSocket Subscriber Gateway
//!
//! Accepts subscriber connections on the configured route, registers
//! each one in the shared `SubscriberSet`, and forwards snapshots from a
//! bounded per-connection queue to the socket. Client messages are
//! treated as keepalives and ignored.
//!
//! A connection leaves the set in one of two ways:
//! - the client closes or errors: the connection task removes it
//! - a send fails: the broadcast loop prunes it, the queue sender is
//!   dropped, and the writer closes the socket

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::domain::errors::DeliveryError;
use crate::ports::subscriber::{Subscriber, SubscriberId};
use crate::usecases::subscriber_set::SubscriberSet;

/// One connected WebSocket client as seen by the broadcast loop.
pub struct WsSubscriber {
    id: SubscriberId,
    peer: SocketAddr,
    outbound: mpsc::Sender<Arc<str>>,
}

impl WsSubscriber {
    pub fn new(peer: SocketAddr, outbound: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            outbound,
        }
    }

    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl Subscriber for WsSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    /// Queue without waiting; a full queue means the client stalled.
    async fn send(&self, payload: Arc<str>) -> Result<(), DeliveryError> {
        self.outbound.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Disconnected,
        })
    }
}

#[derive(Clone)]
struct GatewayState {
    subscribers: Arc<SubscriberSet>,
    outbound_queue: usize,
}

/// Axum-based WebSocket gateway.
pub struct SubscriberGateway {
    subscribers: Arc<SubscriberSet>,
    config: GatewayConfig,
}

impl SubscriberGateway {
    pub fn new(subscribers: Arc<SubscriberSet>, config: GatewayConfig) -> Self {
        Self {
            subscribers,
            config,
        }
    }

    /// Gateway routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.ws_path, get(ws_handler))
            .with_state(GatewayState {
                subscribers: Arc::clone(&self.subscribers),
                outbound_queue: self.config.outbound_queue,
            })
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(self, shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.config.bind_address).await?;
        self.serve(listener, shutdown_rx).await
    }

    /// Serve on an already-bound listener until shutdown.
    #[instrument(skip_all, name = "gateway")]
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let app = self.router();

        info!(
            address = %listener.local_addr()?,
            path = %self.config.ws_path,
            "Subscriber gateway started"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

        Ok(())
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: GatewayState) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Arc<str>>(state.outbound_queue);
    let subscriber = WsSubscriber::new(peer, outbound_tx);
    let id = subscriber.id();

    // The set holds the only queue sender.
    let count = state.subscribers.add(Arc::new(subscriber));
    info!(subscriber = %id, peer = %peer, subscribers = count, "Subscriber connected");

    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(payload) = outbound_rx.recv().await {
            if sink.send(Message::Text(payload.to_string())).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let mut reader = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => debug!(subscriber = %id, "Keepalive received"),
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    if state.subscribers.remove(&id) {
        info!(
            subscriber = %id,
            peer = %peer,
            subscribers = state.subscribers.len(),
            "Subscriber disconnected"
        );
    } else {
        info!(subscriber = %id, peer = %peer, "Pruned subscriber connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn peer() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_send_queues_payload() {
        let (tx, mut rx) = mpsc::channel(1);
        let subscriber = WsSubscriber::new(peer(), tx);

        assert_ok!(subscriber.send(Arc::from("{}")).await);
        assert_eq!(rx.recv().await.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_full_queue_is_backpressure() {
        let (tx, _rx) = mpsc::channel(1);
        let subscriber = WsSubscriber::new(peer(), tx);

        assert_ok!(subscriber.send(Arc::from("a")).await);
        let err = assert_err!(subscriber.send(Arc::from("b")).await);
        assert_eq!(err, DeliveryError::Backpressure);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_disconnected() {
        let (tx, rx) = mpsc::channel(1);
        let subscriber = WsSubscriber::new(peer(), tx);
        drop(rx);

        assert_eq!(
            subscriber.send(Arc::from("a")).await,
            Err(DeliveryError::Disconnected)
        );
    }
}
