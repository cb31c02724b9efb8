use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use crate::output::MessagePublisher;
use crate::utils::error::PublishError;

type ClientSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type Clients = Arc<RwLock<HashMap<String, ClientSink>>>;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Publish socket: any WebSocket client connecting to the bind address
/// receives every published message. Inbound messages are ignored.
pub struct WebSocketPublisher {
    clients: Clients,
    local_addr: SocketAddr,
    destination: String,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketPublisher {
    pub async fn bind(address: &str) -> Result<Self, PublishError> {
        let listener = TcpListener::bind(address).await.map_err(|e| PublishError::Bind {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
        let local_addr = listener.local_addr().map_err(|e| PublishError::Bind {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
        info!("🔌 Publish socket listening on ws://{}", local_addr);

        let clients: Clients = Arc::new(RwLock::new(HashMap::new()));
        let accept_task = tokio::spawn(accept_loop(listener, clients.clone()));

        Ok(Self {
            clients,
            local_addr,
            destination: format!("ws://{}", local_addr),
            accept_task: Mutex::new(Some(accept_task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn subscriber_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

async fn accept_loop(listener: TcpListener, clients: Clients) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let client_id = addr.to_string();
                match accept_async(stream).await {
                    Ok(ws_stream) => {
                        info!("✅ Subscriber connected: {}", client_id);
                        let (write, read) = ws_stream.split();
                        clients.write().await.insert(client_id.clone(), write);
                        tokio::spawn(watch_client(client_id, read, clients.clone()));
                    }
                    Err(e) => warn!("❌ WebSocket handshake with {} failed: {}", client_id, e),
                }
            }
            Err(e) => error!("Failed to accept subscriber: {}", e),
        }
    }
}

// Reads until the peer goes away so control frames get answered
async fn watch_client(
    client_id: String,
    mut read_half: SplitStream<WebSocketStream<TcpStream>>,
    clients: Clients,
) {
    while let Some(msg) = read_half.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(other) => debug!("Ignoring message from subscriber {}: {:?}", client_id, other),
            Err(e) => {
                debug!("Subscriber {} read error: {}", client_id, e);
                break;
            }
        }
    }
    if clients.write().await.remove(&client_id).is_some() {
        info!("🔌 Subscriber disconnected: {}", client_id);
    }
}

#[async_trait]
impl MessagePublisher for WebSocketPublisher {
    async fn publish(&self, message: &str) -> Result<(), PublishError> {
        let is_open = self
            .accept_task
            .lock()
            .map(|task| task.is_some())
            .unwrap_or(false);
        if !is_open {
            return Err(PublishError::Closed);
        }

        let mut clients = self.clients.write().await;
        let total = clients.len();
        let mut failed_clients = Vec::new();

        for (client_id, sink) in clients.iter_mut() {
            let frame = Message::Text(message.to_string());
            match timeout(SEND_TIMEOUT, sink.send(frame)).await {
                Ok(Ok(())) => debug!("Published {} bytes to {}", message.len(), client_id),
                Ok(Err(e)) => {
                    warn!("Failed to publish to {}: {}", client_id, e);
                    failed_clients.push(client_id.clone());
                }
                Err(_) => {
                    warn!("⏱️ Timeout publishing to {}", client_id);
                    failed_clients.push(client_id.clone());
                }
            }
        }

        for client_id in &failed_clients {
            clients.remove(client_id);
            info!("🔌 Dropped subscriber {}", client_id);
        }

        if failed_clients.is_empty() {
            Ok(())
        } else {
            Err(PublishError::Delivery {
                failed: failed_clients.len(),
                total,
            })
        }
    }

    async fn close(&self) {
        let task = match self.accept_task.lock() {
            Ok(mut task) => task.take(),
            Err(_) => None,
        };
        if let Some(task) = task {
            task.abort();
        }

        let mut clients = self.clients.write().await;
        for (client_id, mut sink) in clients.drain() {
            if let Err(e) = sink.close().await {
                warn!("Failed to close connection to {}: {}", client_id, e);
            }
        }
        info!("✅ Publish socket {} closed", self.destination);
    }

    fn sender_type(&self) -> &str {
        "websocket"
    }

    fn destination(&self) -> &str {
        &self.destination
    }
}
