use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};

use crate::connection;
use crate::registry::SessionRegistry;
use crate::session::SessionEvent;

pub struct ServerState {
    pub registry: RwLock<SessionRegistry>,
    pub events: mpsc::UnboundedSender<SessionEvent>,
    pub max_connections: usize,
}

pub type SharedState = Arc<ServerState>;

impl ServerState {
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>, max_connections: usize) -> SharedState {
        Arc::new(ServerState {
            registry: RwLock::new(SessionRegistry::new()),
            events,
            max_connections,
        })
    }
}

pub async fn run(listener: TcpListener, state: SharedState) -> anyhow::Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;

        // Enforce max connections
        let conn_count = state.registry.read().await.len();
        if conn_count >= state.max_connections {
            tracing::warn!(
                "Rejecting connection from {} (max {} reached)",
                peer_addr,
                state.max_connections
            );
            drop(stream);
            continue;
        }

        tracing::debug!("New connection from {}", peer_addr);

        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = connection::handle_connection(stream, state).await {
                tracing::warn!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}
