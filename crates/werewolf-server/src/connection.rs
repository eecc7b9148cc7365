use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use uuid::Uuid;

use werewolf_common::protocol::{
    self, ClientMessage, ServerMessage, Transport, framed_transport, serialize_message,
};
use werewolf_common::session::GameError;

use crate::server::SharedState;
use crate::session::SessionEvent;

/// One task per client for the lifetime of the connection. The handshake
/// registers the player; after that the reader loop only forwards events
/// into the session driver, so nothing here can stall another connection.
pub async fn handle_connection(stream: TcpStream, state: SharedState) -> anyhow::Result<()> {
    let mut transport = framed_transport(stream);

    // Step 1: Handshake -- first frame must be Join
    let join: ClientMessage = match protocol::recv_message(&mut transport).await? {
        Some(msg) => msg,
        None => return Ok(()),
    };

    let player_name = match join {
        ClientMessage::Join { player_name } => player_name,
        _ => {
            protocol::send_message(
                &mut transport,
                &ServerMessage::JoinResult {
                    accepted: false,
                    message: "Expected a join request".into(),
                },
            )
            .await?;
            return Ok(());
        }
    };

    // Step 2: Register; the outbound mpsc is created first so the handle
    // can carry its sender.
    let (tx, rx) = mpsc::channel::<ServerMessage>(64);
    let joined = state.registry.write().await.join(&player_name, tx);

    let player_id = match joined {
        Ok(id) => {
            tracing::info!("Player '{}' joined", player_name);
            id
        }
        Err(e) => {
            let message = match e {
                GameError::GameInProgress => "Game has already begun".to_string(),
                _ => e.to_string(),
            };
            tracing::info!("Rejected join from '{}': {}", player_name, message);
            protocol::send_message(
                &mut transport,
                &ServerMessage::JoinResult {
                    accepted: false,
                    message,
                },
            )
            .await?;
            return Ok(());
        }
    };

    // The player is registered from here on: every exit path, a failed
    // join reply included, must unregister and emit Disconnected, or a
    // phase barrier could wait forever on a connection that is gone.
    let result = serve_player(transport, player_id, &player_name, &state, rx).await;

    state.registry.write().await.remove(player_id);
    let _ = state
        .events
        .send(SessionEvent::Disconnected { player: player_id });
    result
}

async fn serve_player(
    mut transport: Transport,
    player_id: Uuid,
    player_name: &str,
    state: &SharedState,
    mut rx: mpsc::Receiver<ServerMessage>,
) -> anyhow::Result<()> {
    protocol::send_message(
        &mut transport,
        &ServerMessage::JoinResult {
            accepted: true,
            message: "Welcome to Werewolf, please wait for all of the players to join".into(),
        },
    )
    .await?;

    // Split transport; writer task drains rx into the sink
    let (mut sink, mut stream) = transport.split();
    let write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serialize_message(&msg) {
                Ok(bytes) => {
                    let closing = matches!(msg, ServerMessage::Shutdown { .. });
                    if sink.send(bytes).await.is_err() || closing {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                }
            }
        }
    });

    // Reader loop -- forward responses to the session driver. A frame that
    // doesn't parse is a protocol violation: drop the client rather than
    // risk the coordinator.
    loop {
        match stream.next().await {
            Some(Ok(frame)) => match protocol::deserialize_message::<ClientMessage>(&frame) {
                Ok(ClientMessage::NightAction { action }) => {
                    let _ = state.events.send(SessionEvent::NightResponse {
                        player: player_id,
                        action,
                    });
                }
                Ok(ClientMessage::Vote { target }) => {
                    let _ = state.events.send(SessionEvent::VoteResponse {
                        player: player_id,
                        target,
                    });
                }
                Ok(ClientMessage::Disconnect) => {
                    tracing::info!("Player '{}' disconnected", player_name);
                    break;
                }
                Ok(ClientMessage::Join { .. }) => {
                    tracing::warn!("Player '{}' sent a second join request", player_name);
                }
                Err(e) => {
                    tracing::warn!(
                        "Malformed frame from '{}', disconnecting: {}",
                        player_name,
                        e
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!("Read error from '{}': {}", player_name, e);
                break;
            }
            None => {
                tracing::info!("Player '{}' disconnected", player_name);
                break;
            }
        }
    }

    write_task.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    use crate::server::ServerState;

    async fn spawn_server(
        conns: usize,
    ) -> (SharedState, UnboundedReceiver<SessionEvent>, SocketAddr) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = ServerState::new(events_tx, 10);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_state = state.clone();
        tokio::spawn(async move {
            for _ in 0..conns {
                let (stream, _) = listener.accept().await.unwrap();
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, state).await;
                });
            }
        });
        (state, events_rx, addr)
    }

    async fn join(addr: SocketAddr, name: &str) -> Transport {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut transport = framed_transport(stream);
        protocol::send_message(
            &mut transport,
            &ClientMessage::Join {
                player_name: name.into(),
            },
        )
        .await
        .unwrap();
        match protocol::recv_message::<ServerMessage>(&mut transport)
            .await
            .unwrap()
        {
            Some(ServerMessage::JoinResult { accepted: true, .. }) => transport,
            other => panic!("join failed: {:?}", other),
        }
    }

    async fn wait_for_len(state: &SharedState, len: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while state.registry.read().await.len() != len {
            assert!(
                tokio::time::Instant::now() < deadline,
                "registry never reached {} players",
                len
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_connection_reset_after_join_still_unregisters() {
        let (state, mut events, addr) = spawn_server(1).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut transport = framed_transport(stream);
        protocol::send_message(
            &mut transport,
            &ClientMessage::Join {
                player_name: "Ghost".into(),
            },
        )
        .await
        .unwrap();
        wait_for_len(&state, 1).await;

        // Reset the socket without ever reading the join reply. However far
        // the handler got, it must unregister and emit a disconnect so no
        // phase barrier can end up waiting on the ghost.
        let stream = transport.into_inner();
        stream.set_linger(Some(Duration::from_secs(0))).unwrap();
        drop(stream);

        let event = timeout(Duration::from_secs(2), events.recv()).await.unwrap();
        assert!(matches!(event, Some(SessionEvent::Disconnected { .. })));
        assert!(state.registry.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_message_unregisters_player() {
        let (state, mut events, addr) = spawn_server(1).await;

        let mut alice = join(addr, "Alice").await;
        wait_for_len(&state, 1).await;

        protocol::send_message(&mut alice, &ClientMessage::Disconnect)
            .await
            .unwrap();

        let event = timeout(Duration::from_secs(2), events.recv()).await.unwrap();
        assert!(matches!(event, Some(SessionEvent::Disconnected { .. })));
        assert!(state.registry.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frame_disconnects_only_the_offender() {
        let (state, mut events, addr) = spawn_server(2).await;

        let mut mallory = join(addr, "Mallory").await;
        let _bob = join(addr, "Bob").await;
        wait_for_len(&state, 2).await;

        // A frame that isn't a ClientMessage drops Mallory but leaves Bob
        // registered and connected.
        mallory.send(Bytes::from_static(b"not json")).await.unwrap();

        let event = timeout(Duration::from_secs(2), events.recv()).await.unwrap();
        assert!(matches!(event, Some(SessionEvent::Disconnected { .. })));
        wait_for_len(&state, 1).await;
        assert_eq!(state.registry.read().await.names(), vec!["Bob"]);
    }
}
