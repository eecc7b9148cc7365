use anyhow::{anyhow, bail};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use werewolf_common::protocol::{
    self, ClientMessage, ServerMessage, Transport, deserialize_message, framed_transport,
    serialize_message,
};

/// A live link to the moderator after an accepted join. Outbound messages
/// queue on `tx`; `rx` closing means the link is gone.
pub struct Link {
    pub tx: mpsc::Sender<ClientMessage>,
    pub rx: mpsc::Receiver<ServerMessage>,
}

/// The moderator's verdict on a join request.
pub enum JoinOutcome {
    Accepted { greeting: String, link: Link },
    Rejected { reason: String },
}

/// Dial the moderator and run the join handshake on the bare transport.
/// Only an accepted join spawns the socket pump; a rejection leaves
/// nothing running.
pub async fn connect(addr: &str, player_name: &str) -> anyhow::Result<JoinOutcome> {
    let stream = TcpStream::connect(addr).await?;
    let mut transport = framed_transport(stream);

    protocol::send_message(
        &mut transport,
        &ClientMessage::Join {
            player_name: player_name.to_string(),
        },
    )
    .await?;

    let verdict = protocol::recv_message::<ServerMessage>(&mut transport)
        .await?
        .ok_or_else(|| anyhow!("moderator closed the connection during join"))?;

    match verdict {
        ServerMessage::JoinResult {
            accepted: true,
            message,
        } => Ok(JoinOutcome::Accepted {
            greeting: message,
            link: spawn_pump(transport),
        }),
        ServerMessage::JoinResult {
            accepted: false,
            message,
        } => Ok(JoinOutcome::Rejected { reason: message }),
        other => bail!("unexpected reply to join: {:?}", other),
    }
}

/// One task owns the socket and shuttles frames both ways. The pump stops
/// when the app drops its sender, the moderator closes the stream, or a
/// frame fails to decode; dropping `in_tx` on the way out is what tells
/// the app the connection is gone.
fn spawn_pump(transport: Transport) -> Link {
    let (out_tx, mut out_rx) = mpsc::channel::<ClientMessage>(32);
    let (in_tx, in_rx) = mpsc::channel::<ServerMessage>(32);

    tokio::spawn(async move {
        let (mut sink, mut stream) = transport.split();
        loop {
            tokio::select! {
                outbound = out_rx.recv() => {
                    let Some(msg) = outbound else { break };
                    match serialize_message(&msg) {
                        Ok(bytes) => {
                            if sink.send(bytes).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::error!("Failed to serialize message: {}", e),
                    }
                }
                inbound = stream.next() => {
                    match inbound {
                        Some(Ok(frame)) => match deserialize_message::<ServerMessage>(&frame) {
                            Ok(msg) => {
                                if in_tx.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!("Undecodable frame from the moderator: {}", e);
                                break;
                            }
                        },
                        Some(Err(e)) => {
                            tracing::warn!("Connection error: {}", e);
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    });

    Link {
        tx: out_tx,
        rx: in_rx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn fake_moderator() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_rejected_join_reports_the_reason() {
        let (listener, addr) = fake_moderator().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut transport = framed_transport(stream);
            let join: Option<ClientMessage> =
                protocol::recv_message(&mut transport).await.unwrap();
            assert!(matches!(join, Some(ClientMessage::Join { .. })));
            protocol::send_message(
                &mut transport,
                &ServerMessage::JoinResult {
                    accepted: false,
                    message: "Name is taken".into(),
                },
            )
            .await
            .unwrap();
        });

        match connect(&addr, "Alice").await.unwrap() {
            JoinOutcome::Rejected { reason } => assert_eq!(reason, "Name is taken"),
            JoinOutcome::Accepted { .. } => panic!("join should have been rejected"),
        }
    }

    #[tokio::test]
    async fn test_link_closes_when_the_moderator_goes_away() {
        let (listener, addr) = fake_moderator().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut transport = framed_transport(stream);
            let _join: Option<ClientMessage> =
                protocol::recv_message(&mut transport).await.unwrap();
            protocol::send_message(
                &mut transport,
                &ServerMessage::JoinResult {
                    accepted: true,
                    message: "Welcome".into(),
                },
            )
            .await
            .unwrap();
            protocol::send_message(
                &mut transport,
                &ServerMessage::Shutdown {
                    message: "Closing".into(),
                },
            )
            .await
            .unwrap();
        });

        let JoinOutcome::Accepted { greeting, mut link } = connect(&addr, "Alice").await.unwrap()
        else {
            panic!("join should have been accepted");
        };
        assert_eq!(greeting, "Welcome");
        match link.rx.recv().await {
            Some(ServerMessage::Shutdown { message }) => assert_eq!(message, "Closing"),
            other => panic!("expected shutdown, got {:?}", other),
        }
        // The moderator hung up after the shutdown notice; the pump closes
        // the inbound channel behind it.
        assert!(link.rx.recv().await.is_none());
    }
}
