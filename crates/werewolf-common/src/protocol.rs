use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::role::Role;
use crate::session::NightAction;

// -- Framing --

pub type Transport = Framed<TcpStream, LengthDelimitedCodec>;

pub fn framed_transport(stream: TcpStream) -> Transport {
    LengthDelimitedCodec::builder()
        .max_frame_length(16 * 1024)
        .new_framed(stream)
}

// -- Client -> Server Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    /// First message on connect: request to join under a display name.
    Join { player_name: String },

    /// Night response, one per active player per night.
    NightAction { action: NightAction },

    /// Day vote, one per active player per day.
    Vote { target: String },

    Disconnect,
}

// -- Server -> Client Messages --

/// The full active roster is broadcast at every phase start; clients filter
/// what they show (a werewolf sees fellow werewolves, the seer resolves
/// inspections locally). The moderator never sends per-client views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Join result; on `accepted: false` the server closes the connection.
    JoinResult { accepted: bool, message: String },

    /// Your role for this game.
    Role { role: Role },

    /// Night phase start with the active roster.
    NightStart { roster: Vec<RosterEntry> },

    /// Day phase start with the active roster.
    DayStart { roster: Vec<RosterEntry> },

    /// You were eliminated this phase.
    Eliminated,

    /// The phase resolved and you survive.
    NotEliminated { reason: String },

    /// Game over, sent to every connected client.
    GameOver { werewolves_won: bool },

    /// Moderator is shutting down; the connection closes after this.
    Shutdown { message: String },
}

// -- Serialization helpers --

pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    Ok(Bytes::from(json))
}

pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    data: &[u8],
) -> Result<T, serde_json::Error> {
    serde_json::from_slice(data)
}

// -- Transport helpers --

pub async fn send_message<T: Serialize>(
    transport: &mut Transport,
    msg: &T,
) -> anyhow::Result<()> {
    let bytes = serialize_message(msg).map_err(|e| anyhow::anyhow!("serialize error: {}", e))?;
    transport
        .send(bytes)
        .await
        .map_err(|e| anyhow::anyhow!("send error: {}", e))
}

pub async fn recv_message<T: for<'de> Deserialize<'de>>(
    transport: &mut Transport,
) -> anyhow::Result<Option<T>> {
    match transport.next().await {
        Some(Ok(frame)) => {
            let msg = deserialize_message(&frame)
                .map_err(|e| anyhow::anyhow!("deserialize error: {}", e))?;
            Ok(Some(msg))
        }
        Some(Err(e)) => Err(anyhow::anyhow!("recv error: {}", e)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_round_trip() {
        let msg = ClientMessage::Join {
            player_name: "Alice".into(),
        };
        let bytes = serialize_message(&msg).unwrap();
        let deserialized: ClientMessage = deserialize_message(&bytes).unwrap();
        match deserialized {
            ClientMessage::Join { player_name } => assert_eq!(player_name, "Alice"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_night_action_round_trip() {
        let msg = ClientMessage::NightAction {
            action: NightAction::Hunted {
                target: "Bob".into(),
            },
        };
        let bytes = serialize_message(&msg).unwrap();
        let deserialized: ClientMessage = deserialize_message(&bytes).unwrap();
        match deserialized {
            ClientMessage::NightAction {
                action: NightAction::Hunted { target },
            } => assert_eq!(target, "Bob"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_phase_start_carries_roster() {
        let msg = ServerMessage::NightStart {
            roster: vec![
                RosterEntry {
                    name: "Alice".into(),
                    role: Role::Werewolf,
                },
                RosterEntry {
                    name: "Bob".into(),
                    role: Role::Villager,
                },
            ],
        };
        let bytes = serialize_message(&msg).unwrap();
        let deserialized: ServerMessage = deserialize_message(&bytes).unwrap();
        match deserialized {
            ServerMessage::NightStart { roster } => {
                assert_eq!(roster.len(), 2);
                assert_eq!(roster[0].role, Role::Werewolf);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_garbage_frame_fails_to_parse() {
        let result: Result<ClientMessage, _> = deserialize_message(b"not json");
        assert!(result.is_err());
    }
}
