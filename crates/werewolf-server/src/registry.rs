use std::collections::HashMap;

use tokio::sync::mpsc;
use uuid::Uuid;

use werewolf_common::player::valid_name;
use werewolf_common::protocol::ServerMessage;
use werewolf_common::session::GameError;

/// One connected client: identity plus the sender side of its outbound
/// message queue. The connection's writer task drains the other end.
pub struct PlayerHandle {
    pub id: Uuid,
    pub name: String,
    pub tx: mpsc::Sender<ServerMessage>,
}

/// All currently connected players, in join order. Shared between the
/// connection handlers (join/leave) and the session driver (broadcasts);
/// everything goes through the `RwLock` in `ServerState`.
pub struct SessionRegistry {
    players: HashMap<Uuid, PlayerHandle>,
    join_order: Vec<Uuid>,
    accepting: bool,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
            join_order: Vec::new(),
            accepting: true,
        }
    }

    /// Register a new player. A rejected join leaves the registry untouched.
    pub fn join(
        &mut self,
        name: &str,
        tx: mpsc::Sender<ServerMessage>,
    ) -> Result<Uuid, GameError> {
        if !self.accepting {
            return Err(GameError::GameInProgress);
        }
        if !valid_name(name) {
            return Err(GameError::InvalidName);
        }
        if self.players.values().any(|p| p.name == name) {
            return Err(GameError::DuplicateName);
        }

        let id = Uuid::new_v4();
        self.players.insert(
            id,
            PlayerHandle {
                id,
                name: name.to_string(),
                tx,
            },
        );
        self.join_order.push(id);
        Ok(id)
    }

    pub fn remove(&mut self, id: Uuid) -> Option<PlayerHandle> {
        self.join_order.retain(|j| *j != id);
        self.players.remove(&id)
    }

    /// Joins are only accepted while the session sits in the lobby.
    pub fn set_accepting(&mut self, accepting: bool) {
        self.accepting = accepting;
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Connected players as (id, name), stable join order.
    pub fn roster(&self) -> Vec<(Uuid, String)> {
        self.join_order
            .iter()
            .filter_map(|id| self.players.get(id))
            .map(|p| (p.id, p.name.clone()))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.roster().into_iter().map(|(_, name)| name).collect()
    }

    pub async fn send_to(&self, id: Uuid, msg: ServerMessage) {
        if let Some(p) = self.players.get(&id) {
            let _ = p.tx.send(msg).await;
        }
    }

    pub async fn broadcast_to(&self, ids: &[Uuid], msg: &ServerMessage) {
        for id in ids {
            self.send_to(*id, msg.clone()).await;
        }
    }

    pub async fn broadcast_all(&self, msg: &ServerMessage) {
        for id in &self.join_order {
            self.send_to(*id, msg.clone()).await;
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
