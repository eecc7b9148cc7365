use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::player::Player;
use crate::role::{self, Role, MIN_PLAYERS};

// -- Phase State Machine --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Lobby,
    RoleAssignment,
    Night,
    Day,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    Werewolves,
    Villagers,
}

// -- Phase responses and outcomes --

/// One player's submission during the night phase. Villagers and the seer
/// submit `None` (with a decoy/inspected target), the werewolves `Hunted`,
/// the doctor `Saved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NightAction {
    None { target: String },
    Hunted { target: String },
    Saved { target: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EliminationReason {
    Hunted,
    Jailed,
    Disconnected,
}

impl EliminationReason {
    /// Text sent to survivors in the `NotEliminated` notice.
    pub fn survivor_notice(self, name: &str) -> String {
        match self {
            EliminationReason::Hunted => format!("{} was hunted during the night", name),
            EliminationReason::Jailed => format!("{} has been jailed", name),
            EliminationReason::Disconnected => format!("{} has left the village", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EliminationOutcome {
    NoElimination { notice: String },
    Eliminated { id: Uuid, reason: EliminationReason },
}

// -- Errors --

#[derive(Debug, Clone, thiserror::Error)]
pub enum GameError {
    #[error("not enough players to begin (have {have}, need {need})")]
    InsufficientPlayers { have: usize, need: usize },
    #[error("name already taken")]
    DuplicateName,
    #[error("name must be 1-15 characters with no surrounding whitespace")]
    InvalidName,
    #[error("game already in progress")]
    GameInProgress,
    #[error("not allowed in the current phase")]
    WrongPhase,
}

// -- Session --

/// The moderator's view of one game: who is playing, who is still alive,
/// and which phase the session is in. Pure state; all I/O happens in the
/// server crate.
#[derive(Debug, Clone)]
pub struct GameSession {
    pub phase: SessionPhase,
    players: Vec<Player>,
}

impl GameSession {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Lobby,
            players: Vec::new(),
        }
    }

    /// Everyone in the current game, join order, eliminated players included.
    pub fn all_players(&self) -> &[Player] {
        &self.players
    }

    /// Players still alive and eligible to act, stable join order.
    pub fn active_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.alive)
    }

    pub fn active_count(&self) -> usize {
        self.active_players().count()
    }

    pub fn player(&self, id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    fn active_by_name(&self, name: &str) -> Option<&Player> {
        self.active_players().find(|p| p.name == name)
    }

    /// Lobby -> RoleAssignment: deal roles across the given roster.
    /// The session roster is rebuilt from scratch, so a "play again" uses
    /// whoever is connected now, not the previous game's roster.
    pub fn begin(
        &mut self,
        roster: Vec<(Uuid, String)>,
        rng: &mut impl Rng,
    ) -> Result<HashMap<Uuid, Role>, GameError> {
        if self.phase != SessionPhase::Lobby {
            return Err(GameError::GameInProgress);
        }
        if roster.len() < MIN_PLAYERS {
            return Err(GameError::InsufficientPlayers {
                have: roster.len(),
                need: MIN_PLAYERS,
            });
        }

        let ids: Vec<Uuid> = roster.iter().map(|(id, _)| *id).collect();
        let assignment = role::assign_roles(&ids, rng)?;

        self.players = roster
            .into_iter()
            .map(|(id, name)| {
                let mut p = Player::new(id, name);
                p.role = assignment[&p.id];
                p
            })
            .collect();
        self.phase = SessionPhase::RoleAssignment;
        Ok(assignment)
    }

    pub fn start_night(&mut self) -> Result<(), GameError> {
        self.start_phase(SessionPhase::Night)
    }

    pub fn start_day(&mut self) -> Result<(), GameError> {
        self.start_phase(SessionPhase::Day)
    }

    fn start_phase(&mut self, phase: SessionPhase) -> Result<(), GameError> {
        match self.phase {
            SessionPhase::RoleAssignment | SessionPhase::Night | SessionPhase::Day => {
                self.phase = phase;
                Ok(())
            }
            _ => Err(GameError::WrongPhase),
        }
    }

    /// Resolve a completed night from the actions in arrival order.
    ///
    /// The hunted and saved targets are each reduced to a plurality winner;
    /// the doctor saves whenever both point at the same player (or nobody
    /// was hunted at all).
    pub fn resolve_night(&self, actions: &[NightAction]) -> EliminationOutcome {
        let hunted: Vec<&str> = actions
            .iter()
            .filter_map(|a| match a {
                NightAction::Hunted { target } => Some(target.as_str()),
                _ => None,
            })
            .collect();
        let saved: Vec<&str> = actions
            .iter()
            .filter_map(|a| match a {
                NightAction::Saved { target } => Some(target.as_str()),
                _ => None,
            })
            .collect();

        let player_hunted = plurality_winner(&hunted).map(|(name, _)| name);
        let player_saved = plurality_winner(&saved).map(|(name, _)| name);

        match player_hunted {
            None => EliminationOutcome::NoElimination {
                notice: "nobody was hunted during the night".into(),
            },
            Some(hunted_name) if player_saved == Some(hunted_name) => {
                EliminationOutcome::NoElimination {
                    notice: format!("{} was hunted, but saved", hunted_name),
                }
            }
            Some(hunted_name) => match self.active_by_name(hunted_name) {
                Some(p) => EliminationOutcome::Eliminated {
                    id: p.id,
                    reason: EliminationReason::Hunted,
                },
                // Target is not an active player; the hunt misses.
                None => EliminationOutcome::NoElimination {
                    notice: "nobody was hunted during the night".into(),
                },
            },
        }
    }

    /// Resolve a completed day vote. Elimination requires a strict majority
    /// of the active player count, not just a plurality.
    pub fn resolve_day(&self, votes: &[String]) -> EliminationOutcome {
        let targets: Vec<&str> = votes.iter().map(String::as_str).collect();
        let no_majority = EliminationOutcome::NoElimination {
            notice: "no player received a majority vote".into(),
        };
        match plurality_winner(&targets) {
            Some((name, count)) if count > self.active_count() / 2 => {
                match self.active_by_name(name) {
                    Some(p) => EliminationOutcome::Eliminated {
                        id: p.id,
                        reason: EliminationReason::Jailed,
                    },
                    None => no_majority,
                }
            }
            _ => no_majority,
        }
    }

    /// Mark a player eliminated. They stay in the roster (still connected,
    /// spectating) but no longer act or vote.
    pub fn apply_elimination(&mut self, id: Uuid) {
        if let Some(p) = self.players.iter_mut().find(|p| p.id == id) {
            p.alive = false;
        }
    }

    /// Drop a disconnected player from the roster entirely.
    pub fn remove_player(&mut self, id: Uuid) {
        self.players.retain(|p| p.id != id);
    }

    /// Werewolves win once they equal or outnumber the rest; villagers win
    /// once no werewolf is left. Checked after every elimination.
    pub fn check_winner(&self) -> Option<Winner> {
        let werewolves = self.active_players().filter(|p| p.role.is_werewolf()).count();
        let others = self.active_count() - werewolves;
        if others <= werewolves {
            Some(Winner::Werewolves)
        } else if werewolves == 0 {
            Some(Winner::Villagers)
        } else {
            None
        }
    }

    pub fn finish(&mut self) {
        self.phase = SessionPhase::GameOver;
    }

    /// GameOver -> Lobby. The roster persists; roles reset to villager and
    /// everyone comes back to life pending the next deal.
    pub fn reset_for_lobby(&mut self) -> Result<(), GameError> {
        if self.phase != SessionPhase::GameOver {
            return Err(GameError::WrongPhase);
        }
        for p in &mut self.players {
            p.role = Role::Villager;
            p.alive = true;
        }
        self.phase = SessionPhase::Lobby;
        Ok(())
    }

    pub fn in_progress(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::RoleAssignment | SessionPhase::Night | SessionPhase::Day
        )
    }
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Plurality with a deterministic tie-break: walking the targets in arrival
/// order, the first candidate to reach a new maximum count wins, so earlier
/// responses beat later ones on equal counts.
pub fn plurality_winner<'a>(targets: &[&'a str]) -> Option<(&'a str, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for t in targets {
        *counts.entry(t).or_insert(0) += 1;
    }
    let mut best: Option<(&'a str, usize)> = None;
    for t in targets {
        let count = counts[t];
        if best.map_or(true, |(_, b)| count > b) {
            best = Some((t, count));
        }
    }
    best
}
