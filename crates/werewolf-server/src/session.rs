use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use uuid::Uuid;

use werewolf_common::protocol::{RosterEntry, ServerMessage};
use werewolf_common::session::{
    EliminationOutcome, GameSession, NightAction, SessionPhase, Winner,
};

use crate::server::SharedState;

/// Discrete triggers from the operator console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Begin,
    Night,
    Day,
    PlayAgain,
    Exit,
}

/// Everything that can reach the session driver: responses and disconnects
/// fanned in from the connection handlers, commands from the console.
#[derive(Debug)]
pub enum SessionEvent {
    NightResponse { player: Uuid, action: NightAction },
    VoteResponse { player: Uuid, target: String },
    Disconnected { player: Uuid },
    Operator(OperatorCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseKind {
    Night,
    Day,
}

enum PhaseRun {
    Completed,
    Shutdown,
}

/// The single task that owns the game. All shared-state mutation funnels
/// through its event channel, so exactly one phase is ever in flight and
/// response tallying never races.
pub struct SessionDriver {
    state: SharedState,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    game: GameSession,
    rng: StdRng,
}

impl SessionDriver {
    pub fn new(state: SharedState, rx: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        Self::with_rng(state, rx, StdRng::from_entropy())
    }

    /// Seedable constructor for reproducible role deals.
    pub fn with_rng(
        state: SharedState,
        rx: mpsc::UnboundedReceiver<SessionEvent>,
        rng: StdRng,
    ) -> Self {
        Self {
            state,
            rx,
            game: GameSession::new(),
            rng,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        while let Some(event) = self.rx.recv().await {
            match event {
                SessionEvent::Operator(cmd) => {
                    if let PhaseRun::Shutdown = self.handle_operator(cmd).await? {
                        break;
                    }
                }
                SessionEvent::Disconnected { player } => {
                    self.handle_disconnect(player).await;
                }
                SessionEvent::NightResponse { .. } | SessionEvent::VoteResponse { .. } => {
                    tracing::debug!("Ignoring response outside an active phase");
                }
            }
        }
        Ok(())
    }

    async fn handle_operator(&mut self, cmd: OperatorCommand) -> anyhow::Result<PhaseRun> {
        match cmd {
            OperatorCommand::Begin => self.handle_begin().await,
            OperatorCommand::Night => self.handle_phase_command(PhaseKind::Night).await,
            OperatorCommand::Day => self.handle_phase_command(PhaseKind::Day).await,
            OperatorCommand::PlayAgain => {
                match self.game.reset_for_lobby() {
                    Ok(()) => {
                        self.state.registry.write().await.set_accepting(true);
                        tracing::info!("Back to the lobby; accepting players again");
                    }
                    Err(e) => tracing::warn!("Cannot return to lobby: {}", e),
                }
                Ok(PhaseRun::Completed)
            }
            OperatorCommand::Exit => {
                self.shutdown().await;
                Ok(PhaseRun::Shutdown)
            }
        }
    }

    async fn handle_begin(&mut self) -> anyhow::Result<PhaseRun> {
        let roster = self.state.registry.read().await.roster();
        let assignment = match self.game.begin(roster, &mut self.rng) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!("Cannot begin: {}", e);
                return Ok(PhaseRun::Completed);
            }
        };

        {
            let mut registry = self.state.registry.write().await;
            registry.set_accepting(false);
        }

        tracing::info!("Roles dealt to {} players", assignment.len());
        {
            let registry = self.state.registry.read().await;
            for (id, role) in &assignment {
                registry.send_to(*id, ServerMessage::Role { role: *role }).await;
            }
        }

        // The first night follows role assignment immediately; later phases
        // wait for the operator's night/day choice.
        self.run_phase(PhaseKind::Night).await
    }

    async fn handle_phase_command(&mut self, kind: PhaseKind) -> anyhow::Result<PhaseRun> {
        if !self.game.in_progress() {
            tracing::warn!("No game in progress");
            return Ok(PhaseRun::Completed);
        }
        self.run_phase(kind).await
    }

    /// Drive one phase to completion: broadcast the start message, then
    /// block on the response barrier until every active player has answered
    /// or dropped, then resolve.
    async fn run_phase(&mut self, kind: PhaseKind) -> anyhow::Result<PhaseRun> {
        let started = match kind {
            PhaseKind::Night => self.game.start_night(),
            PhaseKind::Day => self.game.start_day(),
        };
        if let Err(e) = started {
            tracing::warn!("Cannot start phase: {}", e);
            return Ok(PhaseRun::Completed);
        }

        let roster: Vec<RosterEntry> = self
            .game
            .active_players()
            .map(|p| RosterEntry {
                name: p.name.clone(),
                role: p.role,
            })
            .collect();
        let active_ids: Vec<Uuid> = self.game.active_players().map(|p| p.id).collect();

        let start_msg = match kind {
            PhaseKind::Night => ServerMessage::NightStart { roster },
            PhaseKind::Day => ServerMessage::DayStart { roster },
        };
        tracing::info!(
            "{:?} phase started with {} active players",
            self.game.phase,
            active_ids.len()
        );
        self.state
            .registry
            .read()
            .await
            .broadcast_to(&active_ids, &start_msg)
            .await;

        // Response barrier: a counted receive over the event channel.
        // Disconnects shrink the pending set so the wait can never hang on
        // a response that will never arrive.
        let mut pending: HashSet<Uuid> = active_ids.iter().copied().collect();
        let mut actions: Vec<(Uuid, NightAction)> = Vec::new();
        let mut votes: Vec<(Uuid, String)> = Vec::new();

        while !pending.is_empty() {
            let event = match self.rx.recv().await {
                Some(e) => e,
                None => return Ok(PhaseRun::Shutdown),
            };
            match event {
                SessionEvent::NightResponse { player, action } if kind == PhaseKind::Night => {
                    if pending.remove(&player) {
                        actions.push((player, action));
                    } else {
                        tracing::debug!("Duplicate or inactive night response ignored");
                    }
                }
                SessionEvent::VoteResponse { player, target } if kind == PhaseKind::Day => {
                    if pending.remove(&player) {
                        votes.push((player, target));
                    } else {
                        tracing::debug!("Duplicate or inactive vote ignored");
                    }
                }
                SessionEvent::NightResponse { .. } | SessionEvent::VoteResponse { .. } => {
                    tracing::debug!("Out-of-phase response ignored");
                }
                SessionEvent::Disconnected { player } => {
                    // Implicit elimination: no longer pending, and whatever
                    // they already submitted this phase is withdrawn.
                    pending.remove(&player);
                    actions.retain(|(id, _)| *id != player);
                    votes.retain(|(id, _)| *id != player);
                    self.handle_disconnect(player).await;
                    if self.game.phase == SessionPhase::GameOver {
                        return Ok(PhaseRun::Completed);
                    }
                }
                SessionEvent::Operator(OperatorCommand::Exit) => {
                    self.shutdown().await;
                    return Ok(PhaseRun::Shutdown);
                }
                SessionEvent::Operator(cmd) => {
                    tracing::warn!("Ignoring {:?} while a phase is in flight", cmd);
                }
            }
            self.log_pending(&pending);
        }

        let outcome = match kind {
            PhaseKind::Night => {
                let ordered: Vec<NightAction> =
                    actions.into_iter().map(|(_, a)| a).collect();
                self.game.resolve_night(&ordered)
            }
            PhaseKind::Day => {
                let ordered: Vec<String> = votes.into_iter().map(|(_, t)| t).collect();
                self.game.resolve_day(&ordered)
            }
        };
        self.apply_outcome(outcome).await;
        Ok(PhaseRun::Completed)
    }

    async fn apply_outcome(&mut self, outcome: EliminationOutcome) {
        match outcome {
            EliminationOutcome::NoElimination { notice } => {
                tracing::info!("Phase resolved: {}", notice);
                let active: Vec<Uuid> = self.game.active_players().map(|p| p.id).collect();
                self.state
                    .registry
                    .read()
                    .await
                    .broadcast_to(&active, &ServerMessage::NotEliminated { reason: notice })
                    .await;
            }
            EliminationOutcome::Eliminated { id, reason } => {
                let name = self
                    .game
                    .player(id)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                self.game.apply_elimination(id);
                let notice = reason.survivor_notice(&name);
                tracing::info!("Phase resolved: {}", notice);

                let survivors: Vec<Uuid> = self.game.active_players().map(|p| p.id).collect();
                {
                    let registry = self.state.registry.read().await;
                    registry.send_to(id, ServerMessage::Eliminated).await;
                    registry
                        .broadcast_to(&survivors, &ServerMessage::NotEliminated { reason: notice })
                        .await;
                }

                if let Some(winner) = self.game.check_winner() {
                    self.announce_winner(winner).await;
                }
            }
        }
    }

    /// A disconnect during LOBBY or GAME_OVER is pure roster bookkeeping
    /// (the registry already forgot the connection). Mid-game it is an
    /// involuntary elimination, which can itself decide the game.
    async fn handle_disconnect(&mut self, player: Uuid) {
        let Some(p) = self.game.player(player) else {
            return;
        };
        let name = p.name.clone();
        self.game.remove_player(player);

        if self.game.in_progress() {
            tracing::info!("'{}' disconnected mid-game and is out", name);
            if let Some(winner) = self.game.check_winner() {
                self.announce_winner(winner).await;
            }
        } else {
            tracing::info!("'{}' disconnected", name);
        }
    }

    /// Game over goes to everyone still connected, eliminated spectators
    /// included.
    async fn announce_winner(&mut self, winner: Winner) {
        let werewolves_won = winner == Winner::Werewolves;
        tracing::info!(
            "Game over: the {} have won",
            if werewolves_won { "werewolves" } else { "villagers" }
        );
        self.game.finish();
        self.state
            .registry
            .read()
            .await
            .broadcast_all(&ServerMessage::GameOver { werewolves_won })
            .await;
    }

    async fn shutdown(&mut self) {
        tracing::info!("Operator exit: notifying clients and shutting down");
        self.state
            .registry
            .read()
            .await
            .broadcast_all(&ServerMessage::Shutdown {
                message: "The moderator has ended the session".into(),
            })
            .await;
    }

    fn log_pending(&self, pending: &HashSet<Uuid>) {
        if pending.is_empty() {
            return;
        }
        let names: Vec<&str> = self
            .game
            .active_players()
            .filter(|p| pending.contains(&p.id))
            .map(|p| p.name.as_str())
            .collect();
        tracing::info!("Waiting on {} player(s): {}", names.len(), names.join(", "));
    }
}
