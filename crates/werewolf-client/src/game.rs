use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

use werewolf_common::protocol::{ClientMessage, RosterEntry, ServerMessage};
use werewolf_common::role::Role;
use werewolf_common::session::NightAction;

use crate::network::Link;

/// Interactive player loop. The moderator broadcasts the full roster with
/// roles at every phase start; what the player actually gets to see is
/// filtered here, on the client.
pub struct App {
    name: String,
    role: Option<Role>,
    alive: bool,
    tx: mpsc::Sender<ClientMessage>,
    rx: mpsc::Receiver<ServerMessage>,
    input: Lines<BufReader<Stdin>>,
}

impl App {
    pub fn new(name: String, link: Link) -> Self {
        Self {
            name,
            role: None,
            alive: true,
            tx: link.tx,
            rx: link.rx,
            input: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            let Some(msg) = self.rx.recv().await else {
                println!("Connection to the moderator was lost");
                return Ok(());
            };
            match msg {
                ServerMessage::Role { role } => {
                    self.role = Some(role);
                    self.alive = true;
                    println!("You are a {}", role);
                }
                ServerMessage::NightStart { roster } => {
                    self.handle_night(&roster).await?;
                }
                ServerMessage::DayStart { roster } => {
                    self.handle_day(&roster).await?;
                }
                ServerMessage::Eliminated => {
                    self.alive = false;
                    println!("You have been eliminated; the game goes on without you");
                }
                ServerMessage::NotEliminated { reason } => {
                    println!("{}", reason);
                }
                ServerMessage::GameOver { werewolves_won } => {
                    self.handle_game_over(werewolves_won);
                }
                ServerMessage::Shutdown { message } => {
                    println!("{}", message);
                    return Ok(());
                }
                ServerMessage::JoinResult { .. } => {}
            }
        }
    }

    async fn handle_night(&mut self, roster: &[RosterEntry]) -> anyhow::Result<()> {
        if !self.alive {
            println!("Night falls, but the dead only watch...");
            return Ok(());
        }
        println!("Night falls over the village...");
        let action = match self.role {
            Some(Role::Werewolf) => {
                let pack: Vec<&str> = roster
                    .iter()
                    .filter(|e| e.role.is_werewolf() && e.name != self.name)
                    .map(|e| e.name.as_str())
                    .collect();
                if pack.is_empty() {
                    println!("You are the only remaining werewolf");
                } else {
                    println!("The other werewolves are: {}", pack.join(", "));
                }
                let werewolves: Vec<String> = roster
                    .iter()
                    .filter(|e| e.role.is_werewolf())
                    .map(|e| e.name.clone())
                    .collect();
                let target = self
                    .pick("Select a player to hunt", roster, &werewolves)
                    .await?;
                NightAction::Hunted { target }
            }
            Some(Role::Doctor) => {
                let target = self
                    .pick("Select a player you would like to save", roster, &[])
                    .await?;
                NightAction::Saved { target }
            }
            Some(Role::Seer) => {
                let me = [self.name.clone()];
                let target = self
                    .pick("Select a player you would like to know about", roster, &me)
                    .await?;
                let is_werewolf = roster
                    .iter()
                    .any(|e| e.name == target && e.role.is_werewolf());
                println!(
                    "{} {} a werewolf",
                    target,
                    if is_werewolf { "IS" } else { "is NOT" }
                );
                NightAction::None { target }
            }
            _ => {
                // Villagers submit a decoy pick so nobody can tell who is
                // acting from traffic alone.
                let target = self.pick("Select a random person", roster, &[]).await?;
                NightAction::None { target }
            }
        };
        self.tx.send(ClientMessage::NightAction { action }).await?;
        println!("Waiting for the rest of the village...");
        Ok(())
    }

    async fn handle_day(&mut self, roster: &[RosterEntry]) -> anyhow::Result<()> {
        if !self.alive {
            println!("The trial begins, but the dead get no vote...");
            return Ok(());
        }
        println!("Time for trial...");
        let me = [self.name.clone()];
        let target = self
            .pick("Select the person you would like to put on trial", roster, &me)
            .await?;
        self.tx.send(ClientMessage::Vote { target }).await?;
        println!("Waiting for the rest of the village...");
        Ok(())
    }

    fn handle_game_over(&mut self, werewolves_won: bool) {
        if werewolves_won {
            println!("The werewolves have won!");
        } else {
            println!("The villagers have won!");
        }
        if let Some(role) = self.role.take() {
            let i_won = werewolves_won == role.is_werewolf();
            println!(
                "You were a {}. You have {}!",
                role,
                if i_won { "won" } else { "lost" }
            );
        }
    }

    /// Numbered pick from the roster, minus excluded names. Re-prompts on
    /// anything that isn't a valid selection.
    async fn pick(
        &mut self,
        prompt: &str,
        roster: &[RosterEntry],
        excluded: &[String],
    ) -> anyhow::Result<String> {
        let choices: Vec<&str> = roster
            .iter()
            .map(|e| e.name.as_str())
            .filter(|name| !excluded.iter().any(|ex| ex.as_str() == *name))
            .collect();

        println!("{}:", prompt);
        for (i, name) in choices.iter().enumerate() {
            println!("  {}. {}", i + 1, name);
        }

        loop {
            let Some(line) = self.input.next_line().await? else {
                // Closed input is the player leaving; tell the moderator
                // before bailing out.
                let _ = self.tx.send(ClientMessage::Disconnect).await;
                anyhow::bail!("input closed, leaving the game");
            };
            match line.trim().parse::<usize>() {
                Ok(n) if (1..=choices.len()).contains(&n) => {
                    return Ok(choices[n - 1].to_string());
                }
                _ => println!("Invalid selection, please try again..."),
            }
        }
    }
}
