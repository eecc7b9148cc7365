use tokio::io::{AsyncBufReadExt, BufReader};

use crate::server::SharedState;
use crate::session::{OperatorCommand, SessionEvent};

const MENU: &str = "\
Commands:
  players   list connected players
  begin     deal roles and run the first night
  night     run a night phase
  day       run a day phase
  again     return to the lobby after a game
  exit      notify clients and shut down";

/// Operator surface: one command per stdin line, forwarded into the session
/// driver's event channel. Returns once the operator exits or stdin closes.
pub async fn run(state: SharedState) -> anyhow::Result<()> {
    println!("{}", MENU);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "players" => {
                let registry = state.registry.read().await;
                let names = registry.names();
                if names.is_empty() {
                    println!("No players connected");
                } else {
                    println!("Current players: {}", names.join(", "));
                }
            }
            "begin" => send(&state, OperatorCommand::Begin),
            "night" => send(&state, OperatorCommand::Night),
            "day" => send(&state, OperatorCommand::Day),
            "again" => send(&state, OperatorCommand::PlayAgain),
            "exit" => break,
            other => {
                println!("Unknown command '{}'", other);
                println!("{}", MENU);
            }
        }
    }

    // Reaching here on "exit" or stdin EOF both mean shutdown.
    send(&state, OperatorCommand::Exit);
    Ok(())
}

fn send(state: &SharedState, cmd: OperatorCommand) {
    if state.events.send(SessionEvent::Operator(cmd)).is_err() {
        tracing::warn!("Session driver is gone; command dropped");
    }
}
