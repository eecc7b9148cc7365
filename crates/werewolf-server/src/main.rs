mod connection;
mod console;
mod registry;
mod server;
mod session;

use std::net::SocketAddr;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::session::SessionDriver;

/// Werewolf Moderator - authoritative server for a game of Werewolf
#[derive(Parser, Debug)]
#[command(name = "werewolf-server", version, about)]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:55555")]
    bind: String,

    /// Maximum simultaneous connections allowed
    #[arg(short, long, default_value_t = 100)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "werewolf_server=debug,werewolf_common=debug".into()),
        )
        .init();

    let args = Args::parse();
    let addr: SocketAddr = args.bind.parse()?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let state = ServerState::new(events_tx, args.max_connections);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        "Moderator listening on {} (max {} connections)",
        addr,
        args.max_connections
    );

    let accept_task = tokio::spawn(server::run(listener, state.clone()));
    let driver_task = tokio::spawn(SessionDriver::new(state.clone(), events_rx).run());

    console::run(state).await?;

    // Operator exit: let the driver finish its shutdown broadcast, then
    // stop accepting.
    driver_task.await??;
    accept_task.abort();
    Ok(())
}
