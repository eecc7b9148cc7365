mod game;
mod network;

use clap::Parser;

/// Werewolf Client - join a moderated game of Werewolf
#[derive(Parser, Debug)]
#[command(name = "werewolf-client", version, about)]
struct Args {
    /// Moderator address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:55555")]
    server: String,

    /// Player name (1-15 characters)
    #[arg(short, long)]
    name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "werewolf_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match network::connect(&args.server, &args.name).await? {
        network::JoinOutcome::Rejected { reason } => {
            println!("{}", reason);
            Ok(())
        }
        network::JoinOutcome::Accepted { greeting, link } => {
            println!("{}", greeting);
            game::App::new(args.name, link).run().await
        }
    }
}
