use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::{
    domain::{default_catalog, LobbyId},
    lobby,
    protocol::LobbyResults,
};
use storage::{LobbyStore, Storage};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/lobbies.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateLobby { host: String },
    Show { lobby_id: String },
    List,
    Results { lobby_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateLobby { host } => {
            let lobby = lobby::create(&host, &default_catalog())?;
            storage.write_lobby(&lobby, None).await?;
            println!("created lobby_id={}", lobby.id);
        }
        Command::Show { lobby_id } => {
            let lobby_id = parse_id(&lobby_id)?;
            let lobby = storage
                .read_lobby(&lobby_id)
                .await?
                .with_context(|| format!("lobby {lobby_id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&lobby)?);
        }
        Command::List => {
            for summary in storage.list_lobbies().await? {
                println!(
                    "{}\thost={}\tparticipants={}\tstarted={}\tversion={}\tupdated={}",
                    summary.lobby_id,
                    summary.host,
                    summary.participant_count,
                    summary.is_voting_started,
                    summary.version,
                    summary.updated_at.to_rfc3339()
                );
            }
        }
        Command::Results { lobby_id } => {
            let lobby_id = parse_id(&lobby_id)?;
            let lobby = storage
                .read_lobby(&lobby_id)
                .await?
                .with_context(|| format!("lobby {lobby_id} not found"))?;
            let results = LobbyResults::for_lobby(&lobby);
            println!("complete={}", results.is_voting_complete);
            for (rank, result) in results.results.iter().enumerate() {
                println!(
                    "{}. {} {} ({} ratings)",
                    rank + 1,
                    result.name,
                    result.average_score,
                    result.ratings.len()
                );
            }
        }
    }

    Ok(())
}

fn parse_id(raw: &str) -> Result<LobbyId> {
    LobbyId::parse(raw).context("lobby id must not be empty")
}
