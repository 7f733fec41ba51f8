use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    render_results, ClientEvent, LobbyAction, LobbyClient, LobbySession, Locale,
};
use shared::domain::LobbyPhase;
use tracing::debug;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "LOBBY_SERVER_URL", default_value = "http://127.0.0.1:8080")]
    server_url: String,
    #[arg(long, default_value = "")]
    username: String,
    #[arg(long, default_value = "tr")]
    locale: Locale,
    /// Print raw JSON instead of the rendered view.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a lobby hosted by --username.
    Create,
    Join { lobby_id: String },
    Start { lobby_id: String },
    Rate { lobby_id: String, score: i64 },
    Show { lobby_id: String },
    Results { lobby_id: String },
    /// Follow a lobby until results are final or the feed ends.
    Watch { lobby_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();
    let args = Args::parse();

    let client = LobbyClient::new(&args.server_url)?;
    let mut session = LobbySession::new(args.username.clone(), args.locale);

    match args.command {
        Command::Create => {
            require_username(&mut session)?;
            let outcome = client.create_lobby(session.username()).await;
            apply(&mut session, LobbyAction::Create, outcome, args.json)?;
        }
        Command::Join { lobby_id } => {
            require_username(&mut session)?;
            let outcome = client.join_lobby(&lobby_id, session.username()).await;
            apply(&mut session, LobbyAction::Join, outcome, args.json)?;
        }
        Command::Start { lobby_id } => {
            require_username(&mut session)?;
            let outcome = client.start_voting(&lobby_id, session.username()).await;
            apply(&mut session, LobbyAction::StartVoting, outcome, args.json)?;
        }
        Command::Rate { lobby_id, score } => {
            require_username(&mut session)?;
            let outcome = client
                .submit_rating(&lobby_id, session.username(), score)
                .await;
            apply(&mut session, LobbyAction::SubmitRating, outcome, args.json)?;
        }
        Command::Show { lobby_id } => {
            let outcome = client.get_lobby(&lobby_id).await;
            apply(&mut session, LobbyAction::Load, outcome, args.json)?;
        }
        Command::Results { lobby_id } => match client.lobby_results(&lobby_id).await {
            Ok(results) if args.json => println!("{}", serde_json::to_string_pretty(&results)?),
            Ok(results) => print!("{}", render_results(&results, session.locale())),
            Err(err) => {
                session.record_error(LobbyAction::Load, &err);
                fail(&session)?;
            }
        },
        Command::Watch { lobby_id } => watch(&client, &mut session, &lobby_id, args.json).await?,
    }

    Ok(())
}

fn require_username(session: &mut LobbySession) -> Result<()> {
    if session.require_username() {
        Ok(())
    } else {
        fail(session)
    }
}

fn fail(session: &LobbySession) -> Result<()> {
    bail!("{}", session.last_error().unwrap_or_default())
}

fn apply(
    session: &mut LobbySession,
    action: LobbyAction,
    outcome: client_core::Result<shared::domain::Lobby>,
    json: bool,
) -> Result<()> {
    if session.record_outcome(action, outcome).is_err() {
        return fail(session);
    }
    print_session(session, json)
}

fn print_session(session: &LobbySession, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&session.lobby())?);
    } else {
        print!("{}", session.view().render(session.locale()));
    }
    Ok(())
}

async fn watch(
    client: &LobbyClient,
    session: &mut LobbySession,
    lobby_id: &str,
    json: bool,
) -> Result<()> {
    let (mut events, task) = match client.subscribe_lobby(lobby_id).await {
        Ok(subscription) => subscription,
        Err(err) => {
            session.record_error(LobbyAction::Watch, &err);
            return fail(session);
        }
    };

    while let Some(event) = events.recv().await {
        debug!(?event, "lobby event");
        let terminal = !matches!(event, ClientEvent::Snapshot(_));
        if session.apply_event(event) {
            print_session(session, json)?;
        }
        if terminal {
            break;
        }
        if session.view().phase == Some(LobbyPhase::Results) {
            break;
        }
    }
    task.abort();

    if session.last_error().is_some() {
        return fail(session);
    }
    Ok(())
}
