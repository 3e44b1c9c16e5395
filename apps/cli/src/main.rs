use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::*;
use modnet_client::{ApiClient, NewMessage, RoomSync, SyncMode, SyncOptions, SyncUpdate};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod render;

use render::TimelinePrinter;

#[derive(Parser)]
#[command(name = "modnet-cli")]
#[command(about = "Terminal client for ModNet module chats")]
struct Cli {
    /// Base URL of the ModNet server
    #[arg(long, env = "MODNET_URL", default_value = "http://127.0.0.1:7070", global = true)]
    url: String,
    /// Session token printed by `login`
    #[arg(long, env = "MODNET_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with a one-time code sent by email
    Login {
        #[arg(long)]
        email: String,
    },
    /// Accept the current privacy notice
    Consent,
    /// List the rooms you are a member of
    Rooms,
    /// Follow a room live
    Tail { room_id: String },
    /// Post a message
    Send {
        room_id: String,
        text: String,
        #[arg(long)]
        reply_to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut api = ApiClient::new(&cli.url).context("invalid server url")?;
    if let Some(token) = cli.token {
        api.set_token(Some(token));
    }

    match cli.command {
        Commands::Login { email } => login(&mut api, &email).await,
        Commands::Consent => consent(&api).await,
        Commands::Rooms => rooms(&api).await,
        Commands::Tail { room_id } => tail(api, room_id).await,
        Commands::Send {
            room_id,
            text,
            reply_to,
        } => send(&api, &room_id, text, reply_to).await,
    }
}

async fn login(api: &mut ApiClient, email: &str) -> anyhow::Result<()> {
    let issued = api.request_code(email).await?;
    println!("A login code was sent to {} (valid until {}).", issued.email, issued.expires_at);
    print!("Code: ");
    std::io::Write::flush(&mut std::io::stdout())?;

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        bail!("no code entered");
    }

    let session = api.verify_code(email, line.trim()).await?;
    println!("Signed in as {}.", session.user.display_name.green());
    if session.consent_required {
        println!("{}", "Run 'modnet-cli consent' before using the chats.".yellow());
    }
    println!("export MODNET_TOKEN={}", session.token);
    Ok(())
}

async fn consent(api: &ApiClient) -> anyhow::Result<()> {
    let version = api.consent_version().await?;
    let profile = api.give_consent(&version).await?;
    println!("Consent {} recorded for {}.", version.green(), profile.email);
    Ok(())
}

async fn rooms(api: &ApiClient) -> anyhow::Result<()> {
    let rooms = api.rooms().await?;
    if rooms.is_empty() {
        println!("No rooms yet. Select your modules or join a channel first.");
        return Ok(());
    }
    for room in &rooms {
        println!("{}", render::room_line(room));
    }
    Ok(())
}

async fn tail(api: ApiClient, room_id: String) -> anyhow::Result<()> {
    let (sync, mut updates) = RoomSync::new(api, room_id.clone(), SyncOptions::default());
    let state = sync.state();
    let task = sync.spawn();
    let mut printer = TimelinePrinter::new();

    loop {
        let update = tokio::select! {
            update = updates.recv() => update,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(update) = update else {
            break;
        };

        match update {
            SyncUpdate::Timeline { .. } => {
                let state = state.read().await;
                for line in printer.pending(&state.timeline) {
                    println!("{line}");
                }
            }
            SyncUpdate::Presence(presence) => {
                println!("{}", format!("-- {}", render::presence_line(&presence)).dimmed())
            }
            SyncUpdate::Mode(SyncMode::Polling) => {
                println!("{}", "-- live updates unavailable, polling".yellow())
            }
            SyncUpdate::Mode(SyncMode::Realtime) => println!("{}", "-- live".green()),
            SyncUpdate::Mode(SyncMode::Connecting) => {}
            SyncUpdate::Typing {
                display_name,
                is_typing: true,
                ..
            } => println!("{}", format!("-- {display_name} is typing").dimmed()),
            SyncUpdate::Typing { .. } => {}
        }
    }

    drop(updates);
    task.await
        .context("sync task panicked")?
        .with_context(|| format!("lost access to room {room_id}"))?;
    Ok(())
}

async fn send(
    api: &ApiClient,
    room_id: &str,
    text: String,
    reply_to: Option<String>,
) -> anyhow::Result<()> {
    let message = NewMessage {
        reply_to,
        ..NewMessage::text(text)
    };
    let sent = api.send_message(room_id, &message).await?;
    println!("{}", render::message_line(&sent));
    Ok(())
}
