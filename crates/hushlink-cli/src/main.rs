//! Hushlink terminal client.
//!
//! Joins one chat session, exchanges ephemeral keys with every participant
//! and relays lines typed on stdin as chat messages.
//!
//! # Usage
//!
//! ```bash
//! # Join session 42 as participant "p-7" against a local relay
//! hushlink --session 42 --participant p-7 --code 482913
//!
//! # Publish the identity key and wipe local key records on /quit
//! hushlink --server wss://chat.example --registry https://chat.example \
//!     --session 42 --participant p-7 --code 482913 --clear-on-exit
//! ```
//!
//! Lines starting with `/` are commands: `/quit` ends the session, `/close`
//! leaves the key records in place for the next run.

use std::{io::BufRead, path::PathBuf};

use clap::Parser;
use hushlink_client::{
    ChannelConfig, Client, ClientAction, FileStorage, ParticipantId, SecretCode, SessionContext,
    SessionId,
    runtime::{Command, Runtime, RuntimeConfig},
    system_env::SystemEnv,
};
use tokio::{io::AsyncWriteExt, sync::mpsc};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Hushlink session client
#[derive(Parser, Debug)]
#[command(name = "hushlink")]
#[command(about = "Join a Hushlink chat session from the terminal")]
#[command(version)]
struct Args {
    /// Relay base URL
    #[arg(short, long, default_value = "ws://localhost:8000")]
    server: String,

    /// Identity registry base URL (publication is skipped without one)
    #[arg(short, long)]
    registry: Option<String>,

    /// Session to join
    #[arg(long)]
    session: u64,

    /// Participant id assigned by the session service
    #[arg(short, long)]
    participant: String,

    /// Six digit secret code protecting the identity key
    #[arg(short, long)]
    code: String,

    /// Directory for key records
    #[arg(long, default_value = ".hushlink")]
    state_dir: PathBuf,

    /// Delete key records when the session ends with /quit
    #[arg(long)]
    clear_on_exit: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // chat goes to stdout, logs to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let secret_code = SecretCode::parse_pin(&args.code)?;
    let storage = FileStorage::open(&args.state_dir)?;
    let context = SessionContext::verified(
        SessionId(args.session),
        ParticipantId::new(args.participant),
        secret_code,
    );

    let env = SystemEnv::new();
    let client = Client::new(env.clone(), context, storage, ChannelConfig::default())?;

    tracing::info!(
        session = args.session,
        server = %args.server,
        state_dir = %args.state_dir.display(),
        "joining session"
    );

    let config = RuntimeConfig {
        server_url: args.server,
        registry_url: args.registry,
        ..RuntimeConfig::default()
    };

    let (command_tx, command_rx) = mpsc::channel(32);
    let (output_tx, output_rx) = mpsc::channel(64);

    spawn_input(command_tx.clone(), args.clear_on_exit);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = command_tx.send(Command::Close).await;
        }
    });
    let printer = tokio::spawn(print_output(output_rx));

    Runtime::new(env, client, config, output_tx).run(command_rx).await?;
    printer.await?;

    Ok(())
}

/// Read stdin lines on a plain thread; interactive stdin never completes.
fn spawn_input(commands: mpsc::Sender<Command>, clear_on_exit: bool) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let Some(command) = parse_command(&line, clear_on_exit) else {
                continue;
            };

            let last = !matches!(command, Command::Send { .. });
            if commands.blocking_send(command).is_err() || last {
                return;
            }
        }
        // end of input closes the channel
        let _ = commands.blocking_send(Command::Close);
    });
}

fn parse_command(line: &str, clear_on_exit: bool) -> Option<Command> {
    let line = line.trim_end_matches(['\r', '\n']);

    match line.trim() {
        "" => None,
        "/quit" => Some(Command::Teardown { clear_storage: clear_on_exit }),
        "/close" => Some(Command::Close),
        _ => Some(Command::Send { text: line.to_string() }),
    }
}

async fn print_output(mut actions: mpsc::Receiver<ClientAction>) {
    let mut stdout = tokio::io::stdout();

    while let Some(action) = actions.recv().await {
        let Some(line) = render(&action) else { continue };
        if stdout.write_all(format!("{line}\n").as_bytes()).await.is_err() {
            break;
        }
        let _ = stdout.flush().await;
    }
}

fn render(action: &ClientAction) -> Option<String> {
    match action {
        ClientAction::DeliverMessage(message) => {
            let sender =
                if message.name.is_empty() { message.from.as_str() } else { message.name.as_str() };
            Some(format!("[{}] {sender}: {}", message.timestamp, message.text))
        },
        ClientAction::LocalEcho(message) => {
            Some(format!("[{}] you: {}", message.timestamp, message.text))
        },
        ClientAction::SelfIdentity { name, .. } => Some(format!("* joined as {name}")),
        ClientAction::SharedSecretEstablished { peer } => {
            Some(format!("* secure channel with {peer}"))
        },
        ClientAction::ServerNotice { message } => Some(format!("! relay: {message}")),
        ClientAction::ChannelFailed { error } => Some(format!("! connection lost: {error}")),
        ClientAction::Connect { .. }
        | ClientAction::Send(_)
        | ClientAction::Disconnect { .. }
        | ClientAction::PublishIdentity(_) => None,
    }
}
