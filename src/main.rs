//! Quizroom host console
//!
//! Mounts a session client for one session code and logs what a host's
//! waiting room would show: connection health, players and game status.
//!
//! Usage: `quizroom <SESSION_CODE> [--start] [--force]`
//!
//! The session code may also come from `QUIZROOM_SESSION`. `--start` starts
//! the game once players are present; `--force` starts it even while the
//! player count is still syncing.

use anyhow::Context;
use quizroom_client::{
    SessionClient, SessionCode, StartGameError, StoreReader, SyncConfig, SyncPolicy, SyncState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Options {
    code: SessionCode,
    start: bool,
    policy: SyncPolicy,
}

fn parse_options() -> anyhow::Result<Options> {
    let mut code = None;
    let mut start = false;
    let mut policy = SyncPolicy::Require;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--start" => start = true,
            "--force" => policy = SyncPolicy::Override,
            flag if flag.starts_with("--") => anyhow::bail!("unknown flag {flag}"),
            value => code = Some(value.to_string()),
        }
    }

    let code = code
        .or_else(|| std::env::var("QUIZROOM_SESSION").ok())
        .context("usage: quizroom <SESSION_CODE> [--start] [--force]")?;
    let code = code
        .parse::<SessionCode>()
        .context("invalid session code")?;

    Ok(Options {
        code,
        start,
        policy,
    })
}

fn log_state(reader: &StoreReader) {
    let state = reader.snapshot();
    match &state.game_status {
        Some(status) => tracing::info!(
            "Game {:?}, {} players registered",
            status.game_state,
            status.total_players()
        ),
        None => tracing::info!("Game status not known yet"),
    }
    if state.roster.is_empty() {
        tracing::info!("No players have joined yet");
    } else {
        let names: Vec<&str> = state.roster.iter().map(|p| p.display_name()).collect();
        tracing::info!("Players ({}): {}", names.len(), names.join(", "));
    }
    if let SyncState::Pending { ready, expected } = state.sync_state() {
        tracing::warn!("Player sync in progress ({}/{} ready)", ready, expected);
    }
}

/// Try to start the game. Returns true once the start command has gone out.
async fn try_start(client: &SessionClient, policy: SyncPolicy) -> bool {
    match client.start_game(policy).await {
        Ok(receipt) => {
            if receipt.flushed {
                tracing::info!("Game started with {} players", receipt.player_count);
            } else {
                tracing::warn!("Start command queued but not yet written; it will go out on reconnect");
            }
            true
        }
        Err(e @ (StartGameError::NoPlayers | StartGameError::SyncPending { .. })) => {
            tracing::info!("{}", e);
            false
        }
        Err(e) => {
            tracing::error!("Could not start game: {}", e);
            true
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quizroom=info,quizroom_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = parse_options()?;
    let config = SyncConfig::from_env()?;
    tracing::info!("Joining session {} via {}", options.code, config.ws_base);

    let client = SessionClient::connect(options.code, config);
    let mut reader = client.subscribe();
    let mut connection = client.connection_watch();
    let mut pending_start = options.start;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                break;
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = connection.borrow_and_update().clone();
                tracing::info!("Connection: {:?}", state);
                if state.is_offline() {
                    tracing::warn!("Push channel offline; relying on status polling");
                }
            }
            changed = reader.changed() => {
                if changed.is_err() {
                    break;
                }
                log_state(&reader);
                if pending_start && client.is_roster_loaded() {
                    pending_start = !try_start(&client, options.policy).await;
                }
            }
        }
    }

    client.teardown().await;
    Ok(())
}
