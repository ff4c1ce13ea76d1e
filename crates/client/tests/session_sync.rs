use std::sync::Arc;
use std::time::Duration;

use quizroom_client::testutil::{FakeStatusSource, MockConnector, MockServer};
use quizroom_client::{
    ConnectionState, GameState, GameStatus, Player, PollMode, ReconnectConfig, SessionClient,
    SessionCode, StartGameError, SyncConfig, SyncPolicy, SyncState,
};
use quizroom_shared::{ClientCommand, ServerEvent};
use tokio::time::Instant;

fn config(poll_mode: PollMode) -> SyncConfig {
    SyncConfig {
        api_base: "http://quiz.test".to_string(),
        ws_base: "ws://quiz.test".to_string(),
        poll_mode,
        reconnect: ReconnectConfig {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 1.5,
        },
        ..SyncConfig::default()
    }
}

fn players(ids: &[&str]) -> Vec<Player> {
    ids.iter()
        .map(|id| Player {
            player_id: id.to_string(),
            player_name: Some(format!("Player {id}")),
            connected_at: None,
        })
        .collect()
}

fn mount(
    poll_mode: PollMode,
    status: GameStatus,
) -> (SessionClient, MockConnector, MockServer, FakeStatusSource) {
    let (connector, server) = MockConnector::new();
    let source = FakeStatusSource::new(status);
    let client = SessionClient::mount(
        SessionCode::new("AB12").unwrap(),
        config(poll_mode),
        Arc::new(connector.clone()),
        Arc::new(source.clone()),
    );
    (client, connector, server, source)
}

async fn wait_for_roster(client: &SessionClient, len: usize) {
    client
        .subscribe()
        .watch()
        .wait_for(|state| state.roster.len() == len)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn connects_to_session_endpoint_and_requests_roster_after_settle() {
    let (client, _connector, mut server, _source) =
        mount(PollMode::Fallback, GameStatus::waiting(0));

    let mut peer = server.accept().await.unwrap();
    assert_eq!(peer.url, "ws://quiz.test/ws/sessions/AB12");

    let opened = Instant::now();
    assert_eq!(peer.next_command().await, Some(ClientCommand::RequestRoster));
    assert!(opened.elapsed() >= Duration::from_millis(100));
    assert!(client.is_connected());

    client.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn settled_roster_starts_game() {
    // Two players on the channel, two reported by the status endpoint.
    let (client, _connector, mut server, _source) =
        mount(PollMode::Continuous, GameStatus::waiting(2));
    let mut peer = server.accept().await.unwrap();
    assert_eq!(peer.next_command().await, Some(ClientCommand::RequestRoster));

    peer.send_event(&ServerEvent::RosterUpdate {
        players: players(&["a", "b"]),
    });
    wait_for_roster(&client, 2).await;
    client
        .subscribe()
        .watch()
        .wait_for(|state| state.reported_total == Some(2))
        .await
        .unwrap();
    assert_eq!(client.sync_state(), SyncState::Settled);

    let sent = Instant::now();
    let receipt = client.start_game(SyncPolicy::Require).await.unwrap();
    assert!(sent.elapsed() >= Duration::from_millis(200));
    assert!(receipt.flushed);
    assert_eq!(receipt.player_count, 2);
    assert_eq!(peer.next_command().await, Some(ClientCommand::StartGame));

    client.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn lagging_roster_needs_override() {
    // One player on the channel, three reported by the status endpoint.
    let (client, _connector, mut server, _source) =
        mount(PollMode::Continuous, GameStatus::waiting(3));
    let mut peer = server.accept().await.unwrap();
    assert_eq!(peer.next_command().await, Some(ClientCommand::RequestRoster));

    peer.send_event(&ServerEvent::RosterUpdate {
        players: players(&["a"]),
    });
    client
        .subscribe()
        .watch()
        .wait_for(|state| state.roster.len() == 1 && state.reported_total == Some(3))
        .await
        .unwrap();

    assert_eq!(
        client.sync_state(),
        SyncState::Pending {
            ready: 1,
            expected: 3
        }
    );
    let err = client.start_game(SyncPolicy::Require).await.unwrap_err();
    assert_eq!(
        err,
        StartGameError::SyncPending {
            ready: 1,
            expected: 3
        }
    );
    assert!(peer.try_commands().is_empty());

    let receipt = client.start_game(SyncPolicy::Override).await.unwrap();
    assert!(receipt.flushed);
    assert_eq!(peer.next_command().await, Some(ClientCommand::StartGame));

    client.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn empty_roster_never_sends_start() {
    let (client, _connector, mut server, _source) =
        mount(PollMode::Fallback, GameStatus::waiting(0));
    let mut peer = server.accept().await.unwrap();
    assert_eq!(peer.next_command().await, Some(ClientCommand::RequestRoster));

    let err = client.start_game(SyncPolicy::Override).await.unwrap_err();
    assert_eq!(err, StartGameError::NoPlayers);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(peer.try_commands().is_empty());

    client.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_unexpected_close() {
    let (client, connector, mut server, source) =
        mount(PollMode::Fallback, GameStatus::waiting(2));
    let mut connection = client.connection_watch();
    let mut polling = client.polling_watch();

    let mut peer = server.accept().await.unwrap();
    assert_eq!(peer.next_command().await, Some(ClientCommand::RequestRoster));
    polling.wait_for(|active| !*active).await.unwrap();
    peer.send_event(&ServerEvent::RosterUpdate {
        players: players(&["a", "b"]),
    });
    wait_for_roster(&client, 2).await;

    let polls_before = source.calls();
    peer.close(1006, "abnormal closure");
    connection
        .wait_for(|state| *state == ConnectionState::Reconnecting { attempt: 1 })
        .await
        .unwrap();
    polling.wait_for(|active| *active).await.unwrap();
    assert!(!client.is_offline());

    let mut peer = server.accept().await.unwrap();
    assert_eq!(connector.attempts(), 2);
    assert!(source.calls() > polls_before);

    let reopened = Instant::now();
    assert_eq!(peer.next_command().await, Some(ClientCommand::RequestRoster));
    assert!(reopened.elapsed() >= Duration::from_millis(100));
    assert!(client.is_connected());
    polling.wait_for(|active| !*active).await.unwrap();

    // The roster survives the reconnect until the server replaces it.
    assert_eq!(client.roster().len(), 2);

    client.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn teardown_during_backoff_stops_all_writes() {
    let (client, connector, _server, source) =
        mount(PollMode::Fallback, GameStatus::waiting(1));
    connector.set_refusing(true);

    let mut connection = client.connection_watch();
    connection
        .wait_for(|state| matches!(state, ConnectionState::Reconnecting { .. }))
        .await
        .unwrap();
    let reader = client.subscribe();
    reader
        .watch()
        .wait_for(|state| state.game_status.is_some())
        .await
        .unwrap();

    let revision = reader.revision();
    let attempts = connector.attempts();
    let polling = client.polling_watch();

    client.teardown().await;
    source.set_status(GameStatus {
        game_state: GameState::Active,
        ..GameStatus::waiting(7)
    });
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(reader.revision(), revision);
    assert_eq!(connector.attempts(), attempts);
    assert!(!*polling.borrow());
    assert_eq!(*connection.borrow(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn goes_offline_after_max_attempts_and_keeps_polling() {
    let (connector, _server) = MockConnector::new();
    connector.set_refusing(true);
    let source = FakeStatusSource::new(GameStatus::waiting(0));
    let client = SessionClient::mount(
        SessionCode::new("AB12").unwrap(),
        config(PollMode::Fallback),
        Arc::new(connector.clone()),
        Arc::new(source.clone()),
    );

    client
        .connection_watch()
        .wait_for(|state| state.is_offline())
        .await
        .unwrap();
    // Initial connect plus three reconnects.
    assert_eq!(connector.attempts(), 4);
    assert!(client.is_offline());

    let calls = source.calls();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(client.is_polling());
    assert!(source.calls() > calls);
    assert_eq!(connector.attempts(), 4);

    client.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn roster_loaded_once_connected_with_status() {
    let (client, _connector, mut server, _source) =
        mount(PollMode::Fallback, GameStatus::waiting(0));
    let peer = server.accept().await.unwrap();
    client
        .connection_watch()
        .wait_for(|state| state.is_connected())
        .await
        .unwrap();

    peer.send_event(&ServerEvent::StatusUpdate {
        game_status: GameStatus::waiting(0),
    });
    client
        .subscribe()
        .watch()
        .wait_for(|state| state.game_status.is_some())
        .await
        .unwrap();
    assert!(client.roster().is_empty());
    assert!(client.is_roster_loaded());

    client.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn dispatcher_reports_closed_after_teardown() {
    let (client, _connector, mut server, _source) =
        mount(PollMode::Fallback, GameStatus::waiting(1));
    let _peer = server.accept().await.unwrap();
    let dispatcher = client.dispatcher();

    client.teardown().await;
    assert_eq!(
        dispatcher.start_game(SyncPolicy::Override).await,
        Err(StartGameError::Closed)
    );
}

#[tokio::test(start_paused = true)]
async fn channel_status_settles_sync_after_fallback_polls() {
    // The status endpoint reported 3 while the channel was down; once
    // connected the server reports 2 players and sends both.
    let (client, connector, mut server, _source) =
        mount(PollMode::Fallback, GameStatus::waiting(3));
    connector.fail_next(1);
    let reader = client.subscribe();
    reader
        .watch()
        .wait_for(|state| state.reported_total == Some(3))
        .await
        .unwrap();

    let mut peer = server.accept().await.unwrap();
    assert_eq!(peer.next_command().await, Some(ClientCommand::RequestRoster));
    client.polling_watch().wait_for(|active| !*active).await.unwrap();

    peer.send_event(&ServerEvent::RosterUpdate {
        players: players(&["a", "b"]),
    });
    peer.send_event(&ServerEvent::StatusUpdate {
        game_status: GameStatus::waiting(2),
    });
    reader
        .watch()
        .wait_for(|state| state.roster.len() == 2 && state.reported_total == Some(2))
        .await
        .unwrap();
    assert_eq!(client.sync_state(), SyncState::Settled);

    let receipt = client.start_game(SyncPolicy::Require).await.unwrap();
    assert_eq!(receipt.player_count, 2);
    assert_eq!(peer.next_command().await, Some(ClientCommand::StartGame));

    client.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn channel_status_ahead_of_roster_keeps_sync_pending() {
    let (client, _connector, mut server, _source) =
        mount(PollMode::Fallback, GameStatus::waiting(1));
    let mut peer = server.accept().await.unwrap();
    assert_eq!(peer.next_command().await, Some(ClientCommand::RequestRoster));
    client.polling_watch().wait_for(|active| !*active).await.unwrap();

    peer.send_event(&ServerEvent::RosterUpdate {
        players: players(&["a"]),
    });
    peer.send_event(&ServerEvent::StatusUpdate {
        game_status: GameStatus::waiting(3),
    });
    client
        .subscribe()
        .watch()
        .wait_for(|state| state.roster.len() == 1 && state.reported_total == Some(3))
        .await
        .unwrap();

    assert_eq!(
        client.start_game(SyncPolicy::Require).await.unwrap_err(),
        StartGameError::SyncPending {
            ready: 1,
            expected: 3
        }
    );
    assert!(peer.try_commands().is_empty());

    client.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn server_closing_every_connection_goes_offline() {
    let (client, connector, mut server, _source) =
        mount(PollMode::Fallback, GameStatus::waiting(0));
    let acceptor = tokio::spawn(async move {
        while let Some(peer) = server.accept().await {
            peer.close(1000, "session full");
        }
    });

    client
        .connection_watch()
        .wait_for(|state| state.is_offline())
        .await
        .unwrap();
    // Initial connect plus three reconnects, each closed before settling.
    assert_eq!(connector.attempts(), 4);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.attempts(), 4);
    assert!(client.is_offline());

    client.teardown().await;
    acceptor.abort();
}
