//! Per-session synchronization client.
//!
//! A [`SessionClient`] is mounted for one session code and owns every
//! background task that keeps its state current: the connection supervisor,
//! the status poller and the reconciler. Tearing the client down (or
//! dropping it) cancels all of them.

use std::sync::Arc;

use quizroom_shared::{GameStatus, Player, SessionCode};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api_client::ApiClient;
use crate::config::SyncConfig;
use crate::dispatcher::{CommandDispatcher, StartReceipt, SyncPolicy};
use crate::error::StartGameError;
use crate::poller::{Poller, StatusSource};
use crate::reconciler::Reconciler;
use crate::stores::{SessionStateStore, StoreReader, SyncState};
use crate::ws::{
    outbound_queue, ConnectionState, ConnectionSupervisor, Connector, TungsteniteConnector,
    WsHandle,
};

pub struct SessionClient {
    code: SessionCode,
    store: StoreReader,
    connection: Arc<watch::Sender<ConnectionState>>,
    polling: watch::Receiver<bool>,
    handle: WsHandle,
    dispatcher: CommandDispatcher,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionClient {
    /// Mount a client over the production socket and HTTP backends.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(code: SessionCode, config: SyncConfig) -> Self {
        let api = ApiClient::new()
            .with_base_url(config.api_base.clone())
            .with_timeout(config.poll_interval);
        let connector = TungsteniteConnector::new(config.connect_timeout);
        Self::mount(code, config, Arc::new(connector), Arc::new(api))
    }

    /// Mount a client over explicit backends and start its tasks.
    pub fn mount(
        code: SessionCode,
        config: SyncConfig,
        connector: Arc<dyn Connector>,
        source: Arc<dyn StatusSource>,
    ) -> Self {
        let cancel = CancellationToken::new();

        let store = SessionStateStore::new(cancel.clone());
        let reader = store.reader();
        let (sync_tx, sync_rx) = mpsc::unbounded_channel();

        let (out_tx, queue) = outbound_queue();
        let handle = WsHandle::new(out_tx, code.to_string());
        let dispatcher = CommandDispatcher::new(handle.clone(), reader.clone(), config.flush_delay);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let connection = Arc::new(state_tx);
        let (polling_tx, polling) = watch::channel(false);

        let url = config.ws_url(&code);
        crate::log_info!("Mounting session client for {} ({})", code, url);

        let reconciler = Reconciler::new(store, sync_rx, cancel.clone());
        let supervisor = ConnectionSupervisor::new(
            url,
            connector,
            queue,
            connection.clone(),
            sync_tx.clone(),
            dispatcher.clone(),
            config.reconnect.clone(),
            config.settle_delay,
            cancel.clone(),
        );
        let poller = Poller::new(
            code.clone(),
            source,
            state_rx,
            config.poll_mode,
            config.poll_interval,
            sync_tx,
            polling_tx,
            cancel.clone(),
        );

        let tasks = vec![
            tokio::spawn(reconciler.run()),
            supervisor.spawn(),
            poller.spawn(),
        ];

        Self {
            code,
            store: reader,
            connection,
            polling,
            handle,
            dispatcher,
            cancel,
            tasks,
        }
    }

    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    pub fn game_status(&self) -> Option<GameStatus> {
        self.store.game_status()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.borrow().clone()
    }

    pub fn roster(&self) -> Vec<Player> {
        self.store.roster()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.borrow().is_connected()
    }

    /// Reconnect attempts are exhausted or the client was torn down.
    pub fn is_offline(&self) -> bool {
        self.connection.borrow().is_offline()
    }

    pub fn sync_state(&self) -> SyncState {
        self.store.sync_state()
    }

    /// Whether the roster view has something meaningful to show: players
    /// have arrived, or the channel is up and the game status is known.
    pub fn is_roster_loaded(&self) -> bool {
        let state = self.store.snapshot();
        !state.roster.is_empty() || (self.is_connected() && state.game_status.is_some())
    }

    pub fn is_polling(&self) -> bool {
        *self.polling.borrow()
    }

    pub fn request_roster(&self) {
        self.dispatcher.request_roster();
    }

    pub async fn start_game(&self, policy: SyncPolicy) -> Result<StartReceipt, StartGameError> {
        self.dispatcher.start_game(policy).await
    }

    /// Command handle that can be moved into callbacks. Fails with
    /// [`StartGameError::Closed`] once the client is torn down.
    pub fn dispatcher(&self) -> CommandDispatcher {
        self.dispatcher.clone()
    }

    /// Reader over the reconciled session state.
    pub fn subscribe(&self) -> StoreReader {
        self.store.clone()
    }

    pub fn connection_watch(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn polling_watch(&self) -> watch::Receiver<bool> {
        self.polling.clone()
    }

    /// Stop every background task and wait for them to finish.
    pub async fn teardown(mut self) {
        self.shutdown();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        crate::log_info!("Session client for {} torn down", self.code);
    }

    fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.handle.close();
        self.connection.send_replace(ConnectionState::Disconnected);
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
