//! The sync loop: polls snapshots, loads the release catalog, dispatches operator
//! actions and feeds every resulting effect to the renderer.

use crate::config::ClientConfig;
use crate::dispatch::{ActionTransport, Dispatcher, SyncRequest};
use crate::error::SyncError;
use crate::input::{Command, InputEvent, InputManager};
use crate::reconcile::SyncEngine;
use crate::rendering::Renderer;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use shared::{ActionOutcome, ActionRequest, ReleaseCatalog, Snapshot};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Returns the current set of servers visible to the caller.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SyncError>;
}

/// Returns the latest known release per flavor.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn fetch_releases(&self) -> Result<ReleaseCatalog, SyncError>;
}

/// Messages sent from spawned I/O tasks back to the sync loop
#[derive(Debug)]
pub enum LoopMessage {
    SnapshotFetched {
        sequence: u64,
        result: Result<Snapshot, SyncError>,
    },
    ReleasesFetched(Result<ReleaseCatalog, SyncError>),
    ActionFinished {
        request: ActionRequest,
        outcome: ActionOutcome,
    },
}

/// Counts consecutive snapshot failures so transient blips stay quiet.
#[derive(Debug)]
pub struct FailureTracker {
    consecutive: u32,
    threshold: u32,
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive: 0,
            threshold: threshold.max(1),
        }
    }

    /// Returns true exactly once per outage, when the threshold is reached.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive == self.threshold
    }

    /// Returns true if this success ends an outage that was reported.
    pub fn record_success(&mut self) -> bool {
        let was_escalated = self.is_escalated();
        self.consecutive = 0;
        was_escalated
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn is_escalated(&self) -> bool {
        self.consecutive >= self.threshold
    }
}

pub struct Client<B> {
    backend: Arc<B>,
    config: ClientConfig,
    engine: SyncEngine,
    dispatcher: Arc<Dispatcher<Arc<B>>>,
    input_manager: InputManager,
    renderer: Renderer,
    failures: FailureTracker,

    // Communication channels
    loop_tx: mpsc::UnboundedSender<LoopMessage>,
    loop_rx: mpsc::UnboundedReceiver<LoopMessage>,
    sync_rx: mpsc::UnboundedReceiver<SyncRequest>,
}

impl<B> Client<B>
where
    B: SnapshotSource + ReleaseSource + ActionTransport + 'static,
{
    pub fn new(backend: B, config: ClientConfig, renderer: Renderer) -> Self {
        let backend = Arc::new(backend);
        let (loop_tx, loop_rx) = mpsc::unbounded_channel();
        let (sync_tx, sync_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&backend),
            config.action_timeout,
            sync_tx,
        ));

        Self {
            backend,
            failures: FailureTracker::new(config.failure_threshold),
            config,
            engine: SyncEngine::new(),
            dispatcher,
            input_manager: InputManager::new(),
            renderer,
            loop_tx,
            loop_rx,
            sync_rx,
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    /// Issues a snapshot fetch tagged with the next sequence number.
    pub fn refresh(&mut self) -> u64 {
        let sequence = self.engine.next_sequence();
        let backend = Arc::clone(&self.backend);
        let loop_tx = self.loop_tx.clone();

        tokio::spawn(async move {
            let result = backend.fetch_snapshot().await;
            let _ = loop_tx.send(LoopMessage::SnapshotFetched { sequence, result });
        });

        sequence
    }

    pub fn refresh_releases(&self) {
        let backend = Arc::clone(&self.backend);
        let loop_tx = self.loop_tx.clone();

        tokio::spawn(async move {
            let result = backend.fetch_releases().await;
            let _ = loop_tx.send(LoopMessage::ReleasesFetched(result));
        });
    }

    /// Dispatches `request` if the evaluator currently allows it.
    ///
    /// Returns false when the request was refused locally.
    pub fn submit(&mut self, request: ActionRequest) -> bool {
        let Some(entry) = self.engine.store().get(&request.uuid) else {
            self.renderer.notice(format!("Unknown server {}", request.uuid));
            return false;
        };

        if !entry.is_enabled(request.kind) {
            self.renderer.notice(format!(
                "{} is not available for {}",
                request.kind.label(),
                entry.name()
            ));
            return false;
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let loop_tx = self.loop_tx.clone();
        tokio::spawn(async move {
            let outcome = dispatcher.dispatch(request.clone()).await;
            let _ = loop_tx.send(LoopMessage::ActionFinished { request, outcome });
        });

        true
    }

    pub fn handle_message(&mut self, message: LoopMessage) {
        match message {
            LoopMessage::SnapshotFetched { sequence, result } => {
                self.handle_snapshot(sequence, result)
            }

            LoopMessage::ReleasesFetched(Ok(catalog)) => {
                info!("Loaded release catalog ({} flavors)", catalog.len());
                self.engine.set_catalog(catalog);
            }

            LoopMessage::ReleasesFetched(Err(e)) => {
                warn!("Error getting releases: {}", e);
            }

            LoopMessage::ActionFinished { request, outcome } => {
                let name = self
                    .engine
                    .store()
                    .get(&request.uuid)
                    .map(|entry| entry.name().to_string())
                    .unwrap_or_else(|| request.uuid.to_string());
                self.renderer.toast(&request, &name, &outcome);
            }
        }
    }

    fn handle_snapshot(&mut self, sequence: u64, result: Result<Snapshot, SyncError>) {
        match result {
            Ok(snapshot) => {
                if self.failures.record_success() {
                    self.renderer.notice("Server list is reachable again".to_string());
                }

                if let Some(effects) = self.engine.apply(sequence, &snapshot) {
                    self.renderer.apply(&effects);
                }
            }

            Err(e) => {
                if self.failures.record_failure() {
                    error!(
                        "Snapshot fetch failed {} times in a row: {}",
                        self.failures.consecutive(),
                        e
                    );
                    self.renderer.notice(format!("Error getting servers: {}", e));
                } else {
                    warn!("Snapshot #{} failed: {}", sequence, e);
                }
            }
        }
    }

    pub fn handle_sync(&mut self, request: SyncRequest) {
        match request {
            SyncRequest::Evict(uuid) => {
                if let Some(effect) = self.engine.evict(&uuid) {
                    self.renderer.apply(&[effect]);
                }
            }
            SyncRequest::Refresh => {
                let sequence = self.refresh();
                debug!("Out-of-cycle refresh #{}", sequence);
            }
        }
    }

    /// Handles one line of operator input. Returns false when the operator quits.
    pub fn handle_line(&mut self, line: &str) -> bool {
        match self.input_manager.handle_line(line, self.engine.store()) {
            InputEvent::Command(Command::Action(request)) => {
                self.submit(request);
            }
            InputEvent::Command(Command::Refresh) => {
                self.refresh();
            }
            InputEvent::Command(Command::List) => {
                let board = self.renderer.board(self.engine.store().session());
                self.renderer.print(board);
            }
            InputEvent::Command(Command::Help) => {
                self.renderer.print(crate::input::HELP.to_string());
            }
            InputEvent::Command(Command::Quit) => return false,
            InputEvent::ConfirmPrompt(prompt) => self.renderer.print(prompt),
            InputEvent::Cancelled(request) => {
                self.renderer
                    .notice(format!("{} on {} cancelled", request.kind.label(), request.uuid));
            }
            InputEvent::Invalid(reason) => self.renderer.notice(reason),
            InputEvent::Empty => {}
        }

        true
    }

    /// Waits for the next completed I/O task or dispatcher request and handles it.
    pub async fn process_next(&mut self) {
        tokio::select! {
            Some(message) = self.loop_rx.recv() => self.handle_message(message),
            Some(request) = self.sync_rx.recv() => self.handle_sync(request),
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut poll_interval = interval(self.config.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut release_interval = interval(self.config.release_refresh_interval);
        release_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        info!("Polling {} every {:?}", self.config.base_url, self.config.poll_interval);
        self.renderer.print(crate::input::HELP.to_string());
        self.renderer.flush();

        loop {
            tokio::select! {
                _ = release_interval.tick() => {
                    self.refresh_releases();
                },

                _ = poll_interval.tick() => {
                    self.refresh();
                },

                Some(message) = self.loop_rx.recv() => {
                    self.handle_message(message);
                },

                Some(request) = self.sync_rx.recv() => {
                    self.handle_sync(request);
                },

                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if !self.handle_line(&line) {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            error!("Error reading input: {}", e);
                            break;
                        }
                    }
                },
            }

            self.renderer.flush();
        }

        if self.dispatcher.pending_count() > 0 {
            warn!(
                "Exiting with {} action(s) still in flight",
                self.dispatcher.pending_count()
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use shared::{ActionKind, Permissions, Running, ServerRecord};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedBackend {
        snapshots: Mutex<VecDeque<Result<Snapshot, SyncError>>>,
        actions: Mutex<Vec<ActionRequest>>,
    }

    #[async_trait]
    impl SnapshotSource for ScriptedBackend {
        async fn fetch_snapshot(&self) -> Result<Snapshot, SyncError> {
            self.snapshots
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(Snapshot::empty_fleet()))
        }
    }

    #[async_trait]
    impl ReleaseSource for ScriptedBackend {
        async fn fetch_releases(&self) -> Result<ReleaseCatalog, SyncError> {
            let mut catalog = ReleaseCatalog::new();
            catalog.insert("paper", "1.20.4");
            Ok(catalog)
        }
    }

    #[async_trait]
    impl ActionTransport for ScriptedBackend {
        async fn send(&self, request: &ActionRequest) -> Result<(), SyncError> {
            self.actions.lock().push(request.clone());
            Ok(())
        }
    }

    fn running_server(uuid: &str) -> ServerRecord {
        let mut record = ServerRecord::new(uuid, "survival", 25565);
        record.running = Running::Running;
        record.flavor = "paper".into();
        record.release = "1.20.2".into();
        record.permissions = Permissions::owner();
        record
    }

    fn client(snapshots: Vec<Result<Snapshot, SyncError>>) -> Client<ScriptedBackend> {
        let backend = ScriptedBackend {
            snapshots: Mutex::new(snapshots.into_iter().collect()),
            ..Default::default()
        };
        Client::new(backend, ClientConfig::default(), Renderer::new(false))
    }

    #[test]
    fn test_failure_tracker_escalates_once() {
        let mut tracker = FailureTracker::new(3);

        assert!(!tracker.record_failure());
        assert!(!tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(!tracker.record_failure());
        assert!(tracker.is_escalated());

        assert!(tracker.record_success());
        assert!(!tracker.record_success());
        assert_eq!(tracker.consecutive(), 0);
    }

    #[test]
    fn test_failure_tracker_success_before_threshold_is_silent() {
        let mut tracker = FailureTracker::new(3);
        tracker.record_failure();
        assert!(!tracker.record_success());
    }

    #[tokio::test]
    async fn test_refresh_applies_snapshot() {
        let mut client = client(vec![Ok(Snapshot::fleet(vec![running_server("a1")]))]);

        client.refresh();
        client.process_next().await;

        assert_eq!(client.engine().store().len(), 1);
    }

    #[tokio::test]
    async fn test_polling_failures_stay_quiet_until_threshold() {
        let failures = (0..3)
            .map(|_| Err(SyncError::Transport("connection refused".into())))
            .collect();
        let mut client = client(failures);

        for expected_notices in [0, 0, 1] {
            client.refresh();
            client.process_next().await;
            let notices = client
                .renderer_mut()
                .take_output()
                .into_iter()
                .filter(|line| line.contains("Error getting servers"))
                .count();
            assert_eq!(notices, expected_notices);
        }
    }

    #[tokio::test]
    async fn test_disabled_action_is_refused_locally() {
        let mut server = running_server("a1");
        server.running = Running::Stopped;
        let mut client = client(vec![Ok(Snapshot::fleet(vec![server]))]);
        client.refresh();
        client.process_next().await;

        let sent = client.submit(ActionRequest::new("a1", ActionKind::WeatherClear));
        assert!(!sent);
        assert!(!client.submit(ActionRequest::new("zz", ActionKind::Start)));
        assert!(client.submit(ActionRequest::new("a1", ActionKind::Start)));
    }

    #[tokio::test]
    async fn test_delete_evicts_and_refreshes() {
        let mut client = client(vec![
            Ok(Snapshot::fleet(vec![running_server("a1")])),
            Ok(Snapshot::empty_fleet()),
        ]);
        client.refresh();
        client.process_next().await;

        assert!(client.handle_line("delete a1"));
        assert!(client.backend.actions.lock().is_empty());
        assert!(client.handle_line("yes"));

        // evict, refresh, action outcome, refreshed snapshot
        for _ in 0..4 {
            client.process_next().await;
        }

        assert!(client.engine().store().is_empty());
        assert_eq!(client.backend.actions.lock().len(), 1);
        assert!(client
            .renderer_mut()
            .take_output()
            .iter()
            .any(|line| line.contains("Action successful")));
    }

    #[tokio::test]
    async fn test_release_catalog_enables_upgrade() {
        let mut client = client(vec![
            Ok(Snapshot::fleet(vec![running_server("a1")])),
            Ok(Snapshot::fleet(vec![running_server("a1")])),
        ]);

        client.refresh_releases();
        client.process_next().await;
        client.refresh();
        client.process_next().await;

        let entry = client.engine().store().iter().next().unwrap();
        assert!(entry.is_enabled(ActionKind::Upgrade));
    }
}
