//! Change Worker (spec.md §4.F): owns the main loop — heartbeat, fetch
//! changes, classify, dispatch, update cursor, drive the Poll Scheduler.
//!
//! Concurrency model (spec.md §5, §9 "Replacing worker-local mutable
//! state with message passing"): three tasks share one `mpsc` command
//! queue. Only the command-processing task (`run_commands`) ever touches
//! [`WorkerState`]; the other two only translate external inputs into
//! commands.

mod state;

pub use state::{HeartbeatState, WorkerPhase, WorkerState};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::bus::{AgentEvent, ExchangeEvent};
use crate::client::{ExchangeApi, RetryPolicy};
use crate::config::ExchangeConfig;
use crate::eventlog::{self, EventLogEntry, Severity};
use crate::model::{ChangeKind, Identity};
use crate::poll::TickOutcome;
use crate::store::CursorStore;

/// Commands the command-processing task drains, in arrival order.
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    /// The no-work idle timer fired.
    Tick,
    /// A bus event was demultiplexed into a command by the event-intake
    /// task.
    Agent(AgentEvent),
}

/// Join handles and the command sender for a spawned worker. Dropping the
/// sender (or the handles) does not stop the worker; send
/// `AgentEvent::Shutdown` through `commands` for a clean stop.
pub struct WorkerHandle {
    pub commands: mpsc::Sender<WorkerCommand>,
    pub events: broadcast::Receiver<ExchangeEvent>,
    tick_task: JoinHandle<()>,
    intake_task: JoinHandle<()>,
    run_task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Waits for the command-processing task to observe a shutdown command
    /// and exit. The other two tasks are aborted once it does, since they
    /// have no further use once the queue they feed is gone.
    pub async fn join(self) {
        let _ = self.run_task.await;
        self.tick_task.abort();
        self.intake_task.abort();
    }
}

pub struct ChangeWorker {
    client: Arc<dyn ExchangeApi>,
    store: Arc<dyn CursorStore>,
    config: ExchangeConfig,
    events_tx: broadcast::Sender<ExchangeEvent>,
    retry: RetryPolicy,
    unbounded_retry: RetryPolicy,
}

impl ChangeWorker {
    pub fn new(config: ExchangeConfig, client: Arc<dyn ExchangeApi>, store: Arc<dyn CursorStore>) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        let retry_interval = config.retry_interval();
        let retry_count = config.http_retry_count;
        ChangeWorker {
            client,
            store,
            config,
            events_tx,
            retry: RetryPolicy::limited(retry_count, retry_interval),
            unbounded_retry: RetryPolicy::unbounded(retry_interval),
        }
    }

    /// Spawns the three tasks of spec.md §5 and returns a handle. `agent_events`
    /// is the agent-wide bus the worker consumes (spec.md §6 "consumed"
    /// events); the caller owns the sending half.
    pub fn spawn(self, agent_events: broadcast::Receiver<AgentEvent>) -> WorkerHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let events_rx = self.events_tx.subscribe();
        let interval_secs = Arc::new(AtomicU64::new(self.config.exchange_poll_interval_sec.max(1)));

        let tick_task = spawn_tick_task(cmd_tx.clone(), interval_secs.clone());
        let intake_task = spawn_intake_task(cmd_tx.clone(), agent_events);
        let run_task = tokio::spawn(self.run_commands(cmd_rx, interval_secs));

        WorkerHandle {
            commands: cmd_tx,
            events: events_rx,
            tick_task,
            intake_task,
            run_task,
        }
    }

    /// The command-processing task (spec.md §5, §9). Owns [`WorkerState`]
    /// exclusively for its lifetime.
    async fn run_commands(self, mut cmd_rx: mpsc::Receiver<WorkerCommand>, interval_secs: Arc<AtomicU64>) {
        let mut state = WorkerState::new(&self.config);
        self.resume_from_store(&mut state).await;

        while let Some(cmd) = cmd_rx.recv().await {
            self.dispatch_early_tick_if_starved(&mut state).await;

            let terminate = match cmd {
                WorkerCommand::Tick => {
                    self.run_tick(&mut state).await;
                    false
                }
                WorkerCommand::Agent(evt) => self.handle_agent_event(&mut state, evt).await,
            };

            interval_secs.store(state.poll.cur().max(1), Ordering::Relaxed);
            if terminate {
                break;
            }
        }
    }

    /// spec.md §3: "changeID and PollState live for the lifetime of the
    /// agent process and outlive single restarts via the Cursor Store."
    async fn resume_from_store(&self, state: &mut WorkerState) {
        match self.store.load_registration().await {
            Ok(Some((identity, _exchange_url, _content_store_url))) => {
                let cursor = self.store.load_cursor().await.unwrap_or(0);
                let grace = Duration::from_secs(self.config.exchange_heartbeat_grace_sec);
                state.resume(identity, cursor, grace);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "failed to load persisted registration; starting unregistered");
            }
        }
    }

    /// spec.md §9 "early-dispatch": if the idle tick has starved past the
    /// current interval, the command handler runs the tick body itself
    /// before handling whatever command actually arrived, guaranteeing
    /// progress. `run_tick` is the sole entry point and is reentrancy-
    /// guarded, so this never races the timer-driven `Tick`.
    async fn dispatch_early_tick_if_starved(&self, state: &mut WorkerState) {
        let starved = matches!(state.phase, WorkerPhase::Steady | WorkerPhase::Degraded)
            && state.last_tick_at.elapsed() > state.poll.interval();
        if starved {
            self.run_tick(state).await;
        }
    }

    /// The NoWork tick body (spec.md §4.F steps 1-7), guarded against
    /// reentrant invocation (spec.md §9 "Cursor race on concurrent early-
    /// dispatch").
    async fn run_tick(&self, state: &mut WorkerState) {
        if state.tick_in_flight {
            tracing::warn!("tick already in flight, skipping reentrant invocation");
            return;
        }
        state.tick_in_flight = true;
        state.last_tick_at = Instant::now();
        self.run_tick_inner(state).await;
        state.tick_in_flight = false;
    }

    async fn run_tick_inner(&self, state: &mut WorkerState) {
        if !matches!(state.phase, WorkerPhase::Steady | WorkerPhase::Degraded) {
            return;
        }
        // cursor==0 outside Unregistered would mean re-seeding never ran;
        // nothing meaningful to fetch against.
        let Some(identity) = state.identity.clone() else {
            return;
        };
        if state.cursor == 0 {
            tracing::error!("cursor is zero while registered; skipping tick");
            return;
        }

        let now = Instant::now();
        let mut outcome = TickOutcome::default();

        match self
            .client
            .post_changes(&identity.org, state.cursor, self.config.max_records(), &self.retry)
            .await
        {
            Ok((changes, _most_recent)) => {
                let restored = state.heartbeat_mut().record_success();
                if restored {
                    self.on_heartbeat_restored(&identity).await;
                }
                if state.phase == WorkerPhase::Degraded {
                    state.phase = WorkerPhase::Steady;
                }
                crate::metrics::record_changes_fetched(changes.len() as u64);
                self.process_batch(state, changes, &identity, &mut outcome).await;
            }
            Err(err) if err.is_auth_dead() => {
                self.on_auth_dead(state).await;
                return;
            }
            Err(err) => {
                outcome.transport_error = err.is_transport();
                let became_failed = state.heartbeat_mut().record_failure(now);
                if became_failed {
                    state.phase = WorkerPhase::Degraded;
                    crate::metrics::record_heartbeat_failure();
                    self.on_heartbeat_failed(&identity).await;
                }
                tracing::warn!(error = %err, org = %identity.org, "changes fetch failed");
            }
        }

        state.poll.on_tick(outcome);
    }

    /// spec.md §4.F steps 4-6: classify the batch, dispatch in
    /// `ChangeKind::ORDER`, advance and persist the cursor.
    async fn process_batch(
        &self,
        state: &mut WorkerState,
        changes: Vec<crate::model::Change>,
        identity: &Identity,
        outcome: &mut TickOutcome,
    ) {
        if changes.is_empty() {
            return;
        }

        let mut seen = std::collections::BTreeSet::new();
        let mut max_change_id = state.cursor;
        let mut node_changed = false;

        for change in &changes {
            max_change_id = max_change_id.max(change.change_id);
            match ChangeKind::classify(change, identity) {
                Some(kind) => {
                    if kind == ChangeKind::Node {
                        node_changed = true;
                    }
                    seen.insert(kind);
                }
                None => tracing::debug!(resource = %change.resource, "ignoring unrecognized change resource"),
            }
        }

        for kind in seen {
            let _ = self.events_tx.send(ExchangeEvent::ExchangeChange(kind));
            outcome.change_delivered = true;
        }

        let new_cursor = max_change_id + 1;
        state.cursor = new_cursor;
        if let Err(e) = self.store.save_cursor(new_cursor).await {
            tracing::error!(error = %e, "failed to persist advanced cursor");
        }
        crate::metrics::record_cursor_advance();

        if node_changed {
            // spec.md §4.F step 4: "A NODE change also triggers a fresh
            // read of heartbeat intervals."
            if let Ok(overrides) = self
                .client
                .get_heartbeat_intervals(&identity.org, &identity.id, &self.retry)
                .await
            {
                if !overrides.is_unset() {
                    state
                        .poll
                        .apply_overrides(overrides.min_interval, overrides.max_interval, overrides.interval_adjustment);
                }
            }
        }
    }

    async fn on_heartbeat_failed(&self, identity: &Identity) {
        let _ = self.events_tx.send(ExchangeEvent::NodeHeartbeatStateChange {
            restored: false,
            org: identity.org.clone(),
            id: identity.id.clone(),
        });
        self.log_event(Severity::Warn, eventlog::message_id::HEARTBEAT_FAILED, vec![identity.display()])
            .await;
    }

    async fn on_heartbeat_restored(&self, identity: &Identity) {
        let _ = self.events_tx.send(ExchangeEvent::NodeHeartbeatStateChange {
            restored: true,
            org: identity.org.clone(),
            id: identity.id.clone(),
        });
        self.log_event(Severity::Info, eventlog::message_id::HEARTBEAT_RESTORED, vec![identity.display()])
            .await;
    }

    /// spec.md §4.F "Special": HTTP 401 on changes/heartbeat means the node
    /// entry is gone; emit `NODE_UNCONFIGURE_START` and stop retrying.
    async fn on_auth_dead(&self, state: &mut WorkerState) {
        state.phase = WorkerPhase::ShuttingDown;
        let _ = self.events_tx.send(ExchangeEvent::NodeShutdown);
        self.log_event(Severity::Warn, eventlog::message_id::NODE_UNCONFIGURE_START, vec![])
            .await;
    }

    /// spec.md §6 "consumed" bus events, mapped onto state transitions.
    /// Returns `true` when the worker should stop.
    async fn handle_agent_event(&self, state: &mut WorkerState, evt: AgentEvent) -> bool {
        match evt {
            AgentEvent::DeviceRegistered { org, id, token } => {
                self.bootstrap(state, Identity { org, id, token }).await;
                false
            }
            AgentEvent::AgreementReached => {
                state.poll.set_agreement_reached();
                state.poll.on_tick(TickOutcome {
                    freshness_event: true,
                    ..Default::default()
                });
                false
            }
            AgentEvent::NodePolicy | AgentEvent::NodeUserInput | AgentEvent::AgreementEnded => {
                state.poll.on_tick(TickOutcome {
                    freshness_event: true,
                    ..Default::default()
                });
                false
            }
            AgentEvent::Shutdown { reason } => {
                // spec.md §9: both ExchangeChangesShutdown(MESSAGE_STOP) and
                // NodeShutdownComplete(UNCONFIGURE_COMPLETE) unify behind one
                // terminal command.
                state.phase = WorkerPhase::ShuttingDown;
                self.log_event(
                    Severity::Info,
                    eventlog::message_id::SHUTDOWN,
                    vec![format!("{reason:?}")],
                )
                .await;
                true
            }
        }
    }

    /// spec.md §4.F "Bootstrapping → Steady": re-read heartbeat intervals,
    /// fetch the Exchange's current max change ID with unbounded retry,
    /// persist it as the cursor, broadcast a synthetic all-types change.
    async fn bootstrap(&self, state: &mut WorkerState, identity: Identity) {
        state.phase = WorkerPhase::Bootstrapping;

        if let Err(e) = self.store.save_registration(&identity, &self.config.exchange_url, "").await {
            tracing::error!(error = %e, "failed to persist registration");
        }

        if let Ok(overrides) = self
            .client
            .get_heartbeat_intervals(&identity.org, &identity.id, &self.unbounded_retry)
            .await
        {
            if !overrides.is_unset() {
                state
                    .poll
                    .apply_overrides(overrides.min_interval, overrides.max_interval, overrides.interval_adjustment);
            }
        }

        let max_id = self.client.get_max_change_id(&identity.org, &self.unbounded_retry).await;
        if let Ok(id) = &max_id {
            state.cursor = *id;
        }

        state.heartbeat = Some(state::HeartbeatState::new(Duration::from_secs(
            self.config.exchange_heartbeat_grace_sec,
        )));
        state.identity = Some(identity.clone());
        state.phase = WorkerPhase::Steady;

        self.log_event(Severity::Info, eventlog::message_id::REGISTERED, vec![identity.display()])
            .await;

        // Events for this tick go out before the cursor that represents them
        // is persisted (spec.md §5): a crash in between may replay these
        // events on resume, but never loses them.
        for kind in ChangeKind::ORDER {
            let _ = self.events_tx.send(ExchangeEvent::ExchangeChange(kind));
        }

        match max_id {
            Ok(max_id) => {
                if let Err(e) = self.store.save_cursor(max_id).await {
                    tracing::error!(error = %e, "failed to persist re-seeded cursor");
                }
            }
            Err(e) => {
                // unbounded retry means this arm is unreachable in practice;
                // guard it anyway rather than leaving the cursor at 0.
                tracing::error!(error = %e, "unbounded max-change-id fetch returned an error");
            }
        }

        state.poll.on_tick(TickOutcome {
            freshness_event: true,
            ..Default::default()
        });
    }

    async fn log_event(&self, severity: Severity, message_id: &'static str, params: Vec<String>) {
        let entry = EventLogEntry::new(severity, message_id, params);
        if let Err(e) = self.store.append_event(&entry).await {
            tracing::error!(error = %e, "failed to append event log entry");
        }
    }
}

fn spawn_tick_task(tx: mpsc::Sender<WorkerCommand>, interval_secs: Arc<AtomicU64>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let secs = interval_secs.load(Ordering::Relaxed).max(1);
            tokio::time::sleep(Duration::from_secs(secs)).await;
            if tx.send(WorkerCommand::Tick).await.is_err() {
                break;
            }
        }
    })
}

fn spawn_intake_task(
    tx: mpsc::Sender<WorkerCommand>,
    mut agent_events: broadcast::Receiver<AgentEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match agent_events.recv().await {
                Ok(evt) => {
                    if tx.send(WorkerCommand::Agent(evt)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event-intake lagged behind the agent bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExchangeError, Result};
    use crate::model::{BlockchainClient, Change, HeartbeatIntervals, Microservice, Organization, Workload};
    use crate::store::SledCursorStore;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration as StdDuration;

    struct FakeApi {
        max_change_id: u64,
        /// Each `post_changes` call pops the next queued response; once
        /// empty, further calls return an empty, no-op batch.
        changes: std::sync::Mutex<VecDeque<Result<(Vec<Change>, u64)>>>,
        auth_dead: AtomicBool,
    }

    impl FakeApi {
        fn new(max_change_id: u64) -> Self {
            FakeApi {
                max_change_id,
                changes: std::sync::Mutex::new(VecDeque::new()),
                auth_dead: AtomicBool::new(false),
            }
        }

        fn push_changes(&self, batch: Vec<Change>, most_recent: u64) {
            self.changes.lock().unwrap().push_back(Ok((batch, most_recent)));
        }

        fn push_transport_error(&self) {
            self.changes
                .lock()
                .unwrap()
                .push_back(Err(transport_error()));
        }
    }

    fn transport_error() -> ExchangeError {
        // `ExchangeError`'s constructors are crate-private by design (spec.md
        // §7); this test lives inside the crate so it can reach them
        // directly. `ServerTimedOut` needs no live `reqwest::Error` to build.
        ExchangeError::transport(crate::error::TransportCause::ServerTimedOut { status: 504 })
    }

    fn change(id: u64, resource: &str, org: &str, node_id: &str) -> Change {
        Change {
            resource: resource.into(),
            org_id: org.into(),
            id: node_id.into(),
            operation: "created".into(),
            change_id: id,
        }
    }

    #[async_trait::async_trait]
    impl ExchangeApi for FakeApi {
        async fn get_organization(&self, _org: &str, _r: &RetryPolicy) -> Result<Organization> {
            Ok(Organization { description: None })
        }

        async fn search_workloads(
            &self,
            _org: &str,
            _url: &str,
            _arch: &str,
            _version: Option<&str>,
            _r: &RetryPolicy,
        ) -> Result<Vec<Workload>> {
            Ok(vec![])
        }

        async fn search_microservices(
            &self,
            _org: &str,
            _spec_ref: &str,
            _arch: &str,
            _version: Option<&str>,
            _r: &RetryPolicy,
        ) -> Result<Vec<Microservice>> {
            Ok(vec![])
        }

        async fn get_blockchain_client(
            &self,
            _org: &str,
            _t: &str,
            _n: &str,
            _r: &RetryPolicy,
        ) -> Result<BlockchainClient> {
            Ok(BlockchainClient { details: "opaque".into() })
        }

        async fn post_heartbeat(&self, _org: &str, _id: &str, _r: &RetryPolicy) -> Result<()> {
            Ok(())
        }

        async fn get_heartbeat_intervals(
            &self,
            _org: &str,
            _id: &str,
            _r: &RetryPolicy,
        ) -> Result<HeartbeatIntervals> {
            Ok(HeartbeatIntervals::default())
        }

        async fn post_changes(
            &self,
            _org: &str,
            _change_id: u64,
            _max: u32,
            _r: &RetryPolicy,
        ) -> Result<(Vec<Change>, u64)> {
            if self.auth_dead.load(Ordering::Relaxed) {
                return Err(ExchangeError::auth_dead());
            }
            match self.changes.lock().unwrap().pop_front() {
                Some(resp) => resp,
                None => Ok((vec![], 0)),
            }
        }

        async fn get_max_change_id(&self, _org: &str, _r: &RetryPolicy) -> Result<u64> {
            Ok(self.max_change_id)
        }
    }

    async fn spawn_registered(
        api: Arc<FakeApi>,
    ) -> (
        WorkerHandle,
        broadcast::Sender<AgentEvent>,
        Arc<SledCursorStore>,
    ) {
        let store = Arc::new(SledCursorStore::temporary().unwrap());
        let mut config = ExchangeConfig::default();
        config.exchange_url = "https://exchange.example".into();
        let worker = ChangeWorker::new(config, api, store.clone());
        let (agent_tx, agent_rx) = broadcast::channel(16);
        let handle = worker.spawn(agent_rx);
        (handle, agent_tx, store)
    }

    #[tokio::test]
    async fn first_boot_broadcasts_one_event_per_kind() {
        let api = Arc::new(FakeApi::new(42));
        let (mut handle, agent_tx, store) = spawn_registered(api).await;

        agent_tx
            .send(AgentEvent::DeviceRegistered {
                org: "acme".into(),
                id: "n1".into(),
                token: "t".into(),
            })
            .unwrap();

        let mut kinds = Vec::new();
        for _ in 0..5 {
            match handle.events.recv().await.unwrap() {
                ExchangeEvent::ExchangeChange(k) => kinds.push(k),
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(kinds, ChangeKind::ORDER.to_vec());

        // Cursor persistence is asynchronous w.r.t. the broadcast above;
        // give the command-processing task a moment to flush it.
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(store.load_cursor().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn plain_tick_with_no_changes_is_a_no_op() {
        let api = Arc::new(FakeApi::new(100));
        let (mut handle, agent_tx, store) = spawn_registered(api.clone()).await;
        agent_tx
            .send(AgentEvent::DeviceRegistered {
                org: "acme".into(),
                id: "n1".into(),
                token: "t".into(),
            })
            .unwrap();
        for _ in 0..5 {
            handle.events.recv().await.unwrap();
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        api.push_changes(vec![], 0);
        handle.commands.send(WorkerCommand::Tick).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        assert_eq!(store.load_cursor().await.unwrap(), 100);
        assert!(handle.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn mixed_batch_dispatches_in_kind_order_and_advances_cursor() {
        let api = Arc::new(FakeApi::new(100));
        let (mut handle, agent_tx, store) = spawn_registered(api.clone()).await;
        agent_tx
            .send(AgentEvent::DeviceRegistered {
                org: "acme".into(),
                id: "n1".into(),
                token: "t".into(),
            })
            .unwrap();
        for _ in 0..5 {
            handle.events.recv().await.unwrap();
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        api.push_changes(
            vec![
                change(101, "message", "acme", "n1"),
                change(102, "service", "other-org", "other-node"),
                change(103, "unknown", "acme", "n1"),
            ],
            0,
        );
        handle.commands.send(WorkerCommand::Tick).await.unwrap();

        let mut kinds = Vec::new();
        for _ in 0..2 {
            match handle.events.recv().await.unwrap() {
                ExchangeEvent::ExchangeChange(k) => kinds.push(k),
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(kinds, vec![ChangeKind::Message, ChangeKind::Service]);

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(store.load_cursor().await.unwrap(), 104);
    }

    #[tokio::test]
    async fn auth_dead_emits_node_shutdown_and_stops_advancing_cursor() {
        let api = Arc::new(FakeApi::new(100));
        let (mut handle, agent_tx, store) = spawn_registered(api.clone()).await;
        agent_tx
            .send(AgentEvent::DeviceRegistered {
                org: "acme".into(),
                id: "n1".into(),
                token: "t".into(),
            })
            .unwrap();
        for _ in 0..5 {
            handle.events.recv().await.unwrap();
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        api.auth_dead.store(true, Ordering::Relaxed);
        handle.commands.send(WorkerCommand::Tick).await.unwrap();

        match handle.events.recv().await.unwrap() {
            ExchangeEvent::NodeShutdown => {}
            other => panic!("unexpected event: {other:?}"),
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(store.load_cursor().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn transport_failure_past_grace_emits_failed_then_restored() {
        let api = Arc::new(FakeApi::new(100));
        let store = Arc::new(SledCursorStore::temporary().unwrap());
        let mut config = ExchangeConfig::default();
        config.exchange_url = "https://exchange.example".into();
        config.exchange_heartbeat_grace_sec = 0;
        let worker = ChangeWorker::new(config, api.clone(), store);
        let (agent_tx, agent_rx) = broadcast::channel(16);
        let mut handle = worker.spawn(agent_rx);

        agent_tx
            .send(AgentEvent::DeviceRegistered {
                org: "acme".into(),
                id: "n1".into(),
                token: "t".into(),
            })
            .unwrap();
        for _ in 0..5 {
            handle.events.recv().await.unwrap();
        }

        api.push_transport_error();
        handle.commands.send(WorkerCommand::Tick).await.unwrap();
        match handle.events.recv().await.unwrap() {
            ExchangeEvent::NodeHeartbeatStateChange { restored, .. } => assert!(!restored),
            other => panic!("unexpected event: {other:?}"),
        }

        // A second consecutive failure must not re-emit FAILED.
        api.push_transport_error();
        handle.commands.send(WorkerCommand::Tick).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert!(handle.events.try_recv().is_err());

        api.push_changes(vec![], 0);
        handle.commands.send(WorkerCommand::Tick).await.unwrap();
        match handle.events.recv().await.unwrap() {
            ExchangeEvent::NodeHeartbeatStateChange { restored, .. } => assert!(restored),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
