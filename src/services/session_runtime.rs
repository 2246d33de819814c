//! One synchronized view of a session.
//!
//! Every open session runs a single task that owns the local replica. Commands from the
//! handle, store notifications, clock ticks and the host autosave are all handled inside one
//! `select!` loop, so a tick and a snapshot can never interleave mid-update.
//!
//! Hosts hand their writes to a separate writer task through a `watch` channel: the loop never
//! waits on the store, and a write that is still queued when a newer document arrives is
//! replaced by it. Each mutation is answered once a write covering it has settled.

use std::{collections::VecDeque, ops::ControlFlow, sync::Arc, time::Duration};

use futures::StreamExt;
use serde::Serialize;
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior, interval_at},
};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::{
    config::AppConfig,
    dao::{
        game_store::{GameStore, SnapshotStream},
        storage::StorageResult,
    },
    error::ServiceError,
    state::{
        clock::{self, ClockEngine, ClockEvent, ClockMode, TickRules, wall_clock_ms},
        game::{GameState, Role, SessionCode, TeamId},
        mutation::Mutation,
        reconcile::{EngineCommand, ReconcileOutcome, reconcile},
    },
};

const COMMAND_CAPACITY: usize = 16;
const WRITE_REPORT_CAPACITY: usize = 16;
/// Own writes remembered so their echoes can be told apart from remote changes.
const MAX_UNECHOED_WRITES: usize = 16;
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Tuning shared by every runtime spawned from the same configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Period of the local clock engine.
    pub tick_interval: Duration,
    /// Period of the host's unconditional full-document write.
    pub autosave_interval: Duration,
    /// Shot clock value that triggers the low-time signal.
    pub low_shot_clock_threshold: u32,
    pub mode: ClockMode,
    /// Buffered presentation events per runtime.
    pub event_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RuntimeOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            tick_interval: config.clock.tick_interval.max(MIN_PERIOD),
            autosave_interval: config.clock.autosave_interval.max(MIN_PERIOD),
            low_shot_clock_threshold: config.clock.low_shot_clock_threshold,
            mode: config.clock.mode,
            event_capacity: config.event_capacity.max(1),
        }
    }
}

/// Presentation signals published by a runtime. Only `Snapshot` carries replicated data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// The local replica changed.
    Snapshot { state: GameState },
    /// The shot clock just dropped to the warning threshold.
    LowShotClock { remaining: u32 },
    /// The host's shot clock expired and possession moved to `possession`.
    ShotClockViolation { possession: TeamId },
    /// The game clock reached 00:00.
    PeriodEnded { period: u32 },
    /// A store interaction failed; the replica is still usable.
    TransientError { message: String },
    /// The document is gone. Nothing follows this event.
    SessionEnded,
}

impl SessionEvent {
    /// Name used for the SSE `event:` field.
    pub fn event_name(&self) -> &'static str {
        match self {
            SessionEvent::Snapshot { .. } => "snapshot",
            SessionEvent::LowShotClock { .. } => "lowShotClock",
            SessionEvent::ShotClockViolation { .. } => "shotClockViolation",
            SessionEvent::PeriodEnded { .. } => "periodEnded",
            SessionEvent::TransientError { .. } => "transientError",
            SessionEvent::SessionEnded => "sessionEnded",
        }
    }
}

enum Command {
    Mutate {
        mutation: Mutation,
        reply: oneshot::Sender<Result<GameState, ServiceError>>,
    },
    Shutdown,
}

/// Owning handle of a running session. Dropping it stops the runtime and releases the
/// store subscription.
pub struct SessionHandle {
    code: SessionCode,
    role: Role,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    replica: watch::Receiver<Option<GameState>>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Subscribe to `code` and start its runtime.
    ///
    /// Fails with `NotFound` when the document does not exist and `Network` when the
    /// subscription cannot be opened.
    pub async fn open(
        store: Arc<dyn GameStore>,
        code: SessionCode,
        role: Role,
        options: RuntimeOptions,
    ) -> Result<Self, ServiceError> {
        let mut snapshots = store.subscribe(code).await?;
        let initial = match snapshots.next().await {
            Some(Ok(Some(state))) => state,
            Some(Ok(None)) | None => return Err(ServiceError::NotFound(code.to_string())),
            Some(Err(err)) => return Err(err.into()),
        };

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events_tx, _) = broadcast::channel(options.event_capacity);
        let (replica_tx, replica_rx) = watch::channel(None);

        let (writes, writer) = if role.is_host() {
            let (pending_tx, pending_rx) = watch::channel(None);
            let (reports_tx, reports_rx) = mpsc::channel(WRITE_REPORT_CAPACITY);
            let writer = run_writer(store.clone(), code, pending_rx, reports_tx);
            let writes = Writes {
                pending: pending_tx,
                reports: reports_rx,
                generation: 0,
                waiters: Vec::new(),
                unechoed: VecDeque::new(),
            };
            (Some(writes), Some(writer))
        } else {
            (None, None)
        };

        let autosave = role.is_host().then(|| {
            let mut ticker = interval_at(
                Instant::now() + options.autosave_interval,
                options.autosave_interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        let mut runtime = SessionRuntime {
            code,
            rules: TickRules {
                role,
                mode: options.mode,
                low_shot_clock_threshold: options.low_shot_clock_threshold,
            },
            replica: None,
            engine: ClockEngine::new(options.tick_interval),
            events: events_tx.clone(),
            published: replica_tx,
            autosave,
            writes,
        };
        // The first document goes through the same path as every later notification.
        let _ = runtime.handle_snapshot(Some(initial));

        info!(%code, %role, mode = ?options.mode, "session runtime started");
        if let Some(writer) = writer {
            tokio::spawn(writer);
        }
        let task = tokio::spawn(runtime.run(commands_rx, snapshots));

        Ok(Self {
            code,
            role,
            commands: commands_tx,
            events: events_tx,
            replica: replica_rx,
            task,
        })
    }

    pub fn code(&self) -> SessionCode {
        self.code
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Receive presentation events from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current local replica; `None` once the session ended.
    pub fn replica(&self) -> Option<GameState> {
        self.replica.borrow().clone()
    }

    /// Observe replica changes.
    pub fn watch_replica(&self) -> watch::Receiver<Option<GameState>> {
        self.replica.clone()
    }

    /// Whether the runtime has stopped.
    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    /// Apply one operation to the replica and write the whole document back.
    ///
    /// Resolves once the write settles. The replica keeps the result even when the write
    /// fails; the next mutation or autosave retries it.
    pub async fn mutate(&self, mutation: Mutation) -> Result<GameState, ServiceError> {
        if !self.role.is_host() {
            return Err(ServiceError::AuthorityViolation(format!(
                "viewers cannot {}",
                mutation.name()
            )));
        }

        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Mutate { mutation, reply })
            .await
            .map_err(|_| ServiceError::SessionClosed)?;
        response.await.map_err(|_| ServiceError::SessionClosed)?
    }

    /// Stop the engine, release the store subscription and wait for the runtime to exit.
    pub async fn unsubscribe(mut self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let _ = (&mut self.task).await;
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct SessionRuntime {
    code: SessionCode,
    rules: TickRules,
    replica: Option<GameState>,
    engine: ClockEngine,
    events: broadcast::Sender<SessionEvent>,
    published: watch::Sender<Option<GameState>>,
    autosave: Option<Interval>,
    /// Host only.
    writes: Option<Writes>,
}

/// Host-side bookkeeping of the writer task.
struct Writes {
    pending: watch::Sender<Option<PendingWrite>>,
    reports: mpsc::Receiver<WriteReport>,
    generation: u64,
    waiters: Vec<MutationWaiter>,
    unechoed: VecDeque<GameState>,
}

#[derive(Clone)]
struct PendingWrite {
    generation: u64,
    reason: &'static str,
    state: GameState,
}

struct WriteReport {
    generation: u64,
    reason: &'static str,
    result: StorageResult<()>,
}

struct MutationWaiter {
    generation: u64,
    state: GameState,
    reply: oneshot::Sender<Result<GameState, ServiceError>>,
}

impl SessionRuntime {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut snapshots: SnapshotStream) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Mutate { mutation, reply }) => {
                        self.handle_mutation(mutation, reply);
                    }
                    Some(Command::Shutdown) | None => {
                        debug!(code = %self.code, "session unsubscribed");
                        break;
                    }
                },
                snapshot = snapshots.next() => match snapshot {
                    Some(Ok(snapshot)) => {
                        if self.handle_snapshot(snapshot).is_break() {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(code = %self.code, error = %err, "store notification failed");
                        self.emit(SessionEvent::TransientError {
                            message: err.to_string(),
                        });
                    }
                    None => {
                        info!(code = %self.code, "store subscription closed");
                        self.emit(SessionEvent::SessionEnded);
                        break;
                    }
                },
                _ = self.engine.next_tick() => self.handle_tick(),
                _ = next_autosave(&mut self.autosave) => self.autosave(),
                report = next_report(&mut self.writes) => self.handle_write_report(report),
            }
        }

        self.engine.stop();
        debug!(code = %self.code, "session runtime stopped");
    }

    fn handle_mutation(
        &mut self,
        mutation: Mutation,
        reply: oneshot::Sender<Result<GameState, ServiceError>>,
    ) {
        let op = mutation.name();
        let state = match self.apply_mutation(mutation) {
            Ok(state) => state,
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            }
        };

        match (self.queue_write(op), self.writes.as_mut()) {
            (Some(generation), Some(writes)) => writes.waiters.push(MutationWaiter {
                generation,
                state,
                reply,
            }),
            _ => {
                let _ = reply.send(Err(ServiceError::SessionClosed));
            }
        }
    }

    fn apply_mutation(&mut self, mutation: Mutation) -> Result<GameState, ServiceError> {
        if !self.rules.role.is_host() {
            return Err(ServiceError::AuthorityViolation(format!(
                "viewers cannot {}",
                mutation.name()
            )));
        }
        let current = self.replica.as_ref().ok_or(ServiceError::SessionClosed)?;

        let mut next = mutation.applied_to(current)?;
        let now = wall_clock_ms();
        if self.rules.mode == ClockMode::Deadline {
            clock::anchor(&mut next, now);
        }
        next.touch(now);

        self.replica = Some(next.clone());
        self.sync_engine();
        self.publish();
        debug!(code = %self.code, op = mutation.name(), "mutation applied");
        Ok(next)
    }

    fn handle_tick(&mut self) {
        let Some(state) = self.replica.as_mut() else {
            self.engine.stop();
            return;
        };

        let now = wall_clock_ms();
        let outcome = clock::advance(state, &self.rules, now);
        if outcome.persist {
            state.touch(now);
        }

        for event in outcome.events {
            match event {
                ClockEvent::LowShotClock { remaining } => {
                    self.emit(SessionEvent::LowShotClock { remaining });
                }
                ClockEvent::ShotClockViolation { possession } => {
                    info!(code = %self.code, %possession, "shot clock violation");
                    self.emit(SessionEvent::ShotClockViolation { possession });
                }
                ClockEvent::ShotClockExpired => {
                    debug!(code = %self.code, "shot clock expired; waiting for the host");
                }
                ClockEvent::PeriodEnded { period } => {
                    info!(code = %self.code, period, "period ended");
                    self.emit(SessionEvent::PeriodEnded { period });
                }
            }
        }

        if outcome.halt {
            self.engine.stop();
            debug!(code = %self.code, "clock engine halted");
        }
        self.publish();

        if outcome.persist {
            self.queue_write("tick");
        }
    }

    fn handle_snapshot(&mut self, snapshot: Option<GameState>) -> ControlFlow<()> {
        if let (Some(state), Some(writes)) = (&snapshot, self.writes.as_mut()) {
            // An echo of our own write carries nothing the replica does not already have, and
            // applying it would rewind clocks that ticked while the write was in flight.
            if let Some(position) = writes.unechoed.iter().position(|written| written == state) {
                writes.unechoed.drain(..=position);
                debug!(code = %self.code, "own write echoed back");
                return ControlFlow::Continue(());
            }
        }

        let snapshot = snapshot.map(|mut state| {
            if self.rules.mode == ClockMode::Deadline {
                clock::project_from_anchor(&mut state, wall_clock_ms());
            }
            if let Err(violation) = state.check_invariants() {
                warn!(code = %self.code, %violation, "snapshot breaks a document invariant");
            }
            state
        });

        match reconcile(&mut self.replica, snapshot, self.engine.is_active()) {
            ReconcileOutcome::Ended => {
                info!(code = %self.code, "session document removed");
                self.engine.stop();
                self.published.send_replace(None);
                self.emit(SessionEvent::SessionEnded);
                ControlFlow::Break(())
            }
            ReconcileOutcome::Applied { engine, changed } => {
                self.apply_engine_command(engine);
                if changed {
                    self.publish();
                }
                ControlFlow::Continue(())
            }
        }
    }

    fn autosave(&mut self) {
        let Some(state) = self.replica.as_mut() else {
            return;
        };
        state.touch(wall_clock_ms());
        self.published.send_replace(self.replica.clone());
        self.queue_write("autosave");
    }

    fn sync_engine(&mut self) {
        let running = self
            .replica
            .as_ref()
            .is_some_and(GameState::is_clock_running);
        let command = match (running, self.engine.is_active()) {
            (true, false) => EngineCommand::Start,
            (false, true) => EngineCommand::Stop,
            _ => EngineCommand::Keep,
        };
        self.apply_engine_command(command);
    }

    fn apply_engine_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Start => {
                self.engine.start();
                debug!(code = %self.code, "clock engine started");
            }
            EngineCommand::Stop => {
                self.engine.stop();
                debug!(code = %self.code, "clock engine stopped");
            }
            EngineCommand::Keep => {}
        }
    }

    /// Hand the replica to the writer task. Returns the write's generation, or `None` on
    /// viewers and after the session ended.
    fn queue_write(&mut self, reason: &'static str) -> Option<u64> {
        let state = self.replica.clone()?;
        let writes = self.writes.as_mut()?;

        writes.generation += 1;
        if writes.unechoed.len() == MAX_UNECHOED_WRITES {
            writes.unechoed.pop_front();
        }
        writes.unechoed.push_back(state.clone());
        writes.pending.send_replace(Some(PendingWrite {
            generation: writes.generation,
            reason,
            state,
        }));
        Some(writes.generation)
    }

    /// Settle every mutation the reported write covers.
    fn handle_write_report(&mut self, report: WriteReport) {
        let result = report.result.map_err(Arc::new);
        if let Err(err) = &result {
            warn!(
                code = %self.code,
                reason = report.reason,
                error = %err,
                "failed to persist scoreboard"
            );
            self.emit(SessionEvent::TransientError {
                message: err.to_string(),
            });
        }

        let Some(writes) = self.writes.as_mut() else {
            return;
        };
        let (settled, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut writes.waiters)
            .into_iter()
            .partition(|waiter| waiter.generation <= report.generation);
        writes.waiters = waiting;

        for waiter in settled {
            let outcome = match &result {
                Ok(()) => Ok(waiter.state),
                Err(err) => Err(ServiceError::Network(Arc::clone(err))),
            };
            let _ = waiter.reply.send(outcome);
        }
    }

    fn publish(&self) {
        self.published.send_replace(self.replica.clone());
        if let Some(state) = &self.replica {
            self.emit(SessionEvent::Snapshot {
                state: state.clone(),
            });
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine; presentation is optional.
        let _ = self.events.send(event);
    }
}

/// Write the latest queued document until the runtime goes away. Documents queued while a
/// write is in flight collapse into the newest one.
async fn run_writer(
    store: Arc<dyn GameStore>,
    code: SessionCode,
    mut pending: watch::Receiver<Option<PendingWrite>>,
    reports: mpsc::Sender<WriteReport>,
) {
    while pending.changed().await.is_ok() {
        let Some(write) = pending.borrow_and_update().clone() else {
            continue;
        };
        let result = store.set(code, write.state).await;
        let report = WriteReport {
            generation: write.generation,
            reason: write.reason,
            result,
        };
        if reports.send(report).await.is_err() {
            break;
        }
    }
    debug!(%code, "scoreboard writer stopped");
}

async fn next_report(writes: &mut Option<Writes>) -> WriteReport {
    match writes {
        Some(writes) => match writes.reports.recv().await {
            Some(report) => report,
            None => std::future::pending().await,
        },
        None => std::future::pending().await,
    }
}

async fn next_autosave(autosave: &mut Option<Interval>) {
    match autosave {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
