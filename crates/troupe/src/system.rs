//! # Actor System
//!
//! The root factory and registry. An `ActorSystem` creates cells, tracks the live
//! ones by path, owns the dead-letter sink and drives shutdown.
//!
//! Several systems can coexist in one process; nothing here is global.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info, warn};

use crate::actor::cell::{Cell, CellControl, CellSettings};
use crate::actor::{Actor, ActorError, ActorRef, RefKind};
use crate::config::{SystemConfig, UndeliverablePolicy};
use crate::dead_letters::DeadLetterActor;
use crate::id::ActorId;
use crate::message::Terminated;
use crate::path::ActorPath;

/// Lifecycle of an [`ActorSystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemState {
    Created,
    Initialized,
    Running,
    /// User actors stopped; `start` may be called again
    Stopped,
    /// Final
    Terminated,
}

/// Snapshot of one registered actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorInfo {
    pub path: ActorPath,
    pub id: ActorId,
    pub started: bool,
    pub created_at: DateTime<Utc>,
}

/// Notifications cells send to their system.
#[derive(Debug)]
pub(crate) enum SystemEvent {
    /// A cell flipped to terminated
    Terminated { actor: ActorRef },
    /// A cell asked to be stopped from inside its own loop
    StopRequested { actor: ActorRef },
}

type Registry = HashMap<ActorPath, Arc<dyn CellControl>>;

pub(crate) struct SystemInner {
    config: SystemConfig,
    state: RwLock<SystemState>,
    registry: RwLock<Registry>,
    watchers: Mutex<HashMap<ActorId, Vec<ActorRef>>>,
    events_tx: UnboundedSender<SystemEvent>,
    events_rx: Mutex<Option<UnboundedReceiver<SystemEvent>>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    dead_letters: ActorRef,
    dead_letter_count: Arc<AtomicU64>,
}

/// # ActorSystem
///
/// A cheap, cloneable handle to one actor system.
///
/// ## Lifecycle
///
/// `Created -> Initialized -> Running <-> Stopped -> Terminated`
///
/// Creating, stopping or looking up actors requires `Running`; any other state
/// yields [`ActorError::NotRunning`].
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

impl ActorSystem {
    /// Build a system from `config`. The dead-letter actor is allocated here and
    /// starts with the system.
    pub fn new(config: SystemConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let dead_letter_count = Arc::new(AtomicU64::new(0));

        let inner = Arc::new_cyclic(|weak: &Weak<SystemInner>| {
            let path = ActorPath::dead_letters();
            let settings = CellSettings {
                ask_timeout: config.ask_timeout(),
                dead_letters: None,
                events: events_tx.clone(),
            };
            let cell: Arc<dyn CellControl> = Arc::new(Cell::new(
                path.clone(),
                RefKind::DeadLetters,
                DeadLetterActor::new(dead_letter_count.clone()),
                settings,
                weak.clone(),
            ));
            let dead_letters = cell.actor_ref();

            let mut registry = Registry::new();
            registry.insert(path, cell);

            SystemInner {
                config,
                state: RwLock::new(SystemState::Created),
                registry: RwLock::new(registry),
                watchers: Mutex::new(HashMap::new()),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                event_loop: Mutex::new(None),
                dead_letters,
                dead_letter_count,
            }
        });

        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<SystemInner>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SystemState {
        self.inner.state()
    }

    /// Move from `Created` to `Initialized`. Calling it again is a no-op.
    pub fn initialize(&self) -> Result<(), ActorError> {
        let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        match *state {
            SystemState::Created => {
                *state = SystemState::Initialized;
                info!(
                    system = %self.name(),
                    undeliverable = ?self.inner.config.undeliverable,
                    ask_timeout_ms = self.inner.config.ask_timeout_ms,
                    "actor system initialized"
                );
                Ok(())
            }
            SystemState::Terminated => Err(ActorError::NotRunning),
            SystemState::Initialized | SystemState::Running | SystemState::Stopped => Ok(()),
        }
    }

    /// Start accepting actors. Initializes first when needed.
    pub async fn start(&self) -> Result<(), ActorError> {
        self.initialize()?;
        {
            let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
            match *state {
                SystemState::Running => return Ok(()),
                SystemState::Terminated => return Err(ActorError::NotRunning),
                SystemState::Created | SystemState::Initialized | SystemState::Stopped => {
                    *state = SystemState::Running;
                }
            }
        }

        self.inner.spawn_event_loop();
        if let Some(dead_letters) = self.inner.cell(self.inner.dead_letters.path()) {
            dead_letters.start().await?;
        }
        info!(system = %self.name(), "actor system running");
        Ok(())
    }

    /// Stop every user actor and move to `Stopped`. The system can be started again.
    pub async fn stop(&self) -> Result<(), ActorError> {
        {
            let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
            match *state {
                SystemState::Running => *state = SystemState::Stopped,
                _ => return Ok(()),
            }
        }

        info!(system = %self.name(), "stopping user actors");
        self.inner.stop_user_actors().await;
        Ok(())
    }

    /// Stop every registered actor in parallel, waiting at most `limit`.
    ///
    /// ## Returns
    ///
    /// * `Ok(())` - Every actor stopped in time
    /// * `Err(ActorError::Timeout)` - The deadline passed; the remaining actors were
    ///   cancelled without draining their mailboxes
    pub async fn terminate(&self, limit: Duration) -> Result<(), ActorError> {
        {
            let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
            if *state == SystemState::Terminated {
                return Ok(());
            }
            *state = SystemState::Terminated;
        }

        info!(system = %self.name(), ?limit, "terminating actor system");
        let started = Instant::now();
        let cells = self.inner.cells();

        let user_cells: Vec<_> = cells.iter().filter(|c| c.path().is_user()).cloned().collect();
        let system_cells: Vec<_> = cells.iter().filter(|c| c.path().is_system()).cloned().collect();

        let shutdown = async {
            join_all(user_cells.into_iter().map(spawn_dispose)).await;
            join_all(system_cells.into_iter().map(spawn_dispose)).await;
        };
        let outcome = timeout(limit, shutdown).await;

        let result = match outcome {
            Ok(()) => {
                info!(system = %self.name(), elapsed = ?started.elapsed(), "actor system terminated");
                Ok(())
            }
            Err(_) => {
                let stragglers: Vec<_> = cells.iter().filter(|c| !c.is_terminated()).collect();
                warn!(
                    system = %self.name(),
                    count = stragglers.len(),
                    "termination deadline passed, cancelling remaining actors"
                );
                for cell in stragglers {
                    cell.cancel();
                }
                Err(ActorError::Timeout {
                    target: format!("actor system {}", self.name()),
                    elapsed: started.elapsed(),
                })
            }
        };

        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|path, _| path.is_system());
        self.inner
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        if let Some(handle) = self
            .inner
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        result
    }

    /// [`terminate`](Self::terminate) bounded by the configured timeout.
    pub async fn shutdown(&self) -> Result<(), ActorError> {
        self.terminate(self.inner.config.terminate_timeout()).await
    }

    /// Create, register and start an actor at `path` under `/user`.
    ///
    /// ## Returns
    ///
    /// * `Ok(ActorRef)` - The actor is running
    /// * `Err(ActorError::DuplicatePath)` - A live actor already owns `path`
    /// * `Err(ActorError::StartFailed)` - `on_start` failed; nothing stays registered
    pub async fn create_actor<A: Actor>(
        &self,
        path: ActorPath,
        actor: A,
    ) -> Result<ActorRef, ActorError> {
        if !path.is_user() {
            return Err(ActorError::InvalidArgument(format!(
                "actors can only be created under /user: {}",
                path
            )));
        }
        self.inner.ensure_running()?;
        self.inner.create_actor_at(path, RefKind::Actor, actor).await
    }

    /// Create a top-level actor at `/user/{name}`.
    pub async fn spawn<A: Actor>(&self, name: &str, actor: A) -> Result<ActorRef, ActorError> {
        self.create_actor(ActorPath::user(name)?, actor).await
    }

    /// Gracefully stop an actor and remove it from the registry.
    ///
    /// Stopping an actor that already terminated is a no-op.
    pub async fn stop_actor(&self, actor: &ActorRef) -> Result<(), ActorError> {
        match actor.kind() {
            RefKind::Actor => {}
            RefKind::DeadLetters | RefKind::Temporary => {
                return Err(ActorError::Unsupported(format!(
                    "{} cannot be stopped",
                    actor.path()
                )))
            }
        }
        self.inner.ensure_running()?;
        self.inner.stop_registered(actor).await;
        Ok(())
    }

    /// Live actor registered at `path`.
    pub fn lookup(&self, path: &ActorPath) -> Option<ActorRef> {
        self.inner
            .cell(path)
            .filter(|cell| !cell.is_terminated())
            .map(|cell| cell.actor_ref())
    }

    /// Every live actor, sorted by path.
    pub fn actors(&self) -> Vec<ActorInfo> {
        let mut actors: Vec<ActorInfo> = self
            .inner
            .cells()
            .iter()
            .filter(|cell| !cell.is_terminated())
            .map(|cell| cell.info())
            .collect();
        actors.sort_by(|a, b| a.path.cmp(&b.path));
        actors
    }

    /// The sink at `/system/deadLetters`.
    pub fn dead_letters(&self) -> ActorRef {
        self.inner.dead_letters.clone()
    }

    /// Messages the dead-letter actor has processed so far.
    pub fn dead_letter_count(&self) -> u64 {
        self.inner.dead_letter_count.load(Ordering::Relaxed)
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new(SystemConfig::default())
    }
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

fn spawn_dispose(cell: Arc<dyn CellControl>) -> JoinHandle<()> {
    tokio::spawn(async move { cell.dispose().await })
}

impl SystemInner {
    fn state(&self) -> SystemState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ensure_running(&self) -> Result<(), ActorError> {
        match self.state() {
            SystemState::Running => Ok(()),
            _ => Err(ActorError::NotRunning),
        }
    }

    fn cell(&self, path: &ActorPath) -> Option<Arc<dyn CellControl>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    fn cells(&self) -> Vec<Arc<dyn CellControl>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn cell_settings(&self) -> CellSettings {
        let dead_letters = match self.config.undeliverable {
            UndeliverablePolicy::Drop => None,
            UndeliverablePolicy::DeadLetters => Some(self.dead_letters.clone()),
        };
        CellSettings {
            ask_timeout: self.config.ask_timeout(),
            dead_letters,
            events: self.events_tx.clone(),
        }
    }

    /// Register a new cell at `path` and start it.
    ///
    /// The registry check and the cell allocation happen under one write lock, so
    /// a cell is only ever built for a path that is free.
    pub(crate) async fn create_actor_at<A: Actor>(
        self: &Arc<Self>,
        path: ActorPath,
        kind: RefKind,
        actor: A,
    ) -> Result<ActorRef, ActorError> {
        let cell = {
            let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            // terminate() flips the state before it snapshots the registry, so a
            // cell inserted under this lock is always seen by its shutdown sweep.
            self.ensure_running()?;
            match registry.get(&path).map(|existing| existing.is_terminated()) {
                Some(false) => return Err(ActorError::DuplicatePath(path)),
                Some(true) => {
                    if let Some(stale) = registry.remove(&path) {
                        tokio::spawn(async move { stale.dispose().await });
                    }
                }
                None => {}
            }

            let cell: Arc<dyn CellControl> = Arc::new(Cell::new(
                path.clone(),
                kind,
                actor,
                self.cell_settings(),
                Arc::downgrade(self),
            ));
            registry.insert(path.clone(), cell.clone());
            cell
        };

        if let Err(e) = cell.start().await {
            self.deregister(&path, cell.id());
            cell.dispose().await;
            return Err(e);
        }

        debug!(path = %path, id = %cell.id(), "actor created");
        Ok(cell.actor_ref())
    }

    fn deregister(&self, path: &ActorPath, id: ActorId) -> Option<Arc<dyn CellControl>> {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        match registry.get(path) {
            Some(cell) if cell.id() == id => registry.remove(path),
            _ => None,
        }
    }

    /// Stop the cell `actor` refers to and drop its registry entry.
    ///
    /// Matches on id, so a stale ref never stops a newer actor at the same path.
    pub(crate) async fn stop_registered(&self, actor: &ActorRef) {
        let Some(cell) = self.cell(actor.path()).filter(|cell| cell.id() == actor.id()) else {
            debug!(path = %actor.path(), "stop requested for an actor that is not registered");
            return;
        };
        cell.dispose().await;
        // Still running when the stop was requested from the actor's own loop.
        if cell.is_terminated() {
            self.deregister(actor.path(), actor.id());
        }
    }

    pub(crate) fn request_stop(&self, actor: &ActorRef) -> Result<(), ActorError> {
        self.events_tx
            .send(SystemEvent::StopRequested {
                actor: actor.clone(),
            })
            .map_err(|_| ActorError::NotRunning)
    }

    async fn stop_user_actors(&self) {
        let user_cells: Vec<_> = self
            .cells()
            .into_iter()
            .filter(|cell| cell.path().is_user())
            .collect();

        // Top-level actors take their children down with them.
        let (top_level, nested): (Vec<_>, Vec<_>) = user_cells
            .into_iter()
            .partition(|cell| cell.path().depth() == 1);
        join_all(top_level.iter().map(|cell| cell.dispose())).await;
        join_all(nested.iter().map(|cell| cell.dispose())).await;

        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|path, _| !path.is_user());
    }

    pub(crate) fn add_watcher(&self, target: &ActorRef, watcher: &ActorRef) {
        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        let list = watchers.entry(target.id()).or_default();
        if !list.contains(watcher) {
            list.push(watcher.clone());
        }
    }

    /// Returns true when `watcher` was still registered for `target`.
    pub(crate) fn remove_watcher(&self, target: &ActorRef, watcher: &ActorRef) -> bool {
        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = watchers.get_mut(&target.id()) else {
            return false;
        };
        let before = list.len();
        list.retain(|w| w != watcher);
        let removed = list.len() != before;
        if list.is_empty() {
            watchers.remove(&target.id());
        }
        removed
    }

    fn spawn_event_loop(self: &Arc<Self>) {
        let mut event_loop = self.event_loop.lock().unwrap_or_else(PoisonError::into_inner);
        if event_loop.is_some() {
            return;
        }
        let Some(events) = self
            .events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        *event_loop = Some(tokio::spawn(run_events(Arc::downgrade(self), events)));
    }

    fn handle_terminated(self: &Arc<Self>, actor: ActorRef) {
        if let Some(cell) = self.deregister(actor.path(), actor.id()) {
            tokio::spawn(async move { cell.dispose().await });
        }

        let notify = {
            let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
            for list in watchers.values_mut() {
                list.retain(|w| *w != actor);
            }
            watchers.remove(&actor.id()).unwrap_or_default()
        };

        for watcher in notify.into_iter().filter(ActorRef::is_valid) {
            let notice = Terminated {
                actor: actor.clone(),
            };
            if let Err(e) = watcher.tell(notice, None) {
                debug!(watcher = %watcher.path(), error = %e, "could not deliver termination notice");
            }
        }
    }
}

impl Drop for SystemInner {
    fn drop(&mut self) {
        if let Some(handle) = self
            .event_loop
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        for cell in self
            .registry
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            cell.cancel();
        }
    }
}

async fn run_events(system: Weak<SystemInner>, mut events: UnboundedReceiver<SystemEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = system.upgrade() else {
            break;
        };
        match event {
            SystemEvent::Terminated { actor } => inner.handle_terminated(actor),
            SystemEvent::StopRequested { actor } => {
                tokio::spawn(async move { inner.stop_registered(&actor).await });
            }
        }
    }
    debug!("system event loop exited");
}
