//! # Actor Cell
//!
//! A cell pairs one actor instance with its mailbox and a single processing task.
//!
//! The cell is split in two:
//!
//! * [`CellCore`] is the addressable half. It is allocated first, owns the mailbox
//!   intake and lifecycle flags, and is what every `ActorRef` to the actor points at.
//! * [`Cell`] owns the actor, its [`Context`] and the processing task. It is built
//!   around an existing core, so the context's self-ref is valid before `on_start`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::actor::context::Context;
use crate::actor::handle::{ActorRef, Delivery, RefKind, RefTarget};
use crate::actor::traits::Actor;
use crate::actor::types::ActorError;
use crate::id::ActorId;
use crate::message::{DeadLetter, Envelope};
use crate::path::ActorPath;
use crate::system::{ActorInfo, SystemEvent, SystemInner};

tokio::task_local! {
    /// Id of the cell whose processing loop is running on the current task.
    static CURRENT_CELL: ActorId;
}

fn on_own_loop(id: ActorId) -> bool {
    CURRENT_CELL.try_with(|current| *current == id).unwrap_or(false)
}

/// Settings a cell inherits from its system.
#[derive(Clone)]
pub(crate) struct CellSettings {
    pub ask_timeout: Duration,
    pub dead_letters: Option<ActorRef>,
    pub events: UnboundedSender<SystemEvent>,
}

/// The addressable half of a cell.
pub(crate) struct CellCore {
    id: ActorId,
    path: ActorPath,
    kind: RefKind,
    created_at: DateTime<Utc>,
    intake: Mutex<Option<UnboundedSender<Envelope>>>,
    started: AtomicBool,
    terminated: AtomicBool,
    settings: CellSettings,
}

impl CellCore {
    fn new(
        path: ActorPath,
        kind: RefKind,
        settings: CellSettings,
    ) -> (Arc<Self>, UnboundedReceiver<Envelope>) {
        let (intake, mailbox) = mpsc::unbounded_channel();
        let core = Self {
            id: ActorId::generate(),
            path,
            kind,
            created_at: Utc::now(),
            intake: Mutex::new(Some(intake)),
            started: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            settings,
        };
        (Arc::new(core), mailbox)
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Stop accepting new envelopes. Already queued ones stay in the mailbox.
    fn close_intake(&self) {
        self.intake
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Flip to terminated. Only the first call reports to the system.
    fn mark_terminated(self: &Arc<Self>) {
        // Flag first: a send that wins the intake lock afterwards is still
        // picked up by reject_pending.
        let already = self.terminated.swap(true, Ordering::AcqRel);
        self.close_intake();
        if already {
            return;
        }
        debug!(path = %self.path, "actor terminated");
        let actor = ActorRef::new(self.clone());
        if self.settings.events.send(SystemEvent::Terminated { actor }).is_err() {
            debug!(path = %self.path, "system gone, termination not reported");
        }
    }

    /// Settle envelopes left in a mailbox whose loop will not run again.
    ///
    /// Pending asks fail with `Undeliverable`; everything else follows the
    /// undeliverable policy.
    fn reject_pending(&self, mailbox: &mut UnboundedReceiver<Envelope>) {
        mailbox.close();
        let mut rejected = 0usize;
        while let Ok(envelope) = mailbox.try_recv() {
            rejected += 1;
            let asker = envelope
                .sender
                .as_ref()
                .filter(|sender| sender.kind() == RefKind::Temporary)
                .cloned();
            match asker {
                Some(asker) => asker.reject(ActorError::Undeliverable(self.path.clone())),
                None => {
                    self.undeliverable(envelope);
                }
            }
        }
        if rejected > 0 {
            debug!(path = %self.path, rejected, "rejected messages left in mailbox");
        }
    }

    fn undeliverable(&self, envelope: Envelope) -> Delivery {
        match &self.settings.dead_letters {
            Some(dead_letters) => {
                let letter = DeadLetter {
                    message: envelope.message,
                    sender: envelope.sender,
                    recipient: self.path.clone(),
                };
                if let Err(e) = dead_letters.tell(letter, None) {
                    debug!(path = %self.path, error = %e, "dead letters unavailable");
                }
            }
            None => {
                warn!(
                    path = %self.path,
                    message_type = envelope.message.type_name(),
                    "dropping message for terminated actor"
                );
            }
        }
        Delivery::Dropped
    }
}

impl RefTarget for CellCore {
    fn id(&self) -> ActorId {
        self.id
    }

    fn path(&self) -> &ActorPath {
        &self.path
    }

    fn kind(&self) -> RefKind {
        self.kind
    }

    fn is_valid(&self) -> bool {
        self.kind == RefKind::DeadLetters || !self.is_terminated()
    }

    fn deliver(&self, envelope: Envelope) -> Result<Delivery, ActorError> {
        if self.is_terminated() {
            return Ok(self.undeliverable(envelope));
        }

        let intake = self.intake.lock().unwrap_or_else(PoisonError::into_inner);
        let sent = match intake.as_ref() {
            Some(tx) => tx.send(envelope).is_ok(),
            None => false,
        };
        drop(intake);

        if sent {
            Ok(Delivery::Enqueued)
        } else if self.kind == RefKind::DeadLetters {
            debug!(path = %self.path, "dead letters closed, message discarded");
            Ok(Delivery::Dropped)
        } else {
            Err(ActorError::Cancelled(self.path.clone()))
        }
    }

    fn ask_timeout(&self) -> Duration {
        self.settings.ask_timeout
    }
}

/// Type-erased control surface the system uses for registered cells.
pub(crate) trait CellControl: Send + Sync {
    fn id(&self) -> ActorId;

    fn path(&self) -> &ActorPath;

    fn actor_ref(&self) -> ActorRef;

    fn info(&self) -> ActorInfo;

    fn is_terminated(&self) -> bool;

    fn start(&self) -> BoxFuture<'_, Result<(), ActorError>>;

    /// Stop if needed, then cancel and reap the processing task.
    fn dispose(&self) -> BoxFuture<'_, ()>;

    /// Make the processing loop exit without draining.
    fn cancel(&self);
}

enum CellState<A: Actor> {
    Created {
        actor: A,
        context: Context,
        mailbox: UnboundedReceiver<Envelope>,
    },
    Running(JoinHandle<Parked<A>>),
    Terminated,
}

/// What the processing loop hands back when it exits.
struct Parked<A> {
    actor: A,
    context: Context,
    exit: LoopExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// Intake closed and every queued envelope processed
    Drained,
    /// Cancellation requested
    Cancelled,
    /// `on_restart` failed
    Failed,
}

pub(crate) struct Cell<A: Actor> {
    core: Arc<CellCore>,
    cancel: CancellationToken,
    state: tokio::sync::Mutex<CellState<A>>,
}

impl<A: Actor> Cell<A> {
    /// Build a cell in two phases: allocate the addressable core, then wire the
    /// actor and a context whose self-ref points at that core.
    pub(crate) fn new(
        path: ActorPath,
        kind: RefKind,
        actor: A,
        settings: CellSettings,
        system: Weak<SystemInner>,
    ) -> Self {
        let (core, mailbox) = CellCore::new(path, kind, settings);
        let context = Context::new(ActorRef::new(core.clone()), system);
        Self {
            core,
            cancel: CancellationToken::new(),
            state: tokio::sync::Mutex::new(CellState::Created {
                actor,
                context,
                mailbox,
            }),
        }
    }

    async fn start_cell(&self) -> Result<(), ActorError> {
        let mut state = self.state.lock().await;
        if self.core.is_terminated() {
            return Ok(());
        }

        let (mut actor, mut context, mailbox) =
            match std::mem::replace(&mut *state, CellState::Terminated) {
                CellState::Created {
                    actor,
                    context,
                    mailbox,
                } => (actor, context, mailbox),
                other => {
                    *state = other;
                    return Ok(());
                }
            };

        if let Err(e) = actor.on_start(&mut context).await {
            let reason = format!("{:#}", e);
            warn!(path = %self.core.path, %reason, "on_start failed");
            *state = CellState::Created {
                actor,
                context,
                mailbox,
            };
            return Err(ActorError::StartFailed {
                path: self.core.path.clone(),
                reason,
            });
        }

        self.core.started.store(true, Ordering::Release);
        let span = info_span!("actor", path = %self.core.path, id = %self.core.id);
        let processing = CURRENT_CELL.scope(
            self.core.id,
            run(actor, context, mailbox, self.core.clone(), self.cancel.clone()),
        );
        *state = CellState::Running(tokio::spawn(processing.instrument(span)));
        debug!(path = %self.core.path, "actor started");
        Ok(())
    }

    async fn stop_cell(&self) {
        if on_own_loop(self.core.id) {
            // Awaiting our own processing task would never finish.
            self.request_stop_from_loop();
            return;
        }

        let mut state = self.state.lock().await;
        if self.core.is_terminated() {
            return;
        }
        self.core.close_intake();

        let parked = match std::mem::replace(&mut *state, CellState::Terminated) {
            CellState::Created {
                actor,
                context,
                mut mailbox,
            } => {
                self.core.reject_pending(&mut mailbox);
                Some(Parked {
                    actor,
                    context,
                    exit: LoopExit::Cancelled,
                })
            }
            CellState::Running(handle) => match handle.await {
                Ok(parked) => Some(parked),
                Err(e) => {
                    error!(path = %self.core.path, error = %e, "processing loop aborted");
                    None
                }
            },
            CellState::Terminated => None,
        };

        if let Some(Parked {
            mut actor,
            mut context,
            exit,
        }) = parked
        {
            context.stop_children().await;
            if self.core.is_started() && exit != LoopExit::Failed {
                if let Err(e) = actor.on_stop(&mut context).await {
                    warn!(path = %self.core.path, error = %format!("{:#}", e), "on_stop failed");
                }
            }
        }

        self.core.mark_terminated();
    }

    async fn dispose_cell(&self) {
        if on_own_loop(self.core.id) {
            self.request_stop_from_loop();
            return;
        }

        if !self.core.is_terminated() {
            self.stop_cell().await;
        }
        self.cancel.cancel();

        let mut state = self.state.lock().await;
        if let CellState::Running(handle) = std::mem::replace(&mut *state, CellState::Terminated) {
            match handle.await {
                Ok(mut parked) => parked.context.stop_children().await,
                Err(e) => debug!(path = %self.core.path, error = %e, "ignoring join error during dispose"),
            }
        }
        self.core.mark_terminated();
    }

    fn request_stop_from_loop(&self) {
        self.core.close_intake();
        let actor = ActorRef::new(self.core.clone());
        if self
            .core
            .settings
            .events
            .send(SystemEvent::StopRequested { actor })
            .is_err()
        {
            self.cancel.cancel();
        }
    }
}

impl<A: Actor> CellControl for Cell<A> {
    fn id(&self) -> ActorId {
        self.core.id
    }

    fn path(&self) -> &ActorPath {
        &self.core.path
    }

    fn actor_ref(&self) -> ActorRef {
        ActorRef::new(self.core.clone())
    }

    fn info(&self) -> ActorInfo {
        ActorInfo {
            path: self.core.path.clone(),
            id: self.core.id,
            started: self.core.is_started(),
            created_at: self.core.created_at,
        }
    }

    fn is_terminated(&self) -> bool {
        self.core.is_terminated()
    }

    fn start(&self) -> BoxFuture<'_, Result<(), ActorError>> {
        Box::pin(self.start_cell())
    }

    fn dispose(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.dispose_cell())
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// The processing loop. One envelope at a time, until drained or cancelled.
async fn run<A: Actor>(
    mut actor: A,
    mut context: Context,
    mut mailbox: UnboundedReceiver<Envelope>,
    core: Arc<CellCore>,
    cancel: CancellationToken,
) -> Parked<A> {
    let exit = loop {
        let envelope = tokio::select! {
            biased;
            _ = cancel.cancelled() => break LoopExit::Cancelled,
            next = mailbox.recv() => match next {
                Some(envelope) => envelope,
                None => break LoopExit::Drained,
            },
        };

        let Envelope { message, sender } = envelope;
        context.observe(&message);
        context.set_sender(sender);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = actor.on_receive(message, &mut context) => Some(result),
        };
        context.clear_sender();
        let Some(result) = result else {
            break LoopExit::Cancelled;
        };

        if let Err(e) = result {
            warn!(error = %format!("{:#}", e), "message handler failed, running restart hook");
            if let Err(e) = actor.on_restart(e, &mut context).await {
                error!(error = %format!("{:#}", e), "restart hook failed, terminating actor");
                cancel.cancel();
                core.mark_terminated();
                break LoopExit::Failed;
            }
            debug!("actor recovered from handler failure");
        }
    };

    if exit != LoopExit::Drained {
        core.reject_pending(&mut mailbox);
    }
    debug!(?exit, "processing loop exited");
    Parked {
        actor,
        context,
        exit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    struct Recorder {
        seen: mpsc::UnboundedSender<u32>,
    }

    impl Actor for Recorder {
        async fn on_receive(&mut self, message: Message, _ctx: &mut Context) -> anyhow::Result<()> {
            if let Some(n) = message.downcast_ref::<u32>() {
                let _ = self.seen.send(*n);
            }
            Ok(())
        }
    }

    fn detached_cell(actor: Recorder) -> (Cell<Recorder>, mpsc::UnboundedReceiver<SystemEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let settings = CellSettings {
            ask_timeout: Duration::from_secs(1),
            dead_letters: None,
            events,
        };
        let cell = Cell::new(
            ActorPath::user("recorder").unwrap(),
            RefKind::Actor,
            actor,
            settings,
            Weak::new(),
        );
        (cell, events_rx)
    }

    #[tokio::test]
    async fn test_stop_drains_queued_messages() {
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let (cell, mut events) = detached_cell(Recorder { seen: seen_tx });
        let actor_ref = cell.actor_ref();

        cell.start().await.unwrap();
        for n in 0..50u32 {
            actor_ref.tell(n, None).unwrap();
        }
        cell.stop_cell().await;

        let mut received = Vec::new();
        while let Ok(n) = seen_rx.try_recv() {
            received.push(n);
        }
        assert_eq!(received, (0..50).collect::<Vec<_>>());
        assert!(!actor_ref.is_valid());
        assert!(matches!(events.try_recv(), Ok(SystemEvent::Terminated { .. })));
    }

    #[tokio::test]
    async fn test_send_after_close_is_cancelled() {
        let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
        let (cell, _events) = detached_cell(Recorder { seen: seen_tx });
        cell.core.close_intake();
        assert_eq!(
            cell.actor_ref().tell(1u32, None),
            Err(ActorError::Cancelled(cell.path().clone()))
        );
    }

    #[tokio::test]
    async fn test_terminated_reported_once() {
        let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
        let (cell, mut events) = detached_cell(Recorder { seen: seen_tx });
        cell.start().await.unwrap();
        cell.stop_cell().await;
        cell.stop_cell().await;
        cell.dispose().await;

        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancel_skips_remaining_messages() {
        let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
        let (cell, _events) = detached_cell(Recorder { seen: seen_tx });
        cell.cancel();
        cell.start().await.unwrap();
        let _ = cell.actor_ref().tell(1u32, None);
        cell.stop_cell().await;
        assert!(cell.is_terminated());
        assert!(!cell.actor_ref().is_valid());
    }

    #[tokio::test]
    async fn test_stop_before_start_rejects_pending_ask() {
        let (seen_tx, _seen_rx) = mpsc::unbounded_channel();
        let (cell, _events) = detached_cell(Recorder { seen: seen_tx });
        let actor_ref = cell.actor_ref();

        let asking = tokio::spawn(async move {
            actor_ref.ask_timeout::<u32>(1u32, Duration::from_secs(5)).await
        });
        // Let the ask land in the unstarted mailbox.
        tokio::task::yield_now().await;
        cell.stop_cell().await;

        let result = tokio::time::timeout(Duration::from_secs(1), asking)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Err(ActorError::Undeliverable(cell.path().clone())));
    }
}
