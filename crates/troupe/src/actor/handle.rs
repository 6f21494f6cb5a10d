//! # Actor Reference
//!
//! `ActorRef` is the only public way to talk to an actor. It wraps whatever sits
//! behind an address (a cell, the dead-letter sink, or the one-shot sink used by
//! `ask`) behind a single trait object.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, warn};

use crate::actor::promise::PromiseRef;
use crate::actor::types::{ActorError, DEFAULT_ASK_TIMEOUT};
use crate::id::ActorId;
use crate::message::{Envelope, Message};
use crate::path::ActorPath;

/// What kind of endpoint a ref addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// A regular actor cell
    Actor,
    /// The system's dead-letter sink
    DeadLetters,
    /// The response sink of a pending `ask`
    Temporary,
}

/// Outcome of handing an envelope to a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Enqueued,
    /// The target has terminated; the envelope was logged or forwarded to dead letters.
    Dropped,
}

/// Something an `ActorRef` can point at.
pub(crate) trait RefTarget: Send + Sync + 'static {
    fn id(&self) -> ActorId;

    fn path(&self) -> &ActorPath;

    fn kind(&self) -> RefKind;

    fn is_valid(&self) -> bool;

    fn deliver(&self, envelope: Envelope) -> Result<Delivery, ActorError>;

    fn ask_timeout(&self) -> Duration {
        DEFAULT_ASK_TIMEOUT
    }

    /// Fail whoever is waiting on this target. Only response sinks have a waiter.
    fn reject(&self, _error: ActorError) {}
}

/// # ActorRef
///
/// A cheap, cloneable handle addressing exactly one actor incarnation.
///
/// Refs stay safe to hold after their actor terminates: `is_valid()` turns false,
/// `tell` is swallowed and `ask` fails fast with [`ActorError::Undeliverable`].
#[derive(Clone)]
pub struct ActorRef {
    target: Arc<dyn RefTarget>,
}

impl ActorRef {
    pub(crate) fn new(target: Arc<dyn RefTarget>) -> Self {
        Self { target }
    }

    pub fn id(&self) -> ActorId {
        self.target.id()
    }

    pub fn path(&self) -> &ActorPath {
        self.target.path()
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.target.path().name()
    }

    pub fn kind(&self) -> RefKind {
        self.target.kind()
    }

    /// True until the referenced actor has terminated.
    pub fn is_valid(&self) -> bool {
        self.target.is_valid()
    }

    /// Enqueue a message without waiting for it to be processed.
    ///
    /// ## Returns
    ///
    /// * `Ok(())` - The message was enqueued, or the target had already
    ///   terminated and the message was dropped
    /// * `Err(ActorError::Cancelled)` - The target's mailbox closed while sending
    pub fn tell<M: Any + Send>(&self, message: M, sender: Option<&ActorRef>) -> Result<(), ActorError> {
        let envelope = Envelope::new(Message::new(message), sender.cloned());
        self.target.deliver(envelope).map(|_| ())
    }

    pub(crate) fn reject(&self, error: ActorError) {
        self.target.reject(error);
    }

    /// Send a request and wait for a reply of type `R`, using the target's default timeout.
    pub async fn ask<R: Any + Send>(&self, message: impl Any + Send) -> Result<R, ActorError> {
        self.ask_timeout(message, self.target.ask_timeout()).await
    }

    /// Send a request and wait up to `limit` for a reply of type `R`.
    ///
    /// The request carries a one-shot response sink as its sender; the target
    /// answers with an ordinary `tell` to that sender. Replies arriving after the
    /// deadline are dropped.
    pub async fn ask_timeout<R: Any + Send>(
        &self,
        message: impl Any + Send,
        limit: Duration,
    ) -> Result<R, ActorError> {
        match self.kind() {
            RefKind::DeadLetters => {
                return Err(ActorError::Unsupported(format!(
                    "{} does not answer requests",
                    self.path()
                )))
            }
            RefKind::Actor | RefKind::Temporary => {}
        }
        if !self.is_valid() {
            return Err(ActorError::Undeliverable(self.path().clone()));
        }

        let (sink, response) = PromiseRef::expecting::<R>();
        let reply_to = ActorRef::new(sink.clone());
        let started = Instant::now();

        let envelope = Envelope::new(Message::new(message), Some(reply_to.clone()));
        match self.target.deliver(envelope) {
            Ok(Delivery::Enqueued) => {}
            Ok(Delivery::Dropped) => sink.fail(ActorError::Undeliverable(self.path().clone())),
            Err(error) => sink.fail(error),
        }

        let result = match timeout(limit, response).await {
            Ok(Ok(reply)) => reply.and_then(|message| {
                message.downcast::<R>().map_err(|message| ActorError::TypeMismatch {
                    expected: std::any::type_name::<R>().to_string(),
                    found: message.type_name().to_string(),
                })
            }),
            Ok(Err(_)) => {
                debug!(target_path = %self.path(), "response sink closed without a reply");
                Err(ActorError::ChannelClosed)
            }
            Err(_) => {
                sink.abandon();
                let elapsed = started.elapsed();
                warn!(target_path = %self.path(), ?elapsed, "ask timed out");
                Err(ActorError::Timeout {
                    target: self.path().to_string(),
                    elapsed,
                })
            }
        };

        drop(reply_to);
        result
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ActorRef {}

impl Hash for ActorRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("path", self.path())
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}
