//! # Actor Context
//!
//! The view of the runtime an actor gets inside its hooks: its own ref, the sender
//! of the message being handled, its children and the actors it watches.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::actor::handle::{ActorRef, RefKind};
use crate::actor::traits::Actor;
use crate::actor::types::ActorError;
use crate::message::{Message, Terminated};
use crate::path::ActorPath;
use crate::system::{ActorSystem, SystemInner};

/// # Context
///
/// Owned by a single cell and only ever touched from that cell's task, so none of
/// its fields need locking. The system is reached through a weak pointer; a
/// context never keeps its system alive.
pub struct Context {
    self_ref: ActorRef,
    sender: Option<ActorRef>,
    children: HashMap<String, ActorRef>,
    watching: HashMap<ActorPath, ActorRef>,
    system: Weak<SystemInner>,
}

impl Context {
    pub(crate) fn new(self_ref: ActorRef, system: Weak<SystemInner>) -> Self {
        Self {
            self_ref,
            sender: None,
            children: HashMap::new(),
            watching: HashMap::new(),
            system,
        }
    }

    pub fn self_ref(&self) -> &ActorRef {
        &self.self_ref
    }

    pub fn path(&self) -> &ActorPath {
        self.self_ref.path()
    }

    /// Sender of the message currently being handled.
    ///
    /// `None` outside `on_receive`, and for messages sent without a sender.
    pub fn sender(&self) -> Option<&ActorRef> {
        self.sender.as_ref()
    }

    pub(crate) fn set_sender(&mut self, sender: Option<ActorRef>) {
        self.sender = sender;
    }

    pub(crate) fn clear_sender(&mut self) {
        self.sender = None;
    }

    /// The system this actor belongs to.
    pub fn system(&self) -> Result<ActorSystem, ActorError> {
        self.inner().map(ActorSystem::from_inner)
    }

    fn inner(&self) -> Result<Arc<SystemInner>, ActorError> {
        self.system.upgrade().ok_or(ActorError::NotRunning)
    }

    /// Answer the current sender, with this actor as the reply's sender.
    ///
    /// ## Returns
    ///
    /// * `Ok(true)` - The reply was handed to the sender
    /// * `Ok(false)` - The current message has no sender
    /// * `Err(ActorError)` - The sender's mailbox closed while sending
    pub fn reply<M: Any + Send>(&self, message: M) -> Result<bool, ActorError> {
        match &self.sender {
            Some(sender) => {
                sender.tell(message, Some(&self.self_ref))?;
                Ok(true)
            }
            None => {
                debug!(path = %self.path(), "no sender to reply to");
                Ok(false)
            }
        }
    }

    /// `tell` with this actor as the sender.
    pub fn tell<M: Any + Send>(&self, target: &ActorRef, message: M) -> Result<(), ActorError> {
        target.tell(message, Some(&self.self_ref))
    }

    /// Create a child at `{self}/{name}`.
    ///
    /// A name is generated when `name` is `None`. The child is registered with the
    /// system like any other actor and is stopped before this actor's `on_stop`.
    pub async fn spawn_child<A: Actor>(
        &mut self,
        name: Option<&str>,
        actor: A,
    ) -> Result<ActorRef, ActorError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("${}", crate::id::ActorId::generate().short()),
        };
        if self.children.get(&name).is_some_and(ActorRef::is_valid) {
            return Err(ActorError::DuplicatePath(self.path().child(&name)?));
        }

        let path = self.path().child(&name)?;
        let inner = self.inner()?;
        inner.ensure_running()?;
        let child = inner.create_actor_at(path, RefKind::Actor, actor).await?;
        debug!(parent = %self.path(), child = %child.path(), "spawned child");
        self.children.insert(name, child.clone());
        Ok(child)
    }

    /// Stop a child and forget it. Refs that are not tracked children are ignored.
    pub async fn stop_child(&mut self, child: &ActorRef) -> Result<(), ActorError> {
        let tracked = self
            .children
            .get(child.name())
            .is_some_and(|tracked| tracked == child);
        if !tracked {
            warn!(parent = %self.path(), child = %child.path(), "stop_child called with an actor that is not a child");
            return Ok(());
        }

        self.children.remove(child.name());
        let inner = self.inner()?;
        inner.stop_registered(child).await;
        Ok(())
    }

    /// Ask the system to stop this actor once the loop gets to it.
    ///
    /// Messages already queued are still processed.
    pub fn stop_self(&self) -> Result<(), ActorError> {
        self.inner()?.request_stop(&self.self_ref)
    }

    /// Receive a [`Terminated`] notice when `target` terminates.
    ///
    /// Watching an actor that has already terminated delivers the notice right away.
    pub fn watch(&mut self, target: &ActorRef) -> Result<(), ActorError> {
        match target.kind() {
            RefKind::Temporary => {
                return Err(ActorError::Unsupported(format!(
                    "cannot watch response sink {}",
                    target.path()
                )))
            }
            RefKind::Actor | RefKind::DeadLetters => {}
        }
        if *target == self.self_ref {
            return Ok(());
        }

        let inner = self.inner()?;
        inner.add_watcher(target, &self.self_ref);
        self.watching.insert(target.path().clone(), target.clone());

        // The termination event may have been handled before we registered.
        if !target.is_valid() && inner.remove_watcher(target, &self.self_ref) {
            self.self_ref.tell(
                Terminated {
                    actor: target.clone(),
                },
                None,
            )?;
        }
        Ok(())
    }

    pub fn unwatch(&mut self, target: &ActorRef) {
        if self.watching.remove(target.path()).is_none() {
            return;
        }
        if let Ok(inner) = self.inner() {
            inner.remove_watcher(target, &self.self_ref);
        }
    }

    pub fn is_watching(&self, target: &ActorRef) -> bool {
        self.watching.get(target.path()) == Some(target)
    }

    /// Tracked children that have not terminated.
    pub fn children(&self) -> Vec<ActorRef> {
        let mut children: Vec<ActorRef> = self
            .children
            .values()
            .filter(|child| child.is_valid())
            .cloned()
            .collect();
        children.sort_by(|a, b| a.path().cmp(b.path()));
        children
    }

    pub fn child(&self, name: &str) -> Option<&ActorRef> {
        self.children.get(name).filter(|child| child.is_valid())
    }

    /// Called by the cell before each message reaches `on_receive`.
    pub(crate) fn observe(&mut self, message: &Message) {
        let Some(notice) = message.downcast_ref::<Terminated>() else {
            return;
        };
        if self.watching.get(notice.path()) == Some(&notice.actor) {
            self.watching.remove(notice.path());
        }
        if self.children.get(notice.actor.name()) == Some(&notice.actor) {
            self.children.remove(notice.actor.name());
        }
    }

    /// Stop every tracked child in parallel.
    pub(crate) async fn stop_children(&mut self) {
        let children: Vec<ActorRef> = self.children.drain().map(|(_, child)| child).collect();
        if children.is_empty() {
            return;
        }
        let Ok(inner) = self.inner() else {
            return;
        };
        debug!(parent = %self.path(), count = children.len(), "stopping children");
        join_all(children.iter().map(|child| inner.stop_registered(child))).await;
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("self_ref", &self.self_ref)
            .field("sender", &self.sender)
            .field("children", &self.children.len())
            .field("watching", &self.watching.len())
            .finish()
    }
}
