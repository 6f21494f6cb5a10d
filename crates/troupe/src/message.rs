//! Message payloads and the envelopes that carry them through mailboxes.

use crate::actor::ActorRef;
use crate::path::ActorPath;
use std::any::{Any, TypeId};
use std::fmt;

/// A dynamically typed message payload.
///
/// The runtime never looks inside a message; actors recover the concrete type
/// with [`Message::downcast`] or [`Message::downcast_ref`].
pub struct Message {
    payload: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Message {
    /// Wrap a value. Wrapping a `Message` returns it unchanged.
    pub fn new<M: Any + Send>(payload: M) -> Self {
        let boxed: Box<dyn Any + Send> = Box::new(payload);
        match boxed.downcast::<Message>() {
            Ok(message) => *message,
            Err(payload) => Self {
                payload,
                type_name: std::any::type_name::<M>(),
            },
        }
    }

    pub fn is<M: Any>(&self) -> bool {
        self.payload.is::<M>()
    }

    pub fn downcast_ref<M: Any>(&self) -> Option<&M> {
        self.payload.downcast_ref::<M>()
    }

    /// Take the payload out as `M`, handing the message back on mismatch.
    pub fn downcast<M: Any>(self) -> Result<M, Message> {
        let type_name = self.type_name;
        match self.payload.downcast::<M>() {
            Ok(payload) => Ok(*payload),
            Err(payload) => Err(Self { payload, type_name }),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn payload_type_id(&self) -> TypeId {
        Any::type_id(&*self.payload)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.type_name)
            .finish()
    }
}

/// A message together with the ref that sent it, if any.
#[derive(Debug)]
pub struct Envelope {
    pub message: Message,
    pub sender: Option<ActorRef>,
}

impl Envelope {
    pub fn new(message: Message, sender: Option<ActorRef>) -> Self {
        Self { message, sender }
    }
}

/// Delivered to a watcher when an actor it watches has terminated.
#[derive(Debug, Clone)]
pub struct Terminated {
    pub actor: ActorRef,
}

impl Terminated {
    pub fn path(&self) -> &ActorPath {
        self.actor.path()
    }
}

/// What the dead-letter actor receives for a message that could not be delivered.
#[derive(Debug)]
pub struct DeadLetter {
    pub message: Message,
    pub sender: Option<ActorRef>,
    pub recipient: ActorPath,
}
