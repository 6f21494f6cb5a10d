//! One-shot response sink backing `ActorRef::ask`.

use std::any::{Any, TypeId};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use crate::actor::handle::{Delivery, RefKind, RefTarget};
use crate::actor::types::ActorError;
use crate::id::ActorId;
use crate::message::{Envelope, Message};
use crate::path::ActorPath;

type Reply = Result<Message, ActorError>;

/// An ephemeral ref that accepts a single reply and then becomes invalid.
pub(crate) struct PromiseRef {
    id: ActorId,
    path: ActorPath,
    expected: TypeId,
    expected_name: &'static str,
    reply_tx: Mutex<Option<oneshot::Sender<Reply>>>,
}

impl PromiseRef {
    /// A sink that resolves with a reply of type `R`.
    pub(crate) fn expecting<R: Any>() -> (Arc<Self>, oneshot::Receiver<Reply>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let id = ActorId::generate();
        let sink = Self {
            id,
            path: ActorPath::temporary(&format!("ask-{}", id.short())),
            expected: TypeId::of::<R>(),
            expected_name: std::any::type_name::<R>(),
            reply_tx: Mutex::new(Some(reply_tx)),
        };
        (Arc::new(sink), reply_rx)
    }

    /// Resolve the waiter with `error` unless a reply already won.
    pub(crate) fn fail(&self, error: ActorError) {
        if let Some(reply_tx) = self.take() {
            let _ = reply_tx.send(Err(error));
        }
    }

    /// Give up on the reply; anything arriving later is dropped.
    pub(crate) fn abandon(&self) {
        self.take();
    }

    fn take(&self) -> Option<oneshot::Sender<Reply>> {
        self.reply_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl RefTarget for PromiseRef {
    fn id(&self) -> ActorId {
        self.id
    }

    fn path(&self) -> &ActorPath {
        &self.path
    }

    fn kind(&self) -> RefKind {
        RefKind::Temporary
    }

    fn is_valid(&self) -> bool {
        self.reply_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|reply_tx| !reply_tx.is_closed())
    }

    fn deliver(&self, envelope: Envelope) -> Result<Delivery, ActorError> {
        let Some(reply_tx) = self.take() else {
            debug!(path = %self.path, message_type = envelope.message.type_name(), "dropping reply to a completed ask");
            return Ok(Delivery::Dropped);
        };

        let reply = if envelope.message.payload_type_id() == self.expected {
            Ok(envelope.message)
        } else {
            Err(ActorError::TypeMismatch {
                expected: self.expected_name.to_string(),
                found: envelope.message.type_name().to_string(),
            })
        };

        if reply_tx.send(reply).is_err() {
            debug!(path = %self.path, "ask caller went away before the reply arrived");
        }
        Ok(Delivery::Enqueued)
    }

    fn reject(&self, error: ActorError) {
        self.fail(error);
    }
}
