//! The actor behind `/system/deadLetters`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::actor::{Actor, Context};
use crate::message::{DeadLetter, Message};

/// Logs everything it receives. Never fails and never replies.
pub(crate) struct DeadLetterActor {
    received: Arc<AtomicU64>,
}

impl DeadLetterActor {
    pub(crate) fn new(received: Arc<AtomicU64>) -> Self {
        Self { received }
    }
}

impl Actor for DeadLetterActor {
    async fn on_receive(&mut self, message: Message, ctx: &mut Context) -> anyhow::Result<()> {
        self.received.fetch_add(1, Ordering::Relaxed);

        match message.downcast::<DeadLetter>() {
            Ok(letter) => info!(
                recipient = %letter.recipient,
                sender = ?letter.sender.as_ref().map(|s| s.path().to_string()),
                message_type = letter.message.type_name(),
                "dead letter"
            ),
            Err(message) => info!(
                sender = ?ctx.sender().map(|s| s.path().to_string()),
                message_type = message.type_name(),
                "message sent to dead letters"
            ),
        }
        Ok(())
    }
}
