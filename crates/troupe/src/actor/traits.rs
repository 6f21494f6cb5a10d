//! The behavior trait implemented by every actor.

use std::future::Future;

use anyhow::Result;

use crate::actor::context::Context;
use crate::message::Message;

/// # Actor
///
/// A unit of behavior that processes its mailbox one message at a time.
///
/// All state lives in the implementing type; the runtime never shares it. The
/// hooks run on the actor's own processing task (except `on_start`, which runs
/// on the task that starts the actor), so they never overlap.
///
/// # Lifecycle
///
/// 1. `on_start` - before the first message; an error aborts the start
/// 2. `on_receive` - once per message, in mailbox order
/// 3. `on_restart` - after `on_receive` fails; an error terminates the actor
/// 4. `on_stop` - after the mailbox has drained on a graceful stop
///
/// # Example
///
/// ```rust
/// use troupe::{Actor, Context, Message};
///
/// struct Counter {
///     value: u64,
/// }
///
/// struct Increment;
/// struct GetValue;
///
/// impl Actor for Counter {
///     async fn on_receive(&mut self, message: Message, ctx: &mut Context) -> anyhow::Result<()> {
///         if message.is::<Increment>() {
///             self.value += 1;
///         } else if message.is::<GetValue>() {
///             ctx.reply(self.value)?;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Actor: Send + 'static {
    /// Called once before any message is processed.
    fn on_start(&mut self, _ctx: &mut Context) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    /// Handle a single message.
    fn on_receive(
        &mut self,
        message: Message,
        ctx: &mut Context,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Called after the mailbox drained during a graceful stop. Errors are logged only.
    fn on_stop(&mut self, _ctx: &mut Context) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }

    /// Recovery hook for a failed `on_receive`.
    ///
    /// Returning `Ok` keeps the actor processing; returning `Err` terminates it.
    /// Default: recover and continue.
    fn on_restart(
        &mut self,
        _error: anyhow::Error,
        _ctx: &mut Context,
    ) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}
