//! # Troupe
//!
//! Troupe is an in-process actor runtime. Actors are independent units of behavior
//! that share nothing and communicate only through asynchronous messages; each one
//! processes its mailbox one message at a time on its own tokio task.
//!
//! ## Core Features
//!
//! * **Mailboxes**: Unbounded FIFO queues, one consumer per actor
//! * **Request/Response**: `ask` with a per-call deadline on top of plain `tell`
//! * **Lifecycle**: Start, graceful drain-then-stop, forced cancellation
//! * **Failure Recovery**: A single `on_restart` attempt per handler failure
//! * **Supervision Hooks**: Children, `watch`/`unwatch` and termination notices
//!
//! ## Architecture
//!
//! * `ActorSystem`: Creates actors, tracks them by path and drives shutdown
//! * `ActorRef`: The handle used to address an actor
//! * `Context`: What an actor sees while it runs
//! * `Actor`: The trait user code implements
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use troupe::{Actor, ActorSystem, Context, Message, SystemConfig};
//!
//! struct Echo;
//!
//! impl Actor for Echo {
//!     async fn on_receive(&mut self, message: Message, ctx: &mut Context) -> anyhow::Result<()> {
//!         if let Some(text) = message.downcast_ref::<String>() {
//!             ctx.reply(text.clone())?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let system = ActorSystem::new(SystemConfig::default());
//! system.start().await?;
//!
//! let echo = system.spawn("echo", Echo).await?;
//! let reply: String = echo.ask("hello".to_string()).await?;
//! assert_eq!(reply, "hello");
//!
//! system.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod config;
pub(crate) mod dead_letters;
pub mod id;
pub mod logging;
pub mod message;
pub mod path;
pub mod system;

pub use actor::{Actor, ActorError, ActorRef, Context, RefKind};
pub use config::{LoggingConfig, SystemConfig, UndeliverablePolicy};
pub use id::ActorId;
pub use logging::init_logging;
pub use message::{DeadLetter, Envelope, Message, Terminated};
pub use path::ActorPath;
pub use system::{ActorInfo, ActorSystem, SystemState};
