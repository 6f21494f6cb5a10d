//! # Actors
//!
//! Everything needed to define an actor and talk to it: the [`Actor`] trait, the
//! [`ActorRef`] handle, the per-actor [`Context`] and the error type.
//!
//! Cells and response sinks are internal; callers only ever hold refs.

pub(crate) mod cell;
pub mod context;
pub mod handle;
pub(crate) mod promise;
pub mod traits;
pub mod types;

// Public re-exports
pub use context::Context;
pub use handle::ActorRef;
pub use handle::RefKind;
pub use traits::Actor;
pub use types::ActorError;
pub use types::{DEFAULT_ASK_TIMEOUT, DEFAULT_TERMINATE_TIMEOUT};
