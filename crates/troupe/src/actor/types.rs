//! # Actor Types
//!
//! Error type and shared constants used throughout the actor system.

use crate::path::ActorPath;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;
use tokio::time::Duration;

/// Default timeout for `ask` when the caller does not pass one
pub const DEFAULT_ASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for `ActorSystem::terminate`
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// # ActorError
///
/// Represents errors that can occur when creating, addressing or stopping actors.
///
/// Failures raised by behavior code itself (`on_receive`, `on_restart`) never reach
/// the sender; they are handled inside the cell and only logged. The variants
/// below are what callers of the public API observe.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorError {
    /// An empty or malformed path or name was passed to a public operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Another live actor is already registered at this path
    #[error("An actor is already registered at {0}")]
    DuplicatePath(ActorPath),

    /// The system has not been started, or has been stopped or terminated
    #[error("Actor system is not running")]
    NotRunning,

    /// The target actor has terminated
    #[error("Actor {0} has terminated")]
    Undeliverable(ActorPath),

    /// A deadline passed before the operation completed
    #[error("Timed out waiting on {target} after {elapsed:?}")]
    Timeout { target: String, elapsed: Duration },

    /// The mailbox was closed while the message was being sent
    #[error("Mailbox of {0} is closed")]
    Cancelled(ActorPath),

    /// The target does not support this kind of interaction
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A reply arrived with a different payload type than the one awaited
    #[error("Type mismatch: expected {expected}, got {found}")]
    TypeMismatch { expected: String, found: String },

    /// `on_start` returned an error
    #[error("Actor {path} failed to start: {reason}")]
    StartFailed { path: ActorPath, reason: String },

    /// The response sink went away without a reply
    #[error("Response channel closed")]
    ChannelClosed,
}
