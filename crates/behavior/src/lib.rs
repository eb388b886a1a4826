//! Hierarchical behavior state machine for long-lived, message-driven actors.
//!
//! A [`StateMachine`] is declared once with [`StateMachineBuilder`]: top-level
//! super-states carry [`Supervisor`] hooks, substates carry the message
//! handlers. Reusable handler fragments (traits) and handler wrappers
//! ([`Decorator`]s) are registered by name and resolved at build time into one
//! composed handler per substate.
//!
//! A [`Behavior`] owns one actor value and the current-substate pointer.
//! [`Behavior::dispatch`] routes a message through the current substate's
//! composed handler; handlers change state with [`Context::transition`].

mod behavior;
mod builder;
pub mod decorator;
mod error;
mod handler;
mod message;
pub mod storage;
mod tree;

pub use behavior::{Behavior, Context};
pub use builder::{StateMachineBuilder, Substate};
pub use decorator::{Decorator, Durable, Persistent, Traced};
pub use error::{ActivationError, BoxError, BuildError, HandlerError, TransitionCause, TransitionFailure, UnknownState};
pub use handler::{BoxFuture, Handler, HandlerResult, Receive, receive};
pub use message::{Actor, Message, Reply};
pub use storage::{JsonFileStorage, MemoryStorage, PersistedState, StateStorage, StorageError};
pub use tree::{NoSupervision, StateMachine, Supervisor};
