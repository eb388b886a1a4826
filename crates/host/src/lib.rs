//! Activation host for behavior-driven actors.
//!
//! The host is the collaborator a [`Behavior`](becoming_behavior::Behavior)
//! relies on: it delivers messages one at a time through a FIFO queue,
//! activates each generation from durable storage, and tears a generation down
//! when a transition fails so the next one resumes from the last persisted
//! state.

mod activation;
mod error;
mod inbox;
mod token;

pub use activation::{
	ActivationEvent, ActivationExit, ActivationExitKind, ActivationHandle, ActivationSpec, RestartPolicy, ShutdownMode, ShutdownReport, spawn_activation,
};
pub use error::AskError;
