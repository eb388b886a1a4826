//! Error types for building state machines and running behaviors.

use std::sync::Arc;

use thiserror::Error;

use crate::storage::StorageError;

/// Boxed error returned by user handler code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while declaring a state tree. No partial tree is usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
	/// A super-state or substate name was declared twice.
	#[error("state `{0}` is already declared")]
	DuplicateState(String),

	/// The configured initial state is not a declared substate.
	#[error("initial state `{0}` is not a declared substate")]
	UnknownState(String),

	/// A substate references a trait that was never registered.
	#[error("substate `{state}` references unknown trait `{name}`")]
	UnknownTrait { state: String, name: String },

	/// A substate references a decorator that was never registered.
	#[error("substate `{state}` references unknown decorator `{name}`")]
	UnknownDecorator { state: String, name: String },

	/// A substate was declared before any super-state was opened.
	#[error("substate `{0}` is declared outside of any super-state")]
	OrphanSubstate(String),

	#[error("trait `{0}` is already registered")]
	DuplicateTrait(String),

	#[error("decorator `{0}` is already registered")]
	DuplicateDecorator(String),
}

/// A state name that does not resolve to a declared substate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown state `{0}`")]
pub struct UnknownState(pub String);

/// Why a transition did not complete.
#[derive(Debug, Error)]
pub enum TransitionCause {
	#[error("target is not a declared substate")]
	UnknownState,

	/// Transitions do not nest and run at most once per dispatch.
	#[error("a transition already ran during this dispatch")]
	AlreadyTransitioned,

	/// The substate being left failed on `Unbecome`.
	#[error("exit failed: {0}")]
	Exit(#[source] HandlerError),

	/// The target substate's decorated handler failed on `Become`.
	#[error("enter failed: {0}")]
	Enter(#[source] HandlerError),
}

/// A failed transition. The current-substate pointer was left untouched.
///
/// Callers hosting the behavior must treat this as fatal for the actor
/// instance: tear it down and resume from the last persisted state.
#[derive(Debug, Clone, Error)]
#[error("transition `{from}` -> `{to}` failed: {cause}")]
pub struct TransitionFailure {
	pub from: String,
	pub to: String,
	/// Shared between the copy a handler sees and the dispatch result.
	#[source]
	pub cause: Arc<TransitionCause>,
}

impl TransitionFailure {
	pub(crate) fn new(from: impl Into<String>, to: impl Into<String>, cause: TransitionCause) -> Self {
		Self {
			from: from.into(),
			to: to.into(),
			cause: Arc::new(cause),
		}
	}
}

/// Error returned from a handler or from [`Behavior::dispatch`](crate::Behavior::dispatch).
#[derive(Debug, Error)]
pub enum HandlerError {
	/// A transition failed. Fatal for the actor instance.
	#[error(transparent)]
	Transition(Box<TransitionFailure>),

	#[error("storage: {0}")]
	Storage(#[from] StorageError),

	/// Handler-specific failure.
	#[error("{0}")]
	Failed(BoxError),
}

impl HandlerError {
	/// Wraps an arbitrary handler failure.
	pub fn other(err: impl Into<BoxError>) -> Self {
		Self::Failed(err.into())
	}

	/// Returns true when the actor instance must be deactivated.
	pub fn is_fatal(&self) -> bool {
		matches!(self, Self::Transition(_))
	}

	pub fn transition_failure(&self) -> Option<&TransitionFailure> {
		match self {
			Self::Transition(failure) => Some(failure),
			_ => None,
		}
	}
}

impl From<TransitionFailure> for HandlerError {
	fn from(failure: TransitionFailure) -> Self {
		Self::Transition(Box::new(failure))
	}
}

/// Errors raised while activating a behavior from durable storage.
#[derive(Debug, Error)]
pub enum ActivationError {
	#[error("reading persisted state: {0}")]
	Storage(#[from] StorageError),

	#[error("persisted state is not in the tree: {0}")]
	UnknownState(#[from] UnknownState),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_transition_failures_are_fatal() {
		let failure = TransitionFailure::new("Initial", "Preparing", TransitionCause::AlreadyTransitioned);
		let err = HandlerError::from(failure);
		assert!(err.is_fatal());
		assert_eq!(err.transition_failure().map(|f| f.to.as_str()), Some("Preparing"));

		assert!(!HandlerError::other("disk on fire").is_fatal());
		assert!(!HandlerError::Storage(StorageError::Unavailable("down".into())).is_fatal());
	}

	#[test]
	fn failure_message_names_both_ends() {
		let failure = TransitionFailure::new("Copying", "Nowhere", TransitionCause::UnknownState);
		assert_eq!(failure.to_string(), "transition `Copying` -> `Nowhere` failed: target is not a declared substate");
	}
}
