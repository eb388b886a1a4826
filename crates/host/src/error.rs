use becoming_behavior::HandlerError;
use thiserror::Error;

/// Error returned when a message exchange with an activation fails.
#[derive(Debug, Error)]
pub enum AskError {
	/// The activation's mailbox is closed.
	#[error("activation mailbox closed")]
	Closed,

	/// The mailbox is at capacity and a non-waiting send was used.
	#[error("activation mailbox full")]
	Full,

	/// The activation ended before replying.
	#[error("activation ended before replying")]
	Dropped,

	/// The behavior answered with an error. Fatal errors also deactivated the
	/// instance that produced them.
	#[error(transparent)]
	Handler(#[from] HandlerError),
}

impl AskError {
	/// Returns true when the failed exchange tore the activation down.
	pub fn deactivated(&self) -> bool {
		matches!(self, Self::Handler(err) if err.is_fatal())
	}
}
