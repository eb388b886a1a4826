use std::fmt;

/// Binds an actor's state type to the payloads it receives and the values it
/// replies with.
///
/// The actor value itself is owned by its [`Behavior`](crate::Behavior) and is
/// reachable from handlers through [`Context`](crate::Context).
pub trait Actor: Send + 'static {
	type Message: Send + Sync + 'static;
	type Reply: Send + 'static;
}

/// Message delivered to a substate handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<M> {
	/// Transition request, delivered to the target substate once it is current.
	Become,
	/// Delivered to the substate being left, before any supervision hook runs.
	Unbecome,
	/// Opaque payload from the dispatch caller.
	User(M),
}

impl<M> Message<M> {
	pub fn is_become(&self) -> bool {
		matches!(self, Self::Become)
	}

	pub fn is_unbecome(&self) -> bool {
		matches!(self, Self::Unbecome)
	}

	/// Returns the user payload, if any.
	pub fn user(&self) -> Option<&M> {
		match self {
			Self::User(msg) => Some(msg),
			_ => None,
		}
	}

	pub(crate) fn kind(&self) -> &'static str {
		match self {
			Self::Become => "become",
			Self::Unbecome => "unbecome",
			Self::User(_) => "user",
		}
	}
}

impl<M> From<M> for Message<M> {
	fn from(msg: M) -> Self {
		Self::User(msg)
	}
}

/// Outcome of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<R> {
	/// The message was recognized; nothing to return.
	Done,
	/// No handler in the chain recognized the message. Not an error.
	Unhandled,
	/// The message was recognized and produced a value.
	Value(R),
}

impl<R> Reply<R> {
	pub fn is_handled(&self) -> bool {
		!matches!(self, Self::Unhandled)
	}

	pub fn into_value(self) -> Option<R> {
		match self {
			Self::Value(value) => Some(value),
			_ => None,
		}
	}
}

impl<R> fmt::Display for Reply<R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Done => f.write_str("done"),
			Self::Unhandled => f.write_str("unhandled"),
			Self::Value(_) => f.write_str("value"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_unhandled_is_unhandled() {
		assert!(Reply::<()>::Done.is_handled());
		assert!(Reply::Value(3).is_handled());
		assert!(!Reply::<()>::Unhandled.is_handled());
		assert_eq!(Reply::Value(3).into_value(), Some(3));
		assert_eq!(Reply::<u8>::Done.into_value(), None);
	}

	#[test]
	fn user_payload_is_exposed() {
		let msg: Message<&str> = "start".into();
		assert_eq!(msg.user(), Some(&"start"));
		assert!(Message::<()>::Become.is_become());
		assert!(Message::<()>::Unbecome.user().is_none());
	}
}
