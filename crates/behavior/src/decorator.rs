//! Handler decorators.
//!
//! A decorator wraps a substate's composed handler at build time. Decorators
//! listed as `[d1, d2]` produce `d1(d2(handler))`: `d1` observes the message
//! first and the result last.

use std::sync::Arc;

use async_trait::async_trait;

use crate::behavior::Context;
use crate::handler::{Handler, HandlerResult, Receive};
use crate::message::{Actor, Message};
use crate::storage::StateStorage;

/// Wraps a handler into another handler.
pub trait Decorator<A: Actor>: Send + Sync + 'static {
	fn decorate(&self, next: Receive<A>) -> Receive<A>;
}

impl<A, F> Decorator<A> for F
where
	A: Actor,
	F: Fn(Receive<A>) -> Receive<A> + Send + Sync + 'static,
{
	fn decorate(&self, next: Receive<A>) -> Receive<A> {
		self(next)
	}
}

/// Actor with durable storage for its `{current, previous}` pair.
pub trait Persistent: Actor {
	fn storage(&self) -> Arc<dyn StateStorage>;
}

/// Persists `{current, previous}` after every completed `Become`.
///
/// The write happens after the wrapped handler returns, so it reflects the
/// post-transition pointer, and it completes before the transition does.
/// Messages other than `Become` pass through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct Durable;

impl<A: Persistent> Decorator<A> for Durable {
	fn decorate(&self, next: Receive<A>) -> Receive<A> {
		Arc::new(DurableHandler { next })
	}
}

struct DurableHandler<A: Actor> {
	next: Receive<A>,
}

#[async_trait]
impl<A: Persistent> Handler<A> for DurableHandler<A> {
	async fn receive(&self, cx: &mut Context<A>, msg: &Message<A::Message>) -> HandlerResult<A> {
		let reply = self.next.receive(cx, msg).await?;
		if msg.is_become() {
			let snapshot = cx.snapshot();
			let storage = cx.actor().storage();
			storage.write_state(&snapshot).await?;
			tracing::debug!(current = %snapshot.current, previous = ?snapshot.previous, "behavior.persisted");
		}
		Ok(reply)
	}
}

/// Traces every message a substate receives and the outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct Traced;

impl<A: Actor> Decorator<A> for Traced {
	fn decorate(&self, next: Receive<A>) -> Receive<A> {
		Arc::new(TracedHandler { next })
	}
}

struct TracedHandler<A: Actor> {
	next: Receive<A>,
}

#[async_trait]
impl<A: Actor> Handler<A> for TracedHandler<A> {
	async fn receive(&self, cx: &mut Context<A>, msg: &Message<A::Message>) -> HandlerResult<A> {
		let state = cx.current().to_string();
		let result = self.next.receive(cx, msg).await;
		match &result {
			Ok(reply) => tracing::trace!(state = %state, kind = msg.kind(), reply = %reply, "behavior.receive"),
			Err(err) => tracing::trace!(state = %state, kind = msg.kind(), error = %err, "behavior.receive"),
		}
		result
	}
}
