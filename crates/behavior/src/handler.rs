use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::behavior::Context;
use crate::error::HandlerError;
use crate::message::{Actor, Message, Reply};

/// Boxed future returned by function handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of one handler invocation.
pub type HandlerResult<A> = Result<Reply<<A as Actor>::Reply>, HandlerError>;

/// Shared, type-erased message handler.
pub type Receive<A> = Arc<dyn Handler<A>>;

/// Message handler for one substate, trait, or decorator layer.
#[async_trait]
pub trait Handler<A: Actor>: Send + Sync + 'static {
	async fn receive(&self, cx: &mut Context<A>, msg: &Message<A::Message>) -> HandlerResult<A>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<A, F> Handler<A> for FnHandler<F>
where
	A: Actor,
	F: for<'a> Fn(&'a mut Context<A>, &'a Message<A::Message>) -> BoxFuture<'a, HandlerResult<A>> + Send + Sync + 'static,
{
	async fn receive(&self, cx: &mut Context<A>, msg: &Message<A::Message>) -> HandlerResult<A> {
		(self.0)(cx, msg).await
	}
}

/// Wraps a handler function.
///
/// ```ignore
/// fn idle<'a>(cx: &'a mut Context<Door>, msg: &'a Message<Cmd>) -> BoxFuture<'a, HandlerResult<Door>> {
/// 	Box::pin(async move {
/// 		match msg {
/// 			Message::User(Cmd::Open) => {
/// 				cx.transition("Open").await?;
/// 				Ok(Reply::Done)
/// 			}
/// 			_ => Ok(Reply::Unhandled),
/// 		}
/// 	})
/// }
///
/// let idle = receive(idle);
/// ```
pub fn receive<A, F>(f: F) -> Receive<A>
where
	A: Actor,
	F: for<'a> Fn(&'a mut Context<A>, &'a Message<A::Message>) -> BoxFuture<'a, HandlerResult<A>> + Send + Sync + 'static,
{
	Arc::new(FnHandler(f))
}

/// Trait handlers tried in declared order, then the substate's own handler.
///
/// The first handler returning anything but [`Reply::Unhandled`] wins. There
/// is no fallback to the super-state.
pub(crate) struct Chain<A: Actor> {
	pub(crate) traits: Vec<Receive<A>>,
	pub(crate) own: Receive<A>,
}

#[async_trait]
impl<A: Actor> Handler<A> for Chain<A> {
	async fn receive(&self, cx: &mut Context<A>, msg: &Message<A::Message>) -> HandlerResult<A> {
		for handler in &self.traits {
			let reply = handler.receive(cx, msg).await?;
			if reply.is_handled() {
				return Ok(reply);
			}
		}
		self.own.receive(cx, msg).await
	}
}
