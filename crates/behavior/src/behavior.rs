use crate::decorator::Persistent;
use crate::error::{ActivationError, TransitionCause, TransitionFailure, UnknownState};
use crate::handler::HandlerResult;
use crate::message::{Actor, Message, Reply};
use crate::storage::PersistedState;
use crate::tree::{StateId, StateMachine};

/// Handler-facing view of a running behavior: the actor value plus the
/// current-substate pointer.
pub struct Context<A: Actor> {
	actor: A,
	machine: StateMachine<A>,
	current: StateId,
	previous: Option<StateId>,
	/// Set once a transition starts during the current dispatch.
	transitioned: bool,
	/// Set once a transition completes during the current dispatch.
	completed: bool,
	/// Last transition failure of the current dispatch, surfaced by
	/// `dispatch` even when the handler discards it.
	failure: Option<TransitionFailure>,
}

impl<A: Actor> Context<A> {
	pub fn actor(&self) -> &A {
		&self.actor
	}

	pub fn actor_mut(&mut self) -> &mut A {
		&mut self.actor
	}

	pub fn machine(&self) -> &StateMachine<A> {
		&self.machine
	}

	/// Current substate name.
	pub fn current(&self) -> &str {
		&self.machine.substate(self.current).name
	}

	/// Substate that was current before the last completed transition.
	pub fn previous(&self) -> Option<&str> {
		self.previous.map(|id| self.machine.substate(id).name.as_str())
	}

	/// Super-state owning the current substate.
	pub fn super_state(&self) -> &str {
		&self.machine.super_state(self.machine.substate(self.current).super_state).name
	}

	/// `{current, previous}` as it would be persisted right now.
	pub fn snapshot(&self) -> PersistedState {
		PersistedState {
			current: self.current().to_string(),
			previous: self.previous().map(str::to_string),
		}
	}

	fn reset(&mut self) {
		self.transitioned = false;
		self.completed = false;
		self.failure = None;
	}

	/// Becomes `target`.
	///
	/// Runs the transition protocol: `Unbecome` to the current substate, the
	/// old super-state's exit hook on a crossing, the pointer update, the new
	/// super-state's enter hook, then `Become` through the target's decorated
	/// handler. On failure the pointer is restored before returning.
	///
	/// At most one transition runs per dispatch; a second request, including
	/// one issued while a transition is in progress, fails with
	/// [`TransitionCause::AlreadyTransitioned`].
	pub async fn transition(&mut self, target: &str) -> Result<(), TransitionFailure> {
		let result = self.try_transition(target).await;
		if let Err(failure) = &result {
			tracing::warn!(error = %failure, "behavior.transition.failed");
			self.failure = Some(failure.clone());
		}
		result
	}

	async fn try_transition(&mut self, target: &str) -> Result<(), TransitionFailure> {
		let from = self.current;
		let Some(to) = self.machine.resolve(target) else {
			return Err(TransitionFailure::new(self.current(), target, TransitionCause::UnknownState));
		};
		if self.transitioned {
			return Err(TransitionFailure::new(self.current(), target, TransitionCause::AlreadyTransitioned));
		}
		self.transitioned = true;

		let previous = self.previous;
		match self.run_transition(from, to).await {
			Ok(crossed) => {
				self.completed = true;
				tracing::debug!(from = %self.machine.substate(from).name, to = %target, crossed, "behavior.transition");
				Ok(())
			}
			Err(cause) => {
				self.current = from;
				self.previous = previous;
				Err(TransitionFailure::new(self.current(), target, cause))
			}
		}
	}

	async fn run_transition(&mut self, from: StateId, to: StateId) -> Result<bool, TransitionCause> {
		let machine = self.machine.clone();
		let source = machine.substate(from);
		let target = machine.substate(to);

		let unbecome = Message::Unbecome;
		source.handler.receive(self, &unbecome).await.map_err(TransitionCause::Exit)?;

		let crossed = source.super_state != target.super_state;
		if crossed {
			let old = machine.super_state(source.super_state);
			old.supervisor.on_exit(&mut self.actor, &old.name).await;
		}

		self.previous = Some(from);
		self.current = to;

		if crossed {
			let new = machine.super_state(target.super_state);
			new.supervisor.on_enter(&mut self.actor, &new.name).await;
		}

		let become_msg = Message::Become;
		target.handler.receive(self, &become_msg).await.map_err(TransitionCause::Enter)?;
		Ok(crossed)
	}
}

/// Runtime engine for one actor instance.
///
/// Owns the actor value and exactly one current substate at all times.
/// Dispatch is not reentrant: the hosting layer delivers one message at a
/// time.
pub struct Behavior<A: Actor> {
	cx: Context<A>,
}

impl<A: Actor> Behavior<A> {
	/// Creates a behavior positioned at the machine's initial substate.
	pub fn new(machine: StateMachine<A>, actor: A) -> Self {
		let current = machine.initial_id();
		Self {
			cx: Context {
				actor,
				machine,
				current,
				previous: None,
				transitioned: false,
				completed: false,
				failure: None,
			},
		}
	}

	/// Creates a behavior positioned at a persisted state, or at the initial
	/// substate when nothing was persisted.
	///
	/// A persisted `previous` that no longer resolves is dropped.
	pub fn resume(machine: StateMachine<A>, actor: A, persisted: Option<PersistedState>) -> Result<Self, UnknownState> {
		let mut behavior = Self::new(machine, actor);
		let Some(persisted) = persisted else {
			return Ok(behavior);
		};
		behavior.initialize(&persisted.current)?;
		if let Some(previous) = persisted.previous {
			match behavior.cx.machine.resolve(&previous) {
				Some(id) => behavior.cx.previous = Some(id),
				None => tracing::warn!(previous = %previous, "behavior.resume.unknown_previous"),
			}
		}
		Ok(behavior)
	}

	/// Reads the actor's storage and resumes from it.
	pub async fn activate(machine: StateMachine<A>, actor: A) -> Result<Self, ActivationError>
	where
		A: Persistent,
	{
		let storage = actor.storage();
		let persisted = storage.read_state().await?;
		let behavior = Self::resume(machine, actor, persisted)?;
		tracing::debug!(state = %behavior.current(), previous = ?behavior.previous(), "behavior.activated");
		Ok(behavior)
	}

	/// Sets the current substate without running hooks or decorators.
	pub fn initialize(&mut self, state: &str) -> Result<(), UnknownState> {
		let id = self.cx.machine.resolve(state).ok_or_else(|| UnknownState(state.to_string()))?;
		self.cx.current = id;
		self.cx.previous = None;
		Ok(())
	}

	/// Routes `msg` through the current substate's traits, then its own
	/// handler, wrapped in its decorators.
	///
	/// Returns [`Reply::Unhandled`] when nothing recognized the message; the
	/// current substate is unchanged in that case. A fatal error
	/// ([`HandlerError::is_fatal`](crate::HandlerError::is_fatal)) obliges the caller to discard this
	/// behavior.
	///
	/// A transition that failed during the dispatch is returned as a fatal
	/// error even when the handler discarded it.
	pub async fn dispatch(&mut self, msg: A::Message) -> HandlerResult<A> {
		self.cx.reset();
		let handler = self.cx.machine.substate(self.cx.current).handler.clone();
		let msg = Message::User(msg);
		let mut reply = handler.receive(&mut self.cx, &msg).await;
		if let Some(failure) = self.cx.failure.take()
			&& !matches!(&reply, Err(err) if err.is_fatal())
		{
			tracing::warn!(state = %self.current(), error = %failure, "behavior.transition.discarded");
			reply = Err(failure.into());
		}
		match &reply {
			Ok(Reply::Unhandled) => tracing::trace!(state = %self.current(), "behavior.unhandled"),
			Ok(_) => {}
			Err(err) if err.is_fatal() => tracing::warn!(state = %self.current(), error = %err, "behavior.dispatch.fatal"),
			Err(err) => tracing::debug!(state = %self.current(), error = %err, "behavior.dispatch.failed"),
		}
		reply
	}

	/// Becomes `target` outside of any handler.
	pub async fn transition(&mut self, target: &str) -> Result<(), TransitionFailure> {
		self.cx.reset();
		let result = self.cx.transition(target).await;
		self.cx.failure = None;
		result
	}

	/// Whether a transition completed during the last dispatch, including
	/// one into the substate that was already current.
	pub fn transitioned(&self) -> bool {
		self.cx.completed
	}

	pub fn current(&self) -> &str {
		self.cx.current()
	}

	pub fn previous(&self) -> Option<&str> {
		self.cx.previous()
	}

	pub fn super_state(&self) -> &str {
		self.cx.super_state()
	}

	pub fn snapshot(&self) -> PersistedState {
		self.cx.snapshot()
	}

	pub fn machine(&self) -> &StateMachine<A> {
		&self.cx.machine
	}

	pub fn actor(&self) -> &A {
		&self.cx.actor
	}

	pub fn actor_mut(&mut self) -> &mut A {
		&mut self.cx.actor
	}

	pub fn into_actor(self) -> A {
		self.cx.actor
	}
}
