use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use becoming_behavior::{Actor, Behavior, HandlerResult, Persistent, Reply, StateMachine};
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::AskError;
use crate::inbox::{self, Inbox, Outbox};
use crate::token::{GenerationClock, GenerationToken};

#[cfg(test)]
mod tests;

/// Opaque exit classification for public consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ActivationExitKind {
	MailboxClosed,
	Cancelled,
	/// Reading persisted state or resuming from it failed.
	ActivationFailed,
	/// A transition failed; the instance was torn down.
	TransitionFailed,
	Panicked,
	JoinFailed,
}

/// Exit summary of one activation generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationExit {
	kind: ActivationExitKind,
	message: Option<String>,
}

impl ActivationExit {
	pub fn kind(&self) -> ActivationExitKind {
		self.kind
	}

	pub fn message(&self) -> Option<&str> {
		self.message.as_deref()
	}

	pub fn is_failure(&self) -> bool {
		matches!(
			self.kind,
			ActivationExitKind::ActivationFailed | ActivationExitKind::TransitionFailed | ActivationExitKind::Panicked | ActivationExitKind::JoinFailed
		)
	}
}

impl ActivationExit {
	fn from_reason(reason: &ExitReason) -> Self {
		let (kind, message) = match reason {
			ExitReason::MailboxClosed => (ActivationExitKind::MailboxClosed, None),
			ExitReason::Cancelled => (ActivationExitKind::Cancelled, None),
			ExitReason::ActivationFailed(msg) => (ActivationExitKind::ActivationFailed, Some(msg.clone())),
			ExitReason::TransitionFailed(msg) => (ActivationExitKind::TransitionFailed, Some(msg.clone())),
			ExitReason::Panicked => (ActivationExitKind::Panicked, None),
			ExitReason::JoinFailed(msg) => (ActivationExitKind::JoinFailed, Some(msg.clone())),
		};
		Self { kind, message }
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExitReason {
	MailboxClosed,
	Cancelled,
	ActivationFailed(String),
	TransitionFailed(String),
	Panicked,
	JoinFailed(String),
}

impl ExitReason {
	fn is_failure(&self) -> bool {
		matches!(self, Self::ActivationFailed(_) | Self::TransitionFailed(_) | Self::Panicked | Self::JoinFailed(_))
	}
}

/// Whether a torn-down activation is brought back.
#[derive(Debug, Clone)]
pub enum RestartPolicy {
	Never,
	/// Reactivate after a failure, resuming from the last persisted state.
	/// The failed message is not redelivered.
	OnFailure { max_restarts: usize, backoff: Duration },
}

impl RestartPolicy {
	fn restart_delay(&self, reason: &ExitReason, restart_count: usize) -> Option<Duration> {
		match self {
			Self::Never => None,
			Self::OnFailure { max_restarts, backoff } => (reason.is_failure() && restart_count < *max_restarts).then_some(*backoff),
		}
	}
}

impl Default for RestartPolicy {
	fn default() -> Self {
		Self::OnFailure {
			max_restarts: 3,
			backoff: Duration::from_millis(50),
		}
	}
}

#[derive(Debug, Clone, Copy)]
pub enum ShutdownMode {
	/// Cancel the in-flight message and stop.
	Immediate,
	/// Close the mailbox, let queued messages drain, force after `timeout`.
	Graceful { timeout: Duration },
}

#[derive(Debug, Clone)]
pub struct ShutdownReport {
	completed: bool,
	timed_out: bool,
	last_exit: Option<ActivationExit>,
}

impl ShutdownReport {
	pub fn completed(&self) -> bool {
		self.completed
	}

	pub fn timed_out(&self) -> bool {
		self.timed_out
	}

	pub fn last_exit(&self) -> Option<&ActivationExit> {
		self.last_exit.as_ref()
	}
}

/// Lifecycle notifications broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationEvent {
	/// A generation resumed at `state`.
	Activated { generation: u64, state: String },
	/// A dispatch moved the current substate.
	Transitioned { generation: u64, from: String, to: String },
	/// A generation ended.
	Deactivated { generation: u64, exit: ActivationExit },
}

/// Declaration of one hosted actor.
pub struct ActivationSpec<A: Persistent> {
	name: String,
	machine: StateMachine<A>,
	factory: Arc<dyn Fn() -> A + Send + Sync>,
	mailbox_capacity: usize,
	restart: RestartPolicy,
	event_buffer: usize,
}

impl<A: Persistent> ActivationSpec<A> {
	/// `factory` builds a fresh actor value for every generation; persisted
	/// state is read through the actor's storage.
	pub fn new(name: impl Into<String>, machine: StateMachine<A>, factory: impl Fn() -> A + Send + Sync + 'static) -> Self {
		Self {
			name: name.into(),
			machine,
			factory: Arc::new(factory),
			mailbox_capacity: 128,
			restart: RestartPolicy::default(),
			event_buffer: 128,
		}
	}

	/// # Panics
	///
	/// Panics if `capacity` is zero.
	#[must_use]
	pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
		assert!(capacity > 0, "mailbox capacity must be > 0");
		self.mailbox_capacity = capacity;
		self
	}

	#[must_use]
	pub fn restart(mut self, restart: RestartPolicy) -> Self {
		self.restart = restart;
		self
	}

	/// # Panics
	///
	/// Panics if `size` is zero.
	#[must_use]
	pub fn event_buffer(mut self, size: usize) -> Self {
		assert!(size > 0, "event buffer size must be > 0");
		self.event_buffer = size;
		self
	}
}

struct Envelope<A: Actor> {
	msg: A::Message,
	reply: Option<oneshot::Sender<HandlerResult<A>>>,
}

struct ActivationState {
	generation: AtomicU64,
	restarts: AtomicUsize,
	last_exit: Mutex<Option<ExitReason>>,
	current: Mutex<Option<String>>,
}

/// Handle to one hosted actor. Dropping it cancels the activation.
pub struct ActivationHandle<A: Actor> {
	name: String,
	outbox: Outbox<Envelope<A>>,
	events: broadcast::Sender<ActivationEvent>,
	cancel: CancellationToken,
	state: Arc<ActivationState>,
	/// Cancelled once the supervisor task is gone, however it ended.
	stopped: CancellationToken,
}

impl<A: Actor> Drop for ActivationHandle<A> {
	fn drop(&mut self) {
		self.cancel.cancel();
		self.outbox.close();
	}
}

impl<A: Actor> ActivationHandle<A> {
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Current generation; starts at 1 and grows with every reactivation.
	pub fn generation(&self) -> u64 {
		self.state.generation.load(Ordering::Acquire)
	}

	pub fn restart_count(&self) -> usize {
		self.state.restarts.load(Ordering::Acquire)
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ActivationEvent> {
		self.events.subscribe()
	}

	/// Current substate as of the last completed dispatch.
	pub async fn current_state(&self) -> Option<String> {
		self.state.current.lock().await.clone()
	}

	/// Dispatches `msg` and waits for the behavior's reply.
	///
	/// A fatal reply means the instance that produced it was deactivated.
	pub async fn ask(&self, msg: A::Message) -> Result<Reply<A::Reply>, AskError> {
		let (reply, rx) = oneshot::channel();
		self.outbox.send(Envelope { msg, reply: Some(reply) }).await?;
		let result = rx.await.map_err(|_| AskError::Dropped)?;
		Ok(result?)
	}

	/// Enqueues `msg` without waiting for the reply, waiting for mailbox
	/// capacity if needed.
	pub async fn tell(&self, msg: A::Message) -> Result<(), AskError> {
		self.outbox.send(Envelope { msg, reply: None }).await?;
		Ok(())
	}

	/// Enqueues `msg` without waiting at all.
	pub fn try_tell(&self, msg: A::Message) -> Result<(), AskError> {
		self.outbox.try_send(Envelope { msg, reply: None })
	}

	/// Requests cancellation and closes the mailbox so later sends fail fast.
	pub fn cancel(&self) {
		self.cancel.cancel();
		self.outbox.close();
	}

	pub async fn last_exit(&self) -> Option<ActivationExit> {
		self.state.last_exit.lock().await.as_ref().map(ActivationExit::from_reason)
	}

	pub async fn shutdown(&self, mode: ShutdownMode) -> ShutdownReport {
		match mode {
			ShutdownMode::Immediate => {
				self.cancel.cancel();
				self.outbox.close();
				self.stopped.cancelled().await;
				ShutdownReport {
					completed: true,
					timed_out: false,
					last_exit: self.last_exit().await,
				}
			}
			ShutdownMode::Graceful { timeout } => {
				self.outbox.close();
				let completed = tokio::time::timeout(timeout, self.stopped.cancelled()).await.is_ok();
				if !completed {
					self.cancel.cancel();
				}
				ShutdownReport {
					completed,
					timed_out: !completed,
					last_exit: self.last_exit().await,
				}
			}
		}
	}

	/// Graceful first, immediate when the graceful deadline passes.
	pub async fn shutdown_graceful_or_force(&self, timeout: Duration) -> ShutdownReport {
		let report = self.shutdown(ShutdownMode::Graceful { timeout }).await;
		if report.timed_out() {
			tracing::warn!(activation = %self.name, "graceful shutdown timed out; forcing immediate");
			return self.shutdown(ShutdownMode::Immediate).await;
		}
		report
	}
}

/// Spawns a supervised activation.
///
/// Each generation reads persisted state, resumes the behavior and serves the
/// mailbox in FIFO order. A fatal dispatch result ends the generation; the
/// restart policy decides whether a new one is activated.
///
/// # Panics
///
/// Panics when called outside of a tokio runtime.
pub fn spawn_activation<A: Persistent>(spec: ActivationSpec<A>) -> ActivationHandle<A> {
	let (outbox, inbox) = inbox::channel(spec.mailbox_capacity);

	let (events, _) = broadcast::channel(spec.event_buffer);
	let cancel = CancellationToken::new();
	let state = Arc::new(ActivationState {
		generation: AtomicU64::new(0),
		restarts: AtomicUsize::new(0),
		last_exit: Mutex::new(None),
		current: Mutex::new(None),
	});

	let task_state = Arc::clone(&state);
	let task_cancel = cancel.clone();
	let task_events = events.clone();
	let task_name = spec.name.clone();
	let machine = spec.machine;
	let factory = spec.factory;
	let restart = spec.restart;
	let generation = GenerationClock::new();
	let stopped = CancellationToken::new();
	let task_stopped = stopped.clone();

	tokio::spawn(async move {
		let _stopped = task_stopped.drop_guard();
		let mut restart_count = 0usize;
		// Cancelled before each restart so nothing from the previous
		// generation outlives it.
		let mut gen_cancel = CancellationToken::new();
		loop {
			if task_cancel.is_cancelled() {
				gen_cancel.cancel();
				*task_state.last_exit.lock().await = Some(ExitReason::Cancelled);
				break;
			}

			gen_cancel.cancel();
			gen_cancel = task_cancel.child_token();

			let gen_id = generation.next();
			task_state.generation.store(gen_id, Ordering::Release);
			let token = GenerationToken::new(gen_id, gen_cancel.child_token());
			let actor = (factory)();
			tracing::trace!(activation = %task_name, generation = gen_id, "host.activation.spawn");
			let child = tokio::spawn(run_generation(
				actor,
				machine.clone(),
				inbox.clone(),
				task_events.clone(),
				Arc::clone(&task_state),
				token,
			));
			let reason = match child.await {
				Ok(reason) => reason,
				Err(err) if err.is_panic() => ExitReason::Panicked,
				Err(err) if err.is_cancelled() => ExitReason::Cancelled,
				Err(err) => ExitReason::JoinFailed(err.to_string()),
			};

			*task_state.last_exit.lock().await = Some(reason.clone());
			let _ = task_events.send(ActivationEvent::Deactivated {
				generation: gen_id,
				exit: ActivationExit::from_reason(&reason),
			});

			tracing::debug!(
				activation = %task_name,
				generation = gen_id,
				restarts = restart_count,
				reason = ?reason,
				"host.activation.exit"
			);

			if task_cancel.is_cancelled() {
				break;
			}

			let Some(backoff) = restart.restart_delay(&reason, restart_count) else {
				break;
			};

			restart_count = restart_count.wrapping_add(1);
			task_state.restarts.store(restart_count, Ordering::Release);
			if backoff > Duration::ZERO {
				tokio::select! {
					_ = task_cancel.cancelled() => break,
					_ = tokio::time::sleep(backoff) => {}
				}
			}
		}

		// Nobody will serve the queue again: fail queued and future asks.
		let dropped = inbox.discard().await;
		if dropped > 0 {
			tracing::debug!(activation = %task_name, dropped, "host.activation.discarded");
		}
	});

	ActivationHandle {
		name: spec.name,
		outbox,
		events,
		cancel,
		state,
		stopped,
	}
}

async fn run_generation<A: Persistent>(
	actor: A,
	machine: StateMachine<A>,
	inbox: Inbox<Envelope<A>>,
	events: broadcast::Sender<ActivationEvent>,
	shared: Arc<ActivationState>,
	token: GenerationToken,
) -> ExitReason {
	let generation = token.generation();
	let mut inbox = tokio::select! {
		biased;
		_ = token.cancelled() => return ExitReason::Cancelled,
		held = inbox.hold() => held,
	};

	let activated = tokio::select! {
		biased;
		_ = token.cancelled() => return ExitReason::Cancelled,
		res = Behavior::activate(machine, actor) => res,
	};
	let mut behavior = match activated {
		Ok(behavior) => behavior,
		Err(err) => return ExitReason::ActivationFailed(err.to_string()),
	};

	*shared.current.lock().await = Some(behavior.current().to_string());
	let _ = events.send(ActivationEvent::Activated {
		generation,
		state: behavior.current().to_string(),
	});
	tracing::debug!(generation, state = %behavior.current(), "host.activation.start");

	loop {
		let Envelope { msg, reply } = tokio::select! {
			biased;
			_ = token.cancelled() => break ExitReason::Cancelled,
			envelope = inbox.recv() => {
				let Some(envelope) = envelope else {
					break ExitReason::MailboxClosed;
				};
				envelope
			}
		};

		let from = behavior.current().to_string();
		let result = tokio::select! {
			biased;
			_ = token.cancelled() => break ExitReason::Cancelled,
			res = behavior.dispatch(msg) => res,
		};

		if behavior.transitioned() {
			let to = behavior.current().to_string();
			*shared.current.lock().await = Some(to.clone());
			let _ = events.send(ActivationEvent::Transitioned { generation, from, to });
		}

		let fatal = match &result {
			Err(err) if err.is_fatal() => Some(err.to_string()),
			_ => None,
		};
		match reply {
			Some(reply) => {
				let _ = reply.send(result);
			}
			None => {
				if let Err(err) = &result {
					tracing::warn!(generation, error = %err, "host.activation.tell_failed");
				}
			}
		}

		if let Some(err) = fatal {
			break ExitReason::TransitionFailed(err);
		}
	}
}
