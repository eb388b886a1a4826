use std::sync::Arc;
use std::time::Duration;

use becoming_behavior::{
	Actor, BoxFuture, Context, Durable, HandlerError, HandlerResult, MemoryStorage, Message, NoSupervision, PersistedState, Persistent, Reply, StateMachine,
	StateMachineBuilder, StateStorage, Substate, receive,
};
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cmd {
	Start,
	Stop,
	Ping,
	Explode,
	Fail,
	Nap(Duration),
	Refresh,
}

struct Counter {
	storage: MemoryStorage,
	pings: usize,
}

impl Actor for Counter {
	type Message = Cmd;
	type Reply = usize;
}

impl Persistent for Counter {
	fn storage(&self) -> Arc<dyn StateStorage> {
		Arc::new(self.storage.clone())
	}
}

fn idle<'a>(cx: &'a mut Context<Counter>, msg: &'a Message<Cmd>) -> BoxFuture<'a, HandlerResult<Counter>> {
	Box::pin(async move {
		match msg {
			Message::User(Cmd::Start) => {
				cx.transition("Running").await?;
				Ok(Reply::Done)
			}
			Message::Become | Message::Unbecome => Ok(Reply::Done),
			_ => Ok(Reply::Unhandled),
		}
	})
}

fn running<'a>(cx: &'a mut Context<Counter>, msg: &'a Message<Cmd>) -> BoxFuture<'a, HandlerResult<Counter>> {
	Box::pin(async move {
		match msg {
			Message::User(Cmd::Ping) => {
				cx.actor_mut().pings += 1;
				Ok(Reply::Value(cx.actor().pings))
			}
			Message::User(Cmd::Stop) => {
				cx.transition("Idle").await?;
				Ok(Reply::Done)
			}
			Message::User(Cmd::Explode) => {
				cx.transition("Faulty").await?;
				Ok(Reply::Done)
			}
			Message::User(Cmd::Fail) => Err(HandlerError::other("bad input")),
			Message::User(Cmd::Refresh) => {
				cx.transition("Running").await?;
				Ok(Reply::Done)
			}
			Message::User(Cmd::Nap(duration)) => {
				tokio::time::sleep(*duration).await;
				Ok(Reply::Done)
			}
			Message::Become | Message::Unbecome => Ok(Reply::Done),
			Message::User(Cmd::Start) => Ok(Reply::Unhandled),
		}
	})
}

fn faulty<'a>(_cx: &'a mut Context<Counter>, msg: &'a Message<Cmd>) -> BoxFuture<'a, HandlerResult<Counter>> {
	Box::pin(async move {
		match msg {
			Message::Become => Err(HandlerError::other("boiler exploded")),
			_ => Ok(Reply::Unhandled),
		}
	})
}

fn machine() -> StateMachine<Counter> {
	let mut b = StateMachineBuilder::new("Idle");
	b.add_decorator("durable", Durable)
		.unwrap()
		.super_state("Inactive", NoSupervision)
		.unwrap()
		.substate(Substate::new("Idle", receive(idle)).decorators(["durable"]))
		.unwrap()
		.super_state("Active", NoSupervision)
		.unwrap()
		.substate(Substate::new("Running", receive(running)).decorators(["durable"]))
		.unwrap()
		.substate(Substate::new("Faulty", receive(faulty)).decorators(["durable"]))
		.unwrap();
	b.build().unwrap()
}

fn spec(storage: &MemoryStorage) -> ActivationSpec<Counter> {
	let storage = storage.clone();
	ActivationSpec::new("counter", machine(), move || Counter {
		storage: storage.clone(),
		pings: 0,
	})
	.restart(RestartPolicy::OnFailure {
		max_restarts: 2,
		backoff: Duration::ZERO,
	})
}

async fn next_event(events: &mut broadcast::Receiver<ActivationEvent>) -> ActivationEvent {
	tokio::time::timeout(Duration::from_secs(2), events.recv())
		.await
		.expect("event within deadline")
		.expect("event channel open")
}

#[tokio::test]
async fn ask_replies_and_reports_transitions() {
	let storage = MemoryStorage::new();
	let handle = spawn_activation(spec(&storage));
	let mut events = handle.subscribe();

	assert!(matches!(handle.ask(Cmd::Start).await, Ok(Reply::Done)));
	assert!(matches!(handle.ask(Cmd::Ping).await, Ok(Reply::Value(1))));
	assert!(matches!(handle.ask(Cmd::Ping).await, Ok(Reply::Value(2))));

	assert_eq!(
		next_event(&mut events).await,
		ActivationEvent::Activated {
			generation: 1,
			state: "Idle".into()
		}
	);
	assert_eq!(
		next_event(&mut events).await,
		ActivationEvent::Transitioned {
			generation: 1,
			from: "Idle".into(),
			to: "Running".into()
		}
	);
	assert_eq!(handle.current_state().await.as_deref(), Some("Running"));
	assert_eq!(storage.state(), Some(PersistedState::new("Running", Some("Idle"))));
}

#[tokio::test]
async fn unhandled_and_failed_messages_keep_the_generation() {
	let storage = MemoryStorage::new();
	let handle = spawn_activation(spec(&storage));

	assert!(matches!(handle.ask(Cmd::Ping).await, Ok(Reply::Unhandled)));
	handle.ask(Cmd::Start).await.unwrap();

	let err = handle.ask(Cmd::Fail).await.unwrap_err();
	assert!(!err.deactivated());
	assert!(matches!(handle.ask(Cmd::Ping).await, Ok(Reply::Value(1))));
	assert_eq!(handle.generation(), 1);
	assert_eq!(handle.restart_count(), 0);
}

#[tokio::test]
async fn fatal_transition_reactivates_from_persisted_state() {
	let storage = MemoryStorage::new();
	let handle = spawn_activation(spec(&storage));
	let mut events = handle.subscribe();

	handle.ask(Cmd::Start).await.unwrap();
	handle.ask(Cmd::Ping).await.unwrap();

	let err = handle.ask(Cmd::Explode).await.unwrap_err();
	assert!(err.deactivated());

	let mut reactivated = None;
	while reactivated.is_none() {
		if let ActivationEvent::Activated { generation: 2, state } = next_event(&mut events).await {
			reactivated = Some(state);
		}
	}
	assert_eq!(reactivated.as_deref(), Some("Running"));
	assert_eq!(handle.restart_count(), 1);

	let exit = handle.last_exit().await.expect("first generation exit");
	assert_eq!(exit.kind(), ActivationExitKind::TransitionFailed);
	assert!(exit.message().is_some_and(|msg| msg.contains("Faulty")));

	// The fresh actor value starts counting again; the failed message is not replayed.
	assert!(matches!(handle.ask(Cmd::Ping).await, Ok(Reply::Value(1))));
	assert_eq!(storage.state(), Some(PersistedState::new("Running", Some("Idle"))));
}

#[tokio::test]
async fn never_policy_closes_the_activation_after_a_failure() {
	let storage = MemoryStorage::new();
	let handle = spawn_activation(spec(&storage).restart(RestartPolicy::Never));
	let mut events = handle.subscribe();

	handle.ask(Cmd::Start).await.unwrap();
	assert!(handle.ask(Cmd::Explode).await.unwrap_err().deactivated());

	loop {
		if let ActivationEvent::Deactivated { generation, exit } = next_event(&mut events).await {
			assert_eq!(generation, 1);
			assert_eq!(exit.kind(), ActivationExitKind::TransitionFailed);
			break;
		}
	}

	let report = handle.shutdown(ShutdownMode::Graceful { timeout: Duration::from_secs(2) }).await;
	assert!(report.completed());
	assert!(matches!(handle.ask(Cmd::Ping).await, Err(AskError::Closed)));
}

#[tokio::test]
async fn unresolvable_persisted_state_fails_activation() {
	let storage = MemoryStorage::with_state(PersistedState::new("Demolished", None));
	let handle = spawn_activation(spec(&storage));

	let report = handle.shutdown(ShutdownMode::Graceful { timeout: Duration::from_secs(2) }).await;
	assert!(report.completed());
	let exit = report.last_exit().expect("exit recorded");
	assert_eq!(exit.kind(), ActivationExitKind::ActivationFailed);
	assert_eq!(handle.restart_count(), 2);
}

#[tokio::test]
async fn graceful_shutdown_drains_queued_messages() {
	let storage = MemoryStorage::new();
	let handle = spawn_activation(spec(&storage));

	handle.tell(Cmd::Start).await.unwrap();
	handle.tell(Cmd::Ping).await.unwrap();
	handle.tell(Cmd::Stop).await.unwrap();

	let report = handle.shutdown(ShutdownMode::Graceful { timeout: Duration::from_secs(2) }).await;
	assert!(report.completed());
	assert!(!report.timed_out());
	assert_eq!(report.last_exit().map(ActivationExit::kind), Some(ActivationExitKind::MailboxClosed));
	assert_eq!(storage.state(), Some(PersistedState::new("Idle", Some("Running"))));
}

#[tokio::test]
async fn immediate_shutdown_preempts_a_running_handler() {
	let storage = MemoryStorage::new();
	let handle = spawn_activation(spec(&storage));
	handle.ask(Cmd::Start).await.unwrap();

	handle.tell(Cmd::Nap(Duration::from_secs(60))).await.unwrap();
	tokio::task::yield_now().await;

	let report = tokio::time::timeout(Duration::from_secs(2), handle.shutdown(ShutdownMode::Immediate))
		.await
		.expect("shutdown within deadline");
	assert!(report.completed());
	assert_eq!(report.last_exit().map(ActivationExit::kind), Some(ActivationExitKind::Cancelled));
}

#[tokio::test]
async fn graceful_timeout_falls_back_to_force() {
	let storage = MemoryStorage::new();
	let handle = spawn_activation(spec(&storage));
	handle.ask(Cmd::Start).await.unwrap();
	handle.tell(Cmd::Nap(Duration::from_secs(60))).await.unwrap();

	let report = handle.shutdown_graceful_or_force(Duration::from_millis(20)).await;
	assert!(report.completed());
	assert_eq!(report.last_exit().map(ActivationExit::kind), Some(ActivationExitKind::Cancelled));
}

#[tokio::test]
async fn cancel_rejects_later_sends() {
	let storage = MemoryStorage::new();
	let handle = spawn_activation(spec(&storage));
	handle.cancel();
	assert!(matches!(handle.tell(Cmd::Ping).await, Err(AskError::Closed)));
}

#[tokio::test]
async fn transition_into_the_same_substate_is_reported() {
	let storage = MemoryStorage::new();
	let handle = spawn_activation(spec(&storage));
	let mut events = handle.subscribe();

	handle.ask(Cmd::Start).await.unwrap();
	handle.ask(Cmd::Ping).await.unwrap();
	handle.ask(Cmd::Refresh).await.unwrap();

	let transitions: Vec<_> = [
		next_event(&mut events).await,
		next_event(&mut events).await,
		next_event(&mut events).await,
	]
	.into_iter()
	.filter_map(|event| match event {
		ActivationEvent::Transitioned { from, to, .. } => Some((from, to)),
		_ => None,
	})
	.collect();
	assert_eq!(
		transitions,
		vec![("Idle".to_string(), "Running".to_string()), ("Running".to_string(), "Running".to_string())]
	);
	assert_eq!(storage.state(), Some(PersistedState::new("Running", Some("Running"))));
}

#[tokio::test]
async fn try_tell_refuses_when_the_queue_is_full() {
	let storage = MemoryStorage::new();
	let handle = spawn_activation(spec(&storage).mailbox_capacity(1));

	handle.try_tell(Cmd::Ping).unwrap();
	assert!(matches!(handle.try_tell(Cmd::Ping), Err(AskError::Full)));
}
