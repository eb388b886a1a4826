use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use becoming_behavior::{
	Actor, BoxFuture, BuildError, Context, Durable, HandlerError, HandlerResult, Message, Persistent, Reply, StateMachine, StateMachineBuilder,
	StateStorage, Substate, Supervisor, receive,
};

const BROTLI_BUFFER: usize = 4096;
const BROTLI_QUALITY: u32 = 9;
const BROTLI_WINDOW: u32 = 22;

/// Commands understood by a copier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
	Start,
	Suspend,
	Continue,
	Cancel,
	Reset,
}

/// One file-copy job.
pub struct Copier {
	id: String,
	work_dir: PathBuf,
	lines: usize,
	storage: Arc<dyn StateStorage>,
	crossings: Arc<AtomicUsize>,
}

impl Copier {
	pub fn new(id: impl Into<String>, work_dir: impl Into<PathBuf>, storage: Arc<dyn StateStorage>) -> Self {
		Self {
			id: id.into(),
			work_dir: work_dir.into(),
			lines: 50_000,
			storage,
			crossings: Arc::new(AtomicUsize::new(0)),
		}
	}

	#[must_use]
	pub fn lines(mut self, lines: usize) -> Self {
		self.lines = lines;
		self
	}

	/// Shares a super-state crossing counter across actor values.
	#[must_use]
	pub fn crossings(mut self, crossings: Arc<AtomicUsize>) -> Self {
		self.crossings = crossings;
		self
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn source_path(&self) -> PathBuf {
		self.work_dir.join(format!("{}.txt", self.id))
	}

	pub fn copy_path(&self) -> PathBuf {
		self.work_dir.join(format!("{}-copy.txt", self.id))
	}

	pub fn archive_path(&self) -> PathBuf {
		self.work_dir.join(format!("{}.txt.br", self.id))
	}

	async fn prepare(&self) -> std::io::Result<()> {
		tokio::fs::create_dir_all(&self.work_dir).await?;
		remove_if_present(&self.copy_path()).await?;
		remove_if_present(&self.archive_path()).await?;

		let lines = self.lines;
		let contents = tokio::task::spawn_blocking(move || {
			let mut contents = String::new();
			for line in 0..lines {
				contents.push_str(&line.to_string());
				contents.push('\n');
			}
			contents
		})
		.await
		.map_err(std::io::Error::other)?;
		tokio::fs::write(self.source_path(), contents).await
	}

	async fn copy(&self) -> std::io::Result<()> {
		tokio::fs::copy(self.source_path(), self.copy_path()).await?;
		Ok(())
	}

	async fn compress(&self) -> std::io::Result<()> {
		let raw = tokio::fs::read(self.copy_path()).await?;
		let packed = tokio::task::spawn_blocking(move || pack(&raw)).await.map_err(std::io::Error::other)??;
		tokio::fs::write(self.archive_path(), packed).await
	}

	async fn clean(&self) -> std::io::Result<()> {
		remove_if_present(&self.source_path()).await?;
		remove_if_present(&self.copy_path()).await
	}
}

impl Actor for Copier {
	type Message = Command;
	type Reply = ();
}

impl Persistent for Copier {
	fn storage(&self) -> Arc<dyn StateStorage> {
		Arc::clone(&self.storage)
	}
}

fn pack(raw: &[u8]) -> std::io::Result<Vec<u8>> {
	let mut writer = brotli::CompressorWriter::new(Vec::new(), BROTLI_BUFFER, BROTLI_QUALITY, BROTLI_WINDOW);
	writer.write_all(raw)?;
	writer.flush()?;
	Ok(writer.into_inner())
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
	match tokio::fs::remove_file(path).await {
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
		other => other,
	}
}

/// Logs and counts every crossing between `Active` and `Inactive`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Supervision;

#[async_trait]
impl Supervisor<Copier> for Supervision {
	async fn on_enter(&self, copier: &mut Copier, super_state: &str) {
		copier.crossings.fetch_add(1, Ordering::Relaxed);
		tracing::info!(copier = %copier.id, super_state, "copier.supervision.on");
	}

	async fn on_exit(&self, copier: &mut Copier, super_state: &str) {
		copier.crossings.fetch_add(1, Ordering::Relaxed);
		tracing::info!(copier = %copier.id, super_state, "copier.supervision.off");
	}
}

async fn advance(cx: &mut Context<Copier>, target: &str) -> HandlerResult<Copier> {
	cx.transition(target).await?;
	Ok(Reply::Done)
}

fn initial<'a>(cx: &'a mut Context<Copier>, msg: &'a Message<Command>) -> BoxFuture<'a, HandlerResult<Copier>> {
	Box::pin(async move {
		match msg {
			Message::User(Command::Start) => advance(cx, "Preparing").await,
			_ => Ok(Reply::Unhandled),
		}
	})
}

fn preparing<'a>(cx: &'a mut Context<Copier>, msg: &'a Message<Command>) -> BoxFuture<'a, HandlerResult<Copier>> {
	Box::pin(async move {
		match msg {
			Message::Become => {
				cx.actor().prepare().await.map_err(HandlerError::other)?;
				Ok(Reply::Done)
			}
			Message::User(Command::Continue) => advance(cx, "Copying").await,
			_ => Ok(Reply::Unhandled),
		}
	})
}

fn copying<'a>(cx: &'a mut Context<Copier>, msg: &'a Message<Command>) -> BoxFuture<'a, HandlerResult<Copier>> {
	Box::pin(async move {
		match msg {
			Message::Become => {
				cx.actor().copy().await.map_err(HandlerError::other)?;
				Ok(Reply::Done)
			}
			Message::User(Command::Continue) => advance(cx, "Compressing").await,
			_ => Ok(Reply::Unhandled),
		}
	})
}

fn compressing<'a>(cx: &'a mut Context<Copier>, msg: &'a Message<Command>) -> BoxFuture<'a, HandlerResult<Copier>> {
	Box::pin(async move {
		match msg {
			Message::Become => {
				cx.actor().compress().await.map_err(HandlerError::other)?;
				Ok(Reply::Done)
			}
			Message::User(Command::Continue) => advance(cx, "Cleaning").await,
			_ => Ok(Reply::Unhandled),
		}
	})
}

fn cleaning<'a>(cx: &'a mut Context<Copier>, msg: &'a Message<Command>) -> BoxFuture<'a, HandlerResult<Copier>> {
	Box::pin(async move {
		match msg {
			Message::Become => {
				cx.actor().clean().await.map_err(HandlerError::other)?;
				Ok(Reply::Done)
			}
			Message::User(Command::Continue) => advance(cx, "Completed").await,
			_ => Ok(Reply::Unhandled),
		}
	})
}

fn suspended<'a>(cx: &'a mut Context<Copier>, msg: &'a Message<Command>) -> BoxFuture<'a, HandlerResult<Copier>> {
	Box::pin(async move {
		match msg {
			Message::User(Command::Continue) => {
				// Resume the step that was suspended; it redoes its work on entry.
				let Some(resume) = cx.previous().map(str::to_string) else {
					return advance(cx, "Preparing").await;
				};
				advance(cx, &resume).await
			}
			_ => Ok(Reply::Unhandled),
		}
	})
}

fn finished<'a>(cx: &'a mut Context<Copier>, msg: &'a Message<Command>) -> BoxFuture<'a, HandlerResult<Copier>> {
	Box::pin(async move {
		match msg {
			Message::Become => {
				tracing::info!(copier = %cx.actor().id, state = %cx.current(), "copier.finished");
				Ok(Reply::Done)
			}
			_ => Ok(Reply::Unhandled),
		}
	})
}

fn cancellable<'a>(cx: &'a mut Context<Copier>, msg: &'a Message<Command>) -> BoxFuture<'a, HandlerResult<Copier>> {
	Box::pin(async move {
		match msg {
			Message::User(Command::Cancel) => advance(cx, "Canceled").await,
			_ => Ok(Reply::Unhandled),
		}
	})
}

fn suspendable<'a>(cx: &'a mut Context<Copier>, msg: &'a Message<Command>) -> BoxFuture<'a, HandlerResult<Copier>> {
	Box::pin(async move {
		match msg {
			Message::User(Command::Suspend) => advance(cx, "Suspended").await,
			_ => Ok(Reply::Unhandled),
		}
	})
}

fn resettable<'a>(cx: &'a mut Context<Copier>, msg: &'a Message<Command>) -> BoxFuture<'a, HandlerResult<Copier>> {
	Box::pin(async move {
		match msg {
			Message::User(Command::Reset) => advance(cx, "Preparing").await,
			_ => Ok(Reply::Unhandled),
		}
	})
}

/// Builds the copier state tree.
///
/// ```text
/// Active    Preparing, Copying, Compressing, Cleaning
/// Inactive  Initial, Suspended, Completed, Canceled
/// ```
pub fn machine() -> Result<StateMachine<Copier>, BuildError> {
	let mut b = StateMachineBuilder::new("Initial");
	b.add_trait("cancellable", receive(cancellable))?
		.add_trait("suspendable", receive(suspendable))?
		.add_trait("resettable", receive(resettable))?
		.add_decorator("durable", Durable)?
		.super_state("Active", Supervision)?
		.substate(Substate::new("Preparing", receive(preparing)).traits(["suspendable"]).decorators(["durable"]))?
		.substate(
			Substate::new("Copying", receive(copying))
				.traits(["cancellable", "suspendable"])
				.decorators(["durable"]),
		)?
		.substate(
			Substate::new("Compressing", receive(compressing))
				.traits(["cancellable", "suspendable"])
				.decorators(["durable"]),
		)?
		.substate(Substate::new("Cleaning", receive(cleaning)).traits(["suspendable"]).decorators(["durable"]))?
		.super_state("Inactive", Supervision)?
		.substate(Substate::new("Initial", receive(initial)))?
		.substate(Substate::new("Suspended", receive(suspended)).decorators(["durable"]))?
		.substate(Substate::new("Completed", receive(finished)).traits(["resettable"]).decorators(["durable"]))?
		.substate(Substate::new("Canceled", receive(finished)).traits(["resettable"]).decorators(["durable"]))?;
	b.build()
}
