//! Copier binary.
//!
//! Hosts one copier and feeds it the commands given on the command line.
//! State is kept in the state directory, so running the binary again with
//! the same `--id` picks up where the last run stopped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use becoming_behavior::{JsonFileStorage, Reply, StateStorage};
use becoming_copier::{Command, Config, Copier, machine};
use becoming_host::{ActivationEvent, ActivationSpec, spawn_activation};
use clap::{Parser, ValueEnum};
use tracing::info;
// Library-only dependencies.
use {async_trait as _, brotli as _, serde as _, thiserror as _, toml as _};

/// Copier command line arguments.
#[derive(Parser, Debug)]
#[command(name = "becoming-copier")]
#[command(about = "Durable file-copy workflow")]
struct Args {
	/// TOML configuration file
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Directory holding persisted copier state
	#[arg(long, value_name = "DIR")]
	state_dir: Option<PathBuf>,

	/// Directory receiving source, copy and archive files
	#[arg(long, value_name = "DIR")]
	work_dir: Option<PathBuf>,

	/// Copier identity; names its state document and files
	#[arg(long, default_value = "copier")]
	id: String,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,

	/// Commands to deliver, in order
	#[arg(value_enum, default_value = "run")]
	commands: Vec<Cli>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Cli {
	Start,
	Suspend,
	Continue,
	Cancel,
	Reset,
	/// Start, then continue through every step
	Run,
}

impl Cli {
	fn expand(self) -> &'static [Command] {
		match self {
			Self::Start => &[Command::Start],
			Self::Suspend => &[Command::Suspend],
			Self::Continue => &[Command::Continue],
			Self::Cancel => &[Command::Cancel],
			Self::Reset => &[Command::Reset],
			Self::Run => &[Command::Start, Command::Continue, Command::Continue, Command::Continue, Command::Continue],
		}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let mut config = match &args.config {
		Some(path) => Config::load(path)?,
		None => Config::default(),
	};
	if let Some(dir) = args.state_dir {
		config.state_dir = dir;
	}
	if let Some(dir) = args.work_dir {
		config.work_dir = dir;
	}

	info!(
		id = %args.id,
		state_dir = %config.state_dir.display(),
		work_dir = %config.work_dir.display(),
		"starting becoming-copier"
	);

	let storage: Arc<dyn StateStorage> = Arc::new(JsonFileStorage::in_dir(&config.state_dir, &args.id));
	let factory = {
		let id = args.id.clone();
		let work_dir = config.work_dir.clone();
		let lines = config.lines;
		move || Copier::new(id.clone(), work_dir.clone(), storage.clone()).lines(lines)
	};
	let spec = ActivationSpec::new(args.id.clone(), machine().context("building copier state tree")?, factory)
		.mailbox_capacity(config.mailbox_capacity)
		.restart(config.restart.policy());
	let handle = spawn_activation(spec);

	let mut events = handle.subscribe();
	let reporter = tokio::spawn(async move {
		while let Ok(event) = events.recv().await {
			match event {
				ActivationEvent::Activated { generation, state } => info!(generation, %state, "activated"),
				ActivationEvent::Transitioned { from, to, .. } => info!(%from, %to, "transitioned"),
				ActivationEvent::Deactivated { generation, exit } => info!(generation, kind = ?exit.kind(), "deactivated"),
			}
		}
	});

	for command in args.commands.iter().flat_map(|cli| cli.expand()) {
		match handle.ask(*command).await {
			Ok(Reply::Unhandled) => {
				let state = handle.current_state().await;
				tracing::warn!(?command, ?state, "command not understood in current state");
			}
			Ok(_) => {}
			Err(err) if err.deactivated() => {
				tracing::error!(?command, error = %err, "step failed; copier will resume from its last saved state");
			}
			Err(err) => return Err(err).with_context(|| format!("delivering {command:?}")),
		}
	}

	let state = handle.current_state().await;
	let report = handle.shutdown_graceful_or_force(Duration::from_secs(5)).await;
	drop(handle);
	let _ = reporter.await;

	info!(state = ?state, exit = ?report.last_exit().map(|exit| exit.kind()), "copier stopped");
	Ok(())
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_env("BECOMING_LOG")
		.or_else(|_| EnvFilter::try_from_default_env())
		.unwrap_or_else(|_| {
			if verbose {
				EnvFilter::new("becoming_copier=trace,becoming_behavior=debug,becoming_host=debug,info")
			} else {
				EnvFilter::new("info")
			}
		});

	tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}
