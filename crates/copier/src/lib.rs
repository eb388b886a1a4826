//! File-copy workflow modeled as a durable two-level behavior.
//!
//! A copier walks `Preparing → Copying → Compressing → Cleaning → Completed`
//! one `Continue` at a time, doing each step's file work when the step is
//! entered. Every step is persisted, so a copier that is torn down mid-way
//! resumes where it was.

// Binary-only dependencies.
use anyhow as _;
use clap as _;
use tracing_subscriber as _;

pub mod config;
mod copier;

pub use config::{Config, ConfigError, RestartConfig};
pub use copier::{Command, Copier, Supervision, machine};
