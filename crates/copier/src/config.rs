//! Copier configuration loaded from TOML.
//!
//! ```toml
//! state-dir = "/var/lib/copier/state"
//! work-dir = "/var/lib/copier/work"
//! mailbox-capacity = 64
//! lines = 50000
//!
//! [restart]
//! policy = "on-failure"
//! max-restarts = 3
//! backoff-ms = 100
//! ```
//!
//! Every key is optional. Command line flags override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use becoming_host::RestartPolicy;
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error reading the configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// Error parsing TOML syntax or an unexpected key.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// A value parsed but is out of range.
	#[error("invalid value for {key}: {reason}")]
	Invalid { key: &'static str, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
	/// Where per-copier state documents live.
	pub state_dir: PathBuf,
	/// Where source, copy and archive files are produced.
	pub work_dir: PathBuf,
	pub mailbox_capacity: usize,
	/// Lines written to the generated source file.
	pub lines: usize,
	pub restart: RestartConfig,
}

impl Default for Config {
	fn default() -> Self {
		let root = std::env::temp_dir().join("becoming-copier");
		Self {
			state_dir: root.join("state"),
			work_dir: root,
			mailbox_capacity: 64,
			lines: 50_000,
			restart: RestartConfig::default(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum RestartConfig {
	Never,
	#[serde(rename_all = "kebab-case")]
	OnFailure { max_restarts: usize, backoff_ms: u64 },
}

impl Default for RestartConfig {
	fn default() -> Self {
		Self::OnFailure {
			max_restarts: 3,
			backoff_ms: 100,
		}
	}
}

impl RestartConfig {
	pub fn policy(&self) -> RestartPolicy {
		match *self {
			Self::Never => RestartPolicy::Never,
			Self::OnFailure { max_restarts, backoff_ms } => RestartPolicy::OnFailure {
				max_restarts,
				backoff: Duration::from_millis(backoff_ms),
			},
		}
	}
}

impl Config {
	pub fn parse(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let input = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::parse(&input)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.mailbox_capacity == 0 {
			return Err(ConfigError::Invalid {
				key: "mailbox-capacity",
				reason: "must be > 0",
			});
		}
		if self.lines == 0 {
			return Err(ConfigError::Invalid {
				key: "lines",
				reason: "must be > 0",
			});
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_file_yields_defaults() {
		assert_eq!(Config::parse("").unwrap(), Config::default());
	}

	#[test]
	fn parses_every_key() {
		let config = Config::parse(
			r#"
state-dir = "/srv/state"
work-dir = "/srv/work"
mailbox-capacity = 8
lines = 10

[restart]
policy = "on-failure"
max-restarts = 5
backoff-ms = 20
"#,
		)
		.unwrap();

		assert_eq!(config.state_dir, PathBuf::from("/srv/state"));
		assert_eq!(config.work_dir, PathBuf::from("/srv/work"));
		assert_eq!(config.mailbox_capacity, 8);
		assert_eq!(config.lines, 10);
		assert_eq!(
			config.restart,
			RestartConfig::OnFailure {
				max_restarts: 5,
				backoff_ms: 20
			}
		);
	}

	#[test]
	fn never_restart_policy() {
		let config = Config::parse("[restart]\npolicy = \"never\"\n").unwrap();
		assert!(matches!(config.restart.policy(), RestartPolicy::Never));
	}

	#[test]
	fn rejects_unknown_keys() {
		assert!(matches!(Config::parse("colour = \"blue\""), Err(ConfigError::Toml(_))));
	}

	#[test]
	fn rejects_zero_capacity() {
		let err = Config::parse("mailbox-capacity = 0").unwrap_err();
		assert!(matches!(err, ConfigError::Invalid { key: "mailbox-capacity", .. }));
	}

	#[test]
	fn load_reports_missing_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("absent.toml");
		assert!(matches!(Config::load(&path), Err(ConfigError::Io { .. })));
	}
}
