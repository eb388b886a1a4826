use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

/// Monotonic generation clock; one generation per activation.
#[derive(Debug, Default, Clone)]
pub(crate) struct GenerationClock {
	next: Arc<AtomicU64>,
}

impl GenerationClock {
	/// Creates a new generation clock starting at generation 1.
	pub fn new() -> Self {
		Self::default()
	}

	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}

/// Generation-scoped cancellation token for one activation.
#[derive(Debug, Clone)]
pub(crate) struct GenerationToken {
	generation: u64,
	cancel: CancellationToken,
}

impl GenerationToken {
	pub fn new(generation: u64, cancel: CancellationToken) -> Self {
		Self { generation, cancel }
	}

	pub const fn generation(&self) -> u64 {
		self.generation
	}

	pub async fn cancelled(&self) {
		self.cancel.cancelled().await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generations_start_at_one_and_increase() {
		let clock = GenerationClock::new();
		let shared = clock.clone();
		assert_eq!(clock.next(), 1);
		assert_eq!(shared.next(), 2);
		assert_eq!(clock.next(), 3);
	}

	#[tokio::test]
	async fn token_reports_parent_cancellation() {
		let parent = CancellationToken::new();
		let token = GenerationToken::new(7, parent.child_token());
		assert_eq!(token.generation(), 7);
		parent.cancel();
		token.cancelled().await;
	}
}
