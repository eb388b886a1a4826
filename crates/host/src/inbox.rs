//! Per-activation message queue.
//!
//! The handle owns the [`Outbox`]; successive generations share the
//! [`Inbox`] and hold it one at a time, so delivery stays serialized across
//! restarts. Closing is requested from the sending side and applied by
//! whichever generation currently holds the inbox: queued envelopes are still
//! delivered, new ones are refused.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::AskError;

pub(crate) fn channel<T>(capacity: usize) -> (Outbox<T>, Inbox<T>) {
	let (tx, rx) = mpsc::channel(capacity);
	let closing = CancellationToken::new();
	(
		Outbox {
			tx,
			closing: closing.clone(),
		},
		Inbox {
			rx: Arc::new(Mutex::new(rx)),
			closing,
		},
	)
}

pub(crate) struct Outbox<T> {
	tx: mpsc::Sender<T>,
	closing: CancellationToken,
}

impl<T> Outbox<T> {
	/// Enqueues, waiting for capacity when full.
	pub async fn send(&self, item: T) -> Result<(), AskError> {
		if self.closing.is_cancelled() {
			return Err(AskError::Closed);
		}
		self.tx.send(item).await.map_err(|_| AskError::Closed)
	}

	pub fn try_send(&self, item: T) -> Result<(), AskError> {
		if self.closing.is_cancelled() {
			return Err(AskError::Closed);
		}
		self.tx.try_send(item).map_err(|err| match err {
			TrySendError::Full(_) => AskError::Full,
			TrySendError::Closed(_) => AskError::Closed,
		})
	}

	/// Refuses further sends. Already queued envelopes are still delivered.
	pub fn close(&self) {
		self.closing.cancel();
	}
}

pub(crate) struct Inbox<T> {
	rx: Arc<Mutex<mpsc::Receiver<T>>>,
	closing: CancellationToken,
}

impl<T> Clone for Inbox<T> {
	fn clone(&self) -> Self {
		Self {
			rx: Arc::clone(&self.rx),
			closing: self.closing.clone(),
		}
	}
}

impl<T> Inbox<T> {
	/// Takes the inbox for one generation. Waits while a previous holder is
	/// still around.
	pub async fn hold(&self) -> HeldInbox<T> {
		HeldInbox {
			rx: Arc::clone(&self.rx).lock_owned().await,
			closing: self.closing.clone(),
		}
	}

	/// Closes for good and drops everything still queued, failing the
	/// pending asks. Returns how many envelopes were dropped.
	pub async fn discard(&self) -> usize {
		self.closing.cancel();
		let mut rx = self.rx.lock().await;
		rx.close();
		let mut dropped = 0;
		while rx.recv().await.is_some() {
			dropped += 1;
		}
		dropped
	}
}

pub(crate) struct HeldInbox<T> {
	rx: OwnedMutexGuard<mpsc::Receiver<T>>,
	closing: CancellationToken,
}

impl<T> HeldInbox<T> {
	/// Next envelope in FIFO order. `None` once closed and drained.
	///
	/// Cancel safe.
	pub async fn recv(&mut self) -> Option<T> {
		loop {
			tokio::select! {
				biased;
				_ = self.closing.cancelled(), if !self.rx.is_closed() => self.rx.close(),
				item = self.rx.recv() => return item,
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use pretty_assertions::assert_eq;

	use super::*;

	#[tokio::test]
	async fn delivers_in_order_then_drains_after_close() {
		let (tx, inbox) = channel(4);
		for i in 1..=3u32 {
			tx.send(i).await.unwrap();
		}
		tx.close();
		assert!(matches!(tx.send(4).await, Err(AskError::Closed)));

		let mut held = inbox.hold().await;
		let mut seen = Vec::new();
		while let Some(i) = held.recv().await {
			seen.push(i);
		}
		assert_eq!(seen, vec![1, 2, 3]);
	}

	#[tokio::test]
	async fn full_queue_refuses_non_waiting_sends_and_backs_off_waiting_ones() {
		let (tx, inbox) = channel(1);
		tx.try_send(1u32).unwrap();
		assert!(matches!(tx.try_send(2), Err(AskError::Full)));

		let blocked = tokio::time::timeout(Duration::from_millis(20), tx.send(2)).await;
		assert!(blocked.is_err());

		let mut held = inbox.hold().await;
		assert_eq!(held.recv().await, Some(1));
		tx.send(2).await.unwrap();
		assert_eq!(held.recv().await, Some(2));
	}

	#[tokio::test]
	async fn next_holder_continues_where_the_last_one_stopped() {
		let (tx, inbox) = channel(4);
		for i in 1..=3u32 {
			tx.send(i).await.unwrap();
		}

		let mut first = inbox.hold().await;
		assert_eq!(first.recv().await, Some(1));

		let next = inbox.clone();
		let waiting = tokio::spawn(async move {
			let mut second = next.hold().await;
			(second.recv().await, second.recv().await)
		});
		tokio::task::yield_now().await;
		assert!(!waiting.is_finished());

		drop(first);
		assert_eq!(waiting.await.unwrap(), (Some(2), Some(3)));
	}

	#[tokio::test]
	async fn discard_drops_queued_items_and_refuses_new_ones() {
		let (tx, inbox) = channel(4);
		tx.send(1u32).await.unwrap();
		tx.send(2).await.unwrap();

		assert_eq!(inbox.discard().await, 2);
		assert!(matches!(tx.try_send(3), Err(AskError::Closed)));
	}
}
