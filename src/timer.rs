//! One-shot/repeating wakeups for election timeout, heartbeat tick, and
//! leader step-down (spec.md §4.1).
//!
//! The teacher crate keeps this kind of thing in an unseen `sync` module;
//! the asyncio original (`pyraft.timer.Timer`) schedules a callback via
//! `loop.call_later` and re-arms itself from inside the callback. This is
//! the same shape built on `tokio::time::sleep` plus a cancellation
//! channel standing in for `asyncio`'s cancellable handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Re-arms itself after every fire until `stop()` drops its cancellation
/// sender. Calling `start()` on an already-running timer is undefined per
/// spec.md §4.1; callers never do it.
pub struct Timer {
	interval: Duration,
	callback: Arc<dyn Fn() + Send + Sync + 'static>,
	handle: Option<JoinHandle<()>>,
	cancel: Option<oneshot::Sender<()>>,
}

impl Timer {
	pub fn new<F>(interval: Duration, callback: F) -> Self
	where
		F: Fn() + Send + Sync + 'static,
	{
		Timer {
			interval,
			callback: Arc::new(callback),
			handle: None,
			cancel: None,
		}
	}

	/// Schedules the first fire at `now + interval`.
	pub fn start(&mut self) {
		let (cancel_tx, mut cancel_rx) = oneshot::channel();
		let interval = self.interval;
		let callback = self.callback.clone();

		let handle = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = tokio::time::sleep(interval) => {
						callback();
					}
					_ = &mut cancel_rx => {
						return;
					}
				}
			}
		});

		self.handle = Some(handle);
		self.cancel = Some(cancel_tx);
	}

	/// Cancels any pending fire. Safe to call on a timer that never fired.
	pub fn stop(&mut self) {
		if let Some(cancel) = self.cancel.take() {
			// The receiving task may already have exited (e.g. it fired
			// and the send loses the race); a failed send just means
			// there was nothing left to cancel.
			let _ = cancel.send(());
		}
		if let Some(handle) = self.handle.take() {
			handle.abort();
		}
	}

	/// Equivalent to `stop(); start()`.
	pub fn reset(&mut self) {
		self.stop();
		self.start();
	}
}

impl Drop for Timer {
	fn drop(&mut self) {
		self.stop();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[tokio::test]
	async fn fires_repeatedly_until_stopped() {
		let count = Arc::new(AtomicUsize::new(0));
		let count2 = count.clone();
		let mut timer = Timer::new(Duration::from_millis(10), move || {
			count2.fetch_add(1, Ordering::SeqCst);
		});
		timer.start();
		tokio::time::sleep(Duration::from_millis(55)).await;
		timer.stop();
		let seen = count.load(Ordering::SeqCst);
		assert!(seen >= 3, "expected several fires, saw {}", seen);

		tokio::time::sleep(Duration::from_millis(30)).await;
		assert_eq!(count.load(Ordering::SeqCst), seen, "timer fired after stop()");
	}

	#[tokio::test]
	async fn reset_postpones_the_next_fire() {
		let count = Arc::new(AtomicUsize::new(0));
		let count2 = count.clone();
		let mut timer = Timer::new(Duration::from_millis(30), move || {
			count2.fetch_add(1, Ordering::SeqCst);
		});
		timer.start();
		for _ in 0..4 {
			tokio::time::sleep(Duration::from_millis(10)).await;
			timer.reset();
		}
		assert_eq!(count.load(Ordering::SeqCst), 0);
		timer.stop();
	}
}
