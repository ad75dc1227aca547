// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for token resolutions.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	exchanges: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the total number of token resolutions requested.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh exchanges sent to the token endpoint.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Ordering::Relaxed)
	}

	/// Returns the number of successful resolutions (including cache reuses).
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed resolutions.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_exchange(&self) {
		self.exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}
}
