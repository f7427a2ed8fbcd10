// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing refresh activity of one token manager.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	reused: AtomicU64,
}
impl RefreshMetrics {
	/// Number of refresh exchanges sent to the token endpoint.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Number of exchanges that produced a new credential.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Number of exchanges that failed.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Number of callers that waited on an in-flight refresh and reused its result.
	pub fn reused(&self) -> u64 {
		self.reused.load(Ordering::Relaxed)
	}

	/// Point-in-time copy of every counter.
	pub fn snapshot(&self) -> RefreshCounts {
		RefreshCounts {
			attempts: self.attempts(),
			successes: self.successes(),
			failures: self.failures(),
			reused: self.reused(),
		}
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_reuse(&self) {
		self.reused.fetch_add(1, Ordering::Relaxed);
	}
}

/// Plain copy of [`RefreshMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshCounts {
	/// Exchanges sent.
	pub attempts: u64,
	/// Exchanges that succeeded.
	pub successes: u64,
	/// Exchanges that failed.
	pub failures: u64,
	/// Callers served by another caller's refresh.
	pub reused: u64,
}
