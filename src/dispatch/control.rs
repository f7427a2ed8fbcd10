// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	error::{CancelReason, TransportError},
};

/// Overall deadline and cancellation signal for one logical operation.
///
/// Both abort backoff sleeps, limiter waits, and in-flight attempts.
#[derive(Clone, Debug, Default)]
pub struct RequestControl {
	deadline: Option<Instant>,
	cancel: CancellationToken,
}
impl RequestControl {
	/// No deadline and a fresh, never-cancelled token.
	pub fn new() -> Self {
		Self::default()
	}

	/// Fails the operation once `deadline` passes.
	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(deadline);

		self
	}

	/// Fails the operation `timeout` from now.
	pub fn with_timeout(self, timeout: Duration) -> Self {
		self.with_deadline(Instant::now() + to_std(timeout))
	}

	/// Aborts the operation when `token` is cancelled.
	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancel = token;

		self
	}

	/// The cancellation token observed by this operation.
	pub fn cancellation(&self) -> &CancellationToken {
		&self.cancel
	}

	/// Time left before the deadline, if one is set.
	pub fn remaining(&self) -> Option<Duration> {
		self.deadline.map(|deadline| {
			let left = deadline.saturating_duration_since(Instant::now());

			Duration::try_from(left).unwrap_or(Duration::MAX)
		})
	}

	/// Fails when cancellation was requested or the deadline passed.
	pub fn check(&self) -> Result<()> {
		if self.cancel.is_cancelled() {
			return Err(cancelled(CancelReason::Requested));
		}
		if self.remaining().is_some_and(|left| left.is_zero()) {
			return Err(cancelled(CancelReason::DeadlineExceeded));
		}

		Ok(())
	}

	/// Sleeps for `delay` unless cancelled; fails at once when `delay` outlasts the deadline.
	pub async fn pause(&self, delay: Duration) -> Result<()> {
		self.check()?;

		if self.remaining().is_some_and(|left| delay > left) {
			return Err(cancelled(CancelReason::DeadlineExceeded));
		}

		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => Err(cancelled(CancelReason::Requested)),
			_ = time::sleep(to_std(delay)) => Ok(()),
		}
	}

	/// Runs `fut` until it completes, the attempt `timeout` elapses, the deadline passes, or
	/// cancellation is requested.
	pub async fn bounded<F>(&self, fut: F, timeout: Option<Duration>) -> Result<F::Output>
	where
		F: Future,
	{
		self.check()?;

		let remaining = self.remaining();
		let limit = match (timeout, remaining) {
			(Some(attempt), Some(left)) => Some(attempt.min(left)),
			(attempt, left) => attempt.or(left),
		};
		let deadline_bound = match (timeout, remaining) {
			(Some(attempt), Some(left)) => left <= attempt,
			(None, Some(_)) => true,
			_ => false,
		};

		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => Err(cancelled(CancelReason::Requested)),
			output = bounded_by(fut, limit) => match output {
				Some(value) => Ok(value),
				None if deadline_bound => Err(cancelled(CancelReason::DeadlineExceeded)),
				None => Err(TransportError::Timeout { after: limit.unwrap_or_default() }.into()),
			},
		}
	}
}

async fn bounded_by<F>(fut: F, limit: Option<Duration>) -> Option<F::Output>
where
	F: Future,
{
	match limit {
		Some(limit) => time::timeout(to_std(limit), fut).await.ok(),
		None => Some(fut.await),
	}
}

fn cancelled(reason: CancelReason) -> Error {
	Error::Cancelled { reason }
}

fn to_std(duration: Duration) -> StdDuration {
	StdDuration::try_from(duration).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn pause_fails_fast_when_delay_outlasts_deadline() {
		let control = RequestControl::new().with_timeout(Duration::milliseconds(50));
		let started = Instant::now();
		let err = control.pause(Duration::seconds(10)).await.expect_err("Pause must not fit.");

		assert!(matches!(err, Error::Cancelled { reason: CancelReason::DeadlineExceeded }));
		assert!(started.elapsed() < StdDuration::from_secs(1));
	}

	#[tokio::test]
	async fn cancellation_interrupts_pause_promptly() {
		let token = CancellationToken::new();
		let control = RequestControl::new().with_cancellation(token.clone());
		let canceller = tokio::spawn(async move {
			time::sleep(StdDuration::from_millis(20)).await;
			token.cancel();
		});
		let started = Instant::now();
		let err = control.pause(Duration::seconds(30)).await.expect_err("Pause must be cancelled.");

		assert!(matches!(err, Error::Cancelled { reason: CancelReason::Requested }));
		assert!(started.elapsed() < StdDuration::from_secs(5));
		canceller.await.expect("Canceller task should finish.");
	}

	#[tokio::test]
	async fn attempt_timeout_is_a_transport_timeout() {
		let control = RequestControl::new();
		let err = control
			.bounded(time::sleep(StdDuration::from_secs(5)), Some(Duration::milliseconds(10)))
			.await
			.expect_err("Slow attempt must time out.");

		assert!(matches!(err, Error::Network(TransportError::Timeout { .. })));
		assert!(err.is_retryable());
		assert_eq!(
			control.bounded(async { 7 }, Some(Duration::seconds(1))).await.expect("Fast attempt."),
			7
		);
	}

	#[tokio::test]
	async fn deadline_bound_attempt_is_cancelled() {
		let control = RequestControl::new().with_timeout(Duration::milliseconds(10));
		let err = control
			.bounded(time::sleep(StdDuration::from_secs(5)), Some(Duration::seconds(30)))
			.await
			.expect_err("Deadline must cut the attempt.");

		assert!(matches!(err, Error::Cancelled { reason: CancelReason::DeadlineExceeded }));
	}
}
