// crates.io
use rand::Rng;
// self
use crate::{_prelude::*, dispatch::RequestAttempt, error::ConfigError};

/// Exponential backoff with additive jitter.
///
/// Attempt `n` (1-based) waits `base * 2^(n-1)` plus up to half of that again, never more than
/// `max_delay`. A `Retry-After` hint on the previous failure replaces the computed delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
	/// Delay before the first retry, before jitter.
	pub base: Duration,
	/// Ceiling for any computed delay.
	pub max_delay: Duration,
	/// Total attempts per operation, including the first.
	pub max_attempts: u32,
}
impl BackoffPolicy {
	/// Default attempt budget.
	pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

	/// Deterministic part of the delay after attempt `attempt`.
	pub fn base_delay(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(30);
		let factor = i32::try_from(1_u32 << exponent).unwrap_or(i32::MAX);

		self.base.saturating_mul(factor).min(self.max_delay)
	}

	/// Jittered delay after attempt `attempt`.
	pub fn delay(&self, attempt: u32) -> Duration {
		let base = self.base_delay(attempt);
		let half_ms = i64::try_from(base.whole_milliseconds() / 2).unwrap_or(i64::MAX);
		let jitter = if half_ms > 0 {
			Duration::milliseconds(rand::rng().random_range(0..=half_ms))
		} else {
			Duration::ZERO
		};

		(base + jitter).min(self.max_delay)
	}

	/// Delay before retrying `attempt`, honoring a server `Retry-After` hint.
	pub fn next_delay(&self, attempt: &RequestAttempt<'_>) -> Duration {
		attempt
			.previous_error
			.and_then(Error::retry_after)
			.unwrap_or_else(|| self.delay(attempt.number))
	}

	pub(crate) fn validate(&self) -> Result<(), ConfigError> {
		if self.max_attempts == 0 {
			return Err(ConfigError::InvalidRetryPolicy { reason: "max_attempts must be positive" });
		}
		if self.base.is_negative() {
			return Err(ConfigError::InvalidRetryPolicy {
				reason: "base delay must not be negative",
			});
		}
		if self.max_delay < self.base {
			return Err(ConfigError::InvalidRetryPolicy {
				reason: "max_delay must not be below the base delay",
			});
		}

		Ok(())
	}
}
impl Default for BackoffPolicy {
	fn default() -> Self {
		Self {
			base: Duration::milliseconds(500),
			max_delay: Duration::seconds(30),
			max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{dispatch::Operation, error::RateLimitOrigin};

	#[test]
	fn delays_grow_monotonically_until_capped() {
		let policy = BackoffPolicy {
			base: Duration::milliseconds(100),
			max_delay: Duration::seconds(2),
			max_attempts: 10,
		};
		let bases = (1..=10).map(|n| policy.base_delay(n)).collect::<Vec<_>>();

		assert_eq!(bases[0], Duration::milliseconds(100));
		assert_eq!(bases[3], Duration::milliseconds(800));
		assert!(bases.windows(2).all(|pair| pair[0] <= pair[1]));
		assert_eq!(bases[9], Duration::seconds(2));
		assert_eq!(policy.base_delay(u32::MAX), Duration::seconds(2));

		for n in 1..=10 {
			let delay = policy.delay(n);

			assert!(delay >= policy.base_delay(n));
			assert!(delay <= policy.max_delay);
			assert!(delay <= policy.base_delay(n) + policy.base_delay(n) / 2_i32);
		}
	}

	#[test]
	fn retry_after_hint_overrides_backoff() {
		let policy = BackoffPolicy::default();
		let operation = Operation::get("/properties");
		let limited = Error::RateLimited {
			retry_after: Some(Duration::seconds(7)),
			origin: RateLimitOrigin::Server,
			key: None,
		};
		let attempt =
			RequestAttempt { operation: &operation, number: 1, previous_error: Some(&limited) };

		assert_eq!(policy.next_delay(&attempt), Duration::seconds(7));

		let plain = RequestAttempt { operation: &operation, number: 2, previous_error: None };

		assert!(policy.next_delay(&plain) >= Duration::seconds(1));
	}

	#[test]
	fn inconsistent_policies_are_rejected() {
		assert!(BackoffPolicy { max_attempts: 0, ..Default::default() }.validate().is_err());
		assert!(
			BackoffPolicy { max_delay: Duration::milliseconds(1), ..Default::default() }
				.validate()
				.is_err()
		);
		assert!(BackoffPolicy::default().validate().is_ok());
	}
}
