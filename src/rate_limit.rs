//! Client-side sliding-window rate limiting.
//!
//! Each [`RatePolicy`] describes a budget (`max_events` per `window`). A [`RateKey`] names the
//! policy an operation is charged against plus, for keyed policies, the subject (for example a
//! reservation id) that gets its own window. All windows of one [`RateLimiter`] live under a
//! single mutex, so an operation gated by several keys is admitted atomically: either every
//! window records the event or none does. Windows that empty out are dropped on the next check.

mod policy;

pub use policy::*;

// self
use crate::{_prelude::*, http::RateLimitHeaders};

/// Advises callers when to retry after a [`RateDecision::Deny`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant when it is safe to retry.
	pub earliest_retry_at: OffsetDateTime,
	/// Suggested wait before retrying.
	pub recommended_backoff: Duration,
	/// Window key (or `server`) that denied the call.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(earliest_retry_at: OffsetDateTime, recommended_backoff: Duration) -> Self {
		Self { earliest_retry_at, recommended_backoff, reason: None }
	}

	/// Adds a human-readable reason.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}
}

/// Result of a limiter check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateDecision {
	/// The event was admitted and recorded.
	Admit,
	/// The event was refused; nothing was recorded.
	Deny(RetryDirective),
}
impl RateDecision {
	/// Returns true for [`RateDecision::Admit`].
	pub fn is_admitted(&self) -> bool {
		matches!(self, Self::Admit)
	}

	/// Wait suggested by a denial.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Admit => None,
			Self::Deny(directive) => Some(directive.recommended_backoff),
		}
	}
}

/// What the dispatcher does when the local limiter denies a call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RateLimitMode {
	/// Fail immediately with a local [`Error::RateLimited`].
	#[default]
	FailFast,
	/// Sleep for the reported wait and check again, up to `max_wait` in total.
	Wait {
		/// Upper bound on the cumulative time spent waiting for admission.
		max_wait: Duration,
	},
}

/// Sliding window of admitted event timestamps for one key.
#[derive(Clone, Debug)]
pub struct RateWindow {
	key: String,
	max_events: u32,
	window: Duration,
	events: VecDeque<OffsetDateTime>,
}
impl RateWindow {
	fn new(key: String, policy: &RatePolicy) -> Self {
		Self { key, max_events: policy.max_events, window: policy.window, events: VecDeque::new() }
	}

	/// Window key such as `messages:reservation:{id}`.
	pub fn key(&self) -> &str {
		&self.key
	}

	/// Number of recorded events still inside the window as of the last check.
	pub fn len(&self) -> usize {
		self.events.len()
	}

	/// Returns true when no event is recorded.
	pub fn is_empty(&self) -> bool {
		self.events.is_empty()
	}

	fn prune(&mut self, now: OffsetDateTime) {
		let horizon = now - self.window;

		while self.events.front().is_some_and(|ts| *ts <= horizon) {
			self.events.pop_front();
		}
	}

	// `None` admits; `Some(wait)` is the time until the oldest event leaves the window.
	fn wait(&self, now: OffsetDateTime) -> Option<Duration> {
		if self.events.len() < self.max_events as usize {
			return None;
		}

		let oldest = self.events.front().copied().unwrap_or(now);

		Some((oldest + self.window - now).max(Duration::ZERO))
	}

	fn record(&mut self, now: OffsetDateTime) {
		self.events.push_back(now);
	}
}

#[derive(Debug, Default)]
struct LimiterState {
	windows: HashMap<String, RateWindow>,
	server_block: Option<OffsetDateTime>,
}

/// Thread-safe set of sliding windows keyed by [`RateKey`].
///
/// Keys whose policy is not configured are admitted without being recorded, as are keys that do
/// not fit their policy's shape (see [`validate_keys`](Self::validate_keys)).
#[derive(Debug)]
pub struct RateLimiter {
	policies: HashMap<String, RatePolicy>,
	state: Mutex<LimiterState>,
}
impl RateLimiter {
	/// Builds a limiter from validated policies; later duplicates replace earlier ones.
	pub fn new<I>(policies: I) -> Result<Self, crate::error::ConfigError>
	where
		I: IntoIterator<Item = RatePolicy>,
	{
		let mut map = HashMap::new();

		for policy in policies {
			policy.validate()?;
			map.insert(policy.name.clone(), policy);
		}

		Ok(Self { policies: map, state: Mutex::new(LimiterState::default()) })
	}

	/// Configured policy named `name`.
	pub fn policy(&self, name: &str) -> Option<&RatePolicy> {
		self.policies.get(name)
	}

	/// Rejects keys without a subject that name a keyed policy.
	///
	/// Such keys would otherwise be admitted unrecorded; subjects on global policies are ignored.
	pub fn validate_keys(&self, keys: &[RateKey]) -> Result<()> {
		for key in keys {
			let unscoped =
				self.policies.get(key.policy()).filter(|policy| policy.window_for(key).is_none());

			if let Some(policy) = unscoped {
				return Err(Error::invalid_request(format!(
					"rate policy `{}` needs a subject for each key",
					policy.name
				)));
			}
		}

		Ok(())
	}

	/// Number of windows currently tracked.
	pub fn tracked_windows(&self) -> usize {
		self.state.lock().windows.len()
	}

	/// Checks and, on admission, records one event for `key`.
	pub fn check(&self, key: &RateKey) -> RateDecision {
		self.check_at(key, OffsetDateTime::now_utc())
	}

	/// [`check`](Self::check) with an explicit clock.
	pub fn check_at(&self, key: &RateKey, now: OffsetDateTime) -> RateDecision {
		self.check_all_at(std::slice::from_ref(key), now)
	}

	/// Admits only if every key admits; the denial reports the longest wait.
	pub fn check_all(&self, keys: &[RateKey]) -> RateDecision {
		self.check_all_at(keys, OffsetDateTime::now_utc())
	}

	/// [`check_all`](Self::check_all) with an explicit clock.
	pub fn check_all_at(&self, keys: &[RateKey], now: OffsetDateTime) -> RateDecision {
		let mut state = self.state.lock();

		if let Some(until) = state.server_block {
			if now < until {
				return RateDecision::Deny(
					RetryDirective::new(until, until - now).with_reason("server"),
				);
			}

			state.server_block = None;
		}

		let mut charged = Vec::with_capacity(keys.len());

		for key in keys {
			let Some(policy) = self.policies.get(key.policy()) else {
				continue;
			};
			let Some(window_key) = policy.window_for(key) else {
				continue;
			};

			if !charged.contains(&window_key) {
				state
					.windows
					.entry(window_key.clone())
					.or_insert_with(|| RateWindow::new(window_key.clone(), policy));
				charged.push(window_key);
			}
		}

		state.windows.retain(|window_key, window| {
			window.prune(now);

			!window.is_empty() || charged.contains(window_key)
		});

		let mut longest: Option<(Duration, &str)> = None;

		for window_key in &charged {
			let Some(window) = state.windows.get(window_key) else {
				continue;
			};

			match (window.wait(now), longest) {
				(Some(wait), Some((max, _))) if wait <= max => {},
				(Some(wait), _) => longest = Some((wait, window_key.as_str())),
				(None, _) => {},
			}
		}

		if let Some((wait, window_key)) = longest {
			let directive = RetryDirective::new(now + wait, wait).with_reason(window_key);

			return RateDecision::Deny(directive);
		}

		for window_key in &charged {
			if let Some(window) = state.windows.get_mut(window_key) {
				window.record(now);
			}
		}

		RateDecision::Admit
	}

	/// Applies server-advertised limits: with nothing remaining, every check denies until reset.
	pub fn observe_server_limits(&self, headers: &RateLimitHeaders) {
		self.observe_server_limits_at(headers, OffsetDateTime::now_utc());
	}

	/// [`observe_server_limits`](Self::observe_server_limits) with an explicit clock.
	pub fn observe_server_limits_at(&self, headers: &RateLimitHeaders, now: OffsetDateTime) {
		let (Some(0), Some(reset)) = (headers.remaining, headers.reset) else {
			return;
		};

		if reset <= now {
			return;
		}

		let mut state = self.state.lock();

		state.server_block = Some(state.server_block.map_or(reset, |current| current.max(reset)));
	}

	/// Events currently recorded for `key` (pruned as of `now`).
	pub fn recorded_at(&self, key: &RateKey, now: OffsetDateTime) -> usize {
		let window_key = match self.policies.get(key.policy()) {
			Some(policy) => policy.window_for(key),
			None => Some(key.window_key()),
		};
		let Some(window_key) = window_key else {
			return 0;
		};
		let mut state = self.state.lock();

		match state.windows.get_mut(&window_key) {
			Some(window) => {
				window.prune(now);

				window.len()
			},
			None => 0,
		}
	}
}
impl Default for RateLimiter {
	fn default() -> Self {
		Self {
			policies: RatePolicy::defaults()
				.into_iter()
				.map(|policy| (policy.name.clone(), policy))
				.collect(),
			state: Mutex::new(LimiterState::default()),
		}
	}
}
