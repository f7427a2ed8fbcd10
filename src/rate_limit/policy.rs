// self
use crate::{_prelude::*, error::ConfigError};

/// Policy name for calendar updates (1000 per minute).
pub const CALENDAR_UPDATE: &str = "calendar:update";
/// Policy name for messages sent to one reservation (2 per minute).
pub const MESSAGES_PER_RESERVATION: &str = "messages:reservation";
/// Policy name for all outgoing messages (50 per 5 minutes).
pub const MESSAGES_GLOBAL: &str = "messages:global";

/// Budget of `max_events` per sliding `window`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePolicy {
	/// Policy name operations refer to in their [`RateKey`]s.
	pub name: String,
	/// Maximum events admitted within one window.
	pub max_events: u32,
	/// Window length.
	pub window: Duration,
	/// Whether each key subject gets its own window.
	pub keyed: bool,
}
impl RatePolicy {
	/// One window shared by every caller.
	pub fn global(name: impl Into<String>, max_events: u32, window: Duration) -> Self {
		Self { name: name.into(), max_events, window, keyed: false }
	}

	/// One window per key subject.
	pub fn keyed(name: impl Into<String>, max_events: u32, window: Duration) -> Self {
		Self { name: name.into(), max_events, window, keyed: true }
	}

	/// Built-in budgets for calendar updates and message sends.
	pub fn defaults() -> Vec<Self> {
		vec![
			Self::global(CALENDAR_UPDATE, 1_000, Duration::minutes(1)),
			Self::keyed(MESSAGES_PER_RESERVATION, 2, Duration::minutes(1)),
			Self::global(MESSAGES_GLOBAL, 50, Duration::minutes(5)),
		]
	}

	/// Window `key` charges under this policy.
	///
	/// Global policies always charge the window named after the policy, ignoring any subject.
	/// Keyed policies charge `{name}:{subject}` and return `None` for a key without a subject.
	pub fn window_for(&self, key: &RateKey) -> Option<String> {
		match (self.keyed, key.subject()) {
			(false, _) => Some(self.name.clone()),
			(true, Some(subject)) => Some(format!("{}:{subject}", self.name)),
			(true, None) => None,
		}
	}

	pub(crate) fn validate(&self) -> Result<(), ConfigError> {
		let invalid = |reason| ConfigError::InvalidRatePolicy { policy: self.name.clone(), reason };

		if self.name.trim().is_empty() {
			return Err(invalid("name must not be empty"));
		}
		if self.max_events == 0 {
			return Err(invalid("max_events must be positive"));
		}
		if !self.window.is_positive() {
			return Err(invalid("window must be positive"));
		}

		Ok(())
	}
}

/// Limiter key: a policy name plus, for keyed policies, the subject it applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RateKey {
	policy: String,
	subject: Option<String>,
}
impl RateKey {
	/// Key charged against a global policy.
	pub fn global(policy: impl Into<String>) -> Self {
		Self { policy: policy.into(), subject: None }
	}

	/// Key charged against a keyed policy for `subject`.
	pub fn scoped(policy: impl Into<String>, subject: impl Into<String>) -> Self {
		Self { policy: policy.into(), subject: Some(subject.into()) }
	}

	/// Policy name.
	pub fn policy(&self) -> &str {
		&self.policy
	}

	/// Subject of a keyed policy.
	pub fn subject(&self) -> Option<&str> {
		self.subject.as_deref()
	}

	/// Name of the window this key charges, e.g. `messages:reservation:{id}`.
	pub fn window_key(&self) -> String {
		match &self.subject {
			Some(subject) => format!("{}:{subject}", self.policy),
			None => self.policy.clone(),
		}
	}
}
impl Display for RateKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.window_key())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn window_keys_include_the_subject() {
		assert_eq!(
			RateKey::scoped(MESSAGES_PER_RESERVATION, "abc").window_key(),
			"messages:reservation:abc"
		);
		assert_eq!(RateKey::global(CALENDAR_UPDATE).to_string(), "calendar:update");
	}

	#[test]
	fn key_shape_follows_the_policy() {
		let global = RatePolicy::global(CALENDAR_UPDATE, 10, Duration::seconds(1));
		let keyed = RatePolicy::keyed(MESSAGES_PER_RESERVATION, 2, Duration::seconds(1));

		assert_eq!(
			global.window_for(&RateKey::scoped(CALENDAR_UPDATE, "p-1")).as_deref(),
			Some(CALENDAR_UPDATE)
		);
		assert_eq!(
			keyed.window_for(&RateKey::scoped(MESSAGES_PER_RESERVATION, "r-1")).as_deref(),
			Some("messages:reservation:r-1")
		);
		assert_eq!(keyed.window_for(&RateKey::global(MESSAGES_PER_RESERVATION)), None);
	}

	#[test]
	fn degenerate_policies_are_rejected() {
		assert!(RatePolicy::global("", 1, Duration::seconds(1)).validate().is_err());
		assert!(RatePolicy::global("x", 0, Duration::seconds(1)).validate().is_err());
		assert!(RatePolicy::global("x", 1, Duration::ZERO).validate().is_err());
		assert!(RatePolicy::defaults().iter().all(|policy| policy.validate().is_ok()));
	}
}
