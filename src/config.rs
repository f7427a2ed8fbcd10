//! Validated client configuration.

// std
use std::net::IpAddr;
// self
use crate::{
	_prelude::*,
	dispatch::BackoffPolicy,
	error::ConfigError,
	rate_limit::{RateLimitMode, RateLimiter, RatePolicy},
	token::DEFAULT_CLOCK_SKEW,
};

/// Public API base URL.
pub const DEFAULT_BASE_URL: &str = "https://public.api.hospitable.com/v2";
/// OAuth token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://auth.hospitable.com/oauth/token";
/// Per-attempt timeout applied when none is configured.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::seconds(30);
/// Longest server-requested `Retry-After` the dispatcher sleeps through before giving up.
pub const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::minutes(2);

/// `User-Agent` sent with every request.
pub fn default_user_agent() -> String {
	format!("hospitable-client/{}", env!("CARGO_PKG_VERSION"))
}

/// Immutable client configuration produced by [`ClientConfigBuilder`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
	/// API base URL every operation path is joined onto.
	pub base_url: Url,
	/// OAuth token endpoint.
	pub token_url: Url,
	/// Retry schedule for transient failures.
	pub backoff: BackoffPolicy,
	/// Upper bound for a single network attempt.
	pub attempt_timeout: Duration,
	/// Longest `Retry-After` honored in place; longer waits surface the error instead.
	pub max_retry_after: Duration,
	/// Behavior when the local limiter denies a call.
	pub rate_limit_mode: RateLimitMode,
	/// Limiter budgets (ignored when a shared limiter is supplied).
	pub rate_policies: Vec<RatePolicy>,
	/// Margin before expiry at which a credential counts as expiring.
	pub clock_skew: Duration,
	/// Whether stale credentials are refreshed transparently.
	pub auto_refresh: bool,
	/// `User-Agent` header value.
	pub user_agent: String,
	/// Limiter shared with other clients, when explicitly configured.
	pub shared_limiter: Option<Arc<RateLimiter>>,
}
impl ClientConfig {
	/// Creates a builder seeded with production defaults.
	pub fn builder() -> ClientConfigBuilder {
		ClientConfigBuilder::default()
	}

	/// Returns the shared limiter, or a fresh one built from `rate_policies`.
	pub fn rate_limiter(&self) -> Result<Arc<RateLimiter>, ConfigError> {
		match &self.shared_limiter {
			Some(limiter) => Ok(Arc::clone(limiter)),
			None => RateLimiter::new(self.rate_policies.iter().cloned()).map(Arc::new),
		}
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	/// API base URL override.
	pub base_url: Option<Url>,
	/// Token endpoint override.
	pub token_url: Option<Url>,
	/// Retry schedule.
	pub backoff: BackoffPolicy,
	/// Per-attempt timeout.
	pub attempt_timeout: Duration,
	/// Cap on server-requested waits.
	pub max_retry_after: Duration,
	/// Limiter denial behavior.
	pub rate_limit_mode: RateLimitMode,
	/// Limiter budgets.
	pub rate_policies: Vec<RatePolicy>,
	/// Expiry margin.
	pub clock_skew: Duration,
	/// Transparent refresh toggle.
	pub auto_refresh: bool,
	/// `User-Agent` override.
	pub user_agent: Option<String>,
	/// Shared limiter.
	pub shared_limiter: Option<Arc<RateLimiter>>,
}
impl ClientConfigBuilder {
	/// Sets the API base URL.
	pub fn base_url(mut self, url: Url) -> Self {
		self.base_url = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_url(mut self, url: Url) -> Self {
		self.token_url = Some(url);

		self
	}

	/// Overrides the retry schedule.
	pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
		self.backoff = backoff;

		self
	}

	/// Overrides the total attempt budget.
	pub fn max_attempts(mut self, attempts: u32) -> Self {
		self.backoff.max_attempts = attempts;

		self
	}

	/// Overrides the per-attempt timeout (defaults to 30 seconds).
	pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
		self.attempt_timeout = timeout;

		self
	}

	/// Overrides the longest `Retry-After` slept through (defaults to 2 minutes).
	pub fn max_retry_after(mut self, cap: Duration) -> Self {
		self.max_retry_after = cap;

		self
	}

	/// Overrides the limiter denial behavior (defaults to fail-fast).
	pub fn rate_limit_mode(mut self, mode: RateLimitMode) -> Self {
		self.rate_limit_mode = mode;

		self
	}

	/// Adds or replaces a limiter budget.
	pub fn rate_policy(mut self, policy: RatePolicy) -> Self {
		self.rate_policies.retain(|existing| existing.name != policy.name);
		self.rate_policies.push(policy);

		self
	}

	/// Replaces every limiter budget.
	pub fn rate_policies<I>(mut self, policies: I) -> Self
	where
		I: IntoIterator<Item = RatePolicy>,
	{
		self.rate_policies = policies.into_iter().collect();

		self
	}

	/// Shares `limiter` with other clients instead of building a private one.
	pub fn shared_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
		self.shared_limiter = Some(limiter);

		self
	}

	/// Overrides the expiry margin (defaults to 60 seconds).
	pub fn clock_skew(mut self, skew: Duration) -> Self {
		self.clock_skew = skew;

		self
	}

	/// Enables or disables transparent refresh.
	pub fn auto_refresh(mut self, enabled: bool) -> Self {
		self.auto_refresh = enabled;

		self
	}

	/// Overrides the `User-Agent` header.
	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		let base_url = match self.base_url {
			Some(url) => url,
			None => parse_endpoint("base", DEFAULT_BASE_URL)?,
		};
		let token_url = match self.token_url {
			Some(url) => url,
			None => parse_endpoint("token", DEFAULT_TOKEN_URL)?,
		};
		let config = ClientConfig {
			base_url,
			token_url,
			backoff: self.backoff,
			attempt_timeout: self.attempt_timeout,
			max_retry_after: self.max_retry_after,
			rate_limit_mode: self.rate_limit_mode,
			rate_policies: self.rate_policies,
			clock_skew: self.clock_skew,
			auto_refresh: self.auto_refresh,
			user_agent: self.user_agent.unwrap_or_else(default_user_agent),
			shared_limiter: self.shared_limiter,
		};

		config.validate()?;

		Ok(config)
	}
}
impl Default for ClientConfigBuilder {
	fn default() -> Self {
		Self {
			base_url: None,
			token_url: None,
			backoff: BackoffPolicy::default(),
			attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
			max_retry_after: DEFAULT_MAX_RETRY_AFTER,
			rate_limit_mode: RateLimitMode::default(),
			rate_policies: RatePolicy::defaults(),
			clock_skew: DEFAULT_CLOCK_SKEW,
			auto_refresh: true,
			user_agent: None,
			shared_limiter: None,
		}
	}
}

impl ClientConfig {
	fn validate(&self) -> Result<(), ConfigError> {
		validate_endpoint("base", &self.base_url)?;
		validate_endpoint("token", &self.token_url)?;
		self.backoff.validate()?;

		let negative_wait = match self.rate_limit_mode {
			RateLimitMode::Wait { max_wait } => max_wait.is_negative(),
			RateLimitMode::FailFast => false,
		};

		if !self.attempt_timeout.is_positive() {
			return Err(ConfigError::NonPositiveTimeout { name: "attempt_timeout" });
		}
		if negative_wait {
			return Err(ConfigError::NonPositiveTimeout { name: "rate_limit_max_wait" });
		}
		if self.max_retry_after.is_negative() {
			return Err(ConfigError::NonPositiveTimeout { name: "max_retry_after" });
		}
		if self.clock_skew.is_negative() {
			return Err(ConfigError::NonPositiveTimeout { name: "clock_skew" });
		}
		for policy in &self.rate_policies {
			policy.validate()?;
		}

		Ok(())
	}
}

fn parse_endpoint(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidEndpoint { endpoint: name, source })
}

// Plain HTTP is accepted only for loopback hosts (local mock servers).
fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ConfigError> {
	let loopback = match url.host() {
		Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(url::Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
		Some(url::Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
		None => false,
	};

	match url.scheme() {
		"https" => Ok(()),
		"http" if loopback => Ok(()),
		_ => Err(ConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn defaults_point_at_production() {
		let config = ClientConfig::builder().build().expect("Default config should be valid.");

		assert_eq!(config.base_url.as_str(), DEFAULT_BASE_URL);
		assert_eq!(config.token_url.as_str(), DEFAULT_TOKEN_URL);
		assert_eq!(config.backoff.max_attempts, BackoffPolicy::DEFAULT_MAX_ATTEMPTS);
		assert_eq!(config.attempt_timeout, Duration::seconds(30));
		assert_eq!(config.max_retry_after, Duration::minutes(2));
		assert_eq!(config.rate_limit_mode, RateLimitMode::FailFast);
		assert!(config.user_agent.starts_with("hospitable-client/"));
		assert_eq!(config.rate_policies.len(), 3);
	}

	#[test]
	fn plain_http_is_loopback_only() {
		let local = ClientConfig::builder()
			.base_url(Url::parse("http://127.0.0.1:8080/v2").expect("Fixture URL should parse."))
			.build();

		assert!(local.is_ok());

		let plain = Url::parse("http://auth.example.com/token").expect("Fixture URL should parse.");
		let remote = ClientConfig::builder().token_url(plain).build();

		assert!(matches!(remote, Err(ConfigError::InsecureEndpoint { endpoint: "token", .. })));
	}

	#[test]
	fn invalid_values_are_rejected() {
		assert!(matches!(
			ClientConfig::builder().attempt_timeout(Duration::ZERO).build(),
			Err(ConfigError::NonPositiveTimeout { name: "attempt_timeout" })
		));
		assert!(matches!(
			ClientConfig::builder().max_retry_after(-Duration::seconds(1)).build(),
			Err(ConfigError::NonPositiveTimeout { name: "max_retry_after" })
		));
		assert!(matches!(
			ClientConfig::builder().max_attempts(0).build(),
			Err(ConfigError::InvalidRetryPolicy { .. })
		));
		assert!(matches!(
			ClientConfig::builder()
				.rate_policy(RatePolicy::global("burst", 0, Duration::seconds(1)))
				.build(),
			Err(ConfigError::InvalidRatePolicy { .. })
		));
	}

	#[test]
	fn rate_policy_replaces_by_name_and_shared_limiter_wins() {
		let config = ClientConfig::builder()
			.rate_policy(RatePolicy::global("calendar:update", 10, Duration::seconds(1)))
			.build()
			.expect("Config should be valid.");

		assert_eq!(config.rate_policies.len(), 3);

		let shared = Arc::new(RateLimiter::default());
		let config = ClientConfig::builder()
			.shared_limiter(Arc::clone(&shared))
			.build()
			.expect("Config should be valid.");
		let limiter = config.rate_limiter().expect("Shared limiter should be returned.");

		assert!(Arc::ptr_eq(&shared, &limiter));
	}
}
