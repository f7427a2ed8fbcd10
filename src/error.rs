//! Client-level error types shared by the token manager, dispatcher, paginator, and webhooks.

// self
use crate::{_prelude::*, auth::TokenDecodeError};

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
///
/// Every variant carries enough structured data (status, message, retry hint) for callers to
/// decide whether to retry at a higher level without re-parsing raw HTTP responses.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// A self-describing token could not be decoded.
	#[error(transparent)]
	Decode(#[from] TokenDecodeError),
	/// Transport failure (DNS, TCP, TLS, timeout) after retries were exhausted.
	#[error(transparent)]
	Network(#[from] TransportError),

	/// Credential is invalid, expired, or could not be refreshed.
	#[error("Authentication failed: {message}.")]
	Authentication {
		/// Server- or client-supplied reason string.
		message: String,
		/// HTTP status code, when the failure came from a response.
		status: Option<u16>,
	},
	/// Credential is valid but lacks the permissions for the operation.
	#[error("Access forbidden: {message}.")]
	Forbidden {
		/// Server-supplied reason string.
		message: String,
	},
	/// Requested resource does not exist.
	#[error("Resource not found: {message}.")]
	NotFound {
		/// Server-supplied reason string.
		message: String,
	},
	/// Server rejected the request payload.
	#[error("Request validation failed with status {status}: {message}.")]
	Validation {
		/// HTTP status code (400, 422, ...).
		status: u16,
		/// Server-supplied validation message.
		message: String,
	},
	/// Rate limit exceeded, either locally or as reported by the server.
	#[error("Rate limit exceeded ({origin}); retry after {retry_after:?}.")]
	RateLimited {
		/// Suggested delay before retrying, when known.
		retry_after: Option<Duration>,
		/// Whether the local limiter or the server denied the call.
		origin: RateLimitOrigin,
		/// Limiter key that denied the call, for local denials.
		key: Option<String>,
	},
	/// Server failed (5xx) on every permitted attempt.
	#[error("Server error with status {status}: {message}.")]
	Server {
		/// HTTP status code.
		status: u16,
		/// Server-supplied reason string.
		message: String,
	},
	/// Deadline elapsed or cancellation was requested mid-operation.
	#[error("Operation cancelled: {reason}.")]
	Cancelled {
		/// What triggered the cancellation.
		reason: CancelReason,
	},
	/// Request was rejected locally before it reached the network.
	#[error("Invalid request: {reason}.")]
	InvalidRequest {
		/// Human-readable reason.
		reason: String,
	},
	/// Server answered with a status outside the documented classes.
	#[error("Unexpected response status {status}: {message}.")]
	UnexpectedStatus {
		/// HTTP status code.
		status: u16,
		/// Server-supplied reason string.
		message: String,
	},
	/// Response body did not match the expected schema.
	#[error("Response body could not be decoded at `{}`.", .source.path())]
	ResponseDecode {
		/// Structured decoding failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: u16,
	},
}
impl Error {
	/// Convenience constructor for authentication failures raised locally.
	pub fn authentication(message: impl Into<String>) -> Self {
		Self::Authentication { message: message.into(), status: None }
	}

	/// Convenience constructor for locally rejected requests.
	pub fn invalid_request(reason: impl Into<String>) -> Self {
		Self::InvalidRequest { reason: reason.into() }
	}

	/// HTTP status code associated with the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Authentication { status, .. } => *status,
			Self::Forbidden { .. } => Some(403),
			Self::NotFound { .. } => Some(404),
			Self::Validation { status, .. }
			| Self::Server { status, .. }
			| Self::UnexpectedStatus { status, .. }
			| Self::ResponseDecode { status, .. } => Some(*status),
			Self::RateLimited { origin: RateLimitOrigin::Server, .. } => Some(429),
			_ => None,
		}
	}

	/// Retry hint carried by rate-limit failures.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::RateLimited { retry_after, .. } => *retry_after,
			_ => None,
		}
	}

	/// Copy of this error for callers that shared the attempt which produced it.
	///
	/// Sources that cannot be cloned are flattened into their display text; the variant, status
	/// and retry hint survive.
	pub fn shared_copy(&self) -> Self {
		match self {
			Self::Authentication { message, status } =>
				Self::Authentication { message: message.clone(), status: *status },
			Self::Forbidden { message } => Self::Forbidden { message: message.clone() },
			Self::NotFound { message } => Self::NotFound { message: message.clone() },
			Self::Validation { status, message } =>
				Self::Validation { status: *status, message: message.clone() },
			Self::RateLimited { retry_after, origin, key } =>
				Self::RateLimited { retry_after: *retry_after, origin: *origin, key: key.clone() },
			Self::Server { status, message } =>
				Self::Server { status: *status, message: message.clone() },
			Self::Cancelled { reason } => Self::Cancelled { reason: *reason },
			Self::InvalidRequest { reason } => Self::InvalidRequest { reason: reason.clone() },
			Self::UnexpectedStatus { status, message } =>
				Self::UnexpectedStatus { status: *status, message: message.clone() },
			Self::Network(TransportError::Timeout { after }) =>
				Self::Network(TransportError::Timeout { after: *after }),
			Self::Network(err) => Self::Network(TransportError::Other { message: err.to_string() }),
			Self::ResponseDecode { status, .. } =>
				Self::UnexpectedStatus { status: *status, message: self.to_string() },
			Self::Config(_) | Self::Decode(_) => Self::InvalidRequest { reason: self.to_string() },
		}
	}

	/// Returns `true` for failure classes that are safe to retry at a higher level.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::RateLimited { .. } | Self::Server { .. } | Self::Network(_))
	}
}

/// Origin of a rate-limit denial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitOrigin {
	/// The client-side limiter denied the call before any network request.
	Local,
	/// The server answered with HTTP 429.
	Server,
}
impl Display for RateLimitOrigin {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Local => f.write_str("local limiter"),
			Self::Server => f.write_str("server"),
		}
	}
}

/// Trigger behind an [`Error::Cancelled`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CancelReason {
	/// The operation's overall deadline elapsed (or would elapse during a wait).
	DeadlineExceeded,
	/// The caller's cancellation token fired.
	Requested,
}
impl Display for CancelReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::DeadlineExceeded => f.write_str("deadline exceeded"),
			Self::Requested => f.write_str("cancellation requested"),
		}
	}
}

/// Configuration and validation failures raised by the client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody(#[source] serde_json::Error),
	/// An endpoint URL could not be parsed or joined.
	#[error("Endpoint `{endpoint}` is not a valid URL.")]
	InvalidEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// An endpoint uses plain HTTP against a non-loopback host.
	#[error("Endpoint `{endpoint}` must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Offending URL.
		url: String,
	},
	/// Retry policy values are inconsistent.
	#[error("Retry policy is invalid: {reason}.")]
	InvalidRetryPolicy {
		/// Human-readable reason.
		reason: &'static str,
	},
	/// A rate policy is unusable.
	#[error("Rate policy `{policy}` is invalid: {reason}.")]
	InvalidRatePolicy {
		/// Policy name.
		policy: String,
		/// Human-readable reason.
		reason: &'static str,
	},
	/// A timeout value is zero or negative.
	#[error("Timeout `{name}` must be positive.")]
	NonPositiveTimeout {
		/// Timeout label.
		name: &'static str,
	},
	/// No access token was supplied.
	#[error("An access token is required; set HOSPITABLE_PAT or HOSPITABLE_TOKEN.")]
	MissingAccessToken,
	/// Credential cannot be refreshed because OAuth client credentials are missing.
	#[error("Credential is missing OAuth client credentials.")]
	MissingClientCredentials,
	/// Requested scopes cannot be normalized.
	#[error("Scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Webhook envelope identifier failed validation.
	#[error("Identifier is invalid.")]
	InvalidIdentifier(#[from] crate::webhook::IdentifierError),
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// A single attempt exceeded its timeout.
	#[error("Request attempt timed out after {after}.")]
	Timeout {
		/// Configured per-attempt timeout.
		after: Duration,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
	/// Transport reported a failure without a structured source.
	#[error("HTTP client error: {message}.")]
	Other {
		/// Transport-supplied message.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
