//! Transport primitives shared by API dispatch and OAuth token exchanges.
//!
//! The module exposes [`ApiHttpClient`] alongside [`ResponseMetadata`] and
//! [`ResponseMetadataSlot`] so downstream crates can plug in custom HTTP clients
//! without losing the client's instrumentation hooks. Implementations call
//! [`ResponseMetadataSlot::take`] before dispatching a request and
//! [`ResponseMetadataSlot::store`] once an HTTP status or rate-limit hint is known,
//! enabling transport error mapping to classify failures with consistent metadata.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError,
	http::{HeaderMap, header::RETRY_AFTER},
};
#[cfg(feature = "reqwest")] use oauth2::{HttpRequest, HttpResponse};
use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;

/// `X-RateLimit-Limit` response header.
pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
/// `X-RateLimit-Remaining` response header.
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
/// `X-RateLimit-Reset` response header.
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

// Reset values above this are absolute epoch seconds; smaller values are relative.
const EPOCH_RESET_THRESHOLD: i64 = 1_000_000_000;

/// Abstraction over HTTP transports capable of executing API calls and token exchanges while
/// publishing response metadata to the client's instrumentation pipeline.
///
/// The trait is the client's only dependency on an HTTP stack. Callers provide an
/// implementation (typically behind `Arc<T>` where `T: ApiHttpClient`) and the client requests
/// short-lived [`AsyncHttpClient`] handles that each carry a clone of a
/// [`ResponseMetadataSlot`]. Implementations must be `Send + Sync + 'static` so they can be
/// shared across concurrent callers, and the request futures their handles return must be
/// `Send` so dispatch futures can hop executors.
pub trait ApiHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// # Metadata Contract
	///
	/// - Call [`ResponseMetadataSlot::take`] before submitting the HTTP request so stale
	///   information never leaks across retries.
	/// - Once an HTTP response provides status headers, save them with
	///   [`ResponseMetadataSlot::store`].
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Rate-limit headers advertised by the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
	/// `X-RateLimit-Limit`: requests allowed in the current window.
	pub limit: Option<u64>,
	/// `X-RateLimit-Remaining`: requests left in the current window.
	pub remaining: Option<u64>,
	/// `X-RateLimit-Reset`: instant the window resets.
	pub reset: Option<OffsetDateTime>,
}

/// Captures metadata from the most recent HTTP response for classification and error mapping.
///
/// Additional metadata fields may be added in future releases, so downstream code
/// should construct values using field names instead of struct update syntax.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
	/// Server-advertised rate-limit state.
	pub rate_limit: RateLimitHeaders,
}
impl ResponseMetadata {
	/// Extracts metadata from a status code and header map.
	pub fn from_headers(status: u16, headers: &HeaderMap) -> Self {
		Self::from_headers_at(status, headers, OffsetDateTime::now_utc())
	}

	/// Same as [`from_headers`](Self::from_headers) with an explicit clock.
	pub fn from_headers_at(status: u16, headers: &HeaderMap, now: OffsetDateTime) -> Self {
		let rate_limit = RateLimitHeaders {
			limit: header_u64(headers, RATE_LIMIT_LIMIT),
			remaining: header_u64(headers, RATE_LIMIT_REMAINING),
			reset: header_str(headers, RATE_LIMIT_RESET)
				.and_then(|raw| raw.parse::<i64>().ok())
				.and_then(|value| {
					if value > EPOCH_RESET_THRESHOLD {
						OffsetDateTime::from_unix_timestamp(value).ok()
					} else {
						Some(now + Duration::seconds(value.max(0)))
					}
				}),
		};

		Self { status: Some(status), retry_after: parse_retry_after_at(headers, now), rate_limit }
	}
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Configure any custom [`ReqwestClient`] to disable redirect following; token endpoints and
/// the API answer directly.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client with redirects disabled and the given user agent.
	pub fn build(user_agent: &str) -> Result<Self, crate::error::ConfigError> {
		let client = ReqwestClient::builder()
			.user_agent(user_agent)
			.redirect(reqwest::redirect::Policy::none())
			.build()?;

		Ok(Self(client))
	}

	pub(crate) fn instrumented(&self, slot: ResponseMetadataSlot) -> InstrumentedHandle {
		InstrumentedHandle::new(self.0.clone(), slot)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		self.instrumented(slot)
	}
}

#[cfg(feature = "reqwest")]
struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

/// Handle returned by [`ReqwestHttpClient`] that records response metadata.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
#[cfg(feature = "reqwest")]
impl InstrumentedHandle {
	fn new(client: ReqwestClient, slot: ResponseMetadataSlot) -> Self {
		Self(Arc::new(InstrumentedHttpClient { client, slot }))
	}
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let response = client
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			client.slot.store(ResponseMetadata::from_headers(status.as_u16(), &headers));

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

/// Parses `Retry-After` as delta seconds or an HTTP date; past dates yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	parse_retry_after_at(headers, OffsetDateTime::now_utc())
}

fn parse_retry_after_at(headers: &HeaderMap, now: OffsetDateTime) -> Option<Duration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(i64::try_from(secs).ok()?));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - now;

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name)?.to_str().ok().map(str::trim)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
	header_str(headers, name)?.parse().ok()
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::HeaderValue;
	// self
	use super::*;

	fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
		let mut map = HeaderMap::new();

		for (name, value) in pairs {
			map.insert(*name, HeaderValue::from_str(value).expect("Header value should be valid."));
		}

		map
	}

	#[test]
	fn retry_after_accepts_seconds_and_dates() {
		let now = OffsetDateTime::parse("Tue, 15 Nov 1994 08:12:31 GMT", &Rfc2822)
			.expect("Fixture date should parse.");

		let later = headers(&[("retry-after", "Tue, 15 Nov 1994 08:12:41 GMT")]);
		let past = headers(&[("retry-after", "Tue, 15 Nov 1994 08:12:21 GMT")]);

		assert_eq!(
			parse_retry_after_at(&headers(&[("retry-after", "7")]), now),
			Some(Duration::seconds(7))
		);
		assert_eq!(parse_retry_after_at(&later, now), Some(Duration::seconds(10)));
		assert_eq!(parse_retry_after_at(&past, now), None);
		assert_eq!(parse_retry_after_at(&headers(&[("retry-after", "soon")]), now), None);
	}

	#[test]
	fn rate_limit_headers_distinguish_epoch_and_relative_reset() {
		let now = OffsetDateTime::from_unix_timestamp(1_700_000_000)
			.expect("Fixture timestamp should be valid.");
		let relative = ResponseMetadata::from_headers_at(
			200,
			&headers(&[
				("x-ratelimit-limit", "100"),
				("x-ratelimit-remaining", "0"),
				("x-ratelimit-reset", "30"),
			]),
			now,
		);

		assert_eq!(relative.status, Some(200));
		assert_eq!(relative.rate_limit.limit, Some(100));
		assert_eq!(relative.rate_limit.remaining, Some(0));
		assert_eq!(relative.rate_limit.reset, Some(now + Duration::seconds(30)));

		let absolute = ResponseMetadata::from_headers_at(
			200,
			&headers(&[("x-ratelimit-reset", "1700000045")]),
			now,
		);

		assert_eq!(absolute.rate_limit.reset, Some(now + Duration::seconds(45)));
		assert_eq!(absolute.rate_limit.remaining, None);
	}
}
