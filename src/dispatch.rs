//! Rate-limit aware, retrying request dispatch.
//!
//! [`Dispatcher::send`] turns one [`Operation`] into at most `max_attempts` network attempts.
//! Every attempt takes a fresh credential from the [`TokenManager`] and is bounded by the
//! per-attempt timeout plus the caller's [`RequestControl`]. The local [`RateLimiter`] admits the
//! operation once, before its first attempt; retries and the post-401 replay reuse that admission.
//! Outcomes are [`Classified`] and the loop acts on the classification alone: success returns,
//! transient failures back off and replay the operation verbatim, a 401 triggers exactly one
//! forced refresh, and everything else surfaces immediately.

mod backoff;
mod classify;
mod control;
mod hook;
mod operation;

pub use backoff::*;
pub use classify::*;
pub use control::*;
pub use hook::*;
pub use operation::*;

// crates.io
use oauth2::{
	AsyncHttpClient, HttpRequest,
	http::{
		Request,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
	},
};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	config::ClientConfig,
	error::{ConfigError, RateLimitOrigin},
	http::{ApiHttpClient, ResponseMetadata, ResponseMetadataSlot},
	oauth::TransportErrorMapper,
	obs::{self, OpKind, OpOutcome, OpSpan},
	rate_limit::{RateDecision, RateLimitMode, RateLimiter},
	response::ApiResponse,
	token::TokenManager,
};

/// Sends operations with credentials, limiter admission, and bounded retries.
pub struct Dispatcher<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: Arc<ClientConfig>,
	tokens: Arc<TokenManager<C, M>>,
	limiter: Arc<RateLimiter>,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	hook: Arc<dyn DispatchHook>,
}
impl<C, M> Dispatcher<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Wires a dispatcher from shared components.
	pub fn new(
		config: Arc<ClientConfig>,
		tokens: Arc<TokenManager<C, M>>,
		limiter: Arc<RateLimiter>,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Self {
		Self { config, tokens, limiter, http_client, error_mapper, hook: Arc::new(NoopHook) }
	}

	/// Installs an attempt observer.
	pub fn with_hook(mut self, hook: Arc<dyn DispatchHook>) -> Self {
		self.hook = hook;

		self
	}

	/// Token manager used for every attempt.
	pub fn tokens(&self) -> &Arc<TokenManager<C, M>> {
		&self.tokens
	}

	/// Limiter consulted before every attempt.
	pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
		&self.limiter
	}

	/// Configuration in effect.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Sends `operation` with no deadline.
	pub async fn send(&self, operation: &Operation) -> Result<ApiResponse> {
		self.send_with(operation, &RequestControl::default()).await
	}

	/// Sends `operation`, aborting on `control`'s deadline or cancellation.
	pub async fn send_with(
		&self,
		operation: &Operation,
		control: &RequestControl,
	) -> Result<ApiResponse> {
		const KIND: OpKind = OpKind::Dispatch;

		let span = OpSpan::new(KIND, "send");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.run(operation, control)).await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(err) => obs::record(KIND, OpOutcome::Failure, err),
		}

		result
	}

	async fn run(&self, operation: &Operation, control: &RequestControl) -> Result<ApiResponse> {
		let url = self.url_for(operation)?;
		let backoff = self.config.backoff;
		let mut attempt = 1_u32;
		let mut reauthenticated = false;
		let mut admitted = false;

		loop {
			let credential = control.bounded(self.tokens.get_valid_credential(), None).await??;

			if !admitted {
				self.admit(operation, control).await?;

				admitted = true;
			}

			let request = self.build_request(operation, &url, &credential)?;
			let slot = ResponseMetadataSlot::default();
			let handle = self.http_client.with_metadata(slot.clone());
			let mut status = None;
			let mut received = None;
			let timeout = Some(self.config.attempt_timeout);
			let classified = match control.bounded(handle.call(request), timeout).await {
				Err(err @ Error::Cancelled { .. }) => return Err(err),
				Err(err) => Classified::transport(err),
				Ok(Err(err)) => Classified::transport(
					self.error_mapper.map_transport_error(slot.take().as_ref(), err),
				),
				Ok(Ok(response)) => {
					let code = response.status().as_u16();
					let metadata = ResponseMetadata::from_headers(code, response.headers());
					let classified = Classified::response(code, response.body(), &metadata);

					status = Some(code);

					if let Classified::Success = classified {
						let (parts, body) = response.into_parts();
						let headers = parts.headers;

						received = Some(ApiResponse { status: code, headers, body, metadata });
					}

					classified
				},
			};

			match classified {
				Classified::Success => {
					let response = received.ok_or_else(|| {
						Error::invalid_request("transport reported success without a response")
					})?;

					self.limiter.observe_server_limits(&response.metadata.rate_limit);
					self.report(operation, attempt, status, AttemptOutcome::Success, None, None);

					return Ok(response);
				},
				Classified::Unauthorized { message } if !reauthenticated => {
					reauthenticated = true;

					self.report(
						operation,
						attempt,
						status,
						AttemptOutcome::Reauthenticate,
						None,
						Some(&message),
					);
					control.bounded(self.tokens.force_refresh(&credential), None).await??;
				},
				Classified::Unauthorized { message } => {
					let err = Error::Authentication { message, status: Some(401) };

					let failed = AttemptOutcome::Failed;

					self.report(operation, attempt, status, failed, None, Some(&err));

					return Err(err);
				},
				Classified::Retryable { error, .. } if attempt >= backoff.max_attempts => {
					let failed = AttemptOutcome::Failed;

					self.report(operation, attempt, status, failed, None, Some(&error));

					return Err(error);
				},
				// Waits longer than the configured cap are the caller's call; a 429 carries the
				// hint in `Error::RateLimited::retry_after`.
				Classified::Retryable { error, retry_after: Some(wait) }
					if wait > self.config.max_retry_after =>
				{
					let failed = AttemptOutcome::Failed;

					self.report(operation, attempt, status, failed, Some(wait), Some(&error));

					return Err(error);
				},
				Classified::Retryable { error, retry_after } => {
					let delay = retry_after.unwrap_or_else(|| {
						backoff.next_delay(&RequestAttempt {
							operation,
							number: attempt,
							previous_error: Some(&error),
						})
					});

					self.report(
						operation,
						attempt,
						status,
						AttemptOutcome::Retry,
						Some(delay),
						Some(&error),
					);
					obs::record(OpKind::Dispatch, OpOutcome::Retry, &error);
					control.pause(delay).await?;

					attempt += 1;
				},
				Classified::Terminal(err) => {
					let failed = AttemptOutcome::Failed;

					self.report(operation, attempt, status, failed, None, Some(&err));

					return Err(err);
				},
			}
		}
	}

	async fn admit(&self, operation: &Operation, control: &RequestControl) -> Result<()> {
		if operation.rate_keys.is_empty() {
			return Ok(());
		}

		self.limiter.validate_keys(&operation.rate_keys)?;

		let mut waited = Duration::ZERO;

		loop {
			let directive = match self.limiter.check_all(&operation.rate_keys) {
				RateDecision::Admit => return Ok(()),
				RateDecision::Deny(directive) => directive,
			};
			let wait = directive.recommended_backoff;
			let denied = || Error::RateLimited {
				retry_after: Some(wait),
				origin: RateLimitOrigin::Local,
				key: directive.reason.clone(),
			};

			match self.config.rate_limit_mode {
				RateLimitMode::Wait { max_wait } if waited + wait <= max_wait => {
					obs::record(OpKind::RateLimit, OpOutcome::Retry, &denied());
					control.pause(wait).await?;

					waited += wait;
				},
				_ => {
					let err = denied();

					obs::record(OpKind::RateLimit, OpOutcome::Denied, &err);

					return Err(err);
				},
			}
		}
	}

	fn url_for(&self, operation: &Operation) -> Result<Url> {
		let joined = format!(
			"{}/{}",
			self.config.base_url.as_str().trim_end_matches('/'),
			operation.path.trim_start_matches('/')
		);
		let mut url = Url::parse(&joined)
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "operation", source })?;

		if !operation.query.is_empty() {
			url.query_pairs_mut().extend_pairs(operation.query.iter());
		}

		Ok(url)
	}

	fn build_request(
		&self,
		operation: &Operation,
		url: &Url,
		credential: &Credential,
	) -> Result<HttpRequest> {
		let mut builder = Request::builder()
			.method(operation.method.clone())
			.uri(url.as_str())
			.header(AUTHORIZATION, format!("Bearer {}", credential.access_token.expose()))
			.header(ACCEPT, "application/json")
			.header(USER_AGENT, self.config.user_agent.as_str());
		let body = match &operation.body {
			Some(body) => {
				builder = builder.header(CONTENT_TYPE, "application/json");

				serde_json::to_vec(body).map_err(ConfigError::RequestBody)?
			},
			None => Vec::new(),
		};

		builder.body(body).map_err(|err| ConfigError::from(err).into())
	}

	fn report(
		&self,
		operation: &Operation,
		attempt: u32,
		status: Option<u16>,
		outcome: AttemptOutcome,
		retry_in: Option<Duration>,
		error: Option<&dyn Display>,
	) {
		let event = AttemptEvent {
			method: operation.method.clone(),
			path: operation.path.clone(),
			attempt,
			status,
			outcome,
			retry_in,
			error: error.map(ToString::to_string),
		};

		hook::notify(self.hook.as_ref(), &event);
	}
}
impl<C, M> Clone for Dispatcher<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			config: Arc::clone(&self.config),
			tokens: Arc::clone(&self.tokens),
			limiter: Arc::clone(&self.limiter),
			http_client: Arc::clone(&self.http_client),
			error_mapper: Arc::clone(&self.error_mapper),
			hook: Arc::clone(&self.hook),
		}
	}
}
impl<C, M> Debug for Dispatcher<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Dispatcher")
			.field("base_url", &self.config.base_url.as_str())
			.field("tokens", &self.tokens)
			.field("limiter", &self.limiter)
			.finish_non_exhaustive()
	}
}
