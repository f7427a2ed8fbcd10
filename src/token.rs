//! Credential lifecycle management with single-flight refresh.
//!
//! [`TokenManager`] owns the client's only [`Credential`]. Readers take cheap `Arc` snapshots;
//! a refresh swaps the whole credential at once, so no caller ever sees a half-updated pair.
//! Concurrent callers that find the credential stale queue on one async gate: the first performs
//! the `grant_type=refresh_token` exchange and every waiter re-checks the stored credential after
//! acquiring the gate, reusing the fresh value instead of refreshing again. Waiters queued behind
//! a failed exchange receive a copy of that failure rather than starting another one.
//!
//! A rejected refresh moves the manager into a terminal failed state that only
//! [`TokenManager::replace_credential`] clears.

mod metrics;

pub use metrics::{RefreshCounts, RefreshMetrics};

// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, Credential, CredentialState, TokenClaims, claims},
	error::ConfigError,
	http::ApiHttpClient,
	oauth::{OAuthExchange, TransportErrorMapper},
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Default margin before expiry at which a credential counts as expiring.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::seconds(60);

/// Observable lifecycle state of the managed credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenStatus {
	/// Usable and outside the refresh margin.
	Valid,
	/// Usable, but within the refresh margin.
	Expiring,
	/// Past its expiry.
	Expired,
	/// A refresh exchange is in flight.
	Refreshing,
	/// The last refresh was rejected; a new credential must be supplied.
	Failed,
}

#[derive(Debug)]
enum CredentialSlot {
	Ready(Arc<Credential>),
	Failed { credential: Arc<Credential>, reason: String },
}

// Outcome of the most recent refresh exchange, numbered so waiters can tell whether one settled
// while they were queued on the gate.
#[derive(Debug, Default)]
struct RefreshRound {
	generation: u64,
	failure: Option<Error>,
}

/// Owns credential state, decides staleness, and deduplicates refreshes.
pub struct TokenManager<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	state: RwLock<CredentialSlot>,
	refresh_gate: AsyncMutex<()>,
	last_round: Mutex<RefreshRound>,
	metrics: RefreshMetrics,
	clock_skew: Duration,
	auto_refresh: bool,
	token_url: Url,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> TokenManager<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a manager around `credential`, refreshing through `token_url`.
	pub fn new(
		credential: Credential,
		token_url: Url,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			state: RwLock::new(CredentialSlot::Ready(Arc::new(credential))),
			refresh_gate: AsyncMutex::new(()),
			last_round: Mutex::new(RefreshRound::default()),
			metrics: RefreshMetrics::default(),
			clock_skew: DEFAULT_CLOCK_SKEW,
			auto_refresh: true,
			token_url,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		}
	}

	/// Overrides the expiry margin (defaults to 60 seconds); negative values count as zero.
	pub fn with_clock_skew(mut self, skew: Duration) -> Self {
		self.clock_skew = skew.max(Duration::ZERO);

		self
	}

	/// Enables or disables refreshing from [`get_valid_credential`](Self::get_valid_credential).
	pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
		self.auto_refresh = enabled;

		self
	}

	/// Refresh counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Current credential snapshot, including one whose refresh failed.
	pub fn credential(&self) -> Arc<Credential> {
		match &*self.state.read() {
			CredentialSlot::Ready(credential) | CredentialSlot::Failed { credential, .. } =>
				Arc::clone(credential),
		}
	}

	/// Current lifecycle state.
	pub fn status(&self) -> TokenStatus {
		if let CredentialSlot::Failed { .. } = &*self.state.read() {
			return TokenStatus::Failed;
		}
		if self.refresh_gate.try_lock().is_none() {
			return TokenStatus::Refreshing;
		}

		match self.credential().state_at(OffsetDateTime::now_utc(), self.clock_skew) {
			CredentialState::Valid => TokenStatus::Valid,
			CredentialState::Expiring => TokenStatus::Expiring,
			CredentialState::Expired => TokenStatus::Expired,
		}
	}

	/// Returns a credential that is not expired, refreshing first when it is stale and
	/// refreshable.
	///
	/// Expiring credentials that cannot be refreshed are returned as-is; expired ones fail with
	/// [`Error::Authentication`]. A transient refresh failure (network, 5xx) while the credential
	/// is merely expiring also returns the current credential, since it is still accepted.
	pub async fn get_valid_credential(&self) -> Result<Arc<Credential>> {
		let current = self.ready()?;

		match current.state_at(OffsetDateTime::now_utc(), self.clock_skew) {
			CredentialState::Valid => return Ok(current),
			CredentialState::Expiring if !self.auto_refresh || !current.is_refreshable() =>
				return Ok(current),
			CredentialState::Expired if !current.is_refreshable() =>
				return Err(Error::authentication("credential expired and cannot be refreshed")),
			CredentialState::Expired if !self.auto_refresh =>
				return Err(Error::authentication(
					"credential expired and automatic refresh is disabled",
				)),
			_ => {},
		}

		let observed = self.generation();
		let _singleflight = self.refresh_gate.lock().await;
		let current = self.ready()?;
		let state = current.state_at(OffsetDateTime::now_utc(), self.clock_skew);

		if state == CredentialState::Valid {
			self.metrics.record_reuse();

			return Ok(current);
		}

		let outcome = match self.settled_since(observed, &current) {
			Some(outcome) => outcome,
			None => self.refresh_locked(Arc::clone(&current)).await,
		};

		match outcome {
			Err(err) if state == CredentialState::Expiring && !is_rejection(&err) => Ok(current),
			outcome => outcome,
		}
	}

	/// Performs a refresh exchange now, regardless of expiry.
	pub async fn refresh(&self) -> Result<Arc<Credential>> {
		let _singleflight = self.refresh_gate.lock().await;
		let current = self.ready()?;

		self.refresh_locked(current).await
	}

	/// Refreshes after the server rejected `stale`, unless another caller already rotated it.
	pub async fn force_refresh(&self, stale: &Credential) -> Result<Arc<Credential>> {
		let observed = self.generation();
		let _singleflight = self.refresh_gate.lock().await;
		let current = self.ready()?;

		if current.access_token != stale.access_token {
			self.metrics.record_reuse();

			return Ok(current);
		}
		if let Some(outcome) = self.settled_since(observed, &current) {
			return outcome;
		}
		if !current.is_refreshable() {
			return Err(Error::Authentication {
				message: "access token was rejected and cannot be refreshed".into(),
				status: Some(401),
			});
		}

		self.refresh_locked(current).await
	}

	/// Installs a caller-supplied credential, clearing any failed state.
	pub fn replace_credential(&self, credential: Credential) -> Arc<Credential> {
		let credential = Arc::new(credential);

		*self.state.write() = CredentialSlot::Ready(Arc::clone(&credential));

		credential
	}

	/// Exchanges an authorization code and installs the resulting OAuth credential.
	pub async fn exchange_authorization_code(
		&self,
		client: &ClientCredentials,
		code: &str,
		redirect_uri: &Url,
	) -> Result<Arc<Credential>> {
		const KIND: OpKind = OpKind::Refresh;

		let span = OpSpan::new(KIND, "exchange_authorization_code");
		let _singleflight = self.refresh_gate.lock().await;

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				let exchange = self.exchange(client)?;

				exchange.exchange_code(code, redirect_uri).await
			})
			.await;

		match result {
			Ok(credential) => {
				obs::record(KIND, OpOutcome::Success, &"authorization code exchanged");

				Ok(self.replace_credential(credential))
			},
			Err(err) => {
				obs::record(KIND, OpOutcome::Failure, &err);

				Err(err)
			},
		}
	}

	/// Decodes a self-describing token without the network.
	pub fn parse(&self, token: &str) -> Result<TokenClaims> {
		Ok(claims::parse(token)?)
	}

	/// Returns true when the current credential grants `scope`.
	pub fn has_scope(&self, scope: &str) -> bool {
		self.credential().has_scope(scope)
	}

	fn ready(&self) -> Result<Arc<Credential>> {
		match &*self.state.read() {
			CredentialSlot::Ready(credential) => Ok(Arc::clone(credential)),
			CredentialSlot::Failed { reason, .. } => Err(Error::authentication(format!(
				"credential refresh failed earlier ({reason}); supply a new credential"
			))),
		}
	}

	fn generation(&self) -> u64 {
		self.last_round.lock().generation
	}

	// Outcome of an exchange that finished after `observed` was read, if any. Callers must hold
	// `refresh_gate`.
	fn settled_since(
		&self,
		observed: u64,
		current: &Arc<Credential>,
	) -> Option<Result<Arc<Credential>>> {
		let round = self.last_round.lock();

		if round.generation == observed {
			return None;
		}

		match &round.failure {
			Some(err) => Some(Err(err.shared_copy())),
			None => {
				self.metrics.record_reuse();

				Some(Ok(Arc::clone(current)))
			},
		}
	}

	fn settle(&self, result: &Result<Arc<Credential>>) {
		let mut round = self.last_round.lock();

		round.generation += 1;
		round.failure = result.as_ref().err().map(Error::shared_copy);
	}

	fn exchange(&self, client: &ClientCredentials) -> Result<OAuthExchange<C, M>> {
		OAuthExchange::new(
			&self.token_url,
			client,
			Arc::clone(&self.http_client),
			Arc::clone(&self.error_mapper),
		)
	}

	// Callers must hold `refresh_gate`.
	async fn refresh_locked(&self, current: Arc<Credential>) -> Result<Arc<Credential>> {
		const KIND: OpKind = OpKind::Refresh;

		let span = OpSpan::new(KIND, "refresh");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				let refresh_token =
					current.refresh_token.as_ref().ok_or_else(|| {
						Error::authentication("credential has no refresh token")
					})?;
				let client =
					current.client.as_ref().ok_or(ConfigError::MissingClientCredentials)?;
				let exchange = self.exchange(client)?;

				self.metrics.record_attempt();

				exchange.refresh(&current, refresh_token).await
			})
			.await;

		let result = match result {
			Ok(refreshed) => {
				let refreshed = Arc::new(refreshed);

				*self.state.write() = CredentialSlot::Ready(Arc::clone(&refreshed));
				self.metrics.record_success();
				obs::record(KIND, OpOutcome::Success, &"credential rotated");

				Ok(refreshed)
			},
			Err(err) => {
				self.metrics.record_failure();

				if is_rejection(&err) {
					*self.state.write() =
						CredentialSlot::Failed { credential: current, reason: err.to_string() };
				}

				obs::record(KIND, OpOutcome::Failure, &err);

				Err(err)
			},
		};

		self.settle(&result);

		result
	}
}
impl<C, M> Debug for TokenManager<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("state", &*self.state.read())
			.field("metrics", &self.metrics)
			.field("clock_skew", &self.clock_skew)
			.field("auto_refresh", &self.auto_refresh)
			.field("token_url", &self.token_url.as_str())
			.finish()
	}
}

// A rejected grant or credential, as opposed to a transient outage.
fn is_rejection(err: &Error) -> bool {
	matches!(err, Error::Authentication { .. })
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::HttpClientError;
	// self
	use super::*;
	use crate::{
		http::{ResponseMetadata, ResponseMetadataSlot},
		oauth::DefaultTransportErrorMapper,
	};

	#[derive(Debug, ThisError)]
	#[error("offline")]
	struct Offline;

	// Transport that must never be reached.
	struct Unreachable;
	impl ApiHttpClient for Unreachable {
		type Handle = UnreachableHandle;
		type TransportError = Offline;

		fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
			UnreachableHandle(slot)
		}
	}

	struct UnreachableHandle(ResponseMetadataSlot);
	impl<'c> oauth2::AsyncHttpClient<'c> for UnreachableHandle {
		type Error = HttpClientError<Offline>;
		type Future = Pin<
			Box<dyn Future<Output = Result<oauth2::HttpResponse, Self::Error>> + 'c + Send + Sync>,
		>;

		fn call(&'c self, _request: oauth2::HttpRequest) -> Self::Future {
			self.0.store(ResponseMetadata::default());

			Box::pin(async { Err(HttpClientError::Reqwest(Box::new(Offline))) })
		}
	}

	fn manager(credential: Credential) -> TokenManager<Unreachable, DefaultTransportErrorMapper> {
		TokenManager::new(
			credential,
			Url::parse("https://auth.hospitable.com/oauth/token")
				.expect("Token URL fixture should parse."),
			Unreachable,
			DefaultTransportErrorMapper,
		)
	}

	fn expiring_in(lifetime: Duration) -> crate::auth::CredentialBuilder {
		Credential::builder("access").expires_at(OffsetDateTime::now_utc() + lifetime)
	}

	#[tokio::test]
	async fn valid_credential_is_returned_without_network() {
		let manager =
			manager(expiring_in(Duration::hours(1)).build().expect("Fixture should build."));
		let credential = manager.get_valid_credential().await.expect("Valid credential expected.");

		assert_eq!(credential.access_token.expose(), "access");
		assert_eq!(manager.status(), TokenStatus::Valid);
		assert_eq!(manager.metrics().attempts(), 0);
	}

	#[tokio::test]
	async fn expiring_pat_is_returned_as_is_and_expired_pat_fails() {
		let expiring =
			manager(expiring_in(Duration::seconds(10)).build().expect("Fixture should build."));

		assert_eq!(expiring.status(), TokenStatus::Expiring);
		assert!(expiring.get_valid_credential().await.is_ok());

		let expired =
			manager(expiring_in(-Duration::seconds(10)).build().expect("Fixture should build."));
		let err = expired.get_valid_credential().await.expect_err("Expired PAT must fail.");

		assert!(matches!(err, Error::Authentication { .. }));
		assert_eq!(expired.metrics().attempts(), 0);
	}

	#[tokio::test]
	async fn network_failure_during_refresh_is_not_terminal() {
		let credential = expiring_in(-Duration::seconds(1))
			.refresh_token("refresh")
			.client(ClientCredentials::new("id", "secret"))
			.build()
			.expect("Fixture should build.");
		let manager = manager(credential);
		let err = manager.get_valid_credential().await.expect_err("Offline refresh must fail.");

		assert!(matches!(err, Error::Network(_)));
		assert_eq!(manager.status(), TokenStatus::Expired);
		assert_eq!(manager.metrics().snapshot().failures, 1);
	}

	#[tokio::test]
	async fn expiring_credential_survives_an_unreachable_token_endpoint() {
		let credential = expiring_in(Duration::seconds(30))
			.refresh_token("refresh")
			.client(ClientCredentials::new("id", "secret"))
			.build()
			.expect("Fixture should build.");
		let manager = manager(credential);
		let current =
			manager.get_valid_credential().await.expect("Still-valid credential is kept.");

		assert_eq!(current.access_token.expose(), "access");
		assert_eq!(manager.status(), TokenStatus::Expiring);
		assert_eq!(manager.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn force_refresh_reuses_a_rotated_credential() {
		let manager =
			manager(expiring_in(Duration::hours(1)).build().expect("Fixture should build."));
		let stale = Credential::builder("old-access").build().expect("Fixture should build.");
		let current = manager.force_refresh(&stale).await.expect("Rotated credential is reused.");

		assert_eq!(current.access_token.expose(), "access");
		assert_eq!(manager.metrics().reused(), 1);

		let err = manager
			.force_refresh(&current)
			.await
			.expect_err("Non-refreshable rejected credential must fail.");

		assert_eq!(err.status(), Some(401));
	}

	#[test]
	fn parse_surfaces_decode_errors() {
		let manager =
			manager(expiring_in(Duration::hours(1)).build().expect("Fixture should build."));

		assert!(matches!(manager.parse("not-a-jwt"), Err(Error::Decode(_))));
	}
}
