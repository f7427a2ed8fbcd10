//! Client facade bundling configuration, credentials, limiter, dispatcher, and paginator.

// crates.io
use futures::Stream;
// self
use crate::{
	_prelude::*,
	auth::{Credential, TokenClaims},
	config::ClientConfig,
	dispatch::{DispatchHook, Dispatcher, Operation, RequestControl},
	error::ConfigError,
	http::ApiHttpClient,
	oauth::TransportErrorMapper,
	pagination::{Pages, Paginator},
	rate_limit::RateLimiter,
	response::ApiResponse,
	token::TokenManager,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport stack.
pub type ReqwestApiClient = Client<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// One API context: owns its credential, limiter windows, and transport.
///
/// Cloning is cheap and clones share every piece of state, so a single client can serve many
/// concurrent callers. Separate clients never share state unless a limiter is shared explicitly
/// through [`shared_limiter`](crate::config::ClientConfigBuilder::shared_limiter).
pub struct Client<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	dispatcher: Dispatcher<C, M>,
	paginator: Paginator<C, M>,
}
impl<C, M> Client<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		config: ClientConfig,
		credential: Credential,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self, ConfigError> {
		let http_client = http_client.into();
		let mapper = mapper.into();
		let limiter = config.rate_limiter()?;
		let tokens = TokenManager::new(
			credential,
			config.token_url.clone(),
			Arc::clone(&http_client),
			Arc::clone(&mapper),
		)
		.with_clock_skew(config.clock_skew)
		.with_auto_refresh(config.auto_refresh);
		let dispatcher =
			Dispatcher::new(Arc::new(config), Arc::new(tokens), limiter, http_client, mapper);

		Ok(Self::from_dispatcher(dispatcher))
	}

	fn from_dispatcher(dispatcher: Dispatcher<C, M>) -> Self {
		Self { paginator: Paginator::new(dispatcher.clone()), dispatcher }
	}

	/// Installs an observer notified after every network attempt.
	pub fn with_hook(self, hook: Arc<dyn DispatchHook>) -> Self {
		Self::from_dispatcher(self.dispatcher.with_hook(hook))
	}

	/// Configuration in effect.
	pub fn config(&self) -> &ClientConfig {
		self.dispatcher.config()
	}

	/// Credential lifecycle manager.
	pub fn tokens(&self) -> &Arc<TokenManager<C, M>> {
		self.dispatcher.tokens()
	}

	/// Local rate limiter.
	pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
		self.dispatcher.rate_limiter()
	}

	/// Underlying dispatcher.
	pub fn dispatcher(&self) -> &Dispatcher<C, M> {
		&self.dispatcher
	}

	/// Paginator sharing this client's dispatcher.
	pub fn paginator(&self) -> &Paginator<C, M> {
		&self.paginator
	}

	/// Claims of the current access token.
	pub fn token_info(&self) -> Result<TokenClaims> {
		let credential = self.tokens().credential();

		match &credential.claims {
			Some(claims) => Ok(claims.clone()),
			None => self.tokens().parse(credential.access_token.expose()),
		}
	}

	/// Sends `operation` with retries and limiter admission.
	pub async fn send(&self, operation: &Operation) -> Result<ApiResponse> {
		self.dispatcher.send(operation).await
	}

	/// Sends `operation` under `control`'s deadline and cancellation.
	pub async fn send_with(
		&self,
		operation: &Operation,
		control: &RequestControl,
	) -> Result<ApiResponse> {
		self.dispatcher.send_with(operation, control).await
	}

	/// Sends `operation` and decodes the JSON body as `T`.
	pub async fn json<T>(&self, operation: &Operation) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.send(operation).await?.json()
	}

	/// `GET path`, decoded as `T`.
	pub async fn get<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.json(&Operation::get(path)).await
	}

	/// `POST path` with a JSON `body`, decoded as `T`.
	pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		self.json(&Operation::post(path).with_json(body)?).await
	}

	/// `PUT path` with a JSON `body`, decoded as `T`.
	pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		self.json(&Operation::put(path).with_json(body)?).await
	}

	/// `PATCH path` with a JSON `body`, decoded as `T`.
	pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		self.json(&Operation::patch(path).with_json(body)?).await
	}

	/// `DELETE path`; the response body is often empty, so it is returned raw.
	pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
		self.send(&Operation::delete(path)).await
	}

	/// Lazy page iteration over `template`, starting at page 1.
	pub fn pages<T>(&self, template: Operation) -> Pages<C, M, T>
	where
		T: DeserializeOwned,
	{
		self.paginator.pages(template)
	}

	/// Lazy item iteration over `template`, in server order.
	pub fn items<T>(&self, template: Operation) -> impl Stream<Item = Result<T>> + use<C, M, T>
	where
		T: DeserializeOwned,
	{
		self.paginator.items(template)
	}
}
#[cfg(feature = "reqwest")]
impl Client<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a client with its own reqwest transport.
	pub fn new(config: ClientConfig, credential: Credential) -> Result<Self, ConfigError> {
		let http_client = ReqwestHttpClient::build(&config.user_agent)?;

		Self::with_http_client(config, credential, http_client, ReqwestTransportErrorMapper)
	}

	/// Creates a client with default configuration and a credential read from the environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::new(ClientConfig::builder().build()?, Credential::from_env()?)
	}
}
impl<C, M> Clone for Client<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { dispatcher: self.dispatcher.clone(), paginator: self.paginator.clone() }
	}
}
impl<C, M> Debug for Client<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Client").field("dispatcher", &self.dispatcher).finish()
	}
}
