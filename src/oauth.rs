//! OAuth token endpoint facade and transport error mapping.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, RedirectUrl, RefreshToken, RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, Credential, ScopeSet, Secret, TokenMechanism, claims},
	error::{ConfigError, TransportError},
	http::{ApiHttpClient, ResponseMetadata, ResponseMetadataSlot},
};

/// Lifetime assumed for issued tokens that advertise neither `expires_in` nor an `exp` claim.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::hours(12);

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Maps HTTP transport failures into client [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a client error.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Mapper usable with any transport error type; every failure becomes a network error.
#[derive(Clone, Debug, Default)]
pub struct DefaultTransportErrorMapper;
impl<E> TransportErrorMapper<E> for DefaultTransportErrorMapper
where
	E: 'static + Send + Sync + StdError,
{
	fn map_transport_error(
		&self,
		_metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error {
		match error {
			HttpClientError::Reqwest(inner) => TransportError::Network { source: inner }.into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransportError::Other { message }.into(),
			_ => TransportError::Other { message: "unknown transport failure".into() }.into(),
		}
	}
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<ReqwestError>,
	) -> Error {
		match error {
			HttpClientError::Reqwest(inner) if inner.is_builder() =>
				ConfigError::from(*inner).into(),
			other => DefaultTransportErrorMapper.map_transport_error(metadata, other),
		}
	}
}

/// Token endpoint client performing `refresh_token` and `authorization_code` exchanges.
///
/// Client credentials travel in the form body next to `grant_type`.
pub(crate) struct OAuthExchange<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	client: ClientCredentials,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> OAuthExchange<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn new(
		token_url: &Url,
		client: &ClientCredentials,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let token_url = TokenUrl::new(token_url.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "token", source })?;
		let oauth_client = BasicClient::new(ClientId::new(client.client_id.clone()))
			.set_client_secret(ClientSecret::new(client.client_secret.expose().to_owned()))
			.set_auth_type(AuthType::RequestBody)
			.set_token_uri(token_url);

		Ok(Self { oauth_client, client: client.clone(), http_client, error_mapper })
	}

	/// Exchanges `refresh_token` for a new pair, keeping the old refresh token when none is issued.
	pub(crate) async fn refresh(
		&self,
		current: &Credential,
		refresh_token: &Secret,
	) -> Result<Credential> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
		let response = self
			.oauth_client
			.exchange_refresh_token(&refresh_secret)
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(meta.take(), err, self.error_mapper.as_ref()))?;

		self.credential_from_response(response, Some(refresh_token), Some(&current.scopes))
	}

	/// Exchanges an authorization code for a new credential.
	pub(crate) async fn exchange_code(&self, code: &str, redirect_uri: &Url) -> Result<Credential> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let redirect_url = RedirectUrl::new(redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "redirect", source })?;
		let response = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.set_redirect_uri(Cow::Owned(redirect_url))
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(meta.take(), err, self.error_mapper.as_ref()))?;

		self.credential_from_response(response, None, None)
	}

	fn credential_from_response(
		&self,
		response: BasicTokenResponse,
		previous_refresh: Option<&Secret>,
		previous_scopes: Option<&ScopeSet>,
	) -> Result<Credential> {
		let issued_at = OffsetDateTime::now_utc();
		let access_token = response.access_token().secret().to_owned();
		let decoded_expiry = claims::parse(&access_token).ok().and_then(|c| c.expires_at);
		let mut builder = Credential::builder(access_token)
			.client(self.client.clone())
			.mechanism(TokenMechanism::OAuth);

		match response.expires_in() {
			Some(lifetime) => {
				let secs = i64::try_from(lifetime.as_secs())
					.map_err(|_| ConfigError::ExpiresInOutOfRange)?;

				builder = builder.expires_in(issued_at, Duration::seconds(secs));
			},
			None if decoded_expiry.is_none() =>
				builder = builder.expires_in(issued_at, DEFAULT_TOKEN_LIFETIME),
			None => {},
		}

		if let Some(refresh) = response
			.refresh_token()
			.map(|token| token.secret().to_owned())
			.or_else(|| previous_refresh.map(|secret| secret.expose().to_owned()))
		{
			builder = builder.refresh_token(refresh);
		}
		if let Some(scopes) = response.scopes() {
			builder = builder.scopes(
				ScopeSet::new(scopes.iter().map(|scope| scope.as_ref()))
					.map_err(ConfigError::from)?,
			);
		}

		let mut credential = builder.build()?;

		if let Some(scopes) = previous_scopes.filter(|_| credential.scopes.is_empty()) {
			credential.scopes = scopes.clone();
		}

		Ok(credential)
	}
}

fn map_request_error<E, M>(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let status = meta.as_ref().and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(response, status),
		RequestTokenError::Request(error) => mapper.map_transport_error(meta.as_ref(), error),
		RequestTokenError::Parse(error, _body) =>
			unreadable_response(status, format!("token response could not be parsed: {error}")),
		RequestTokenError::Other(message) =>
			unreadable_response(status, format!("unusable token endpoint response: {message}")),
	}
}

fn map_server_response_error(response: BasicErrorResponse, status: Option<u16>) -> Error {
	let message = match response.error_description() {
		Some(description) => format!("token endpoint rejected the grant: {description}"),
		None => format!("token endpoint rejected the grant: {}", response.error().as_ref()),
	};

	Error::Authentication { message, status }
}

fn unreadable_response(status: Option<u16>, message: String) -> Error {
	match status {
		Some(code) if code >= 500 => Error::Server { status: code, message },
		_ => Error::Authentication { message, status },
	}
}
