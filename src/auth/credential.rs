//! Credential material held by the token manager.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenClaims, claims},
	error::ConfigError,
};

/// Environment variable holding a personal access token.
pub const PAT_ENV: &str = "HOSPITABLE_PAT";
/// Fallback environment variable for the access token.
pub const TOKEN_ENV: &str = "HOSPITABLE_TOKEN";

/// Secret string wrapper that never prints its contents.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Secret(String);
impl Secret {
	/// Wraps a secret value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the secret material.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("Secret(**redacted**)")
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("**redacted**")
	}
}

/// OAuth application credentials used for refresh and code exchanges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientCredentials {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: Secret,
}
impl ClientCredentials {
	/// Creates a client credential pair.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self { client_id: client_id.into(), client_secret: Secret::new(client_secret) }
	}
}

/// How the access token was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenMechanism {
	/// Long-lived personal access token created in the dashboard.
	PersonalAccessToken,
	/// Token pair issued by the OAuth token endpoint.
	OAuth,
}

/// Freshness of a credential relative to a clock-skew margin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialState {
	/// Usable and outside the refresh margin.
	Valid,
	/// Usable, but expires within the refresh margin.
	Expiring,
	/// Past its expiry.
	Expired,
}

/// Access credential plus everything needed to keep it fresh.
///
/// A credential without a refresh token is never refreshed automatically. Instances are
/// immutable; a refresh produces a new value that replaces the stored one wholesale.
#[derive(Clone, Debug)]
pub struct Credential {
	/// Bearer token sent with every request.
	pub access_token: Secret,
	/// Refresh token for OAuth credentials.
	pub refresh_token: Option<Secret>,
	/// OAuth client credentials for refresh exchanges.
	pub client: Option<ClientCredentials>,
	/// Absolute expiry, when known.
	pub expires_at: Option<OffsetDateTime>,
	/// Granted scopes.
	pub scopes: ScopeSet,
	/// Decoded claims when the access token is self-describing.
	pub claims: Option<TokenClaims>,
	/// Issuing mechanism.
	pub mechanism: TokenMechanism,
}
impl Credential {
	/// Starts a builder around an access token.
	pub fn builder(access_token: impl Into<String>) -> CredentialBuilder {
		CredentialBuilder::new(access_token)
	}

	/// Builds a personal access token credential, decoding expiry and scopes when possible.
	pub fn personal_access_token(token: impl Into<String>) -> Result<Self, ConfigError> {
		Self::builder(token).mechanism(TokenMechanism::PersonalAccessToken).build()
	}

	/// Reads `HOSPITABLE_PAT`, falling back to `HOSPITABLE_TOKEN`.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let token = [PAT_ENV, TOKEN_ENV]
			.into_iter()
			.filter_map(|name| lookup(name))
			.map(|value| value.trim().to_owned())
			.find(|value| !value.is_empty())
			.ok_or(ConfigError::MissingAccessToken)?;

		Self::personal_access_token(token)
	}

	/// Returns true when a refresh exchange can be attempted.
	pub fn is_refreshable(&self) -> bool {
		self.refresh_token.is_some() && self.client.is_some()
	}

	/// Classifies freshness at `now`, treating anything within `skew` of expiry as expiring.
	pub fn state_at(&self, now: OffsetDateTime, skew: Duration) -> CredentialState {
		match self.expires_at {
			None => CredentialState::Valid,
			Some(exp) if now >= exp => CredentialState::Expired,
			Some(exp) if exp - now <= skew => CredentialState::Expiring,
			Some(_) => CredentialState::Valid,
		}
	}

	/// Returns true when the credential grants `scope`.
	pub fn has_scope(&self, scope: &str) -> bool {
		self.scopes.contains(scope)
	}

	/// Returns true when any granted scope allows reads.
	pub fn has_read_access(&self) -> bool {
		self.scopes.grants_read()
	}

	/// Returns true when any granted scope allows writes.
	pub fn has_write_access(&self) -> bool {
		self.scopes.grants_write()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialBuilder {
	access_token: String,
	refresh_token: Option<String>,
	client: Option<ClientCredentials>,
	expires_at: Option<OffsetDateTime>,
	scopes: Option<ScopeSet>,
	mechanism: Option<TokenMechanism>,
}
impl CredentialBuilder {
	fn new(access_token: impl Into<String>) -> Self {
		Self {
			access_token: access_token.into(),
			refresh_token: None,
			client: None,
			expires_at: None,
			scopes: None,
			mechanism: None,
		}
	}

	/// Sets the refresh token.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(token.into());

		self
	}

	/// Sets the OAuth client credentials.
	pub fn client(mut self, client: ClientCredentials) -> Self {
		self.client = Some(client);

		self
	}

	/// Sets an explicit expiry, overriding any decoded `exp` claim.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets the expiry relative to `issued_at`.
	pub fn expires_in(mut self, issued_at: OffsetDateTime, lifetime: Duration) -> Self {
		self.expires_at = Some(issued_at + lifetime);

		self
	}

	/// Sets explicit scopes, overriding decoded scopes.
	pub fn scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = Some(scopes);

		self
	}

	/// Sets the issuing mechanism (defaults to OAuth when a refresh token is present).
	pub fn mechanism(mut self, mechanism: TokenMechanism) -> Self {
		self.mechanism = Some(mechanism);

		self
	}

	/// Validates the inputs and returns the credential.
	pub fn build(self) -> Result<Credential, ConfigError> {
		let access_token = self.access_token.trim().to_owned();

		if access_token.is_empty() {
			return Err(ConfigError::MissingAccessToken);
		}

		// Opaque tokens simply carry no claims.
		let claims = claims::parse(&access_token).ok();
		let expires_at = self.expires_at.or_else(|| claims.as_ref().and_then(|c| c.expires_at));
		let scopes = self
			.scopes
			.or_else(|| claims.as_ref().map(|c| c.scopes.clone()))
			.unwrap_or_default();
		let mechanism = self.mechanism.unwrap_or(if self.refresh_token.is_some() {
			TokenMechanism::OAuth
		} else {
			TokenMechanism::PersonalAccessToken
		});

		Ok(Credential {
			access_token: Secret::new(access_token),
			refresh_token: self.refresh_token.filter(|t| !t.is_empty()).map(Secret::new),
			client: self.client,
			expires_at,
			scopes,
			claims,
			mechanism,
		})
	}
}
