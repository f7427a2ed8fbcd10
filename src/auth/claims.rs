//! Offline decoding of self-describing (JWT) access tokens.
//!
//! Personal access tokens and OAuth access tokens issued by the platform are signed JWTs whose
//! payload carries the subject, granted scopes, and expiry. Decoding never verifies the signature
//! and never touches the network; it only extracts the claims needed to schedule refreshes and to
//! answer capability queries.

// crates.io
use base64::{
	Engine, alphabet,
	engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, ScopeValidationError},
};

const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
	&alphabet::URL_SAFE,
	GeneralPurposeConfig::new()
		.with_encode_padding(false)
		.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors raised while decoding a self-describing token.
#[derive(Debug, ThisError)]
pub enum TokenDecodeError {
	/// The token is not made of three dot-separated segments.
	#[error("Token must have 3 dot-separated segments, found {segments}.")]
	Malformed {
		/// Number of segments found.
		segments: usize,
	},
	/// The payload segment is not valid base64url.
	#[error("Token payload is not valid base64url.")]
	Base64(#[from] base64::DecodeError),
	/// The payload is not a JSON object with the expected claim types.
	#[error("Token payload is not valid claims JSON at `{}`.", .0.path())]
	Json(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// A timestamp claim is outside the representable range.
	#[error("Token claim `{claim}` holds an out-of-range timestamp: {value}.")]
	InvalidTimestamp {
		/// Claim name.
		claim: &'static str,
		/// Raw claim value.
		value: i64,
	},
	/// The scope claim contains an unusable entry.
	#[error("Token scopes are invalid.")]
	InvalidScope(#[from] ScopeValidationError),
}

/// Claims extracted from a self-describing token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenClaims {
	/// `sub`: the user or integration the token was issued to.
	pub subject: Option<String>,
	/// `aud`: intended audiences.
	pub audience: Vec<String>,
	/// `jti`: unique token identifier.
	pub token_id: Option<String>,
	/// `iat`: issuance instant.
	pub issued_at: Option<OffsetDateTime>,
	/// `nbf`: the token is not valid before this instant.
	pub not_before: Option<OffsetDateTime>,
	/// `exp`: expiry instant.
	pub expires_at: Option<OffsetDateTime>,
	/// Granted scopes from the `scopes` array or the space-delimited `scope` string.
	pub scopes: ScopeSet,
	/// Any claim not modeled above.
	pub extra: JsonMap<String, JsonValue>,
}
impl TokenClaims {
	/// Returns true when the token grants `scope`.
	pub fn has_scope(&self, scope: &str) -> bool {
		self.scopes.contains(scope)
	}

	/// Returns true when the token grants any read scope.
	pub fn has_read_access(&self) -> bool {
		self.scopes.grants_read()
	}

	/// Returns true when the token grants any write scope.
	pub fn has_write_access(&self) -> bool {
		self.scopes.grants_write()
	}

	/// Returns true once `instant` is at or past the expiry; tokens without `exp` never expire.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|exp| instant >= exp)
	}

	/// Remaining lifetime at `instant`, clamped at zero.
	pub fn time_until_expiry(&self, instant: OffsetDateTime) -> Option<Duration> {
		self.expires_at.map(|exp| (exp - instant).max(Duration::ZERO))
	}
}

#[derive(Deserialize)]
struct RawClaims {
	sub: Option<String>,
	#[serde(default)]
	aud: Option<Audience>,
	jti: Option<String>,
	iat: Option<i64>,
	nbf: Option<i64>,
	exp: Option<i64>,
	#[serde(default)]
	scopes: Option<Vec<String>>,
	#[serde(default)]
	scope: Option<String>,
	#[serde(flatten)]
	extra: JsonMap<String, JsonValue>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Audience {
	One(String),
	Many(Vec<String>),
}

/// Decodes the payload of a JWT-shaped token without verifying its signature.
pub fn parse(token: &str) -> Result<TokenClaims, TokenDecodeError> {
	let segments = token.trim().split('.').collect::<Vec<_>>();

	if segments.len() != 3 {
		return Err(TokenDecodeError::Malformed { segments: segments.len() });
	}

	let payload = PAYLOAD_ENGINE.decode(segments[1])?;
	let mut de = serde_json::Deserializer::from_slice(&payload);
	let raw: RawClaims = serde_path_to_error::deserialize(&mut de)?;
	let scopes = match (raw.scopes, raw.scope) {
		(Some(list), _) => ScopeSet::new(list)?,
		(None, Some(joined)) => ScopeSet::from_str(&joined)?,
		(None, None) => ScopeSet::default(),
	};
	let audience = match raw.aud {
		Some(Audience::One(aud)) => vec![aud],
		Some(Audience::Many(list)) => list,
		None => Vec::new(),
	};

	Ok(TokenClaims {
		subject: raw.sub,
		audience,
		token_id: raw.jti,
		issued_at: timestamp("iat", raw.iat)?,
		not_before: timestamp("nbf", raw.nbf)?,
		expires_at: timestamp("exp", raw.exp)?,
		scopes,
		extra: raw.extra,
	})
}

/// Returns true when `token` looks like a JWT (three non-empty dot-separated segments).
pub fn is_self_describing(token: &str) -> bool {
	let mut count = 0;

	for segment in token.trim().split('.') {
		if segment.is_empty() {
			return false;
		}

		count += 1;
	}

	count == 3
}

fn timestamp(
	claim: &'static str,
	value: Option<i64>,
) -> Result<Option<OffsetDateTime>, TokenDecodeError> {
	value
		.map(|secs| {
			OffsetDateTime::from_unix_timestamp(secs)
				.map_err(|_| TokenDecodeError::InvalidTimestamp { claim, value: secs })
		})
		.transpose()
}
