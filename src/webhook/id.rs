// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use ulid::Ulid;
// self
use crate::_prelude::*;

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when an envelope identifier fails validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("Envelope identifier cannot be empty.")]
	Empty,
	/// The identifier contains whitespace characters.
	#[error("Envelope identifier contains whitespace.")]
	ContainsWhitespace,
	/// The identifier exceeded the allowed character count.
	#[error("Envelope identifier exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Idempotency key of a webhook delivery, normally a ULID.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnvelopeId(String);
impl EnvelopeId {
	/// Creates an identifier after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let view = value.as_ref();

		validate_view(view)?;

		Ok(Self(view.to_owned()))
	}

	/// A fresh ULID identifier.
	pub fn generate() -> Self {
		Self(Ulid::new().to_string())
	}

	/// The identifier as a ULID, when it is one.
	pub fn ulid(&self) -> Option<Ulid> {
		Ulid::from_string(&self.0).ok()
	}

	/// Creation instant embedded in a ULID identifier.
	pub fn timestamp(&self) -> Option<OffsetDateTime> {
		let millis = self.ulid()?.timestamp_ms();

		OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
	}
}
impl Deref for EnvelopeId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for EnvelopeId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for EnvelopeId {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<EnvelopeId> for String {
	fn from(value: EnvelopeId) -> Self {
		value.0
	}
}
impl TryFrom<String> for EnvelopeId {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_view(&value)?;

		Ok(Self(value))
	}
}
impl FromStr for EnvelopeId {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for EnvelopeId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "EnvelopeId({})", self.0)
	}
}
impl Display for EnvelopeId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

fn validate_view(view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace);
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}
