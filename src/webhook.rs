//! Inbound webhook verification and delivery de-duplication.
//!
//! Deliveries carry a hex HMAC-SHA256 of the raw body in the `Signature` header. [`verify`] checks
//! it in constant time; [`WebhookVerifier::accept`] additionally decodes the [`WebhookEnvelope`]
//! and consults a [`DeliveryLedger`] so each envelope id is processed at most once per retention
//! window.

mod id;
mod ledger;
mod signature;

pub use id::*;
pub use ledger::*;
pub use signature::*;

// self
use crate::{
	_prelude::*,
	auth::Secret,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "Signature";

/// Decoded webhook delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
	/// Idempotency key, normally a ULID.
	pub id: EnvelopeId,
	/// Event name such as `reservation.created`.
	pub action: String,
	/// Event payload.
	#[serde(default)]
	pub data: JsonValue,
	/// Creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created: OffsetDateTime,
	/// Payload schema version.
	#[serde(default)]
	pub version: Option<String>,
	/// Fields outside the known keys.
	#[serde(flatten)]
	pub extra: JsonMap<String, JsonValue>,
}
impl WebhookEnvelope {
	/// Decodes a raw body, reporting the JSON path of any mismatch.
	pub fn parse(payload: &[u8]) -> Result<Self, WebhookError> {
		let mut de = serde_json::Deserializer::from_slice(payload);

		Ok(serde_path_to_error::deserialize(&mut de)?)
	}
}

/// Verified delivery returned by [`WebhookVerifier::accept`].
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
	/// Decoded envelope.
	pub envelope: WebhookEnvelope,
	/// Whether the envelope id was already processed.
	pub duplicate: bool,
}

/// Errors produced while accepting a webhook delivery.
#[derive(Debug, ThisError)]
pub enum WebhookError {
	/// The signature did not match the payload.
	#[error("Webhook signature is invalid.")]
	InvalidSignature,
	/// The body is not a valid envelope.
	#[error("Webhook envelope is malformed: {0}.")]
	Envelope(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// The ledger failed.
	#[error(transparent)]
	Ledger(#[from] LedgerError),
}

/// Verifies signed deliveries and tracks processed envelope ids.
pub struct WebhookVerifier<L = MemoryLedger>
where
	L: ?Sized + DeliveryLedger,
{
	secret: Secret,
	ledger: Arc<L>,
}
impl WebhookVerifier<MemoryLedger> {
	/// Verifier backed by an in-memory ledger with the default retention.
	pub fn new(secret: impl Into<String>) -> Self {
		Self::with_ledger(secret, Arc::new(MemoryLedger::new()))
	}
}
impl<L> WebhookVerifier<L>
where
	L: ?Sized + DeliveryLedger,
{
	/// Verifier backed by `ledger`.
	pub fn with_ledger(secret: impl Into<String>, ledger: Arc<L>) -> Self {
		Self { secret: Secret::new(secret), ledger }
	}

	/// Ledger consulted for duplicates.
	pub fn ledger(&self) -> &Arc<L> {
		&self.ledger
	}

	/// Checks `signature` against `payload` with the configured secret.
	pub fn verify(&self, payload: &[u8], signature: &str) -> bool {
		verify(payload, signature, self.secret.expose().as_bytes())
	}

	/// Whether `id` was already processed.
	pub async fn is_duplicate(&self, id: &EnvelopeId) -> Result<bool, WebhookError> {
		Ok(self.ledger.is_duplicate(id).await?)
	}

	/// Records `id` as processed.
	pub async fn mark_processed(&self, id: &EnvelopeId) -> Result<(), WebhookError> {
		Ok(self.ledger.mark_processed(id).await?)
	}

	/// Verifies the signature, decodes the envelope, and reports whether it is a duplicate.
	///
	/// The id is not recorded; call [`Self::mark_processed`] once the delivery has been handled.
	pub async fn accept(&self, payload: &[u8], signature: &str) -> Result<Delivery, WebhookError> {
		const KIND: OpKind = OpKind::Webhook;

		let span = OpSpan::new(KIND, "accept");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.accept_inner(payload, signature)).await;

		match &result {
			Ok(Delivery { duplicate: false, .. }) =>
				obs::record_op_outcome(KIND, OpOutcome::Success),
			Ok(Delivery { envelope, .. }) => {
				let detail = format!("duplicate delivery {}", envelope.id);

				obs::record(KIND, OpOutcome::Denied, &detail);
			},
			Err(err @ WebhookError::InvalidSignature) => obs::record(KIND, OpOutcome::Denied, err),
			Err(err) => obs::record(KIND, OpOutcome::Failure, err),
		}

		result
	}

	async fn accept_inner(
		&self,
		payload: &[u8],
		signature: &str,
	) -> Result<Delivery, WebhookError> {
		if !self.verify(payload, signature) {
			return Err(WebhookError::InvalidSignature);
		}

		let envelope = WebhookEnvelope::parse(payload)?;
		let duplicate = self.is_duplicate(&envelope.id).await?;

		Ok(Delivery { envelope, duplicate })
	}
}
impl<L> Debug for WebhookVerifier<L>
where
	L: ?Sized + DeliveryLedger,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("WebhookVerifier").field("secret", &self.secret).finish_non_exhaustive()
	}
}
