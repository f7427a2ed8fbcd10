//! `/reservations/{uuid}/messages`: guest conversation.

// self
use crate::{
	_prelude::*,
	dispatch::Operation,
	endpoints::segment,
	rate_limit::{MESSAGES_GLOBAL, MESSAGES_PER_RESERVATION, RateKey},
};

/// Most images a single message may attach.
pub const MAX_IMAGES: usize = 3;

/// `GET /reservations/{uuid}/messages`.
pub fn list(reservation_uuid: &str) -> Result<Operation> {
	let uuid = segment("reservation uuid", reservation_uuid)?;

	Ok(Operation::get(format!("/reservations/{uuid}/messages")))
}

/// `POST /reservations/{uuid}/messages` with up to three image URLs.
///
/// Charged against both the per-reservation window (`messages:reservation:{uuid}`) and the
/// account-wide `messages:global` window.
pub fn send(reservation_uuid: &str, body: &str, images: &[String]) -> Result<Operation> {
	let uuid = segment("reservation uuid", reservation_uuid)?;

	if body.trim().is_empty() {
		return Err(Error::invalid_request("message body must not be empty"));
	}
	if images.len() > MAX_IMAGES {
		return Err(Error::invalid_request(format!(
			"message attaches {} images; at most {MAX_IMAGES} are allowed",
			images.len()
		)));
	}

	#[derive(Serialize)]
	struct Body<'a> {
		body: &'a str,
		#[serde(skip_serializing_if = "<[String]>::is_empty")]
		images: &'a [String],
	}

	let operation = Operation::post(format!("/reservations/{uuid}/messages"))
		.with_json(&Body { body, images })?
		.with_rate_key(RateKey::scoped(MESSAGES_PER_RESERVATION, uuid))
		.with_rate_key(RateKey::global(MESSAGES_GLOBAL));

	Ok(operation)
}
