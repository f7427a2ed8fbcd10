//! Property reviews and host responses.

// self
use crate::{
	_prelude::*,
	dispatch::Operation,
	endpoints::{segment, with_include},
};

/// Largest page the reviews listing serves.
pub const MAX_REVIEWS_PAGE_SIZE: u32 = 50;

/// `GET /properties/{uuid}/reviews`, capped at 50 reviews per page.
pub fn list(property_uuid: &str, include: Option<&str>) -> Result<Operation> {
	let path = format!("/properties/{}/reviews", segment("property uuid", property_uuid)?);
	let operation = Operation::get(path).with_page_size_limit(MAX_REVIEWS_PAGE_SIZE);

	Ok(with_include(operation, include))
}

/// `POST /reviews/{uuid}/respond`; the API accepts one response per review.
pub fn respond(review_uuid: &str, response: &str) -> Result<Operation> {
	let uuid = segment("review uuid", review_uuid)?;

	if response.trim().is_empty() {
		return Err(Error::invalid_request("review response must not be empty"));
	}

	Ok(Operation::post(format!("/reviews/{uuid}/respond"))
		.with_json(&serde_json::json!({ "response": response }))?)
}
