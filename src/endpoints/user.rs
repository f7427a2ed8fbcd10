//! `/user`: the authenticated account.

// self
use crate::dispatch::Operation;

/// `GET /user`: account and billing details of the token owner.
pub fn get() -> Operation {
	Operation::get("/user")
}
