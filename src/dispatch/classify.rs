// self
use crate::{
	_prelude::*,
	error::RateLimitOrigin,
	http::ResponseMetadata,
	response::ApiErrorBody,
};

/// What the retry loop does with one attempt's outcome.
#[derive(Debug)]
pub enum Classified {
	/// 2xx: hand the response to the caller.
	Success,
	/// Transient failure: retry after `retry_after` (or backoff) while attempts remain.
	Retryable {
		/// Error surfaced if no attempt remains.
		error: Error,
		/// Server-supplied wait, when present.
		retry_after: Option<Duration>,
	},
	/// 401: refresh the credential once and replay.
	Unauthorized {
		/// Server-supplied reason.
		message: String,
	},
	/// Anything else: surface immediately.
	Terminal(Error),
}
impl Classified {
	/// Classifies an HTTP response.
	pub fn response(status: u16, body: &[u8], metadata: &ResponseMetadata) -> Self {
		if (200..300).contains(&status) {
			return Self::Success;
		}

		let message = ApiErrorBody::message_for(body, status);

		match status {
			401 => Self::Unauthorized { message },
			403 => Self::Terminal(Error::Forbidden { message }),
			404 => Self::Terminal(Error::NotFound { message }),
			429 => Self::Retryable {
				error: Error::RateLimited {
					retry_after: metadata.retry_after,
					origin: RateLimitOrigin::Server,
					key: None,
				},
				retry_after: metadata.retry_after,
			},
			400..=499 => Self::Terminal(Error::Validation { status, message }),
			500..=599 => Self::Retryable {
				error: Error::Server { status, message },
				retry_after: metadata.retry_after,
			},
			_ => Self::Terminal(Error::UnexpectedStatus { status, message }),
		}
	}

	/// Classifies a failure that produced no response.
	pub fn transport(error: Error) -> Self {
		if error.is_retryable() {
			Self::Retryable { error, retry_after: None }
		} else {
			Self::Terminal(error)
		}
	}
}
