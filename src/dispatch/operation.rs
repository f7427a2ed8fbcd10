// crates.io
use oauth2::http::Method;
// self
use crate::{_prelude::*, error::ConfigError, rate_limit::RateKey};

/// Largest page size the API accepts.
pub const MAX_PAGE_SIZE: u32 = 100;
/// Page size requested when an operation does not specify one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// One logical API call: replayed verbatim on every retry.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the API base URL.
	pub path: String,
	/// Query parameters in send order; repeated keys are allowed.
	pub query: Vec<(String, String)>,
	/// JSON body.
	pub body: Option<JsonValue>,
	/// Limiter keys charged before each attempt.
	pub rate_keys: Vec<RateKey>,
	/// Endpoint-specific page size ceiling (below [`MAX_PAGE_SIZE`]).
	pub page_size_limit: Option<u32>,
}
impl Operation {
	/// Creates an operation without query, body, or limiter keys.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			body: None,
			rate_keys: Vec::new(),
			page_size_limit: None,
		}
	}

	/// `GET path`.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// `POST path`.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// `PUT path`.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// `PATCH path`.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// `DELETE path`.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Appends a query parameter, keeping earlier values of the same key.
	pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
		self.query.push((key.into(), value.to_string()));

		self
	}

	/// Appends every `(key, value)` pair.
	pub fn with_query_pairs<I, K, V>(mut self, pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: ToString,
	{
		self.query.extend(pairs.into_iter().map(|(key, value)| (key.into(), value.to_string())));

		self
	}

	/// Replaces every value of `key` with a single `value`.
	pub fn set_query(&mut self, key: &str, value: impl ToString) {
		self.query.retain(|(existing, _)| existing != key);
		self.query.push((key.to_owned(), value.to_string()));
	}

	/// First value of `key`.
	pub fn query_value(&self, key: &str) -> Option<&str> {
		self.query.iter().find(|(existing, _)| existing == key).map(|(_, value)| value.as_str())
	}

	/// Sets a JSON body.
	pub fn with_body(mut self, body: JsonValue) -> Self {
		self.body = Some(body);

		self
	}

	/// Serializes `body` as the JSON body.
	pub fn with_json<T>(self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let value = serde_json::to_value(body).map_err(ConfigError::RequestBody)?;

		Ok(self.with_body(value))
	}

	/// Charges `key` before each attempt.
	pub fn with_rate_key(mut self, key: RateKey) -> Self {
		self.rate_keys.push(key);

		self
	}

	/// Caps page sizes for this endpoint.
	pub fn with_page_size_limit(mut self, limit: u32) -> Self {
		self.page_size_limit = Some(limit.clamp(1, MAX_PAGE_SIZE));

		self
	}

	/// Largest page size accepted by this endpoint.
	pub fn max_page_size(&self) -> u32 {
		self.page_size_limit.unwrap_or(MAX_PAGE_SIZE)
	}

	/// Sets `page`.
	pub fn with_page(mut self, page: u32) -> Self {
		self.set_query("page", page.max(1));

		self
	}

	/// Sets `per_page`, clamped to `1..=max_page_size()`.
	pub fn with_per_page(mut self, per_page: u32) -> Self {
		let clamped = per_page.clamp(1, self.max_page_size());

		self.set_query("per_page", clamped);

		self
	}
}

/// One attempt of an [`Operation`], used to schedule the next one.
#[derive(Clone, Copy, Debug)]
pub struct RequestAttempt<'a> {
	/// Operation being sent.
	pub operation: &'a Operation,
	/// 1-based attempt number.
	pub number: u32,
	/// Failure of the previous attempt.
	pub previous_error: Option<&'a Error>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn page_size_is_clamped_to_endpoint_limit() {
		let reviews = Operation::get("/properties/p1/reviews").with_page_size_limit(50);

		assert_eq!(reviews.clone().with_per_page(500).query_value("per_page"), Some("50"));
		assert_eq!(reviews.with_per_page(0).query_value("per_page"), Some("1"));
		assert_eq!(
			Operation::get("/properties").with_per_page(250).query_value("per_page"),
			Some("100")
		);
	}

	#[test]
	fn set_query_replaces_and_with_query_appends() {
		let mut op = Operation::get("/reservations")
			.with_query("properties[]", "a")
			.with_query("properties[]", "b")
			.with_page(1);

		op.set_query("page", 2);

		assert_eq!(op.query.iter().filter(|(key, _)| key == "properties[]").count(), 2);
		assert_eq!(op.query_value("page"), Some("2"));
		assert_eq!(op.query.iter().filter(|(key, _)| key == "page").count(), 1);
	}
}
