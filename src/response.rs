//! API responses and the closed set of payload shapes the API returns.

// crates.io
use oauth2::http::{HeaderMap, StatusCode};
// self
use crate::{_prelude::*, http::ResponseMetadata};

/// Raw response returned by the dispatcher for a 2xx status.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw body bytes.
	pub body: Vec<u8>,
	/// Parsed rate-limit and retry metadata.
	pub metadata: ResponseMetadata,
}
impl ApiResponse {
	/// Decodes the body as `T`, reporting the JSON path of any mismatch.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		decode(&self.body, self.status)
	}

	/// Decodes the body into a [`Payload`]; empty bodies decode as `Data(null)`-like `None`.
	pub fn payload<T>(&self) -> Result<Option<Payload<T>>>
	where
		T: DeserializeOwned,
	{
		if self.body.iter().all(u8::is_ascii_whitespace) {
			return Ok(None);
		}

		self.json().map(Some)
	}
}

/// `{"data": ...}` envelope used by single-resource endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
	/// Resource payload.
	pub data: T,
	/// Fields outside `data`.
	#[serde(flatten)]
	pub extra: JsonMap<String, JsonValue>,
}

/// `{"data": [...], "meta": {...}, "links": {...}}` envelope used by list endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageEnvelope<T> {
	/// Items on this page.
	pub data: Vec<T>,
	/// Pagination metadata.
	#[serde(default)]
	pub meta: PageMeta,
	/// Navigation links.
	#[serde(default)]
	pub links: Option<JsonValue>,
	/// Fields outside the known keys.
	#[serde(flatten)]
	pub extra: JsonMap<String, JsonValue>,
}

/// Pagination metadata of a list response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
	/// Page number of this response.
	#[serde(default)]
	pub current_page: Option<u32>,
	/// 1-based index of the first item on this page.
	#[serde(default)]
	pub from: Option<u64>,
	/// Number of the last page.
	#[serde(default)]
	pub last_page: Option<u32>,
	/// Page size the server applied.
	#[serde(default)]
	pub per_page: Option<u32>,
	/// 1-based index of the last item on this page.
	#[serde(default)]
	pub to: Option<u64>,
	/// Total number of items across all pages.
	#[serde(default)]
	pub total: Option<u64>,
	/// Fields outside the known keys (including per-page `links`).
	#[serde(flatten)]
	pub extra: JsonMap<String, JsonValue>,
}

/// Error body `{status_code, reason_phrase, message}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
	/// Status code echoed by the server.
	#[serde(default)]
	pub status_code: Option<u16>,
	/// Reason phrase.
	#[serde(default)]
	pub reason_phrase: Option<String>,
	/// Human-readable message.
	#[serde(default)]
	pub message: Option<String>,
	/// Fields outside the known keys (validation details and the like).
	#[serde(flatten)]
	pub extra: JsonMap<String, JsonValue>,
}
impl ApiErrorBody {
	/// Parses an error body, ignoring bodies that are not JSON objects.
	pub fn parse(body: &[u8]) -> Option<Self> {
		serde_json::from_slice::<Self>(body).ok()
	}

	/// `"{message}. {reason_phrase}"` with dangling separators trimmed; `None` when both are empty.
	pub fn summary(&self) -> Option<String> {
		let joined = format!(
			"{}. {}",
			self.message.as_deref().unwrap_or_default(),
			self.reason_phrase.as_deref().unwrap_or_default()
		);
		let trimmed = joined.trim_matches(|c: char| c == '.' || c.is_whitespace());

		(!trimmed.is_empty()).then(|| trimmed.to_owned())
	}

	/// Message to surface for `status`: the body summary, else the canonical reason.
	pub fn message_for(body: &[u8], status: u16) -> String {
		Self::parse(body).and_then(|parsed| parsed.summary()).unwrap_or_else(|| {
			StatusCode::from_u16(status)
				.ok()
				.and_then(|code| code.canonical_reason())
				.unwrap_or("unknown status")
				.to_owned()
		})
	}
}

/// Closed set of payload shapes, decoded at the boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload<T> {
	/// List response.
	Page(PageEnvelope<T>),
	/// Single-resource response.
	Data(DataEnvelope<T>),
	/// Error response.
	Error(ApiErrorBody),
}

pub(crate) fn decode<T>(body: &[u8], status: u16) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut de)
		.map_err(|source| Error::ResponseDecode { source, status })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn error_message_joins_message_and_reason() {
		let body = br#"{"status_code":422,"reason_phrase":"Unprocessable Entity","message":"Too many"}"#;

		assert_eq!(ApiErrorBody::message_for(body, 422), "Too many. Unprocessable Entity");
		assert_eq!(
			ApiErrorBody::message_for(br#"{"message":"Missing scope."}"#, 403),
			"Missing scope"
		);
		assert_eq!(ApiErrorBody::message_for(b"<html>", 502), "Bad Gateway");
		assert_eq!(ApiErrorBody::message_for(b"{}", 418), "I'm a teapot");
	}

	#[test]
	fn payload_variants_decode_by_shape() {
		let page: Payload<JsonValue> = serde_json::from_str(
			r#"{"data":[{"id":"p1"}],"meta":{"current_page":1,"last_page":3,"per_page":1,"total":3,"links":[]},"links":{"next":null}}"#,
		)
		.expect("Page payload should decode.");

		match page {
			Payload::Page(envelope) => {
				assert_eq!(envelope.data.len(), 1);
				assert_eq!(envelope.meta.last_page, Some(3));
				assert!(envelope.meta.extra.contains_key("links"));
			},
			other => panic!("Unexpected payload: {other:?}."),
		}

		let data: Payload<JsonValue> =
			serde_json::from_str(r#"{"data":{"id":"u1"},"included":[]}"#)
				.expect("Data payload should decode.");

		assert!(matches!(
			data,
			Payload::Data(DataEnvelope { ref extra, .. }) if extra.contains_key("included")
		));

		let error: Payload<JsonValue> =
			serde_json::from_str(r#"{"status_code":404,"reason_phrase":"Not Found"}"#)
				.expect("Error payload should decode.");

		assert!(matches!(error, Payload::Error(ApiErrorBody { status_code: Some(404), .. })));
	}

	#[test]
	fn decode_errors_carry_the_json_path() {
		#[derive(Debug, Deserialize)]
		struct Property {
			#[allow(dead_code)]
			capacity: u32,
		}

		let err = decode::<DataEnvelope<Property>>(br#"{"data":{"capacity":"four"}}"#, 200)
			.expect_err("String capacity must fail.");

		assert!(err.to_string().contains("data.capacity"));
	}
}
