//! `/reservations`: filtered listing and lookup.

// crates.io
use time::{Date, format_description::well_known::Rfc3339};
// self
use crate::{
	_prelude::*,
	dispatch::Operation,
	endpoints::{format_date, segment, with_include},
};

/// Which stay boundary `start_date` and `end_date` filter on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DateQuery {
	/// Filter on check-in dates.
	#[default]
	Checkin,
	/// Filter on check-out dates.
	Checkout,
}
impl DateQuery {
	/// Query-string value.
	pub const fn as_str(self) -> &'static str {
		match self {
			DateQuery::Checkin => "checkin",
			DateQuery::Checkout => "checkout",
		}
	}
}

/// Filters of `GET /reservations`; at least one property is required.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReservationQuery {
	/// Property uuids to search.
	pub properties: Vec<String>,
	/// Earliest date.
	pub start_date: Option<Date>,
	/// Latest date.
	pub end_date: Option<Date>,
	/// Boundary the dates apply to.
	pub date_query: DateQuery,
	/// Exact reservation code.
	pub platform_id: Option<String>,
	/// Exact conversation uuid.
	pub conversation_id: Option<String>,
	/// Only reservations with a message after this instant.
	pub last_message_at: Option<OffsetDateTime>,
	/// Relationships to include.
	pub include: Option<String>,
}
impl ReservationQuery {
	/// Reservations of `properties`.
	pub fn for_properties<I, S>(properties: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self { properties: properties.into_iter().map(Into::into).collect(), ..Default::default() }
	}

	/// Bounds the date range.
	pub fn between(mut self, start_date: Date, end_date: Date) -> Self {
		self.start_date = Some(start_date);
		self.end_date = Some(end_date);

		self
	}

	/// Applies the dates to check-in or check-out.
	pub fn date_query(mut self, date_query: DateQuery) -> Self {
		self.date_query = date_query;

		self
	}

	/// Matches one reservation code.
	pub fn platform_id(mut self, platform_id: impl Into<String>) -> Self {
		self.platform_id = Some(platform_id.into());

		self
	}

	/// Matches one conversation.
	pub fn conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
		self.conversation_id = Some(conversation_id.into());

		self
	}

	/// Only reservations with a message after `instant`.
	pub fn last_message_after(mut self, instant: OffsetDateTime) -> Self {
		self.last_message_at = Some(instant);

		self
	}

	/// Sets the relationships to include.
	pub fn include(mut self, include: impl Into<String>) -> Self {
		self.include = Some(include.into());

		self
	}
}

/// `GET /reservations`; each property is sent as a repeated `properties[]` parameter.
pub fn list(query: &ReservationQuery) -> Result<Operation> {
	if query.properties.is_empty() {
		return Err(Error::invalid_request("reservation search needs at least one property"));
	}

	let mut operation = Operation::get("/reservations");

	for property in &query.properties {
		operation = operation.with_query("properties[]", segment("property uuid", property)?);
	}
	if let Some(date) = query.start_date {
		operation = operation.with_query("start_date", format_date(date)?);
	}
	if let Some(date) = query.end_date {
		operation = operation.with_query("end_date", format_date(date)?);
	}

	operation = operation.with_query("date_query", query.date_query.as_str());

	if let Some(platform_id) = &query.platform_id {
		operation = operation.with_query("platform_id", platform_id);
	}
	if let Some(conversation_id) = &query.conversation_id {
		operation = operation.with_query("conversation_id", conversation_id);
	}
	if let Some(instant) = query.last_message_at {
		let formatted = instant.format(&Rfc3339).map_err(|err| {
			Error::invalid_request(format!("last_message_at cannot be formatted: {err}"))
		})?;

		operation = operation.with_query("last_message_at", formatted);
	}

	Ok(with_include(operation, query.include.as_deref()))
}

/// `GET /reservations/{uuid}`.
pub fn get(uuid: &str, include: Option<&str>) -> Result<Operation> {
	let path = format!("/reservations/{}", segment("reservation uuid", uuid)?);

	Ok(with_include(Operation::get(path), include))
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::{date, datetime};
	// self
	use super::*;

	#[test]
	fn properties_are_repeated_array_parameters() {
		let query = ReservationQuery::for_properties(["p-1", "p-2"])
			.between(date!(2025 - 03 - 01), date!(2025 - 03 - 31))
			.date_query(DateQuery::Checkout)
			.last_message_after(datetime!(2025-03-01 08:00 UTC))
			.include("guest");
		let op = list(&query).expect("Reservation query should be valid.");
		let properties: Vec<_> = op
			.query
			.iter()
			.filter(|(key, _)| key == "properties[]")
			.map(|(_, value)| value.as_str())
			.collect();

		assert_eq!(properties, ["p-1", "p-2"]);
		assert_eq!(op.query_value("date_query"), Some("checkout"));
		assert_eq!(op.query_value("end_date"), Some("2025-03-31"));
		assert_eq!(op.query_value("last_message_at"), Some("2025-03-01T08:00:00Z"));
		assert_eq!(op.query_value("include"), Some("guest"));
	}

	#[test]
	fn a_property_is_required() {
		assert!(matches!(
			list(&ReservationQuery::default()),
			Err(Error::InvalidRequest { .. })
		));
		assert_eq!(
			get("r-1", None).expect("Reservation uuid should be valid.").path,
			"/reservations/r-1"
		);
	}
}
