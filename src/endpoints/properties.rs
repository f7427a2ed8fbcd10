//! `/properties`: listing, lookup, and availability search.

// crates.io
use time::Date;
// self
use crate::{
	_prelude::*,
	dispatch::Operation,
	endpoints::{format_date, segment, with_include},
};

/// Longest stay a search may cover.
pub const MAX_SEARCH_NIGHTS: i64 = 90;

/// `GET /properties`; iterate it with the paginator (100 items per page at most).
pub fn list(include: Option<&str>) -> Operation {
	with_include(Operation::get("/properties"), include)
}

/// `GET /properties/{uuid}`.
pub fn get(uuid: &str, include: Option<&str>) -> Result<Operation> {
	let path = format!("/properties/{}", segment("property uuid", uuid)?);

	Ok(with_include(Operation::get(path), include))
}

/// Coordinates narrowing an availability search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Location {
	/// Latitude in degrees.
	pub latitude: f64,
	/// Longitude in degrees.
	pub longitude: f64,
}

/// Parameters of `GET /properties/search`.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchQuery {
	/// Check-in date.
	pub start_date: Date,
	/// Check-out date.
	pub end_date: Date,
	/// Number of adults (at least one).
	pub adults: u32,
	/// Number of children.
	pub children: Option<u32>,
	/// Number of infants.
	pub infants: Option<u32>,
	/// Number of pets.
	pub pets: Option<u32>,
	/// Search area.
	pub location: Option<Location>,
	/// Relationships to include.
	pub include: Option<String>,
}
impl SearchQuery {
	/// Search for `adults` guests between two dates.
	pub fn new(start_date: Date, end_date: Date, adults: u32) -> Self {
		Self {
			start_date,
			end_date,
			adults,
			children: None,
			infants: None,
			pets: None,
			location: None,
			include: None,
		}
	}

	/// Sets the number of children.
	pub fn children(mut self, children: u32) -> Self {
		self.children = Some(children);

		self
	}

	/// Sets the number of infants.
	pub fn infants(mut self, infants: u32) -> Self {
		self.infants = Some(infants);

		self
	}

	/// Sets the number of pets.
	pub fn pets(mut self, pets: u32) -> Self {
		self.pets = Some(pets);

		self
	}

	/// Narrows the search to `location`.
	pub fn location(mut self, latitude: f64, longitude: f64) -> Self {
		self.location = Some(Location { latitude, longitude });

		self
	}

	/// Sets the relationships to include.
	pub fn include(mut self, include: impl Into<String>) -> Self {
		self.include = Some(include.into());

		self
	}
}

/// `GET /properties/search`; stays must be 1 to 90 nights and include an adult.
pub fn search(query: &SearchQuery) -> Result<Operation> {
	let nights = (query.end_date - query.start_date).whole_days();

	if nights < 1 {
		return Err(Error::invalid_request("end_date must be after start_date"));
	}
	if nights > MAX_SEARCH_NIGHTS {
		return Err(Error::invalid_request(format!(
			"search period of {nights} nights exceeds {MAX_SEARCH_NIGHTS}"
		)));
	}
	if query.adults == 0 {
		return Err(Error::invalid_request("at least one adult is required"));
	}

	let mut operation = Operation::get("/properties/search")
		.with_query("start_date", format_date(query.start_date)?)
		.with_query("end_date", format_date(query.end_date)?)
		.with_query("adults", query.adults);
	let guests = [("children", query.children), ("infants", query.infants), ("pets", query.pets)];

	for (key, count) in guests {
		if let Some(count) = count {
			operation = operation.with_query(key, count);
		}
	}
	if let Some(location) = query.location {
		operation = operation
			.with_query("location[latitude]", location.latitude)
			.with_query("location[longitude]", location.longitude);
	}

	Ok(with_include(operation, query.include.as_deref()))
}
