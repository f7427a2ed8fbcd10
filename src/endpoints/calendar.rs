//! `/properties/{uuid}/calendar`: pricing and availability.

// crates.io
use time::Date;
// self
use crate::{
	_prelude::*,
	dispatch::Operation,
	endpoints::{format_date, iso_date, segment},
	rate_limit::{CALENDAR_UPDATE, RateKey},
};

/// Most dates a single update may carry.
pub const MAX_UPDATE_DATES: usize = 60;

/// Nightly price in the currency's base units (cents).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
	/// Amount in base units.
	pub amount: i64,
}

/// One date of a calendar update; unset fields are left unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDay {
	/// Date being updated.
	#[serde(with = "iso_date")]
	pub date: Date,
	/// New nightly price.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub price: Option<Price>,
	/// Whether the date can be booked.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub available: Option<bool>,
	/// Minimum stay in nights.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub min_stay: Option<u32>,
	/// Whether check-in is closed on this date.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub closed_for_checkin: Option<bool>,
	/// Whether check-out is closed on this date.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub closed_for_checkout: Option<bool>,
}
impl CalendarDay {
	/// An update for `date` that changes nothing yet.
	pub fn new(date: Date) -> Self {
		Self {
			date,
			price: None,
			available: None,
			min_stay: None,
			closed_for_checkin: None,
			closed_for_checkout: None,
		}
	}

	/// Sets the nightly price in base units.
	pub fn price(mut self, amount: i64) -> Self {
		self.price = Some(Price { amount });

		self
	}

	/// Opens or blocks the date.
	pub fn available(mut self, available: bool) -> Self {
		self.available = Some(available);

		self
	}

	/// Sets the minimum stay.
	pub fn min_stay(mut self, nights: u32) -> Self {
		self.min_stay = Some(nights);

		self
	}

	/// Closes or reopens check-in.
	pub fn closed_for_checkin(mut self, closed: bool) -> Self {
		self.closed_for_checkin = Some(closed);

		self
	}

	/// Closes or reopens check-out.
	pub fn closed_for_checkout(mut self, closed: bool) -> Self {
		self.closed_for_checkout = Some(closed);

		self
	}
}

/// `GET /properties/{uuid}/calendar`, optionally bounded by dates.
pub fn get(uuid: &str, start_date: Option<Date>, end_date: Option<Date>) -> Result<Operation> {
	let mut operation =
		Operation::get(format!("/properties/{}/calendar", segment("property uuid", uuid)?));

	if let Some(date) = start_date {
		operation = operation.with_query("start_date", format_date(date)?);
	}
	if let Some(date) = end_date {
		operation = operation.with_query("end_date", format_date(date)?);
	}

	Ok(operation)
}

/// `PUT /properties/{uuid}/calendar` with 1 to 60 dates, charged against `calendar:update`.
pub fn update(uuid: &str, dates: &[CalendarDay]) -> Result<Operation> {
	if dates.is_empty() {
		return Err(Error::invalid_request("calendar update needs at least one date"));
	}
	if dates.len() > MAX_UPDATE_DATES {
		return Err(Error::invalid_request(format!(
			"calendar update carries {} dates; at most {MAX_UPDATE_DATES} are allowed",
			dates.len()
		)));
	}

	#[derive(Serialize)]
	struct Body<'a> {
		dates: &'a [CalendarDay],
	}

	let path = format!("/properties/{}/calendar", segment("property uuid", uuid)?);
	let operation = Operation::put(path)
		.with_json(&Body { dates })?
		.with_rate_key(RateKey::global(CALENDAR_UPDATE));

	Ok(operation)
}
