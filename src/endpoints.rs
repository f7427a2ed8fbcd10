//! Operation builders for the API's endpoint families.
//!
//! Builders only shape [`Operation`]s: path, query, JSON body, limiter keys and page-size ceilings.
//! Limits the API documents (60 calendar dates, 3 message images, 90-day searches) are enforced
//! here so oversized requests fail locally with [`Error::InvalidRequest`]. Response payloads are
//! left to the caller's `Deserialize` types.

pub mod calendar;
pub mod messages;
pub mod properties;
pub mod reservations;
pub mod reviews;
pub mod user;

// crates.io
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};
// self
use crate::{_prelude::*, dispatch::Operation};

const DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

// Identifiers are interpolated into paths verbatim, so separators are rejected.
fn segment<'a>(name: &str, value: &'a str) -> Result<&'a str> {
	if value.is_empty() {
		return Err(Error::invalid_request(format!("{name} must not be empty")));
	}
	if value.chars().any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%')) {
		return Err(Error::invalid_request(format!("{name} contains reserved characters")));
	}

	Ok(value)
}

fn with_include(operation: Operation, include: Option<&str>) -> Operation {
	match include.map(str::trim).filter(|include| !include.is_empty()) {
		Some(include) => operation.with_query("include", include),
		None => operation,
	}
}

fn format_date(date: Date) -> Result<String> {
	date.format(DATE_FORMAT)
		.map_err(|err| Error::invalid_request(format!("date {date} cannot be formatted: {err}")))
}
