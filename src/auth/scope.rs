//! Granted-scope modeling for credentials and decoded tokens.

// std
use std::{collections::BTreeSet, slice::Iter};
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeSeq};
// self
use crate::_prelude::*;

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Normalized, deduplicated, sorted set of granted scopes (`property:read`, `pat:write`, ...).
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeSet(Arc<[String]>);
impl ScopeSet {
	/// Creates a normalized scope set from any iterator.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		normalize(scopes).map(Self)
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if no scopes are granted.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns true if the set grants the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.0.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Returns true when any scope grants read access (`pat:read` or a `*:read` scope).
	pub fn grants_read(&self) -> bool {
		self.contains("pat:read") || self.iter().any(|scope| scope.contains("read"))
	}

	/// Returns true when any scope grants write access (`pat:write` or a `*:write` scope).
	pub fn grants_write(&self) -> bool {
		self.contains("pat:write") || self.iter().any(|scope| scope.contains("write"))
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(|s| s.as_str())
	}

	/// Returns the space-delimited representation used by OAuth token endpoints.
	pub fn normalized(&self) -> String {
		self.0.join(" ")
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.0).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl<'a> IntoIterator for &'a ScopeSet {
	type IntoIter = ScopeIter<'a>;
	type Item = &'a str;

	fn into_iter(self) -> Self::IntoIter {
		ScopeIter { inner: self.0.iter() }
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s.split_whitespace())
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut seq = serializer.serialize_seq(Some(self.0.len()))?;

		for scope in self.0.iter() {
			seq.serialize_element(scope)?;
		}

		seq.end()
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::new(values).map_err(DeError::custom)
	}
}

/// Iterator over scope strings.
pub struct ScopeIter<'a> {
	inner: Iter<'a, String>,
}
impl<'a> Iterator for ScopeIter<'a> {
	type Item = &'a str;

	fn next(&mut self) -> Option<Self::Item> {
		self.inner.next().map(|s| s.as_str())
	}
}

fn normalize<I, S>(scopes: I) -> Result<Arc<[String]>, ScopeValidationError>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	let mut set = BTreeSet::new();

	for scope in scopes {
		let owned: String = scope.into();

		if owned.is_empty() {
			return Err(ScopeValidationError::Empty);
		}
		if owned.chars().any(char::is_whitespace) {
			return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
		}

		set.insert(owned);
	}

	Ok(Arc::from(set.into_iter().collect::<Vec<_>>()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn scopes_normalize_and_deduplicate() {
		let lhs = ScopeSet::new(["property:read", "calendar:write", "property:read"])
			.expect("Left-hand scope set should be valid.");
		let rhs = ScopeSet::from_str("calendar:write property:read")
			.expect("Right-hand scope set should parse.");

		assert_eq!(lhs, rhs);
		assert_eq!(lhs.normalized(), "calendar:write property:read");
		assert!(lhs.contains("calendar:write"));
		assert!(!lhs.contains("message:write"));
	}

	#[test]
	fn scopes_reject_empty_and_padded_entries() {
		assert!(matches!(ScopeSet::new([""]), Err(ScopeValidationError::Empty)));
		assert!(matches!(
			ScopeSet::new([" pat:read "]),
			Err(ScopeValidationError::ContainsWhitespace { .. })
		));
		assert!(ScopeSet::from_str("").expect("Empty input is an empty set.").is_empty());
	}

	#[test]
	fn access_helpers_follow_scope_names() {
		let pat = ScopeSet::new(["pat:read"]).expect("PAT scope fixture should be valid.");

		assert!(pat.grants_read());
		assert!(!pat.grants_write());

		let oauth = ScopeSet::new(["message:write", "reservation:read"])
			.expect("OAuth scope fixture should be valid.");

		assert!(oauth.grants_read());
		assert!(oauth.grants_write());
		assert!(!ScopeSet::default().grants_read());
	}
}
