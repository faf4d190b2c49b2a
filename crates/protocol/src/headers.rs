//! Ordered, case-insensitive header list.

use serde::{Deserialize, Serialize};

/// Request or response headers.
///
/// Names compare case-insensitively and insertion order is kept, which is all
/// the engines need to build their own header maps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets `name` to `value`, replacing every existing entry with that name.
	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();
		self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
		self.0.push((name, value.into()));
	}

	/// Adds an entry without touching existing ones with the same name.
	pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.0.push((name.into(), value.into()));
	}

	/// First value stored under `name`.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.0.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
	}

	pub fn contains(&self, name: &str) -> bool {
		self.get(name).is_some()
	}

	pub fn remove(&mut self, name: &str) {
		self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
	}

	/// Parses a `Name: value` line as typed on a command line.
	pub fn parse_line(line: &str) -> Option<(String, String)> {
		let (name, value) = line.split_once(':')?;
		let name = name.trim();
		if name.is_empty() {
			return None;
		}
		Some((name.to_string(), value.trim().to_string()))
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut headers = Headers::new();
		for (name, value) in iter {
			headers.insert(name, value);
		}
		headers
	}
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Headers {
	fn from(pairs: [(K, V); N]) -> Self {
		pairs.into_iter().collect()
	}
}

impl IntoIterator for Headers {
	type Item = (String, String);
	type IntoIter = std::vec::IntoIter<(String, String)>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}
