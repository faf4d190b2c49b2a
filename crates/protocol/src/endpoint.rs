//! Base URL, endpoint, and query-string helpers.

use std::collections::BTreeMap;

use url::form_urlencoded;

/// Canonical form of a client base URL.
///
/// Trailing slashes are dropped and `https://` is prepended when the input
/// does not already start with `http`.
pub fn normalize_base_url(url: &str) -> String {
	let trimmed = url.trim().trim_end_matches('/');
	if trimmed.starts_with("http") {
		trimmed.to_string()
	} else {
		format!("https://{trimmed}")
	}
}

/// Joins an endpoint onto a normalized base URL.
pub fn join_endpoint(base: &str, endpoint: &str) -> String {
	format!("{}/{}", base.trim_end_matches('/'), endpoint.trim_start_matches('/'))
}

/// A query parameter value: one scalar or a list encoded as `key[]` repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
	Scalar(String),
	List(Vec<String>),
}

impl From<&str> for QueryValue {
	fn from(value: &str) -> Self {
		QueryValue::Scalar(value.to_string())
	}
}

impl From<String> for QueryValue {
	fn from(value: String) -> Self {
		QueryValue::Scalar(value)
	}
}

impl From<Vec<String>> for QueryValue {
	fn from(values: Vec<String>) -> Self {
		QueryValue::List(values)
	}
}

impl From<Vec<&str>> for QueryValue {
	fn from(values: Vec<&str>) -> Self {
		QueryValue::List(values.into_iter().map(str::to_string).collect())
	}
}

macro_rules! scalar_query_value {
	($($ty:ty),*) => {
		$(impl From<$ty> for QueryValue {
			fn from(value: $ty) -> Self {
				QueryValue::Scalar(value.to_string())
			}
		})*
	};
}

scalar_query_value!(bool, i32, i64, u32, u64, usize, f64);

/// Encodes parameters as an `application/x-www-form-urlencoded` query.
///
/// Keys come out sorted. Returns an empty string for no parameters.
pub fn build_query_string(params: &BTreeMap<String, QueryValue>) -> String {
	if params.is_empty() {
		return String::new();
	}

	let mut serializer = form_urlencoded::Serializer::new(String::new());
	for (key, value) in params {
		match value {
			QueryValue::Scalar(v) => {
				serializer.append_pair(key, v);
			}
			QueryValue::List(items) => {
				let list_key = format!("{key}[]");
				for item in items {
					serializer.append_pair(&list_key, item);
				}
			}
		}
	}
	serializer.finish()
}
