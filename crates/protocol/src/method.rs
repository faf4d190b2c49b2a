//! HTTP methods accepted by the request gateway.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A method name outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported method: {0}")]
pub struct UnsupportedMethod(pub String);

/// The request methods the gateway knows how to issue.
///
/// Anything else is rejected while parsing, before a request reaches the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	Get,
	Put,
	Post,
	Delete,
}

impl Method {
	pub const ALL: [Method; 4] = [Method::Get, Method::Put, Method::Post, Method::Delete];

	pub fn as_str(&self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Put => "PUT",
			Method::Post => "POST",
			Method::Delete => "DELETE",
		}
	}
}

impl fmt::Display for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Method {
	type Err = UnsupportedMethod;

	/// Method names are matched case-insensitively.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Method::ALL
			.into_iter()
			.find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
			.ok_or_else(|| UnsupportedMethod(s.to_string()))
	}
}
