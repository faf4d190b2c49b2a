//! Browser profiles presented by the HTTP engine.
//!
//! A profile is the identity the client announces: user agent and the
//! default request headers a real browser of that family sends. It is picked
//! once when a client is constructed and injected into the engine; nothing in
//! the runtime branches on it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::headers::Headers;

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const SAFARI_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15";
const FIREFOX_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserProfile {
	Chrome,
	Safari,
	Firefox,
	/// Resolved to one of the concrete profiles at random when applied.
	#[default]
	Randomized,
}

impl BrowserProfile {
	const CONCRETE: [BrowserProfile; 3] = [BrowserProfile::Chrome, BrowserProfile::Safari, BrowserProfile::Firefox];

	/// Picks one of the concrete browser profiles uniformly.
	pub fn random() -> Self {
		Self::CONCRETE[rand::random_range(0..Self::CONCRETE.len())]
	}

	/// Returns a concrete profile, drawing one if this is [`Randomized`](Self::Randomized).
	pub fn resolve(self) -> Self {
		match self {
			BrowserProfile::Randomized => Self::random(),
			other => other,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			BrowserProfile::Chrome => "chrome",
			BrowserProfile::Safari => "safari",
			BrowserProfile::Firefox => "firefox",
			BrowserProfile::Randomized => "randomized",
		}
	}

	/// User agent for a concrete profile; `None` for [`Randomized`](Self::Randomized).
	pub fn user_agent(&self) -> Option<&'static str> {
		match self {
			BrowserProfile::Chrome => Some(CHROME_UA),
			BrowserProfile::Safari => Some(SAFARI_UA),
			BrowserProfile::Firefox => Some(FIREFOX_UA),
			BrowserProfile::Randomized => None,
		}
	}

	/// Default headers sent with every request under this profile.
	pub fn default_headers(&self) -> Headers {
		let mut headers = Headers::new();
		match self {
			BrowserProfile::Chrome => {
				headers.insert("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8");
				headers.insert("accept-language", "en-US,en;q=0.9");
				headers.insert("sec-ch-ua", "\"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\"");
				headers.insert("sec-ch-ua-mobile", "?0");
				headers.insert("sec-ch-ua-platform", "\"Windows\"");
			}
			BrowserProfile::Safari => {
				headers.insert("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8");
				headers.insert("accept-language", "en-US,en;q=0.9");
			}
			BrowserProfile::Firefox => {
				headers.insert("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8");
				headers.insert("accept-language", "en-US,en;q=0.5");
				headers.insert("upgrade-insecure-requests", "1");
			}
			BrowserProfile::Randomized => {}
		}
		headers
	}
}

impl fmt::Display for BrowserProfile {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for BrowserProfile {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"chrome" => Ok(BrowserProfile::Chrome),
			"safari" => Ok(BrowserProfile::Safari),
			"firefox" => Ok(BrowserProfile::Firefox),
			"random" | "randomized" => Ok(BrowserProfile::Randomized),
			other => Err(format!("unknown browser profile: {other}")),
		}
	}
}
