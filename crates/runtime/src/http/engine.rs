//! The request engine seam.
//!
//! An [`HttpEngine`] performs exactly one attempt and reports either a
//! response (any status) or the absence of one. Retries, gating and status
//! classification all live above this trait.

use async_trait::async_trait;
use gatehouse_protocol::{Headers, Method};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::error::{Error, Result};

/// One attempt's worth of request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
	pub method: Method,
	pub url: String,
	pub headers: Headers,
	pub body: Option<Vec<u8>>,
}

impl HttpRequest {
	pub fn new(method: Method, url: impl Into<String>) -> Self {
		Self {
			method,
			url: url.into(),
			headers: Headers::new(),
			body: None,
		}
	}

	pub fn with_headers(mut self, headers: Headers) -> Self {
		self.headers = headers;
		self
	}

	pub fn with_body(mut self, body: Vec<u8>) -> Self {
		self.body = Some(body);
		self
	}

	/// Serializes `payload` as the JSON body and sets the content type.
	pub fn with_json<T: serde::Serialize + ?Sized>(mut self, payload: &T) -> Result<Self> {
		self.body = Some(serde_json::to_vec(payload)?);
		if !self.headers.contains("content-type") {
			self.headers.insert("content-type", "application/json");
		}
		Ok(self)
	}

	/// Host portion of the URL, for diagnostics.
	pub fn host(&self) -> String {
		url::Url::parse(&self.url)
			.ok()
			.and_then(|u| u.host_str().map(str::to_string))
			.unwrap_or_default()
	}
}

/// A response as received, body fully buffered and undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
	pub status: u16,
	pub headers: Headers,
	pub body: Vec<u8>,
}

impl RawResponse {
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self {
			status,
			headers: Headers::new(),
			body: body.into(),
		}
	}

	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Whether the status classifies the response as a failure (4xx or 5xx).
	pub fn is_error_state(&self) -> bool {
		self.status >= 400
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name)
	}

	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the body as JSON. A blank body decodes as `null`.
	pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
		if self.body.iter().all(u8::is_ascii_whitespace) {
			return serde_json::from_value(serde_json::Value::Null).map_err(Error::Decode);
		}
		serde_json::from_slice(&self.body).map_err(Error::Decode)
	}
}

/// The engine could not produce a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
	pub message: String,
	/// Status line seen before the failure, e.g. when the body read broke.
	pub status: Option<u16>,
}

impl EngineError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			status: None,
		}
	}

	pub fn with_status(mut self, status: u16) -> Self {
		self.status = Some(status);
		self
	}
}

/// Performs a single request attempt.
#[async_trait]
pub trait HttpEngine: Send + Sync {
	async fn perform(&self, request: &HttpRequest) -> std::result::Result<RawResponse, EngineError>;
}

/// Flattens an error and its sources into one line.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
	let mut message = err.to_string();
	let mut source = err.source();
	while let Some(cause) = source {
		let text = cause.to_string();
		if !message.contains(&text) {
			message.push_str(": ");
			message.push_str(&text);
		}
		source = cause.source();
	}
	message
}
