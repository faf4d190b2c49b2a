//! [`HttpEngine`] backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use gatehouse_protocol::{BrowserProfile, Headers, Method};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use super::engine::{EngineError, HttpEngine, HttpRequest, RawResponse, error_chain};
use crate::error::{Error, Result};

/// Request engine presenting a browser profile through an optional proxy.
#[derive(Debug, Clone)]
pub struct ReqwestEngine {
	client: reqwest::Client,
	profile: BrowserProfile,
}

impl ReqwestEngine {
	/// Builds the underlying client.
	///
	/// A [`BrowserProfile::Randomized`] profile is resolved here, once, so every
	/// request from this engine presents the same identity.
	pub fn new(profile: BrowserProfile, proxy: Option<&str>, timeout: Duration) -> Result<Self> {
		let profile = profile.resolve();

		let mut builder = reqwest::Client::builder()
			.default_headers(to_header_map(&profile.default_headers())?)
			.timeout(timeout);
		if let Some(user_agent) = profile.user_agent() {
			builder = builder.user_agent(user_agent);
		}
		if let Some(proxy) = proxy {
			let proxy = reqwest::Proxy::all(proxy).map_err(|e| Error::Configuration(format!("invalid request proxy '{proxy}': {e}")))?;
			builder = builder.proxy(proxy);
		}

		let client = builder
			.build()
			.map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", error_chain(&e))))?;

		debug!(target = "gatehouse.http", %profile, proxied = proxy.is_some(), "request engine ready");
		Ok(Self { client, profile })
	}

	/// The concrete profile this engine presents.
	pub fn profile(&self) -> BrowserProfile {
		self.profile
	}
}

#[async_trait]
impl HttpEngine for ReqwestEngine {
	async fn perform(&self, request: &HttpRequest) -> std::result::Result<RawResponse, EngineError> {
		let method = match request.method {
			Method::Get => reqwest::Method::GET,
			Method::Put => reqwest::Method::PUT,
			Method::Post => reqwest::Method::POST,
			Method::Delete => reqwest::Method::DELETE,
		};

		let mut builder = self.client.request(method, &request.url);
		for (name, value) in request.headers.iter() {
			builder = builder.header(name, value);
		}
		if let Some(body) = &request.body {
			builder = builder.body(body.clone());
		}

		let response = builder.send().await.map_err(engine_error)?;
		let status = response.status().as_u16();
		let headers = response
			.headers()
			.iter()
			.filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
			.fold(Headers::new(), |mut acc, (name, value)| {
				acc.append(name, value);
				acc
			});
		let body = response
			.bytes()
			.await
			.map_err(|e| engine_error(e).with_status(status))?;

		Ok(RawResponse {
			status,
			headers,
			body: body.to_vec(),
		})
	}
}

fn engine_error(err: reqwest::Error) -> EngineError {
	let error = EngineError::new(error_chain(&err));
	match err.status() {
		Some(status) => error.with_status(status.as_u16()),
		None => error,
	}
}

fn to_header_map(headers: &Headers) -> Result<HeaderMap> {
	let mut map = HeaderMap::new();
	for (name, value) in headers.iter() {
		let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::Configuration(format!("invalid header name '{name}': {e}")))?;
		let value = HeaderValue::from_str(value).map_err(|e| Error::Configuration(format!("invalid header value for '{name}': {e}")))?;
		map.append(name, value);
	}
	Ok(map)
}
