//! The duplex engine seam.
//!
//! A [`SocketEngine`] performs the handshake and hands back two independently
//! owned halves: a [`FrameSink`] for writes and a [`FrameSource`] for reads.
//! Sessions own the halves exclusively; nothing else touches them.

use async_trait::async_trait;
use gatehouse_protocol::Headers;

use crate::http::EngineError;

/// A data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
	Text(String),
	Binary(Vec<u8>),
}

impl Frame {
	pub fn as_bytes(&self) -> &[u8] {
		match self {
			Frame::Text(text) => text.as_bytes(),
			Frame::Binary(bytes) => bytes,
		}
	}

	pub fn as_text(&self) -> Option<&str> {
		match self {
			Frame::Text(text) => Some(text),
			Frame::Binary(_) => None,
		}
	}

	pub fn len(&self) -> usize {
		self.as_bytes().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Decodes the payload as JSON, whichever frame kind carried it.
	pub fn json<T: serde::de::DeserializeOwned>(&self) -> crate::error::Result<T> {
		serde_json::from_slice(self.as_bytes()).map_err(crate::error::Error::Decode)
	}
}

impl From<String> for Frame {
	fn from(text: String) -> Self {
		Frame::Text(text)
	}
}

impl From<&str> for Frame {
	fn from(text: &str) -> Self {
		Frame::Text(text.to_string())
	}
}

impl From<Vec<u8>> for Frame {
	fn from(bytes: Vec<u8>) -> Self {
		Frame::Binary(bytes)
	}
}

/// Something read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
	Frame(Frame),
	/// Reply to one of our pings.
	Pong,
	/// The peer pinged us; engines answer these themselves.
	Ping,
}

/// Everything needed to open one duplex connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialRequest {
	pub url: String,
	pub headers: Headers,
	/// Duplex proxy; never inherited from the request proxy.
	pub proxy: Option<String>,
	pub compression: bool,
}

impl DialRequest {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			headers: Headers::new(),
			proxy: None,
			compression: false,
		}
	}

	pub fn with_headers(mut self, headers: Headers) -> Self {
		self.headers = headers;
		self
	}

	pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
		self.proxy = proxy;
		self
	}

	pub fn with_compression(mut self, enabled: bool) -> Self {
		self.compression = enabled;
		self
	}
}

/// Write half of a dialed socket.
#[async_trait]
pub trait FrameSink: Send {
	async fn send(&mut self, frame: Frame) -> Result<(), EngineError>;

	async fn ping(&mut self) -> Result<(), EngineError>;

	/// Sends a close frame and shuts the write side down.
	async fn close(&mut self) -> Result<(), EngineError>;
}

/// Read half of a dialed socket.
#[async_trait]
pub trait FrameSource: Send {
	/// Next inbound item; `Ok(None)` once the peer has closed cleanly.
	async fn next(&mut self) -> Result<Option<Inbound>, EngineError>;
}

/// A completed handshake.
pub struct DialedSocket {
	pub sink: Box<dyn FrameSink>,
	pub source: Box<dyn FrameSource>,
	/// Response headers from the upgrade.
	pub handshake_headers: Headers,
}

impl std::fmt::Debug for DialedSocket {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DialedSocket")
			.field("handshake_headers", &self.handshake_headers)
			.finish_non_exhaustive()
	}
}

/// Opens duplex connections.
#[async_trait]
pub trait SocketEngine: Send + Sync {
	async fn dial(&self, request: &DialRequest) -> Result<DialedSocket, EngineError>;
}
