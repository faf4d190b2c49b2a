//! [`SocketEngine`] backed by `tokio-tungstenite`.
//!
//! Dials directly, or through an HTTP proxy using a `CONNECT` tunnel with
//! optional basic credentials taken from the proxy URL.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use gatehouse_protocol::Headers;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::{Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use super::transport::{DialRequest, DialedSocket, Frame, FrameSink, FrameSource, Inbound, SocketEngine};
use crate::http::{EngineError, error_chain};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const MAX_PROXY_RESPONSE: usize = 8 * 1024;

/// WebSocket engine over tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteEngine {
	connect_timeout: Option<Duration>,
}

impl TungsteniteEngine {
	pub fn new() -> Self {
		Self::default()
	}

	/// Bounds the whole handshake, proxy tunnel included.
	pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
		self.connect_timeout = Some(timeout);
		self
	}

	async fn connect(&self, request: &DialRequest) -> Result<(WsStream, Response), EngineError> {
		let handshake = build_request(request)?;
		if request.compression {
			debug!(target = "gatehouse.session", url = %request.url, "per-message compression unavailable, dialing uncompressed");
		}

		match request.proxy.as_deref() {
			None => tokio_tungstenite::connect_async_with_config(handshake, None, false)
				.await
				.map_err(|e| EngineError::new(error_chain(&e))),
			Some(proxy) => {
				let stream = tunnel(proxy, &request.url).await?;
				tokio_tungstenite::client_async_tls_with_config(handshake, stream, None, None)
					.await
					.map_err(|e| EngineError::new(error_chain(&e)))
			}
		}
	}
}

#[async_trait]
impl SocketEngine for TungsteniteEngine {
	async fn dial(&self, request: &DialRequest) -> Result<DialedSocket, EngineError> {
		let (stream, response) = match self.connect_timeout {
			Some(limit) => tokio::time::timeout(limit, self.connect(request))
				.await
				.map_err(|_| EngineError::new(format!("handshake timed out after {limit:?}")))??,
			None => self.connect(request).await?,
		};

		let handshake_headers = response
			.headers()
			.iter()
			.filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
			.fold(Headers::new(), |mut acc, (name, value)| {
				acc.append(name, value);
				acc
			});

		let (write, read) = stream.split();
		debug!(target = "gatehouse.session", url = %request.url, status = response.status().as_u16(), "handshake complete");
		Ok(DialedSocket {
			sink: Box::new(WsSink { write }),
			source: Box::new(WsSource { read }),
			handshake_headers,
		})
	}
}

fn build_request(request: &DialRequest) -> Result<Request, EngineError> {
	let mut handshake = request
		.url
		.as_str()
		.into_client_request()
		.map_err(|e| EngineError::new(format!("invalid socket url '{}': {e}", request.url)))?;

	for (name, value) in request.headers.iter() {
		let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| EngineError::new(format!("invalid header name '{name}': {e}")))?;
		let value = HeaderValue::from_str(value).map_err(|e| EngineError::new(format!("invalid header value for '{name}': {e}")))?;
		handshake.headers_mut().append(name, value);
	}
	Ok(handshake)
}

/// Opens a TCP tunnel to the socket's host through an HTTP proxy.
async fn tunnel(proxy: &str, target: &str) -> Result<TcpStream, EngineError> {
	let proxy = Url::parse(proxy).map_err(|e| EngineError::new(format!("invalid session proxy '{proxy}': {e}")))?;
	if proxy.scheme() != "http" {
		return Err(EngineError::new(format!(
			"unsupported session proxy scheme '{}', only http CONNECT proxies are supported",
			proxy.scheme()
		)));
	}
	let (proxy_host, proxy_port) = host_and_port(&proxy)?;

	let target = Url::parse(target).map_err(|e| EngineError::new(format!("invalid socket url '{target}': {e}")))?;
	let (target_host, target_port) = host_and_port(&target)?;
	let authority = format!("{target_host}:{target_port}");

	let mut stream = TcpStream::connect((proxy_host.as_str(), proxy_port))
		.await
		.map_err(|e| EngineError::new(format!("proxy connect to {proxy_host}:{proxy_port} failed: {e}")))?;

	let mut connect = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
	if !proxy.username().is_empty() {
		let credentials = format!("{}:{}", proxy.username(), proxy.password().unwrap_or_default());
		connect.push_str(&format!("Proxy-Authorization: Basic {}\r\n", STANDARD.encode(credentials)));
	}
	connect.push_str("\r\n");

	stream
		.write_all(connect.as_bytes())
		.await
		.map_err(|e| EngineError::new(format!("proxy write failed: {e}")))?;

	let head = read_response_head(&mut stream).await?;
	let status = parse_status(&head)?;
	if status != 200 {
		return Err(EngineError::new(format!("proxy refused tunnel to {authority}: status {status}")).with_status(status));
	}

	debug!(target = "gatehouse.session", proxy = %proxy_host, %authority, "proxy tunnel established");
	Ok(stream)
}

fn host_and_port(url: &Url) -> Result<(String, u16), EngineError> {
	let host = url
		.host_str()
		.ok_or_else(|| EngineError::new(format!("'{url}' has no host")))?
		.trim_start_matches('[')
		.trim_end_matches(']')
		.to_string();
	let port = url
		.port_or_known_default()
		.ok_or_else(|| EngineError::new(format!("'{url}' has no port")))?;
	Ok((host, port))
}

/// Reads up to and including the blank line ending the proxy's response head.
async fn read_response_head(stream: &mut TcpStream) -> Result<String, EngineError> {
	let mut head = Vec::with_capacity(256);
	let mut byte = [0u8; 1];
	while !head.ends_with(b"\r\n\r\n") {
		if head.len() >= MAX_PROXY_RESPONSE {
			return Err(EngineError::new("proxy response head too large"));
		}
		let read = stream
			.read(&mut byte)
			.await
			.map_err(|e| EngineError::new(format!("proxy read failed: {e}")))?;
		if read == 0 {
			return Err(EngineError::new("proxy closed the connection during CONNECT"));
		}
		head.push(byte[0]);
	}
	Ok(String::from_utf8_lossy(&head).into_owned())
}

fn parse_status(head: &str) -> Result<u16, EngineError> {
	head.lines()
		.next()
		.and_then(|line| line.split_whitespace().nth(1))
		.and_then(|code| code.parse().ok())
		.ok_or_else(|| EngineError::new("malformed proxy response"))
}

struct WsSink {
	write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
	async fn send(&mut self, frame: Frame) -> Result<(), EngineError> {
		let message = match frame {
			Frame::Text(text) => Message::Text(text),
			Frame::Binary(bytes) => Message::Binary(bytes),
		};
		self.write.send(message).await.map_err(|e| EngineError::new(error_chain(&e)))
	}

	async fn ping(&mut self) -> Result<(), EngineError> {
		self.write
			.send(Message::Ping(Vec::new()))
			.await
			.map_err(|e| EngineError::new(error_chain(&e)))
	}

	async fn close(&mut self) -> Result<(), EngineError> {
		match self.write.close().await {
			Ok(()) => Ok(()),
			Err(e) if peer_gone(&e) => Ok(()),
			Err(e) => Err(EngineError::new(error_chain(&e))),
		}
	}
}

/// The peer already finished the close handshake or dropped the connection.
fn peer_gone(err: &WsError) -> bool {
	match err {
		WsError::ConnectionClosed | WsError::AlreadyClosed => true,
		WsError::Protocol(ProtocolError::SendAfterClosing) => true,
		WsError::Io(io) => matches!(
			io.kind(),
			std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::NotConnected
		),
		_ => false,
	}
}

struct WsSource {
	read: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
	async fn next(&mut self) -> Result<Option<Inbound>, EngineError> {
		loop {
			let message = match self.read.next().await {
				None | Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(None),
				Some(Err(e)) => return Err(EngineError::new(error_chain(&e))),
				Some(Ok(message)) => message,
			};
			let inbound = match message {
				Message::Text(text) => Inbound::Frame(Frame::Text(text)),
				Message::Binary(bytes) => Inbound::Frame(Frame::Binary(bytes)),
				Message::Ping(_) => Inbound::Ping,
				Message::Pong(_) => Inbound::Pong,
				Message::Close(_) => return Ok(None),
				Message::Frame(_) => continue,
			};
			return Ok(Some(inbound));
		}
	}
}
