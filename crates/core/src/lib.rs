//! gatehouse: managed access to remote HTTP and WebSocket services.
//!
//! A [`Client`] issues requests under a global concurrency cap with retry and
//! jittered backoff, and keeps a pool of long-lived duplex sessions, one per
//! address, each with a heartbeat and a bounded inbound queue.
//!
//! ```ignore
//! use gatehouse::{Client, ClientConfig, Headers};
//!
//! #[tokio::main]
//! async fn main() -> gatehouse::Result<()> {
//!     let client = Client::new("api.example.com", ClientConfig::default().with_max_concurrency(8))?;
//!
//!     let ticker: serde_json::Value = client.get("/v1/ticker", &Headers::new()).await?;
//!     println!("{ticker}");
//!
//!     let session = client.session("wss://stream.example.com/ws", &Headers::new()).await?;
//!     session.send_json(&serde_json::json!({"op": "subscribe", "channel": "trades"})).await?;
//!     while let Some(frame) = session.recv().await {
//!         println!("{:?}", frame.as_text());
//!     }
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

mod client;

pub use client::{Client, RequestScope};
pub use gatehouse_protocol::{
	BrowserProfile, Headers, Method, QueryValue, UnsupportedMethod, build_query_string, join_endpoint, normalize_base_url,
};
pub use gatehouse_runtime::{
	CancellationToken, ClientConfig, CloseAllReport, ConcurrencyGate, DialRequest, DialedSocket, EngineError, Error, Frame,
	FrameSink, FrameSource, HttpEngine, HttpRequest, Inbound, RawResponse, Result, RetryPolicy, Session, SessionConfig,
	SessionPool, SessionState, SocketEngine,
};
