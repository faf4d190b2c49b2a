//! Concurrency and lifecycle management for remote service access.
//!
//! This crate holds the two managed paths of a gatehouse client:
//!
//! - **Requests**: a [`ConcurrencyGate`] bounds requests in flight, and a
//!   [`RequestExecutor`] runs each one against an [`HttpEngine`] with
//!   jittered exponential backoff. [`RequestGateway`] composes the two.
//! - **Sessions**: a [`SessionPool`] keeps at most one live [`Session`] per
//!   address. Each session is drained by a background reader into a bounded
//!   queue and kept alive by a heartbeat.
//!
//! Wire work is delegated to two seams, [`HttpEngine`] and [`SocketEngine`],
//! with default implementations over `reqwest` and `tokio-tungstenite`.

pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod socket;

#[cfg(test)]
mod testing;

pub use config::{ClientConfig, RetryPolicy, SessionConfig};
pub use error::{Error, Result};
pub use gate::{ConcurrencyGate, GatePermit};
pub use http::{EngineError, HttpEngine, HttpRequest, RawResponse, RequestExecutor, RequestGateway, ReqwestEngine};
pub use socket::{
	CloseAllReport, DialRequest, DialedSocket, Frame, FrameSink, FrameSource, Inbound, Session, SessionPool, SessionState,
	SocketEngine, TungsteniteEngine,
};
pub use tokio_util::sync::CancellationToken;
