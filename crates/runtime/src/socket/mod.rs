//! The duplex side: engine seam, sessions and the session pool.

mod pool;
mod session;
mod transport;
mod tungstenite;

pub use pool::{CloseAllReport, SessionPool};
pub use session::{Session, SessionState};
pub use transport::{DialRequest, DialedSocket, Frame, FrameSink, FrameSource, Inbound, SocketEngine};
pub use tungstenite::TungsteniteEngine;
