//! One persistent duplex connection.
//!
//! A [`Session`] owns both halves of a dialed socket. Two background tasks run
//! against it: a reader that moves inbound frames into a bounded queue, and a
//! heartbeat that pings on a fixed interval. A third, the supervisor, waits
//! for the stop signal, joins the other two and only then releases the
//! transport, so a failing task never has to wait on itself.
//!
//! Every wait on the write lock or on a transport write also watches the stop
//! signal, so a stalled write cannot hold teardown hostage.
//!
//! ```text
//! Open ──close / read failure / ping failure──▶ Closing ──teardown done──▶ Closed
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::Stream;
use gatehouse_protocol::Headers;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::transport::{DialedSocket, Frame, FrameSink, FrameSource, Inbound};
use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// Lifecycle position of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	/// Sends succeed and the reader delivers.
	Open,
	/// Stop has been signalled; teardown is in progress.
	Closing,
	/// Background tasks have exited and the transport is released.
	Closed,
}

struct Shared {
	address: Arc<str>,
	debug: bool,
	closed: AtomicBool,
	/// Flips to `true` once teardown has finished.
	released: watch::Sender<bool>,
	/// Teardown failure, handed to the first `close` caller that sees it.
	failure: parking_lot::Mutex<Option<Error>>,
	stop: CancellationToken,
	/// Bounds a single write or ping.
	write_timeout: Duration,
	/// Write lock shared by `send` and heartbeat pings. `None` once released.
	writer: Mutex<Option<Box<dyn FrameSink>>>,
	inbound: Mutex<mpsc::Receiver<Frame>>,
}

impl Shared {
	/// Flips the closed flag and fires the stop signal, once.
	fn begin_close(&self, reason: &str) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		if self.debug {
			debug!(target = "gatehouse.session", address = %self.address, reason, "session closing");
		}
		self.stop.cancel();
	}

	fn is_released(&self) -> bool {
		*self.released.borrow()
	}

	fn closed_error(&self) -> Error {
		Error::SessionClosed {
			address: self.address.to_string(),
		}
	}
}

/// A live duplex connection with heartbeat and background reader.
pub struct Session {
	shared: Arc<Shared>,
	handshake_headers: Headers,
}

impl Session {
	/// Takes ownership of a dialed socket and starts the background tasks.
	///
	/// Must be called from within a tokio runtime.
	pub fn start(address: impl Into<Arc<str>>, socket: DialedSocket, config: &SessionConfig, debug: bool) -> Self {
		let DialedSocket {
			sink,
			source,
			handshake_headers,
		} = socket;
		let (tx, rx) = mpsc::channel(config.buffer_size.max(1));

		let shared = Arc::new(Shared {
			address: address.into(),
			debug,
			closed: AtomicBool::new(false),
			released: watch::Sender::new(false),
			failure: parking_lot::Mutex::new(None),
			stop: CancellationToken::new(),
			write_timeout: config.pong_wait,
			writer: Mutex::new(Some(sink)),
			inbound: Mutex::new(rx),
		});

		let reader = tokio::spawn(read_loop(Arc::clone(&shared), source, tx, config.pong_wait));
		let heartbeat = tokio::spawn(heartbeat_loop(Arc::clone(&shared), config.ping_interval));
		tokio::spawn(supervise(Arc::clone(&shared), reader, heartbeat));

		trace!(target = "gatehouse.session", address = %shared.address, "session started");
		Self {
			shared,
			handshake_headers,
		}
	}

	pub fn address(&self) -> &str {
		&self.shared.address
	}

	/// Response headers captured during the handshake.
	pub fn handshake_headers(&self) -> &Headers {
		&self.handshake_headers
	}

	pub fn is_closed(&self) -> bool {
		self.shared.closed.load(Ordering::SeqCst)
	}

	pub fn state(&self) -> SessionState {
		if !self.shared.closed.load(Ordering::SeqCst) {
			SessionState::Open
		} else if self.shared.is_released() {
			SessionState::Closed
		} else {
			SessionState::Closing
		}
	}

	/// Writes one frame, serialized with other sends and heartbeat pings.
	///
	/// A failed or timed out write is reported to the caller but does not close
	/// the session; the reader and heartbeat detect a dead transport on their
	/// own. A session that starts closing mid-write abandons the write with
	/// [`Error::SessionClosed`].
	pub async fn send(&self, frame: impl Into<Frame>) -> Result<()> {
		let shared = &self.shared;
		let mut writer = tokio::select! {
			biased;
			_ = shared.stop.cancelled() => return Err(shared.closed_error()),
			writer = shared.writer.lock() => writer,
		};
		let Some(sink) = writer.as_mut() else {
			return Err(shared.closed_error());
		};

		let outcome = tokio::select! {
			biased;
			_ = shared.stop.cancelled() => return Err(shared.closed_error()),
			outcome = tokio::time::timeout(shared.write_timeout, sink.send(frame.into())) => outcome,
		};
		match outcome {
			Ok(Ok(())) => Ok(()),
			Ok(Err(err)) => Err(transport_error(err.message)),
			Err(_) => Err(transport_error(format!("write timed out after {:?}", shared.write_timeout))),
		}
	}

	/// Serializes `value` and sends it as a text frame.
	pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
		let text = serde_json::to_string(value)?;
		self.send(Frame::Text(text)).await
	}

	/// Next inbound frame, or `None` once the session is closing.
	///
	/// Frames still queued when the session starts closing are discarded.
	pub async fn recv(&self) -> Option<Frame> {
		if self.shared.closed.load(Ordering::SeqCst) {
			return None;
		}
		let mut inbound = self.shared.inbound.lock().await;
		tokio::select! {
			biased;
			_ = self.shared.stop.cancelled() => None,
			frame = inbound.recv() => frame,
		}
	}

	/// Inbound frames as a stream that ends when the session closes.
	pub fn messages(&self) -> impl Stream<Item = Frame> + '_ {
		futures_util::stream::unfold(self, |session| async move {
			session.recv().await.map(|frame| (frame, session))
		})
	}

	/// Closes the session and waits for teardown to finish.
	///
	/// Every call, including ones racing the first or following an abandoned
	/// one, waits until the transport has been released. A teardown failure
	/// (transport close error or a crashed background task) is returned to the
	/// first caller that observes it; everyone else gets `Ok(())`.
	pub async fn close(&self) -> Result<()> {
		self.shared.begin_close("closed by caller");
		let mut released = self.shared.released.subscribe();
		// The sender lives in `shared`, so this only returns once released.
		let _ = released.wait_for(|done| *done).await;
		match self.shared.failure.lock().take() {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		// The supervisor keeps running and releases the transport.
		self.shared.begin_close("session dropped");
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("address", &self.shared.address)
			.field("state", &self.state())
			.finish_non_exhaustive()
	}
}

async fn read_loop(shared: Arc<Shared>, mut source: Box<dyn FrameSource>, tx: mpsc::Sender<Frame>, pong_wait: Duration) {
	loop {
		// Every inbound item, data or control, restarts the read deadline.
		let next = tokio::select! {
			biased;
			_ = shared.stop.cancelled() => break,
			next = tokio::time::timeout(pong_wait, source.next()) => next,
		};

		match next {
			Ok(Ok(Some(Inbound::Frame(frame)))) => match tx.try_send(frame) {
				Ok(()) => {}
				Err(mpsc::error::TrySendError::Full(frame)) => {
					if shared.debug {
						debug!(
							target = "gatehouse.session",
							address = %shared.address,
							bytes = frame.len(),
							"inbound queue full, dropping frame"
						);
					}
				}
				Err(mpsc::error::TrySendError::Closed(_)) => break,
			},
			Ok(Ok(Some(Inbound::Pong | Inbound::Ping))) => {}
			Ok(Ok(None)) => {
				shared.begin_close("remote closed");
				break;
			}
			Ok(Err(err)) => {
				shared.begin_close(&format!("read failed: {err}"));
				break;
			}
			Err(_) => {
				shared.begin_close("read deadline expired");
				break;
			}
		}
	}
	trace!(target = "gatehouse.session", address = %shared.address, "reader stopped");
}

fn transport_error(message: String) -> Error {
	Error::Transport {
		message,
		status: 0,
		attempts: 1,
	}
}

async fn heartbeat_loop(shared: Arc<Shared>, interval: Duration) {
	let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			biased;
			_ = shared.stop.cancelled() => break,
			_ = ticker.tick() => {}
		}

		let outcome = {
			let mut writer = tokio::select! {
				biased;
				_ = shared.stop.cancelled() => break,
				writer = shared.writer.lock() => writer,
			};
			let Some(sink) = writer.as_mut() else {
				break;
			};
			tokio::select! {
				biased;
				_ = shared.stop.cancelled() => break,
				outcome = tokio::time::timeout(shared.write_timeout, sink.ping()) => outcome,
			}
		};

		match outcome {
			Ok(Ok(())) => trace!(target = "gatehouse.session", address = %shared.address, "ping sent"),
			Ok(Err(err)) => {
				shared.begin_close(&format!("ping failed: {err}"));
				break;
			}
			Err(_) => {
				shared.begin_close("ping timed out");
				break;
			}
		}
	}
	trace!(target = "gatehouse.session", address = %shared.address, "heartbeat stopped");
}

async fn supervise(shared: Arc<Shared>, reader: JoinHandle<()>, heartbeat: JoinHandle<()>) {
	shared.stop.cancelled().await;

	let (reader, heartbeat) = tokio::join!(reader, heartbeat);
	let joined = reader.and(heartbeat).map_err(|e| Error::Task(format!("session task for {}: {e}", shared.address)));

	let discarded = {
		let mut inbound = shared.inbound.lock().await;
		inbound.close();
		let mut discarded = 0usize;
		while inbound.try_recv().is_ok() {
			discarded += 1;
		}
		discarded
	};

	// Senders and the heartbeat give up the lock as soon as stop fires.
	let sink = shared.writer.lock().await.take();
	let released = match sink {
		Some(mut sink) => sink.close().await.map_err(|err| {
			if shared.debug {
				debug!(target = "gatehouse.session", address = %shared.address, error = %err, "transport close failed");
			}
			transport_error(format!("failed to close {}: {}", shared.address, err.message))
		}),
		None => Ok(()),
	};

	if let Err(err) = joined.and(released) {
		*shared.failure.lock() = Some(err);
	}
	shared.released.send_replace(true);
	if shared.debug {
		debug!(target = "gatehouse.session", address = %shared.address, discarded, "session closed");
	}
}
