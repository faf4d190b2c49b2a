//! Scripted in-memory engines for unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gatehouse_protocol::Headers;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::http::{EngineError, HttpEngine, HttpRequest, RawResponse};
use crate::socket::{DialRequest, DialedSocket, Frame, FrameSink, FrameSource, Inbound, SocketEngine};

/// What a scripted HTTP attempt does.
#[derive(Debug, Clone)]
pub(crate) enum Step {
	Respond(u16, &'static str),
	Fail(&'static str),
	/// Never completes.
	Hang,
}

pub(crate) struct ScriptedHttpEngine {
	script: Mutex<VecDeque<Step>>,
	fallback: Step,
	delay: Duration,
	calls: AtomicU32,
	starts: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedHttpEngine {
	pub(crate) fn new(steps: impl IntoIterator<Item = Step>, fallback: Step) -> Self {
		Self {
			script: Mutex::new(steps.into_iter().collect()),
			fallback,
			delay: Duration::ZERO,
			calls: AtomicU32::new(0),
			starts: Mutex::new(Vec::new()),
		}
	}

	pub(crate) fn always(step: Step) -> Self {
		Self::new([], step)
	}

	/// Every attempt takes `delay` before resolving.
	pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}

	pub(crate) fn calls(&self) -> u32 {
		self.calls.load(Ordering::SeqCst)
	}

	/// URL and start instant of every attempt, in start order.
	pub(crate) fn starts(&self) -> Vec<(String, Instant)> {
		self.starts.lock().clone()
	}
}

#[async_trait]
impl HttpEngine for ScriptedHttpEngine {
	async fn perform(&self, request: &HttpRequest) -> Result<RawResponse, EngineError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.starts.lock().push((request.url.clone(), Instant::now()));
		let step = self.script.lock().pop_front().unwrap_or_else(|| self.fallback.clone());

		if !self.delay.is_zero() {
			tokio::time::sleep(self.delay).await;
		}

		match step {
			Step::Respond(status, body) => Ok(RawResponse::new(status, body)),
			Step::Fail(message) => Err(EngineError::new(message)),
			Step::Hang => std::future::pending().await,
		}
	}
}

/// Test-side view of one mock socket.
pub(crate) struct RemoteEnd {
	sent: Mutex<mpsc::UnboundedReceiver<Frame>>,
	inbound: Mutex<Option<mpsc::UnboundedSender<Result<Inbound, EngineError>>>>,
	pings: Arc<AtomicU32>,
	closes: Arc<AtomicU32>,
	switches: Arc<Switches>,
}

/// Failure modes a test can switch on for one mock socket.
#[derive(Default)]
struct Switches {
	fail_writes: AtomicBool,
	stall_writes: AtomicBool,
	fail_close: AtomicBool,
	stall_close: AtomicBool,
	close_delay: Mutex<Duration>,
}

impl RemoteEnd {
	/// Drains the frames the session has sent so far, in order.
	pub(crate) fn sent(&self) -> Vec<Frame> {
		let mut rx = self.sent.lock();
		let mut frames = Vec::new();
		while let Ok(frame) = rx.try_recv() {
			frames.push(frame);
		}
		frames
	}

	pub(crate) fn pings(&self) -> u32 {
		self.pings.load(Ordering::SeqCst)
	}

	pub(crate) fn closes(&self) -> u32 {
		self.closes.load(Ordering::SeqCst)
	}

	/// Delivers a data frame to the session's reader.
	pub(crate) fn push(&self, frame: Frame) {
		if let Some(tx) = self.inbound.lock().as_ref() {
			let _ = tx.send(Ok(Inbound::Frame(frame)));
		}
	}

	pub(crate) fn push_pong(&self) {
		if let Some(tx) = self.inbound.lock().as_ref() {
			let _ = tx.send(Ok(Inbound::Pong));
		}
	}

	/// Makes the next read fail.
	pub(crate) fn break_read(&self, message: &'static str) {
		if let Some(tx) = self.inbound.lock().as_ref() {
			let _ = tx.send(Err(EngineError::new(message)));
		}
	}

	/// Closes the remote side cleanly.
	pub(crate) fn hang_up(&self) {
		self.inbound.lock().take();
	}

	/// Makes every subsequent send and ping fail.
	pub(crate) fn fail_writes(&self) {
		self.switches.fail_writes.store(true, Ordering::SeqCst);
	}

	/// Makes every subsequent data send never complete. Pings are unaffected.
	pub(crate) fn stall_writes(&self) {
		self.switches.stall_writes.store(true, Ordering::SeqCst);
	}

	/// Makes transport close report an error.
	pub(crate) fn fail_close(&self) {
		self.switches.fail_close.store(true, Ordering::SeqCst);
	}

	/// Makes transport close never complete.
	pub(crate) fn stall_close(&self) {
		self.switches.stall_close.store(true, Ordering::SeqCst);
	}

	/// Makes transport close take `delay` before it resolves.
	pub(crate) fn delay_close(&self, delay: Duration) {
		*self.switches.close_delay.lock() = delay;
	}
}

struct MockSink {
	sent: mpsc::UnboundedSender<Frame>,
	pings: Arc<AtomicU32>,
	closes: Arc<AtomicU32>,
	switches: Arc<Switches>,
}

#[async_trait]
impl FrameSink for MockSink {
	async fn send(&mut self, frame: Frame) -> Result<(), EngineError> {
		if self.switches.fail_writes.load(Ordering::SeqCst) {
			return Err(EngineError::new("broken pipe"));
		}
		if self.switches.stall_writes.load(Ordering::SeqCst) {
			std::future::pending::<()>().await;
		}
		self.sent.send(frame).map_err(|_| EngineError::new("remote gone"))
	}

	async fn ping(&mut self) -> Result<(), EngineError> {
		if self.switches.fail_writes.load(Ordering::SeqCst) {
			return Err(EngineError::new("broken pipe"));
		}
		self.pings.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	async fn close(&mut self) -> Result<(), EngineError> {
		self.closes.fetch_add(1, Ordering::SeqCst);
		if self.switches.stall_close.load(Ordering::SeqCst) {
			std::future::pending::<()>().await;
		}
		let delay = *self.switches.close_delay.lock();
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		if self.switches.fail_close.load(Ordering::SeqCst) {
			return Err(EngineError::new("close frame rejected"));
		}
		Ok(())
	}
}

struct MockSource {
	inbound: mpsc::UnboundedReceiver<Result<Inbound, EngineError>>,
}

#[async_trait]
impl FrameSource for MockSource {
	async fn next(&mut self) -> Result<Option<Inbound>, EngineError> {
		match self.inbound.recv().await {
			Some(Ok(inbound)) => Ok(Some(inbound)),
			Some(Err(err)) => Err(err),
			None => Ok(None),
		}
	}
}

/// Socket engine whose dials produce in-memory sockets.
#[derive(Default)]
pub(crate) struct MockSocketEngine {
	dials: AtomicU32,
	refuse: AtomicBool,
	dial_delay: Mutex<Duration>,
	remotes: Mutex<Vec<(String, Arc<RemoteEnd>)>>,
	requests: Mutex<Vec<DialRequest>>,
}

impl MockSocketEngine {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn refuse_dials(&self) {
		self.refuse.store(true, Ordering::SeqCst);
	}

	pub(crate) fn set_dial_delay(&self, delay: Duration) {
		*self.dial_delay.lock() = delay;
	}

	pub(crate) fn dials(&self) -> u32 {
		self.dials.load(Ordering::SeqCst)
	}

	/// Remote end of the `index`-th successful dial.
	pub(crate) fn remote(&self, index: usize) -> Arc<RemoteEnd> {
		Arc::clone(&self.remotes.lock()[index].1)
	}

	pub(crate) fn dial_requests(&self) -> Vec<DialRequest> {
		self.requests.lock().clone()
	}

	/// Builds a standalone socket pair without going through `dial`.
	pub(crate) fn pair() -> (DialedSocket, RemoteEnd) {
		let (sent_tx, sent_rx) = mpsc::unbounded_channel();
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let pings = Arc::new(AtomicU32::new(0));
		let closes = Arc::new(AtomicU32::new(0));
		let switches = Arc::new(Switches::default());

		let socket = DialedSocket {
			sink: Box::new(MockSink {
				sent: sent_tx,
				pings: Arc::clone(&pings),
				closes: Arc::clone(&closes),
				switches: Arc::clone(&switches),
			}),
			source: Box::new(MockSource { inbound: inbound_rx }),
			handshake_headers: Headers::from([("sec-websocket-protocol", "mock")]),
		};
		let remote = RemoteEnd {
			sent: Mutex::new(sent_rx),
			inbound: Mutex::new(Some(inbound_tx)),
			pings,
			closes,
			switches,
		};
		(socket, remote)
	}
}

#[async_trait]
impl SocketEngine for MockSocketEngine {
	async fn dial(&self, request: &DialRequest) -> Result<DialedSocket, EngineError> {
		self.dials.fetch_add(1, Ordering::SeqCst);
		self.requests.lock().push(request.clone());

		let delay = *self.dial_delay.lock();
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		if self.refuse.load(Ordering::SeqCst) {
			return Err(EngineError::new("connection refused"));
		}

		let (socket, remote) = Self::pair();
		self.remotes.lock().push((request.url.clone(), Arc::new(remote)));
		Ok(socket)
	}
}
