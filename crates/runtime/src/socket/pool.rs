//! Keyed registry of live sessions.
//!
//! The registry lock is a `parking_lot` mutex held only for map operations;
//! dialing and closing always happen with it released.

use std::collections::HashMap;
use std::sync::Arc;

use gatehouse_protocol::Headers;
use parking_lot::Mutex;
use tracing::debug;

use super::session::Session;
use super::transport::{DialRequest, SocketEngine};
use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// Outcome of [`SessionPool::close_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseAllReport {
	pub attempted: usize,
	pub closed: usize,
	pub failed: usize,
	pub timed_out: usize,
}

impl CloseAllReport {
	pub fn is_clean(&self) -> bool {
		self.closed == self.attempted
	}
}

/// At most one live [`Session`] per address.
pub struct SessionPool {
	engine: Arc<dyn SocketEngine>,
	config: SessionConfig,
	debug: bool,
	sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionPool {
	pub fn new(engine: Arc<dyn SocketEngine>, config: SessionConfig) -> Self {
		Self {
			engine,
			config,
			debug: false,
			sessions: Mutex::new(HashMap::new()),
		}
	}

	pub fn with_debug(mut self, debug: bool) -> Self {
		self.debug = debug;
		self
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Returns the live session for `address`, dialing one if needed.
	///
	/// A closed entry is evicted and replaced. `headers` only apply to a fresh
	/// dial. Dial failures are returned as-is and leave no entry behind.
	pub async fn get_or_create(&self, address: &str, headers: &Headers) -> Result<Arc<Session>> {
		{
			let mut sessions = self.sessions.lock();
			match sessions.get(address) {
				Some(session) if !session.is_closed() => return Ok(Arc::clone(session)),
				Some(_) => {
					sessions.remove(address);
					if self.debug {
						debug!(target = "gatehouse.pool", address, "evicted closed session");
					}
				}
				None => {}
			}
		}

		let request = DialRequest::new(address)
			.with_headers(headers.clone())
			.with_proxy(self.config.proxy.clone())
			.with_compression(self.config.compression);
		let socket = self.engine.dial(&request).await.map_err(|err| Error::Dial {
			address: address.to_string(),
			message: err.message,
		})?;
		let fresh = Arc::new(Session::start(address, socket, &self.config, self.debug));

		let winner = {
			let mut sessions = self.sessions.lock();
			match sessions.get(address) {
				Some(existing) if !existing.is_closed() => Some(Arc::clone(existing)),
				_ => {
					sessions.insert(address.to_string(), Arc::clone(&fresh));
					None
				}
			}
		};

		match winner {
			Some(existing) => {
				if self.debug {
					debug!(target = "gatehouse.pool", address, "lost dial race, closing duplicate session");
				}
				if let Err(err) = fresh.close().await {
					if self.debug {
						debug!(target = "gatehouse.pool", address, error = %err, "duplicate session close failed");
					}
				}
				Ok(existing)
			}
			None => {
				debug!(target = "gatehouse.pool", address, "session registered");
				Ok(fresh)
			}
		}
	}

	/// The registered session for `address`, live or not.
	pub fn get(&self, address: &str) -> Option<Arc<Session>> {
		self.sessions.lock().get(address).cloned()
	}

	/// Drops registry entries whose session has already closed. Closes nothing.
	pub fn remove_closed(&self) -> usize {
		let mut sessions = self.sessions.lock();
		let before = sessions.len();
		sessions.retain(|_, session| !session.is_closed());
		let removed = before - sessions.len();
		if removed > 0 && self.debug {
			debug!(target = "gatehouse.pool", removed, "removed closed sessions");
		}
		removed
	}

	/// Detaches the entry for `address` without closing it.
	pub fn remove(&self, address: &str) -> Option<Arc<Session>> {
		self.sessions.lock().remove(address)
	}

	/// Detaches and closes the entry for `address`. Missing entries are a no-op.
	pub async fn close(&self, address: &str) -> Result<()> {
		let session = self.remove(address);
		match session {
			Some(session) => session.close().await,
			None => Ok(()),
		}
	}

	/// Empties the registry, then closes every detached session concurrently.
	///
	/// Each close is bounded by the configured close timeout. Failures and
	/// timeouts are counted and never stop the remaining closes.
	pub async fn close_all(&self) -> CloseAllReport {
		let detached = std::mem::take(&mut *self.sessions.lock());
		let timeout = self.config.close_timeout;

		let closes = detached.into_values().map(|session| async move {
			let outcome = tokio::time::timeout(timeout, session.close()).await;
			(session, outcome)
		});
		let outcomes = futures_util::future::join_all(closes).await;

		let mut report = CloseAllReport {
			attempted: outcomes.len(),
			..CloseAllReport::default()
		};
		for (session, outcome) in outcomes {
			match outcome {
				Ok(Ok(())) => report.closed += 1,
				Ok(Err(err)) => {
					report.failed += 1;
					if self.debug {
						debug!(target = "gatehouse.pool", address = session.address(), error = %err, "session close failed");
					}
				}
				Err(_) => {
					report.timed_out += 1;
					if self.debug {
						debug!(target = "gatehouse.pool", address = session.address(), ?timeout, "session close timed out");
					}
				}
			}
		}
		report
	}

	pub fn len(&self) -> usize {
		self.sessions.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.lock().is_empty()
	}

	pub fn addresses(&self) -> Vec<String> {
		let mut addresses: Vec<String> = self.sessions.lock().keys().cloned().collect();
		addresses.sort();
		addresses
	}
}
