//! Counting admission control for in-flight requests.
//!
//! [`ConcurrencyGate`] wraps a tokio [`Semaphore`], whose waiters are queued
//! FIFO, so a release wakes exactly one pending acquirer and nobody starves
//! while load stays below the cap. Permits are RAII: dropping a
//! [`GatePermit`] is the release, which keeps acquire/release paired 1:1.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Error, Result};

/// Bounds the number of requests in flight.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
	semaphore: Arc<Semaphore>,
	capacity: usize,
}

/// One admitted slot; the slot is returned when this is dropped.
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct GatePermit {
	_permit: OwnedSemaphorePermit,
}

impl GatePermit {
	/// Returns the slot to the gate.
	pub fn release(self) {}
}

impl ConcurrencyGate {
	pub fn new(capacity: usize) -> Result<Self> {
		if capacity == 0 {
			return Err(Error::Configuration("gate capacity must be at least 1".into()));
		}
		Ok(Self {
			semaphore: Arc::new(Semaphore::new(capacity)),
			capacity,
		})
	}

	/// Waits for a free slot or for `cancel` to fire, whichever comes first.
	///
	/// Cancellation is checked first, so an already-cancelled token never takes
	/// a slot. A cancelled wait leaves the gate's count untouched.
	pub async fn acquire(&self, cancel: &CancellationToken) -> Result<GatePermit> {
		let semaphore = Arc::clone(&self.semaphore);
		tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				trace!(target = "gatehouse.gate", "acquire cancelled");
				Err(Error::AdmissionCancelled)
			}
			permit = semaphore.acquire_owned() => {
				// The semaphore is never closed.
				let permit = permit.map_err(|_| Error::AdmissionCancelled)?;
				trace!(target = "gatehouse.gate", available = self.available(), "slot acquired");
				Ok(GatePermit { _permit: permit })
			}
		}
	}

	/// Takes a slot only if one is free right now.
	pub fn try_acquire(&self) -> Option<GatePermit> {
		Arc::clone(&self.semaphore)
			.try_acquire_owned()
			.ok()
			.map(|permit| GatePermit { _permit: permit })
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Slots free at this instant.
	pub fn available(&self) -> usize {
		self.semaphore.available_permits()
	}

	/// Slots held at this instant.
	pub fn in_flight(&self) -> usize {
		self.capacity - self.available()
	}
}
