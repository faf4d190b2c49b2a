//! Gate-admitted request execution.

use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::engine::{HttpRequest, RawResponse};
use super::executor::RequestExecutor;
use crate::error::Result;
use crate::gate::ConcurrencyGate;

/// Runs every request through the concurrency gate, then the retrying executor.
///
/// A slot is held for the whole logical request, backoff sleeps included, and
/// is returned on every exit path.
pub struct RequestGateway {
	gate: ConcurrencyGate,
	executor: RequestExecutor,
}

impl RequestGateway {
	pub fn new(gate: ConcurrencyGate, executor: RequestExecutor) -> Self {
		Self { gate, executor }
	}

	pub async fn send(&self, request: &HttpRequest, cancel: &CancellationToken) -> Result<RawResponse> {
		let permit = self.gate.acquire(cancel).await?;
		trace!(target = "gatehouse.gate", method = %request.method, url = %request.url, "request admitted");
		let result = self.executor.execute(request, cancel).await;
		permit.release();
		result
	}

	pub fn gate(&self) -> &ConcurrencyGate {
		&self.gate
	}

	pub fn executor(&self) -> &RequestExecutor {
		&self.executor
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::time::Duration;

	use gatehouse_protocol::Method;
	use tokio::time::Instant;

	use super::*;
	use crate::config::RetryPolicy;
	use crate::error::Error;
	use crate::http::HttpEngine;
	use crate::testing::{ScriptedHttpEngine, Step};

	fn gateway(engine: &Arc<ScriptedHttpEngine>, capacity: usize, retries: u32) -> Arc<RequestGateway> {
		let policy = RetryPolicy {
			retries,
			base_backoff: Duration::from_millis(100),
			max_backoff: Duration::from_millis(100),
			retry_server_errors: true,
		};
		let executor = RequestExecutor::new(Arc::clone(engine) as Arc<dyn HttpEngine>, policy, Duration::from_secs(5));
		Arc::new(RequestGateway::new(ConcurrencyGate::new(capacity).unwrap(), executor))
	}

	#[tokio::test(start_paused = true)]
	async fn third_request_waits_for_a_released_slot() {
		let engine = Arc::new(ScriptedHttpEngine::always(Step::Fail("reset")).with_delay(Duration::from_millis(100)));
		let gateway = gateway(&engine, 2, 1);
		let origin = Instant::now();

		let spawn = |path: &'static str| {
			let gateway = Arc::clone(&gateway);
			tokio::spawn(async move {
				let request = HttpRequest::new(Method::Get, format!("https://api.example.com/{path}"));
				gateway.send(&request, &CancellationToken::new()).await
			})
		};

		let first = spawn("a");
		let second = spawn("b");
		tokio::time::sleep(Duration::from_millis(1)).await;
		let third = spawn("c");

		for handle in [first, second, third] {
			let err = handle.await.unwrap().unwrap_err();
			assert!(err.is_transport());
			assert_eq!(err.attempts(), Some(2));
		}

		let starts = engine.starts();
		assert_eq!(starts.len(), 6);
		let third_start = starts
			.iter()
			.find(|(url, _)| url.ends_with("/c"))
			.map(|(_, at)| *at - origin)
			.unwrap();
		// Attempt, backoff, attempt.
		assert!(third_start >= Duration::from_millis(300), "third request started at {third_start:?}");
		assert_eq!(gateway.gate().available(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn slot_is_released_after_status_failure() {
		let engine = Arc::new(ScriptedHttpEngine::always(Step::Respond(404, "")));
		let gateway = gateway(&engine, 1, 3);

		let err = gateway
			.send(&HttpRequest::new(Method::Delete, "https://api.example.com/x"), &CancellationToken::new())
			.await
			.unwrap_err();
		assert_eq!(err.status(), Some(404));
		assert_eq!(gateway.gate().available(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn cancelled_admission_never_reaches_the_engine() {
		let engine = Arc::new(ScriptedHttpEngine::always(Step::Hang));
		let gateway = gateway(&engine, 1, 0);
		let request = HttpRequest::new(Method::Get, "https://api.example.com/slow");

		let holder = {
			let gateway = Arc::clone(&gateway);
			let request = request.clone();
			tokio::spawn(async move { gateway.send(&request, &CancellationToken::new()).await })
		};
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert_eq!(gateway.gate().in_flight(), 1);

		let cancel = CancellationToken::new();
		cancel.cancel();
		let err = gateway.send(&request, &cancel).await.unwrap_err();
		assert!(matches!(err, Error::AdmissionCancelled));
		assert_eq!(engine.calls(), 1);

		holder.abort();
	}
}
