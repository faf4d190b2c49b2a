//! Retrying request executor.
//!
//! Runs one logical request as up to `retries + 1` engine attempts. Each
//! attempt is bounded by the request timeout; retryable outcomes (no response,
//! or a 429/5xx when the policy allows) sleep a jittered exponential backoff
//! before the next attempt. The returned error always describes the last
//! attempt.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::engine::{HttpEngine, HttpRequest, RawResponse};
use crate::config::RetryPolicy;
use crate::error::{Error, Result};

/// Why an attempt did not produce a final answer.
enum Retryable {
	NoResponse(String),
	Status(RawResponse),
}

pub struct RequestExecutor {
	engine: Arc<dyn HttpEngine>,
	policy: RetryPolicy,
	timeout: Duration,
	debug: bool,
}

impl RequestExecutor {
	pub fn new(engine: Arc<dyn HttpEngine>, policy: RetryPolicy, timeout: Duration) -> Self {
		Self {
			engine,
			policy,
			timeout,
			debug: false,
		}
	}

	/// Enables advisory retry and success diagnostics.
	pub fn with_debug(mut self, debug: bool) -> Self {
		self.debug = debug;
		self
	}

	pub fn policy(&self) -> &RetryPolicy {
		&self.policy
	}

	/// Executes `request`, retrying per policy, until success, a final failure,
	/// or cancellation.
	///
	/// Cancellation aborts an in-flight attempt or a backoff sleep and makes no
	/// further attempts.
	pub async fn execute(&self, request: &HttpRequest, cancel: &CancellationToken) -> Result<RawResponse> {
		let total = self.policy.retries + 1;
		let mut last_status = 0u16;
		let mut attempt = 0u32;

		loop {
			attempt += 1;

			let outcome = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(Error::Cancelled { attempts: attempt }),
				outcome = tokio::time::timeout(self.timeout, self.engine.perform(request)) => outcome,
			};

			let retryable = match outcome {
				Ok(Ok(response)) => {
					last_status = response.status;
					if attempt < total && self.policy.retries_status(response.status) {
						Retryable::Status(response)
					} else {
						return self.finish(request, response, attempt);
					}
				}
				Ok(Err(err)) => {
					if let Some(status) = err.status {
						last_status = status;
					}
					Retryable::NoResponse(err.message)
				}
				Err(_) => Retryable::NoResponse(format!("attempt timed out after {:?}", self.timeout)),
			};

			if attempt >= total {
				// Status outcomes on the last attempt were finished above.
				let message = match retryable {
					Retryable::NoResponse(message) => message,
					Retryable::Status(response) => return self.finish(request, response, attempt),
				};
				return Err(Error::Transport {
					message,
					status: last_status,
					attempts: attempt,
				});
			}

			let wait = self.policy.backoff(attempt);
			if self.debug {
				let reason = match &retryable {
					Retryable::NoResponse(message) => message.as_str(),
					Retryable::Status(_) => "retryable status",
				};
				debug!(
					target = "gatehouse.http",
					attempt,
					max_attempts = total,
					host = %request.host(),
					status = last_status,
					wait_ms = wait.as_millis() as u64,
					reason,
					"retrying request"
				);
			}

			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(Error::Cancelled { attempts: attempt }),
				_ = tokio::time::sleep(wait) => {}
			}
		}
	}

	fn finish(&self, request: &HttpRequest, response: RawResponse, attempts: u32) -> Result<RawResponse> {
		if response.is_error_state() {
			return Err(Error::Status {
				status: response.status,
				body: response.body,
				attempts,
			});
		}
		if self.debug {
			debug!(
				target = "gatehouse.http",
				url = %request.url,
				status = response.status,
				attempts,
				"request succeeded"
			);
		}
		Ok(response)
	}
}
