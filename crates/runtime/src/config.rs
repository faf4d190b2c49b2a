//! Client and session configuration.
//!
//! Configuration is assembled from [`Default`] plus `with_*` builder methods
//! and checked once by [`ClientConfig::validate`]. After that it is treated as
//! immutable and shared behind an `Arc`.

use std::time::Duration;

use gatehouse_protocol::BrowserProfile;
use url::Url;

use crate::error::{Error, Result};

/// Retry budget and backoff bounds for one logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Extra attempts after the first; a request makes at most `retries + 1`.
	pub retries: u32,
	/// Backoff before the first retry.
	pub base_backoff: Duration,
	/// Upper bound for any single backoff.
	pub max_backoff: Duration,
	/// Also retry responses with status 429 or 5xx.
	pub retry_server_errors: bool,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			retries: 3,
			base_backoff: Duration::from_secs(2),
			max_backoff: Duration::from_secs(5),
			retry_server_errors: true,
		}
	}
}

impl RetryPolicy {
	/// No retries at all.
	pub fn none() -> Self {
		Self {
			retries: 0,
			..Self::default()
		}
	}

	/// Upper bound of the wait before retry number `retry` (1-based).
	///
	/// Doubles from `base_backoff` and saturates at `max_backoff`.
	pub fn backoff_ceiling(&self, retry: u32) -> Duration {
		let exp = retry.saturating_sub(1).min(31);
		self.base_backoff.saturating_mul(1u32 << exp).min(self.max_backoff)
	}

	/// Jittered wait before retry number `retry`.
	///
	/// Drawn from `[ceiling / 2, ceiling]`, but never below `base_backoff`, so
	/// every wait stays within `[base_backoff, max_backoff]`.
	pub fn backoff(&self, retry: u32) -> Duration {
		let ceiling = self.backoff_ceiling(retry);
		let floor = (ceiling / 2).max(self.base_backoff).min(ceiling);
		let spread = (ceiling - floor).as_millis() as u64;
		if spread == 0 {
			return ceiling;
		}
		floor + Duration::from_millis(rand::random_range(0..=spread))
	}

	/// Whether a received status should be retried under this policy.
	pub fn retries_status(&self, status: u16) -> bool {
		self.retry_server_errors && (status == 429 || status >= 500)
	}
}

/// Settings for duplex sessions and the pool that owns them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
	/// Proxy for duplex dials, independent of the request proxy.
	pub proxy: Option<String>,
	/// Ask the socket engine to negotiate per-message compression.
	pub compression: bool,
	/// Interval between heartbeat pings.
	pub ping_interval: Duration,
	/// Read deadline, refreshed by every inbound frame; also bounds a single ping write.
	pub pong_wait: Duration,
	/// Capacity of each session's inbound queue.
	pub buffer_size: usize,
	/// Upper bound for one session's teardown during a bulk close.
	pub close_timeout: Duration,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			proxy: None,
			compression: true,
			ping_interval: Duration::from_secs(30),
			pong_wait: Duration::from_secs(60),
			buffer_size: 100,
			close_timeout: Duration::from_secs(10),
		}
	}
}

impl SessionConfig {
	pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
		self.proxy = proxy;
		self
	}

	pub fn with_compression(mut self, enabled: bool) -> Self {
		self.compression = enabled;
		self
	}

	pub fn with_ping_interval(mut self, interval: Duration) -> Self {
		self.ping_interval = interval;
		self
	}

	pub fn with_pong_wait(mut self, wait: Duration) -> Self {
		self.pong_wait = wait;
		self
	}

	pub fn with_buffer_size(mut self, size: usize) -> Self {
		self.buffer_size = size;
		self
	}

	pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
		self.close_timeout = timeout;
		self
	}

	pub fn validate(&self) -> Result<()> {
		if self.buffer_size == 0 {
			return Err(Error::Configuration("session buffer size must be at least 1".into()));
		}
		if self.ping_interval.is_zero() {
			return Err(Error::Configuration("heartbeat interval must be non-zero".into()));
		}
		if self.pong_wait.is_zero() {
			return Err(Error::Configuration("heartbeat timeout must be non-zero".into()));
		}
		if let Some(proxy) = &self.proxy {
			validate_proxy("session proxy", proxy)?;
		}
		Ok(())
	}
}

/// Configuration for a whole client: request gateway plus session pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
	/// Per-attempt request timeout.
	pub timeout: Duration,
	/// Maximum requests in flight at once.
	pub max_concurrency: usize,
	/// Proxy for HTTP requests.
	pub proxy: Option<String>,
	pub retry: RetryPolicy,
	pub profile: BrowserProfile,
	/// Emit advisory diagnostics (retries, drops, close failures).
	pub debug: bool,
	pub session: SessionConfig,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			timeout: Duration::from_secs(30),
			max_concurrency: 5,
			proxy: None,
			retry: RetryPolicy::default(),
			profile: BrowserProfile::random(),
			debug: false,
			session: SessionConfig::default(),
		}
	}
}

impl ClientConfig {
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn with_max_concurrency(mut self, max: usize) -> Self {
		self.max_concurrency = max;
		self
	}

	pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
		self.proxy = proxy;
		self
	}

	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;
		self
	}

	/// Sets the retry count, keeping the backoff bounds.
	pub fn with_retries(mut self, retries: u32) -> Self {
		self.retry.retries = retries;
		self
	}

	pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
		self.retry.base_backoff = base;
		self.retry.max_backoff = max;
		self
	}

	pub fn with_profile(mut self, profile: BrowserProfile) -> Self {
		self.profile = profile;
		self
	}

	pub fn with_debug(mut self, debug: bool) -> Self {
		self.debug = debug;
		self
	}

	pub fn with_session(mut self, session: SessionConfig) -> Self {
		self.session = session;
		self
	}

	/// Checks every invariant; returns the first violation.
	pub fn validate(&self) -> Result<()> {
		if self.max_concurrency == 0 {
			return Err(Error::Configuration("maximum concurrent requests must be at least 1".into()));
		}
		if self.timeout.is_zero() {
			return Err(Error::Configuration("request timeout must be non-zero".into()));
		}
		if self.retry.base_backoff > self.retry.max_backoff {
			return Err(Error::Configuration(format!(
				"retry base backoff {:?} exceeds max backoff {:?}",
				self.retry.base_backoff, self.retry.max_backoff
			)));
		}
		if let Some(proxy) = &self.proxy {
			validate_proxy("request proxy", proxy)?;
		}
		self.session.validate()
	}
}

fn validate_proxy(label: &str, proxy: &str) -> Result<()> {
	let url = Url::parse(proxy).map_err(|e| Error::Configuration(format!("invalid {label} URL '{proxy}': {e}")))?;
	if url.host_str().is_none() {
		return Err(Error::Configuration(format!("{label} URL '{proxy}' has no host")));
	}
	Ok(())
}
