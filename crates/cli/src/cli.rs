use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use gatehouse::{BrowserProfile, ClientConfig, Headers, RetryPolicy, SessionConfig};

#[derive(Parser, Debug)]
#[command(name = "gatehouse")]
#[command(about = "Rate-bounded HTTP requests and pooled WebSocket streams")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v client diagnostics, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(flatten)]
	pub client: ClientArgs,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
	/// Per-attempt request timeout in seconds
	#[arg(long, global = true, env = "GATEHOUSE_TIMEOUT", value_name = "SECS", default_value_t = 30)]
	pub timeout: u64,

	/// Maximum requests in flight
	#[arg(long, global = true, env = "GATEHOUSE_MAX_CONCURRENCY", default_value_t = 5)]
	pub concurrency: usize,

	/// Retries after the first attempt
	#[arg(long, global = true, env = "GATEHOUSE_RETRIES", default_value_t = 3)]
	pub retries: u32,

	/// Backoff before the first retry, in milliseconds
	#[arg(long, global = true, env = "GATEHOUSE_RETRY_WAIT_MS", value_name = "MS", default_value_t = 2000)]
	pub retry_wait: u64,

	/// Upper bound for any backoff, in milliseconds
	#[arg(long, global = true, env = "GATEHOUSE_RETRY_MAX_WAIT_MS", value_name = "MS", default_value_t = 5000)]
	pub retry_max_wait: u64,

	/// Treat 429 and 5xx responses as final instead of retrying them
	#[arg(long, global = true)]
	pub no_retry_server_errors: bool,

	/// Proxy for HTTP requests
	#[arg(long, global = true, env = "GATEHOUSE_PROXY", value_name = "URL")]
	pub proxy: Option<String>,

	/// HTTP CONNECT proxy for WebSocket sessions
	#[arg(long, global = true, env = "GATEHOUSE_WS_PROXY", value_name = "URL")]
	pub ws_proxy: Option<String>,

	/// Browser profile: chrome, safari, firefox or randomized
	#[arg(long, global = true, env = "GATEHOUSE_PROFILE")]
	pub profile: Option<BrowserProfile>,

	/// Do not request per-message compression
	#[arg(long, global = true)]
	pub no_compression: bool,

	/// Seconds between heartbeat pings
	#[arg(long, global = true, env = "GATEHOUSE_PING_INTERVAL", value_name = "SECS", default_value_t = 30)]
	pub ping_interval: u64,

	/// Read deadline in seconds, refreshed by any inbound frame
	#[arg(long, global = true, env = "GATEHOUSE_PONG_WAIT", value_name = "SECS", default_value_t = 60)]
	pub pong_wait: u64,

	/// Inbound queue capacity per session
	#[arg(long, global = true, env = "GATEHOUSE_BUFFER_SIZE", default_value_t = 100)]
	pub buffer_size: usize,
}

impl ClientArgs {
	/// Maps the flags onto a client configuration; `debug` enables client diagnostics.
	pub fn to_config(&self, debug: bool) -> ClientConfig {
		let session = SessionConfig::default()
			.with_proxy(self.ws_proxy.clone())
			.with_compression(!self.no_compression)
			.with_ping_interval(Duration::from_secs(self.ping_interval))
			.with_pong_wait(Duration::from_secs(self.pong_wait))
			.with_buffer_size(self.buffer_size);

		let config = ClientConfig::default()
			.with_timeout(Duration::from_secs(self.timeout))
			.with_max_concurrency(self.concurrency)
			.with_proxy(self.proxy.clone())
			.with_retry(RetryPolicy {
				retries: self.retries,
				base_backoff: Duration::from_millis(self.retry_wait),
				max_backoff: Duration::from_millis(self.retry_max_wait),
				retry_server_errors: !self.no_retry_server_errors,
			})
			.with_debug(debug)
			.with_session(session);

		match self.profile {
			Some(profile) => config.with_profile(profile),
			None => config,
		}
	}
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Issue one request and print the response body
	Request {
		/// GET, PUT, POST or DELETE
		method: String,

		/// Absolute URL, or host and path (https is assumed)
		url: String,

		/// Extra header, as "Name: value" (repeatable)
		#[arg(short = 'H', long = "header", value_name = "HEADER", value_parser = parse_header)]
		headers: Vec<(String, String)>,

		/// JSON request body
		#[arg(short, long, value_name = "JSON")]
		data: Option<String>,

		/// Also print the status line and response headers to stderr
		#[arg(short, long)]
		include: bool,
	},

	/// Open a WebSocket session and print inbound frames
	Stream {
		/// ws:// or wss:// URL
		url: String,

		/// Handshake header, as "Name: value" (repeatable)
		#[arg(short = 'H', long = "header", value_name = "HEADER", value_parser = parse_header)]
		headers: Vec<(String, String)>,

		/// Text frame to send once connected (repeatable, sent in order)
		#[arg(short, long, value_name = "MESSAGE")]
		send: Vec<String>,

		/// Stop after this many inbound frames
		#[arg(short = 'n', long)]
		count: Option<usize>,
	},
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
	Headers::parse_line(raw).ok_or_else(|| format!("expected \"Name: value\", got '{raw}'"))
}

pub fn to_headers(pairs: &[(String, String)]) -> Headers {
	let mut headers = Headers::new();
	for (name, value) in pairs {
		headers.append(name.as_str(), value.as_str());
	}
	headers
}
