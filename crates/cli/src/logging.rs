use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Overrides the verbosity flags when set; `RUST_LOG` is the fallback.
const LOG_ENV: &str = "GATEHOUSE_LOG";

/// HTTP and TLS stacks are chatty at debug; keep them a step behind ours.
const QUIET_DEPS: &str = "hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,tungstenite=warn,tokio_tungstenite=warn";

fn default_directives(verbosity: u8) -> String {
	match verbosity {
		// Retry exhaustion and close failures come back as errors anyway.
		0 => "warn".to_string(),
		// Retries, dropped frames, session lifecycle.
		1 => format!("info,gatehouse=debug,gatehouse_runtime=debug,gatehouse_cli=debug,{QUIET_DEPS}"),
		2 => "debug,hyper_util=info,rustls=info".to_string(),
		_ => "trace".to_string(),
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_env(LOG_ENV)
		.or_else(|_| EnvFilter::try_from_default_env())
		.unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_ansi(std::io::stderr().is_terminal())
		.with_target(verbosity >= 2)
		.with_level(true)
		.compact()
		.init();
}
