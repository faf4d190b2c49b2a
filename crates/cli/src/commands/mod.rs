mod request;
mod stream;

use anyhow::Result;
use gatehouse::CancellationToken;
use tracing::debug;

use crate::cli::{Cli, Commands, to_headers};

pub async fn dispatch(cli: Cli) -> Result<()> {
	let config = cli.client.to_config(cli.verbose > 0);
	let cancel = CancellationToken::new();
	watch_interrupt(cancel.clone());

	match cli.command {
		Commands::Request {
			method,
			url,
			headers,
			data,
			include,
		} => request::execute(config, &method, &url, &to_headers(&headers), data.as_deref(), include, &cancel).await,
		Commands::Stream {
			url,
			headers,
			send,
			count,
		} => stream::execute(config, &url, &to_headers(&headers), &send, count, &cancel).await,
	}
}

/// Fires `cancel` on Ctrl-C.
fn watch_interrupt(cancel: CancellationToken) {
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			debug!(target = "gatehouse.cli", "interrupt received");
			cancel.cancel();
		}
	});
}
