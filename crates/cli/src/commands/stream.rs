use anyhow::{Context, Result};
use gatehouse::{CancellationToken, Client, ClientConfig, Frame, Headers};
use tracing::info;

pub async fn execute(
	config: ClientConfig,
	url: &str,
	headers: &Headers,
	send: &[String],
	count: Option<usize>,
	cancel: &CancellationToken,
) -> Result<()> {
	// Sessions ignore the base URL; derive one so client logs stay readable.
	let base = url.strip_prefix("ws").map_or_else(|| url.to_string(), |rest| format!("http{rest}"));
	let client = Client::new(&base, config).context("Failed to build client")?;
	let session = client
		.session(url, headers)
		.await
		.with_context(|| format!("Failed to open session to {url}"))?;
	info!(target = "gatehouse.cli", url, "session open");

	for message in send {
		session
			.send(message.as_str())
			.await
			.with_context(|| format!("Failed to send '{message}'"))?;
	}

	let mut received = 0usize;
	while count.is_none_or(|limit| received < limit) {
		let frame = tokio::select! {
			_ = cancel.cancelled() => break,
			frame = session.recv() => frame,
		};
		let Some(frame) = frame else {
			info!(target = "gatehouse.cli", url, "session closed by peer");
			break;
		};
		print_frame(&frame);
		received += 1;
	}

	drop(session);
	let report = client.shutdown().await;
	if !report.is_clean() {
		info!(target = "gatehouse.cli", failed = report.failed, timed_out = report.timed_out, "unclean shutdown");
	}
	Ok(())
}

fn print_frame(frame: &Frame) {
	match frame {
		Frame::Text(text) => println!("{text}"),
		Frame::Binary(bytes) => println!("<binary {} bytes>", bytes.len()),
	}
}
