use std::io::Write;

use anyhow::{Context, Result, bail};
use gatehouse::{CancellationToken, Client, ClientConfig, Error, Headers};

pub async fn execute(
	config: ClientConfig,
	method: &str,
	url: &str,
	headers: &Headers,
	data: Option<&str>,
	include: bool,
	cancel: &CancellationToken,
) -> Result<()> {
	let client = Client::new(url, config).context("Failed to build client")?;

	let mut headers = headers.clone();
	let body = match data {
		Some(raw) => {
			serde_json::from_str::<serde_json::Value>(raw).context("--data is not valid JSON")?;
			if !headers.contains("content-type") {
				headers.insert("content-type", "application/json");
			}
			Some(raw.as_bytes().to_vec())
		}
		None => None,
	};

	let target = client.base_url().to_string();
	let response = match client.request_raw(method, &target, body, &headers, cancel).await {
		Ok(response) => response,
		Err(Error::Status { status, body, attempts }) => {
			let text = String::from_utf8_lossy(&body);
			if !text.is_empty() {
				eprintln!("{text}");
			}
			bail!("{method} {target} failed with status {status} after {attempts} attempt(s)");
		}
		Err(err) => return Err(err).with_context(|| format!("{method} {target} failed")),
	};

	if include {
		eprintln!("HTTP {}", response.status);
		for (name, value) in response.headers.iter() {
			eprintln!("{name}: {value}");
		}
	}

	let mut stdout = std::io::stdout().lock();
	stdout.write_all(&response.body).context("Failed to write response body")?;
	if !response.body.ends_with(b"\n") {
		writeln!(stdout)?;
	}
	Ok(())
}
