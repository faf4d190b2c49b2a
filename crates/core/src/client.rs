//! The client facade.

use std::collections::BTreeMap;
use std::sync::Arc;

use gatehouse_protocol::{BrowserProfile, Headers, Method, QueryValue, build_query_string, join_endpoint, normalize_base_url};
use gatehouse_runtime::{
	CancellationToken, ClientConfig, CloseAllReport, ConcurrencyGate, HttpEngine, HttpRequest, RawResponse, RequestExecutor,
	RequestGateway, ReqwestEngine, Result, Session, SessionPool, SocketEngine, TungsteniteEngine,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// One gated request path and one session pool behind a shared configuration.
///
/// All resources belong to the client. Dropping it cancels in-flight
/// requests, and pooled sessions nobody else holds are released;
/// [`shutdown`](Self::shutdown) does both and waits for the closes.
pub struct Client {
	base_url: String,
	config: Arc<ClientConfig>,
	profile: BrowserProfile,
	gateway: RequestGateway,
	pool: SessionPool,
	shutdown: CancellationToken,
}

impl Client {
	/// Builds a client over the default `reqwest` and `tokio-tungstenite` engines.
	///
	/// The configuration is validated first; a randomized browser profile is
	/// resolved once, here.
	pub fn new(base_url: &str, config: ClientConfig) -> Result<Self> {
		config.validate()?;
		let http = ReqwestEngine::new(config.profile, config.proxy.as_deref(), config.timeout)?;
		let profile = http.profile();
		let sockets = TungsteniteEngine::new().with_connect_timeout(config.timeout);
		Self::assemble(base_url, config, Arc::new(http), Arc::new(sockets), profile)
	}

	/// Builds a client over caller-supplied engines.
	pub fn with_engines(
		base_url: &str,
		config: ClientConfig,
		http: Arc<dyn HttpEngine>,
		sockets: Arc<dyn SocketEngine>,
	) -> Result<Self> {
		config.validate()?;
		let profile = config.profile.resolve();
		Self::assemble(base_url, config, http, sockets, profile)
	}

	fn assemble(
		base_url: &str,
		config: ClientConfig,
		http: Arc<dyn HttpEngine>,
		sockets: Arc<dyn SocketEngine>,
		profile: BrowserProfile,
	) -> Result<Self> {
		let gate = ConcurrencyGate::new(config.max_concurrency)?;
		let executor = RequestExecutor::new(http, config.retry.clone(), config.timeout).with_debug(config.debug);
		let pool = SessionPool::new(sockets, config.session.clone()).with_debug(config.debug);
		let base_url = normalize_base_url(base_url);

		debug!(
			target = "gatehouse.client",
			%base_url,
			%profile,
			max_concurrency = config.max_concurrency,
			retries = config.retry.retries,
			"client ready"
		);
		Ok(Self {
			base_url,
			config: Arc::new(config),
			profile,
			gateway: RequestGateway::new(gate, executor),
			pool,
			shutdown: CancellationToken::new(),
		})
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// The concrete browser profile this client presents.
	pub fn profile(&self) -> BrowserProfile {
		self.profile
	}

	pub fn gate(&self) -> &ConcurrencyGate {
		self.gateway.gate()
	}

	pub fn pool(&self) -> &SessionPool {
		&self.pool
	}

	/// Resolves an endpoint against the base URL. Absolute URLs pass through.
	pub fn url(&self, endpoint: &str) -> String {
		if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
			endpoint.to_string()
		} else {
			join_endpoint(&self.base_url, endpoint)
		}
	}

	/// Requests issued through the returned scope also stop when `cancel` fires,
	/// whether they are still waiting for a slot or already running.
	pub fn with_cancel<'a>(&'a self, cancel: &'a CancellationToken) -> RequestScope<'a> {
		RequestScope {
			client: self,
			cancel: Some(cancel),
		}
	}

	fn scope(&self) -> RequestScope<'_> {
		RequestScope {
			client: self,
			cancel: None,
		}
	}

	pub async fn get<T: DeserializeOwned>(&self, endpoint: &str, headers: &Headers) -> Result<T> {
		self.scope().get(endpoint, headers).await
	}

	/// Like [`get`](Self::get), with `query` encoded onto the endpoint.
	pub async fn get_with_query<T: DeserializeOwned>(
		&self,
		endpoint: &str,
		query: &BTreeMap<String, QueryValue>,
		headers: &Headers,
	) -> Result<T> {
		self.scope().get_with_query(endpoint, query, headers).await
	}

	pub async fn post<T, P>(&self, endpoint: &str, payload: &P, headers: &Headers) -> Result<T>
	where
		T: DeserializeOwned,
		P: Serialize + ?Sized,
	{
		self.scope().post(endpoint, payload, headers).await
	}

	pub async fn put<T, P>(&self, endpoint: &str, payload: &P, headers: &Headers) -> Result<T>
	where
		T: DeserializeOwned,
		P: Serialize + ?Sized,
	{
		self.scope().put(endpoint, payload, headers).await
	}

	pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str, headers: &Headers) -> Result<T> {
		self.scope().delete(endpoint, headers).await
	}

	/// GET returning the undecoded response.
	pub async fn get_raw(&self, endpoint: &str, headers: &Headers) -> Result<RawResponse> {
		self.scope().get_raw(endpoint, headers).await
	}

	/// Issues a request by method name and decodes the JSON response.
	///
	/// Unknown methods fail with a configuration error before any network
	/// activity.
	pub async fn request<T: DeserializeOwned>(
		&self,
		method: &str,
		endpoint: &str,
		payload: Option<&serde_json::Value>,
		headers: &Headers,
	) -> Result<T> {
		self.scope().request(method, endpoint, payload, headers).await
	}

	/// Issues a request by method name with a raw body, observing `cancel`.
	pub async fn request_raw(
		&self,
		method: &str,
		endpoint: &str,
		body: Option<Vec<u8>>,
		headers: &Headers,
		cancel: &CancellationToken,
	) -> Result<RawResponse> {
		let method: Method = method.parse()?;
		let mut request = self.build(method, endpoint, headers);
		if let Some(body) = body {
			request = request.with_body(body);
		}
		self.dispatch(request, Some(cancel)).await
	}

	fn build(&self, method: Method, endpoint: &str, headers: &Headers) -> HttpRequest {
		HttpRequest::new(method, self.url(endpoint)).with_headers(headers.clone())
	}

	/// Runs a request under a token that fires on client shutdown or, when
	/// given, on the caller's token.
	async fn dispatch(&self, request: HttpRequest, cancel: Option<&CancellationToken>) -> Result<RawResponse> {
		let token = self.shutdown.child_token();
		let Some(cancel) = cancel else {
			return self.gateway.send(&request, &token).await;
		};

		tokio::select! {
			result = self.gateway.send(&request, &token) => result,
			result = async {
				cancel.cancelled().await;
				token.cancel();
				std::future::pending::<Result<RawResponse>>().await
			} => result,
		}
	}

	/// The live session for `address`, dialing one if needed.
	///
	/// `headers` are sent with the handshake of a fresh dial only.
	pub async fn session(&self, address: &str, headers: &Headers) -> Result<Arc<Session>> {
		self.pool.get_or_create(address, headers).await
	}

	/// Drops pool entries whose session has already closed.
	pub fn remove_closed_sessions(&self) -> usize {
		self.pool.remove_closed()
	}

	/// Closes every pooled session; see [`SessionPool::close_all`].
	pub async fn close_all_sessions(&self) -> CloseAllReport {
		self.pool.close_all().await
	}

	/// Cancels in-flight requests and closes every pooled session.
	pub async fn shutdown(&self) -> CloseAllReport {
		self.shutdown.cancel();
		self.pool.close_all().await
	}
}

impl Drop for Client {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}

impl std::fmt::Debug for Client {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Client")
			.field("base_url", &self.base_url)
			.field("profile", &self.profile)
			.field("sessions", &self.pool.len())
			.finish_non_exhaustive()
	}
}

/// Borrowed view of a [`Client`] whose requests also observe a caller token.
///
/// Obtained from [`Client::with_cancel`].
#[derive(Clone, Copy)]
pub struct RequestScope<'a> {
	client: &'a Client,
	cancel: Option<&'a CancellationToken>,
}

impl RequestScope<'_> {
	pub async fn get<T: DeserializeOwned>(&self, endpoint: &str, headers: &Headers) -> Result<T> {
		self.get_raw(endpoint, headers).await?.json()
	}

	pub async fn get_with_query<T: DeserializeOwned>(
		&self,
		endpoint: &str,
		query: &BTreeMap<String, QueryValue>,
		headers: &Headers,
	) -> Result<T> {
		let query = build_query_string(query);
		let endpoint = if query.is_empty() {
			endpoint.to_string()
		} else {
			format!("{endpoint}?{query}")
		};
		self.get(&endpoint, headers).await
	}

	pub async fn post<T, P>(&self, endpoint: &str, payload: &P, headers: &Headers) -> Result<T>
	where
		T: DeserializeOwned,
		P: Serialize + ?Sized,
	{
		let request = self.client.build(Method::Post, endpoint, headers).with_json(payload)?;
		self.client.dispatch(request, self.cancel).await?.json()
	}

	pub async fn put<T, P>(&self, endpoint: &str, payload: &P, headers: &Headers) -> Result<T>
	where
		T: DeserializeOwned,
		P: Serialize + ?Sized,
	{
		let request = self.client.build(Method::Put, endpoint, headers).with_json(payload)?;
		self.client.dispatch(request, self.cancel).await?.json()
	}

	pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str, headers: &Headers) -> Result<T> {
		let request = self.client.build(Method::Delete, endpoint, headers);
		self.client.dispatch(request, self.cancel).await?.json()
	}

	pub async fn get_raw(&self, endpoint: &str, headers: &Headers) -> Result<RawResponse> {
		let request = self.client.build(Method::Get, endpoint, headers);
		self.client.dispatch(request, self.cancel).await
	}

	pub async fn request<T: DeserializeOwned>(
		&self,
		method: &str,
		endpoint: &str,
		payload: Option<&serde_json::Value>,
		headers: &Headers,
	) -> Result<T> {
		let method: Method = method.parse()?;
		let mut request = self.client.build(method, endpoint, headers);
		if let Some(payload) = payload {
			request = request.with_json(payload)?;
		}
		self.client.dispatch(request, self.cancel).await?.json()
	}
}

impl std::fmt::Debug for RequestScope<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RequestScope")
			.field("client", self.client)
			.field("cancellable", &self.cancel.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests;
