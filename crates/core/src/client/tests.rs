use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use gatehouse_runtime::{DialRequest, DialedSocket, EngineError, Error, RetryPolicy};
use serde_json::{Value, json};

use super::*;

#[derive(Default)]
struct RecordingEngine {
	responses: Mutex<VecDeque<RawResponse>>,
	seen: Mutex<Vec<HttpRequest>>,
	hang: bool,
}

impl RecordingEngine {
	fn replying(responses: impl IntoIterator<Item = RawResponse>) -> Arc<Self> {
		Arc::new(Self {
			responses: Mutex::new(responses.into_iter().collect()),
			..Self::default()
		})
	}

	fn hanging() -> Arc<Self> {
		Arc::new(Self {
			hang: true,
			..Self::default()
		})
	}

	fn seen(&self) -> Vec<HttpRequest> {
		self.seen.lock().unwrap().clone()
	}
}

#[async_trait]
impl HttpEngine for RecordingEngine {
	async fn perform(&self, request: &HttpRequest) -> std::result::Result<RawResponse, EngineError> {
		self.seen.lock().unwrap().push(request.clone());
		if self.hang {
			std::future::pending::<()>().await;
		}
		self.responses
			.lock()
			.unwrap()
			.pop_front()
			.ok_or_else(|| EngineError::new("no scripted response"))
	}
}

struct RefusingSockets;

#[async_trait]
impl SocketEngine for RefusingSockets {
	async fn dial(&self, _request: &DialRequest) -> std::result::Result<DialedSocket, EngineError> {
		Err(EngineError::new("connection refused"))
	}
}

fn config() -> ClientConfig {
	ClientConfig::default()
		.with_retry(RetryPolicy::none())
		.with_timeout(Duration::from_secs(5))
		.with_profile(BrowserProfile::Firefox)
}

fn client(engine: &Arc<RecordingEngine>) -> Client {
	Client::with_engines("api.example.com/", config(), Arc::clone(engine) as Arc<dyn HttpEngine>, Arc::new(RefusingSockets)).unwrap()
}

#[test]
fn resolves_endpoints_against_normalized_base() {
	let client = client(&RecordingEngine::replying([]));
	assert_eq!(client.base_url(), "https://api.example.com");
	assert_eq!(client.url("/v1/ticker"), "https://api.example.com/v1/ticker");
	assert_eq!(client.url("v1/ticker"), "https://api.example.com/v1/ticker");
	assert_eq!(client.url("http://other.local/x"), "http://other.local/x");
	assert_eq!(client.profile(), BrowserProfile::Firefox);
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
	let engine = RecordingEngine::replying([]);
	let err = Client::with_engines(
		"api.example.com",
		config().with_max_concurrency(0),
		engine as Arc<dyn HttpEngine>,
		Arc::new(RefusingSockets),
	)
	.unwrap_err();
	assert!(err.is_configuration());
}

#[tokio::test]
async fn get_decodes_json_body() {
	let engine = RecordingEngine::replying([RawResponse::new(200, r#"{"price": 42}"#)]);
	let client = client(&engine);

	let body: Value = client.get("/v1/ticker", &Headers::from([("X-Api-Key", "k")])).await.unwrap();
	assert_eq!(body, json!({"price": 42}));

	let seen = engine.seen();
	assert_eq!(seen[0].method, Method::Get);
	assert_eq!(seen[0].headers.get("x-api-key"), Some("k"));
}

#[tokio::test]
async fn post_sends_json_payload() {
	let engine = RecordingEngine::replying([RawResponse::new(201, "")]);
	let client = client(&engine);

	let created: Option<Value> = client
		.post("orders", &json!({"side": "buy", "qty": 1}), &Headers::new())
		.await
		.unwrap();
	assert_eq!(created, None);

	let request = &engine.seen()[0];
	assert_eq!(request.url, "https://api.example.com/orders");
	assert_eq!(request.headers.get("content-type"), Some("application/json"));
	let sent: Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
	assert_eq!(sent, json!({"side": "buy", "qty": 1}));
}

#[tokio::test]
async fn query_parameters_are_encoded_onto_the_endpoint() {
	let engine = RecordingEngine::replying([RawResponse::new(200, "[]")]);
	let client = client(&engine);

	let mut query = BTreeMap::new();
	query.insert("symbol".to_string(), QueryValue::from("BTC"));
	query.insert("ids".to_string(), QueryValue::from(vec!["1", "2"]));
	let _: Vec<Value> = client.get_with_query("/v1/trades", &query, &Headers::new()).await.unwrap();

	assert_eq!(engine.seen()[0].url, "https://api.example.com/v1/trades?ids%5B%5D=1&ids%5B%5D=2&symbol=BTC");
}

#[tokio::test]
async fn unknown_method_fails_before_any_request() {
	let engine = RecordingEngine::replying([]);
	let client = client(&engine);

	let err = client.request::<Value>("PATCH", "/x", None, &Headers::new()).await.unwrap_err();
	assert!(err.is_configuration());
	assert!(engine.seen().is_empty());
	assert_eq!(client.gate().available(), client.config().max_concurrency);
}

#[tokio::test]
async fn request_by_name_accepts_any_case() {
	let engine = RecordingEngine::replying([RawResponse::new(200, "{}")]);
	let client = client(&engine);

	let _: Value = client
		.request("put", "/settings", Some(&json!({"on": true})), &Headers::new())
		.await
		.unwrap();
	assert_eq!(engine.seen()[0].method, Method::Put);
}

#[tokio::test]
async fn raw_response_keeps_status_and_bytes() {
	let engine = RecordingEngine::replying([RawResponse::new(202, "accepted")]);
	let client = client(&engine);

	let response = client.get_raw("/jobs/1", &Headers::new()).await.unwrap();
	assert_eq!(response.status, 202);
	assert_eq!(response.body, b"accepted");
}

#[tokio::test]
async fn status_failures_surface_body() {
	let engine = RecordingEngine::replying([RawResponse::new(404, "not found")]);
	let client = client(&engine);

	let err = client.delete::<Value>("/orders/9", &Headers::new()).await.unwrap_err();
	assert_eq!(err.status(), Some(404));
	assert_eq!(err.body_text().as_deref(), Some("not found"));
}

#[tokio::test]
async fn caller_cancel_aborts_raw_request() {
	let engine = RecordingEngine::hanging();
	let client = client(&engine);
	let cancel = CancellationToken::new();

	let trigger = {
		let cancel = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(20)).await;
			cancel.cancel();
		})
	};
	let err = client
		.request_raw("GET", "/slow", None, &Headers::new(), &cancel)
		.await
		.unwrap_err();
	trigger.await.unwrap();

	assert!(matches!(err, Error::Cancelled { attempts: 1 }));
	assert_eq!(client.gate().available(), client.config().max_concurrency);
}

#[tokio::test]
async fn scoped_cancel_reaches_a_request_waiting_for_a_slot() {
	let engine = RecordingEngine::hanging();
	let client = Arc::new(
		Client::with_engines(
			"api.example.com",
			config().with_max_concurrency(1),
			Arc::clone(&engine) as Arc<dyn HttpEngine>,
			Arc::new(RefusingSockets),
		)
		.unwrap(),
	);

	let holder = {
		let client = Arc::clone(&client);
		tokio::spawn(async move { client.get_raw("/slow", &Headers::new()).await })
	};
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert_eq!(client.gate().available(), 0);

	let cancel = CancellationToken::new();
	let trigger = {
		let cancel = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(20)).await;
			cancel.cancel();
		})
	};
	let err = client
		.with_cancel(&cancel)
		.get::<Value>("/queued", &Headers::new())
		.await
		.unwrap_err();
	trigger.await.unwrap();

	assert!(matches!(err, Error::AdmissionCancelled));
	assert_eq!(engine.seen().len(), 1);
	holder.abort();
}

#[tokio::test]
async fn shutdown_cancels_in_flight_requests() {
	let engine = RecordingEngine::hanging();
	let client = Arc::new(client(&engine));

	let pending = {
		let client = Arc::clone(&client);
		tokio::spawn(async move { client.get_raw("/slow", &Headers::new()).await })
	};
	tokio::time::sleep(Duration::from_millis(20)).await;

	let report = client.shutdown().await;
	assert_eq!(report.attempted, 0);
	let err = pending.await.unwrap().unwrap_err();
	assert!(err.is_cancelled());
}

#[tokio::test]
async fn session_dial_failure_is_reported() {
	let client = client(&RecordingEngine::replying([]));
	let err = client.session("wss://stream.example.com/ws", &Headers::new()).await.unwrap_err();
	assert!(matches!(err, Error::Dial { .. }));
	assert!(client.pool().is_empty());
	assert_eq!(client.remove_closed_sessions(), 0);
}
