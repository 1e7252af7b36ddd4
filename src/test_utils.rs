//! Shared test utilities: fake transports, recording interceptors, test keys
//! and proptest generators.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use proptest::prelude::*;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

use crate::auth::{AppCredential, Credentials, GitHubApp};
use crate::github::{
    ApiRequest, ApiResponse, ClientConfig, GitHubApiError, GitHubClient, Interceptor, Transport,
};
use crate::types::{AppId, DeliveryId};
use crate::webhooks::WebhookEvent;

pub const TEST_PRIVATE_KEY: &str = include_str!("../testdata/app-key.pem");
pub const TEST_PUBLIC_KEY: &str = include_str!("../testdata/app-key.pub.pem");

pub fn test_credential(app_id: u64) -> AppCredential {
    AppCredential::from_pem(AppId(app_id), TEST_PRIVATE_KEY.as_bytes())
        .expect("test key is valid")
}

type Responder = dyn Fn(&ApiRequest) -> Result<ApiResponse, GitHubApiError> + Send + Sync;

/// A transport that answers from a closure and records every request.
pub struct MockTransport {
    responder: Box<Responder>,
    latency: Duration,
    requests: Mutex<Vec<ApiRequest>>,
    timings: Mutex<Vec<(Instant, Instant)>>,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, GitHubApiError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            timings: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with `200` and `data`.
    pub fn ok(data: Value) -> Self {
        Self::new(move |_| Ok(ApiResponse::new(200, data.clone())))
    }

    /// Each call sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Requests received so far, authorization headers included.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// (start, end) of every call, in completion order.
    pub fn timings(&self) -> Vec<(Instant, Instant)> {
        self.timings.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, GitHubApiError>> {
        Box::pin(async move {
            let start = Instant::now();
            self.requests.lock().unwrap().push(request.clone());
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let result = (self.responder)(&request);
            self.timings.lock().unwrap().push((start, Instant::now()));
            result
        })
    }
}

/// An interceptor that appends `"{name}:{hook} ..."` lines to a shared log.
pub struct RecordingInterceptor {
    name: &'static str,
    log: Mutex<Arc<Mutex<Vec<String>>>>,
}

impl RecordingInterceptor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            log: Mutex::new(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    pub fn shared_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log.lock().unwrap())
    }

    /// Writes into `log` instead of this interceptor's own.
    pub fn share_log(&self, log: &Arc<Mutex<Vec<String>>>) {
        *self.log.lock().unwrap() = Arc::clone(log);
    }

    fn push(&self, line: String) {
        self.log.lock().unwrap().lock().unwrap().push(line);
    }
}

impl Interceptor for RecordingInterceptor {
    fn on_request(&self, request: &ApiRequest) {
        self.push(format!("{}:request {}", self.name, request.display_url()));
    }

    fn on_response(&self, _request: &ApiRequest, response: &ApiResponse) {
        self.push(format!("{}:response {}", self.name, response.status));
    }

    fn on_error(&self, _request: &ApiRequest, error: &GitHubApiError) {
        let status = error.status_code.map(|s| s.to_string()).unwrap_or_default();
        self.push(format!("{}:error {}", self.name, status));
    }
}

/// A client authenticating with the fixed token `test-token`.
pub fn token_client(transport: Arc<MockTransport>, config: ClientConfig) -> GitHubClient {
    GitHubClient::new(
        transport,
        Credentials::Token("test-token".to_string()),
        config,
    )
}

/// An app with app id 1 and no request spacing.
pub fn test_app(transport: Arc<MockTransport>) -> GitHubApp {
    GitHubApp::new(test_credential(1), transport, ClientConfig::unthrottled())
}

/// A webhook event with the given name and payload.
pub fn event(name: &str, payload: Value) -> WebhookEvent {
    WebhookEvent::new(DeliveryId::from("delivery-1"), name, payload)
}

/// An `issues` event on `octocat/hello-world` from installation 42.
pub fn issue_event(action: &str, number: u64) -> WebhookEvent {
    event(
        "issues",
        json!({
            "action": action,
            "issue": { "number": number, "title": "Found a bug" },
            "repository": {
                "name": "hello-world",
                "owner": { "login": "octocat" }
            },
            "sender": { "login": "octocat", "type": "User" },
            "installation": { "id": 42 }
        }),
    )
}

pub fn arb_event_name() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{0,20}".prop_map(String::from)
}

pub fn arb_action() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{0,15}".prop_map(String::from)
}

/// Collects formatted tracing output so tests can assert on log lines.
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A `debug`-level subscriber writing plain text into this capture.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_ansi(false)
            .with_writer(self.clone())
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }

    /// Captured lines containing `needle`.
    pub fn lines_with(&self, needle: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buf: Arc::clone(&self.buf),
        }
    }
}

pub struct CaptureWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
