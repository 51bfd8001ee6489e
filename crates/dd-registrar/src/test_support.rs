//! In-process HTTP server and fixtures for client tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;

use crate::transport::TransportOptions;
use crate::types::{ContactInformation, DomainRegistrationRequest};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }

    pub fn query_params(&self, key: &str) -> Vec<String> {
        let url = reqwest::Url::parse(&format!("http://mock/?{}", self.query)).expect("query");
        url.query_pairs()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .collect()
    }

    pub fn query_param(&self, key: &str) -> Option<String> {
        self.query_params(key).into_iter().next()
    }
}

#[derive(Debug, Clone)]
pub struct MockReply {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl MockReply {
    pub fn json(status: u16, body: Value) -> Self {
        Self { status, content_type: "application/json", body: body.to_string() }
    }

    pub fn xml(status: u16, body: &str) -> Self {
        Self { status, content_type: "text/xml; charset=utf-8", body: body.to_string() }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self { status, content_type: "text/plain", body: body.to_string() }
    }

    pub fn empty(status: u16) -> Self {
        Self { status, content_type: "text/plain", body: String::new() }
    }
}

type Responder = Arc<dyn Fn(&RecordedRequest) -> MockReply + Send + Sync>;

#[derive(Clone)]
struct MockState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    responder: Responder,
}

pub struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockReply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState { requests: requests.clone(), responder: Arc::new(responder) };
        let app = Router::new().fallback(handle).with_state(state);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, requests }
    }

    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base(), path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

async fn handle(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let recorded = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect(),
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    let reply = (state.responder)(&recorded);
    state.requests.lock().expect("requests lock").push(recorded);
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, reply.content_type)], reply.body).into_response()
}

pub fn options() -> TransportOptions {
    TransportOptions {
        timeout: std::time::Duration::from_secs(5),
        ..Default::default()
    }
}

pub fn contact(first: &str) -> ContactInformation {
    ContactInformation {
        first_name: first.to_string(),
        last_name: "Doe".to_string(),
        organization: Some("Acme Hosting".to_string()),
        email: format!("{}@example.net", first.to_lowercase()),
        phone: "+1.5555551234".to_string(),
        address1: "1 Main St".to_string(),
        address2: Some("Suite 5".to_string()),
        city: "Springfield".to_string(),
        state: "IL".to_string(),
        postal_code: "62701".to_string(),
        country: "US".to_string(),
    }
}

/// Registration with only a registrant supplied.
pub fn registration(domain: &str, years: u32) -> DomainRegistrationRequest {
    let mut request = DomainRegistrationRequest::new(domain, years, contact("Jane"));
    request.nameservers = vec!["ns1.example.net".to_string(), "ns2.example.net".to_string()];
    request.auto_renew = true;
    request.privacy_protection = true;
    request
}
