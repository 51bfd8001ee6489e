/// HTTP plumbing shared by the registrar clients.
///
/// Each client owns one `HttpContext`: a `reqwest::Client` (pooled, safe to
/// share across concurrent calls) plus the base URL picked from the live or
/// sandbox endpoint. Per-call timeouts come from `TransportOptions`.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use crate::error::RegistrarError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("domain-desk/", env!("CARGO_PKG_VERSION"));
const BODY_SNIPPET_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Live and sandbox/OTE base URLs of one provider.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    pub live: &'static str,
    pub sandbox: &'static str,
}

impl Endpoint {
    pub const fn single(url: &'static str) -> Self {
        Self { live: url, sandbox: url }
    }

    pub fn select(&self, sandbox: bool) -> &'static str {
        if sandbox { self.sandbox } else { self.live }
    }
}

pub fn build_client(options: &TransportOptions) -> Client {
    Client::builder()
        .timeout(options.timeout)
        .user_agent(options.user_agent.clone())
        .build()
        .unwrap_or_else(|err| {
            tracing::warn!(error = %err, "falling back to default HTTP client");
            Client::new()
        })
}

#[derive(Debug, Clone)]
pub struct HttpContext {
    pub client: Client,
    base_url: String,
}

impl HttpContext {
    pub fn new(base_url: &str, options: &TransportOptions) -> Self {
        Self {
            client: build_client(options),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `base_url` joined with `path` (which should start with `/`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Raw reply: status and body text, before any vendor interpretation.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

impl HttpReply {
    pub fn snippet(&self) -> String {
        let trimmed = self.body.trim();
        if trimmed.chars().count() > BODY_SNIPPET_LEN {
            let cut: String = trimmed.chars().take(BODY_SNIPPET_LEN).collect();
            format!("{}…", cut)
        } else {
            trimmed.to_string()
        }
    }

    /// Error for a non-2xx reply whose body we could not interpret.
    pub fn unreadable(&self) -> RegistrarError {
        if self.body.trim().is_empty() {
            RegistrarError::Transport(format!("HTTP {}", self.status))
        } else {
            RegistrarError::Transport(format!("HTTP {}: {}", self.status, self.snippet()))
        }
    }
}

pub async fn send(request: RequestBuilder) -> Result<HttpReply, RegistrarError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    Ok(HttpReply { status, body })
}

/// Send and decode a JSON reply.
///
/// Non-2xx replies with a JSON body are handed back so the client can pull
/// out the vendor's error; non-2xx replies without one become transport
/// failures. An empty 2xx body decodes to `Value::Null`.
pub async fn send_json(request: RequestBuilder) -> Result<(StatusCode, Value), RegistrarError> {
    let reply = send(request).await?;
    if reply.body.trim().is_empty() {
        return if reply.status.is_success() {
            Ok((reply.status, Value::Null))
        } else {
            Err(reply.unreadable())
        };
    }
    match serde_json::from_str::<Value>(&reply.body) {
        Ok(value) => Ok((reply.status, value)),
        Err(err) if reply.status.is_success() => Err(RegistrarError::MalformedResponse(format!(
            "expected JSON: {} ({})",
            err,
            reply.snippet()
        ))),
        Err(_) => Err(reply.unreadable()),
    }
}

/// Send and return an XML (or any text) body. Non-2xx replies are returned as
/// well: SOAP faults arrive with HTTP 500.
pub async fn send_text(request: RequestBuilder) -> Result<HttpReply, RegistrarError> {
    let reply = send(request).await?;
    if !reply.status.is_success() && !reply.body.trim_start().starts_with('<') {
        return Err(reply.unreadable());
    }
    Ok(reply)
}

/// First string found at any of the candidate keys.
pub fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| value.get(*k).and_then(Value::as_str))
}

/// String array helper used for nameserver lists.
pub fn str_array(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

/// Accept numbers that arrive as JSON numbers or as strings.
pub fn loose_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

pub fn loose_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Accept booleans encoded as `true`, `"true"`, `"yes"`, `"on"`, `1`.
pub fn loose_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" | "enabled" => Some(true),
            "false" | "no" | "off" | "0" | "disabled" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
