//! Client for the retrieval/LLM service.
//!
//! The service takes `POST {base}/query` with `{query, k, meta: {mode}}` and
//! answers `{answer, context}`. Context entries are either raw passages or
//! citation records; anything else in that list is skipped.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{KioskError, Result};

pub const DEFAULT_TOP_K: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRY_ATTEMPTS: u32 = 4;
const RETRY_BASE_DELAY_MS: u64 = 200;
const MAX_ERROR_DETAIL_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RagMeta {
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RagRequest {
    pub query: String,
    pub k: u32,
    pub meta: RagMeta,
}

impl RagRequest {
    pub fn new(query: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            k: DEFAULT_TOP_K,
            meta: RagMeta { mode: mode.into() },
        }
    }

    pub fn with_k(mut self, k: u32) -> Self {
        self.k = k;
        self
    }
}

/// Source metadata attached to a retrieved passage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub paragraph: Option<String>,
    #[serde(default, alias = "url")]
    pub file_url: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    Text(String),
    Citation(Citation),
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Text(text) => f.write_str(text),
            Reference::Citation(c) => {
                let mut parts = Vec::new();
                if let Some(file) = &c.file {
                    parts.push(file.clone());
                }
                if let Some(page) = c.page {
                    parts.push(format!("p. {page}"));
                }
                if let Some(paragraph) = &c.paragraph {
                    parts.push(format!("¶ {paragraph}"));
                }
                if parts.is_empty() {
                    if let Some(id) = &c.id {
                        parts.push(id.clone());
                    }
                }
                let mut line = parts.join(", ");
                if let Some(url) = &c.file_url {
                    if line.is_empty() {
                        line = url.clone();
                    } else {
                        line = format!("{line} <{url}>");
                    }
                }
                f.write_str(&line)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagResponse {
    #[serde(default, deserialize_with = "string_or_empty")]
    pub answer: String,
    #[serde(default, deserialize_with = "lenient_context")]
    pub context: Vec<Reference>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn string_or_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        _ => String::new(),
    })
}

fn lenient_context<'de, D>(deserializer: D) -> std::result::Result<Vec<Reference>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::Array(items)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(Reference::Text(s)),
            Value::Object(_) => serde_json::from_value::<Citation>(item)
                .ok()
                .map(Reference::Citation),
            _ => None,
        })
        .collect())
}

/// Anything that can answer a retrieval query.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn query(&self, request: &RagRequest) -> Result<RagResponse>;
}

/// HTTP client for the retrieval service.
#[derive(Debug, Clone)]
pub struct RagClient {
    client: Client,
    base_url: Option<String>,
    max_attempts: u32,
}

impl RagClient {
    /// `base_url` may be absent; queries then fail with
    /// [`KioskError::MissingRagUrl`].
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .user_agent(concat!("kiosko/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        let base_url = base_url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());

        Self {
            client,
            base_url,
            max_attempts: MAX_RETRY_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    fn retry_backoff(attempt: u32) -> Duration {
        let exp = 2u64.saturating_pow(attempt.saturating_sub(1));
        let base_ms = RETRY_BASE_DELAY_MS.saturating_mul(exp);
        let jitter = 1.0 + ((attempt as f64 * 0.37).sin() * 0.1);
        Duration::from_millis((base_ms as f64 * jitter) as u64)
    }

    async fn send_once(
        &self,
        url: &str,
        request: &RagRequest,
    ) -> std::result::Result<RagResponse, FailedAttempt> {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;

        let response = Self::check_response_status(response).await?;
        response.json::<RagResponse>().await.map_err(|e| {
            FailedAttempt::permanent(KioskError::Retrieval(format!("invalid response body: {e}")))
        })
    }

    async fn check_response_status(
        response: reqwest::Response,
    ) -> std::result::Result<reqwest::Response, FailedAttempt> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = truncate_error_detail(&extract_error_detail(&body), MAX_ERROR_DETAIL_CHARS);
        let error = if detail.is_empty() {
            KioskError::Retrieval(format!("service error {status}"))
        } else {
            KioskError::Retrieval(format!("service error {status}: {detail}"))
        };
        Err(FailedAttempt {
            error,
            retryable: is_retryable_status(status),
        })
    }

    fn map_reqwest_error(e: reqwest::Error) -> FailedAttempt {
        let retryable = e.is_timeout() || e.is_connect() || e.is_request();
        let error = if e.is_timeout() {
            KioskError::Retrieval(format!("timeout: {e}"))
        } else if e.is_connect() {
            KioskError::Retrieval(format!("network: {e}"))
        } else {
            KioskError::Retrieval(e.to_string())
        };
        FailedAttempt { error, retryable }
    }
}

/// A failed request and whether sending it again could succeed.
struct FailedAttempt {
    error: KioskError,
    retryable: bool,
}

impl FailedAttempt {
    fn permanent(error: KioskError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

/// Statuses worth another attempt: server faults and rate limiting.
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl RetrievalBackend for RagClient {
    async fn query(&self, request: &RagRequest) -> Result<RagResponse> {
        let base = self.base_url.as_deref().ok_or(KioskError::MissingRagUrl)?;
        let url = format!("{base}/query");
        debug!(
            "Retrieval query: mode={}, k={}, length={}",
            request.meta.mode,
            request.k,
            request.query.len()
        );

        let mut last_err = None;
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = Self::retry_backoff(attempt);
                warn!(
                    "Retrieval request failed (attempt {}/{}), retrying in {:?}...",
                    attempt, self.max_attempts, delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.send_once(&url, request).await {
                Ok(response) => {
                    debug!(
                        "Retrieval answer: {} chars, {} references",
                        response.answer.len(),
                        response.context.len()
                    );
                    return Ok(response);
                }
                Err(failed) => {
                    if failed.retryable && attempt + 1 < self.max_attempts {
                        last_err = Some(failed.error);
                        continue;
                    }
                    return Err(failed.error);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| KioskError::Retrieval("all retry attempts exhausted".to_string())))
    }
}

fn extract_error_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(msg) = value
            .get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .and_then(Value::as_str)
        {
            return msg.to_string();
        }
        if let Some(msg) = ["detail", "message"]
            .iter()
            .find_map(|k| value.get(*k))
            .and_then(Value::as_str)
        {
            return msg.to_string();
        }
    }

    trimmed.to_string()
}

fn truncate_error_detail(detail: &str, max_chars: usize) -> String {
    if detail.chars().count() <= max_chars {
        return detail.to_string();
    }

    let mut truncated = detail.chars().take(max_chars).collect::<String>();
    truncated.push_str("... [truncated]");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve canned responses, one per connection, and capture request bodies.
    async fn canned_server(
        responses: Vec<(u16, String)>,
    ) -> (String, Arc<tokio::sync::Mutex<Vec<String>>>, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let bodies = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let hits = Arc::new(AtomicUsize::new(0));
        let (bodies_srv, hits_srv) = (bodies.clone(), hits.clone());

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                hits_srv.fetch_add(1, Ordering::SeqCst);
                let request = read_request(&mut socket).await;
                bodies_srv.lock().await.push(request);
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}"), bodies, hits)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(split) = text.find("\r\n\r\n") {
                let length = text[..split]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= split + 4 + length {
                    return String::from_utf8_lossy(&buf[split + 4..split + 4 + length]).to_string();
                }
            }
        }
        String::new()
    }

    #[tokio::test]
    async fn test_missing_base_url() {
        let client = RagClient::new(None, DEFAULT_REQUEST_TIMEOUT);
        let err = client.query(&RagRequest::new("hi", "agente")).await.unwrap_err();
        assert!(matches!(err, KioskError::MissingRagUrl));

        let blank = RagClient::new(Some("   "), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(blank.base_url(), None);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = RagClient::new(Some("http://rag.local/api/"), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(client.base_url(), Some("http://rag.local/api"));
    }

    #[test]
    fn test_request_wire_shape() {
        let json = serde_json::to_value(RagRequest::new("q", "uso")).unwrap();
        assert_eq!(json, serde_json::json!({"query": "q", "k": 3, "meta": {"mode": "uso"}}));
    }

    #[test]
    fn test_response_mixed_context() {
        let body = r#"{
            "answer": "ok",
            "context": [
                "raw passage",
                {"id": 7, "file": "guide.pdf", "page": 4, "paragraph": 2, "url": "https://x/guide.pdf", "score": 0.8},
                42,
                {"file": "bad", "page": "four"}
            ]
        }"#;
        let response: RagResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.answer, "ok");
        assert_eq!(response.context.len(), 2);
        assert_eq!(response.context[0], Reference::Text("raw passage".to_string()));
        let Reference::Citation(c) = &response.context[1] else {
            panic!("expected citation");
        };
        assert_eq!(c.id.as_deref(), Some("7"));
        assert_eq!(c.paragraph.as_deref(), Some("2"));
        assert_eq!(c.file_url.as_deref(), Some("https://x/guide.pdf"));
        assert_eq!(
            response.context[1].to_string(),
            "guide.pdf, p. 4, ¶ 2 <https://x/guide.pdf>"
        );
    }

    #[test]
    fn test_response_tolerates_missing_fields() {
        let response: RagResponse = serde_json::from_str(r#"{"context": "nope"}"#).unwrap();
        assert_eq!(response, RagResponse::default());
        let response: RagResponse = serde_json::from_str(r#"{"answer": null}"#).unwrap();
        assert_eq!(response.answer, "");
    }

    #[test]
    fn test_retry_backoff_grows() {
        let first = RagClient::retry_backoff(1);
        let second = RagClient::retry_backoff(2);
        let third = RagClient::retry_backoff(3);
        assert!(first >= Duration::from_millis(180));
        assert!(second > first);
        assert!(third > second);
    }

    #[test]
    fn test_error_detail() {
        assert_eq!(extract_error_detail(r#"{"error":{"message":"boom"}}"#), "boom");
        assert_eq!(extract_error_detail(r#"{"detail":"bad k"}"#), "bad k");
        assert_eq!(extract_error_detail("  plain  "), "plain");
        let long = "x".repeat(600);
        assert!(truncate_error_detail(&long, 500).ends_with("... [truncated]"));
    }

    #[tokio::test]
    async fn test_query_round_trip() {
        let (base, bodies, _) = canned_server(vec![(
            200,
            r#"{"answer":"Hola","context":["p1"]}"#.to_string(),
        )])
        .await;
        let client = RagClient::new(Some(&base), Duration::from_secs(5));
        let response = client
            .query(&RagRequest::new("¿qué es?", "agente"))
            .await
            .unwrap();
        assert_eq!(response.answer, "Hola");
        assert_eq!(response.context, vec![Reference::Text("p1".to_string())]);

        let sent: Value = serde_json::from_str(&bodies.lock().await[0]).unwrap();
        assert_eq!(sent["query"], "¿qué es?");
        assert_eq!(sent["meta"]["mode"], "agente");
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let (base, _, hits) = canned_server(vec![
            (503, r#"{"detail":"warming up"}"#.to_string()),
            (200, r#"{"answer":"ready","context":[]}"#.to_string()),
        ])
        .await;
        let client = RagClient::new(Some(&base), Duration::from_secs(5));
        let response = client.query(&RagRequest::new("q", "agente")).await.unwrap();
        assert_eq!(response.answer, "ready");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (base, _, hits) =
            canned_server(vec![(400, r#"{"detail":"k too large"}"#.to_string())]).await;
        let client = RagClient::new(Some(&base), Duration::from_secs(5));
        let err = client.query(&RagRequest::new("q", "agente")).await.unwrap_err();
        assert!(err.to_string().contains("k too large"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_error_wording_does_not_trigger_retry() {
        let (base, _, hits) = canned_server(vec![
            (
                422,
                r#"{"detail":"network connection timeout is not a valid mode"}"#.to_string(),
            ),
            (200, r#"{"answer":"unexpected","context":[]}"#.to_string()),
        ])
        .await;
        let client = RagClient::new(Some(&base), Duration::from_secs(5));
        let err = client.query(&RagRequest::new("q", "agente")).await.unwrap_err();
        assert!(err.to_string().contains("422"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let (base, _, hits) = canned_server(vec![
            (429, r#"{"detail":"slow down"}"#.to_string()),
            (200, r#"{"answer":"ok","context":[]}"#.to_string()),
        ])
        .await;
        let client = RagClient::new(Some(&base), Duration::from_secs(5));
        let response = client.query(&RagRequest::new("q", "agente")).await.unwrap();
        assert_eq!(response.answer, "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_retryable_status() {
        assert!(is_retryable_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(reqwest::StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(reqwest::StatusCode::NOT_FOUND));
    }
}
