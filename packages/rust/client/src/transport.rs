//! Wire layer: one HTTP exchange, no retries, no timeouts.
//!
//! [`RequestClient`](crate::RequestClient) owns the resilience policy; a
//! [`Transport`] only turns an [`ApiRequest`] into a decoded JSON body or an error.

use pagechat_shared::{PageChatError, Result};
use reqwest::Client;
use serde_json::Value;
use tracing::trace;

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("PageChat/", env!("CARGO_PKG_VERSION"));

/// Maximum number of body bytes kept in a [`PageChatError::Backend`] message.
const MAX_ERROR_BODY: usize = 512;

/// HTTP verb of an API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single request as seen by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Absolute path on the backend, e.g. `/api/v1/query`.
    pub path: String,
    pub body: Option<Value>,
}

/// Performs one request/response exchange with the backend.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<Value>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport for the backend rooted at `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| PageChatError::config(format!("invalid backend URL '{base_url}': {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PageChatError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<Value> {
        let url = self.url_for(&request.path);
        trace!(%url, method = ?request.method, "sending request");

        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| map_reqwest_error(&url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PageChatError::Network(format!("{url}: failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(PageChatError::Backend {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body)
            .map_err(|e| PageChatError::parse(format!("{url}: response is not JSON: {e}")))
    }
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> PageChatError {
    if err.is_timeout() {
        return PageChatError::Timeout {
            endpoint: url.to_string(),
            timeout_ms: 0,
        };
    }
    PageChatError::Network(format!("{url}: {err}"))
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_json_and_decodes_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/analyze"))
            .and(body_json(json!({"url": "https://example.com/"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "Article", "summary": "A.", "topics": ["x"]
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let value = transport
            .send(&ApiRequest {
                method: Method::Post,
                path: "/api/v1/analyze".into(),
                body: Some(json!({"url": "https://example.com/"})),
            })
            .await
            .unwrap();

        assert_eq!(value["type"], "Article");
    }

    #[tokio::test]
    async fn non_success_status_is_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let err = transport
            .send(&ApiRequest {
                method: Method::Post,
                path: "/api/v1/query".into(),
                body: None,
            })
            .await
            .unwrap_err();

        match err {
            PageChatError::Backend { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected Backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&server.uri()).unwrap();
        let err = transport
            .send(&ApiRequest {
                method: Method::Get,
                path: "/".into(),
                body: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PageChatError::Parse { .. }));
    }

    #[tokio::test]
    async fn unreachable_backend_is_network_error() {
        // Port 9 (discard) is practically never listening on test machines.
        let transport = HttpTransport::new("http://127.0.0.1:9").unwrap();
        let err = transport
            .send(&ApiRequest {
                method: Method::Get,
                path: "/".into(),
                body: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PageChatError::Network(_)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é…");
    }
}
