//! Resilient request client: per-attempt timeout, bounded retries, linear backoff.

use std::sync::Arc;
use std::time::Duration;

use pagechat_shared::{
    AnalysisResult, AnalyzeRequest, ClientConfig, IndexRequest, PageChatError, QueryRequest,
    QueryResult, Result, Target,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::transport::{ApiRequest, HttpTransport, Method, Transport};

/// Backend operations known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Health,
    Index,
    Analyze,
    Query,
}

impl Endpoint {
    pub fn method(self) -> Method {
        match self {
            Self::Health => Method::Get,
            Self::Index | Self::Analyze | Self::Query => Method::Post,
        }
    }

    /// Request path. Health lives at the server root, everything else under `prefix`.
    pub fn path(self, prefix: &str) -> String {
        let prefix = prefix.trim_end_matches('/');
        match self {
            Self::Health => "/".to_string(),
            Self::Index => format!("{prefix}/index"),
            Self::Analyze => format!("{prefix}/analyze"),
            Self::Query => format!("{prefix}/query"),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Index => "index",
            Self::Analyze => "analyze",
            Self::Query => "query",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Wraps a [`Transport`] with the timeout/retry policy from [`ClientConfig`].
///
/// Cheap to clone; clones share the underlying transport.
#[derive(Clone)]
pub struct RequestClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl std::fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RequestClient {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    /// Client talking HTTP to `config.base_url`.
    pub fn http(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.base_url)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Issue `endpoint` with up to `1 + retries` attempts.
    ///
    /// Each attempt is bounded by `config.timeout`; an attempt that runs out
    /// of time is dropped, which cancels the underlying request. Before
    /// attempt `n + 1` the client waits `backoff_unit * n`. Non-retryable
    /// errors are returned immediately.
    pub async fn call(&self, endpoint: Endpoint, body: Option<Value>) -> Result<Value> {
        self.call_as(endpoint, body).await
    }

    /// Like [`call`](Self::call), decoding the body as `T` inside each attempt.
    ///
    /// A body that does not decode fails the attempt and is retried like any
    /// other retryable failure.
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        body: Option<Value>,
    ) -> Result<T> {
        let request = ApiRequest {
            method: endpoint.method(),
            path: endpoint.path(&self.config.api_prefix),
            body,
        };
        let attempts = self.config.retries.saturating_add(1);

        let mut attempt = 1;
        loop {
            let started = Instant::now();
            let exchange = async {
                let value = self.transport.send(&request).await?;
                decode::<T>(endpoint, value)
            };
            let outcome = match tokio::time::timeout(self.config.timeout, exchange).await {
                Ok(result) => result,
                Err(_) => Err(PageChatError::Timeout {
                    endpoint: request.path.clone(),
                    timeout_ms: duration_ms(self.config.timeout),
                }),
            };
            let elapsed_ms = duration_ms(started.elapsed());

            match outcome {
                Ok(value) => {
                    debug!(attempt, attempts, elapsed_ms, "request succeeded");
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() || attempt >= attempts => {
                    warn!(attempt, attempts, elapsed_ms, %error, "request failed");
                    return Err(error);
                }
                Err(error) => {
                    let backoff = self.config.backoff_unit * attempt;
                    warn!(
                        attempt,
                        attempts,
                        elapsed_ms,
                        backoff_ms = duration_ms(backoff),
                        %error,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Typed endpoints
    // -----------------------------------------------------------------------

    /// `GET /`: succeeds when the backend answers at all.
    pub async fn health(&self) -> Result<Value> {
        self.call(Endpoint::Health, None).await
    }

    /// `POST /index`: ask the backend to start indexing `target`.
    pub async fn index(&self, target: &Target, max_pages: u32) -> Result<Value> {
        let body = encode(&IndexRequest {
            url: target.as_str().to_string(),
            max_pages,
        })?;
        self.call(Endpoint::Index, Some(body)).await
    }

    /// `POST /analyze`: structured analysis, or the `Empty` sentinel while indexing.
    pub async fn analyze(&self, target: &Target) -> Result<AnalysisResult> {
        let body = encode(&AnalyzeRequest {
            url: target.as_str().to_string(),
        })?;
        self.call_as(Endpoint::Analyze, Some(body)).await
    }

    /// `POST /query`: answer a question against the indexed page.
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResult> {
        self.call_as(Endpoint::Query, Some(encode(request)?)).await
    }
}

fn encode<T: Serialize>(payload: &T) -> Result<Value> {
    serde_json::to_value(payload)
        .map_err(|e| PageChatError::parse(format!("failed to encode request: {e}")))
}

fn decode<T: DeserializeOwned>(endpoint: Endpoint, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| PageChatError::parse(format!("unexpected {endpoint} response: {e}")))
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ANALYZE, HEALTH, INDEX, QUERY, ScriptedTransport, Step};
    use serde_json::json;

    fn client(transport: &Arc<ScriptedTransport>) -> RequestClient {
        RequestClient::new(transport.clone(), ClientConfig::default())
    }

    fn target() -> Target {
        Target::parse("https://example.com/post").unwrap()
    }

    #[test]
    fn endpoint_paths_use_prefix() {
        assert_eq!(Endpoint::Health.path("/api/v1"), "/");
        assert_eq!(Endpoint::Index.path("/api/v1"), INDEX);
        assert_eq!(Endpoint::Analyze.path("/api/v1/"), ANALYZE);
        assert_eq!(Endpoint::Query.path(""), "/query");
        assert_eq!(Endpoint::Health.method(), Method::Get);
        assert_eq!(Endpoint::Query.method(), Method::Post);
    }

    #[test]
    fn duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_micros(1_500_900)), 1_500);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_linear_backoff() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .route(HEALTH, [Step::fail(PageChatError::Network("refused".into()))]),
        );
        let start = Instant::now();

        let err = client(&transport).health().await.unwrap_err();
        assert!(matches!(err, PageChatError::Network(_)));

        let offsets: Vec<_> = transport
            .calls()
            .iter()
            .map(|c| c.at.duration_since(start))
            .collect();
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(3)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempts_time_out_and_are_cancelled() {
        let transport = Arc::new(ScriptedTransport::new().route(QUERY, [Step::hang()]));
        let config = ClientConfig {
            retries: 0,
            ..ClientConfig::default()
        };
        let client = RequestClient::new(transport.clone(), config);
        let start = Instant::now();

        let err = client
            .call(Endpoint::Query, Some(json!({"question": "q"})))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PageChatError::Timeout {
                timeout_ms: 30_000,
                ..
            }
        ));
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert_eq!(transport.abandoned(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn worst_case_latency_is_bounded() {
        let transport = Arc::new(ScriptedTransport::new().route(ANALYZE, [Step::hang()]));
        let start = Instant::now();

        let err = client(&transport).analyze(&target()).await.unwrap_err();

        assert!(matches!(err, PageChatError::Timeout { .. }));
        assert_eq!(transport.calls_to(ANALYZE), 3);
        // 3 x 30s attempts + 1s + 2s of backoff
        assert_eq!(start.elapsed(), Duration::from_secs(93));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_are_returned_immediately() {
        let transport = Arc::new(ScriptedTransport::new().route(
            INDEX,
            [Step::fail(PageChatError::validation("bad url"))],
        ));

        let err = client(&transport).index(&target(), 10).await.unwrap_err();

        assert!(matches!(err, PageChatError::Validation { .. }));
        assert_eq!(transport.calls_to(INDEX), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let transport = Arc::new(ScriptedTransport::new().route(
            QUERY,
            [
                Step::fail(PageChatError::Backend {
                    status: 502,
                    body: String::new(),
                }),
                Step::fail(PageChatError::Network("reset".into())),
                Step::reply(json!({"answer": "42", "confidence": "high"})),
            ],
        ));

        let result = client(&transport)
            .query(&QueryRequest {
                question: "What?".into(),
                history: vec![],
                url: target().as_str().to_string(),
            })
            .await
            .unwrap();

        assert_eq!(result.answer, "42");
        assert_eq!(transport.calls_to(QUERY), 3);
        let body = transport.calls()[0].body.clone().unwrap();
        assert_eq!(body["question"], "What?");
        assert_eq!(body["history"], json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn index_sends_url_and_page_budget() {
        let transport = Arc::new(ScriptedTransport::new().route(
            INDEX,
            [Step::reply(json!({"status": "accepted", "message": "queued"}))],
        ));

        client(&transport).index(&target(), 7).await.unwrap();

        let body = transport.calls()[0].body.clone().unwrap();
        assert_eq!(body, json!({"url": "https://example.com/post", "max_pages": 7}));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_analysis_is_parse_error() {
        let transport = Arc::new(
            ScriptedTransport::new().route(ANALYZE, [Step::reply(json!({"summary": 3}))]),
        );

        let err = client(&transport).analyze(&target()).await.unwrap_err();
        assert!(matches!(err, PageChatError::Parse { .. }));
        assert_eq!(transport.calls_to(ANALYZE), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_body_is_retried() {
        let transport = Arc::new(ScriptedTransport::new().route(
            ANALYZE,
            [
                Step::reply(json!("<html>busy</html>")),
                Step::reply(json!({"type": "Article", "summary": "A.", "topics": []})),
            ],
        ));
        let start = Instant::now();

        let analysis = client(&transport).analyze(&target()).await.unwrap();

        assert_eq!(analysis.kind, "Article");
        assert_eq!(transport.calls_to(ANALYZE), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn retries_real_http_failures() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/analyze"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = RequestClient::http(ClientConfig {
            base_url: server.uri(),
            backoff_unit: Duration::from_millis(5),
            ..ClientConfig::default()
        })
        .unwrap();

        let err = client.analyze(&target()).await.unwrap_err();
        assert!(matches!(err, PageChatError::Backend { status: 500, .. }));
    }
}
