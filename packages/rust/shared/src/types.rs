//! Core domain types shared by the client, controller and surfaces.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PageChatError, Result};

/// `type` value the backend uses to say "indexing has not produced anything yet".
pub const EMPTY_ANALYSIS_TYPE: &str = "Empty";

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// The page currently selected for indexing and querying.
///
/// Only http/https pages can be targets; everything else resolves to
/// [`ResolvedPage::Restricted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
}

impl Target {
    /// Parse a target URL, rejecting non-http(s) schemes and host-less URLs.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|e| PageChatError::validation(format!("invalid URL '{raw}': {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(PageChatError::validation(format!(
                "'{raw}' is not a web page (only http and https pages can be connected)"
            )));
        }
        if url.host_str().is_none() {
            return Err(PageChatError::validation(format!("URL has no host: {raw}")));
        }

        Ok(Self { url })
    }

    /// The full page URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The page URL as sent to the backend.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Hostname derived from the URL (always present for a valid target).
    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Outcome of resolving the active page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPage {
    /// A connectable http/https page.
    Page(Target),
    /// Browser-internal, file, or otherwise unsupported page.
    Restricted { raw: String },
}

impl ResolvedPage {
    /// Resolve a raw URL; anything that is not a valid http/https URL is restricted.
    pub fn resolve(raw: &str) -> Self {
        match Target::parse(raw) {
            Ok(target) => Self::Page(target),
            Err(_) => Self::Restricted {
                raw: raw.trim().to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation message as stored in the ledger and replayed to `/query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

/// Body of `POST /index`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexRequest {
    pub url: String,
    pub max_pages: u32,
}

/// Body of `POST /analyze`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest {
    pub url: String,
}

/// Body of `POST /query`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub question: String,
    pub history: Vec<Message>,
    pub url: String,
}

/// Structured analysis returned by `/analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl AnalysisResult {
    /// `true` when the backend says indexing is still in progress.
    ///
    /// A ready result with no topics or an empty summary is *not* empty.
    pub fn is_empty_sentinel(&self) -> bool {
        self.kind == EMPTY_ANALYSIS_TYPE
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Qualitative confidence label sent by some backend versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// Fixed display score for a qualitative level.
    pub fn score(self) -> u8 {
        match self {
            Self::High => 90,
            Self::Medium => 70,
            Self::Low => 50,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Answer confidence: numeric score or qualitative level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Confidence {
    Score(f64),
    Level(ConfidenceLevel),
}

impl Confidence {
    /// 0–100 display score.
    ///
    /// Scores in `[0, 1]` are fractions and get rescaled; larger scores are
    /// taken as percentages and clamped.
    pub fn display_score(&self) -> u8 {
        match *self {
            Self::Score(value) if !value.is_finite() || value <= 0.0 => 0,
            Self::Score(value) if value <= 1.0 => (value * 100.0).round() as u8,
            Self::Score(value) => value.round().min(100.0) as u8,
            Self::Level(level) => level.score(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawConfidence {
    Score(f64),
    Label(String),
}

// ---------------------------------------------------------------------------
// QueryResult
// ---------------------------------------------------------------------------

/// Decoded `/query` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawQueryResult")]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<String>,
    pub confidence: Option<Confidence>,
    pub refusal: bool,
    pub suggested_questions: Vec<String>,
    /// Server-side processing time in seconds, when reported.
    pub response_time: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawQueryResult {
    answer: String,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    confidence: Option<RawConfidence>,
    #[serde(default)]
    confidence_score: Option<f64>,
    #[serde(default)]
    refusal: Option<bool>,
    #[serde(default)]
    suggested_questions: Vec<String>,
    #[serde(default)]
    response_time: Option<f64>,
}

impl From<RawQueryResult> for QueryResult {
    fn from(raw: RawQueryResult) -> Self {
        // A numeric score is more precise than the label sent next to it.
        let confidence = match (raw.confidence_score, raw.confidence) {
            (Some(score), _) => Some(Confidence::Score(score)),
            (None, Some(RawConfidence::Score(score))) => Some(Confidence::Score(score)),
            (None, Some(RawConfidence::Label(label))) => {
                ConfidenceLevel::parse(&label).map(Confidence::Level)
            }
            (None, None) => None,
        };

        Self {
            answer: raw.answer,
            sources: raw.sources,
            confidence,
            refusal: raw.refusal.unwrap_or(false),
            suggested_questions: raw.suggested_questions,
            response_time: raw.response_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_rejects_non_web_schemes() {
        assert!(Target::parse("https://example.com/docs").is_ok());
        assert!(Target::parse("http://localhost:3000").is_ok());
        assert!(Target::parse("chrome://extensions").is_err());
        assert!(Target::parse("file:///tmp/a.html").is_err());
        assert!(Target::parse("not a url").is_err());
    }

    #[test]
    fn target_hostname_is_derived() {
        let target = Target::parse("https://docs.example.com/a/b?c=d").unwrap();
        assert_eq!(target.hostname(), "docs.example.com");
    }

    #[test]
    fn resolve_marks_restricted_pages() {
        assert!(matches!(
            ResolvedPage::resolve("about:blank"),
            ResolvedPage::Restricted { .. }
        ));
        assert!(matches!(
            ResolvedPage::resolve(" https://a.com "),
            ResolvedPage::Page(_)
        ));
    }

    #[test]
    fn message_roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }

    #[test]
    fn analysis_empty_sentinel_is_distinct_from_empty_content() {
        let empty: AnalysisResult =
            serde_json::from_str(r#"{"type":"Empty","summary":"Indexing in progress","topics":[]}"#)
                .unwrap();
        assert!(empty.is_empty_sentinel());

        let ready_but_bare: AnalysisResult =
            serde_json::from_str(r#"{"type":"Blog","summary":"","topics":[]}"#).unwrap();
        assert!(!ready_but_bare.is_empty_sentinel());
    }

    #[test]
    fn confidence_mapping_table() {
        assert_eq!(Confidence::Score(0.82).display_score(), 82);
        assert_eq!(Confidence::Score(1.0).display_score(), 100);
        assert_eq!(Confidence::Score(87.4).display_score(), 87);
        assert_eq!(Confidence::Score(250.0).display_score(), 100);
        assert_eq!(Confidence::Score(-3.0).display_score(), 0);
        assert_eq!(Confidence::Level(ConfidenceLevel::High).display_score(), 90);
        assert_eq!(Confidence::Level(ConfidenceLevel::Medium).display_score(), 70);
        assert_eq!(Confidence::Level(ConfidenceLevel::Low).display_score(), 50);
    }

    #[test]
    fn query_result_prefers_numeric_score() {
        let parsed: QueryResult = serde_json::from_str(
            r#"{"answer":"X","sources":["https://a.com"],"confidence":"high","confidence_score":0.64,
                "refusal":false,"suggested_questions":["Why?"],"response_time":1.25}"#,
        )
        .unwrap();
        assert_eq!(parsed.confidence, Some(Confidence::Score(0.64)));
        assert_eq!(parsed.suggested_questions, vec!["Why?".to_string()]);
        assert_eq!(parsed.response_time, Some(1.25));
    }

    #[test]
    fn query_result_accepts_label_or_number() {
        let labelled: QueryResult =
            serde_json::from_str(r#"{"answer":"X","confidence":"Medium"}"#).unwrap();
        assert_eq!(
            labelled.confidence,
            Some(Confidence::Level(ConfidenceLevel::Medium))
        );
        assert!(labelled.sources.is_empty());
        assert!(!labelled.refusal);

        let numeric: QueryResult =
            serde_json::from_str(r#"{"answer":"X. Y.","confidence":0.82}"#).unwrap();
        assert_eq!(numeric.confidence.map(|c| c.display_score()), Some(82));

        let unknown: QueryResult =
            serde_json::from_str(r#"{"answer":"X","confidence":"certain"}"#).unwrap();
        assert_eq!(unknown.confidence, None);
    }
}
