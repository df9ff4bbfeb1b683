//! Presentation seam between the controller and a surface (CLI, TUI).

use std::time::Duration;

use pagechat_shared::Role;

/// What the connect control should offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// The active page cannot be indexed (non-web URL).
    Restricted,
    /// A page is selected and not yet connected.
    Connectable,
    Connecting,
    Indexing,
    Connected,
}

impl ConnectionPhase {
    /// Label of the connect control.
    pub fn scan_label(self) -> &'static str {
        match self {
            Self::Restricted => "Unavailable",
            Self::Connectable => "Connect",
            Self::Connecting => "Connecting...",
            Self::Indexing => "Indexing...",
            Self::Connected => "Connected",
        }
    }

    /// Whether the connect control accepts input.
    pub fn scan_enabled(self) -> bool {
        matches!(self, Self::Connectable | Self::Connected)
    }
}

/// Analysis panel content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisView {
    pub kind: String,
    /// Summary already formatted as a list.
    pub summary: String,
    pub topics: Vec<String>,
}

/// Display-only response metadata. Never stored in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMeta {
    /// Client-measured round trip of the query call.
    pub latency: Duration,
    /// 0-100 confidence, when the backend sent one.
    pub confidence: Option<u8>,
    pub sources: Vec<String>,
    pub refusal: bool,
}

/// Glyph drawn after the newest revealed token.
pub const CURSOR: char = '▌';

/// Identifier of one chat entry, unique per renderer.
pub type EntryId = u64;

/// Incremental rendering events, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// A new chat entry appears (empty).
    Started { id: EntryId, role: Role, error: bool },
    /// Entry text so far; `cursor` is set while more tokens are coming.
    Revealed { id: EntryId, text: String, cursor: bool },
    ScrolledToLatest,
    /// Final text, cursor removed.
    Finished { id: EntryId, text: String },
    MetadataShown { id: EntryId, meta: ResponseMeta },
    SuggestionsShown { id: EntryId, suggestions: Vec<String> },
}

/// Receives controller output. Implementations must not block.
pub trait View: Send + Sync {
    fn phase_changed(&self, phase: ConnectionPhase);
    /// `None` hides the analysis panel.
    fn analysis_changed(&self, analysis: Option<&AnalysisView>);
    fn query_enabled(&self, enabled: bool);
    /// The user's own message, shown before the query is issued.
    fn user_message(&self, text: &str);
    fn render(&self, event: RenderEvent);
}

/// View that discards everything, for headless use.
pub struct SilentView;

impl View for SilentView {
    fn phase_changed(&self, _phase: ConnectionPhase) {}
    fn analysis_changed(&self, _analysis: Option<&AnalysisView>) {}
    fn query_enabled(&self, _enabled: bool) {}
    fn user_message(&self, _text: &str) {}
    fn render(&self, _event: RenderEvent) {}
}
