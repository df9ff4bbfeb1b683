//! [`View`] that forwards controller output to the UI thread.

use pagechat_core::{AnalysisView, ConnectionPhase, RenderEvent, View};
use tokio::sync::mpsc::UnboundedSender;

/// Something the chat screen should reflect.
#[derive(Debug, Clone)]
pub(crate) enum UiEvent {
    Phase(ConnectionPhase),
    Analysis(Option<AnalysisView>),
    QueryEnabled(bool),
    UserMessage(String),
    Render(RenderEvent),
    /// Transient status-bar text.
    Notice(String),
}

pub(crate) struct TuiView {
    tx: UnboundedSender<UiEvent>,
}

impl TuiView {
    pub(crate) fn new(tx: UnboundedSender<UiEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: UiEvent) {
        // The receiver only goes away while the app is shutting down.
        let _ = self.tx.send(event);
    }
}

impl View for TuiView {
    fn phase_changed(&self, phase: ConnectionPhase) {
        self.send(UiEvent::Phase(phase));
    }

    fn analysis_changed(&self, analysis: Option<&AnalysisView>) {
        self.send(UiEvent::Analysis(analysis.cloned()));
    }

    fn query_enabled(&self, enabled: bool) {
        self.send(UiEvent::QueryEnabled(enabled));
    }

    fn user_message(&self, text: &str) {
        self.send(UiEvent::UserMessage(text.to_string()));
    }

    fn render(&self, event: RenderEvent) {
        self.send(UiEvent::Render(event));
    }
}
