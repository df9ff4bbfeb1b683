//! Recording [`View`] for controller and renderer tests.

use std::sync::Mutex;

use crate::view::{AnalysisView, ConnectionPhase, RenderEvent, View};

/// Everything a [`RecordingView`] has been told, in order.
#[derive(Debug, Clone, Default)]
pub struct Recorded {
    pub phases: Vec<ConnectionPhase>,
    pub analysis: Vec<Option<AnalysisView>>,
    pub query_enabled: Vec<bool>,
    pub user_messages: Vec<String>,
    pub events: Vec<RenderEvent>,
}

#[derive(Debug, Default)]
pub struct RecordingView {
    inner: Mutex<Recorded>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Recorded {
        self.lock().clone()
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.lock().events.clone()
    }

    pub fn last_phase(&self) -> Option<ConnectionPhase> {
        self.lock().phases.last().copied()
    }

    /// Latest analysis panel state; `None` if never set or hidden.
    pub fn current_analysis(&self) -> Option<AnalysisView> {
        self.lock().analysis.last().cloned().flatten()
    }

    pub fn query_is_enabled(&self) -> bool {
        self.lock().query_enabled.last().copied().unwrap_or(false)
    }

    /// Final texts of every finished entry, paired with its error flag.
    pub fn finished_entries(&self) -> Vec<(String, bool)> {
        let events = self.events();
        let mut errors = std::collections::HashMap::new();
        let mut out = Vec::new();
        for event in events {
            match event {
                RenderEvent::Started { id, error, .. } => {
                    errors.insert(id, error);
                }
                RenderEvent::Finished { id, text } => {
                    out.push((text, errors.get(&id).copied().unwrap_or(false)));
                }
                _ => {}
            }
        }
        out
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl View for RecordingView {
    fn phase_changed(&self, phase: ConnectionPhase) {
        self.lock().phases.push(phase);
    }

    fn analysis_changed(&self, analysis: Option<&AnalysisView>) {
        self.lock().analysis.push(analysis.cloned());
    }

    fn query_enabled(&self, enabled: bool) {
        self.lock().query_enabled.push(enabled);
    }

    fn user_message(&self, text: &str) {
        self.lock().user_messages.push(text.to_string());
    }

    fn render(&self, event: RenderEvent) {
        self.lock().events.push(event);
    }
}
