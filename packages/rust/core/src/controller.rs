//! Workflow controller: connect, index, poll, answer.
//!
//! One [`Controller`] owns the workflow state, the session ledger, the request
//! client, the poller and the renderer. Surfaces call its operations and
//! observe results through a [`View`].
//!
//! `scan` and `send` share a single [`BusyFlag`]; while one runs the other is
//! dropped and reports `Busy`. Every scan starts a new run with its own
//! cancellation token. Re-targeting cancels the run, and whatever it was
//! still waiting for is discarded when it arrives.

use std::sync::Arc;

use pagechat_client::{ReadinessPoller, RequestClient, duration_ms};
use pagechat_markdown::{format_summary, is_summary_request};
use pagechat_shared::{
    AnalysisResult, Message, PageChatError, PollConfig, QueryRequest, QueryResult, ResolvedPage,
    Result, Target,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::busy::BusyFlag;
use crate::ledger::SessionLedger;
use crate::renderer::{Renderer, Reply};
use crate::view::{AnalysisView, ConnectionPhase, ResponseMeta, View};

/// Follow-up questions offered after a successful connect.
pub const SCAN_SUGGESTIONS: [&str; 3] = [
    "Summarize this page",
    "What are the key takeaways?",
    "What topics does this page cover?",
];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Lifecycle of the connection to the active page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Connecting,
    Indexing,
    Polling,
    Ready,
    QueryInFlight,
    Failed,
}

/// Result of [`Controller::scan`].
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Connected(AnalysisResult),
    /// The workflow ran and failed; an error entry was rendered.
    Failed(PageChatError),
    /// Another operation held the busy flag; nothing happened.
    Busy,
    /// Refused before any network call.
    Rejected(PageChatError),
    /// The target changed while the scan was running; its result was dropped.
    Superseded,
}

/// Result of [`Controller::send`].
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Answered(QueryResult),
    Failed(PageChatError),
    Busy,
    Rejected(PageChatError),
    Superseded,
}

/// Result of [`Controller::refresh_target`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetChange {
    /// Same page as the current session.
    Unchanged,
    /// A page was selected and no session existed.
    Selected(Target),
    /// The session was bound to another page and has been torn down.
    Switched { from: Target, to: Target },
    /// The active page cannot be connected.
    Restricted,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

struct Session {
    target: Target,
    run: CancellationToken,
    run_id: Uuid,
}

struct Inner {
    state: WorkflowState,
    active: Option<ResolvedPage>,
    session: Option<Session>,
}

pub struct Controller {
    client: RequestClient,
    poller: ReadinessPoller,
    renderer: Renderer,
    ledger: Mutex<SessionLedger>,
    view: Arc<dyn View>,
    busy: BusyFlag,
    inner: Mutex<Inner>,
    shutdown: CancellationToken,
    max_pages: u32,
}

impl Controller {
    pub fn new(
        client: RequestClient,
        poll: PollConfig,
        renderer: Renderer,
        ledger: SessionLedger,
        view: Arc<dyn View>,
        max_pages: u32,
    ) -> Self {
        Self {
            poller: ReadinessPoller::new(client.clone(), poll),
            client,
            renderer,
            ledger: Mutex::new(ledger),
            view,
            busy: BusyFlag::new(),
            inner: Mutex::new(Inner {
                state: WorkflowState::Idle,
                active: None,
                session: None,
            }),
            shutdown: CancellationToken::new(),
            max_pages,
        }
    }

    pub async fn state(&self) -> WorkflowState {
        self.inner.lock().await.state
    }

    /// The page the current session is bound to, if any.
    pub async fn connected_target(&self) -> Option<Target> {
        self.inner
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.target.clone())
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    pub async fn history(&self) -> Vec<Message> {
        self.ledger.lock().await.messages().to_vec()
    }

    /// Cancel any running workflow. Nothing in flight renders afterwards, and
    /// scans started after this point report `Superseded`.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        self.shutdown.cancel();
        if let Some(session) = inner.session.take() {
            session.run.cancel();
        }
        inner.state = WorkflowState::Idle;
    }

    /// Probe the backend health endpoint.
    pub async fn check_backend(&self) -> Result<()> {
        self.client.health().await.map(|_| ())
    }

    // -----------------------------------------------------------------------
    // Active page
    // -----------------------------------------------------------------------

    /// Re-check the active page.
    ///
    /// Restricted pages disable connecting. A page different from the one
    /// the session is bound to cancels the running workflow and forces a
    /// re-connect.
    #[instrument(skip_all, fields(url = raw_url))]
    pub async fn refresh_target(&self, raw_url: &str) -> TargetChange {
        let resolved = ResolvedPage::resolve(raw_url);
        let mut inner = self.inner.lock().await;
        inner.active = Some(resolved.clone());

        match resolved {
            ResolvedPage::Restricted { raw } => {
                if let Some(session) = inner.session.take() {
                    info!(run = %session.run_id, "active page is restricted, ending session");
                    session.run.cancel();
                }
                inner.state = WorkflowState::Idle;
                drop(inner);

                debug!(raw = %raw, "restricted page");
                self.view.analysis_changed(None);
                self.view.query_enabled(false);
                self.view.phase_changed(ConnectionPhase::Restricted);
                TargetChange::Restricted
            }
            ResolvedPage::Page(target) => {
                let previous = inner.session.take();
                match previous {
                    Some(session) if session.target == target => {
                        inner.session = Some(session);
                        TargetChange::Unchanged
                    }
                    Some(session) => {
                        info!(
                            run = %session.run_id,
                            from = %session.target,
                            to = %target,
                            "target changed, reconnect required"
                        );
                        session.run.cancel();
                        inner.state = WorkflowState::Idle;
                        drop(inner);

                        self.view.analysis_changed(None);
                        self.view.query_enabled(false);
                        self.view.phase_changed(ConnectionPhase::Connectable);
                        TargetChange::Switched {
                            from: session.target,
                            to: target,
                        }
                    }
                    None => {
                        inner.state = WorkflowState::Idle;
                        drop(inner);

                        self.view.phase_changed(ConnectionPhase::Connectable);
                        TargetChange::Selected(target)
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Scan
    // -----------------------------------------------------------------------

    /// Connect to the active page: clear the ledger, index, wait until ready.
    #[instrument(skip_all)]
    pub async fn scan(&self) -> ScanOutcome {
        let Some(_guard) = self.busy.try_acquire() else {
            debug!("scan dropped, another operation is running");
            return ScanOutcome::Busy;
        };

        let (target, run, run_id) = {
            let mut inner = self.inner.lock().await;
            let target = match &inner.active {
                Some(ResolvedPage::Page(target)) => target.clone(),
                Some(ResolvedPage::Restricted { raw }) => {
                    return ScanOutcome::Rejected(PageChatError::validation(format!(
                        "cannot connect to '{raw}'"
                    )));
                }
                None => {
                    return ScanOutcome::Rejected(PageChatError::validation(
                        "no page selected",
                    ));
                }
            };
            if let Some(previous) = inner.session.take() {
                previous.run.cancel();
            }
            let run = self.shutdown.child_token();
            let run_id = Uuid::now_v7();
            inner.session = Some(Session {
                target: target.clone(),
                run: run.clone(),
                run_id,
            });
            inner.state = WorkflowState::Connecting;
            (target, run, run_id)
        };
        info!(run = %run_id, target = %target, "connecting");

        self.view.analysis_changed(None);
        self.view.query_enabled(false);
        self.view.phase_changed(ConnectionPhase::Connecting);

        {
            let mut ledger = self.ledger.lock().await;
            ledger.clear();
            if let Err(e) = ledger.persist().await {
                warn!(error = %e, "failed to persist cleared ledger");
            }
        }

        // --- Index ---
        if !self.transition(&run, WorkflowState::Indexing).await {
            return ScanOutcome::Superseded;
        }
        self.view.phase_changed(ConnectionPhase::Indexing);

        let indexed = tokio::select! {
            biased;
            _ = run.cancelled() => return ScanOutcome::Superseded,
            result = self.client.index(&target, self.max_pages) => result,
        };
        match indexed {
            Ok(ack) => debug!(
                status = ack.get("status").and_then(|s| s.as_str()).unwrap_or("-"),
                "index request accepted"
            ),
            Err(e) => return self.scan_failed(&run, e).await,
        }

        // --- Poll ---
        if !self.transition(&run, WorkflowState::Polling).await {
            return ScanOutcome::Superseded;
        }
        let analysis = match self.poller.await_ready(&target, &run.child_token()).await {
            Ok(analysis) => analysis,
            Err(PageChatError::Cancelled(_)) => return ScanOutcome::Superseded,
            Err(e) => return self.scan_failed(&run, e).await,
        };

        // --- Ready ---
        if !self.transition(&run, WorkflowState::Ready).await {
            debug!(run = %run_id, "dropping analysis for superseded run");
            return ScanOutcome::Superseded;
        }
        info!(run = %run_id, kind = %analysis.kind, "connected");

        let panel = AnalysisView {
            kind: analysis.kind.clone(),
            summary: format_summary(&analysis.summary),
            topics: analysis.topics.clone(),
        };
        self.view.analysis_changed(Some(&panel));
        self.view.phase_changed(ConnectionPhase::Connected);
        self.view.query_enabled(true);

        let welcome = Reply {
            text: format!(
                "Connected to {}. Ask me anything about this page.",
                target.hostname()
            ),
            meta: None,
            suggestions: SCAN_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
        };
        self.renderer
            .render_reply(self.view.as_ref(), &welcome, &run.child_token())
            .await;

        ScanOutcome::Connected(analysis)
    }

    async fn scan_failed(&self, run: &CancellationToken, error: PageChatError) -> ScanOutcome {
        if !self.transition(run, WorkflowState::Failed).await {
            return ScanOutcome::Superseded;
        }
        warn!(%error, "connect failed");

        self.view.query_enabled(false);
        self.view.phase_changed(ConnectionPhase::Connectable);
        self.renderer
            .render_error(
                self.view.as_ref(),
                &error.user_message(),
                None,
                &run.child_token(),
            )
            .await;
        ScanOutcome::Failed(error)
    }

    // -----------------------------------------------------------------------
    // Send
    // -----------------------------------------------------------------------

    /// Ask a question about the connected page.
    #[instrument(skip_all, fields(question_len = question.len()))]
    pub async fn send(&self, question: &str) -> SendOutcome {
        let Some(_guard) = self.busy.try_acquire() else {
            debug!("send dropped, another operation is running");
            return SendOutcome::Busy;
        };

        let question = question.trim();
        if question.is_empty() {
            return SendOutcome::Rejected(PageChatError::validation("question is empty"));
        }

        let (target, run) = {
            let mut inner = self.inner.lock().await;
            let session = match (&inner.state, &inner.session) {
                (WorkflowState::Ready, Some(session)) => session,
                _ => {
                    return SendOutcome::Rejected(PageChatError::validation(
                        "connect to a page before asking questions",
                    ));
                }
            };
            let bound = (session.target.clone(), session.run.clone());
            inner.state = WorkflowState::QueryInFlight;
            bound
        };

        self.view.user_message(question);
        self.view.query_enabled(false);

        let request = QueryRequest {
            question: question.to_string(),
            history: self.history().await,
            url: target.as_str().to_string(),
        };

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = run.cancelled() => return SendOutcome::Superseded,
            result = self.client.query(&request) => result,
        };
        let latency = started.elapsed();

        if !self.transition(&run, WorkflowState::Ready).await {
            debug!("dropping answer for superseded session");
            return SendOutcome::Superseded;
        }

        match result {
            Ok(answer) => {
                {
                    let mut ledger = self.ledger.lock().await;
                    ledger.append_turn(question, &answer.answer);
                    if let Err(e) = ledger.persist().await {
                        warn!(error = %e, "failed to persist ledger");
                    }
                }

                let text = if is_summary_request(question) {
                    format_summary(&answer.answer)
                } else {
                    answer.answer.clone()
                };
                let reply = Reply {
                    text,
                    meta: Some(ResponseMeta {
                        latency,
                        confidence: answer.confidence.map(|c| c.display_score()),
                        sources: answer.sources.clone(),
                        refusal: answer.refusal,
                    }),
                    suggestions: answer.suggested_questions.clone(),
                };
                info!(
                    latency_ms = duration_ms(latency),
                    sources = answer.sources.len(),
                    "answer received"
                );

                self.renderer
                    .render_reply(self.view.as_ref(), &reply, &run.child_token())
                    .await;
                self.view.query_enabled(true);
                SendOutcome::Answered(answer)
            }
            Err(error) => {
                warn!(latency_ms = duration_ms(latency), %error, "query failed");
                let meta = ResponseMeta {
                    latency,
                    confidence: None,
                    sources: Vec::new(),
                    refusal: false,
                };
                self.renderer
                    .render_error(
                        self.view.as_ref(),
                        &error.user_message(),
                        Some(&meta),
                        &run.child_token(),
                    )
                    .await;
                self.view.query_enabled(true);
                SendOutcome::Failed(error)
            }
        }
    }

    /// Re-submit a suggested question exactly as shown.
    pub async fn select_suggestion(&self, suggestion: &str) -> SendOutcome {
        self.send(suggestion).await
    }

    /// Set the workflow state unless `run` has been superseded.
    async fn transition(&self, run: &CancellationToken, state: WorkflowState) -> bool {
        let mut inner = self.inner.lock().await;
        if run.is_cancelled() {
            return false;
        }
        inner.state = state;
        true
    }
}
