//! Incremental, cancellable rendering of assistant entries.

use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use pagechat_markdown::MarkdownRender;
use pagechat_shared::{RenderTimings, Role};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::view::{EntryId, RenderEvent, ResponseMeta, View};

/// Content of one assistant entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub text: String,
    pub meta: Option<ResponseMeta>,
    pub suggestions: Vec<String>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// How a render ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed(EntryId),
    /// Cancelled part-way; no further events were emitted.
    Abandoned,
}

/// Split text into tokens that concatenate back to the original.
///
/// Whitespace stays attached to the token before it.
pub fn tokenize(text: &str) -> Vec<&str> {
    static TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s*\S+\s*").expect("valid regex"));

    TOKEN_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// Emits [`RenderEvent`]s to a [`View`] on the configured schedule.
pub struct Renderer {
    timings: RenderTimings,
    markdown: Option<Arc<dyn MarkdownRender>>,
    next_id: AtomicU64,
}

impl Renderer {
    pub fn new(timings: RenderTimings, markdown: Option<Arc<dyn MarkdownRender>>) -> Self {
        Self {
            timings,
            markdown,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn timings(&self) -> &RenderTimings {
        &self.timings
    }

    fn display(&self, source: &str) -> String {
        match &self.markdown {
            Some(md) => md.render(source),
            None => source.to_string(),
        }
    }

    fn start(&self, view: &dyn View, error: bool) -> EntryId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        view.render(RenderEvent::Started {
            id,
            role: Role::Assistant,
            error,
        });
        id
    }

    /// Reveal `reply` token by token, then its metadata and suggestions.
    pub async fn render_reply(
        &self,
        view: &dyn View,
        reply: &Reply,
        cancel: &CancellationToken,
    ) -> RenderOutcome {
        if cancel.is_cancelled() {
            return RenderOutcome::Abandoned;
        }
        let id = self.start(view, false);

        let tokens = tokenize(&reply.text);
        let mut shown = String::with_capacity(reply.text.len());
        for (i, token) in tokens.iter().enumerate() {
            if i > 0 && !pause(self.timings.token_interval, cancel).await {
                trace!(id, revealed = i, "render abandoned");
                return RenderOutcome::Abandoned;
            }
            shown.push_str(token);
            view.render(RenderEvent::Revealed {
                id,
                text: self.display(&shown),
                cursor: true,
            });
            view.render(RenderEvent::ScrolledToLatest);
        }

        view.render(RenderEvent::Finished {
            id,
            text: self.display(&reply.text),
        });

        self.render_trailer(view, id, reply.meta.as_ref(), &reply.suggestions, cancel)
            .await
    }

    /// Show an error entry at once, without animation. `meta` still fades in
    /// after `fade_delay`.
    pub async fn render_error(
        &self,
        view: &dyn View,
        message: &str,
        meta: Option<&ResponseMeta>,
        cancel: &CancellationToken,
    ) -> RenderOutcome {
        if cancel.is_cancelled() {
            return RenderOutcome::Abandoned;
        }
        let id = self.start(view, true);
        view.render(RenderEvent::Finished {
            id,
            text: message.to_string(),
        });
        view.render(RenderEvent::ScrolledToLatest);

        self.render_trailer(view, id, meta, &[], cancel).await
    }

    async fn render_trailer(
        &self,
        view: &dyn View,
        id: EntryId,
        meta: Option<&ResponseMeta>,
        suggestions: &[String],
        cancel: &CancellationToken,
    ) -> RenderOutcome {
        if let Some(meta) = meta {
            if !pause(self.timings.fade_delay, cancel).await {
                return RenderOutcome::Abandoned;
            }
            view.render(RenderEvent::MetadataShown {
                id,
                meta: meta.clone(),
            });
        }

        if !suggestions.is_empty() {
            if !pause(self.timings.suggestion_delay, cancel).await {
                return RenderOutcome::Abandoned;
            }
            view.render(RenderEvent::SuggestionsShown {
                id,
                suggestions: suggestions.to_vec(),
            });
            view.render(RenderEvent::ScrolledToLatest);
        }

        RenderOutcome::Completed(id)
    }
}

/// Sleep for `delay` unless `cancel` fires first. Returns `false` when cancelled.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingView;
    use pagechat_markdown::TerminalMarkdown;
    use tokio::time::Instant;

    fn renderer() -> Renderer {
        Renderer::new(RenderTimings::default(), None)
    }

    fn reveals(view: &RecordingView) -> Vec<String> {
        view.events()
            .into_iter()
            .filter_map(|e| match e {
                RenderEvent::Revealed { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn tokens_concatenate_to_input() {
        let text = "  Hello,  world!\nNext line ";
        let tokens = tokenize(text);
        assert_eq!(tokens, vec!["  Hello,  ", "world!\n", "Next ", "line "]);
        assert_eq!(tokens.concat(), text);
        assert!(tokenize("   ").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reveals_one_token_per_interval() {
        let view = RecordingView::new();
        let start = Instant::now();

        let outcome = renderer()
            .render_reply(&view, &Reply::text("one two three"), &CancellationToken::new())
            .await;

        assert!(matches!(outcome, RenderOutcome::Completed(_)));
        assert_eq!(reveals(&view), vec!["one ", "one two ", "one two three"]);
        assert_eq!(start.elapsed(), Duration::from_millis(70));

        let events = view.events();
        assert!(matches!(events[0], RenderEvent::Started { error: false, .. }));
        assert!(matches!(events[2], RenderEvent::ScrolledToLatest));
        assert!(matches!(
            events.last(),
            Some(RenderEvent::Finished { text, .. }) if text == "one two three"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_then_suggestions_follow_with_delays() {
        let view = RecordingView::new();
        let reply = Reply {
            text: "Done.".into(),
            meta: Some(ResponseMeta {
                latency: Duration::from_millis(1200),
                confidence: Some(82),
                sources: vec!["https://a.com".into()],
                refusal: false,
            }),
            suggestions: vec!["Why?".into()],
        };
        let start = Instant::now();

        renderer()
            .render_reply(&view, &reply, &CancellationToken::new())
            .await;

        assert_eq!(start.elapsed(), Duration::from_millis(600));
        let events = view.events();
        let meta_pos = events
            .iter()
            .position(|e| matches!(e, RenderEvent::MetadataShown { .. }))
            .unwrap();
        let sugg_pos = events
            .iter()
            .position(|e| matches!(e, RenderEvent::SuggestionsShown { .. }))
            .unwrap();
        assert!(meta_pos < sugg_pos);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_shown_at_once() {
        let view = RecordingView::new();
        let start = Instant::now();

        renderer()
            .render_error(
                &view,
                "Could not reach the backend.",
                None,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(reveals(&view).is_empty());
        let events = view.events();
        assert!(matches!(events[0], RenderEvent::Started { error: true, .. }));
        assert!(matches!(
            &events[1],
            RenderEvent::Finished { text, .. } if text == "Could not reach the backend."
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn error_metadata_fades_in_after_full_text() {
        let view = RecordingView::new();
        let meta = ResponseMeta {
            latency: Duration::from_millis(450),
            confidence: None,
            sources: vec![],
            refusal: false,
        };
        let start = Instant::now();

        renderer()
            .render_error(
                &view,
                "The backend failed (HTTP 500).",
                Some(&meta),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(start.elapsed(), RenderTimings::default().fade_delay);
        let events = view.events();
        assert!(matches!(
            &events[1],
            RenderEvent::Finished { text, .. } if text == "The backend failed (HTTP 500)."
        ));
        assert!(matches!(
            events.last(),
            Some(RenderEvent::MetadataShown { meta: shown, .. }) if *shown == meta
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_emission() {
        let view = RecordingView::new();
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let outcome = renderer()
            .render_reply(&view, &Reply::text("a b c d e f"), &cancel)
            .await;

        assert_eq!(outcome, RenderOutcome::Abandoned);
        // Tokens at 0 and 35 ms; the 70 ms reveal never happens.
        assert_eq!(reveals(&view).len(), 2);
        assert!(
            !view
                .events()
                .iter()
                .any(|e| matches!(e, RenderEvent::Finished { .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn markdown_capability_is_applied() {
        let view = RecordingView::new();
        let renderer = Renderer::new(
            RenderTimings::instant(),
            Some(Arc::new(TerminalMarkdown::plain())),
        );

        renderer
            .render_reply(&view, &Reply::text("**bold** claim"), &CancellationToken::new())
            .await;

        assert!(matches!(
            view.events().last(),
            Some(RenderEvent::Finished { text, .. }) if text == "bold claim"
        ));
    }
}
