//! Line-oriented [`View`] for the CLI: spinner while connecting, streamed answers on stdout.

use std::io::{IsTerminal, Write};
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use pagechat_core::{
    AnalysisView, CURSOR, ConnectionPhase, EntryId, RenderEvent, ResponseMeta, View,
};

const BACKSPACE: &str = "\x08";

#[derive(Default)]
struct Stream {
    entry: Option<EntryId>,
    printed: String,
    cursor_shown: bool,
    suggestions: Vec<String>,
}

/// Terminal output for `ask` and `chat`.
pub(crate) struct TerminalView {
    spinner: Mutex<Option<ProgressBar>>,
    stream: Mutex<Stream>,
    tty: bool,
    echo_user: bool,
}

impl TerminalView {
    /// `echo_user` repeats the user's question, for non-interactive runs.
    pub(crate) fn new(echo_user: bool) -> Self {
        Self {
            spinner: Mutex::new(None),
            stream: Mutex::new(Stream::default()),
            tty: std::io::stdout().is_terminal(),
            echo_user,
        }
    }

    /// Whether stdout is an interactive terminal.
    pub(crate) fn is_tty(&self) -> bool {
        self.tty
    }

    /// Suggestion `n` (1-based) from the most recent answer.
    pub(crate) fn suggestion(&self, n: usize) -> Option<String> {
        let stream = self.lock();
        n.checked_sub(1)
            .and_then(|i| stream.suggestions.get(i))
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Stream> {
        self.stream.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn spin(&self, message: &str) {
        let mut slot = self.spinner.lock().unwrap_or_else(|e| e.into_inner());
        let spinner = slot.get_or_insert_with(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
            spinner.enable_steady_tick(Duration::from_millis(80));
            spinner
        });
        spinner.set_message(message.to_string());
    }

    fn stop_spinner(&self) {
        let mut slot = self.spinner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(spinner) = slot.take() {
            spinner.finish_and_clear();
        }
    }

    /// Print the part of `text` not yet on screen.
    fn write_delta(&self, stream: &mut Stream, text: &str, cursor: bool) {
        let mut out = std::io::stdout().lock();
        if stream.cursor_shown {
            let _ = write!(out, "{BACKSPACE} {BACKSPACE}");
            stream.cursor_shown = false;
        }

        match text.strip_prefix(stream.printed.as_str()) {
            Some(delta) => {
                let _ = write!(out, "{delta}");
            }
            None => {
                let _ = write!(out, "\n{text}");
            }
        }
        stream.printed = text.to_string();

        if cursor && self.tty {
            let _ = write!(out, "{CURSOR}");
            stream.cursor_shown = true;
        }
        let _ = out.flush();
    }
}

impl View for TerminalView {
    fn phase_changed(&self, phase: ConnectionPhase) {
        match phase {
            ConnectionPhase::Connecting => self.spin("Connecting..."),
            ConnectionPhase::Indexing => self.spin("Indexing page..."),
            ConnectionPhase::Connected
            | ConnectionPhase::Connectable
            | ConnectionPhase::Restricted => self.stop_spinner(),
        }
        tracing::debug!(label = phase.scan_label(), "phase changed");
    }

    fn analysis_changed(&self, analysis: Option<&AnalysisView>) {
        let Some(analysis) = analysis else {
            return;
        };
        self.stop_spinner();
        println!();
        println!("  Page type: {}", analysis.kind);
        if !analysis.topics.is_empty() {
            println!("  Topics:    {}", analysis.topics.join(", "));
        }
        if !analysis.summary.is_empty() {
            println!();
            for line in analysis.summary.lines() {
                println!("  {line}");
            }
        }
        println!();
    }

    fn query_enabled(&self, _enabled: bool) {}

    fn user_message(&self, text: &str) {
        if self.echo_user {
            println!("you› {text}");
        }
    }

    fn render(&self, event: RenderEvent) {
        let mut stream = self.lock();
        match event {
            RenderEvent::Started { id, error, .. } => {
                stream.entry = Some(id);
                stream.printed.clear();
                stream.cursor_shown = false;
                print!("{}", if error { "error› " } else { "page› " });
                let _ = std::io::stdout().flush();
            }
            RenderEvent::Revealed { id, text, cursor } if stream.entry == Some(id) => {
                self.write_delta(&mut stream, &text, cursor);
            }
            RenderEvent::Finished { id, text } if stream.entry == Some(id) => {
                self.write_delta(&mut stream, &text, false);
                println!();
            }
            RenderEvent::MetadataShown { meta, .. } => print_meta(&meta),
            RenderEvent::SuggestionsShown { suggestions, .. } => {
                println!("  Suggestions:");
                for (i, s) in suggestions.iter().enumerate() {
                    println!("    /{} {s}", i + 1);
                }
                stream.suggestions = suggestions;
            }
            RenderEvent::ScrolledToLatest => {
                let _ = std::io::stdout().flush();
            }
            RenderEvent::Revealed { .. } | RenderEvent::Finished { .. } => {}
        }
    }
}

fn print_meta(meta: &ResponseMeta) {
    let mut parts = vec![format!("{:.1}s", meta.latency.as_secs_f64())];
    if let Some(score) = meta.confidence {
        parts.push(format!("confidence {score}%"));
    }
    if !meta.sources.is_empty() {
        parts.push(format!("{} source(s)", meta.sources.len()));
    }
    println!("  [{}]", parts.join(" · "));
    if meta.refusal {
        println!("  (the page does not cover this question)");
    }
    for source in &meta.sources {
        println!("    - {source}");
    }
}
