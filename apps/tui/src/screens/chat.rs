//! Chat screen: URL bar, conversation and analysis panel above the question input.

use crossterm::event::{KeyCode, KeyModifiers};
use pagechat_core::{AnalysisView, CURSOR, ConnectionPhase, EntryId, RenderEvent, ResponseMeta};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::view::UiEvent;
use crate::widgets::wrap_text;

/// Which input has keyboard focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Field {
    Url,
    Question,
}

/// What the app should do in response to a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    None,
    /// Select this URL and connect to it.
    Connect(String),
    /// Ask a question typed by the user.
    Send(String),
    /// Ask a suggested question.
    Suggest(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Speaker {
    User,
    Page,
    Error,
}

#[derive(Debug, Clone)]
struct Entry {
    id: Option<EntryId>,
    speaker: Speaker,
    text: String,
    cursor: bool,
    meta: Option<ResponseMeta>,
    suggestions: Vec<String>,
}

pub(crate) struct ChatScreen {
    url: String,
    question: String,
    focused: Field,
    phase: ConnectionPhase,
    query_enabled: bool,
    analysis: Option<AnalysisView>,
    entries: Vec<Entry>,
    /// Lines scrolled up from the bottom; 0 follows the latest entry.
    scroll_back: u16,
}

impl ChatScreen {
    pub(crate) fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            question: String::new(),
            focused: Field::Url,
            phase: ConnectionPhase::Connectable,
            query_enabled: false,
            analysis: None,
            entries: Vec::new(),
            scroll_back: 0,
        }
    }

    /// Text currently in the URL bar.
    pub(crate) fn url(&self) -> &str {
        self.url.trim()
    }

    pub(crate) fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Suggestions attached to the most recent entry that has any.
    fn latest_suggestions(&self) -> &[String] {
        self.entries
            .iter()
            .rev()
            .find(|e| !e.suggestions.is_empty())
            .map_or(&[][..], |e| e.suggestions.as_slice())
    }

    fn entry_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.iter_mut().rev().find(|e| e.id == Some(id))
    }

    // -----------------------------------------------------------------------
    // Controller events
    // -----------------------------------------------------------------------

    pub(crate) fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::Phase(phase) => {
                self.phase = phase;
                if phase == ConnectionPhase::Connected {
                    self.focused = Field::Question;
                }
            }
            UiEvent::Analysis(analysis) => self.analysis = analysis,
            UiEvent::QueryEnabled(enabled) => self.query_enabled = enabled,
            UiEvent::UserMessage(text) => {
                self.entries.push(Entry {
                    id: None,
                    speaker: Speaker::User,
                    text,
                    cursor: false,
                    meta: None,
                    suggestions: Vec::new(),
                });
                self.scroll_back = 0;
            }
            UiEvent::Render(event) => self.apply_render(event),
            UiEvent::Notice(_) => {}
        }
    }

    fn apply_render(&mut self, event: RenderEvent) {
        match event {
            RenderEvent::Started { id, error, .. } => self.entries.push(Entry {
                id: Some(id),
                speaker: if error { Speaker::Error } else { Speaker::Page },
                text: String::new(),
                cursor: !error,
                meta: None,
                suggestions: Vec::new(),
            }),
            RenderEvent::Revealed { id, text, cursor } => {
                if let Some(entry) = self.entry_mut(id) {
                    entry.text = text;
                    entry.cursor = cursor;
                }
            }
            RenderEvent::Finished { id, text } => {
                if let Some(entry) = self.entry_mut(id) {
                    entry.text = text;
                    entry.cursor = false;
                }
            }
            RenderEvent::MetadataShown { id, meta } => {
                if let Some(entry) = self.entry_mut(id) {
                    entry.meta = Some(meta);
                }
            }
            RenderEvent::SuggestionsShown { id, suggestions } => {
                if let Some(entry) = self.entry_mut(id) {
                    entry.suggestions = suggestions;
                }
            }
            RenderEvent::ScrolledToLatest => self.scroll_back = 0,
        }
    }

    // -----------------------------------------------------------------------
    // Keys
    // -----------------------------------------------------------------------

    pub(crate) fn handle_key(&mut self, code: KeyCode, _modifiers: KeyModifiers) -> Action {
        match code {
            KeyCode::Tab | KeyCode::BackTab => {
                self.focused = match self.focused {
                    Field::Url => Field::Question,
                    Field::Question => Field::Url,
                };
                Action::None
            }
            KeyCode::F(n @ 1..=3) => match self.latest_suggestions().get(usize::from(n) - 1) {
                Some(s) if self.query_enabled => Action::Suggest(s.clone()),
                _ => Action::None,
            },
            KeyCode::PageUp => {
                self.scroll_back = self.scroll_back.saturating_add(5);
                Action::None
            }
            KeyCode::PageDown => {
                self.scroll_back = self.scroll_back.saturating_sub(5);
                Action::None
            }
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace => {
                self.field_mut().pop();
                Action::None
            }
            KeyCode::Char(c) => {
                self.field_mut().push(c);
                Action::None
            }
            _ => Action::None,
        }
    }

    fn field_mut(&mut self) -> &mut String {
        match self.focused {
            Field::Url => &mut self.url,
            Field::Question => &mut self.question,
        }
    }

    fn submit(&mut self) -> Action {
        match self.focused {
            // A restricted page may have been edited into a connectable one.
            Field::Url
                if !self.url().is_empty()
                    && (self.phase.scan_enabled() || self.phase == ConnectionPhase::Restricted) =>
            {
                Action::Connect(self.url().to_string())
            }
            Field::Question if self.query_enabled && !self.question.trim().is_empty() => {
                Action::Send(std::mem::take(&mut self.question))
            }
            _ => Action::None,
        }
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    pub(crate) fn draw(&self, f: &mut Frame, area: Rect) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // URL bar
                Constraint::Min(3),    // Conversation + analysis
                Constraint::Length(3), // Question input
            ])
            .split(area);

        self.draw_url_bar(f, rows[0]);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(68), Constraint::Percentage(32)])
            .split(rows[1]);
        self.draw_conversation(f, columns[0]);
        self.draw_analysis(f, columns[1]);

        self.draw_input(f, rows[2]);
    }

    fn border_style(&self, field: Field) -> Style {
        if self.focused == field {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        }
    }

    fn draw_url_bar(&self, f: &mut Frame, area: Rect) {
        let label_style = if self.phase.scan_enabled() {
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let title = Line::from(vec![
            Span::raw(" Page "),
            Span::styled(format!("[ {} ]", self.phase.scan_label()), label_style),
            Span::raw(" "),
        ]);
        let bar = Paragraph::new(self.url.as_str()).block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(self.border_style(Field::Url)),
        );
        f.render_widget(bar, area);
    }

    fn conversation_lines(&self, width: usize) -> Vec<Line<'_>> {
        let mut lines = Vec::new();
        for entry in &self.entries {
            let (prefix, style) = match entry.speaker {
                Speaker::User => ("you› ", Style::default().fg(Color::Yellow)),
                Speaker::Page => ("page› ", Style::default().fg(Color::White)),
                Speaker::Error => ("error› ", Style::default().fg(Color::Red)),
            };
            let mut text = format!("{prefix}{}", entry.text);
            if entry.cursor {
                text.push(CURSOR);
            }
            for line in wrap_text(&text, width) {
                lines.push(Line::styled(line, style));
            }

            if let Some(meta) = &entry.meta {
                let mut parts = vec![format!("{:.1}s", meta.latency.as_secs_f64())];
                if let Some(score) = meta.confidence {
                    parts.push(format!("confidence {score}%"));
                }
                if meta.refusal {
                    parts.push("not covered by the page".to_string());
                }
                for source in &meta.sources {
                    parts.push(source.clone());
                }
                for line in wrap_text(&parts.join(" · "), width) {
                    lines.push(Line::styled(line, Style::default().fg(Color::DarkGray)));
                }
            }

            for (i, suggestion) in entry.suggestions.iter().take(3).enumerate() {
                lines.push(Line::styled(
                    format!("  F{} {suggestion}", i + 1),
                    Style::default().fg(Color::Cyan),
                ));
            }
            lines.push(Line::raw(""));
        }
        lines
    }

    fn draw_conversation(&self, f: &mut Frame, area: Rect) {
        let inner_width = area.width.saturating_sub(2) as usize;
        let inner_height = area.height.saturating_sub(2);
        let lines = self.conversation_lines(inner_width);

        let total = u16::try_from(lines.len()).unwrap_or(u16::MAX);
        let bottom = total.saturating_sub(inner_height);
        let offset = bottom.saturating_sub(self.scroll_back);

        let conversation = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(" Conversation "))
            .scroll((offset, 0));
        f.render_widget(conversation, area);
    }

    fn draw_analysis(&self, f: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title(" Analysis ");
        let Some(analysis) = &self.analysis else {
            let hint = match self.phase {
                ConnectionPhase::Restricted => "This page cannot be connected.",
                ConnectionPhase::Connecting | ConnectionPhase::Indexing => "Indexing...",
                _ => "Connect to a page to see its analysis.",
            };
            let empty = Paragraph::new(hint)
                .style(Style::default().fg(Color::DarkGray))
                .wrap(Wrap { trim: true })
                .block(block);
            f.render_widget(empty, area);
            return;
        };

        let mut lines = vec![
            Line::styled(
                analysis.kind.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Line::raw(""),
        ];
        lines.extend(analysis.summary.lines().map(|l| Line::raw(l.to_string())));
        if !analysis.topics.is_empty() {
            lines.push(Line::raw(""));
            lines.push(Line::styled(
                "Topics",
                Style::default().add_modifier(Modifier::BOLD),
            ));
            lines.extend(analysis.topics.iter().map(|t| Line::raw(format!("• {t}"))));
        }

        let panel = Paragraph::new(lines).wrap(Wrap { trim: false }).block(block);
        f.render_widget(panel, area);
    }

    fn draw_input(&self, f: &mut Frame, area: Rect) {
        let (title, style) = if self.query_enabled {
            (" Ask a question ", Style::default())
        } else {
            (" Ask a question (connect first) ", Style::default().fg(Color::DarkGray))
        };
        let input = Paragraph::new(self.question.as_str()).style(style).block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(self.border_style(Field::Question)),
        );
        f.render_widget(input, area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagechat_shared::Role;

    fn connected_screen() -> ChatScreen {
        let mut screen = ChatScreen::new("https://example.com");
        screen.apply(UiEvent::Phase(ConnectionPhase::Connected));
        screen.apply(UiEvent::QueryEnabled(true));
        screen
    }

    #[test]
    fn enter_on_url_bar_connects() {
        let mut screen = ChatScreen::new("https://example.com");
        assert_eq!(
            screen.handle_key(KeyCode::Enter, KeyModifiers::NONE),
            Action::Connect("https://example.com".into())
        );

        screen.apply(UiEvent::Phase(ConnectionPhase::Indexing));
        assert_eq!(
            screen.handle_key(KeyCode::Enter, KeyModifiers::NONE),
            Action::None
        );
    }

    #[test]
    fn question_is_sent_only_when_enabled() {
        let mut screen = ChatScreen::new("https://example.com");
        screen.handle_key(KeyCode::Tab, KeyModifiers::NONE);
        screen.handle_key(KeyCode::Char('?'), KeyModifiers::NONE);
        assert_eq!(
            screen.handle_key(KeyCode::Enter, KeyModifiers::NONE),
            Action::None
        );

        let mut screen = connected_screen();
        for c in "Why?".chars() {
            screen.handle_key(KeyCode::Char(c), KeyModifiers::NONE);
        }
        assert_eq!(
            screen.handle_key(KeyCode::Enter, KeyModifiers::NONE),
            Action::Send("Why?".into())
        );
        assert!(screen.question.is_empty());
    }

    #[test]
    fn reveal_events_update_one_entry() {
        let mut screen = connected_screen();
        screen.apply(UiEvent::Render(RenderEvent::Started {
            id: 7,
            role: Role::Assistant,
            error: false,
        }));
        screen.apply(UiEvent::Render(RenderEvent::Revealed {
            id: 7,
            text: "Hello ".into(),
            cursor: true,
        }));
        assert_eq!(screen.entries.len(), 1);
        assert!(screen.entries[0].cursor);

        screen.apply(UiEvent::Render(RenderEvent::Finished {
            id: 7,
            text: "Hello world".into(),
        }));
        assert_eq!(screen.entries[0].text, "Hello world");
        assert!(!screen.entries[0].cursor);
    }

    #[test]
    fn function_keys_pick_latest_suggestions() {
        let mut screen = connected_screen();
        screen.apply(UiEvent::Render(RenderEvent::Started {
            id: 1,
            role: Role::Assistant,
            error: false,
        }));
        screen.apply(UiEvent::Render(RenderEvent::SuggestionsShown {
            id: 1,
            suggestions: vec!["First?".into(), "Second?".into()],
        }));

        assert_eq!(
            screen.handle_key(KeyCode::F(2), KeyModifiers::NONE),
            Action::Suggest("Second?".into())
        );
        assert_eq!(
            screen.handle_key(KeyCode::F(3), KeyModifiers::NONE),
            Action::None
        );
    }

    #[test]
    fn hidden_analysis_is_cleared() {
        let mut screen = connected_screen();
        screen.apply(UiEvent::Analysis(Some(AnalysisView {
            kind: "Article".into(),
            summary: "- A.".into(),
            topics: vec![],
        })));
        assert!(screen.analysis.is_some());

        screen.apply(UiEvent::Analysis(None));
        screen.apply(UiEvent::Phase(ConnectionPhase::Connectable));
        assert!(screen.analysis.is_none());
        assert_eq!(screen.phase().scan_label(), "Connect");
    }
}
