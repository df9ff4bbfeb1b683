//! Core TUI application state and event loop.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::Result;
use crossterm::{
    event::{self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use pagechat_core::{Controller, ScanOutcome, SendOutcome, TargetChange};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::screens::{Action, ChatScreen};
use crate::view::UiEvent;
use crate::widgets::{centered_rect, status_bar};

/// Application state.
pub(crate) struct App {
    screen: ChatScreen,
    /// Status message shown in bottom bar.
    status: String,
    show_help: bool,
    should_quit: bool,
    controller: Arc<Controller>,
    runtime: Handle,
    /// Used by spawned operations to post notices back to the loop.
    notices: UnboundedSender<UiEvent>,
}

impl App {
    pub(crate) fn new(
        controller: Arc<Controller>,
        runtime: Handle,
        notices: UnboundedSender<UiEvent>,
        url: &str,
    ) -> Self {
        Self {
            screen: ChatScreen::new(url),
            status: "Enter a URL and press Enter to connect. F12 for help".to_string(),
            show_help: false,
            should_quit: false,
            controller,
            runtime,
            notices,
        }
    }

    fn apply(&mut self, event: UiEvent) {
        if let UiEvent::Notice(text) = &event {
            self.status.clone_from(text);
        }
        self.screen.apply(event);
    }

    // -----------------------------------------------------------------------
    // Controller operations
    // -----------------------------------------------------------------------

    fn connect(&mut self, url: String) {
        self.status = format!("Connecting to {url}");
        let controller = Arc::clone(&self.controller);
        let notices = self.notices.clone();
        self.runtime.spawn(async move {
            if controller.refresh_target(&url).await == TargetChange::Restricted {
                let _ = notices.send(UiEvent::Notice(format!(
                    "'{url}' is not a web page; only http(s) URLs can be connected"
                )));
                return;
            }
            let notice = match controller.scan().await {
                ScanOutcome::Connected(_) => "Connected. Ask a question below.".to_string(),
                ScanOutcome::Failed(e) => e.user_message(),
                ScanOutcome::Rejected(e) => e.to_string(),
                ScanOutcome::Busy => "Still working on the previous request".to_string(),
                ScanOutcome::Superseded => return,
            };
            let _ = notices.send(UiEvent::Notice(notice));
        });
    }

    fn ask(&mut self, question: String, suggested: bool) {
        let controller = Arc::clone(&self.controller);
        let notices = self.notices.clone();
        self.runtime.spawn(async move {
            let outcome = if suggested {
                controller.select_suggestion(&question).await
            } else {
                controller.send(&question).await
            };
            let notice = match outcome {
                SendOutcome::Answered(_) | SendOutcome::Superseded => return,
                SendOutcome::Failed(e) => e.user_message(),
                SendOutcome::Rejected(e) => e.to_string(),
                SendOutcome::Busy => "Still working on the previous request".to_string(),
            };
            let _ = notices.send(UiEvent::Notice(notice));
        });
    }

    /// The terminal regained focus: re-read the URL bar as the active page.
    fn refresh_target(&mut self) {
        let url = self.screen.url().to_string();
        if url.is_empty() {
            return;
        }
        let controller = Arc::clone(&self.controller);
        let notices = self.notices.clone();
        self.runtime.spawn(async move {
            if let TargetChange::Switched { to, .. } = controller.refresh_target(&url).await {
                let _ = notices.send(UiEvent::Notice(format!(
                    "Page changed to {to}; press Enter to connect"
                )));
            }
        });
    }

    // -----------------------------------------------------------------------
    // Input
    // -----------------------------------------------------------------------

    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
        match code {
            KeyCode::Char('q') | KeyCode::Char('c')
                if modifiers.contains(KeyModifiers::CONTROL) =>
            {
                self.should_quit = true;
                return;
            }
            KeyCode::F(12) => {
                self.show_help = !self.show_help;
                return;
            }
            KeyCode::Esc if self.show_help => {
                self.show_help = false;
                return;
            }
            KeyCode::Esc => {
                self.should_quit = true;
                return;
            }
            _ => {}
        }

        // If help is showing, consume any key to dismiss
        if self.show_help {
            self.show_help = false;
            return;
        }

        match self.screen.handle_key(code, modifiers) {
            Action::None => {}
            Action::Connect(url) => self.connect(url),
            Action::Send(question) => self.ask(question, false),
            Action::Suggest(question) => self.ask(question, true),
        }
    }
}

/// Set up the terminal, run the event loop, then restore the terminal.
pub(crate) fn run(mut app: App, events: UnboundedReceiver<UiEvent>) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app, events);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    mut events: UnboundedReceiver<UiEvent>,
) -> Result<()> {
    loop {
        while let Ok(event) = events.try_recv() {
            app.apply(event);
        }

        terminal.draw(|f| draw(f, app))?;

        // Short poll so streamed tokens show up promptly
        if event::poll(Duration::from_millis(20))? {
            match event::read()? {
                Event::Key(key) => app.handle_key(key.code, key.modifiers),
                Event::FocusGained => app.refresh_target(),
                _ => {}
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Content
            Constraint::Length(1), // Status bar
        ])
        .split(f.area());

    app.screen.draw(f, chunks[0]);
    f.render_widget(status_bar(&app.status), chunks[1]);

    if app.show_help {
        draw_help_overlay(f);
    }
}

fn draw_help_overlay(f: &mut Frame) {
    let area = centered_rect(60, 60, f.area());

    let help_text = vec![
        Line::from("Keybindings").style(Style::default().add_modifier(Modifier::BOLD)),
        Line::from(""),
        Line::from("  Tab          Switch between URL bar and question"),
        Line::from("  Enter        Connect / Send question"),
        Line::from("  F1-F3        Ask a suggested question"),
        Line::from("  PgUp/PgDn    Scroll the conversation"),
        Line::from("  F12          Show this help"),
        Line::from("  Esc / Ctrl-C Quit"),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help (press any key to close) ")
                .style(Style::default().bg(Color::DarkGray)),
        )
        .style(Style::default().fg(Color::White).bg(Color::DarkGray));

    f.render_widget(Clear, area);
    f.render_widget(help, area);
}
