//! PageChat TUI: chat with a web page from the terminal.
//!
//! A single chat screen built with `ratatui` + `crossterm`. Controller work runs
//! on a tokio runtime; its output reaches the draw loop through a channel.

mod app;
mod screens;
mod view;
mod widgets;

use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use color_eyre::eyre::Result;
use pagechat_client::RequestClient;
use pagechat_core::{Controller, Renderer, SessionLedger, View};
use pagechat_markdown::{MarkdownRender, TerminalMarkdown};
use pagechat_shared::{
    AppConfig, ClientConfig, PollConfig, RenderTimings, config_dir, database_path, load_config,
    validate_config,
};
use pagechat_storage::Storage;
use tokio::sync::mpsc;

use crate::app::App;
use crate::view::TuiView;

const LOG_FILE_NAME: &str = "pagechat-tui.log";

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing()?;

    let config = load_config()?;
    validate_config(&config)?;
    let url = std::env::args().nth(1).unwrap_or_default();

    let runtime = tokio::runtime::Runtime::new()?;
    let (tx, rx) = mpsc::unbounded_channel();
    let view: Arc<dyn View> = Arc::new(TuiView::new(tx.clone()));
    let controller = Arc::new(runtime.block_on(build_controller(&config, view))?);

    tracing::info!(url = %url, "starting pagechat-tui");
    let app = App::new(Arc::clone(&controller), runtime.handle().clone(), tx, &url);
    let result = app::run(app, rx);

    runtime.block_on(controller.shutdown());
    result
}

/// Log to a file under the config directory; the terminal belongs to the UI.
fn init_tracing() -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let dir = config_dir()?;
    std::fs::create_dir_all(&dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE_NAME))?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pagechat=info"));

    fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

async fn build_controller(config: &AppConfig, view: Arc<dyn View>) -> Result<Controller> {
    let storage = Storage::open(&database_path(config)?).await?;
    let ledger = SessionLedger::load(Arc::new(storage), config.session.max_turns).await?;
    let client = RequestClient::http(ClientConfig::from(config))?;
    let markdown: Option<Arc<dyn MarkdownRender>> = config
        .render
        .markdown
        .then(|| Arc::new(TerminalMarkdown::plain()) as Arc<dyn MarkdownRender>);

    Ok(Controller::new(
        client,
        PollConfig::from(config),
        Renderer::new(RenderTimings::from(config), markdown),
        ledger,
        view,
        config.indexing.max_pages,
    ))
}
