//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use pagechat_client::RequestClient;
use pagechat_core::{
    Controller, Renderer, ScanOutcome, SendOutcome, SessionLedger, TargetChange, View,
};
use pagechat_shared::{
    AppConfig, ClientConfig, PollConfig, RenderTimings, Role, database_path, init_config,
    load_config, validate_config,
};
use pagechat_storage::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::terminal::TerminalView;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// PageChat: ask questions about any web page.
#[derive(Parser)]
#[command(
    name = "pagechat",
    version,
    about = "Connect to a web page through a PageChat backend and ask questions about it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Backend base URL (overrides `[backend] base_url`).
    #[arg(long, env = "PAGECHAT_BACKEND_URL", global = true)]
    pub backend: Option<String>,

    /// Print answers at once instead of revealing them word by word.
    #[arg(long, global = true)]
    pub instant: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Check that the backend is reachable.
    Health,

    /// Connect to a page and ask a single question.
    Ask {
        /// Page URL.
        url: String,

        /// Question about the page.
        question: String,
    },

    /// Connect to a page and start an interactive session.
    Chat {
        /// Page URL.
        url: String,
    },

    /// Inspect or clear the stored conversation.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// History subcommands.
#[derive(Subcommand)]
pub(crate) enum HistoryAction {
    /// Print the stored conversation.
    Show,
    /// Delete the stored conversation.
    Clear,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
///
/// Logs go to stderr so streamed answers on stdout stay clean.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pagechat=warn",
        1 => "pagechat=info",
        2 => "pagechat=debug",
        _ => "pagechat=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(cli.backend.as_deref())?;

    match cli.command {
        Command::Health => cmd_health(&config).await,
        Command::Ask { url, question } => cmd_ask(&config, cli.instant, &url, &question).await,
        Command::Chat { url } => cmd_chat(&config, cli.instant, &url).await,
        Command::History { action } => match action {
            HistoryAction::Show => cmd_history_show(&config).await,
            HistoryAction::Clear => cmd_history_clear(&config).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

/// Load the config file and apply command-line overrides.
fn resolve_config(backend: Option<&str>) -> Result<AppConfig> {
    let mut config = load_config()?;
    if let Some(url) = backend {
        config.backend.base_url = url.trim_end_matches('/').to_string();
        validate_config(&config)?;
    }
    Ok(config)
}

/// Wire a controller to the libSQL ledger and the HTTP backend.
async fn build_controller(
    config: &AppConfig,
    view: Arc<dyn View>,
    instant: bool,
) -> Result<Controller> {
    let storage = Storage::open(&database_path(config)?).await?;
    let ledger = SessionLedger::load(Arc::new(storage), config.session.max_turns).await?;
    let client = RequestClient::http(ClientConfig::from(config))?;
    let timings = if instant {
        RenderTimings::instant()
    } else {
        RenderTimings::from(config)
    };

    Ok(Controller::new(
        client,
        PollConfig::from(config),
        Renderer::new(timings, None),
        ledger,
        view,
        config.indexing.max_pages,
    ))
}

/// Select `url` and connect to it.
async fn connect(controller: &Controller, url: &str) -> Result<()> {
    if let TargetChange::Restricted = controller.refresh_target(url).await {
        return Err(eyre!("'{url}' is not a web page; only http(s) URLs can be connected"));
    }
    match controller.scan().await {
        ScanOutcome::Connected(_) => Ok(()),
        ScanOutcome::Failed(e) | ScanOutcome::Rejected(e) => Err(e.into()),
        ScanOutcome::Busy | ScanOutcome::Superseded => Err(eyre!("connection was interrupted")),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_health(config: &AppConfig) -> Result<()> {
    let client = RequestClient::http(ClientConfig::from(config))?;
    info!(backend = %config.backend.base_url, "probing backend");

    match client.health().await {
        Ok(body) => {
            println!("Backend at {} is reachable.", config.backend.base_url);
            if let Some(version) = body.get("version").and_then(|v| v.as_str()) {
                println!("  Version: {version}");
            }
            Ok(())
        }
        Err(e) => Err(eyre!(
            "backend at {} is not reachable: {e}",
            config.backend.base_url
        )),
    }
}

async fn cmd_ask(config: &AppConfig, instant: bool, url: &str, question: &str) -> Result<()> {
    let view = Arc::new(TerminalView::new(true));
    let instant = instant || !view.is_tty();
    let controller = build_controller(config, view, instant).await?;

    connect(&controller, url).await?;
    match controller.send(question).await {
        SendOutcome::Answered(_) => Ok(()),
        SendOutcome::Failed(e) | SendOutcome::Rejected(e) => Err(e.into()),
        SendOutcome::Busy | SendOutcome::Superseded => Err(eyre!("question was not answered")),
    }
}

/// A line typed into the chat REPL.
#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Ask(String),
    Open(String),
    Refresh,
    Pick(usize),
    History,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

fn parse_repl_line(line: &str) -> ReplCommand {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return if line.is_empty() {
            ReplCommand::Empty
        } else {
            ReplCommand::Ask(line.to_string())
        };
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match name {
        "open" if !arg.is_empty() => ReplCommand::Open(arg.to_string()),
        "refresh" => ReplCommand::Refresh,
        "history" => ReplCommand::History,
        "help" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        n => match n.parse::<usize>() {
            Ok(n) if n > 0 => ReplCommand::Pick(n),
            _ => ReplCommand::Unknown(line.to_string()),
        },
    }
}

const REPL_HELP: &str = "\
  <question>     ask about the connected page
  /N             ask suggestion N
  /open <url>    switch to another page and connect
  /refresh       reconnect to the current page
  /history       show the conversation so far
  /quit          leave";

async fn cmd_chat(config: &AppConfig, instant: bool, url: &str) -> Result<()> {
    let view = Arc::new(TerminalView::new(false));
    let instant = instant || !view.is_tty();
    let controller = Arc::new(build_controller(config, view.clone(), instant).await?);

    let mut current_url = url.to_string();
    if let Err(e) = connect(&controller, &current_url).await {
        warn!(error = %e, "initial connect failed");
        println!("Type /refresh to try again or /open <url> for another page.");
    }
    println!("Type a question, or /help.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match parse_repl_line(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Ask(question) => report_send(controller.send(&question).await),
            ReplCommand::Pick(n) => match view.suggestion(n) {
                Some(suggestion) => {
                    println!("you› {suggestion}");
                    report_send(controller.select_suggestion(&suggestion).await);
                }
                None => println!("No suggestion #{n}."),
            },
            ReplCommand::Open(url) => {
                current_url = url;
                if let Err(e) = connect(&controller, &current_url).await {
                    println!("Could not connect: {e}");
                }
            }
            ReplCommand::Refresh => {
                if let Err(e) = connect(&controller, &current_url).await {
                    println!("Could not connect: {e}");
                }
            }
            ReplCommand::History => print_history(&controller.history().await),
            ReplCommand::Help => println!("{REPL_HELP}"),
            ReplCommand::Quit => break,
            ReplCommand::Unknown(input) => println!("Unknown command '{input}'. Try /help."),
        }
    }

    controller.shutdown().await;
    Ok(())
}

fn report_send(outcome: SendOutcome) {
    match outcome {
        SendOutcome::Rejected(e) => println!("{}", e.user_message()),
        SendOutcome::Busy => println!("Still working on the previous request."),
        SendOutcome::Answered(_) | SendOutcome::Failed(_) | SendOutcome::Superseded => {}
    }
}

fn print_history(messages: &[pagechat_shared::Message]) {
    if messages.is_empty() {
        println!("No conversation yet.");
        return;
    }
    for message in messages {
        let who = match message.role {
            Role::User => "you ",
            Role::Assistant => "page",
        };
        println!("{who}› {}", message.content);
    }
}

async fn cmd_history_show(config: &AppConfig) -> Result<()> {
    let storage = Storage::open(&database_path(config)?).await?;
    let ledger = SessionLedger::load(Arc::new(storage), config.session.max_turns).await?;
    print_history(ledger.messages());
    Ok(())
}

async fn cmd_history_clear(config: &AppConfig) -> Result<()> {
    let storage = Storage::open(&database_path(config)?).await?;
    let mut ledger = SessionLedger::load(Arc::new(storage), config.session.max_turns).await?;
    let removed = ledger.len();
    ledger.clear();
    ledger.persist().await?;
    println!("Cleared {removed} message(s).");
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ask_with_backend_override() {
        let cli = Cli::try_parse_from([
            "pagechat",
            "--backend",
            "http://127.0.0.1:9000",
            "ask",
            "https://example.com",
            "What is this?",
        ])
        .unwrap();
        assert_eq!(cli.backend.as_deref(), Some("http://127.0.0.1:9000"));
        assert!(matches!(cli.command, Command::Ask { ref question, .. } if question == "What is this?"));
    }

    #[test]
    fn repl_lines() {
        assert_eq!(parse_repl_line("  "), ReplCommand::Empty);
        assert_eq!(
            parse_repl_line("What is it?"),
            ReplCommand::Ask("What is it?".into())
        );
        assert_eq!(parse_repl_line("/2"), ReplCommand::Pick(2));
        assert_eq!(
            parse_repl_line("/open https://b.com"),
            ReplCommand::Open("https://b.com".into())
        );
        assert_eq!(parse_repl_line("/refresh"), ReplCommand::Refresh);
        assert_eq!(parse_repl_line("/quit"), ReplCommand::Quit);
        assert!(matches!(parse_repl_line("/0"), ReplCommand::Unknown(_)));
        assert!(matches!(parse_repl_line("/open"), ReplCommand::Unknown(_)));
    }

    #[test]
    fn backend_override_is_validated() {
        assert!(resolve_config(Some("ftp://nope")).is_err());
    }
}
