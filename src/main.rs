//! Tianxing chatbot CLI entry point.
//!
//! Provides `init`, `ask`, and `chat` subcommands for writing a starter
//! config, sending a single message, or chatting interactively.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use tianxing_chatbot::chat::registry::{ChatbotContext, ChatbotRegistry};
use tianxing_chatbot::chat::resolver::{Resolver, StaticResolver, SystemResolver};
use tianxing_chatbot::chat::tianxing::ApiType;
use tianxing_chatbot::chat::{Chatbot, Delivery};
use tianxing_chatbot::config::{config_dir, config_path_with, Config};
use tianxing_chatbot::logging;
use tianxing_chatbot::sink::StdoutSink;

/// Tianxing chatbot — relay chat text to the Tianxing reply API.
#[derive(Parser)]
#[command(name = "tianxing-chatbot", version, about)]
struct Cli {
    /// Path to config.toml (default: ~/.tianxing-chatbot/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API variant to start with: `tuling` or `robot`.
    #[arg(long, global = true)]
    api_type: Option<ApiType>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Write a starter config with a fresh uuid.
    Init,
    /// Send one message and print the replies.
    Ask {
        /// Message text.
        message: String,
    },
    /// Chat interactively; `/switch` toggles the API type, `/quit` exits.
    Chat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Init => {
            logging::init_cli();
            handle_init(cli.config.as_deref())
        }
        Command::Ask { message } => {
            logging::init_cli();
            handle_ask(cli.config.as_deref(), cli.api_type, message).await
        }
        Command::Chat => {
            let logs_dir = logging::logs_dir(&config_dir()?);
            let _logging_guard = logging::init_session(&logs_dir)?;
            handle_chat(cli.config.as_deref(), cli.api_type).await
        }
    }
}

/// Write a starter config if none exists yet.
fn handle_init(explicit: Option<&Path>) -> anyhow::Result<()> {
    let path = config_path_with(explicit, |key| std::env::var(key).ok())?;
    if path.exists() {
        println!("config already exists at {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let config = Config {
        chatbot: "tianxing:your_api_key".to_owned(),
        ..Config::default()
    };
    std::fs::write(&path, config.to_toml()?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("wrote {}; put your api key into `chatbot`", path.display());
    Ok(())
}

/// Send one message and wait for its outcome.
async fn handle_ask(
    explicit: Option<&Path>,
    api_type: Option<ApiType>,
    message: String,
) -> anyhow::Result<()> {
    let chatbot = build_chatbot(explicit, api_type)?;
    match chatbot.take_message(message).await? {
        Delivery::Delivered(count) => {
            debug!(count, "replies delivered");
            Ok(())
        }
        Delivery::Dropped(reason) => Err(anyhow::anyhow!("message dropped: {reason:?}")),
    }
}

/// Read messages from stdin until EOF or `/quit`.
async fn handle_chat(explicit: Option<&Path>, api_type: Option<ApiType>) -> anyhow::Result<()> {
    let chatbot = build_chatbot(explicit, api_type)?;
    info!(chatbot = chatbot.name(), "chat session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/switch" => chatbot.switch_type(),
            text => {
                // Await each exchange so replies print in input order.
                let outcome = Arc::clone(&chatbot).take_message(text.to_owned()).await?;
                if let Delivery::Dropped(reason) = outcome {
                    warn!(?reason, "message dropped");
                }
            }
        }
    }

    info!("chat session ended");
    Ok(())
}

/// Load config (with `.env` and env overrides) and build the configured chatbot.
fn build_chatbot(
    explicit: Option<&Path>,
    api_type: Option<ApiType>,
) -> anyhow::Result<Arc<dyn Chatbot>> {
    load_dotenv()?;
    let mut config = Config::load(explicit)?;
    if let Some(api_type) = api_type {
        config.tianxing.api_type = api_type;
    }
    if config.chatbot.trim().is_empty() {
        anyhow::bail!("no chatbot configured; run `tianxing-chatbot init` or set TIANXING_CHATBOT");
    }

    let resolver: Arc<dyn Resolver> = match config.tianxing.address {
        Some(ip) => Arc::new(StaticResolver(ip)),
        None => Arc::new(SystemResolver),
    };
    let registry = ChatbotRegistry::with_defaults();
    let spec = config.chatbot.clone();
    let label = spec.split(':').next().unwrap_or_default().to_owned();
    let ctx = ChatbotContext {
        sink: Arc::new(StdoutSink::new(label)),
        endpoint: config.tianxing.endpoint(),
        api_type: config.tianxing.api_type,
        resolver,
        uuid: Arc::new(config),
    };
    registry
        .create(&spec, &ctx)
        .context("failed to initialise chatbot")
}

/// Load `~/.tianxing-chatbot/.env` if present. Existing env vars win.
fn load_dotenv() -> anyhow::Result<()> {
    let env_path = config_dir()?.join(".env");
    if env_path.exists() {
        dotenvy::from_path(&env_path)
            .with_context(|| format!("failed to read {}", env_path.display()))?;
    }
    Ok(())
}
