//! Structured logging for the chatbot binary.
//!
//! [`LogMode::Session`] is the interactive `chat` loop: every exchange is
//! kept in a daily-rotated JSON transcript under `<config dir>/logs`, and a
//! compact copy goes to stderr. [`LogMode::Cli`] is for one-shot commands
//! (`init`, `ask`) and logs to stderr only, quiet by default so stdout
//! carries nothing but replies.
//!
//! `RUST_LOG` overrides the per-mode default directive.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix of the session transcript; the appender adds `.YYYY-MM-DD`.
pub const SESSION_LOG_PREFIX: &str = "chat-session.log";

/// How the binary is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Long-lived interactive chat.
    Session,
    /// One-shot subcommand.
    Cli,
}

impl LogMode {
    /// Filter used when `RUST_LOG` is unset.
    ///
    /// Only this crate logs at the mode's level; the HTTP stack stays at
    /// `warn`/`error` so request internals do not drown the relay events.
    pub fn default_directive(self) -> &'static str {
        match self {
            Self::Session => "tianxing_chatbot=info,warn",
            Self::Cli => "tianxing_chatbot=warn,error",
        }
    }

    fn env_filter(self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directive()))
    }
}

/// Holds the non-blocking writer guard for the session transcript.
///
/// Dropping it flushes pending entries, so keep it alive for the whole chat.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Directory holding session transcripts for a given config directory.
pub fn logs_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("logs")
}

/// Initialise [`LogMode::Session`] logging.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created or a global
/// subscriber is already installed.
pub fn init_session(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, SESSION_LOG_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let transcript_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(false)
        .with_writer(non_blocking);

    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(LogMode::Session.env_filter())
        .with(transcript_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install subscriber: {e}"))?;

    Ok(LoggingGuard { _guard: guard })
}

/// Initialise [`LogMode::Cli`] logging: stderr only, no transcript.
pub fn init_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(LogMode::Cli.env_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
