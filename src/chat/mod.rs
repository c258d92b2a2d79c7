//! Chatbot plugin surface.
//!
//! A [`Chatbot`] takes user text from the host and eventually hands zero or
//! more replies to the host's [`MessageSink`]. Every per-message failure is
//! logged and summarized in the returned [`Delivery`]; only configuration
//! errors reach the caller.
//!
//! One chatbot is implemented:
//! - [`tianxing::TianxingChatbot`] — Tianxing `/txapi/{tuling,robot}/index` API
//!
//! The [`registry::ChatbotRegistry`] builds a chatbot from a
//! `"<name>:<config>"` spec string.

use std::sync::Arc;

use tokio::task::JoinHandle;

pub mod registry;
pub mod resolver;
pub mod tianxing;

// ---------------------------------------------------------------------------
// Host collaborators
// ---------------------------------------------------------------------------

/// Outbound side of the host chat pipeline.
pub trait MessageSink: Send + Sync {
    /// Deliver an ordered batch of replies in one call.
    ///
    /// How a multi-reply batch is displayed is up to the host.
    fn send_message(&self, replies: Vec<String>);
}

/// Source of the stable per-process user identifier sent with each request.
pub trait UuidSource: Send + Sync {
    /// Current user identifier. Read at call time, never cached by chatbots.
    fn uuid(&self) -> String;
}

impl UuidSource for String {
    fn uuid(&self) -> String {
        self.clone()
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Replies were forwarded to the sink (the count may be zero).
    Delivered(usize),
    /// The message was dropped; nothing reached the sink.
    Dropped(DropReason),
}

/// Why a message was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// `init` has not been called yet.
    NotInitialized,
    /// Another message is still waiting for the hostname to resolve.
    ResolutionPending,
    /// Hostname resolution (or connection setup) failed.
    Resolution,
    /// The HTTP exchange failed or timed out.
    Transport,
    /// The response body was not JSON or lacked the expected fields.
    Malformed,
    /// The API answered with a non-success `code`.
    Application,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced to the host by chatbot setup.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The configuration string was empty or blank.
    #[error("chatbot config should be \"{name}:your_api_key\"")]
    Configuration {
        /// Chatbot name used to compose the expected format.
        name: String,
    },
    /// `init` was called a second time.
    #[error("chatbot {0} is already initialized")]
    AlreadyInitialized(String),
    /// No chatbot is registered under this name.
    #[error("unknown chatbot: {0:?}")]
    UnknownChatbot(String),
    /// The spec string is not `name:config`.
    #[error("invalid chatbot spec: {0:?}, expected format 'name:config'")]
    InvalidSpec(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A chat backend plugged into the host.
///
/// Implementations must be `Send + Sync` so the host can share one instance
/// across tasks.
pub trait Chatbot: Send + Sync {
    /// Registry name, also the prefix of the spec string.
    fn name(&self) -> &str;

    /// Initialise with the configuration part of the spec string.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Configuration`] on a blank config and
    /// [`ChatError::AlreadyInitialized`] on a second call.
    fn init(&self, config: &str) -> Result<(), ChatError>;

    /// Hand a user message to the chatbot without blocking the caller.
    ///
    /// The exchange runs on the tokio runtime; the returned handle may be
    /// awaited or ignored.
    fn take_message(self: Arc<Self>, msg: String) -> JoinHandle<Delivery>;

    /// Cycle the backend variant, if the chatbot has more than one.
    fn switch_type(&self) {}
}

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Split a chatbot spec like `"tianxing:your_api_key"` at the first `:`.
///
/// Returns `(name, config)`. The config part may be empty; the chatbot's own
/// `init` reports that.
///
/// # Errors
///
/// Returns [`ChatError::InvalidSpec`] if there is no `:` or the name is empty.
pub fn parse_chatbot_spec(spec: &str) -> Result<(&str, &str), ChatError> {
    let (name, config) = spec
        .split_once(':')
        .ok_or_else(|| ChatError::InvalidSpec(spec.to_owned()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ChatError::InvalidSpec(spec.to_owned()));
    }
    Ok((name, config))
}
