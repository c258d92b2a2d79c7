//! Tianxing reply API adapter (`api.tianapi.com`).
//!
//! The connection is created lazily: the first message resolves the API
//! hostname and pins a [`reqwest::Client`] to the resolved address. That
//! client is then reused for the adapter's lifetime. Messages arriving while
//! the first resolution is still in flight are dropped, not queued.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::resolver::Resolver;
use super::{ChatError, Chatbot, Delivery, DropReason, MessageSink, UuidSource};

/// Registry name of this chatbot.
pub const NAME: &str = "tianxing";

/// Hostname of the Tianxing API.
pub const HOSTNAME: &str = "api.tianapi.com";

/// Plaintext HTTP port of the Tianxing API.
pub const DEFAULT_PORT: u16 = 80;

/// Request timeout applied to every exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

const SUCCESS_CODE: i64 = 200;
const LINE_BREAK_MARKER: &str = "<br/>";

// ---------------------------------------------------------------------------
// API variant
// ---------------------------------------------------------------------------

/// Which Tianxing sub-API answers the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    /// `/txapi/tuling/index`
    Tuling,
    /// `/txapi/robot/index`
    #[default]
    Robot,
}

impl ApiType {
    /// Request path for this variant.
    pub fn path(self) -> &'static str {
        match self {
            Self::Tuling => "/txapi/tuling/index",
            Self::Robot => "/txapi/robot/index",
        }
    }

    /// The other variant.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Tuling => Self::Robot,
            Self::Robot => Self::Tuling,
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tuling => f.write_str("tuling"),
            Self::Robot => f.write_str("robot"),
        }
    }
}

/// Error returned when parsing an unknown [`ApiType`] name.
#[derive(Debug, thiserror::Error)]
#[error("unknown api type {0:?}, expected 'tuling' or 'robot'")]
pub struct UnknownApiType(String);

impl FromStr for ApiType {
    type Err = UnknownApiType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tuling" => Ok(Self::Tuling),
            "robot" => Ok(Self::Robot),
            _ => Err(UnknownApiType(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Where requests go and how long they may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname, resolved once and sent as the `Host` header.
    pub hostname: String,
    /// TCP port.
    pub port: u16,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            hostname: HOSTNAME.to_owned(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Endpoint {
    fn url(&self, target: &str) -> String {
        format!("http://{}:{}{target}", self.hostname, self.port)
    }
}

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Tianxing response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct TianxingResponse {
    /// Application status code; `200` on success.
    pub code: i64,
    /// Replies, present only on success. Decoded only once `code` is `200`.
    #[serde(default)]
    pub newslist: Option<serde_json::Value>,
}

/// A single reply entry.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct TianxingReply {
    /// Reply text, possibly containing `<br/>` line breaks.
    pub reply: String,
}

/// Errors decoding a Tianxing response body.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    /// The body is not JSON at all.
    #[error("response is not json: {0}")]
    NotJson(#[source] serde_json::Error),
    /// The body is JSON but not the expected shape.
    #[error("response is not valid: {0}")]
    Invalid(String),
    /// The API reported a non-success code.
    #[error("response code is not 200: {0}")]
    Code(i64),
}

// ---------------------------------------------------------------------------
// Request / Response builders (pub for integration testing)
// ---------------------------------------------------------------------------

/// Build the request path and query for one question.
///
/// `api_key` and `userid` are inserted verbatim; the question is
/// form-urlencoded (UTF-8, space as `+`).
pub fn request_target(api_type: ApiType, api_key: &str, userid: &str, question: &str) -> String {
    let question: String = url::form_urlencoded::byte_serialize(question.as_bytes()).collect();
    format!(
        "{}?key={api_key}&userid={userid}&question={question}",
        api_type.path()
    )
}

/// Decode a response body into the ordered reply texts.
///
/// Every `<br/>` in a reply becomes `\n`.
///
/// # Errors
///
/// Returns [`ReplyError::NotJson`] for non-JSON bodies, [`ReplyError::Invalid`]
/// when the JSON is not an object with the expected fields, and
/// [`ReplyError::Code`] when `code` is not `200`.
pub fn parse_reply(body: &str) -> Result<Vec<String>, ReplyError> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(ReplyError::NotJson)?;
    if !value.is_object() {
        return Err(ReplyError::Invalid("top-level value is not an object".to_owned()));
    }
    let response: TianxingResponse =
        serde_json::from_value(value).map_err(|e| ReplyError::Invalid(e.to_string()))?;
    if response.code != SUCCESS_CODE {
        return Err(ReplyError::Code(response.code));
    }
    let newslist = response
        .newslist
        .ok_or_else(|| ReplyError::Invalid("missing field `newslist`".to_owned()))?;
    let newslist: Vec<TianxingReply> =
        serde_json::from_value(newslist).map_err(|e| ReplyError::Invalid(e.to_string()))?;
    Ok(newslist
        .into_iter()
        .map(|item| item.reply.replace(LINE_BREAK_MARKER, "\n"))
        .collect())
}

// ---------------------------------------------------------------------------
// Chatbot
// ---------------------------------------------------------------------------

enum Connection {
    Absent,
    Pending,
    Ready(reqwest::Client),
}

enum Acquire {
    Ready(reqwest::Client),
    Resolve,
    Pending,
}

/// Resets a `Pending` connection to `Absent` unless disarmed, so a cancelled
/// resolution never wedges the adapter.
struct PendingGuard<'a> {
    connection: &'a Mutex<Connection>,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *lock(self.connection) = Connection::Absent;
        }
    }
}

/// Chat relay adapter for the Tianxing reply API.
pub struct TianxingChatbot {
    api_key: OnceLock<String>,
    api_type: Mutex<ApiType>,
    connection: Mutex<Connection>,
    endpoint: Endpoint,
    resolver: Arc<dyn Resolver>,
    sink: Arc<dyn MessageSink>,
    uuid: Arc<dyn UuidSource>,
}

impl TianxingChatbot {
    /// Create an uninitialised adapter. Call [`Chatbot::init`] before use.
    pub fn new(
        endpoint: Endpoint,
        resolver: Arc<dyn Resolver>,
        sink: Arc<dyn MessageSink>,
        uuid: Arc<dyn UuidSource>,
    ) -> Self {
        Self {
            api_key: OnceLock::new(),
            api_type: Mutex::new(ApiType::default()),
            connection: Mutex::new(Connection::Absent),
            endpoint,
            resolver,
            sink,
            uuid,
        }
    }

    /// Start on a specific API variant instead of the default.
    #[must_use]
    pub fn with_api_type(self, api_type: ApiType) -> Self {
        *lock(&self.api_type) = api_type;
        self
    }

    /// Currently selected API variant.
    pub fn api_type(&self) -> ApiType {
        *lock(&self.api_type)
    }

    /// Whether the connection handle has been created.
    pub fn is_connected(&self) -> bool {
        matches!(*lock(&self.connection), Connection::Ready(_))
    }

    /// Run one message through the full exchange and report what happened.
    ///
    /// [`Chatbot::take_message`] spawns this; hosts that want to await the
    /// outcome inline can call it directly.
    pub async fn handle_message(&self, msg: &str) -> Delivery {
        let Some(api_key) = self.api_key.get() else {
            error!(chatbot = NAME, "message received before init, dropping");
            return Delivery::Dropped(DropReason::NotInitialized);
        };

        let client = match self.acquire() {
            Acquire::Ready(client) => client,
            Acquire::Pending => {
                info!(
                    hostname = %self.endpoint.hostname,
                    "hostname resolution in progress, dropping message"
                );
                return Delivery::Dropped(DropReason::ResolutionPending);
            }
            Acquire::Resolve => match self.connect().await {
                Ok(client) => client,
                Err(reason) => return Delivery::Dropped(reason),
            },
        };

        self.send_request(&client, api_key, msg).await
    }

    fn acquire(&self) -> Acquire {
        let mut state = lock(&self.connection);
        match &*state {
            Connection::Ready(client) => Acquire::Ready(client.clone()),
            Connection::Pending => Acquire::Pending,
            Connection::Absent => {
                *state = Connection::Pending;
                Acquire::Resolve
            }
        }
    }

    async fn connect(&self) -> Result<reqwest::Client, DropReason> {
        let mut guard = PendingGuard {
            connection: &self.connection,
            armed: true,
        };

        let ip = match self.resolver.resolve(&self.endpoint.hostname).await {
            Ok(ip) => ip,
            Err(e) => {
                error!(hostname = %self.endpoint.hostname, error = %e, "cannot resolve hostname");
                return Err(DropReason::Resolution);
            }
        };

        let client = match build_client(&self.endpoint, ip) {
            Ok(client) => client,
            Err(e) => {
                error!(hostname = %self.endpoint.hostname, %ip, error = %e, "cannot build http client");
                return Err(DropReason::Resolution);
            }
        };

        info!(hostname = %self.endpoint.hostname, %ip, "tianxing connection ready");
        *lock(&self.connection) = Connection::Ready(client.clone());
        guard.armed = false;
        Ok(client)
    }

    async fn send_request(&self, client: &reqwest::Client, api_key: &str, msg: &str) -> Delivery {
        let api_type = self.api_type();
        let userid = self.uuid.uuid();
        let target = request_target(api_type, api_key, &userid, msg);
        info!(path = api_type.path(), %userid, "tianxing request");

        let response = client
            .get(self.endpoint.url(&target))
            .header(reqwest::header::HOST, self.endpoint.hostname.as_str())
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "request tianxing failed");
                return Delivery::Dropped(DropReason::Transport);
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "reading tianxing response failed");
                return Delivery::Dropped(DropReason::Transport);
            }
        };
        debug!(status = status.as_u16(), %body, "tianxing returned");

        match parse_reply(&body) {
            Ok(replies) => {
                let count = replies.len();
                self.sink.send_message(replies);
                Delivery::Delivered(count)
            }
            Err(e @ ReplyError::NotJson(_)) => {
                error!(error = %e, %body, "tianxing response is not json");
                Delivery::Dropped(DropReason::Malformed)
            }
            Err(e @ ReplyError::Invalid(_)) => {
                error!(error = %e, %body, "tianxing response is not valid");
                Delivery::Dropped(DropReason::Malformed)
            }
            Err(ReplyError::Code(code)) => {
                error!(code, "tianxing response code is not 200");
                Delivery::Dropped(DropReason::Application)
            }
        }
    }
}

impl Chatbot for TianxingChatbot {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&self, config: &str) -> Result<(), ChatError> {
        if config.trim().is_empty() {
            return Err(ChatError::Configuration {
                name: NAME.to_owned(),
            });
        }
        self.api_key
            .set(config.to_owned())
            .map_err(|_| ChatError::AlreadyInitialized(NAME.to_owned()))
    }

    fn take_message(self: Arc<Self>, msg: String) -> JoinHandle<Delivery> {
        tokio::spawn(async move { self.handle_message(&msg).await })
    }

    fn switch_type(&self) {
        let mut api_type = lock(&self.api_type);
        *api_type = api_type.toggled();
        let current = *api_type;
        drop(api_type);
        info!(api_type = %current, "tianxing api type switched");
    }
}

fn build_client(endpoint: &Endpoint, ip: IpAddr) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .resolve(&endpoint.hostname, SocketAddr::new(ip, endpoint.port))
        .timeout(endpoint.timeout)
        .no_proxy()
        .build()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
