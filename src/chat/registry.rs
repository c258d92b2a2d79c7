//! Chatbot registry: builds and initialises a chatbot from a spec string.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use super::resolver::Resolver;
use super::tianxing::{self, ApiType, Endpoint, TianxingChatbot};
use super::{parse_chatbot_spec, ChatError, Chatbot, MessageSink, UuidSource};

/// Host collaborators handed to every chatbot factory.
#[derive(Clone)]
pub struct ChatbotContext {
    /// Where replies go.
    pub sink: Arc<dyn MessageSink>,
    /// Stable user identifier.
    pub uuid: Arc<dyn UuidSource>,
    /// Hostname resolver used for the lazy connection.
    pub resolver: Arc<dyn Resolver>,
    /// API endpoint.
    pub endpoint: Endpoint,
    /// Initial API variant.
    pub api_type: ApiType,
}

type Factory = Box<dyn Fn(&ChatbotContext) -> Arc<dyn Chatbot> + Send + Sync>;

/// Name → factory map for chatbot plugins.
#[derive(Default)]
pub struct ChatbotRegistry {
    factories: BTreeMap<String, Factory>,
}

impl ChatbotRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in chatbot registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(tianxing::NAME, |ctx| {
            let chatbot: Arc<dyn Chatbot> = Arc::new(
                TianxingChatbot::new(
                    ctx.endpoint.clone(),
                    Arc::clone(&ctx.resolver),
                    Arc::clone(&ctx.sink),
                    Arc::clone(&ctx.uuid),
                )
                .with_api_type(ctx.api_type),
            );
            chatbot
        });
        registry
    }

    /// Register a factory under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ChatbotContext) -> Arc<dyn Chatbot> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_owned(), Box::new(factory));
    }

    /// Registered chatbot names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build the chatbot named by `spec` and initialise it with the config part.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidSpec`] for a malformed spec,
    /// [`ChatError::UnknownChatbot`] for an unregistered name, and whatever
    /// the chatbot's `init` reports.
    pub fn create(&self, spec: &str, ctx: &ChatbotContext) -> Result<Arc<dyn Chatbot>, ChatError> {
        let (name, config) = parse_chatbot_spec(spec)?;
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ChatError::UnknownChatbot(name.to_owned()))?;
        let chatbot = factory(ctx);
        chatbot.init(config)?;
        info!(chatbot = name, "chatbot initialised");
        Ok(chatbot)
    }
}
