use std::collections::HashMap;

use serde_json::Value;

use crate::errors::{CounselError, Result};
use crate::models::content::Content;
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::prompt::{ChatOptions, Prompt};
use crate::prompt_template::render_template;
use crate::providers::base::ChatResponse;

/// Advise-context key whose value, when present and non-empty, is appended
/// to the rendered user text as an output-format instruction.
pub const FORMAT_PARAM_KEY: &str = "format_param";

/// The data of a chat request as it travels down the advisor chain.
///
/// Envelopes are never mutated in place: every transformation builds a new
/// one via [`AdvisedRequest::from_prev`], so concurrent chains and audit
/// trails are safe to reason about. Collections are always present; empty
/// means "nothing", not absence.
#[derive(Clone)]
pub struct AdvisedRequest {
    pub user_text: String,
    pub system_text: Option<String>,
    pub options: ChatOptions,
    pub media: Vec<Content>,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    pub user_params: HashMap<String, Value>,
    pub system_params: HashMap<String, Value>,
    pub advisor_params: HashMap<String, Value>,
    pub advise_context: HashMap<String, Value>,
    pub tool_context: HashMap<String, Value>,
}

impl std::fmt::Debug for AdvisedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisedRequest")
            .field("user_text", &self.user_text)
            .field("system_text", &self.system_text)
            .field("options", &self.options)
            .field("messages", &self.messages.len())
            .field("tools", &self.tools.len())
            .field("advise_context", &self.advise_context)
            .finish_non_exhaustive()
    }
}

impl AdvisedRequest {
    pub fn builder() -> AdvisedRequestBuilder {
        AdvisedRequestBuilder::default()
    }

    /// Start a builder pre-populated from an existing envelope.
    pub fn from_prev(prev: &AdvisedRequest) -> AdvisedRequestBuilder {
        AdvisedRequestBuilder {
            user_text: prev.user_text.clone(),
            system_text: prev.system_text.clone(),
            options: prev.options.clone(),
            media: prev.media.clone(),
            messages: prev.messages.clone(),
            tools: prev.tools.clone(),
            user_params: prev.user_params.clone(),
            system_params: prev.system_params.clone(),
            advisor_params: prev.advisor_params.clone(),
            advise_context: prev.advise_context.clone(),
            tool_context: prev.tool_context.clone(),
        }
    }

    /// Produce a new envelope with the advise-context transformed in place
    /// by `transform`; every other field is carried over unchanged.
    pub fn update_context(self, transform: impl FnOnce(&mut HashMap<String, Value>)) -> Self {
        let mut advise_context = self.advise_context;
        transform(&mut advise_context);
        Self {
            advise_context,
            ..self
        }
    }

    /// Render the resolved prompt: history messages, then the rendered
    /// system message (if any), then the rendered user message with media.
    ///
    /// This derivation is pure: calling it twice on the same envelope yields
    /// identical messages apart from timestamps.
    pub fn to_prompt(&self) -> Result<Prompt> {
        let mut messages = self.messages.clone();

        if let Some(system_text) = self.system_text.as_deref() {
            if !system_text.is_empty() {
                let rendered = if self.system_params.is_empty() {
                    system_text.to_string()
                } else {
                    render_template(system_text, &self.system_params)
                        .map_err(CounselError::Template)?
                };
                messages.push(Message::system().with_text(rendered));
            }
        }

        let format_param = self
            .advise_context
            .get(FORMAT_PARAM_KEY)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());

        let mut user_text = self.user_text.clone();
        let mut user_params = self.user_params.clone();
        if let Some(format) = format_param {
            user_text = format!("{user_text}\n{{{{ {FORMAT_PARAM_KEY} }}}}");
            user_params.insert(FORMAT_PARAM_KEY.to_string(), Value::String(format.to_string()));
        }

        if !user_text.is_empty() {
            let rendered = if user_params.is_empty() {
                user_text
            } else {
                render_template(&user_text, &user_params).map_err(CounselError::Template)?
            };
            let mut message = Message::user().with_text(rendered);
            for media in &self.media {
                message = message.with_content(media.clone().into());
            }
            messages.push(message);
        }

        Ok(Prompt {
            messages,
            options: self.options.clone(),
            tools: self.tools.clone(),
            tool_context: self.tool_context.clone(),
        })
    }
}

#[derive(Clone, Default)]
pub struct AdvisedRequestBuilder {
    user_text: String,
    system_text: Option<String>,
    options: ChatOptions,
    media: Vec<Content>,
    messages: Vec<Message>,
    tools: Vec<Tool>,
    user_params: HashMap<String, Value>,
    system_params: HashMap<String, Value>,
    advisor_params: HashMap<String, Value>,
    advise_context: HashMap<String, Value>,
    tool_context: HashMap<String, Value>,
}

impl AdvisedRequestBuilder {
    pub fn user_text<S: Into<String>>(mut self, user_text: S) -> Self {
        self.user_text = user_text.into();
        self
    }

    pub fn system_text<S: Into<String>>(mut self, system_text: S) -> Self {
        self.system_text = Some(system_text.into());
        self
    }

    pub fn options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn media(mut self, media: Vec<Content>) -> Self {
        self.media = media;
        self
    }

    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn user_params(mut self, user_params: HashMap<String, Value>) -> Self {
        self.user_params = user_params;
        self
    }

    pub fn system_params(mut self, system_params: HashMap<String, Value>) -> Self {
        self.system_params = system_params;
        self
    }

    pub fn advisor_params(mut self, advisor_params: HashMap<String, Value>) -> Self {
        self.advisor_params = advisor_params;
        self
    }

    pub fn advise_context(mut self, advise_context: HashMap<String, Value>) -> Self {
        self.advise_context = advise_context;
        self
    }

    pub fn advise_context_entry<S: Into<String>>(mut self, key: S, value: Value) -> Self {
        self.advise_context.insert(key.into(), value);
        self
    }

    pub fn tool_context(mut self, tool_context: HashMap<String, Value>) -> Self {
        self.tool_context = tool_context;
        self
    }

    pub fn build(self) -> Result<AdvisedRequest> {
        if self.user_text.is_empty() {
            return Err(CounselError::InvalidRequest(
                "user_text cannot be empty".to_string(),
            ));
        }
        Ok(AdvisedRequest {
            user_text: self.user_text,
            system_text: self.system_text,
            options: self.options,
            media: self.media,
            messages: self.messages,
            tools: self.tools,
            user_params: self.user_params,
            system_params: self.system_params,
            advisor_params: self.advisor_params,
            advise_context: self.advise_context,
            tool_context: self.tool_context,
        })
    }
}

/// The model's response paired with the advise-context, letting after-phase
/// advisors read state produced during request-phase processing.
#[derive(Debug, Clone)]
pub struct AdvisedResponse {
    pub response: ChatResponse,
    pub advise_context: HashMap<String, Value>,
}

impl AdvisedResponse {
    pub fn new(response: ChatResponse, advise_context: HashMap<String, Value>) -> Self {
        Self {
            response,
            advise_context,
        }
    }

    pub fn message(&self) -> &Message {
        &self.response.message
    }
}
