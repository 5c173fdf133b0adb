//! The tool-calling orchestration loop: send the conversation, execute any
//! tool requests the model issues, resend with the results, and repeat until
//! the model produces a response with no pending tool requests.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use crate::advisor::chain::{CallTerminal, ResponseStream, StreamTerminal};
use crate::advisor::envelope::{AdvisedRequest, AdvisedResponse};
use crate::errors::{CounselError, Result};
use crate::models::message::Message;
use crate::prompt::Prompt;
use crate::providers::base::{ChatModel, ChatResponse};
use crate::tools::ToolRegistry;

/// Default bound on model round-trips within one turn. The loop fails with
/// [`CounselError::ToolLoopExceeded`] rather than recursing forever when a
/// model keeps requesting tools.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// Drives the multi-round tool protocol around a model collaborator. Also
/// acts as the terminal link of the advisor chain.
pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    max_rounds: usize,
}

impl Agent {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            tools,
            max_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Run the loop to a final response.
    ///
    /// Each round the current history is sent to the model. A response with
    /// no tool requests is final. Otherwise the assistant response is
    /// appended verbatim, every tool request is executed in request order,
    /// and a single user message carrying one correlated tool-response block
    /// per request is appended before the next round.
    ///
    /// Any tool failure aborts the turn; results accumulated within the
    /// failing round are discarded.
    pub async fn run(&self, prompt: Prompt) -> Result<ChatResponse> {
        let mut messages = prompt.messages.clone();

        for round in 0..self.max_rounds {
            let round_prompt = Prompt {
                messages: messages.clone(),
                options: prompt.options.clone(),
                tools: prompt.tools.clone(),
                tool_context: prompt.tool_context.clone(),
            };
            let response = self
                .model
                .invoke(&round_prompt)
                .await
                .map_err(CounselError::Model)?;

            let requests: Vec<_> = response
                .message
                .tool_requests()
                .into_iter()
                .cloned()
                .collect();
            if requests.is_empty() {
                return Ok(response);
            }

            tracing::debug!(round, requests = requests.len(), "executing tool requests");
            messages.push(response.message.clone());

            let mut tool_message = Message::user();
            for request in &requests {
                let content = self
                    .tools
                    .dispatch(&request.call, &prompt.tool_context)
                    .await?;
                tool_message = tool_message.with_tool_response(&request.id, content);
            }
            messages.push(tool_message);
        }

        Err(CounselError::ToolLoopExceeded {
            rounds: self.max_rounds,
        })
    }

    pub fn model(&self) -> &Arc<dyn ChatModel> {
        &self.model
    }
}

#[async_trait]
impl CallTerminal for Agent {
    async fn call(&self, request: AdvisedRequest) -> Result<AdvisedResponse> {
        let prompt = request.to_prompt()?;
        let response = self.run(prompt).await?;
        Ok(AdvisedResponse::new(response, request.advise_context))
    }
}

#[async_trait]
impl StreamTerminal for Agent {
    /// Stream the model's fragments directly. Tool execution always runs
    /// against a fully-materialized response, so tool requests surfacing in
    /// a streamed response are delivered to the caller as-is.
    async fn stream(&self, request: AdvisedRequest) -> Result<ResponseStream> {
        let prompt = request.to_prompt()?;
        let advise_context = request.advise_context;
        let inner = self
            .model
            .stream(&prompt)
            .await
            .map_err(CounselError::Model)?;
        Ok(inner
            .map(move |fragment| {
                fragment
                    .map(|response| AdvisedResponse::new(response, advise_context.clone()))
                    .map_err(CounselError::Model)
            })
            .boxed())
    }
}
