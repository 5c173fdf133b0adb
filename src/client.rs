//! The entry point tying the pieces together: a client owns a model
//! collaborator, a tool registry, and a default advisor chain, and runs one
//! freshly-composed chain per request.

use std::sync::Arc;

use crate::advisor::chain::{Advisor, AdvisorChain, ResponseStream};
use crate::advisor::envelope::{AdvisedRequest, AdvisedResponse};
use crate::agent::{Agent, DEFAULT_MAX_TOOL_ROUNDS};
use crate::errors::Result;
use crate::providers::base::ChatModel;
use crate::tools::ToolRegistry;

pub struct ChatClient {
    chain: AdvisorChain,
    agent: Arc<Agent>,
    registry: Arc<ToolRegistry>,
}

impl ChatClient {
    pub fn builder(model: Arc<dyn ChatModel>) -> ChatClientBuilder {
        ChatClientBuilder {
            model,
            advisors: Vec::new(),
            registry: ToolRegistry::new(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// If the request declares no tools, fill in the client's registered
    /// tool descriptors so the model sees them.
    fn prepare(&self, request: AdvisedRequest) -> AdvisedRequest {
        if request.tools.is_empty() && !self.registry.is_empty() {
            let mut request = request;
            request.tools = self.registry.descriptors();
            request
        } else {
            request
        }
    }

    /// Run a blocking turn through the advisor chain and the tool loop.
    pub async fn call(&self, request: AdvisedRequest) -> Result<AdvisedResponse> {
        let request = self.prepare(request);
        self.chain
            .call_chain(self.agent.clone())
            .next_call(request)
            .await
    }

    /// Run a streaming turn: all before phases complete first, then the
    /// returned stream yields fragments as the model emits them.
    pub async fn stream(&self, request: AdvisedRequest) -> Result<ResponseStream> {
        let request = self.prepare(request);
        self.chain
            .stream_chain(self.agent.clone())
            .next_stream(request)
            .await
    }
}

pub struct ChatClientBuilder {
    model: Arc<dyn ChatModel>,
    advisors: Vec<Arc<dyn Advisor>>,
    registry: ToolRegistry,
    max_tool_rounds: usize,
}

impl ChatClientBuilder {
    /// Append an advisor. Registration order breaks precedence ties.
    pub fn advisor(mut self, advisor: Arc<dyn Advisor>) -> Self {
        self.advisors.push(advisor);
        self
    }

    pub fn tools(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    pub fn build(self) -> ChatClient {
        let registry = Arc::new(self.registry);
        let agent = Arc::new(
            Agent::new(self.model, registry.clone()).with_max_rounds(self.max_tool_rounds),
        );
        ChatClient {
            chain: AdvisorChain::new(self.advisors),
            agent,
            registry,
        }
    }
}
