use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::advisor::envelope::{AdvisedRequest, AdvisedResponse};
use crate::errors::Result;

/// A finite stream of advised response fragments.
pub type ResponseStream = BoxStream<'static, Result<AdvisedResponse>>;

/// A precedence-ordered participant in the chain. Lower `order` runs earlier
/// in the before phase; the corresponding after phase runs in reverse order,
/// matching middleware nesting.
///
/// Each operation receives the current envelope and the rest of the chain,
/// and must invoke the chain to proceed. An advisor may short-circuit (for
/// caching or guardrails) by returning without calling it.
#[async_trait]
pub trait Advisor: Send + Sync {
    fn name(&self) -> &str;

    fn order(&self) -> i32 {
        0
    }

    /// Around a whole-response call.
    async fn around_call(&self, request: AdvisedRequest, chain: CallChain) -> Result<AdvisedResponse>;

    /// Around a streamed call. Request transformation must happen before
    /// awaiting `chain.next_stream`, so it completes before the first
    /// fragment is pulled.
    async fn around_stream(&self, request: AdvisedRequest, chain: StreamChain) -> Result<ResponseStream>;
}

/// The last link of a blocking chain: performs the model invocation.
#[async_trait]
pub trait CallTerminal: Send + Sync {
    async fn call(&self, request: AdvisedRequest) -> Result<AdvisedResponse>;
}

/// The last link of a streaming chain.
#[async_trait]
pub trait StreamTerminal: Send + Sync {
    async fn stream(&self, request: AdvisedRequest) -> Result<ResponseStream>;
}

/// An ordered set of advisors. Sorting happens once at construction and is
/// stable, so advisors sharing an order keep their registration order.
#[derive(Clone)]
pub struct AdvisorChain {
    advisors: Arc<[Arc<dyn Advisor>]>,
}

impl AdvisorChain {
    pub fn new(mut advisors: Vec<Arc<dyn Advisor>>) -> Self {
        advisors.sort_by_key(|advisor| advisor.order());
        Self {
            advisors: advisors.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.advisors.is_empty()
    }

    /// Compose a fresh blocking chain around `terminal` for one request.
    pub fn call_chain(&self, terminal: Arc<dyn CallTerminal>) -> CallChain {
        CallChain {
            advisors: self.advisors.clone(),
            position: 0,
            terminal,
        }
    }

    /// Compose a fresh streaming chain around `terminal` for one request.
    pub fn stream_chain(&self, terminal: Arc<dyn StreamTerminal>) -> StreamChain {
        StreamChain {
            advisors: self.advisors.clone(),
            position: 0,
            terminal,
        }
    }
}

/// An immutable cursor into the remaining blocking chain. Advancing never
/// mutates shared state; each request gets its own freshly-composed chain.
#[derive(Clone)]
pub struct CallChain {
    advisors: Arc<[Arc<dyn Advisor>]>,
    position: usize,
    terminal: Arc<dyn CallTerminal>,
}

impl CallChain {
    /// Run the rest of the chain: the next advisor if any, else the terminal
    /// model call.
    pub async fn next_call(self, request: AdvisedRequest) -> Result<AdvisedResponse> {
        match self.advisors.get(self.position).cloned() {
            Some(advisor) => {
                tracing::debug!(advisor = advisor.name(), "entering advisor (call)");
                let rest = CallChain {
                    advisors: self.advisors,
                    position: self.position + 1,
                    terminal: self.terminal,
                };
                advisor.around_call(request, rest).await
            }
            None => self.terminal.call(request).await,
        }
    }
}

/// An immutable cursor into the remaining streaming chain. `next_stream`
/// completes all remaining before phases before the returned stream yields
/// its first fragment.
#[derive(Clone)]
pub struct StreamChain {
    advisors: Arc<[Arc<dyn Advisor>]>,
    position: usize,
    terminal: Arc<dyn StreamTerminal>,
}

impl StreamChain {
    pub async fn next_stream(self, request: AdvisedRequest) -> Result<ResponseStream> {
        match self.advisors.get(self.position).cloned() {
            Some(advisor) => {
                tracing::debug!(advisor = advisor.name(), "entering advisor (stream)");
                let rest = StreamChain {
                    advisors: self.advisors,
                    position: self.position + 1,
                    terminal: self.terminal,
                };
                advisor.around_stream(request, rest).await
            }
            None => self.terminal.stream(request).await,
        }
    }
}
