use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::message::Message;
use crate::prompt::Prompt;
use crate::providers::base::{ChatModel, ChatResponse, ChatResponseStream, Usage};

/// A mock model that returns pre-configured responses for testing. It records
/// how many calls were made and every prompt it saw, so tests can assert on
/// loop rounds, history growth, and the synthesized tool-result messages.
pub struct MockModel {
    responses: Mutex<Vec<Message>>,
    fragments: Mutex<Vec<Vec<Message>>>,
    calls: AtomicUsize,
    seen_prompts: Mutex<Vec<Prompt>>,
}

impl MockModel {
    /// Create a new mock model with a sequence of whole responses
    pub fn new(responses: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            fragments: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            seen_prompts: Mutex::new(Vec::new()),
        })
    }

    /// Create a mock model whose `stream` yields the given fragment batches,
    /// one batch per call
    pub fn with_fragments(fragments: Vec<Vec<Message>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(Vec::new()),
            fragments: Mutex::new(fragments),
            calls: AtomicUsize::new(0),
            seen_prompts: Mutex::new(Vec::new()),
        })
    }

    /// How many times `invoke` or `stream` was called
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt observed, in call order
    pub fn seen_prompts(&self) -> Vec<Prompt> {
        self.seen_prompts.lock().unwrap().clone()
    }

    /// The prompt message counts observed across calls, in call order
    pub fn seen_message_counts(&self) -> Vec<usize> {
        self.seen_prompts
            .lock()
            .unwrap()
            .iter()
            .map(|prompt| prompt.messages.len())
            .collect()
    }

    fn record(&self, prompt: &Prompt) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_prompts.lock().unwrap().push(prompt.clone());
    }
}

#[async_trait]
impl ChatModel for MockModel {
    async fn invoke(&self, prompt: &Prompt) -> Result<ChatResponse> {
        self.record(prompt);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            Ok(ChatResponse::new(Message::assistant().with_text("")))
        } else {
            Ok(ChatResponse::new(responses.remove(0)).with_usage(Usage::new(
                Some(1),
                Some(1),
                Some(2),
            )))
        }
    }

    async fn stream(&self, prompt: &Prompt) -> Result<ChatResponseStream> {
        self.record(prompt);
        let mut fragments = self.fragments.lock().unwrap();
        let batch = if fragments.is_empty() {
            vec![Message::assistant().with_text("")]
        } else {
            fragments.remove(0)
        };
        let items: Vec<Result<ChatResponse>> =
            batch.into_iter().map(|m| Ok(ChatResponse::new(m))).collect();
        Ok(Box::pin(tokio_stream::iter(items)))
    }
}

/// A model that always fails, for chain abort tests
pub struct FailingModel;

#[async_trait]
impl ChatModel for FailingModel {
    async fn invoke(&self, _prompt: &Prompt) -> Result<ChatResponse> {
        Err(anyhow::anyhow!("provider unavailable"))
    }
}
