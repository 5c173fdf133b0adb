use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::prompt::Prompt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Combine token counts from two responses, treating absent counts as zero
    /// only when the other side has one.
    pub fn merge(&self, other: &Usage) -> Usage {
        fn add(a: Option<i32>, b: Option<i32>) -> Option<i32> {
            match (a, b) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
            }
        }
        Usage {
            input_tokens: add(self.input_tokens, other.input_tokens),
            output_tokens: add(self.output_tokens, other.output_tokens),
            total_tokens: add(self.total_tokens, other.total_tokens),
        }
    }
}

/// One logical model response, or one fragment of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: Message,
    pub usage: Usage,
}

impl ChatResponse {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            usage: Usage::default(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

/// A finite, non-restartable sequence of response fragments. Fragments must
/// be mergeable into one logical response by concatenating their content.
pub type ChatResponseStream = BoxStream<'static, Result<ChatResponse>>;

/// Base trait for model collaborators (OpenAI, Anthropic, etc). The core
/// never sees a wire format; providers adapt to this interface.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Blocking single-shot call producing one whole response.
    async fn invoke(&self, prompt: &Prompt) -> Result<ChatResponse>;

    /// Non-blocking variant producing response fragments as they are
    /// generated. The default falls back to a one-fragment stream.
    async fn stream(&self, prompt: &Prompt) -> Result<ChatResponseStream> {
        let response = self.invoke(prompt).await?;
        Ok(Box::pin(futures::stream::iter(vec![Ok(response)])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct OneShot;

    #[async_trait]
    impl ChatModel for OneShot {
        async fn invoke(&self, _prompt: &Prompt) -> Result<ChatResponse> {
            Ok(ChatResponse::new(Message::assistant().with_text("hi")))
        }
    }

    #[test]
    fn test_default_stream_is_single_fragment() {
        let fragments = tokio_test::block_on(async {
            let stream = OneShot.stream(&Prompt::default()).await.unwrap();
            stream.collect::<Vec<_>>().await
        });
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_ref().unwrap().message.text(), "hi");
    }

    #[test]
    fn test_usage_merge() {
        let first = Usage::new(Some(10), Some(5), Some(15));
        let second = Usage::new(None, Some(7), None);
        let merged = first.merge(&second);
        assert_eq!(merged.input_tokens, Some(10));
        assert_eq!(merged.output_tokens, Some(12));
        assert_eq!(merged.total_tokens, Some(15));
    }

    #[test]
    fn test_usage_merge_absent() {
        let merged = Usage::default().merge(&Usage::default());
        assert_eq!(merged, Usage::default());
    }
}
