//! Long-term conversation memory backed by a vector similarity store,
//! implemented as an advisor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use indoc::indoc;
use serde_json::{json, Value};

use crate::advisor::chain::{Advisor, CallChain, ResponseStream, StreamChain};
use crate::advisor::envelope::{AdvisedRequest, AdvisedResponse};
use crate::errors::{CounselError, Result};
use crate::store::{Document, SearchRequest, VectorStore};
use crate::stream::aggregate_with;

/// Advise-context key selecting the active conversation.
pub const CHAT_MEMORY_CONVERSATION_ID_KEY: &str = "chat_memory_conversation_id";
/// Advise-context key overriding how many stored turns are retrieved.
pub const CHAT_MEMORY_RETRIEVE_SIZE_KEY: &str = "chat_memory_retrieve_size";

const DOCUMENT_METADATA_CONVERSATION_ID: &str = "conversation_id";
const DOCUMENT_METADATA_MESSAGE_TYPE: &str = "message_type";

pub const DEFAULT_CONVERSATION_ID: &str = "default";
pub const DEFAULT_RETRIEVE_SIZE: usize = 100;
pub const DEFAULT_ORDER: i32 = 1000;

const DEFAULT_SYSTEM_TEXT_ADVISE: &str = indoc! {"

    Use the long term conversation memory from the LONG_TERM_MEMORY section to provide accurate answers.

    ---------------------
    LONG_TERM_MEMORY:
    {{ long_term_memory }}
    ---------------------
"};

/// Retrieves stored turns similar to the user's text (scoped to the active
/// conversation), injects them into the system prompt, and persists both
/// sides of the exchange. Persistence failures abort the turn.
pub struct VectorStoreChatMemoryAdvisor {
    store: Arc<dyn VectorStore>,
    default_conversation_id: String,
    retrieve_size: usize,
    system_text_advise: String,
    order: i32,
}

impl VectorStoreChatMemoryAdvisor {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            default_conversation_id: DEFAULT_CONVERSATION_ID.to_string(),
            retrieve_size: DEFAULT_RETRIEVE_SIZE,
            system_text_advise: DEFAULT_SYSTEM_TEXT_ADVISE.to_string(),
            order: DEFAULT_ORDER,
        }
    }

    pub fn with_conversation_id<S: Into<String>>(mut self, conversation_id: S) -> Self {
        self.default_conversation_id = conversation_id.into();
        self
    }

    pub fn with_retrieve_size(mut self, retrieve_size: usize) -> Self {
        self.retrieve_size = retrieve_size;
        self
    }

    pub fn with_system_text_advise<S: Into<String>>(mut self, system_text_advise: S) -> Self {
        self.system_text_advise = system_text_advise.into();
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    fn conversation_id(&self, advise_context: &HashMap<String, Value>) -> String {
        advise_context
            .get(CHAT_MEMORY_CONVERSATION_ID_KEY)
            .and_then(Value::as_str)
            .unwrap_or(&self.default_conversation_id)
            .to_string()
    }

    fn retrieve_size(&self, advise_context: &HashMap<String, Value>) -> usize {
        advise_context
            .get(CHAT_MEMORY_RETRIEVE_SIZE_KEY)
            .and_then(Value::as_u64)
            .map(|size| size as usize)
            .unwrap_or(self.retrieve_size)
    }

    fn turn_document(text: &str, conversation_id: &str, message_type: &str) -> Document {
        Document::new(
            text,
            HashMap::from([
                (
                    DOCUMENT_METADATA_CONVERSATION_ID.to_string(),
                    json!(conversation_id),
                ),
                (
                    DOCUMENT_METADATA_MESSAGE_TYPE.to_string(),
                    json!(message_type),
                ),
            ]),
        )
    }

    fn store_error(source: anyhow::Error) -> CounselError {
        CounselError::Memory(source)
    }

    /// Fetch similar turns, fold them into the system prompt, and persist
    /// the current user message.
    async fn before(&self, request: AdvisedRequest) -> Result<AdvisedRequest> {
        let conversation_id = self.conversation_id(&request.advise_context);

        let search = SearchRequest::query(&request.user_text)
            .with_top_k(self.retrieve_size(&request.advise_context))
            .with_filter(DOCUMENT_METADATA_CONVERSATION_ID, json!(conversation_id));
        let documents = self
            .store
            .similarity_search(&search)
            .await
            .map_err(Self::store_error)?;

        let long_term_memory = documents
            .iter()
            .map(|doc| doc.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        tracing::debug!(
            conversation_id = %conversation_id,
            retrieved = documents.len(),
            "injecting long-term memory"
        );

        let advised_system_text = format!(
            "{}\n{}",
            request.system_text.clone().unwrap_or_default(),
            self.system_text_advise
        );
        let mut system_params = request.system_params.clone();
        system_params.insert("long_term_memory".to_string(), json!(long_term_memory));

        let advised = AdvisedRequest::from_prev(&request)
            .system_text(advised_system_text)
            .system_params(system_params)
            .build()?;

        self.store
            .write(vec![Self::turn_document(
                &request.user_text,
                &conversation_id,
                "user",
            )])
            .await
            .map_err(Self::store_error)?;

        Ok(advised)
    }

    /// Persist the assistant's final message.
    async fn observe_after(&self, response: &AdvisedResponse) -> Result<()> {
        let conversation_id = self.conversation_id(&response.advise_context);
        let text = response.message().text();
        if text.is_empty() {
            return Ok(());
        }
        self.store
            .write(vec![Self::turn_document(&text, &conversation_id, "assistant")])
            .await
            .map_err(Self::store_error)
    }
}

#[async_trait]
impl Advisor for VectorStoreChatMemoryAdvisor {
    fn name(&self) -> &str {
        "vector_store_chat_memory"
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn around_call(
        &self,
        request: AdvisedRequest,
        chain: CallChain,
    ) -> Result<AdvisedResponse> {
        let request = self.before(request).await?;
        let response = chain.next_call(request).await?;
        self.observe_after(&response).await?;
        Ok(response)
    }

    async fn around_stream(
        &self,
        request: AdvisedRequest,
        chain: StreamChain,
    ) -> Result<ResponseStream> {
        // Retrieval and the user-turn write happen here, in the main control
        // flow, before the first fragment is produced.
        let request = self.before(request).await?;
        let stream = chain.next_stream(request).await?;

        // The assistant turn is persisted only once the fragments have
        // aggregated into the full message.
        let store = self.store.clone();
        let default_conversation_id = self.default_conversation_id.clone();
        Ok(aggregate_with(stream, move |response| async move {
            let conversation_id = response
                .advise_context
                .get(CHAT_MEMORY_CONVERSATION_ID_KEY)
                .and_then(Value::as_str)
                .unwrap_or(&default_conversation_id)
                .to_string();
            let text = response.message().text();
            if text.is_empty() {
                return Ok(());
            }
            store
                .write(vec![Self::turn_document(&text, &conversation_id, "assistant")])
                .await
                .map_err(Self::store_error)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::chain::{AdvisorChain, CallTerminal, StreamTerminal};
    use crate::models::message::Message;
    use crate::providers::base::ChatResponse;
    use crate::store::InMemoryVectorStore;
    use futures::StreamExt;

    struct EchoTerminal;

    #[async_trait]
    impl CallTerminal for EchoTerminal {
        async fn call(&self, request: AdvisedRequest) -> Result<AdvisedResponse> {
            // Surface the rendered system text so tests can assert injection
            let prompt = request.to_prompt()?;
            let system_text = prompt
                .messages
                .iter()
                .find(|m| m.role == crate::models::role::Role::System)
                .map(Message::text)
                .unwrap_or_default();
            Ok(AdvisedResponse::new(
                ChatResponse::new(
                    Message::assistant()
                        .with_text("the answer")
                        .with_metadata("system_text", json!(system_text)),
                ),
                request.advise_context,
            ))
        }
    }

    struct FailingStore;

    #[async_trait]
    impl VectorStore for FailingStore {
        async fn similarity_search(
            &self,
            _request: &SearchRequest,
        ) -> anyhow::Result<Vec<Document>> {
            Err(anyhow::anyhow!("store offline"))
        }

        async fn write(&self, _documents: Vec<Document>) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("store offline"))
        }
    }

    struct FragmentTerminal;

    #[async_trait]
    impl StreamTerminal for FragmentTerminal {
        async fn stream(&self, request: AdvisedRequest) -> Result<ResponseStream> {
            let context = request.advise_context;
            let fragments = vec![
                Ok(AdvisedResponse::new(
                    ChatResponse::new(Message::assistant().with_text("Hel")),
                    context.clone(),
                )),
                Ok(AdvisedResponse::new(
                    ChatResponse::new(Message::assistant().with_text("lo")),
                    context,
                )),
            ];
            Ok(Box::pin(futures::stream::iter(fragments)))
        }
    }

    fn conversation_request(override_retrieve_size: bool) -> AdvisedRequest {
        let mut builder = AdvisedRequest::builder()
            .user_text("what was the weather?")
            .system_text("You are concise.")
            .advise_context_entry(CHAT_MEMORY_CONVERSATION_ID_KEY, json!("c1"));
        if override_retrieve_size {
            builder = builder.advise_context_entry(CHAT_MEMORY_RETRIEVE_SIZE_KEY, json!(5));
        }
        builder.build().unwrap()
    }

    async fn seeded_store() -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .write(vec![
                Document::new(
                    "the weather was sunny yesterday",
                    HashMap::from([
                        (DOCUMENT_METADATA_CONVERSATION_ID.to_string(), json!("c1")),
                        (DOCUMENT_METADATA_MESSAGE_TYPE.to_string(), json!("assistant")),
                    ]),
                ),
                Document::new(
                    "unrelated conversation turn",
                    HashMap::from([
                        (DOCUMENT_METADATA_CONVERSATION_ID.to_string(), json!("c2")),
                        (DOCUMENT_METADATA_MESSAGE_TYPE.to_string(), json!("assistant")),
                    ]),
                ),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_before_injects_memory_and_persists_user_turn() {
        let store = seeded_store().await;
        let advisor = VectorStoreChatMemoryAdvisor::new(store.clone());
        let chain = AdvisorChain::new(vec![Arc::new(advisor)]);

        let response = chain
            .call_chain(Arc::new(EchoTerminal))
            .next_call(conversation_request(true))
            .await
            .unwrap();

        // Retrieved memory is scoped to conversation c1 and rendered into
        // the system prompt
        let system_text = response.message().metadata["system_text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(system_text.contains("the weather was sunny yesterday"));
        assert!(!system_text.contains("unrelated conversation turn"));
        assert!(system_text.starts_with("You are concise."));

        // Both sides of the exchange were persisted
        let texts: Vec<String> = store.documents().iter().map(|d| d.text.clone()).collect();
        assert!(texts.contains(&"what was the weather?".to_string()));
        assert!(texts.contains(&"the answer".to_string()));
    }

    #[tokio::test]
    async fn test_persisted_turns_carry_metadata() {
        let store = seeded_store().await;
        let advisor = VectorStoreChatMemoryAdvisor::new(store.clone());
        let chain = AdvisorChain::new(vec![Arc::new(advisor)]);

        chain
            .call_chain(Arc::new(EchoTerminal))
            .next_call(conversation_request(false))
            .await
            .unwrap();

        let user_turn = store
            .documents()
            .into_iter()
            .find(|d| d.text == "what was the weather?")
            .unwrap();
        assert_eq!(user_turn.metadata[DOCUMENT_METADATA_CONVERSATION_ID], json!("c1"));
        assert_eq!(user_turn.metadata[DOCUMENT_METADATA_MESSAGE_TYPE], json!("user"));
    }

    #[tokio::test]
    async fn test_streaming_persists_aggregated_assistant_turn() {
        let store = seeded_store().await;
        let advisor = VectorStoreChatMemoryAdvisor::new(store.clone());
        let chain = AdvisorChain::new(vec![Arc::new(advisor)]);

        let stream = chain
            .stream_chain(Arc::new(FragmentTerminal))
            .next_stream(conversation_request(false))
            .await
            .unwrap();
        let fragments: Vec<_> = stream.collect().await;
        assert_eq!(fragments.len(), 2);

        // The persisted assistant turn is the aggregate, never a fragment
        let texts: Vec<String> = store.documents().iter().map(|d| d.text.clone()).collect();
        assert!(texts.contains(&"Hello".to_string()));
        assert!(!texts.contains(&"Hel".to_string()));
    }

    #[tokio::test]
    async fn test_store_failure_aborts_turn() {
        let advisor = VectorStoreChatMemoryAdvisor::new(Arc::new(FailingStore));
        let chain = AdvisorChain::new(vec![Arc::new(advisor)]);

        let err = chain
            .call_chain(Arc::new(EchoTerminal))
            .next_call(conversation_request(false))
            .await
            .unwrap_err();

        assert!(matches!(err, CounselError::Memory(_)));
    }

    #[tokio::test]
    async fn test_stream_store_failure_aborts_before_first_fragment() {
        let advisor = VectorStoreChatMemoryAdvisor::new(Arc::new(FailingStore));
        let chain = AdvisorChain::new(vec![Arc::new(advisor)]);

        let err = chain
            .stream_chain(Arc::new(FragmentTerminal))
            .next_stream(conversation_request(false))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, CounselError::Memory(_)));
    }

    #[tokio::test]
    async fn test_abandoned_stream_persists_nothing_for_assistant() {
        let store = seeded_store().await;
        let advisor = VectorStoreChatMemoryAdvisor::new(store.clone());
        let chain = AdvisorChain::new(vec![Arc::new(advisor)]);

        let mut stream = chain
            .stream_chain(Arc::new(FragmentTerminal))
            .next_stream(conversation_request(false))
            .await
            .unwrap();
        let _first = stream.next().await.unwrap().unwrap();
        drop(stream);

        let texts: Vec<String> = store.documents().iter().map(|d| d.text.clone()).collect();
        // The user turn was written in the before phase; no assistant turn
        assert!(texts.contains(&"what was the weather?".to_string()));
        assert!(!texts.iter().any(|t| t.contains("Hel")));
    }
}
