//! Retrieval-augmented chat over a single document.
//!
//! A [`RagSession`] lives as long as one chat connection. Each question is
//! answered by retrieving the closest chunks of the document, rendering them
//! with the recent conversation into a prompt, and asking the chat model. If
//! that call fails, one direct call without history is attempted before
//! giving up.

mod memory;
mod prompt;

use std::sync::Arc;

pub use memory::ConversationMemory;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    llm::{ChatModel, EmbeddingProvider, LlmError, PromptMessage},
    services::ingestion::vector_search,
    vector_store::VectorStore,
};

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Both chat and fallback calls failed: {chain}; {fallback}")]
    Generation { chain: LlmError, fallback: LlmError },
}

/// Shared model and index handles, cloned into every session.
#[derive(Clone)]
pub struct RagComponents {
    pub chat: Arc<dyn ChatModel>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub vector_store: Arc<dyn VectorStore>,
    pub top_k: usize,
    pub memory_window: usize,
}

pub struct RagSession {
    s3_key: String,
    user_email: String,
    components: RagComponents,
    memory: ConversationMemory,
}

impl RagSession {
    pub fn new(
        s3_key: impl Into<String>,
        user_email: impl Into<String>,
        components: RagComponents,
    ) -> Self {
        Self {
            s3_key: s3_key.into(),
            user_email: user_email.into(),
            memory: ConversationMemory::new(components.memory_window),
            components,
        }
    }

    pub fn s3_key(&self) -> &str {
        &self.s3_key
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Answer `query` from the document. Makes at most two model calls.
    #[instrument(skip(self, query), fields(s3_key = %self.s3_key))]
    pub async fn query_document(&mut self, query: &str) -> Result<String, RagError> {
        let context = match vector_search(
            self.components.embedder.as_ref(),
            self.components.vector_store.as_ref(),
            query,
            &self.user_email,
            &self.s3_key,
            self.components.top_k,
        )
        .await
        {
            Ok(chunks) => {
                debug!(chunks = chunks.len(), "Retrieved context");
                chunks.join("\n\n")
            }
            Err(e) => {
                warn!(error = %e, "Vector search failed, answering without context");
                String::new()
            }
        };

        let prompt = prompt::render_prompt(&context, &self.memory.render(), query);
        let answer = match self
            .components
            .chat
            .complete(&[PromptMessage::user(prompt)])
            .await
        {
            Ok(answer) => answer,
            Err(chain) => {
                warn!(error = %chain, "Chat call failed, trying fallback");
                self.components
                    .chat
                    .complete(&prompt::fallback_messages(&context, query))
                    .await
                    .map_err(|fallback| RagError::Generation { chain, fallback })?
            }
        };

        self.memory.push(query, answer.clone());
        Ok(answer)
    }

    pub fn reset_memory(&mut self) {
        self.memory.clear();
    }
}
