//! Retrieval and prompt assembly.
//!
//! [`Retriever::retrieve`] never fails. When grounding is impossible
//! (missing store credentials, embedding failure, store failure) it returns
//! [`Retrieval::Ungrounded`] with the reason, and the chat request proceeds
//! without context. [`build_prompt`] turns the retrieved sources plus the
//! conversation history into the message list sent to the model.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{Config, RetrievalConfig};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::models::{ChatMessage, ConversationTurn, RetrievedSource};
use crate::store::{SupabaseStore, VectorStore};

/// Why a query was answered without context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UngroundedReason {
    StoreNotConfigured,
    EmbeddingUnavailable,
    EmbeddingFailed,
    StoreFailed,
}

/// Result of a retrieval attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// The store was searched. `sources` may still be empty.
    Grounded {
        context: String,
        sources: Vec<RetrievedSource>,
    },
    Ungrounded(UngroundedReason),
}

impl Retrieval {
    pub fn context(&self) -> &str {
        match self {
            Retrieval::Grounded { context, .. } => context,
            Retrieval::Ungrounded(_) => "",
        }
    }

    pub fn sources(&self) -> &[RetrievedSource] {
        match self {
            Retrieval::Grounded { sources, .. } => sources,
            Retrieval::Ungrounded(_) => &[],
        }
    }

    pub fn is_grounded(&self) -> bool {
        matches!(self, Retrieval::Grounded { .. })
    }
}

pub struct Retriever {
    config: RetrievalConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<dyn VectorStore>>,
}

impl Retriever {
    pub fn new(
        config: RetrievalConfig,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        store: Option<Arc<dyn VectorStore>>,
    ) -> Self {
        Self {
            config,
            embedder,
            store,
        }
    }

    /// Build the production retriever. Collaborators that cannot be created
    /// are left out and retrieval degrades instead of failing startup.
    pub fn from_config(config: &Config) -> Self {
        let store: Option<Arc<dyn VectorStore>> = if !config.store.is_configured() {
            warn!("retrieval disabled: SUPABASE_URL or SUPABASE_SERVICE_ROLE not set");
            None
        } else {
            match SupabaseStore::new(&config.store) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    warn!(error = %e, "retrieval disabled: vector store unavailable");
                    None
                }
            }
        };

        let embedder = if config.embedding.missing_credential() {
            warn!("retrieval disabled: OPENAI_API_KEY not set");
            None
        } else {
            match create_provider(&config.embedding) {
                Ok(provider) => Some(provider),
                Err(e) => {
                    warn!(error = %e, "retrieval disabled: embedding provider unavailable");
                    None
                }
            }
        };

        Self::new(config.retrieval.clone(), embedder, store)
    }

    pub fn answer_language(&self) -> &str {
        &self.config.answer_language
    }

    /// Embed `query` and fetch the nearest stored chunks.
    pub async fn retrieve(&self, query: &str) -> Retrieval {
        let Some(store) = &self.store else {
            return Retrieval::Ungrounded(UngroundedReason::StoreNotConfigured);
        };
        let Some(embedder) = &self.embedder else {
            return Retrieval::Ungrounded(UngroundedReason::EmbeddingUnavailable);
        };

        let vector = match embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed, answering without context");
                return Retrieval::Ungrounded(UngroundedReason::EmbeddingFailed);
            }
        };

        match store
            .match_documents(&vector, self.config.match_threshold, self.config.match_count)
            .await
        {
            Ok(sources) => {
                debug!(matches = sources.len(), "retrieved sources");
                Retrieval::Grounded {
                    context: format_context(&sources),
                    sources,
                }
            }
            Err(e) => {
                warn!(error = %e, "vector search failed, answering without context");
                Retrieval::Ungrounded(UngroundedReason::StoreFailed)
            }
        }
    }
}

/// One `- {content}` line per source.
pub fn format_context(sources: &[RetrievedSource]) -> String {
    sources
        .iter()
        .map(|s| format!("- {}", s.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn system_instruction(language: &str) -> String {
    format!(
        "You are a helpful and concise assistant. \
         Use ONLY the context below to answer. \
         If the information is not present, say that you do not know. \
         Answer in {}.",
        language
    )
}

/// System instruction, then the context-bearing question, then `history`
/// verbatim and in order.
pub fn build_prompt(
    query: &str,
    sources: &[RetrievedSource],
    history: &[ConversationTurn],
    language: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2 + history.len());
    messages.push(ChatMessage::system(system_instruction(language)));
    messages.push(ChatMessage::user(format!(
        "Context:\n{}\n\nQuestion: {}",
        format_context(sources),
        query
    )));
    messages.extend(history.iter().map(ChatMessage::from));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::error::{ProviderError, StoreError};
    use crate::models::{NewRecord, Role, TurnRole};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Err(ProviderError::EmptyResponse("broken"))
        }
    }

    struct MissingRpc;

    #[async_trait]
    impl VectorStore for MissingRpc {
        async fn match_documents(
            &self,
            _query: &[f32],
            _threshold: f64,
            _count: usize,
        ) -> Result<Vec<RetrievedSource>, StoreError> {
            Err(StoreError::Status {
                status: 404,
                body: "function match_documents does not exist".into(),
            })
        }
        async fn insert(&self, _record: &NewRecord) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn source(content: &str) -> RetrievedSource {
        RetrievedSource {
            id: 1,
            document_id: None,
            content: content.into(),
            similarity: None,
        }
    }

    #[tokio::test]
    async fn no_store_is_ungrounded() {
        let retriever = Retriever::new(
            RetrievalConfig::default(),
            Some(Arc::new(FixedEmbedder(vec![1.0]))),
            None,
        );
        let result = retriever.retrieve("anything").await;
        assert_eq!(
            result,
            Retrieval::Ungrounded(UngroundedReason::StoreNotConfigured)
        );
        assert_eq!(result.context(), "");
        assert!(result.sources().is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_degrades() {
        let retriever = Retriever::new(
            RetrievalConfig::default(),
            Some(Arc::new(BrokenEmbedder)),
            Some(Arc::new(MemoryStore::new())),
        );
        assert_eq!(
            retriever.retrieve("q").await,
            Retrieval::Ungrounded(UngroundedReason::EmbeddingFailed)
        );
    }

    #[tokio::test]
    async fn store_failure_degrades() {
        let retriever = Retriever::new(
            RetrievalConfig::default(),
            Some(Arc::new(FixedEmbedder(vec![1.0]))),
            Some(Arc::new(MissingRpc)),
        );
        assert_eq!(
            retriever.retrieve("q").await,
            Retrieval::Ungrounded(UngroundedReason::StoreFailed)
        );
    }

    #[tokio::test]
    async fn empty_store_is_grounded_with_no_sources() {
        let retriever = Retriever::new(
            RetrievalConfig::default(),
            Some(Arc::new(FixedEmbedder(vec![1.0, 0.0]))),
            Some(Arc::new(MemoryStore::new())),
        );
        let result = retriever.retrieve("q").await;
        assert!(result.is_grounded());
        assert!(result.sources().is_empty());
    }

    #[tokio::test]
    async fn grounded_context_lists_matches() {
        let store = MemoryStore::new();
        for (content, v) in [("X is Y", vec![1.0, 0.0]), ("unrelated", vec![0.0, 1.0])] {
            store
                .insert(&NewRecord {
                    title: "t".into(),
                    content: content.into(),
                    embedding: v,
                    source: "p".into(),
                })
                .await
                .unwrap();
        }
        let retriever = Retriever::new(
            RetrievalConfig::default(),
            Some(Arc::new(FixedEmbedder(vec![1.0, 0.0]))),
            Some(Arc::new(store)),
        );
        let result = retriever.retrieve("What is X?").await;
        assert_eq!(result.context(), "- X is Y");
        assert_eq!(result.sources().len(), 1);
    }

    #[test]
    fn format_context_bullets() {
        let ctx = format_context(&[source("a"), source("b")]);
        assert_eq!(ctx, "- a\n- b");
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn prompt_has_system_then_question() {
        let messages = build_prompt("What is X?", &[source("X is Y")], &[], "French");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("French"));
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("X is Y"));
        assert!(messages[1].content.contains("What is X?"));
    }

    #[test]
    fn prompt_appends_history_in_order() {
        let history = vec![
            ConversationTurn {
                role: TurnRole::User,
                content: "first".into(),
            },
            ConversationTurn {
                role: TurnRole::Assistant,
                content: "second".into(),
            },
            ConversationTurn {
                role: TurnRole::User,
                content: "third".into(),
            },
        ];
        let messages = build_prompt("q", &[], &history, "English");
        assert_eq!(messages.len(), 5);
        let tail: Vec<_> = messages[2..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(tail, vec!["first", "second", "third"]);
        assert_eq!(messages[3].role, Role::Assistant);
    }

    #[tokio::test]
    async fn from_config_without_embedding_key_is_ungrounded() {
        let mut config = Config::default();
        config.store.url = Some("http://127.0.0.1:9".into());
        config.store.key = Some("service-role".into());
        config.embedding.provider = ProviderKind::Openai;
        config.embedding.api_key = None;

        let retriever = Retriever::from_config(&config);
        assert!(retriever.store.is_some());
        assert!(retriever.embedder.is_none());
        assert_eq!(
            retriever.retrieve("bonjour").await,
            Retrieval::Ungrounded(UngroundedReason::EmbeddingUnavailable)
        );
    }

    #[tokio::test]
    async fn from_config_default_has_no_store() {
        let retriever = Retriever::from_config(&Config::default());
        assert!(retriever.store.is_none());
        assert_eq!(
            retriever.retrieve("bonjour").await,
            Retrieval::Ungrounded(UngroundedReason::StoreNotConfigured)
        );
    }
}
