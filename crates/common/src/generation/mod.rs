//! Response generation
//!
//! Turns one user message into one reply: optional retrieval over the
//! tenant's document index, optional replay of recent exchanges, then a
//! single language model call. Failures never escape; they become a
//! degraded reply that starts with [`ERROR_MARKER`].

use crate::config::{GenerationConfig, LlmConfig, TenantConfig};
use crate::db::ConversationStore;
use crate::embeddings::Embedder;
use crate::index::IndexCache;
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel, LlmError};
use crate::metrics::record_generation_error;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Prefix of every degraded reply
pub const ERROR_MARKER: &str = "❌";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("❌ The language model provider rejected the credentials for this service.")]
    Authentication,

    #[error("❌ The language model provider returned an error: {message}")]
    Provider { message: String },

    #[error("❌ The document index is unavailable: {message}")]
    IndexUnavailable { message: String },

    #[error("❌ The embedding service failed: {message}")]
    Embedding { message: String },
}

impl GenerationError {
    /// Stable identifier reported to clients and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Authentication => "authentication",
            GenerationError::Provider { .. } => "provider",
            GenerationError::IndexUnavailable { .. } => "index_unavailable",
            GenerationError::Embedding { .. } => "embedding",
        }
    }
}

impl From<LlmError> for GenerationError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Authentication { .. } => GenerationError::Authentication,
            other => GenerationError::Provider { message: other.to_string() },
        }
    }
}

/// Outcome of one generation. `text` is always displayable.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub error: Option<GenerationError>,
}

impl Reply {
    fn completed(text: String) -> Self {
        Self { text, error: None }
    }

    fn degraded(error: GenerationError) -> Self {
        Self { text: error.to_string(), error: Some(error) }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_kind(&self) -> Option<&'static str> {
        self.error.as_ref().map(GenerationError::kind)
    }
}

pub struct ResponseGenerator {
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    store: ConversationStore,
    indexes: IndexCache,
    config: GenerationConfig,
    max_tokens: u32,
    temperature: f32,
}

impl ResponseGenerator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        store: ConversationStore,
        config: GenerationConfig,
        llm_config: &LlmConfig,
    ) -> Self {
        Self {
            llm,
            embedder,
            store,
            indexes: IndexCache::new(),
            config,
            max_tokens: llm_config.max_tokens,
            temperature: llm_config.temperature,
        }
    }

    /// Generate a reply for `message`. Never fails; see [`Reply`].
    pub async fn generate(&self, tenant: &TenantConfig, message: &str) -> Reply {
        match self.try_generate(tenant, message).await {
            Ok(text) => Reply::completed(text),
            Err(err) => {
                warn!(tenant_id = %tenant.tenant_id, kind = err.kind(), error = %err, "Generation degraded");
                record_generation_error(&tenant.tenant_id, err.kind());
                Reply::degraded(err)
            }
        }
    }

    async fn try_generate(
        &self,
        tenant: &TenantConfig,
        message: &str,
    ) -> Result<String, GenerationError> {
        let context = if tenant.capabilities.uses_retrieval {
            self.retrieve(tenant, message).await?
        } else {
            Vec::new()
        };

        let transcript = if tenant.capabilities.uses_history {
            self.transcript(tenant).await
        } else {
            Vec::new()
        };

        debug!(
            tenant_id = %tenant.tenant_id,
            context_chunks = context.len(),
            history_turns = transcript.len(),
            "Prompt assembled"
        );

        let request = CompletionRequest {
            model: tenant.model_name.clone(),
            api_key: tenant.model_api_key.clone(),
            messages: vec![
                ChatMessage::system(self.config.system_prompt.clone()),
                ChatMessage::user(user_prompt(&context, &transcript, message)),
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        Ok(self.llm.complete(request).await?)
    }

    /// Texts of the best matching chunks; empty when no index was built
    async fn retrieve(
        &self,
        tenant: &TenantConfig,
        message: &str,
    ) -> Result<Vec<String>, GenerationError> {
        let index = match self.indexes.get(&tenant.index_dir()).await {
            Ok(Some(index)) => index,
            Ok(None) => {
                info!(tenant_id = %tenant.tenant_id, "No document index built, skipping retrieval");
                return Ok(Vec::new());
            }
            Err(e) => return Err(GenerationError::IndexUnavailable { message: e.to_string() }),
        };

        if index.embedding_model != self.embedder.model_name()
            || index.dimension != self.embedder.dimension()
        {
            return Err(GenerationError::IndexUnavailable {
                message: format!(
                    "index was built with {} ({} dims), current embedder is {} ({} dims)",
                    index.embedding_model,
                    index.dimension,
                    self.embedder.model_name(),
                    self.embedder.dimension()
                ),
            });
        }

        let query = self
            .embedder
            .embed(message)
            .await
            .map_err(|e| GenerationError::Embedding { message: e.to_string() })?;

        Ok(index
            .search(&query, self.config.retrieval_top_k)
            .into_iter()
            .map(|hit| hit.chunk.text.clone())
            .collect())
    }

    /// Recent exchanges, oldest first, without earlier degraded replies
    async fn transcript(&self, tenant: &TenantConfig) -> Vec<String> {
        let limit = i64::try_from(self.config.history_turns).unwrap_or(i64::MAX);

        match self.store.recent(tenant, limit).await {
            Ok(records) => records
                .into_iter()
                .rev()
                .filter(|r| !r.bot_response.starts_with(ERROR_MARKER))
                .map(|r| format!("User: {}\nAssistant: {}", r.user_message, r.bot_response))
                .collect(),
            Err(e) => {
                warn!(tenant_id = %tenant.tenant_id, error = %e, "History unavailable, continuing without it");
                Vec::new()
            }
        }
    }
}

fn user_prompt(context: &[String], transcript: &[String], message: &str) -> String {
    if context.is_empty() && transcript.is_empty() {
        return message.to_string();
    }

    let mut sections = Vec::with_capacity(3);
    if !context.is_empty() {
        sections.push(format!("Reference material:\n{}", context.join("\n\n---\n\n")));
    }
    if !transcript.is_empty() {
        sections.push(format!("Conversation so far:\n{}", transcript.join("\n\n")));
    }
    sections.push(format!("User message:\n{}", message));
    sections.join("\n\n")
}
