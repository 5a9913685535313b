use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::bedrock::BedrockClient;
use crate::citations::{collate_sources, reconcile};
use crate::config::AppConfig;
use crate::models::{ChatAnswer, ChatRequest, GenerationResult};
use crate::render::NO_CITATIONS_NOTICE;

pub const WELCOME_MESSAGE: &str = "Hi! I'm an educational assistant specialized in RAG. \
     Ask me about Retrieval-Augmented Generation, embeddings, vector search, chunking, \
     cosine similarity and RAG architectures. I will cite the workshop material whenever it is available.";

pub const NO_ANSWER_TEXT: &str = "<no answer>";

pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong while processing your question.";

#[derive(Clone)]
pub struct ChatService {
    config: AppConfig,
    client: BedrockClient,
    generation_limit: Arc<Semaphore>,
}

impl ChatService {
    pub fn new(config: AppConfig, client: BedrockClient, generation_limit: Arc<Semaphore>) -> Self {
        Self {
            config,
            client,
            generation_limit,
        }
    }

    pub async fn answer(&self, request: ChatRequest) -> Result<ChatAnswer> {
        let started = Instant::now();
        let question = request.question.trim();
        if question.is_empty() {
            anyhow::bail!("question must not be empty");
        }

        tracing::info!(
            knowledge_base = self.client.knowledge_base_id(),
            question = %crate::render::preview(question, 200),
            "new question"
        );

        let result = {
            let _permit = self.generation_limit.acquire().await?;
            self.client
                .retrieve_and_generate(question, &self.config.generation)
                .await?
        };

        let answer = build_answer(&result, started.elapsed().as_millis());
        if answer.citations.is_empty() {
            tracing::warn!(request_id = %answer.request_id, "no citations found for this answer");
        }
        tracing::info!(
            request_id = %answer.request_id,
            citations = answer.citations.len(),
            sources = answer.sources.len(),
            latency_ms = answer.latency_ms as u64,
            "answer ready"
        );

        Ok(answer)
    }
}

/// Shapes a generation result into the answer sent to the chat client.
pub fn build_answer(result: &GenerationResult, latency_ms: u128) -> ChatAnswer {
    let answer_text = match result.answer_text() {
        "" => NO_ANSWER_TEXT.to_string(),
        text => text.to_string(),
    };

    let citations = reconcile(result);
    let sources = collate_sources(&citations);
    let notice = citations
        .is_empty()
        .then(|| NO_CITATIONS_NOTICE.to_string());

    ChatAnswer {
        request_id: Uuid::new_v4(),
        session_id: result.session_id.clone(),
        answer_text,
        citations,
        sources,
        notice,
        latency_ms,
        answered_at: Utc::now(),
    }
}
