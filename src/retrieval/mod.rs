//! Knowledge-base lookup that grounds both prompts. Retrieval is best effort:
//! every failure collapses to "no context" and the pipeline carries on.

pub mod embedder;
pub mod pinecone;

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;

use crate::assessment::{AssessmentAnswers, questions};
use crate::telemetry::metrics::{RETRIEVAL_DURATION, RETRIEVAL_EMPTY_COUNT};

pub use embedder::OpenAIEmbedder;
pub use pinecone::PineconeIndex;

pub const DEFAULT_TOP_K: usize = 10;
pub const NO_CONTEXT: &str = "No specific context found for this case.";

#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub text: Option<String>,
}

#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    async fn query(&self, vector: &[f32], top_k: usize) -> anyhow::Result<Vec<VectorMatch>>;
    fn name(&self) -> &str;
}

pub struct ContextRetriever {
    backend: Option<(Arc<dyn Embedder>, Arc<dyn VectorIndex>)>,
}

impl ContextRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            backend: Some((embedder, index)),
        }
    }

    /// A retriever with no backing store; every lookup is empty.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Ranked snippet texts for `query`. Never fails: embedding or index
    /// errors are logged and yield an empty list.
    #[tracing::instrument(
        name = "pipeline_stage retrieve",
        skip(self, query),
        fields(
            pipeline.stage = "retrieve",
            retrieval.query_chars = query.len(),
            retrieval.top_k = top_k,
            retrieval.matches,
            retrieval.snippets,
        )
    )]
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Vec<String> {
        let Some((embedder, index)) = &self.backend else {
            tracing::debug!("Retrieval disabled, continuing without context");
            RETRIEVAL_EMPTY_COUNT.add(1, &[KeyValue::new("reason", "disabled")]);
            return Vec::new();
        };

        let start = Instant::now();
        let result = self.lookup(embedder.as_ref(), index.as_ref(), query, top_k).await;
        RETRIEVAL_DURATION.record(
            start.elapsed().as_secs_f64(),
            &[KeyValue::new("retrieval.index", index.name().to_string())],
        );

        match result {
            Ok(snippets) => {
                if snippets.is_empty() {
                    RETRIEVAL_EMPTY_COUNT.add(1, &[KeyValue::new("reason", "no_matches")]);
                }
                tracing::Span::current().record("retrieval.snippets", snippets.len());
                snippets
            }
            Err(err) => {
                tracing::warn!(
                    index = index.name(),
                    error = %err,
                    "Context retrieval failed, continuing without context"
                );
                RETRIEVAL_EMPTY_COUNT.add(1, &[KeyValue::new("reason", "error")]);
                Vec::new()
            }
        }
    }

    async fn lookup(
        &self,
        embedder: &dyn Embedder,
        index: &dyn VectorIndex,
        query: &str,
        top_k: usize,
    ) -> anyhow::Result<Vec<String>> {
        // the index checks the dimension against its own schema
        let vector = embedder.embed(query).await?;
        if vector.is_empty() {
            anyhow::bail!("embedding service returned an empty vector");
        }

        let matches = index.query(&vector, top_k).await?;
        tracing::Span::current().record("retrieval.matches", matches.len());
        if let Some(best) = matches.first() {
            tracing::debug!(match_id = %best.id, score = best.score, "Closest knowledge base match");
        }

        Ok(matches
            .into_iter()
            .filter_map(|m| m.text)
            .filter(|text| !text.trim().is_empty())
            .collect())
    }
}

/// Retrieval query built from question texts and answers only. Names,
/// addresses and codes never reach the embedding call.
pub fn build_query(answers: &AssessmentAnswers) -> String {
    let joined = answers
        .answers
        .iter()
        .enumerate()
        .map(|(i, answer)| format!("{} {}", questions::question_text(i), answer))
        .collect::<Vec<_>>()
        .join(" ");

    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn format_context(snippets: &[String]) -> String {
    if snippets.is_empty() {
        return NO_CONTEXT.to_string();
    }

    snippets
        .iter()
        .enumerate()
        .map(|(i, text)| format!("CONTEXT ITEM {}:\n{}", i + 1, text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
