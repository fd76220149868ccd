use std::time::Instant;

use opentelemetry::KeyValue;
use serde::Serialize;
use uuid::Uuid;

use crate::assessment::AssessmentAnswers;
use crate::error::AppError;
use crate::llm::{GenerateRequest, GenerationError, LlmClient};
use crate::retrieval::{self, ContextRetriever};
use crate::telemetry::metrics::REPORT_GENERATION_DURATION;

use super::normalize;
use super::prompts::{self, ComposedPrompts};
use super::report::{ClientReport, PractitionerReport};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportsResult {
    pub client_content: ClientReport,
    pub practitioner_content: PractitionerReport,
    pub first_name: String,
}

pub struct ReportSettings<'a> {
    pub model: &'a str,
    pub top_k: usize,
}

#[tracing::instrument(
    name = "pipeline report",
    skip_all,
    fields(
        report.id = %Uuid::new_v4(),
        report.model = %settings.model,
        report.context_items,
        report.duration_ms,
    )
)]
pub async fn generate_reports(
    llm_client: &LlmClient,
    retriever: &ContextRetriever,
    settings: ReportSettings<'_>,
    answers: &AssessmentAnswers,
) -> Result<ReportsResult, AppError> {
    let start = Instant::now();

    // Stage 1: Retrieve grounding context (never fails)
    let snippets = retriever
        .retrieve(&retrieval::build_query(answers), settings.top_k)
        .await;
    let context = retrieval::format_context(&snippets);

    // Stage 2: Compose both prompt pairs
    let prompts = prompts::compose(answers, &context);

    // Stage 3: Both model calls, concurrently
    let (raw_client, raw_practitioner) = generate(llm_client, settings.model, prompts).await?;

    // Stage 4: Parse and repair
    let (client_content, practitioner_content) =
        normalize::validate(&raw_client, &raw_practitioner);

    let duration = start.elapsed();
    REPORT_GENERATION_DURATION.record(
        duration.as_secs_f64(),
        &[KeyValue::new(
            "report.grounded",
            if snippets.is_empty() { "false" } else { "true" },
        )],
    );

    let span = tracing::Span::current();
    span.record("report.context_items", snippets.len());
    span.record("report.duration_ms", duration.as_millis() as u64);

    Ok(ReportsResult {
        client_content,
        practitioner_content,
        first_name: answers.first_name.clone(),
    })
}

/// Fan-out/fan-in over the two generations. Either failure fails both; no
/// report is returned without the other.
#[tracing::instrument(
    name = "pipeline_stage generate",
    skip_all,
    fields(pipeline.stage = "generate", gen_ai.request.model = %model)
)]
async fn generate(
    llm_client: &LlmClient,
    model: &str,
    prompts: ComposedPrompts,
) -> Result<(String, String), GenerationError> {
    let client_req = GenerateRequest::json(
        model,
        prompts.client.system,
        prompts.client.user,
        "client",
    );
    let practitioner_req = GenerateRequest::json(
        model,
        prompts.practitioner.system,
        prompts.practitioner.user,
        "practitioner",
    );

    let (client, practitioner) = tokio::try_join!(
        llm_client.generate(&client_req),
        llm_client.generate(&practitioner_req),
    )?;

    Ok((client.content, practitioner.content))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::assessment::tests::{form_json, registry};
    use crate::assessment::{AssessmentForm, validate};
    use crate::llm::{GenerateResponse, Provider};
    use crate::pipeline::normalize::tests::CLIENT_OUTPUT;
    use crate::retrieval::tests::{FakeIndex, FixedEmbedder, IndexBehavior, snippet};
    use crate::retrieval::{DEFAULT_TOP_K, NO_CONTEXT};

    pub(crate) const PRACTITIONER_OUTPUT: &str = r#"{"practitionerReport": {
        "sections": [{"type": "itemized", "title": "Key Barriers:", "items": ["Fear"]}],
        "milestones": [{"milestone": "Notice", "targetWeek": "Week 1-2", "toolsAndFocus": "Journaling"}],
        "projectedTransformationOutcomes": ["Steadier mood"],
        "closingStatement": "Keep going."
    }}"#;

    /// Answers by stage, so concurrent calls cannot race for a shared script.
    pub(crate) struct StageProvider {
        client: Option<String>,
        practitioner: Option<String>,
        barrier: Option<tokio::sync::Barrier>,
        seen: Mutex<Vec<GenerateRequest>>,
    }

    impl StageProvider {
        pub(crate) fn new(client: Option<&str>, practitioner: Option<&str>) -> Self {
            Self {
                client: client.map(str::to_string),
                practitioner: practitioner.map(str::to_string),
                barrier: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Provider for StageProvider {
        async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            self.seen.lock().unwrap().push(req.clone());
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            let reply = match req.stage.as_str() {
                "client" => self.client.clone(),
                _ => self.practitioner.clone(),
            };
            match reply {
                Some(content) => Ok(GenerateResponse {
                    content,
                    model: req.model.clone(),
                    input_tokens: 100,
                    output_tokens: 200,
                    finish_reason: "stop".into(),
                }),
                None => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    anyhow::bail!("unreachable")
                }
            }
        }

        fn name(&self) -> &str {
            "stage"
        }
    }

    fn answers() -> AssessmentAnswers {
        validate(AssessmentForm::from_json(&form_json()), &registry()).unwrap()
    }

    fn llm(provider: Arc<StageProvider>) -> LlmClient {
        LlmClient::new(provider).with_timing(Duration::from_millis(500), Duration::from_millis(1))
    }

    fn settings() -> ReportSettings<'static> {
        ReportSettings {
            model: "gpt-4o",
            top_k: DEFAULT_TOP_K,
        }
    }

    fn unreachable_store() -> ContextRetriever {
        ContextRetriever::new(
            Arc::new(FixedEmbedder::new(8)),
            Arc::new(FakeIndex(IndexBehavior::Unreachable)),
        )
    }

    #[tokio::test]
    async fn test_unreachable_store_still_generates_with_placeholder_context() {
        let provider = Arc::new(StageProvider::new(Some(CLIENT_OUTPUT), Some(PRACTITIONER_OUTPUT)));
        let result = generate_reports(&llm(provider.clone()), &unreachable_store(), settings(), &answers())
            .await
            .unwrap();

        assert_eq!(result.first_name, "Maya Lin");
        assert_eq!(result.client_content.question_section.len(), 3);
        assert_eq!(result.practitioner_content.milestones.len(), 1);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        for req in seen.iter() {
            assert!(req.system.contains(NO_CONTEXT));
            assert!(req.json_output);
        }
    }

    #[tokio::test]
    async fn test_retrieved_snippets_reach_both_prompts() {
        let retriever = ContextRetriever::new(
            Arc::new(FixedEmbedder::new(8)),
            Arc::new(FakeIndex(IndexBehavior::Matches(vec![snippet(
                "a",
                Some("Habits form through repetition."),
            )]))),
        );
        let provider = Arc::new(StageProvider::new(Some(CLIENT_OUTPUT), Some(PRACTITIONER_OUTPUT)));
        generate_reports(&llm(provider.clone()), &retriever, settings(), &answers())
            .await
            .unwrap();

        for req in provider.seen.lock().unwrap().iter() {
            assert!(req.system.contains("CONTEXT ITEM 1:\nHabits form through repetition."));
        }
    }

    #[tokio::test]
    async fn test_malformed_output_yields_fallback_report() {
        let provider = Arc::new(StageProvider::new(
            Some("I'm sorry, here is your report: none"),
            Some(PRACTITIONER_OUTPUT),
        ));
        let result = generate_reports(&llm(provider), &unreachable_store(), settings(), &answers())
            .await
            .unwrap();

        assert_eq!(result.client_content, ClientReport::fallback());
        assert_eq!(
            result.practitioner_content.closing_statement.as_deref(),
            Some("Keep going.")
        );
    }

    #[tokio::test]
    async fn test_one_stalled_call_fails_the_whole_request() {
        let provider = Arc::new(StageProvider::new(Some(CLIENT_OUTPUT), None));
        let client = LlmClient::new(provider.clone())
            .with_timing(Duration::from_millis(30), Duration::from_millis(1));

        let err = generate_reports(&client, &unreachable_store(), settings(), &answers())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Generation(GenerationError::Timeout { attempts: 2 })));
        assert_eq!(err.status_code(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_generations_run_concurrently() {
        // each call waits for the other; sequential calls would time out
        let provider = Arc::new(StageProvider {
            barrier: Some(tokio::sync::Barrier::new(2)),
            ..StageProvider::new(Some(CLIENT_OUTPUT), Some(PRACTITIONER_OUTPUT))
        });

        let result = generate_reports(&llm(provider.clone()), &unreachable_store(), settings(), &answers()).await;

        assert!(result.is_ok());
        assert_eq!(provider.seen.lock().unwrap().len(), 2);
    }
}
