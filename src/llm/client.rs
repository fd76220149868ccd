use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::{
    ATTEMPT_TIMEOUT, GenerateRequest, GenerateResponse, GenerationError, MAX_ATTEMPTS, Provider,
};
use crate::telemetry::metrics::{
    GEN_AI_ERROR_COUNT, GEN_AI_OPERATION_DURATION, GEN_AI_RETRY_COUNT, GEN_AI_TOKEN_USAGE,
};

enum AttemptError {
    Timeout,
    Provider(anyhow::Error),
}

pub struct LlmClient {
    provider: Arc<dyn Provider>,
    attempt_timeout: Duration,
    max_attempts: u32,
    retry_base_delay: Duration,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            attempt_timeout: ATTEMPT_TIMEOUT,
            max_attempts: MAX_ATTEMPTS,
            retry_base_delay: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    pub fn with_timing(mut self, attempt_timeout: Duration, retry_base_delay: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self.retry_base_delay = retry_base_delay;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    async fn generate_once(&self, req: &GenerateRequest) -> Result<GenerateResponse, AttemptError> {
        let provider_name = self.provider.name().to_string();
        let span_display_name = format!("gen_ai.chat {}", req.model);
        let start = Instant::now();

        let span = tracing::info_span!(
            "gen_ai.chat",
            otel.name = %span_display_name,
            gen_ai.operation.name = "chat",
            gen_ai.provider.name = %provider_name,
            gen_ai.request.model = %req.model,
            gen_ai.request.temperature = req.temperature,
            gen_ai.request.top_p = req.top_p,
            gen_ai.request.max_tokens = req.max_tokens as i64,
            gen_ai.output.type = if req.json_output { "json" } else { "text" },
            gen_ai.response.model = tracing::field::Empty,
            gen_ai.usage.input_tokens = tracing::field::Empty,
            gen_ai.usage.output_tokens = tracing::field::Empty,
            gen_ai.response.finish_reasons = tracing::field::Empty,
            report.stage = %req.stage,
            otel.status_code = tracing::field::Empty,
            error.type = tracing::field::Empty,
        );

        span.add_event(
            "gen_ai.user.message",
            vec![
                KeyValue::new("gen_ai.prompt.length", req.prompt.len() as i64),
                KeyValue::new("gen_ai.system_instructions", truncate(&req.system, 500)),
            ],
        );

        let call = self.provider.generate(req).instrument(span.clone());
        let result = match tokio::time::timeout(self.attempt_timeout, call).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(err)) => Err(AttemptError::Provider(err)),
            Err(_) => Err(AttemptError::Timeout),
        };

        let duration = start.elapsed().as_secs_f64();
        let provider_kv = KeyValue::new("gen_ai.provider.name", provider_name);
        let model_kv = KeyValue::new("gen_ai.request.model", req.model.clone());

        match result {
            Ok(resp) => {
                span.record("gen_ai.response.model", resp.model.as_str());
                span.record("gen_ai.usage.input_tokens", resp.input_tokens as i64);
                span.record("gen_ai.usage.output_tokens", resp.output_tokens as i64);
                if !resp.finish_reason.is_empty() {
                    span.record(
                        "gen_ai.response.finish_reasons",
                        resp.finish_reason.as_str(),
                    );
                }

                span.add_event(
                    "gen_ai.assistant.message",
                    vec![KeyValue::new(
                        "gen_ai.completion",
                        truncate(&resp.content, 2000),
                    )],
                );

                let op_kv = KeyValue::new("gen_ai.operation.name", "chat");
                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.input_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "input"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_TOKEN_USAGE.record(
                    f64::from(resp.output_tokens),
                    &[
                        KeyValue::new("gen_ai.token.type", "output"),
                        op_kv.clone(),
                        provider_kv.clone(),
                        model_kv.clone(),
                    ],
                );
                GEN_AI_OPERATION_DURATION.record(duration, &[op_kv, provider_kv, model_kv]);

                Ok(resp)
            }
            Err(err) => {
                let error_type = match &err {
                    AttemptError::Timeout => "timeout",
                    AttemptError::Provider(e) => classify_error(e),
                };
                span.record("otel.status_code", "ERROR");
                span.record("error.type", error_type);

                GEN_AI_ERROR_COUNT.add(
                    1,
                    &[
                        provider_kv,
                        model_kv,
                        KeyValue::new("error.type", error_type),
                    ],
                );

                Err(err)
            }
        }
    }

    /// Runs the request under the per-attempt timeout, retrying transient
    /// failures until the attempt budget is spent.
    pub async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, GenerationError> {
        let mut last_err = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                GEN_AI_RETRY_COUNT.add(
                    1,
                    &[
                        KeyValue::new("gen_ai.provider.name", self.provider.name().to_string()),
                        KeyValue::new("gen_ai.request.model", req.model.clone()),
                    ],
                );
            }

            match self.generate_once(req).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    let retryable = match &err {
                        AttemptError::Timeout => true,
                        AttemptError::Provider(e) => is_transient(classify_error(e)),
                    };
                    let message = match &err {
                        AttemptError::Timeout => "attempt timed out".to_string(),
                        AttemptError::Provider(e) => e.to_string(),
                    };

                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        provider = self.provider.name(),
                        model = %req.model,
                        stage = %req.stage,
                        retryable,
                        error = %message,
                        "LLM call failed"
                    );

                    last_err = Some(err);

                    if !retryable {
                        break;
                    }

                    if attempt + 1 < self.max_attempts {
                        let base = self.retry_base_delay * 2u32.pow(attempt);
                        // 25% jitter to avoid thundering herd
                        let jitter_ms = fastrand::u64(0..=base.as_millis() as u64 / 4);
                        tokio::time::sleep(base + Duration::from_millis(jitter_ms)).await;
                    }
                }
            }
        }

        Err(match last_err {
            Some(AttemptError::Timeout) => GenerationError::Timeout {
                attempts: self.max_attempts,
            },
            Some(AttemptError::Provider(e)) if classify_error(&e) == "timeout" => {
                GenerationError::Timeout {
                    attempts: self.max_attempts,
                }
            }
            Some(AttemptError::Provider(e)) => GenerationError::Failed(e.to_string()),
            None => GenerationError::Failed("no attempts were made".to_string()),
        })
    }
}

fn is_transient(error_type: &str) -> bool {
    matches!(
        error_type,
        "timeout" | "network_error" | "server_error" | "rate_limit"
    )
}

fn classify_error(err: &anyhow::Error) -> &'static str {
    let msg = err.to_string().to_lowercase();
    if msg.contains("rate limit") || msg.contains("429") {
        "rate_limit"
    } else if msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline") {
        "timeout"
    } else if msg.contains("401")
        || msg.contains("403")
        || msg.contains("auth")
        || msg.contains("api key")
    {
        "auth_error"
    } else if msg.contains("400") || msg.contains("422") || msg.contains("invalid") {
        "invalid_request"
    } else if msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("server")
    {
        "server_error"
    } else if msg.contains("connect")
        || msg.contains("dns")
        || msg.contains("network")
        || msg.contains("reset")
    {
        "network_error"
    } else {
        "unknown_error"
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.char_indices()
            .take_while(|&(i, c)| i + c.len_utf8() <= max)
            .map(|(_, c)| c)
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    pub(crate) enum Scripted {
        Reply(String),
        Fail(String),
        Hang,
    }

    /// Replays a script of outcomes, then repeats the last reply for every
    /// further call.
    pub(crate) struct ScriptedProvider {
        script: Mutex<VecDeque<Scripted>>,
        pub(crate) calls: AtomicU32,
    }

    impl ScriptedProvider {
        pub(crate) fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Scripted::Reply(content)) => Ok(GenerateResponse {
                    content,
                    model: req.model.clone(),
                    input_tokens: 10,
                    output_tokens: 20,
                    finish_reason: "stop".to_string(),
                }),
                Some(Scripted::Fail(msg)) => Err(anyhow::anyhow!(msg)),
                Some(Scripted::Hang) | None => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(anyhow::anyhow!("unreachable"))
                }
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn client(provider: Arc<ScriptedProvider>) -> LlmClient {
        LlmClient::new(provider).with_timing(Duration::from_millis(50), Duration::from_millis(1))
    }

    fn request() -> GenerateRequest {
        GenerateRequest::json("gpt-4o", "system".into(), "prompt".into(), "client")
    }

    #[tokio::test]
    async fn test_generate_returns_first_success() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::Reply("{}".into())]));
        let resp = tokio_test::assert_ok!(client(provider.clone()).generate(&request()).await);
        assert_eq!(resp.content, "{}");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_once() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Scripted::Fail("502 bad gateway".into()),
            Scripted::Reply("{\"ok\":true}".into()),
        ]));
        let resp = tokio_test::assert_ok!(client(provider.clone()).generate(&request()).await);
        assert_eq!(resp.content, "{\"ok\":true}");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeouts_exhaust_budget_as_timeout_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::Hang, Scripted::Hang]));
        let err = client(provider.clone()).generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Timeout { attempts: 2 }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Scripted::Fail("401 unauthorized".into()),
            Scripted::Reply("{}".into()),
        ]));
        let err = tokio_test::assert_err!(client(provider.clone()).generate(&request()).await);
        assert!(matches!(err, GenerationError::Failed(ref m) if m.contains("401")));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_classify_error_categories() {
        let cases = vec![
            ("rate limit exceeded", "rate_limit"),
            ("status 429: too many requests", "rate_limit"),
            ("request timed out", "timeout"),
            ("401 unauthorized", "auth_error"),
            ("invalid api key", "auth_error"),
            ("400 bad request", "invalid_request"),
            ("503 service unavailable", "server_error"),
            ("connection refused", "network_error"),
            ("something unexpected", "unknown_error"),
        ];

        for (msg, expected) in cases {
            let err = anyhow::anyhow!("{}", msg);
            assert_eq!(
                classify_error(&err),
                expected,
                "classify_error({msg:?}) should be {expected:?}"
            );
        }
    }

    #[test]
    fn test_transient_categories() {
        assert!(is_transient("timeout"));
        assert!(is_transient("server_error"));
        assert!(!is_transient("auth_error"));
        assert!(!is_transient("invalid_request"));
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 5), "hello");
        let result = truncate("hé世界!", 3);
        assert!(result.len() <= 3);
        assert!(result.is_char_boundary(result.len()));
    }
}
