pub mod client;
pub mod openai;

use std::time::Duration;

use thiserror::Error;

pub use client::LlmClient;

/// Sampling parameters are fixed so the JSON output shape stays stable.
pub const TEMPERATURE: f32 = 0.6;
pub const TOP_P: f32 = 0.85;
pub const MAX_OUTPUT_TOKENS: u32 = 2500;

/// Hard limit for a single model call.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);
/// Total attempts per generation, the first call included.
pub const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub json_output: bool,
    pub stage: String,
}

impl GenerateRequest {
    pub fn json(model: &str, system: String, prompt: String, stage: &str) -> Self {
        Self {
            model: model.to_string(),
            system,
            prompt,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            max_tokens: MAX_OUTPUT_TOKENS,
            json_output: true,
            stage: stage.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: String,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("generation failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse>;
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_request_uses_fixed_parameters() {
        let req = GenerateRequest::json("gpt-4o", "sys".into(), "user".into(), "client");
        assert_eq!(req.temperature, 0.6);
        assert_eq!(req.top_p, 0.85);
        assert_eq!(req.max_tokens, 2500);
        assert!(req.json_output);
        assert_eq!(req.stage, "client");
    }

    #[test]
    fn test_retry_budget_is_small() {
        assert!(MAX_ATTEMPTS <= 2);
        assert!(ATTEMPT_TIMEOUT >= Duration::from_secs(10));
    }
}
