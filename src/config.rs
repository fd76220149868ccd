use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub llm_model: String,
    pub openai_api_key: Option<String>,
    pub embedding_model: String,
    pub pinecone_api_key: Option<String>,
    pub pinecone_index_name: Option<String>,
    pub pinecone_index_host: Option<String>,
    pub pinecone_control_url: String,
    pub retrieval_top_k: usize,
    pub practitioners_path: PathBuf,
    pub email: EmailConfig,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: String,
    /// False when `OTEL_SDK_DISABLED=true`; logs then go to stdout only.
    pub otel_export: bool,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub admin_address: String,
    pub contact_address: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let admin_address =
            env::var("DEFAULT_ADMIN_EMAIL").unwrap_or_else(|_| "admin@dreamscapeai.com".to_string());
        let email_user = optional("EMAIL_USER");

        Ok(Self {
            port: parsed("APP_PORT", 8080)?,
            environment: env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            openai_api_key: optional("OPENAI_API_KEY"),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-ada-002".to_string()),
            pinecone_api_key: optional("PINECONE_API_KEY"),
            pinecone_index_name: optional("PINECONE_INDEX_NAME"),
            pinecone_index_host: optional("PINECONE_INDEX_HOST"),
            pinecone_control_url: env::var("PINECONE_CONTROL_URL")
                .unwrap_or_else(|_| "https://api.pinecone.io".to_string()),
            retrieval_top_k: parsed("RETRIEVAL_TOP_K", crate::retrieval::DEFAULT_TOP_K)?,
            practitioners_path: env::var("PRACTITIONERS_PATH")
                .unwrap_or_else(|_| "data/practitioners.json".to_string())
                .into(),
            email: EmailConfig {
                host: env::var("EMAIL_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
                port: parsed("EMAIL_PORT", 587)?,
                secure: env::var("EMAIL_SECURE").is_ok_and(|v| v == "true"),
                from: optional("EMAIL_FROM").or_else(|| email_user.clone()),
                user: email_user,
                password: optional("EMAIL_PASS"),
                contact_address: optional("EMAIL_CONTACT_ADDRESS")
                    .unwrap_or_else(|| admin_address.clone()),
                admin_address,
            },
            otel_service_name: env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "dreamscape-reports".to_string()),
            otel_exporter_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            otel_export: !env::var("OTEL_SDK_DISABLED").is_ok_and(|v| v.trim().eq_ignore_ascii_case("true")),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Retrieval runs only when both the index key and the index name are set.
    pub fn retrieval_enabled(&self) -> bool {
        self.pinecone_api_key.is_some() && self.pinecone_index_name.is_some()
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            environment: "test".to_string(),
            llm_model: "gpt-4o".to_string(),
            openai_api_key: None,
            embedding_model: "text-embedding-ada-002".to_string(),
            pinecone_api_key: None,
            pinecone_index_name: None,
            pinecone_index_host: None,
            pinecone_control_url: "http://127.0.0.1:9".to_string(),
            retrieval_top_k: 10,
            practitioners_path: "data/practitioners.json".into(),
            email: EmailConfig {
                host: "localhost".to_string(),
                port: 2525,
                secure: false,
                user: None,
                password: None,
                from: Some("reports@dreamscapeai.com".to_string()),
                admin_address: "admin@dreamscapeai.com".to_string(),
                contact_address: "support@dreamscapeai.com".to_string(),
            },
            otel_service_name: "dreamscape-reports-test".to_string(),
            otel_exporter_endpoint: "http://localhost:4317".to_string(),
            otel_export: false,
        }
    }
}
