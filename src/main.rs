use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{Request, Response, StatusCode};
use axum::routing::{get, post};
use opentelemetry::KeyValue;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::{MakeSpan, OnResponse, TraceLayer},
};
use tracing::Span;

mod assessment;
mod config;
mod email;
mod error;
mod llm;
mod pipeline;
mod render;
mod retrieval;
mod routes;
mod telemetry;

use assessment::PractitionerRegistry;
use config::Config;
use email::{Mailer, SmtpMailer};
use llm::LlmClient;
use retrieval::{ContextRetriever, OpenAIEmbedder, PineconeIndex};
use telemetry::{HTTP_REQUEST_DURATION, HTTP_REQUESTS_TOTAL, init_telemetry};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub llm_client: Arc<LlmClient>,
    pub retriever: Arc<ContextRetriever>,
    pub practitioners: Arc<PractitionerRegistry>,
    pub mailer: Arc<dyn Mailer>,
}

#[derive(Clone)]
struct HttpMakeSpan;

impl<B> MakeSpan<B> for HttpMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let method = request.method().as_str();
        let path = request.uri().path();

        tracing::info_span!(
            "HTTP request",
            otel.name = %format!("{} {}", method, path),
            http.method = %method,
            http.route = %path,
            http.target = %request.uri(),
            http.scheme = "http",
            http.flavor = ?request.version(),
            http.user_agent = request.headers()
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or(""),
            http.response.status_code = tracing::field::Empty,
            otel.status_code = tracing::field::Empty,
        )
    }
}

#[derive(Clone)]
struct HttpOnResponse;

impl<B> OnResponse<B> for HttpOnResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status().as_u16();

        span.record("http.response.status_code", status as i64);

        if status >= 500 {
            span.record("otel.status_code", "ERROR");
        } else {
            span.record("otel.status_code", "OK");
        }

        let latency_ms = latency.as_secs_f64() * 1000.0;
        let status_class = format!("{}xx", status / 100);

        HTTP_REQUESTS_TOTAL.add(
            1,
            &[
                KeyValue::new("http.status_code", status.to_string()),
                KeyValue::new("http.status_class", status_class.clone()),
            ],
        );

        HTTP_REQUEST_DURATION.record(
            latency_ms,
            &[
                KeyValue::new("http.status_code", status.to_string()),
                KeyValue::new("http.status_class", status_class),
            ],
        );

        tracing::info!(
            http.response.status_code = status,
            latency_ms = latency_ms,
            "finished processing request"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let telemetry_guard = init_telemetry(&config)?;

    tracing::info!(
        port = config.port,
        environment = %config.environment,
        "Starting dreamscape-reports"
    );

    let practitioners = Arc::new(PractitionerRegistry::load(&config.practitioners_path)?);

    let provider: Arc<dyn llm::Provider> = Arc::new(llm::openai::OpenAIProvider::new(
        config.openai_api_key.as_deref().unwrap_or(""),
    ));
    let llm_client = Arc::new(LlmClient::new(provider));

    tracing::info!(
        provider = llm_client.provider_name(),
        model = %config.llm_model,
        "LLM client initialized"
    );

    let retriever = Arc::new(build_retriever(&config)?);
    let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::from_config(&config.email)?);

    let state = AppState {
        config: config.clone(),
        llm_client,
        retriever,
        practitioners,
        mailer,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    telemetry_guard.shutdown();

    Ok(())
}

/// Retrieval needs the index settings and an embedding key; without them the
/// service runs ungrounded.
fn build_retriever(config: &Config) -> anyhow::Result<ContextRetriever> {
    let (Some(pinecone_key), Some(index_name), Some(openai_key)) = (
        config.pinecone_api_key.clone(),
        config.pinecone_index_name.clone(),
        config.openai_api_key.clone(),
    ) else {
        tracing::warn!(
            configured = config.retrieval_enabled(),
            "Context retrieval disabled, reports will be generated without grounding"
        );
        return Ok(ContextRetriever::disabled());
    };

    let embedder = OpenAIEmbedder::new(openai_key, config.embedding_model.clone())?;
    let index = PineconeIndex::new(
        pinecone_key,
        index_name,
        config.pinecone_control_url.clone(),
        config.pinecone_index_host.clone(),
    )?;

    tracing::info!(embedding_model = %config.embedding_model, "Context retrieval enabled");
    Ok(ContextRetriever::new(Arc::new(embedder), Arc::new(index)))
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/api/generate-reports", post(routes::reports::generate_reports))
        .route("/api/render-reports", post(routes::reports::render_reports))
        .route("/api/assessments", post(routes::reports::submit_assessment))
        .route(
            "/api/send-practitioner-email",
            post(routes::email::send_practitioner_email),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(HttpMakeSpan)
                .on_response(HttpOnResponse),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(300),
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
