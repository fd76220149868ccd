pub mod email;
pub mod health;
pub mod reports;

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::AppState;
    use crate::assessment::tests::registry;
    use crate::config::Config;
    use crate::email::tests::RecordingMailer;
    use crate::llm::{LlmClient, Provider};
    use crate::retrieval::ContextRetriever;

    pub(crate) fn state(provider: Arc<dyn Provider>, mailer: Arc<RecordingMailer>) -> AppState {
        AppState {
            config: Config::for_tests(),
            llm_client: Arc::new(
                LlmClient::new(provider)
                    .with_timing(Duration::from_millis(200), Duration::from_millis(1)),
            ),
            retriever: Arc::new(ContextRetriever::disabled()),
            practitioners: Arc::new(registry()),
            mailer,
        }
    }

    pub(crate) async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub(crate) fn post_raw(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub(crate) fn post_json(uri: &str, body: &Value) -> Request<Body> {
        post_raw(uri, &body.to_string())
    }

    /// Waits for detached deliveries to reach the mailer.
    pub(crate) async fn wait_for_emails(mailer: &RecordingMailer, count: usize) -> Vec<String> {
        for _ in 0..200 {
            let recipients = mailer.recipients();
            if recipients.len() >= count {
                return recipients;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        mailer.recipients()
    }
}
