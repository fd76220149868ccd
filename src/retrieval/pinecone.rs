use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{VectorIndex, VectorMatch};

const API_VERSION: &str = "2024-07";

/// Resolved data-plane location of one index.
#[derive(Debug)]
pub struct IndexHandle {
    pub host: String,
}

/// Process-wide slot for the resolved index handle. Filled on first use and
/// kept until `reset` or process restart. A preset host survives `reset`.
#[derive(Default)]
pub struct IndexHandleCache {
    slot: RwLock<Option<Arc<IndexHandle>>>,
    preset: Option<Arc<IndexHandle>>,
}

impl IndexHandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preset(host: String) -> Self {
        let handle = Arc::new(IndexHandle { host });
        Self {
            slot: RwLock::new(Some(handle.clone())),
            preset: Some(handle),
        }
    }

    pub async fn get_or_init<F, Fut>(&self, init: F) -> Result<Arc<IndexHandle>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IndexHandle>>,
    {
        if let Some(handle) = self.slot.read().await.as_ref() {
            return Ok(handle.clone());
        }

        let mut slot = self.slot.write().await;
        // another request may have resolved it while we waited for the lock
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        let handle = Arc::new(init().await?);
        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// Drops a resolved handle. A preset host is restored instead.
    pub async fn reset(&self) {
        *self.slot.write().await = self.preset.clone();
    }
}

pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    index_name: String,
    control_url: String,
    handles: IndexHandleCache,
}

#[derive(Deserialize)]
struct DescribeIndexResponse {
    host: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RawMatch>,
}

#[derive(Deserialize)]
struct RawMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Value>,
}

impl PineconeIndex {
    pub fn new(
        api_key: String,
        index_name: String,
        control_url: String,
        host_override: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build reqwest client with timeout")?;

        let handles = match host_override {
            Some(host) => IndexHandleCache::preset(normalize_host(&host)),
            None => IndexHandleCache::new(),
        };

        Ok(Self {
            client,
            api_key,
            index_name,
            control_url: control_url.trim_end_matches('/').to_string(),
            handles,
        })
    }

    async fn describe(&self) -> Result<IndexHandle> {
        let url = format!("{}/indexes/{}", self.control_url, self.index_name);
        let response = self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .context("Failed to describe index")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("describe index {} failed ({status}): {body}", self.index_name);
        }

        let described: DescribeIndexResponse = response
            .json()
            .await
            .context("Failed to parse describe index response")?;

        tracing::info!(index = %self.index_name, "Resolved vector index host");

        Ok(IndexHandle {
            host: normalize_host(&described.host),
        })
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[async_trait::async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let handle = self.handles.get_or_init(|| self.describe()).await?;

        let response = self
            .client
            .post(format!("{}/query", handle.host))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&QueryRequest {
                vector,
                top_k,
                include_metadata: true,
            })
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                // stale host; resolve again on the next query
                self.handles.reset().await;
                return Err(e).context("Failed to query index");
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            self.handles.reset().await;
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("index query failed ({status}): {body}");
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .context("Failed to parse index query response")?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| VectorMatch {
                id: m.id,
                score: m.score,
                text: m
                    .metadata
                    .as_ref()
                    .and_then(|meta| meta.get("text"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
            .collect())
    }

    fn name(&self) -> &str {
        &self.index_name
    }
}
