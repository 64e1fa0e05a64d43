//! Pinecone implementation of [`VectorStore`] over its REST API.
//!
//! The index is created on first use if it does not exist. Data-plane calls go
//! to the index host reported by the control plane, resolved once and cached.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use super::{
    ScoredChunk, VectorStore, VectorStoreError, VectorStoreResult, chunk_vector_id,
};
use crate::{config::VectorConfig, services::TextChunk};

/// Pinecone accepts at most 1000 ids per delete request.
const DELETE_BATCH_SIZE: usize = 1000;

pub struct PineconeStore {
    client: Client,
    config: VectorConfig,
    control_plane_url: String,
    /// Data-plane base URL, set once the index is known to be ready.
    host: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: String,
    values: &'a [f32],
    metadata: ChunkMetadata<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChunkMetadata<'a> {
    s3_key: &'a str,
    user_email: &'a str,
    chunk_index: usize,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedVector>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct ListedVector {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next: Option<String>,
}

impl PineconeStore {
    pub fn new(config: &VectorConfig) -> VectorStoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VectorStoreError::Http(e.to_string()))?;

        Ok(Self {
            client,
            control_plane_url: config.control_plane_url.trim_end_matches('/').to_string(),
            config: config.clone(),
            host: OnceCell::new(),
        })
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", &self.config.api_version)
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> VectorStoreResult<T> {
        let resp = request
            .send()
            .await
            .map_err(|e| VectorStoreError::Http(e.to_string()))?;
        let resp = check_status(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))
    }

    /// Data-plane base URL. Concurrent first callers share one resolution.
    async fn index_host(&self) -> VectorStoreResult<&str> {
        self.host
            .get_or_try_init(|| self.ensure_index())
            .await
            .map(String::as_str)
    }

    /// Find or create the index and wait until it accepts requests.
    #[instrument(skip(self), fields(index = %self.config.index_name))]
    async fn ensure_index(&self) -> VectorStoreResult<String> {
        let start = Instant::now();
        let list: IndexList = self
            .send_json(self.request(Method::GET, &format!("{}/indexes", self.control_plane_url)))
            .await?;

        let existing = list
            .indexes
            .into_iter()
            .find(|idx| idx.name == self.config.index_name);

        match existing {
            Some(idx) if idx.status.ready => {
                if let Some(host) = idx.host {
                    return Ok(normalize_host(&host));
                }
            }
            Some(_) => debug!("Index exists but is not ready yet"),
            None => self.create_index().await?,
        }

        let host = self.wait_until_ready().await?;
        info!(
            host = %host,
            duration_ms = start.elapsed().as_millis() as u64,
            "Vector index ready"
        );
        Ok(host)
    }

    async fn create_index(&self) -> VectorStoreResult<()> {
        info!(
            dimension = self.config.dimension,
            metric = self.config.metric.as_str(),
            "Creating vector index"
        );

        let body = json!({
            "name": self.config.index_name,
            "dimension": self.config.dimension,
            "metric": self.config.metric.as_str(),
            "spec": {
                "serverless": {
                    "cloud": self.config.cloud,
                    "region": self.config.region,
                }
            }
        });

        let resp = self
            .request(Method::POST, &format!("{}/indexes", self.control_plane_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| VectorStoreError::Http(e.to_string()))?;

        // Another instance created it between our list and create.
        if resp.status() == StatusCode::CONFLICT {
            debug!("Index already exists");
            return Ok(());
        }
        check_status(resp).await?;
        Ok(())
    }

    async fn wait_until_ready(&self) -> VectorStoreResult<String> {
        let url = format!(
            "{}/indexes/{}",
            self.control_plane_url, self.config.index_name
        );
        let interval = Duration::from_millis(self.config.ready_poll_interval_ms);

        for attempt in 1..=self.config.ready_max_attempts {
            let desc: IndexDescription = self.send_json(self.request(Method::GET, &url)).await?;
            if desc.status.ready
                && let Some(host) = desc.host
            {
                return Ok(normalize_host(&host));
            }

            debug!(
                attempt,
                state = desc.status.state.as_deref().unwrap_or("unknown"),
                "Waiting for vector index"
            );
            if attempt < self.config.ready_max_attempts {
                tokio::time::sleep(interval).await;
            }
        }

        Err(VectorStoreError::IndexNotReady(
            self.config.index_name.clone(),
        ))
    }

    fn check_dimension(&self, vector: &[f32]) -> VectorStoreResult<()> {
        if vector.len() != self.config.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    async fn list_ids(
        &self,
        host: &str,
        namespace: &str,
        prefix: &str,
    ) -> VectorStoreResult<Vec<String>> {
        let url = format!("{host}/vectors/list");
        let mut ids = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut params = vec![("namespace", namespace), ("prefix", prefix)];
            if let Some(t) = token.as_deref() {
                params.push(("paginationToken", t));
            }
            let page: ListResponse = self
                .send_json(self.request(Method::GET, &url).query(&params))
                .await?;

            ids.extend(page.vectors.into_iter().map(|v| v.id));
            match page.pagination.and_then(|p| p.next) {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }

        Ok(ids)
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    #[instrument(skip(self, chunks, embeddings), fields(chunks = chunks.len()))]
    async fn upsert_chunks(
        &self,
        user_email: &str,
        s3_key: &str,
        chunks: &[TextChunk],
        embeddings: &[Vec<f32>],
    ) -> VectorStoreResult<usize> {
        if chunks.len() != embeddings.len() {
            return Err(VectorStoreError::InvalidInput(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        for embedding in embeddings {
            self.check_dimension(embedding)?;
        }
        if chunks.is_empty() {
            return Ok(0);
        }

        let host = self.index_host().await?;
        let url = format!("{host}/vectors/upsert");

        let vectors: Vec<UpsertVector<'_>> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, values)| UpsertVector {
                id: chunk_vector_id(s3_key, chunk.index),
                values,
                metadata: ChunkMetadata {
                    s3_key,
                    user_email,
                    chunk_index: chunk.index,
                    text: &chunk.content,
                },
            })
            .collect();

        for batch in vectors.chunks(self.config.upsert_batch_size) {
            let body = json!({ "vectors": batch, "namespace": user_email });
            let resp = self
                .request(Method::POST, &url)
                .json(&body)
                .send()
                .await
                .map_err(|e| VectorStoreError::Http(e.to_string()))?;
            check_status(resp).await?;
            debug!(batch = batch.len(), "Upserted vectors");
        }

        Ok(vectors.len())
    }

    #[instrument(skip(self, vector))]
    async fn query(
        &self,
        user_email: &str,
        s3_key: &str,
        vector: &[f32],
        top_k: usize,
    ) -> VectorStoreResult<Vec<ScoredChunk>> {
        self.check_dimension(vector)?;
        let host = self.index_host().await?;

        let body = json!({
            "namespace": user_email,
            "vector": vector,
            "topK": top_k,
            "filter": { "s3Key": { "$eq": s3_key } },
            "includeMetadata": true,
            "includeValues": false,
        });

        let resp: QueryResponse = self
            .send_json(
                self.request(Method::POST, &format!("{host}/query"))
                    .json(&body),
            )
            .await?;

        let mut results: Vec<ScoredChunk> = resp
            .matches
            .into_iter()
            .map(|m| {
                let metadata = m.metadata.unwrap_or_default();
                ScoredChunk {
                    text: metadata
                        .get("text")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    chunk_index: metadata.get("chunkIndex").and_then(|v| v.as_u64()),
                    id: m.id,
                    score: m.score,
                }
            })
            .collect();

        // Pinecone returns matches best-first; sort anyway so callers can rely on it.
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn delete_document(&self, user_email: &str, s3_key: &str) -> VectorStoreResult<usize> {
        let host = self.index_host().await?;
        let prefix = format!("{s3_key}#");
        let ids = self.list_ids(host, user_email, &prefix).await?;

        if ids.is_empty() {
            warn!("No vectors found for document");
            return Ok(0);
        }

        let url = format!("{host}/vectors/delete");
        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            let body = json!({ "ids": batch, "namespace": user_email });
            let resp = self
                .request(Method::POST, &url)
                .json(&body)
                .send()
                .await
                .map_err(|e| VectorStoreError::Http(e.to_string()))?;
            check_status(resp).await?;
        }

        info!(deleted = ids.len(), "Deleted document vectors");
        Ok(ids.len())
    }
}

/// Index hosts come back without a scheme.
fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

async fn check_status(resp: reqwest::Response) -> VectorStoreResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(VectorStoreError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path, query_param},
    };

    use super::*;

    const EMAIL: &str = "ada@example.com";
    const KEY: &str = "ada@example.com/1700000000000_notes.pdf";

    fn config(server: &MockServer) -> VectorConfig {
        VectorConfig {
            api_key: "pc-test".to_string(),
            control_plane_url: server.uri(),
            index_name: "braintok".to_string(),
            dimension: 3,
            upsert_batch_size: 2,
            ready_max_attempts: 3,
            ready_poll_interval_ms: 1,
            ..Default::default()
        }
    }

    fn chunk(index: usize, content: &str) -> TextChunk {
        TextChunk {
            content: content.to_string(),
            index,
            char_start: 0,
            char_end: content.len(),
            token_count: 1,
        }
    }

    async fn mount_ready_index(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/indexes"))
            .and(header("Api-Key", "pc-test"))
            .and(header("X-Pinecone-API-Version", "2024-07"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "indexes": [{
                    "name": "braintok",
                    "host": server.uri(),
                    "status": { "ready": true, "state": "Ready" }
                }]
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(
            normalize_host("braintok-abc.svc.pinecone.io"),
            "https://braintok-abc.svc.pinecone.io"
        );
        assert_eq!(normalize_host("http://localhost:5081/"), "http://localhost:5081");
    }

    #[tokio::test]
    async fn test_upsert_batches_and_resolves_host_once() {
        let server = MockServer::start().await;
        mount_ready_index(&server).await;

        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .and(body_partial_json(json!({ "namespace": EMAIL })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 2 })))
            .expect(2)
            .mount(&server)
            .await;

        let store = PineconeStore::new(&config(&server)).unwrap();
        let chunks = vec![chunk(0, "owls"), chunk(1, "hunt"), chunk(2, "at night")];
        let embeddings = vec![vec![0.1, 0.2, 0.3]; 3];

        let written = store
            .upsert_chunks(EMAIL, KEY, &chunks, &embeddings)
            .await
            .unwrap();
        assert_eq!(written, 3);

        let requests = server.received_requests().await.unwrap();
        let first_upsert: Value = requests
            .iter()
            .find(|r| r.url.path() == "/vectors/upsert")
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .unwrap();
        let vector = &first_upsert["vectors"][0];
        assert_eq!(vector["id"], format!("{KEY}#0"));
        assert_eq!(vector["metadata"]["s3Key"], KEY);
        assert_eq!(vector["metadata"]["userEmail"], EMAIL);
        assert_eq!(vector["metadata"]["chunkIndex"], 0);
        assert_eq!(vector["metadata"]["text"], "owls");
    }

    #[tokio::test]
    async fn test_creates_missing_index_and_waits_for_ready() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/indexes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "indexes": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/indexes"))
            .and(body_partial_json(json!({
                "name": "braintok",
                "dimension": 3,
                "metric": "cosine",
                "spec": { "serverless": { "cloud": "aws", "region": "us-east-1" } }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "name": "braintok" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/indexes/braintok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "braintok",
                "status": { "ready": false, "state": "Initializing" }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/indexes/braintok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "braintok",
                "host": server.uri(),
                "status": { "ready": true, "state": "Ready" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "matches": [] })))
            .mount(&server)
            .await;

        let store = PineconeStore::new(&config(&server)).unwrap();
        let results = store.query(EMAIL, KEY, &[0.0, 0.0, 1.0], 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_index_never_ready() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/indexes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "indexes": [{ "name": "braintok", "status": { "ready": false } }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/indexes/braintok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "braintok",
                "status": { "ready": false, "state": "Initializing" }
            })))
            .expect(3)
            .mount(&server)
            .await;

        let store = PineconeStore::new(&config(&server)).unwrap();
        let result = store.query(EMAIL, KEY, &[0.0, 0.0, 1.0], 5).await;
        assert!(matches!(result, Err(VectorStoreError::IndexNotReady(name)) if name == "braintok"));
    }

    #[tokio::test]
    async fn test_query_scopes_namespace_and_document() {
        let server = MockServer::start().await;
        mount_ready_index(&server).await;

        Mock::given(method("POST"))
            .and(path("/query"))
            .and(body_partial_json(json!({
                "namespace": EMAIL,
                "topK": 2,
                "filter": { "s3Key": { "$eq": KEY } },
                "includeMetadata": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "matches": [
                    { "id": format!("{KEY}#4"), "score": 0.71,
                      "metadata": { "text": "second", "chunkIndex": 4 } },
                    { "id": format!("{KEY}#1"), "score": 0.93,
                      "metadata": { "text": "first", "chunkIndex": 1 } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = PineconeStore::new(&config(&server)).unwrap();
        let results = store.query(EMAIL, KEY, &[1.0, 0.0, 0.0], 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "first");
        assert_eq!(results[0].chunk_index, Some(1));
        assert_eq!(results[1].text, "second");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_before_network() {
        let server = MockServer::start().await;
        let store = PineconeStore::new(&config(&server)).unwrap();

        let result = store
            .upsert_chunks(EMAIL, KEY, &[chunk(0, "x")], &[vec![0.1, 0.2]])
            .await;
        assert!(matches!(
            result,
            Err(VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_document_follows_pagination() {
        let server = MockServer::start().await;
        mount_ready_index(&server).await;

        let prefix = format!("{KEY}#");
        Mock::given(method("GET"))
            .and(path("/vectors/list"))
            .and(query_param("namespace", EMAIL))
            .and(query_param("prefix", prefix.as_str()))
            .and(query_param("paginationToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "vectors": [{ "id": format!("{KEY}#2") }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/vectors/list"))
            .and(query_param("prefix", prefix.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "vectors": [{ "id": format!("{KEY}#0") }, { "id": format!("{KEY}#1") }],
                "pagination": { "next": "page-2" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/vectors/delete"))
            .and(body_partial_json(json!({
                "ids": [format!("{KEY}#0"), format!("{KEY}#1"), format!("{KEY}#2")],
                "namespace": EMAIL
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let store = PineconeStore::new(&config(&server)).unwrap();
        assert_eq!(store.delete_document(EMAIL, KEY).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_api_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/indexes"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .mount(&server)
            .await;

        let store = PineconeStore::new(&config(&server)).unwrap();
        let result = store.delete_document(EMAIL, KEY).await;
        assert!(matches!(result, Err(VectorStoreError::Api { status: 401, .. })));
    }
}
