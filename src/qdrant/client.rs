//! Qdrant REST calls for the hybrid chunk collection.

use crate::config::Config;
use crate::embedding::SparseVector;
use crate::qdrant::filters::{COOPERATIVE_FIELD, FORM_ID_FIELD};
use crate::qdrant::types::{
    CountResponse, DENSE_VECTOR, IndexSummary, PointInsert, QdrantError, QueryResponse,
    QueryResponseResult, SPARSE_VECTOR, ScoredPoint,
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};

/// Qdrant REST client bound to one server.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a client for the store named in `config`.
    pub fn new(config: &Config) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("trialgate/0.1").build()?;

        let base_url = normalize_base_url(&config.qdrant_url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = %config
                .qdrant_api_key
                .as_deref()
                .is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: config.qdrant_api_key.clone(),
        })
    }

    /// Create a collection only when it is missing from Qdrant.
    pub async fn create_collection_if_not_exists(
        &self,
        collection_name: &str,
        dense_size: usize,
    ) -> Result<(), QdrantError> {
        if self.collection_exists(collection_name).await? {
            return Ok(());
        }

        tracing::info!(collection = collection_name, dense_size, "Creating collection");
        self.create_collection(collection_name, dense_size).await
    }

    /// Create a collection with a cosine dense slot and an IDF-weighted sparse slot.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        dense_size: usize,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                DENSE_VECTOR: {
                    "size": dense_size,
                    "distance": "Cosine"
                }
            },
            "sparse_vectors": {
                SPARSE_VECTOR: {
                    "modifier": "idf"
                }
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!(collection = collection_name, "Collection created");
        Ok(())
    }

    /// Ensure the payload indexes used by tenant filtering and dedupe exist.
    pub async fn ensure_payload_indexes(&self, collection_name: &str) -> Result<(), QdrantError> {
        let fields: [(&str, &str); 4] = [
            (COOPERATIVE_FIELD, "keyword"),
            (FORM_ID_FIELD, "keyword"),
            ("chunk_hash", "keyword"),
            ("timestamp", "datetime"),
        ];

        for (field, schema) in fields {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });

            let response = self
                .request(Method::PUT, &format!("collections/{collection_name}/index"))
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() || response.status() == StatusCode::CONFLICT {
                tracing::debug!(
                    collection = collection_name,
                    field,
                    schema,
                    "Payload index ensured"
                );
                continue;
            }
            let error = unexpected_status(response).await;
            // Tenant isolation depends on the cooperative index; the rest only speed up filters.
            if field == COOPERATIVE_FIELD {
                return Err(error);
            }
            tracing::warn!(
                collection = collection_name,
                field,
                error = %error,
                "Payload index missing"
            );
        }

        Ok(())
    }

    /// Upsert points with both named vectors.
    pub async fn upsert_points(
        &self,
        collection_name: &str,
        points: Vec<PointInsert>,
    ) -> Result<IndexSummary, QdrantError> {
        if points.is_empty() {
            return Ok(IndexSummary::default());
        }

        let serialized: Vec<_> = points
            .into_iter()
            .map(|point| {
                json!({
                    "id": point.id,
                    "vector": {
                        DENSE_VECTOR: point.dense,
                        SPARSE_VECTOR: point.sparse,
                    },
                    "payload": point.payload,
                })
            })
            .collect();

        let upserted = serialized.len();
        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}/points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!(collection = collection_name, upserted, "Points upserted");
        Ok(IndexSummary { upserted })
    }

    /// Nearest neighbours of `vector` in the dense slot, restricted by `filter`.
    pub async fn query_dense(
        &self,
        collection_name: &str,
        vector: Vec<f32>,
        filter: Value,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        self.query_points(collection_name, json!(vector), DENSE_VECTOR, filter, limit)
            .await
    }

    /// Best matches for `vector` in the sparse slot, restricted by `filter`.
    pub async fn query_sparse(
        &self,
        collection_name: &str,
        vector: &SparseVector,
        filter: Value,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        self.query_points(collection_name, json!(vector), SPARSE_VECTOR, filter, limit)
            .await
    }

    async fn query_points(
        &self,
        collection_name: &str,
        query: Value,
        using: &str,
        filter: Value,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let body = json!({
            "query": query,
            "using": using,
            "filter": filter,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )
            .json(&body)
            .send()
            .await?;

        let reply: QueryResponse = ensure_success(response).await?.json().await?;
        let (QueryResponseResult::Points(points) | QueryResponseResult::Object { points }) =
            reply.result;
        Ok(points
            .into_iter()
            .map(|point| ScoredPoint {
                id: point_id_text(point.id),
                score: point.score,
                payload: point.payload,
            })
            .collect())
    }

    /// Exact number of points matching `filter`.
    pub async fn count_points(
        &self,
        collection_name: &str,
        filter: Value,
    ) -> Result<usize, QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/count"),
            )
            .json(&json!({ "filter": filter, "exact": true }))
            .send()
            .await?;
        let reply: CountResponse = ensure_success(response).await?.json().await?;
        Ok(reply.result.count)
    }

    /// Delete every point matching `filter` and wait for the operation to apply.
    pub async fn delete_points(
        &self,
        collection_name: &str,
        filter: Value,
    ) -> Result<(), QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/delete"),
            )
            .query(&[("wait", true)])
            .json(&json!({ "filter": filter }))
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!(collection = collection_name, "Points deleted by filter");
        Ok(())
    }

    async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(unexpected_status(response).await),
        }
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let builder = self.client.request(method, url);
        match self.api_key.as_deref().filter(|key| !key.is_empty()) {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }
}

pub(crate) async fn ensure_success(response: Response) -> Result<Response, QdrantError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(unexpected_status(response).await)
    }
}

async fn unexpected_status(response: Response) -> QdrantError {
    let status = response.status();
    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    tracing::error!(%status, url = %url, "Qdrant request failed");
    QdrantError::UnexpectedStatus { status, body }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

/// Qdrant ids are UUID strings or unsigned integers.
fn point_id_text(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
