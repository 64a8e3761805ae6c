//! Streaming helpers for walking the Qdrant scroll endpoint page by page.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::Method;
use serde_json::{Map, Value, json};

use super::client::{QdrantService, ensure_success};
use super::types::{QdrantError, ScrollResponse};

const SCROLL_PAGE_SIZE: usize = 256;

/// Stream the payloads of every point matching `filter`, without vectors.
///
/// `with_payload` is passed through unchanged, so callers can select a field list.
pub fn stream_payloads<'a>(
    service: &'a QdrantService,
    collection: &'a str,
    with_payload: Value,
    filter: Value,
) -> impl Stream<Item = Result<Map<String, Value>, QdrantError>> + 'a {
    try_stream! {
        let mut offset: Option<Value> = None;

        loop {
            let body = json!({
                "with_payload": with_payload.clone(),
                "with_vector": false,
                "limit": SCROLL_PAGE_SIZE,
                "filter": filter.clone(),
                "offset": offset.take(),
            });

            let response = service
                .request(Method::POST, &format!("collections/{collection}/points/scroll"))
                .json(&body)
                .send()
                .await?;
            let response = ensure_success(response).await.inspect_err(|error| {
                tracing::error!(collection, error = %error, "Failed to scroll payloads");
            })?;

            let ScrollResponse { result } = response.json().await?;
            for point in result.points {
                if let Some(payload) = point.payload {
                    yield payload;
                }
            }

            match result.next_page_offset {
                Some(Value::Null) | None => break,
                Some(next) => offset = Some(next),
            }
        }
    }
}
