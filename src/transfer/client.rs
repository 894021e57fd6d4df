//! HTTP client for the collect/restore protocol.
//!
//! The client only ever talks to `127.0.0.1:<port>`. Whether that port is a
//! tunnel's local end or a directly reachable instance is invisible at this
//! layer, which is what makes the protocol testable without SSH.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace, warn};

use super::document::{TransferDocument, TransferResult};
use super::error::TransferError;

pub struct DocumentTransferClient {
    http: reqwest::Client,
    base_url: String,
}

impl DocumentTransferClient {
    pub fn new(local_port: u16, timeout: Duration) -> Result<Self, TransferError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransferError::Network(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            base_url: format!("http://127.0.0.1:{local_port}"),
        })
    }

    /// Fetch every document under `index_alias` as a raw search envelope.
    ///
    /// A transport failure or non-2xx status is a `Network` error; a 2xx
    /// body without a top-level `hits` key is a `Format` error. Neither is
    /// retried here.
    pub async fn collect(&self, index_alias: &str) -> Result<Value, TransferError> {
        let url = format!("{}/{}/_search", self.base_url, index_alias);
        let body = serde_json::json!({
            "query": { "match_all": {} },
            "size": 9999
        });

        debug!(%url, "collecting documents");
        let response = self
            .http
            .get(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransferError::Network(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Network(format!(
                "search request returned {status}"
            )));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| TransferError::Network(format!("failed to read search response: {e}")))?;

        if envelope.get("hits").is_none() {
            return Err(TransferError::Format(
                "search response is missing the 'hits' field".to_string(),
            ));
        }

        Ok(envelope)
    }

    /// Replay documents one PUT at a time.
    ///
    /// Upserts are idempotent on the far side, so re-running a restore is
    /// the recovery path after a partial one. A document with no usable
    /// identity is counted as a failure without making a request; per-item
    /// failures never abort the batch.
    pub async fn restore(&self, documents: &[TransferDocument]) -> TransferResult {
        let mut result = TransferResult::default();

        for document in documents {
            let (index, id, source) = match document.identity() {
                Ok(triple) => triple,
                Err(reason) => {
                    warn!("skipping document: {reason}");
                    result.record_failure(document.id.clone(), reason);
                    continue;
                }
            };

            match self.put_document(index, id, source).await {
                Ok(action) => {
                    trace!(%id, %action, "document restored");
                    result.record_success();
                }
                Err(e) => {
                    warn!(%id, "failed to restore document: {e}");
                    result.record_failure(Some(id.to_string()), e.to_string());
                }
            }
        }

        result
    }

    async fn put_document(
        &self,
        index: &str,
        id: &str,
        source: &Value,
    ) -> Result<String, TransferError> {
        let url = format!("{}/{}/_doc/{}", self.base_url, index, id);

        let response = self
            .http
            .put(&url)
            .json(source)
            .send()
            .await
            .map_err(|e| TransferError::Network(format!("put request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Network(format!(
                "put request returned {status}"
            )));
        }

        // The store answers "created" on first write, "updated" on replays.
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok(body
            .get("result")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }
}
