//! REST adapter for the hosted document store.
//!
//! Documents live at `{base}/v1/{collection}/{id}`; a filtered collection
//! listing at `{base}/v1/{collection}?field=...&equals=...`. The change
//! subscription is a polling task that re-lists the filtered collection and
//! pushes a snapshot whenever the result set changes. Polling errors back
//! off and the task gives up after a bounded number of consecutive failures,
//! closing the snapshot channel so the listener can resubscribe (or report
//! offline).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::{
    CancelHandle, DocStoreError, Document, DocumentFilter, DocumentStore, Snapshot, Subscription,
};
use crate::types::StoreConfig;

const HTTP_TIMEOUT_SECS: u64 = 30;
const SNAPSHOT_CHANNEL_SIZE: usize = 16;

/// Consecutive poll failures tolerated before the subscription task exits.
const MAX_POLL_FAILURES: u32 = 5;
const POLL_FAILURE_BACKOFF_MS: u64 = 2_000;

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Clone)]
pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
}

impl RemoteStore {
    pub fn new(config: &StoreConfig) -> Result<RemoteStore, DocStoreError> {
        if config.base_url.trim().is_empty() {
            return Err(DocStoreError::Transport(
                "store.baseUrl is not configured".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| DocStoreError::Transport(e.to_string()))?;

        Ok(RemoteStore {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
        })
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/v1/{}/{}", self.base_url, collection, id)
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/v1/{}", self.base_url, collection)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn list_documents(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<Vec<Document>, DocStoreError> {
        let response = self
            .authorize(self.client.get(self.collection_url(collection)))
            .query(&[("field", filter.field.as_str()), ("equals", filter.equals.as_str())])
            .send()
            .await
            .map_err(|e| DocStoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocStoreError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let list: ListResponse = response
            .json()
            .await
            .map_err(|e| DocStoreError::Malformed(e.to_string()))?;
        Ok(list.documents)
    }
}

#[async_trait]
impl DocumentStore for RemoteStore {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, DocStoreError> {
        let response = self
            .authorize(self.client.get(self.document_url(collection, id)))
            .send()
            .await
            .map_err(|e| DocStoreError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DocStoreError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let document: Document = response
            .json()
            .await
            .map_err(|e| DocStoreError::Malformed(e.to_string()))?;
        Ok(Some(document))
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        data: serde_json::Value,
        merge: bool,
    ) -> Result<(), DocStoreError> {
        let response = self
            .authorize(self.client.put(self.document_url(collection, id)))
            .query(&[("merge", if merge { "true" } else { "false" })])
            .json(&data)
            .send()
            .await
            .map_err(|e| DocStoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocStoreError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), DocStoreError> {
        let response = self
            .authorize(self.client.delete(self.document_url(collection, id)))
            .send()
            .await
            .map_err(|e| DocStoreError::Transport(e.to_string()))?;

        let status = response.status();
        // Delete of an absent document is success: removal intent holds.
        if status == reqwest::StatusCode::NOT_FOUND || status.is_success() {
            return Ok(());
        }
        Err(DocStoreError::Api {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }

    async fn subscribe(
        &self,
        collection: &str,
        filter: DocumentFilter,
    ) -> Result<Subscription, DocStoreError> {
        let (sender, receiver) = mpsc::channel(SNAPSHOT_CHANNEL_SIZE);
        let store = self.clone();
        let collection = collection.to_string();

        let task = tokio::spawn(async move {
            let mut failures: u32 = 0;
            let mut last_sent: Option<String> = None;

            loop {
                match store.list_documents(&collection, &filter).await {
                    Ok(documents) => {
                        failures = 0;
                        // Only push when the result set actually changed.
                        let fingerprint = serde_json::to_string(&documents).unwrap_or_default();
                        if last_sent.as_deref() != Some(fingerprint.as_str()) {
                            last_sent = Some(fingerprint);
                            let snapshot = Snapshot {
                                collection: collection.clone(),
                                documents,
                            };
                            if sender.send(snapshot).await.is_err() {
                                return; // receiver dropped / cancelled
                            }
                        }
                        tokio::time::sleep(store.poll_interval).await;
                    }
                    Err(e) => {
                        failures += 1;
                        log::warn!(
                            "docstore poll failed ({failures}/{MAX_POLL_FAILURES}) for {collection}: {e}"
                        );
                        if failures >= MAX_POLL_FAILURES {
                            log::warn!("docstore subscription for {collection} giving up");
                            return; // channel closes, listener resubscribes
                        }
                        tokio::time::sleep(Duration::from_millis(
                            POLL_FAILURE_BACKOFF_MS * failures as u64,
                        ))
                        .await;
                    }
                }
            }
        });

        let abort = task.abort_handle();
        Ok(Subscription {
            snapshots: receiver,
            handle: CancelHandle::new(move || abort.abort()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_base_url() {
        let config = StoreConfig::default();
        assert!(RemoteStore::new(&config).is_err());
    }

    #[test]
    fn test_urls_are_normalized() {
        let config = StoreConfig {
            base_url: "https://store.example.com/".to_string(),
            api_key: None,
            poll_interval_secs: 5,
        };
        let store = RemoteStore::new(&config).unwrap();
        assert_eq!(
            store.document_url("campaign_events", "e1"),
            "https://store.example.com/v1/campaign_events/e1"
        );
        assert_eq!(
            store.collection_url("goals"),
            "https://store.example.com/v1/goals"
        );
    }
}
