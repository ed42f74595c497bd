//! In-process document store.
//!
//! Backs offline mode and the test suite. Mutations fan out fresh snapshots
//! to matching subscribers the way the remote listener would, so the sync
//! controller exercises the same reconcile path against both backends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{
    CancelHandle, DocStoreError, Document, DocumentFilter, DocumentStore, Snapshot, Subscription,
};

const SNAPSHOT_CHANNEL_SIZE: usize = 16;

struct Subscriber {
    id: u64,
    collection: String,
    filter: DocumentFilter,
    sender: mpsc::Sender<Snapshot>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<DashMap<String, HashMap<String, serde_json::Value>>>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_subscriber_id: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn documents_matching(&self, collection: &str, filter: &DocumentFilter) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .filter(|doc| filter.matches(doc))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Push the current state of `collection` to every live subscriber.
    fn broadcast(&self, collection: &str) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sub| {
            if sub.collection != collection {
                return true;
            }
            let snapshot = Snapshot {
                collection: collection.to_string(),
                documents: self.documents_matching(collection, &sub.filter),
            };
            match sub.sender.try_send(snapshot) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("memory store: subscriber {} lagging, snapshot dropped", sub.id);
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Deliver an arbitrary document set to subscribers of `collection`,
    /// bypassing stored state. Simulates a stale listener re-delivery
    /// arriving out of order with local writes.
    pub fn emit_snapshot(&self, collection: &str, documents: Vec<Document>) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sub| {
            if sub.collection != collection {
                return true;
            }
            let snapshot = Snapshot {
                collection: collection.to_string(),
                documents: documents
                    .iter()
                    .filter(|doc| sub.filter.matches(doc))
                    .cloned()
                    .collect(),
            };
            !matches!(
                sub.sender.try_send(snapshot),
                Err(mpsc::error::TrySendError::Closed(_))
            )
        });
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, DocStoreError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id).cloned())
            .map(|data| Document {
                id: id.to_string(),
                data,
            }))
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        data: serde_json::Value,
        merge: bool,
    ) -> Result<(), DocStoreError> {
        {
            let mut docs = self.collections.entry(collection.to_string()).or_default();
            let entry = docs.entry(id.to_string()).or_insert(serde_json::json!({}));
            if merge {
                match (entry.as_object_mut(), data.as_object()) {
                    (Some(existing), Some(incoming)) => {
                        for (key, value) in incoming {
                            existing.insert(key.clone(), value.clone());
                        }
                    }
                    _ => *entry = data,
                }
            } else {
                *entry = data;
            }
        }
        self.broadcast(collection);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), DocStoreError> {
        if let Some(mut docs) = self.collections.get_mut(collection) {
            docs.remove(id);
        }
        self.broadcast(collection);
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: &str,
        filter: DocumentFilter,
    ) -> Result<Subscription, DocStoreError> {
        let (sender, receiver) = mpsc::channel(SNAPSHOT_CHANNEL_SIZE);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);

        // Initial snapshot before registration so it is first in the channel.
        let initial = Snapshot {
            collection: collection.to_string(),
            documents: self.documents_matching(collection, &filter),
        };
        let _ = sender.try_send(initial);

        self.subscribers.lock().push(Subscriber {
            id,
            collection: collection.to_string(),
            filter,
            sender,
        });

        let subscribers = Arc::clone(&self.subscribers);
        let handle = CancelHandle::new(move || {
            subscribers.lock().retain(|sub| sub.id != id);
        });

        Ok(Subscription {
            snapshots: receiver,
            handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store
            .set_document("clients", "acme", serde_json::json!({"name": "Acme"}), false)
            .await
            .unwrap();

        let doc = store.get_document("clients", "acme").await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "Acme");

        store.delete_document("clients", "acme").await.unwrap();
        assert!(store.get_document("clients", "acme").await.unwrap().is_none());

        // Deleting an absent document succeeds.
        store.delete_document("clients", "acme").await.unwrap();
    }

    #[tokio::test]
    async fn test_merge_preserves_unlisted_fields() {
        let store = MemoryStore::new();
        store
            .set_document(
                "campaign_events",
                "e1",
                serde_json::json!({"title": "Fall Sale", "content": "draft"}),
                false,
            )
            .await
            .unwrap();
        store
            .set_document(
                "campaign_events",
                "e1",
                serde_json::json!({"title": "Fall Mega Sale"}),
                true,
            )
            .await
            .unwrap();

        let doc = store
            .get_document("campaign_events", "e1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.data["title"], "Fall Mega Sale");
        assert_eq!(doc.data["content"], "draft");
    }

    #[tokio::test]
    async fn test_subscription_delivers_initial_and_change_snapshots() {
        let store = MemoryStore::new();
        store
            .set_document(
                "campaign_events",
                "e1",
                serde_json::json!({"clientId": "acme", "title": "Fall Sale"}),
                false,
            )
            .await
            .unwrap();

        let mut sub = store
            .subscribe("campaign_events", DocumentFilter::client("acme"))
            .await
            .unwrap();

        let initial = sub.snapshots.recv().await.unwrap();
        assert_eq!(initial.documents.len(), 1);

        store
            .set_document(
                "campaign_events",
                "e2",
                serde_json::json!({"clientId": "acme", "title": "Cheese Club drop"}),
                false,
            )
            .await
            .unwrap();

        let next = sub.snapshots.recv().await.unwrap();
        assert_eq!(next.documents.len(), 2);
    }

    #[tokio::test]
    async fn test_subscription_filters_other_clients() {
        let store = MemoryStore::new();
        let mut sub = store
            .subscribe("campaign_events", DocumentFilter::client("acme"))
            .await
            .unwrap();
        let _ = sub.snapshots.recv().await.unwrap();

        store
            .set_document(
                "campaign_events",
                "g1",
                serde_json::json!({"clientId": "globex", "title": "Other"}),
                false,
            )
            .await
            .unwrap();

        let snapshot = sub.snapshots.recv().await.unwrap();
        assert!(snapshot.documents.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery() {
        let store = MemoryStore::new();
        let sub = store
            .subscribe("campaign_events", DocumentFilter::client("acme"))
            .await
            .unwrap();
        sub.cancel();

        store
            .set_document(
                "campaign_events",
                "e1",
                serde_json::json!({"clientId": "acme", "title": "Fall Sale"}),
                false,
            )
            .await
            .unwrap();
        assert!(store.subscribers.lock().is_empty());
    }
}
