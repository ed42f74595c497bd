//! Document store boundary.
//!
//! The remote store is an external collaborator; this module pins down the
//! minimum surface the sync core depends on: document read, write-with-merge,
//! delete-by-id, and a change subscription that delivers whole-collection
//! snapshots until cancelled. Two backends: `remote` (REST adapter) and
//! `memory` (in-process, used offline and by tests).

pub mod memory;
pub mod remote;

pub use memory::MemoryStore;
pub use remote::RemoteStore;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Collection holding normalized per-event documents (each carries `clientId`).
pub const EVENTS_COLLECTION: &str = "campaign_events";
/// Collection holding client records (legacy embedded `campaignData` shape).
pub const CLIENTS_COLLECTION: &str = "clients";
/// Collection holding goal documents keyed by (client, year, month).
pub const GOALS_COLLECTION: &str = "goals";

#[derive(Debug, thiserror::Error)]
pub enum DocStoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Transport: {0}")]
    Transport(String),

    #[error("Store API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// One document: id plus its field map.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Document {
    pub id: String,
    pub data: serde_json::Value,
}

/// Authoritative whole-collection snapshot delivered by a subscription.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub collection: String,
    pub documents: Vec<Document>,
}

/// Single-field equality filter. All the subscription paths in this crate
/// filter events by owning client.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFilter {
    pub field: String,
    pub equals: String,
}

impl DocumentFilter {
    pub fn client(client_id: &str) -> DocumentFilter {
        DocumentFilter {
            field: "clientId".to_string(),
            equals: client_id.to_string(),
        }
    }

    pub fn matches(&self, document: &Document) -> bool {
        document
            .data
            .get(&self.field)
            .and_then(|v| v.as_str())
            .map(|v| v == self.equals)
            .unwrap_or(false)
    }
}

/// Cancellation handle for an active subscription. Cancelling (or dropping)
/// stops snapshot delivery; the receiver's channel closes shortly after.
pub struct CancelHandle(Option<Box<dyn FnOnce() + Send>>);

impl CancelHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> CancelHandle {
        CancelHandle(Some(Box::new(cancel)))
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.0.take() {
            cancel();
        }
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.0.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CancelHandle")
    }
}

/// An active change subscription: a snapshot channel plus its cancel handle.
/// The owner must cancel (or drop) the previous subscription before opening
/// the next one for the same session — one active handle per client session.
#[derive(Debug)]
pub struct Subscription {
    pub snapshots: mpsc::Receiver<Snapshot>,
    pub handle: CancelHandle,
}

impl Subscription {
    pub fn cancel(self) {
        self.handle.cancel();
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document. Absence is `Ok(None)`, not an error.
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, DocStoreError>;

    /// Write a document. With `merge`, supplied fields are merged into the
    /// existing document; without, the document is replaced wholesale.
    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        data: serde_json::Value,
        merge: bool,
    ) -> Result<(), DocStoreError>;

    /// Delete by id. Deleting an absent document succeeds.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), DocStoreError>;

    /// Open a change subscription over the filtered collection. Delivers an
    /// initial snapshot promptly, then a fresh snapshot after every change.
    async fn subscribe(
        &self,
        collection: &str,
        filter: DocumentFilter,
    ) -> Result<Subscription, DocStoreError>;
}
