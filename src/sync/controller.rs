//! Optimistic sync controller.
//!
//! Owns the per-client session: the in-memory campaign store, the remote
//! change subscription, and every write to the document store. Mutations
//! apply locally first (zero-latency UI), then persist in the background;
//! a failed single write rolls the affected event back and surfaces once.
//!
//! Session state machine: Idle → Listening → (PausedForBulkOp) → Listening.
//! While Listening, an incoming snapshot replaces local state wholesale —
//! the remote store is authoritative once a write round-trip completes.
//! While PausedForBulkOp, snapshots are discarded: a destructive
//! multi-document operation must not be undone by a stale snapshot arriving
//! mid-flight. Bulk delete is the only path that pauses, and it resumes only
//! after every delete is acknowledged plus a settle delay.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::docstore::{DocumentFilter, DocumentStore, Snapshot, EVENTS_COLLECTION};
use crate::error::CalendarError;
use crate::store::CampaignStore;
use crate::types::{CampaignEvent, CampaignType, ConnectionHealth, EventUpdates, SyncStatusView};

/// Exponential backoff base for resubscribe attempts.
const RESUBSCRIBE_BASE_BACKOFF_MS: u64 = 1_000;
const RESUBSCRIBE_MAX_BACKOFF_MS: u64 = 30_000;
/// After this many consecutive failed attempts the listener stops retrying
/// and reports offline instead of spinning.
const MAX_RESUBSCRIBE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Listening,
    PausedForBulkOp,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Listening => "listening",
            SyncPhase::PausedForBulkOp => "paused_for_bulk_op",
        }
    }
}

/// State shared between the controller and the session's listener task.
/// Detached write tasks from a torn-down session keep their own Arc; their
/// late completions mutate the dead session's store and are ignored.
struct SessionShared {
    client_id: String,
    store: Mutex<CampaignStore>,
    phase: Mutex<SyncPhase>,
    pending_writes: Mutex<HashSet<String>>,
    health: Mutex<ConnectionHealth>,
    last_write_error: Mutex<Option<String>>,
    loaded: watch::Sender<bool>,
}

struct SyncSession {
    shared: Arc<SessionShared>,
    listener: JoinHandle<()>,
}

pub struct SyncController {
    gateway: Arc<dyn DocumentStore>,
    settle_delay: Duration,
    session: Mutex<Option<SyncSession>>,
}

impl SyncController {
    pub fn new(gateway: Arc<dyn DocumentStore>, settle_delay: Duration) -> SyncController {
        SyncController {
            gateway,
            settle_delay,
            session: Mutex::new(None),
        }
    }

    /// Switch the active client: cancel the previous subscription, clear
    /// local state, open a fresh subscription for the new client.
    pub fn select_client(&self, client_id: &str) {
        self.teardown();

        let (loaded, _) = watch::channel(false);
        let shared = Arc::new(SessionShared {
            client_id: client_id.to_string(),
            store: Mutex::new(CampaignStore::new()),
            phase: Mutex::new(SyncPhase::Listening),
            pending_writes: Mutex::new(HashSet::new()),
            health: Mutex::new(ConnectionHealth::Live),
            last_write_error: Mutex::new(None),
            loaded,
        });

        let listener = tokio::spawn(run_listener(Arc::clone(&self.gateway), Arc::clone(&shared)));
        *self.session.lock() = Some(SyncSession { shared, listener });
        log::info!("sync session opened for client {client_id}");
    }

    /// Tear down the active session, cancelling its subscription. Detached
    /// in-flight writes are left to complete against the dead session.
    pub fn teardown(&self) {
        if let Some(session) = self.session.lock().take() {
            session.listener.abort();
            *session.shared.phase.lock() = SyncPhase::Idle;
            log::info!("sync session closed for client {}", session.shared.client_id);
        }
    }

    fn active(&self) -> Result<Arc<SessionShared>, CalendarError> {
        self.session
            .lock()
            .as_ref()
            .map(|s| Arc::clone(&s.shared))
            .ok_or_else(|| CalendarError::Validation("no client selected".to_string()))
    }

    pub fn client_id(&self) -> Option<String> {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.shared.client_id.clone())
    }

    /// Wait until the first authoritative snapshot has been applied.
    pub async fn wait_until_loaded(&self, timeout: Duration) -> bool {
        let mut receiver = match self.session.lock().as_ref() {
            Some(session) => session.shared.loaded.subscribe(),
            None => return false,
        };
        if *receiver.borrow() {
            return true;
        }
        tokio::time::timeout(timeout, receiver.wait_for(|loaded| *loaded))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    pub fn list_events(&self) -> Result<Vec<CampaignEvent>, CalendarError> {
        Ok(self.active()?.store.lock().list())
    }

    pub fn get_event(&self, event_id: &str) -> Result<CampaignEvent, CalendarError> {
        self.active()?
            .store
            .lock()
            .get(event_id)
            .ok_or_else(|| CalendarError::NotFound(format!("event {event_id}")))
    }

    /// Run a closure against the live store (read-only access for
    /// validation and derived views).
    pub fn with_store<R>(&self, f: impl FnOnce(&CampaignStore) -> R) -> Result<R, CalendarError> {
        let shared = self.active()?;
        let store = shared.store.lock();
        Ok(f(&store))
    }

    pub fn status(&self) -> SyncStatusView {
        match self.session.lock().as_ref() {
            None => SyncStatusView {
                client_id: None,
                phase: SyncPhase::Idle.as_str().to_string(),
                health: ConnectionHealth::Offline,
                pending_writes: 0,
                last_write_error: None,
            },
            Some(session) => SyncStatusView {
                client_id: Some(session.shared.client_id.clone()),
                phase: session.shared.phase.lock().as_str().to_string(),
                health: *session.shared.health.lock(),
                pending_writes: session.shared.pending_writes.lock().len(),
                last_write_error: session.shared.last_write_error.lock().clone(),
            },
        }
    }

    /// Pop the most recent background write failure, if one was surfaced.
    pub fn take_write_error(&self) -> Option<String> {
        self.session
            .lock()
            .as_ref()
            .and_then(|s| s.shared.last_write_error.lock().take())
    }

    /// Wait for in-flight single-event writes to drain (used by one-shot
    /// callers that exit right after a mutation).
    pub async fn flush(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let pending = match self.session.lock().as_ref() {
                Some(session) => session.shared.pending_writes.lock().len(),
                None => 0,
            };
            if pending == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    // ------------------------------------------------------------------
    // Single-event mutations: optimistic apply, background persist
    // ------------------------------------------------------------------

    /// Create an event: applied locally at once, persisted concurrently.
    /// On write failure the event is removed again and the error surfaced.
    pub fn create_event(
        &self,
        date: chrono::NaiveDate,
        title: &str,
        content: &str,
        campaign_type: CampaignType,
    ) -> Result<CampaignEvent, CalendarError> {
        let shared = self.active()?;
        let event = CampaignEvent::new(&shared.client_id, date, title, content, campaign_type);
        shared.store.lock().upsert(event.clone())?;
        shared.pending_writes.lock().insert(event.id.clone());

        let gateway = Arc::clone(&self.gateway);
        let task_shared = Arc::clone(&shared);
        let task_event = event.clone();
        tokio::spawn(async move {
            let result = gateway
                .set_document(
                    EVENTS_COLLECTION,
                    &task_event.id,
                    task_event.to_document(),
                    true,
                )
                .await;
            task_shared.pending_writes.lock().remove(&task_event.id);
            if let Err(e) = result {
                log::warn!("create write failed for {}: {e}; rolling back", task_event.id);
                task_shared.store.lock().remove(&task_event.id);
                *task_shared.last_write_error.lock() =
                    Some(format!("create {} failed: {e}", task_event.id));
            }
        });

        Ok(event)
    }

    /// Apply an arbitrary in-place mutation to one event; on write failure
    /// the pre-mutation value is restored.
    pub fn mutate_event(
        &self,
        event_id: &str,
        mutate: impl FnOnce(&mut CampaignEvent) -> Result<(), CalendarError>,
    ) -> Result<CampaignEvent, CalendarError> {
        let shared = self.active()?;
        let updated = {
            let mut store = shared.store.lock();
            let previous = store
                .get(event_id)
                .ok_or_else(|| CalendarError::NotFound(format!("event {event_id}")))?;
            let mut updated = previous.clone();
            mutate(&mut updated)?;
            store.upsert(updated.clone())?;

            let gateway = Arc::clone(&self.gateway);
            let task_shared = Arc::clone(&shared);
            let task_event = updated.clone();
            shared.pending_writes.lock().insert(task_event.id.clone());
            tokio::spawn(async move {
                let result = gateway
                    .set_document(
                        EVENTS_COLLECTION,
                        &task_event.id,
                        task_event.to_document(),
                        true,
                    )
                    .await;
                task_shared.pending_writes.lock().remove(&task_event.id);
                if let Err(e) = result {
                    log::warn!("update write failed for {}: {e}; rolling back", task_event.id);
                    let _ = task_shared.store.lock().upsert(previous);
                    *task_shared.last_write_error.lock() =
                        Some(format!("update {} failed: {e}", task_event.id));
                }
            });
            updated
        };
        Ok(updated)
    }

    /// Update an event's fields; on write failure the pre-update value is
    /// restored.
    pub fn update_event(
        &self,
        event_id: &str,
        updates: &EventUpdates,
    ) -> Result<CampaignEvent, CalendarError> {
        self.mutate_event(event_id, |event| updates.apply(event, Utc::now()))
    }

    /// Delete an event; on write failure it is reinserted.
    pub fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
        let shared = self.active()?;
        let previous = shared
            .store
            .lock()
            .remove(event_id)
            .ok_or_else(|| CalendarError::NotFound(format!("event {event_id}")))?;
        shared.pending_writes.lock().insert(event_id.to_string());

        let gateway = Arc::clone(&self.gateway);
        let task_shared = Arc::clone(&shared);
        let id = event_id.to_string();
        tokio::spawn(async move {
            let result = gateway.delete_document(EVENTS_COLLECTION, &id).await;
            task_shared.pending_writes.lock().remove(&id);
            if let Err(e) = result {
                log::warn!("delete write failed for {id}: {e}; rolling back");
                let _ = task_shared.store.lock().upsert(previous);
                *task_shared.last_write_error.lock() = Some(format!("delete {id} failed: {e}"));
            }
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Bulk delete — the one path that pauses the subscription
    // ------------------------------------------------------------------

    /// Delete every event matching the predicate.
    ///
    /// Unlike single-event writes this blocks until every delete is
    /// acknowledged, then waits out the settle delay before resuming the
    /// subscription, so the store's own propagation cannot re-deliver the
    /// deleted documents into a live listener. If some deletes fail, the
    /// local removal stands and the unconfirmed ids are reported — the next
    /// reconciliation corrects any true divergence.
    pub async fn bulk_delete(
        &self,
        predicate: impl Fn(&CampaignEvent) -> bool,
    ) -> Result<Vec<String>, CalendarError> {
        let shared = self.active()?;

        *shared.phase.lock() = SyncPhase::PausedForBulkOp;
        log::info!(
            "client {}: subscription paused for bulk delete",
            shared.client_id
        );

        let mut ids: Vec<String> = {
            let mut store = shared.store.lock();
            store.remove_where(&predicate).iter().map(|e| e.id.clone()).collect()
        };
        ids.sort();

        let mut failed_ids: Vec<String> = Vec::new();
        for id in &ids {
            if let Err(e) = self.gateway.delete_document(EVENTS_COLLECTION, id).await {
                log::warn!("bulk delete: {id} did not confirm: {e}");
                failed_ids.push(id.clone());
            }
        }

        // Settle: let the store's internal propagation finish before we
        // consume snapshots again.
        tokio::time::sleep(self.settle_delay).await;
        *shared.phase.lock() = SyncPhase::Listening;
        log::info!(
            "client {}: bulk delete of {} event(s) complete, subscription resumed",
            shared.client_id,
            ids.len()
        );

        if failed_ids.is_empty() {
            Ok(ids)
        } else {
            Err(CalendarError::PartialBulkFailure { failed_ids })
        }
    }

    /// Bulk delete scoped to one calendar month.
    pub async fn bulk_delete_month(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<String>, CalendarError> {
        self.bulk_delete(|event| event.in_month(year, month)).await
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        if let Some(session) = self.session.lock().take() {
            session.listener.abort();
        }
    }
}

// ----------------------------------------------------------------------
// Listener task
// ----------------------------------------------------------------------

async fn run_listener(gateway: Arc<dyn DocumentStore>, shared: Arc<SessionShared>) {
    let filter = DocumentFilter::client(&shared.client_id);
    let mut attempts: u32 = 0;

    loop {
        match gateway.subscribe(EVENTS_COLLECTION, filter.clone()).await {
            Ok(mut subscription) => {
                attempts = 0;
                *shared.health.lock() = ConnectionHealth::Live;
                while let Some(snapshot) = subscription.snapshots.recv().await {
                    reconcile(&shared, snapshot);
                }
                log::warn!("client {}: subscription closed", shared.client_id);
            }
            Err(e) => {
                log::warn!("client {}: subscribe failed: {e}", shared.client_id);
            }
        }

        attempts += 1;
        if attempts > MAX_RESUBSCRIBE_ATTEMPTS {
            *shared.health.lock() = ConnectionHealth::Offline;
            log::warn!(
                "client {}: giving up after {MAX_RESUBSCRIBE_ATTEMPTS} resubscribe attempts; offline",
                shared.client_id
            );
            return;
        }
        *shared.health.lock() = ConnectionHealth::Degraded;
        let backoff = (RESUBSCRIBE_BASE_BACKOFF_MS << attempts.saturating_sub(1).min(5))
            .min(RESUBSCRIBE_MAX_BACKOFF_MS);
        tokio::time::sleep(Duration::from_millis(backoff)).await;
    }
}

/// Apply one incoming snapshot. Listening → wholesale replacement;
/// PausedForBulkOp → discard, so a stale snapshot cannot resurrect events a
/// bulk delete already removed.
fn reconcile(shared: &SessionShared, snapshot: Snapshot) {
    if *shared.phase.lock() == SyncPhase::PausedForBulkOp {
        log::info!(
            "client {}: discarding snapshot ({} doc(s)) during bulk operation",
            shared.client_id,
            snapshot.documents.len()
        );
        return;
    }

    let mut events: Vec<CampaignEvent> = Vec::with_capacity(snapshot.documents.len());
    for document in &snapshot.documents {
        match CampaignEvent::from_document(&document.id, &document.data, false) {
            Ok(event) => events.push(event),
            Err(e) => log::warn!(
                "client {}: skipping malformed remote document: {e}",
                shared.client_id
            ),
        }
    }

    log::debug!(
        "client {}: reconciled {} event(s) from snapshot",
        shared.client_id,
        events.len()
    );
    shared.store.lock().replace_all(events);
    shared.loaded.send_replace(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::{
        CancelHandle, DocStoreError, Document, MemoryStore, Subscription,
    };
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tokio::sync::mpsc;

    const LOAD_TIMEOUT: Duration = Duration::from_secs(2);

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn event_doc(client: &str, day: u32, title: &str) -> serde_json::Value {
        serde_json::json!({
            "clientId": client,
            "date": format!("2025-09-{day:02}"),
            "title": title,
            "campaignType": "rrb_promotion",
            "lastModified": "2025-09-01T00:00:00Z",
        })
    }

    async fn seed_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .set_document(EVENTS_COLLECTION, "e1", event_doc("acme", 5, "Fall Sale"), false)
            .await
            .unwrap();
        store
            .set_document(EVENTS_COLLECTION, "e2", event_doc("acme", 15, "Cheese Club"), false)
            .await
            .unwrap();
        store
            .set_document(EVENTS_COLLECTION, "g1", event_doc("globex", 7, "Other"), false)
            .await
            .unwrap();
        store
    }

    fn make_controller(store: &MemoryStore) -> SyncController {
        SyncController::new(Arc::new(store.clone()), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_select_client_loads_initial_snapshot() {
        let store = seed_store().await;
        let controller = make_controller(&store);
        controller.select_client("acme");
        assert!(controller.wait_until_loaded(LOAD_TIMEOUT).await);

        let mut titles: Vec<String> = controller
            .list_events()
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["Cheese Club", "Fall Sale"]);
    }

    #[tokio::test]
    async fn test_create_is_optimistic_and_persists() {
        let store = seed_store().await;
        let controller = make_controller(&store);
        controller.select_client("acme");
        controller.wait_until_loaded(LOAD_TIMEOUT).await;

        let event = controller
            .create_event(date("2025-09-20"), "SMS blast", "", CampaignType::SmsAlert)
            .unwrap();
        // Visible locally before the write settles.
        assert!(controller.list_events().unwrap().iter().any(|e| e.id == event.id));

        assert!(controller.flush(Duration::from_secs(2)).await);
        let persisted = store
            .get_document(EVENTS_COLLECTION, &event.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted.data["title"], "SMS blast");
        assert!(controller.take_write_error().is_none());
    }

    #[tokio::test]
    async fn test_update_twice_is_idempotent() {
        let store = seed_store().await;
        let controller = make_controller(&store);
        controller.select_client("acme");
        controller.wait_until_loaded(LOAD_TIMEOUT).await;

        let updates = EventUpdates {
            title: Some("Fall Mega Sale".to_string()),
            campaign_type: Some(CampaignType::CheeseClub),
            ..EventUpdates::default()
        };
        let first = controller.update_event("e1", &updates).unwrap();
        let second = controller.update_event("e1", &updates).unwrap();

        assert_eq!(first.title, second.title);
        assert_eq!(first.campaign_type, second.campaign_type);
        assert_eq!(first.date, second.date);
        assert_eq!(first.content, second.content);
        assert_eq!(controller.list_events().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_missing_event_is_not_found() {
        let store = seed_store().await;
        let controller = make_controller(&store);
        controller.select_client("acme");
        controller.wait_until_loaded(LOAD_TIMEOUT).await;

        assert!(matches!(
            controller.delete_event("ghost"),
            Err(CalendarError::NotFound(_))
        ));
    }

    // ------------------------------------------------------------------
    // Failure-injection backends
    // ------------------------------------------------------------------

    /// Writes always fail; the subscription opens but never delivers, and
    /// stays open until cancelled.
    struct FailingWriteStore;

    #[async_trait]
    impl DocumentStore for FailingWriteStore {
        async fn get_document(
            &self,
            _collection: &str,
            _id: &str,
        ) -> Result<Option<Document>, DocStoreError> {
            Ok(None)
        }

        async fn set_document(
            &self,
            _collection: &str,
            _id: &str,
            _data: serde_json::Value,
            _merge: bool,
        ) -> Result<(), DocStoreError> {
            Err(DocStoreError::Transport("wire down".to_string()))
        }

        async fn delete_document(&self, _collection: &str, _id: &str) -> Result<(), DocStoreError> {
            Err(DocStoreError::Transport("wire down".to_string()))
        }

        async fn subscribe(
            &self,
            collection: &str,
            _filter: DocumentFilter,
        ) -> Result<Subscription, DocStoreError> {
            let (sender, receiver) = mpsc::channel(1);
            let _ = sender
                .try_send(Snapshot {
                    collection: collection.to_string(),
                    documents: Vec::new(),
                });
            // Keep the channel open by moving the sender into the handle.
            Ok(Subscription {
                snapshots: receiver,
                handle: CancelHandle::new(move || drop(sender)),
            })
        }
    }

    #[tokio::test]
    async fn test_failed_create_rolls_back_and_surfaces_once() {
        let controller =
            SyncController::new(Arc::new(FailingWriteStore), Duration::from_millis(10));
        controller.select_client("acme");
        controller.wait_until_loaded(LOAD_TIMEOUT).await;

        let event = controller
            .create_event(date("2025-09-20"), "Doomed", "", CampaignType::Default)
            .unwrap();
        // Optimistically present...
        assert!(controller.list_events().unwrap().iter().any(|e| e.id == event.id));

        controller.flush(Duration::from_secs(2)).await;
        // ...rolled back after the write failed.
        assert!(controller.list_events().unwrap().is_empty());
        let surfaced = controller.take_write_error().unwrap();
        assert!(surfaced.contains("create"));
        // Surfaced once: the slot is drained.
        assert!(controller.take_write_error().is_none());
    }

    /// Writes succeed, deletes fail. Everything delegates to an inner
    /// in-memory store.
    struct DeleteFailStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl DocumentStore for DeleteFailStore {
        async fn get_document(
            &self,
            collection: &str,
            id: &str,
        ) -> Result<Option<Document>, DocStoreError> {
            self.inner.get_document(collection, id).await
        }

        async fn set_document(
            &self,
            collection: &str,
            id: &str,
            data: serde_json::Value,
            merge: bool,
        ) -> Result<(), DocStoreError> {
            self.inner.set_document(collection, id, data, merge).await
        }

        async fn delete_document(&self, _collection: &str, _id: &str) -> Result<(), DocStoreError> {
            Err(DocStoreError::Transport("wire down".to_string()))
        }

        async fn subscribe(
            &self,
            collection: &str,
            filter: DocumentFilter,
        ) -> Result<Subscription, DocStoreError> {
            self.inner.subscribe(collection, filter).await
        }
    }

    #[tokio::test]
    async fn test_failed_delete_reinserts_event() {
        let inner = seed_store().await;
        let gateway = DeleteFailStore {
            inner: inner.clone(),
        };
        let controller = SyncController::new(Arc::new(gateway), Duration::from_millis(10));
        controller.select_client("acme");
        controller.wait_until_loaded(LOAD_TIMEOUT).await;

        controller.delete_event("e1").unwrap();
        // Optimistically gone.
        assert!(!controller.list_events().unwrap().iter().any(|e| e.id == "e1"));

        controller.flush(Duration::from_secs(2)).await;
        // Rolled back once the delete failed.
        assert!(controller.list_events().unwrap().iter().any(|e| e.id == "e1"));
        assert!(controller.take_write_error().unwrap().contains("delete"));
    }

    // ------------------------------------------------------------------
    // Bulk delete
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_bulk_delete_clears_month_and_remote() {
        let store = seed_store().await;
        let controller = make_controller(&store);
        controller.select_client("acme");
        controller.wait_until_loaded(LOAD_TIMEOUT).await;

        let deleted = controller.bulk_delete_month(2025, 9).await.unwrap();
        assert_eq!(deleted.len(), 2);
        assert!(controller.list_events().unwrap().is_empty());

        // Remote documents for acme are gone; globex untouched.
        assert!(store
            .get_document(EVENTS_COLLECTION, "e1")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get_document(EVENTS_COLLECTION, "g1")
            .await
            .unwrap()
            .is_some());
        assert_eq!(controller.status().phase, "listening");
    }

    #[tokio::test]
    async fn test_stale_snapshot_during_bulk_delete_is_discarded() {
        let store = MemoryStore::new();
        for day in 1..=5u32 {
            store
                .set_document(
                    EVENTS_COLLECTION,
                    &format!("e{day}"),
                    event_doc("acme", day, &format!("Campaign {day}")),
                    false,
                )
                .await
                .unwrap();
        }
        let controller = make_controller(&store);
        controller.select_client("acme");
        controller.wait_until_loaded(LOAD_TIMEOUT).await;
        assert_eq!(controller.list_events().unwrap().len(), 5);

        // Capture the pre-delete documents to replay as a stale snapshot.
        let stale: Vec<Document> = (1..=5u32)
            .map(|day| Document {
                id: format!("e{day}"),
                data: event_doc("acme", day, &format!("Campaign {day}")),
            })
            .collect();

        let inject = async {
            // Mid-flight, before the settle delay elapses: re-deliver the
            // pre-delete state the way a lagging listener would.
            tokio::time::sleep(Duration::from_millis(50)).await;
            store.emit_snapshot(EVENTS_COLLECTION, stale);
        };
        let (result, ()) = tokio::join!(controller.bulk_delete_month(2025, 9), inject);
        assert_eq!(result.unwrap().len(), 5);

        // The stale snapshot must not have resurrected anything, and the
        // resumed subscription must agree.
        assert!(controller.list_events().unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(controller.list_events().unwrap().is_empty());
        assert_eq!(controller.status().phase, "listening");
    }

    /// Deletes fail for a fixed id set; everything else delegates to an
    /// inner in-memory store.
    struct PartialFailStore {
        inner: MemoryStore,
        failing_ids: Vec<String>,
    }

    #[async_trait]
    impl DocumentStore for PartialFailStore {
        async fn get_document(
            &self,
            collection: &str,
            id: &str,
        ) -> Result<Option<Document>, DocStoreError> {
            self.inner.get_document(collection, id).await
        }

        async fn set_document(
            &self,
            collection: &str,
            id: &str,
            data: serde_json::Value,
            merge: bool,
        ) -> Result<(), DocStoreError> {
            self.inner.set_document(collection, id, data, merge).await
        }

        async fn delete_document(&self, collection: &str, id: &str) -> Result<(), DocStoreError> {
            if self.failing_ids.iter().any(|f| f == id) {
                return Err(DocStoreError::Transport("wire down".to_string()));
            }
            self.inner.delete_document(collection, id).await
        }

        async fn subscribe(
            &self,
            collection: &str,
            filter: DocumentFilter,
        ) -> Result<Subscription, DocStoreError> {
            self.inner.subscribe(collection, filter).await
        }
    }

    #[tokio::test]
    async fn test_partial_bulk_failure_reports_ids_and_keeps_local_removal() {
        let inner = seed_store().await;
        let gateway = PartialFailStore {
            inner: inner.clone(),
            failing_ids: vec!["e2".to_string()],
        };
        let controller = SyncController::new(Arc::new(gateway), Duration::from_millis(50));
        controller.select_client("acme");
        controller.wait_until_loaded(LOAD_TIMEOUT).await;

        let err = controller.bulk_delete_month(2025, 9).await.unwrap_err();
        match err {
            CalendarError::PartialBulkFailure { failed_ids } => {
                assert_eq!(failed_ids, vec!["e2".to_string()]);
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
        // Local removal stands even for the unconfirmed id.
        assert!(controller.list_events().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_select_client_cancels_previous_subscription() {
        let store = seed_store().await;
        let controller = make_controller(&store);
        controller.select_client("acme");
        controller.wait_until_loaded(LOAD_TIMEOUT).await;
        assert_eq!(controller.list_events().unwrap().len(), 2);

        controller.select_client("globex");
        controller.wait_until_loaded(LOAD_TIMEOUT).await;
        let events = controller.list_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].client_id, "globex");

        // A later acme change must not leak into the globex session.
        store
            .set_document(EVENTS_COLLECTION, "e3", event_doc("acme", 25, "Late"), false)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(controller.list_events().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_applies_remote_changes_while_listening() {
        let store = seed_store().await;
        let controller = make_controller(&store);
        controller.select_client("acme");
        controller.wait_until_loaded(LOAD_TIMEOUT).await;

        store
            .set_document(EVENTS_COLLECTION, "e9", event_doc("acme", 9, "Pushed"), false)
            .await
            .unwrap();

        // The subscription delivers the authoritative snapshot shortly.
        let mut found = false;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            if controller
                .list_events()
                .unwrap()
                .iter()
                .any(|e| e.title == "Pushed")
            {
                found = true;
                break;
            }
        }
        assert!(found, "remote change never reconciled");
    }
}
