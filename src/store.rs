//! In-memory campaign store for the active client.
//!
//! Pure data holder: no I/O, mutated only by the sync controller. Iteration
//! order is not significant — callers must not rely on it.

use std::collections::HashMap;

use crate::error::CalendarError;
use crate::types::CampaignEvent;

#[derive(Debug, Default)]
pub struct CampaignStore {
    events: HashMap<String, CampaignEvent>,
}

impl CampaignStore {
    pub fn new() -> CampaignStore {
        CampaignStore {
            events: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.events.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<CampaignEvent> {
        self.events.get(id).cloned()
    }

    /// All events, in no particular order.
    pub fn list(&self) -> Vec<CampaignEvent> {
        self.events.values().cloned().collect()
    }

    /// Insert or replace by id. Idempotent for identical input. Rejects an
    /// event with an empty title (date and campaign type are already
    /// guaranteed well-formed by the typed constructor at the store
    /// boundary).
    pub fn upsert(&mut self, event: CampaignEvent) -> Result<(), CalendarError> {
        if event.title.trim().is_empty() {
            return Err(CalendarError::Validation(format!(
                "event {}: title cannot be empty",
                event.id
            )));
        }
        self.events.insert(event.id.clone(), event);
        Ok(())
    }

    /// Remove one event, returning it if present.
    pub fn remove(&mut self, id: &str) -> Option<CampaignEvent> {
        self.events.remove(id)
    }

    /// Remove every event matching the predicate, returning the removed set.
    pub fn remove_where(
        &mut self,
        predicate: impl Fn(&CampaignEvent) -> bool,
    ) -> Vec<CampaignEvent> {
        let ids: Vec<String> = self
            .events
            .values()
            .filter(|e| predicate(e))
            .map(|e| e.id.clone())
            .collect();
        ids.iter().filter_map(|id| self.events.remove(id)).collect()
    }

    /// Wholesale replacement with an authoritative snapshot.
    pub fn replace_all(&mut self, events: Vec<CampaignEvent>) {
        self.events.clear();
        for event in events {
            self.events.insert(event.id.clone(), event);
        }
    }
}
