//! Goal document persistence.
//!
//! Goals are keyed by (client, year, month) — one document per month. An
//! override of an existing goal appends the prior value to the version list
//! with provenance; history is never truncated. An absent goal is a normal
//! `Ok(None)`, never an error swallowed into an empty default.

use chrono::Utc;

use crate::docstore::{DocStoreError, DocumentStore, GOALS_COLLECTION};
use crate::error::CalendarError;
use crate::types::{CalculationMethod, Goal, GoalVersion};

/// Document id for a (client, year, month) goal.
pub fn goal_doc_id(client_id: &str, year: i32, month: u32) -> String {
    format!("{client_id}_{year}_{month:02}")
}

/// Fields a caller supplies when creating or overriding a goal.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalUpdate {
    pub revenue_goal: f64,
    #[serde(default)]
    pub calculation_method: CalculationMethod,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub changed_by: Option<String>,
}

fn map_store_error(e: DocStoreError) -> CalendarError {
    match e {
        DocStoreError::NotFound(what) => CalendarError::NotFound(what),
        other => CalendarError::TransientIo(other.to_string()),
    }
}

/// Fetch the goal for (client, year, month), if one exists.
pub async fn fetch_goal(
    store: &dyn DocumentStore,
    client_id: &str,
    year: i32,
    month: u32,
) -> Result<Option<Goal>, CalendarError> {
    let id = goal_doc_id(client_id, year, month);
    let document = store
        .get_document(GOALS_COLLECTION, &id)
        .await
        .map_err(map_store_error)?;

    match document {
        None => Ok(None),
        Some(doc) => {
            let goal: Goal = serde_json::from_value(doc.data)
                .map_err(|e| CalendarError::Validation(format!("goal {id}: {e}")))?;
            Ok(Some(goal))
        }
    }
}

/// Create or override the goal for (client, year, month).
///
/// When a goal already exists, its current value is appended to `versions`
/// before the new value is written, and the override audit fields are set.
pub async fn save_goal(
    store: &dyn DocumentStore,
    client_id: &str,
    year: i32,
    month: u32,
    update: GoalUpdate,
) -> Result<Goal, CalendarError> {
    if update.revenue_goal < 0.0 {
        return Err(CalendarError::Validation(
            "revenueGoal must be non-negative".to_string(),
        ));
    }
    if month == 0 || month > 12 {
        return Err(CalendarError::Validation(format!(
            "month {month} out of range"
        )));
    }

    let now = Utc::now();
    let existing = fetch_goal(store, client_id, year, month).await?;

    let goal = match existing {
        None => Goal {
            client_id: client_id.to_string(),
            year,
            month,
            revenue_goal: update.revenue_goal,
            calculation_method: update.calculation_method,
            confidence: update.confidence,
            notes: update.notes,
            human_override: false,
            human_override_by: None,
            human_override_at: None,
            versions: Vec::new(),
            last_modified: now,
        },
        Some(mut prior) => {
            prior.versions.push(GoalVersion {
                revenue_goal: prior.revenue_goal,
                calculation_method: prior.calculation_method,
                notes: prior.notes.clone(),
                recorded_at: prior.last_modified,
                changed_by: prior.human_override_by.clone(),
            });
            prior.revenue_goal = update.revenue_goal;
            prior.calculation_method = update.calculation_method;
            prior.confidence = update.confidence;
            prior.notes = update.notes;
            prior.human_override = true;
            prior.human_override_by = update.changed_by.clone();
            prior.human_override_at = Some(now);
            prior.last_modified = now;
            prior
        }
    };

    let id = goal_doc_id(client_id, year, month);
    let data = serde_json::to_value(&goal)
        .map_err(|e| CalendarError::Validation(format!("goal {id}: {e}")))?;
    store
        .set_document(GOALS_COLLECTION, &id, data, true)
        .await
        .map_err(map_store_error)?;

    log::info!(
        "goal saved for {client_id} {year}-{month:02}: target {}",
        goal.revenue_goal
    );
    Ok(goal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::MemoryStore;

    fn make_update(target: f64, by: Option<&str>) -> GoalUpdate {
        GoalUpdate {
            revenue_goal: target,
            calculation_method: CalculationMethod::Manual,
            confidence: None,
            notes: String::new(),
            changed_by: by.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_fetch_absent_goal_is_none() {
        let store = MemoryStore::new();
        let goal = fetch_goal(&store, "acme", 2025, 9).await.unwrap();
        assert!(goal.is_none());
    }

    #[tokio::test]
    async fn test_save_then_fetch_round_trip() {
        let store = MemoryStore::new();
        save_goal(&store, "acme", 2025, 9, make_update(1000.0, None))
            .await
            .unwrap();

        let goal = fetch_goal(&store, "acme", 2025, 9).await.unwrap().unwrap();
        assert_eq!(goal.revenue_goal, 1000.0);
        assert!(goal.versions.is_empty());
        assert!(!goal.human_override);
    }

    #[tokio::test]
    async fn test_override_appends_version() {
        let store = MemoryStore::new();
        save_goal(&store, "acme", 2025, 9, make_update(1000.0, None))
            .await
            .unwrap();
        let overridden = save_goal(&store, "acme", 2025, 9, make_update(2000.0, Some("dana")))
            .await
            .unwrap();

        assert_eq!(overridden.revenue_goal, 2000.0);
        assert!(overridden.human_override);
        assert_eq!(overridden.human_override_by.as_deref(), Some("dana"));
        assert_eq!(overridden.versions.len(), 1);
        assert_eq!(overridden.versions[0].revenue_goal, 1000.0);

        // A second override keeps the full history.
        let again = save_goal(&store, "acme", 2025, 9, make_update(3000.0, Some("dana")))
            .await
            .unwrap();
        assert_eq!(again.versions.len(), 2);
        assert_eq!(again.versions[1].revenue_goal, 2000.0);
    }

    #[tokio::test]
    async fn test_rejects_negative_goal() {
        let store = MemoryStore::new();
        let err = save_goal(&store, "acme", 2025, 9, make_update(-5.0, None))
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::Validation(_)));
    }

    #[test]
    fn test_goal_doc_id_zero_pads_month() {
        assert_eq!(goal_doc_id("acme", 2025, 9), "acme_2025_09");
        assert_eq!(goal_doc_id("acme", 2025, 12), "acme_2025_12");
    }
}
