//! Command surface.
//!
//! Thin orchestration over the controller, goal persistence, and the
//! assistant loop. Every function takes `&AppState` and returns
//! `Result<T, String>` so callers (CLI today, IPC shells tomorrow) get a
//! display-ready error without knowing the internal taxonomy.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::approval::ApprovalAction;
use crate::assistant::protocol::{self, ActionCommand};
use crate::assistant::{prompts, AssistantError};
use crate::docstore::{DocumentStore, CLIENTS_COLLECTION};
use crate::error::{CalendarError, CommandError};
use crate::goals::{self, GoalUpdate};
use crate::helpers::format_display_text;
use crate::revenue;
use crate::state::AppState;
use crate::types::{
    CampaignEvent, CampaignType, ChatOutcome, Client, EventUpdates, ExecutedAction, Goal,
    GoalProgress, MonthOverview, Recommendation, SyncStatusView,
};

/// How long `select_client` waits for the first authoritative snapshot.
const INITIAL_LOAD_TIMEOUT: Duration = Duration::from_secs(5);

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Structured error for the chat surface: the shell renders `message` and
/// keys retry affordances off `kind` (and `failedIds` for bulk failures).
fn command_error(e: &CalendarError) -> String {
    serde_json::to_string(&CommandError::from(e)).unwrap_or_else(|_| e.to_string())
}

// ============================================================================
// Client session
// ============================================================================

/// Select the active client: tears down the previous sync session, opens a
/// new one, and resolves the client's display name. Returns the name.
pub async fn select_client(state: &AppState, client_id: &str) -> Result<String, String> {
    state.controller.select_client(client_id);
    state.clear_chat_history();

    let name = match state.gateway.get_document(CLIENTS_COLLECTION, client_id).await {
        Ok(Some(doc)) => Client::from_document(client_id, &doc.data)
            .map(|c| c.name)
            .unwrap_or_else(|_| client_id.to_string()),
        Ok(None) => client_id.to_string(),
        Err(e) => {
            log::warn!("could not read client document for {client_id}: {e}");
            client_id.to_string()
        }
    };
    if let Ok(mut guard) = state.active_client_name.lock() {
        *guard = Some(name.clone());
    }

    if !state.controller.wait_until_loaded(INITIAL_LOAD_TIMEOUT).await {
        log::warn!("initial snapshot for {client_id} not received yet; continuing");
    }
    Ok(name)
}

/// Import events embedded in the legacy client document (`campaignData`
/// map) into the normalized per-event collection. Returns how many were
/// written; the live subscription then reconciles them in.
pub async fn import_legacy_events(state: &AppState) -> Result<usize, String> {
    let client_id = state
        .controller
        .client_id()
        .ok_or("No client selected")?;

    let doc = state
        .gateway
        .get_document(CLIENTS_COLLECTION, &client_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Client {client_id} not found"))?;
    let client = Client::from_document(&client_id, &doc.data).map_err(|e| e.to_string())?;

    let events = client.embedded_events();
    let mut imported = 0usize;
    for event in &events {
        state
            .gateway
            .set_document(
                crate::docstore::EVENTS_COLLECTION,
                &event.id,
                event.to_document(),
                true,
            )
            .await
            .map_err(|e| format!("Import stopped at event {}: {e}", event.id))?;
        imported += 1;
    }
    log::info!("imported {imported} legacy event(s) for client {client_id}");
    Ok(imported)
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub date: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Explicit type. When absent the type is detected from title/content.
    #[serde(default)]
    pub campaign_type: Option<String>,
}

pub fn list_events(state: &AppState) -> Result<Vec<CampaignEvent>, String> {
    state.controller.list_events().map_err(|e| e.to_string())
}

pub fn create_event(
    state: &AppState,
    request: CreateEventRequest,
) -> Result<CampaignEvent, String> {
    let date = NaiveDate::parse_from_str(request.date.trim(), "%Y-%m-%d").map_err(|_| {
        CalendarError::Validation(format!(
            "unparseable date {:?} (expected YYYY-MM-DD)",
            request.date
        ))
        .to_string()
    })?;

    let campaign_type = match &request.campaign_type {
        Some(raw) => CampaignType::parse(raw).ok_or_else(|| {
            CalendarError::Validation(format!("unknown campaign type {raw:?}")).to_string()
        })?,
        None => revenue::detect_campaign_type(&request.title, &request.content),
    };

    state
        .controller
        .create_event(date, &request.title, &request.content, campaign_type)
        .map_err(|e| e.to_string())
}

pub fn update_event(
    state: &AppState,
    event_id: &str,
    updates: &EventUpdates,
) -> Result<CampaignEvent, String> {
    if updates.is_empty() {
        return Err(CalendarError::Validation("update carries no fields".to_string()).to_string());
    }
    state
        .controller
        .update_event(event_id, updates)
        .map_err(|e| e.to_string())
}

pub fn delete_event(state: &AppState, event_id: &str) -> Result<(), String> {
    state
        .controller
        .delete_event(event_id)
        .map_err(|e| e.to_string())
}

/// Delete every event in the given month. Blocks until all deletes are
/// acknowledged (or reported failed) and the subscription has resumed.
pub async fn bulk_delete_month(
    state: &AppState,
    year: i32,
    month: u32,
) -> Result<Vec<String>, String> {
    state
        .controller
        .bulk_delete_month(year, month)
        .await
        .map_err(|e| e.to_string())
}

/// Apply an approval-status transition to one event.
pub fn transition_approval(
    state: &AppState,
    event_id: &str,
    action: ApprovalAction,
) -> Result<CampaignEvent, String> {
    let now = Utc::now();
    state
        .controller
        .mutate_event(event_id, |event| {
            crate::approval::apply_transition(event, action, now).map(|_| ())
        })
        .map_err(|e| e.to_string())
}

// ============================================================================
// Goals
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgressView {
    pub estimate: f64,
    pub goal: Option<Goal>,
    pub progress: Option<GoalProgress>,
    pub recommendations: Vec<Recommendation>,
}

pub async fn get_goal(state: &AppState, year: i32, month: u32) -> Result<Option<Goal>, String> {
    let client_id = state.controller.client_id().ok_or("No client selected")?;
    goals::fetch_goal(state.gateway.as_ref(), &client_id, year, month)
        .await
        .map_err(|e| e.to_string())
}

pub async fn set_goal(
    state: &AppState,
    year: i32,
    month: u32,
    update: GoalUpdate,
) -> Result<Goal, String> {
    let client_id = state.controller.client_id().ok_or("No client selected")?;
    goals::save_goal(state.gateway.as_ref(), &client_id, year, month, update)
        .await
        .map_err(|e| e.to_string())
}

/// Estimate, progress, and pacing recommendations for one month.
pub async fn goal_progress(
    state: &AppState,
    year: i32,
    month: u32,
) -> Result<GoalProgressView, String> {
    let events = state.controller.list_events().map_err(|e| e.to_string())?;
    let config = state.config_snapshot();
    let estimate =
        revenue::estimate_revenue(&events, year, month, config.base_revenue_per_campaign);

    let goal = get_goal(state, year, month).await?;
    let now = today();
    let (progress, recommendations) = match &goal {
        Some(goal) => (
            Some(revenue::progress(goal, estimate, now)),
            revenue::recommend_with_base(goal, &events, now, config.base_revenue_per_campaign),
        ),
        None => (None, Vec::new()),
    };

    Ok(GoalProgressView {
        estimate,
        goal,
        progress,
        recommendations,
    })
}

/// Aggregate month view: counts, estimate, goal progress.
pub async fn month_overview(
    state: &AppState,
    year: i32,
    month: u32,
) -> Result<MonthOverview, String> {
    let events = state.controller.list_events().map_err(|e| e.to_string())?;
    let config = state.config_snapshot();

    let month_events: Vec<&CampaignEvent> =
        events.iter().filter(|e| e.in_month(year, month)).collect();
    let mut counts_by_type: BTreeMap<String, usize> = BTreeMap::new();
    for event in &month_events {
        *counts_by_type
            .entry(event.campaign_type.as_str().to_string())
            .or_insert(0) += 1;
    }

    let estimate =
        revenue::estimate_revenue(&events, year, month, config.base_revenue_per_campaign);
    let goal = get_goal(state, year, month).await?;
    let goal_progress = goal
        .as_ref()
        .map(|g| revenue::progress(g, estimate, today()));

    Ok(MonthOverview {
        year,
        month,
        event_count: month_events.len(),
        counts_by_type,
        estimated_revenue: estimate,
        goal_target: goal.as_ref().map(|g| g.revenue_goal),
        goal_progress,
    })
}

// ============================================================================
// Chat
// ============================================================================

/// One chat exchange: send the utterance with calendar context, then either
/// display the prose reply or validate-and-execute the returned action.
pub async fn send_chat(state: &AppState, utterance: &str) -> Result<ChatOutcome, String> {
    let client_id = state.controller.client_id().ok_or("No client selected")?;
    let now = today();
    let (year, month) = (now.year(), now.month());

    let events = state.controller.list_events().map_err(|e| e.to_string())?;
    let config = state.config_snapshot();
    let goal = goals::fetch_goal(state.gateway.as_ref(), &client_id, year, month)
        .await
        .map_err(|e| e.to_string())?;
    let client_name = state
        .active_client_name
        .lock()
        .ok()
        .and_then(|guard| guard.clone())
        .unwrap_or_else(|| client_id.clone());

    let context = prompts::build_calendar_context(
        &client_name,
        year,
        month,
        &events,
        goal.as_ref(),
        config.base_revenue_per_campaign,
        now,
    );
    let history = state.chat_history_snapshot();

    let reply = match state.assistant.send(&context, &history, utterance).await {
        Ok(reply) => reply,
        Err(AssistantError::Disabled) => return Err(AssistantError::Disabled.to_string()),
        Err(e) => return Err(format!("Assistant request failed: {e}")),
    };

    match protocol::parse(&reply) {
        // Malformed action attempt: surfaced, never silently shown as prose.
        Err(e) => Err(command_error(&e)),
        Ok(None) => {
            state.append_chat_exchange(utterance, &reply);
            Ok(ChatOutcome {
                reply: format_display_text(&reply),
                executed: None,
            })
        }
        Ok(Some(command)) => {
            state
                .controller
                .with_store(|store| command.validate(store))
                .map_err(|e| command_error(&e))?
                .map_err(|e| command_error(&e))?;

            let (confirmation, executed) = execute_action(state, &command, year, month)
                .await
                .map_err(|e| command_error(&e))?;
            state.append_chat_exchange(utterance, &confirmation);
            Ok(ChatOutcome {
                reply: format_display_text(&confirmation),
                executed: Some(executed),
            })
        }
    }
}

async fn execute_action(
    state: &AppState,
    command: &ActionCommand,
    year: i32,
    month: u32,
) -> Result<(String, ExecutedAction), CalendarError> {
    match command {
        ActionCommand::Create { event } => {
            let date = event.parsed_date()?;
            let campaign_type = revenue::detect_campaign_type(&event.title, &event.content);
            let created =
                state
                    .controller
                    .create_event(date, &event.title, &event.content, campaign_type)?;
            Ok((
                format!(
                    "Created \"{}\" on {} as {}.",
                    created.title,
                    created.date,
                    created.campaign_type.display_name()
                ),
                ExecutedAction {
                    action: "create".to_string(),
                    event_ids: vec![created.id],
                },
            ))
        }
        ActionCommand::Update { event_id, updates } => {
            let updated = state.controller.update_event(event_id, updates)?;
            Ok((
                format!("Updated \"{}\".", updated.title),
                ExecutedAction {
                    action: "update".to_string(),
                    event_ids: vec![updated.id],
                },
            ))
        }
        ActionCommand::Delete { event_id } => {
            let event = state.controller.get_event(event_id)?;
            state.controller.delete_event(event_id)?;
            Ok((
                format!("Deleted \"{}\".", event.title),
                ExecutedAction {
                    action: "delete".to_string(),
                    event_ids: vec![event.id],
                },
            ))
        }
        ActionCommand::DeleteAll => {
            let ids = state.controller.bulk_delete_month(year, month).await?;
            Ok((
                format!("Deleted {} campaign(s) from {year}-{month:02}.", ids.len()),
                ExecutedAction {
                    action: "delete_all".to_string(),
                    event_ids: ids,
                },
            ))
        }
    }
}

// ============================================================================
// Status
// ============================================================================

pub fn sync_status(state: &AppState) -> Result<SyncStatusView, String> {
    Ok(state.controller.status())
}
