//! Core domain types shared across the crate.
//!
//! Everything that crosses the document-store boundary is serde camelCase
//! with `#[serde(default)]` on optional fields, so older documents written
//! by earlier schema versions keep deserializing.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;
use crate::helpers::normalize_key;

// ============================================================================
// Campaign types
// ============================================================================

/// Enumerated campaign categories. Each drives a revenue multiplier
/// (`revenue::multiplier`) and a display color for the month grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignType {
    RrbPromotion,
    CheeseClub,
    NurturingEducation,
    CommunityLifestyle,
    Reengagement,
    SmsAlert,
    #[default]
    Default,
}

impl CampaignType {
    pub const ALL: [CampaignType; 7] = [
        CampaignType::RrbPromotion,
        CampaignType::CheeseClub,
        CampaignType::NurturingEducation,
        CampaignType::CommunityLifestyle,
        CampaignType::Reengagement,
        CampaignType::SmsAlert,
        CampaignType::Default,
    ];

    /// Wire name (what documents store).
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignType::RrbPromotion => "rrb_promotion",
            CampaignType::CheeseClub => "cheese_club",
            CampaignType::NurturingEducation => "nurturing_education",
            CampaignType::CommunityLifestyle => "community_lifestyle",
            CampaignType::Reengagement => "reengagement",
            CampaignType::SmsAlert => "sms_alert",
            CampaignType::Default => "default",
        }
    }

    /// Human-facing label used on the calendar grid and in assistant context.
    pub fn display_name(&self) -> &'static str {
        match self {
            CampaignType::RrbPromotion => "RRB Promotion",
            CampaignType::CheeseClub => "Cheese Club",
            CampaignType::NurturingEducation => "Nurturing/Education",
            CampaignType::CommunityLifestyle => "Community/Lifestyle",
            CampaignType::Reengagement => "Re-engagement",
            CampaignType::SmsAlert => "SMS Alert",
            CampaignType::Default => "Default",
        }
    }

    /// Display color hex for the month grid chip.
    pub fn display_color(&self) -> &'static str {
        match self {
            CampaignType::RrbPromotion => "#d97706",
            CampaignType::CheeseClub => "#eab308",
            CampaignType::NurturingEducation => "#2563eb",
            CampaignType::CommunityLifestyle => "#16a34a",
            CampaignType::Reengagement => "#9333ea",
            CampaignType::SmsAlert => "#dc2626",
            CampaignType::Default => "#6b7280",
        }
    }

    /// Parse a stored or user-supplied type string. Matching is on the
    /// normalized key, so the wire name and the display label (legacy
    /// documents stored the label) both resolve.
    pub fn parse(raw: &str) -> Option<CampaignType> {
        let key = normalize_key(raw);
        if key.is_empty() {
            return None;
        }
        CampaignType::ALL
            .into_iter()
            .find(|ty| normalize_key(ty.as_str()) == key)
    }
}

// ============================================================================
// Approval workflow
// ============================================================================

/// Per-event client sign-off status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    None,
    PendingApproval,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::None => "none",
            ApprovalStatus::PendingApproval => "pending_approval",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

// ============================================================================
// Campaign events
// ============================================================================

/// A single dated marketing action placed on the calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignEvent {
    pub id: String,
    /// Owning client. Every normalized event document carries this so the
    /// change subscription can filter per client.
    #[serde(default)]
    pub client_id: String,
    pub date: NaiveDate,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub campaign_type: CampaignType,
    #[serde(default)]
    pub approval_status: ApprovalStatus,
    /// Append-only map of status name → when the event last entered it.
    #[serde(default)]
    pub approval_timestamps: BTreeMap<String, DateTime<Utc>>,
    pub last_modified: DateTime<Utc>,
}

impl CampaignEvent {
    /// Create a new event with a client-generated collision-resistant id.
    pub fn new(
        client_id: &str,
        date: NaiveDate,
        title: &str,
        content: &str,
        campaign_type: CampaignType,
    ) -> CampaignEvent {
        CampaignEvent {
            id: format!("evt-{}", uuid::Uuid::new_v4()),
            client_id: client_id.to_string(),
            date,
            title: title.to_string(),
            content: content.to_string(),
            campaign_type,
            approval_status: ApprovalStatus::None,
            approval_timestamps: BTreeMap::new(),
            last_modified: Utc::now(),
        }
    }

    /// Whether the event falls in the given calendar month.
    pub fn in_month(&self, year: i32, month: u32) -> bool {
        use chrono::Datelike;
        self.date.year() == year && self.date.month() == month
    }

    /// Validating constructor for documents arriving from the store.
    ///
    /// Rejects a document with a missing/unparseable `date` or an unknown
    /// `campaignType`. When `coerce_unknown_type` is set, an unknown type is
    /// substituted with `default` instead of rejected (used by the legacy
    /// import path, where old documents carry free-form labels).
    pub fn from_document(
        id: &str,
        data: &serde_json::Value,
        coerce_unknown_type: bool,
    ) -> Result<CampaignEvent, CalendarError> {
        let date = data
            .get("date")
            .and_then(|d| d.as_str())
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .ok_or_else(|| {
                CalendarError::Validation(format!("event {id}: missing or unparseable date"))
            })?;

        let title = data
            .get("title")
            .and_then(|t| t.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CalendarError::Validation(format!("event {id}: missing title")))?;

        let campaign_type = match data.get("campaignType").and_then(|t| t.as_str()) {
            None => CampaignType::Default,
            Some(raw) => match CampaignType::parse(raw) {
                Some(ty) => ty,
                None if coerce_unknown_type => {
                    log::warn!("event {id}: unknown campaign type {raw:?}, using default");
                    CampaignType::Default
                }
                None => {
                    return Err(CalendarError::Validation(format!(
                        "event {id}: unknown campaign type {raw:?}"
                    )))
                }
            },
        };

        let approval_status = data
            .get("approvalStatus")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let approval_timestamps = data
            .get("approvalTimestamps")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let last_modified = data
            .get("lastModified")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(CampaignEvent {
            id: id.to_string(),
            client_id: data
                .get("clientId")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            date,
            title: title.to_string(),
            content: data
                .get("content")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            campaign_type,
            approval_status,
            approval_timestamps,
            last_modified,
        })
    }

    /// Document body for the store. The id lives on the document itself, not
    /// in the body.
    pub fn to_document(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.remove("id");
        }
        value
    }
}

/// Partial update for a campaign event. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_type: Option<CampaignType>,
}

impl EventUpdates {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.title.is_none()
            && self.content.is_none()
            && self.campaign_type.is_none()
    }

    /// Apply the update in place. Rejects an explicit empty title.
    pub fn apply(&self, event: &mut CampaignEvent, now: DateTime<Utc>) -> Result<(), CalendarError> {
        if let Some(ref title) = self.title {
            if title.trim().is_empty() {
                return Err(CalendarError::Validation(
                    "title cannot be empty".to_string(),
                ));
            }
        }
        if let Some(date) = self.date {
            event.date = date;
        }
        if let Some(ref title) = self.title {
            event.title = title.trim().to_string();
        }
        if let Some(ref content) = self.content {
            event.content = content.clone();
        }
        if let Some(campaign_type) = self.campaign_type {
            event.campaign_type = campaign_type;
        }
        event.last_modified = now;
        Ok(())
    }
}

// ============================================================================
// Clients
// ============================================================================

/// A client record. `campaign_data` is the legacy denormalized shape (event
/// id → event fields embedded in the client document). New writes use the
/// flat `campaign_events` collection; the embedded map is only read by the
/// legacy import path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub campaign_data: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Client {
    pub fn from_document(id: &str, data: &serde_json::Value) -> Result<Client, CalendarError> {
        let mut client: Client = serde_json::from_value(serde_json::json!({
            "id": id,
            "name": data.get("name").and_then(|n| n.as_str()).unwrap_or(id),
            "campaignData": data.get("campaignData").cloned().unwrap_or(serde_json::json!({})),
        }))
        .map_err(|e| CalendarError::Validation(format!("client {id}: {e}")))?;
        client.last_modified = data
            .get("lastModified")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Ok(client)
    }

    /// Decode the legacy embedded event map, skipping (and logging) entries
    /// that fail validation. Unknown campaign types are coerced to `default`
    /// since legacy documents predate the fixed enumeration.
    pub fn embedded_events(&self) -> Vec<CampaignEvent> {
        let mut events: Vec<CampaignEvent> = Vec::with_capacity(self.campaign_data.len());
        for (event_id, fields) in &self.campaign_data {
            match CampaignEvent::from_document(event_id, fields, true) {
                Ok(mut event) => {
                    event.client_id = self.id.clone();
                    events.push(event);
                }
                Err(e) => log::warn!("client {}: skipping embedded event: {}", self.id, e),
            }
        }
        events
    }
}

// ============================================================================
// Goals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    #[default]
    Manual,
    AiSuggested,
    Historical,
}

/// Prior goal value preserved when a goal is overridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalVersion {
    pub revenue_goal: f64,
    pub calculation_method: CalculationMethod,
    #[serde(default)]
    pub notes: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub changed_by: Option<String>,
}

/// Monthly revenue goal for a client. At most one per (client, year, month);
/// overrides append to `versions`, never rewrite history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub client_id: String,
    pub year: i32,
    pub month: u32,
    pub revenue_goal: f64,
    #[serde(default)]
    pub calculation_method: CalculationMethod,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub human_override: bool,
    #[serde(default)]
    pub human_override_by: Option<String>,
    #[serde(default)]
    pub human_override_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub versions: Vec<GoalVersion>,
    pub last_modified: DateTime<Utc>,
}

/// Month-to-date goal progress derived by the revenue engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub percentage: f64,
    pub remaining: f64,
    pub is_on_track: bool,
    pub days_remaining: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    High,
    Medium,
    Low,
}

/// Advisory suggestion produced when goal progress trails the pacing curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub priority: RecommendationPriority,
    pub campaign_type: CampaignType,
    pub reason: String,
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Mutation confirmation attached to a chat reply when the assistant's
/// answer carried an executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedAction {
    pub action: String,
    #[serde(default)]
    pub event_ids: Vec<String>,
}

/// What the chat surface returns: display-formatted reply text plus the
/// executed mutation, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOutcome {
    pub reply: String,
    #[serde(default)]
    pub executed: Option<ExecutedAction>,
}

// ============================================================================
// Sync status
// ============================================================================

/// Subscription health for the active client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionHealth {
    #[default]
    Live,
    Degraded,
    Offline,
}

/// Read-only view of the sync controller, for status surfaces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusView {
    pub client_id: Option<String>,
    pub phase: String,
    pub health: ConnectionHealth,
    pub pending_writes: usize,
    pub last_write_error: Option<String>,
}

/// Aggregate view of one calendar month.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthOverview {
    pub year: i32,
    pub month: u32,
    pub event_count: usize,
    pub counts_by_type: BTreeMap<String, usize>,
    pub estimated_revenue: f64,
    pub goal_target: Option<f64>,
    pub goal_progress: Option<GoalProgress>,
}

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_BASE_REVENUE_PER_CAMPAIGN: f64 = 500.0;
pub const DEFAULT_BULK_SETTLE_DELAY_MS: u64 = 1_500;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

fn default_base_revenue() -> f64 {
    DEFAULT_BASE_REVENUE_PER_CAMPAIGN
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_BULK_SETTLE_DELAY_MS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

/// Remote document store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            base_url: String::new(),
            api_key: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

/// Assistant service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_assistant_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_assistant_model")]
    pub model: String,
}

fn default_assistant_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_assistant_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

impl Default for AssistantConfig {
    fn default() -> Self {
        AssistantConfig {
            enabled: false,
            api_url: default_assistant_url(),
            api_key: None,
            model: default_assistant_model(),
        }
    }
}

/// Application configuration (`~/.campaignos/config.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default = "default_base_revenue")]
    pub base_revenue_per_campaign: f64,
    #[serde(default = "default_settle_delay_ms")]
    pub bulk_settle_delay_ms: u64,
    #[serde(default)]
    pub active_client: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store: StoreConfig::default(),
            assistant: AssistantConfig::default(),
            base_revenue_per_campaign: DEFAULT_BASE_REVENUE_PER_CAMPAIGN,
            bulk_settle_delay_ms: DEFAULT_BULK_SETTLE_DELAY_MS,
            active_client: None,
        }
    }
}
