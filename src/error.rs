//! Error taxonomy for calendar mutations and sync.
//!
//! Errors are classified by how the caller recovers:
//! - Validation / NotFound: caller mistakes, surfaced synchronously, never retried
//! - TransientIo: optimistic state rolled back, surfaced once
//! - PartialBulkFailure: local removal stands, the unconfirmed ids are surfaced
//! - ProtocolParse: the assistant attempted an action but the payload was malformed

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalendarError {
    /// Malformed input: bad date, unknown campaign type, missing title.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A command referenced an event (or client) that does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network failure on a single write. Local state was rolled back.
    #[error("Transient IO error: {0}")]
    TransientIo(String),

    /// Some deletes in a bulk operation did not confirm. Local state keeps
    /// the removal; the listed ids may still exist remotely until the next
    /// reconciliation.
    #[error("Bulk delete incomplete: {} event(s) unconfirmed: {}", failed_ids.len(), failed_ids.join(", "))]
    PartialBulkFailure { failed_ids: Vec<String> },

    /// The assistant reply carried a recognized action with a malformed
    /// payload. Surfaced rather than silently rendered as prose, so a
    /// mutation attempt is never hidden.
    #[error("Assistant action malformed: {0}")]
    ProtocolParse(String),
}

impl CalendarError {
    /// True for failures that resolve on their own once the store reconciles.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CalendarError::TransientIo(_) | CalendarError::PartialBulkFailure { .. }
        )
    }

    /// True when the caller supplied bad input and should fix the request.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            CalendarError::Validation(_)
                | CalendarError::NotFound(_)
                | CalendarError::ProtocolParse(_)
        )
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            CalendarError::Validation(_) => "Fix the request fields and try again.",
            CalendarError::NotFound(_) => "The referenced event no longer exists. Refresh the calendar.",
            CalendarError::TransientIo(_) => "Check your connection. The change was not saved.",
            CalendarError::PartialBulkFailure { .. } => {
                "Some events may still exist remotely. They will clear on the next sync."
            }
            CalendarError::ProtocolParse(_) => "Ask the assistant to restate the action.",
        }
    }
}

/// Serializable error representation for the command surface.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub message: String,
    pub kind: ErrorKind,
    pub can_retry: bool,
    pub recovery_suggestion: String,
    /// Populated for partial bulk failures only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    TransientIo,
    PartialBulkFailure,
    ProtocolParse,
}

impl From<&CalendarError> for CommandError {
    fn from(err: &CalendarError) -> Self {
        let (kind, failed_ids) = match err {
            CalendarError::Validation(_) => (ErrorKind::Validation, Vec::new()),
            CalendarError::NotFound(_) => (ErrorKind::NotFound, Vec::new()),
            CalendarError::TransientIo(_) => (ErrorKind::TransientIo, Vec::new()),
            CalendarError::PartialBulkFailure { failed_ids } => {
                (ErrorKind::PartialBulkFailure, failed_ids.clone())
            }
            CalendarError::ProtocolParse(_) => (ErrorKind::ProtocolParse, Vec::new()),
        };

        CommandError {
            message: err.to_string(),
            kind,
            can_retry: err.is_transient(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
            failed_ids,
        }
    }
}
