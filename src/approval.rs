//! Approval workflow for campaign events.
//!
//! State machine: none → pending_approval → {approved, rejected}
//! Transitions are one-directional, except that re-requesting approval from
//! approved/rejected returns the event to pending_approval. Every transition
//! appends to the event's timestamp map; history is never erased.

use chrono::{DateTime, Utc};

use crate::error::CalendarError;
use crate::types::{ApprovalStatus, CampaignEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Request,
    Approve,
    Reject,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::Request => "request",
            ApprovalAction::Approve => "approve",
            ApprovalAction::Reject => "reject",
        }
    }
}

/// Resolve the status an action would move the event into, or a validation
/// error when the transition is not legal from the current status.
pub fn next_status(
    current: ApprovalStatus,
    action: ApprovalAction,
) -> Result<ApprovalStatus, CalendarError> {
    match (action, current) {
        (ApprovalAction::Request, ApprovalStatus::None)
        | (ApprovalAction::Request, ApprovalStatus::Approved)
        | (ApprovalAction::Request, ApprovalStatus::Rejected) => {
            Ok(ApprovalStatus::PendingApproval)
        }
        (ApprovalAction::Approve, ApprovalStatus::PendingApproval) => Ok(ApprovalStatus::Approved),
        (ApprovalAction::Reject, ApprovalStatus::PendingApproval) => Ok(ApprovalStatus::Rejected),
        _ => Err(CalendarError::Validation(format!(
            "cannot {} from status {}",
            action.as_str(),
            current.as_str()
        ))),
    }
}

/// Apply an approval action in place, stamping the transition time.
pub fn apply_transition(
    event: &mut CampaignEvent,
    action: ApprovalAction,
    now: DateTime<Utc>,
) -> Result<ApprovalStatus, CalendarError> {
    let status = next_status(event.approval_status, action)?;
    event.approval_status = status;
    event
        .approval_timestamps
        .insert(status.as_str().to_string(), now);
    event.last_modified = now;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CampaignType;
    use chrono::NaiveDate;

    fn make_event() -> CampaignEvent {
        CampaignEvent::new(
            "acme",
            NaiveDate::from_ymd_opt(2025, 9, 15).unwrap(),
            "Fall Sale",
            "",
            CampaignType::Default,
        )
    }

    #[test]
    fn test_full_lifecycle() {
        let mut event = make_event();
        let now = Utc::now();

        apply_transition(&mut event, ApprovalAction::Request, now).unwrap();
        assert_eq!(event.approval_status, ApprovalStatus::PendingApproval);

        apply_transition(&mut event, ApprovalAction::Approve, now).unwrap();
        assert_eq!(event.approval_status, ApprovalStatus::Approved);

        // Re-request after a verdict goes back to pending.
        apply_transition(&mut event, ApprovalAction::Request, now).unwrap();
        assert_eq!(event.approval_status, ApprovalStatus::PendingApproval);

        apply_transition(&mut event, ApprovalAction::Reject, now).unwrap();
        assert_eq!(event.approval_status, ApprovalStatus::Rejected);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        assert!(next_status(ApprovalStatus::None, ApprovalAction::Approve).is_err());
        assert!(next_status(ApprovalStatus::None, ApprovalAction::Reject).is_err());
        assert!(next_status(ApprovalStatus::Approved, ApprovalAction::Approve).is_err());
        assert!(next_status(ApprovalStatus::PendingApproval, ApprovalAction::Request).is_err());
    }

    #[test]
    fn test_timestamps_accumulate() {
        let mut event = make_event();
        let now = Utc::now();
        apply_transition(&mut event, ApprovalAction::Request, now).unwrap();
        apply_transition(&mut event, ApprovalAction::Approve, now).unwrap();
        assert!(event.approval_timestamps.contains_key("pending_approval"));
        assert!(event.approval_timestamps.contains_key("approved"));
        assert_eq!(event.approval_timestamps.len(), 2);
    }
}
