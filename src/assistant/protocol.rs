//! Assistant action protocol.
//!
//! The assistant is instructed to answer either in prose or with exactly one
//! JSON object of a fixed shape. `parse` extracts that object and maps it to
//! a closed set of tagged commands; anything else is prose. A reply that
//! names a known action but carries a malformed payload is a protocol error,
//! not prose — a mutation attempt must never be silently swallowed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;
use crate::store::CampaignStore;
use crate::types::EventUpdates;

/// Action names the protocol recognizes. A JSON object with any other
/// `action` value is treated as prose.
const KNOWN_ACTIONS: &[&str] = &["create", "update", "delete", "delete_all"];

/// New-event payload inside a `create` action. The date stays a string at
/// the wire layer; `parsed_date` validates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEventPayload {
    pub date: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl CreateEventPayload {
    pub fn parsed_date(&self) -> Result<NaiveDate, CalendarError> {
        NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").map_err(|_| {
            CalendarError::Validation(format!(
                "unparseable date {:?} (expected YYYY-MM-DD)",
                self.date
            ))
        })
    }
}

/// A validated-shape mutation command derived from an assistant reply.
/// Produced once, executed once, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionCommand {
    Create {
        event: CreateEventPayload,
    },
    Update {
        #[serde(rename = "eventId")]
        event_id: String,
        updates: EventUpdates,
    },
    Delete {
        #[serde(rename = "eventId")]
        event_id: String,
    },
    DeleteAll,
}

impl ActionCommand {
    pub fn action_name(&self) -> &'static str {
        match self {
            ActionCommand::Create { .. } => "create",
            ActionCommand::Update { .. } => "update",
            ActionCommand::Delete { .. } => "delete",
            ActionCommand::DeleteAll => "delete_all",
        }
    }

    /// Check the command against current state before execution.
    /// `delete`/`update` must reference an existing event; `create` needs a
    /// parseable date and a non-empty title.
    pub fn validate(&self, store: &CampaignStore) -> Result<(), CalendarError> {
        match self {
            ActionCommand::Create { event } => {
                event.parsed_date()?;
                if event.title.trim().is_empty() {
                    return Err(CalendarError::Validation("title cannot be empty".into()));
                }
                Ok(())
            }
            ActionCommand::Update { event_id, updates } => {
                if !store.contains(event_id) {
                    return Err(CalendarError::NotFound(format!("event {event_id}")));
                }
                if updates.is_empty() {
                    return Err(CalendarError::Validation(
                        "update carries no fields".to_string(),
                    ));
                }
                Ok(())
            }
            ActionCommand::Delete { event_id } => {
                if !store.contains(event_id) {
                    return Err(CalendarError::NotFound(format!("event {event_id}")));
                }
                Ok(())
            }
            ActionCommand::DeleteAll => Ok(()),
        }
    }
}

/// Parse an assistant reply into at most one action command.
///
/// Returns `Ok(None)` for prose (no JSON object, invalid JSON, no `action`
/// field, or an unrecognized action name) and `Err(ProtocolParse)` when a
/// recognized action name arrives with a payload that does not deserialize.
pub fn parse(reply: &str) -> Result<Option<ActionCommand>, CalendarError> {
    let json_str = match extract_json_object(reply) {
        Some(s) => s,
        None => return Ok(None),
    };

    let value: serde_json::Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    let action = match value.get("action").and_then(|a| a.as_str()) {
        Some(a) => a.to_string(),
        None => return Ok(None),
    };
    if !KNOWN_ACTIONS.contains(&action.as_str()) {
        log::debug!("assistant reply carried unknown action {action:?}, treating as prose");
        return Ok(None);
    }

    match serde_json::from_value::<ActionCommand>(value) {
        Ok(command) => Ok(Some(command)),
        Err(e) => Err(CalendarError::ProtocolParse(format!("{action}: {e}"))),
    }
}

/// Find the first balanced `{...}` object in the text, tolerating prose and
/// markdown fences around it.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CampaignEvent, CampaignType};

    fn store_with_event(id: &str) -> CampaignStore {
        let mut store = CampaignStore::new();
        let mut event = CampaignEvent::new(
            "acme",
            NaiveDate::from_ymd_opt(2025, 9, 15).unwrap(),
            "Fall Sale",
            "",
            CampaignType::RrbPromotion,
        );
        event.id = id.to_string();
        store.upsert(event).unwrap();
        store
    }

    #[test]
    fn test_parse_delete_action() {
        let cmd = parse(r#"{"action":"delete","eventId":"e1"}"#).unwrap().unwrap();
        assert_eq!(
            cmd,
            ActionCommand::Delete {
                event_id: "e1".to_string()
            }
        );
    }

    #[test]
    fn test_parse_create_action_embedded_in_prose() {
        let reply = "Sure, adding it now:\n```json\n{\"action\":\"create\",\"event\":{\"date\":\"2025-09-20\",\"title\":\"Cheese Club drop\",\"content\":\"September box\"}}\n```";
        let cmd = parse(reply).unwrap().unwrap();
        match cmd {
            ActionCommand::Create { event } => {
                assert_eq!(event.title, "Cheese Club drop");
                assert_eq!(
                    event.parsed_date().unwrap(),
                    NaiveDate::from_ymd_opt(2025, 9, 20).unwrap()
                );
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn test_prose_reply_is_not_an_action() {
        assert!(parse("You have 3 campaigns this month.").unwrap().is_none());
        assert!(parse("").unwrap().is_none());
        // JSON without an action field is prose too.
        assert!(parse(r#"{"events": 3}"#).unwrap().is_none());
    }

    #[test]
    fn test_unknown_action_name_is_prose() {
        assert!(parse(r#"{"action":"rename","eventId":"e1"}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_malformed_known_action_is_protocol_error() {
        // "delete" without an eventId is a mutation attempt — surface it.
        let err = parse(r#"{"action":"delete"}"#).unwrap_err();
        assert!(matches!(err, CalendarError::ProtocolParse(_)));
    }

    #[test]
    fn test_round_trip_every_command_shape() {
        let commands = vec![
            ActionCommand::Create {
                event: CreateEventPayload {
                    date: "2025-09-20".to_string(),
                    title: "Cheese Club drop".to_string(),
                    content: String::new(),
                },
            },
            ActionCommand::Update {
                event_id: "e1".to_string(),
                updates: EventUpdates {
                    title: Some("Fall Mega Sale".to_string()),
                    ..EventUpdates::default()
                },
            },
            ActionCommand::Delete {
                event_id: "e1".to_string(),
            },
            ActionCommand::DeleteAll,
        ];
        for command in commands {
            let wire = serde_json::to_string(&command).unwrap();
            let back = parse(&wire).unwrap().unwrap();
            assert_eq!(back, command);
        }
    }

    #[test]
    fn test_validate_delete_missing_event_is_not_found() {
        let store = store_with_event("e1");
        let cmd = ActionCommand::Delete {
            event_id: "ghost".to_string(),
        };
        assert!(matches!(
            cmd.validate(&store),
            Err(CalendarError::NotFound(_))
        ));

        let ok = ActionCommand::Delete {
            event_id: "e1".to_string(),
        };
        assert!(ok.validate(&store).is_ok());
    }

    #[test]
    fn test_validate_create_rejects_bad_date_and_empty_title() {
        let store = CampaignStore::new();
        let bad_date = ActionCommand::Create {
            event: CreateEventPayload {
                date: "next tuesday".to_string(),
                title: "Fall Sale".to_string(),
                content: String::new(),
            },
        };
        assert!(matches!(
            bad_date.validate(&store),
            Err(CalendarError::Validation(_))
        ));

        let no_title = ActionCommand::Create {
            event: CreateEventPayload {
                date: "2025-09-20".to_string(),
                title: "  ".to_string(),
                content: String::new(),
            },
        };
        assert!(no_title.validate(&store).is_err());
    }

    #[test]
    fn test_extract_json_handles_braces_in_strings() {
        let text = r#"note {"action":"update","eventId":"e1","updates":{"title":"Q4 {big} push"}} done"#;
        let cmd = parse(text).unwrap().unwrap();
        match cmd {
            ActionCommand::Update { updates, .. } => {
                assert_eq!(updates.title.as_deref(), Some("Q4 {big} push"));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }
}
