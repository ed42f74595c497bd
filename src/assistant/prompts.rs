//! Assistant context construction.
//!
//! Builds the system context for one chat exchange: the current month's
//! campaign set, the active goal and its progress, and the action contract
//! the reply must follow. Deterministic for identical state — events sort by
//! (date, id) so the same calendar always yields the same context.

use chrono::NaiveDate;

use crate::revenue;
use crate::types::{CampaignEvent, Goal};

/// Serialized calendar + goal context for the assistant exchange.
pub fn build_calendar_context(
    client_name: &str,
    year: i32,
    month: u32,
    events: &[CampaignEvent],
    goal: Option<&Goal>,
    base_revenue: f64,
    today: NaiveDate,
) -> String {
    let mut context = String::with_capacity(4_000);

    context.push_str(
        "You are the campaign planning assistant for a marketing calendar. \
         Answer questions about the calendar in plain prose.\n\n",
    );

    context.push_str(&format!(
        "# Calendar — {client_name}, {year}-{month:02}\n\n"
    ));

    let mut month_events: Vec<&CampaignEvent> =
        events.iter().filter(|e| e.in_month(year, month)).collect();
    month_events.sort_by(|a, b| (a.date, &a.id).cmp(&(b.date, &b.id)));

    if month_events.is_empty() {
        context.push_str("No campaigns scheduled this month.\n");
    } else {
        for event in &month_events {
            context.push_str(&format!(
                "- {} [{}] {} (id: {}, approval: {})\n",
                event.date,
                event.campaign_type.display_name(),
                event.title,
                event.id,
                event.approval_status.as_str(),
            ));
        }
    }
    context.push('\n');

    let estimate = revenue::estimate_revenue(events, year, month, base_revenue);
    context.push_str("# Revenue\n\n");
    context.push_str(&format!("Estimated revenue this month: ${estimate:.0}\n"));
    match goal {
        Some(goal) => {
            let progress = revenue::progress(goal, estimate, today);
            context.push_str(&format!(
                "Goal: ${:.0} — {:.0}% reached, ${:.0} remaining, {} day(s) left, {}\n",
                goal.revenue_goal,
                progress.percentage,
                progress.remaining,
                progress.days_remaining,
                if progress.is_on_track {
                    "on track"
                } else {
                    "behind pace"
                },
            ));
        }
        None => context.push_str("No revenue goal is set for this month.\n"),
    }
    context.push('\n');

    context.push_str("# Action contract\n\n");
    context.push_str(
        "When the user asks you to change the calendar, reply with EXACTLY one \
         JSON object and nothing else. Shapes:\n\
         {\"action\":\"create\",\"event\":{\"date\":\"YYYY-MM-DD\",\"title\":\"...\",\"content\":\"...\"}}\n\
         {\"action\":\"update\",\"eventId\":\"...\",\"updates\":{\"date\":\"YYYY-MM-DD\",\"title\":\"...\",\"content\":\"...\",\"campaignType\":\"...\"}}\n\
         {\"action\":\"delete\",\"eventId\":\"...\"}\n\
         {\"action\":\"delete_all\"}\n\
         Use the event ids shown above. For anything else, answer in prose. \
         Never invent event ids and never wrap the JSON in commentary.\n",
    );

    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CampaignType;

    fn make_event(id: &str, day: u32) -> CampaignEvent {
        let mut event = CampaignEvent::new(
            "acme",
            NaiveDate::from_ymd_opt(2025, 9, day).unwrap(),
            "Fall Sale",
            "",
            CampaignType::RrbPromotion,
        );
        event.id = id.to_string();
        event
    }

    #[test]
    fn test_context_is_deterministic_regardless_of_event_order() {
        let today = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        let forward = vec![make_event("e1", 5), make_event("e2", 20)];
        let reversed = vec![make_event("e2", 20), make_event("e1", 5)];

        let a = build_calendar_context("Acme", 2025, 9, &forward, None, 500.0, today);
        let b = build_calendar_context("Acme", 2025, 9, &reversed, None, 500.0, today);
        assert_eq!(a, b);
    }

    #[test]
    fn test_context_lists_ids_and_estimate() {
        let today = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        let events = vec![make_event("e1", 15)];
        let context = build_calendar_context("Acme", 2025, 9, &events, None, 500.0, today);
        assert!(context.contains("id: e1"));
        assert!(context.contains("$750"));
        assert!(context.contains("delete_all"));
    }

    #[test]
    fn test_context_excludes_other_months() {
        let today = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        let mut other = make_event("e9", 1);
        other.date = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
        let context = build_calendar_context("Acme", 2025, 9, &[other], None, 500.0, today);
        assert!(context.contains("No campaigns scheduled"));
    }
}
