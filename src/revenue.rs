//! Revenue estimation and goal progress.
//!
//! Pure computation over a campaign snapshot and a goal record: no I/O, no
//! clock reads (callers pass `today`), no randomness. Recommendations are
//! advisory but deterministic for identical inputs.

use chrono::{Datelike, NaiveDate};

use crate::types::{
    CampaignEvent, CampaignType, Goal, GoalProgress, Recommendation, RecommendationPriority,
};

/// Reference revenue attributed to one campaign before the type multiplier.
/// Tunable via config (`baseRevenuePerCampaign`).
pub const BASE_REVENUE_PER_CAMPAIGN: f64 = 500.0;

/// Pacing thresholds for recommendation priority (estimate ÷ expected-to-date).
const PACE_HIGH_CUTOFF: f64 = 0.5;
const PACE_MEDIUM_CUTOFF: f64 = 0.8;

/// How many campaign types a behind-pace recommendation suggests.
const RECOMMENDATION_COUNT: usize = 3;

/// Revenue multiplier per campaign type.
pub fn multiplier(campaign_type: CampaignType) -> f64 {
    match campaign_type {
        CampaignType::RrbPromotion => 1.5,
        CampaignType::CheeseClub => 2.0,
        CampaignType::NurturingEducation => 0.8,
        CampaignType::CommunityLifestyle => 0.7,
        CampaignType::Reengagement => 1.2,
        CampaignType::SmsAlert => 1.3,
        CampaignType::Default => 1.0,
    }
}

/// Estimated revenue for all events falling in the target month.
/// Order-independent: a plain sum over the matching set.
pub fn estimate_revenue(events: &[CampaignEvent], year: i32, month: u32, base: f64) -> f64 {
    events
        .iter()
        .filter(|e| e.in_month(year, month))
        .map(|e| base * multiplier(e.campaign_type))
        .sum()
}

/// Number of days in a calendar month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match (first, next) {
        (Some(first), Some(next)) => next.signed_duration_since(first).num_days() as u32,
        _ => 30,
    }
}

/// Days of the month already elapsed as of `today` (inclusive). Zero before
/// the month starts, the full month once it has passed.
pub fn days_elapsed_in_month(today: NaiveDate, year: i32, month: u32) -> u32 {
    let total = days_in_month(year, month);
    if (today.year(), today.month()) == (year, month) {
        today.day()
    } else if (today.year(), today.month()) < (year, month) {
        0
    } else {
        total
    }
}

/// Goal progress for the goal's month given a revenue estimate.
///
/// On-track rule: a goal is on track when it is already met
/// (`percentage >= 100`) or when the linear run-rate extrapolation
/// (`estimate ÷ days elapsed × days in month`) would reach it by month end.
pub fn progress(goal: &Goal, estimate: f64, today: NaiveDate) -> GoalProgress {
    let target = goal.revenue_goal.max(1.0);
    let percentage = estimate / target * 100.0;

    let total_days = days_in_month(goal.year, goal.month);
    let elapsed = days_elapsed_in_month(today, goal.year, goal.month);
    let days_remaining = total_days.saturating_sub(elapsed);

    let run_rate = if elapsed > 0 {
        estimate / elapsed as f64 * total_days as f64
    } else {
        0.0
    };

    GoalProgress {
        percentage,
        remaining: (goal.revenue_goal - estimate).max(0.0),
        is_on_track: percentage >= 100.0 || (elapsed > 0 && run_rate >= goal.revenue_goal),
        days_remaining,
    }
}

/// Suggest higher-multiplier campaign types when the month-to-date estimate
/// trails the linear pacing curve. Returns an empty list when on pace.
pub fn recommend(goal: &Goal, events: &[CampaignEvent], today: NaiveDate) -> Vec<Recommendation> {
    recommend_with_base(goal, events, today, BASE_REVENUE_PER_CAMPAIGN)
}

pub fn recommend_with_base(
    goal: &Goal,
    events: &[CampaignEvent],
    today: NaiveDate,
    base: f64,
) -> Vec<Recommendation> {
    if goal.revenue_goal <= 0.0 {
        return Vec::new();
    }

    let total_days = days_in_month(goal.year, goal.month);
    let elapsed = days_elapsed_in_month(today, goal.year, goal.month);
    if elapsed == 0 {
        return Vec::new();
    }

    let estimate = estimate_revenue(events, goal.year, goal.month, base);
    let expected = goal.revenue_goal * elapsed as f64 / total_days as f64;
    if expected <= 0.0 || estimate >= expected {
        return Vec::new();
    }

    let pace = estimate / expected;
    let priority = if pace < PACE_HIGH_CUTOFF {
        RecommendationPriority::High
    } else if pace < PACE_MEDIUM_CUTOFF {
        RecommendationPriority::Medium
    } else {
        RecommendationPriority::Low
    };

    let deficit = expected - estimate;

    // Highest-multiplier types first; ties broken by enum order for
    // determinism. `default` is never suggested.
    let mut ranked: Vec<CampaignType> = CampaignType::ALL
        .iter()
        .copied()
        .filter(|t| *t != CampaignType::Default)
        .collect();
    ranked.sort_by(|a, b| {
        multiplier(*b)
            .partial_cmp(&multiplier(*a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(b))
    });

    ranked
        .into_iter()
        .take(RECOMMENDATION_COUNT)
        .map(|campaign_type| Recommendation {
            priority,
            campaign_type,
            reason: format!(
                "{} campaigns carry a {:.1}x multiplier (~${:.0} each); month-to-date is ${:.0} behind pace",
                campaign_type.display_name(),
                multiplier(campaign_type),
                base * multiplier(campaign_type),
                deficit
            ),
        })
        .collect()
}

/// Detect a campaign type from free text. First matching rule wins, in
/// fixed priority order: RRB/promotion → Cheese Club → Nurturing/Education
/// → Community/Lifestyle → Re-engagement → SMS → default. Total: always
/// returns a member of the enumeration.
pub fn detect_campaign_type(title: &str, content: &str) -> CampaignType {
    const RULES: &[(CampaignType, &[&str])] = &[
        (
            CampaignType::RrbPromotion,
            &["rrb", "promotion", "promo", "sale", "discount"],
        ),
        (CampaignType::CheeseClub, &["cheese club", "cheese"]),
        (
            CampaignType::NurturingEducation,
            &["nurtur", "educat", "how-to", "guide", "tips"],
        ),
        (
            CampaignType::CommunityLifestyle,
            &["community", "lifestyle", "local"],
        ),
        (
            CampaignType::Reengagement,
            &["re-engage", "reengage", "win back", "win-back", "lapsed"],
        ),
        (CampaignType::SmsAlert, &["sms", "text alert", "text blast"]),
    ];

    let haystack = format!("{} {}", title, content).to_lowercase();
    for (campaign_type, keywords) in RULES {
        if keywords.iter().any(|k| haystack.contains(k)) {
            return *campaign_type;
        }
    }
    CampaignType::Default
}
