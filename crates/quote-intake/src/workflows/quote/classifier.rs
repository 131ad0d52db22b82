use chrono::NaiveDate;
use serde::Serialize;

/// Leads starting coverage within this many days are flagged for fast follow-up.
pub const HOT_LEAD_WINDOW_DAYS: i64 = 30;

/// Urgency derived from the requested coverage start date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeadClassification {
    pub days_until_effective: i64,
    pub is_hot_lead: bool,
}

/// Days are counted inclusively, so a start date of today is day 1.
///
/// A lead is hot when coverage starts within the 30 calendar days beginning
/// today, i.e. `today..=today + 29`. The date picker also offers `today + 30`;
/// that date counts as day 31 and is not hot. Keep the two in mind together
/// when changing either the window or the picker range.
pub fn classify(start_date: NaiveDate, today: NaiveDate) -> LeadClassification {
    let days_until_effective = start_date.signed_duration_since(today).num_days() + 1;
    let is_hot_lead = days_until_effective > 0 && days_until_effective <= HOT_LEAD_WINDOW_DAYS;

    LeadClassification {
        days_until_effective,
        is_hot_lead,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 24).expect("valid date")
    }

    #[test]
    fn same_day_start_is_day_one_and_hot() {
        let result = classify(today(), today());
        assert_eq!(result.days_until_effective, 1);
        assert!(result.is_hot_lead);
    }

    #[test]
    fn window_boundaries() {
        let thirty = classify(today() + Duration::days(30), today());
        assert_eq!(thirty.days_until_effective, 31);
        assert!(!thirty.is_hot_lead);

        let twenty_nine = classify(today() + Duration::days(29), today());
        assert_eq!(twenty_nine.days_until_effective, 30);
        assert!(twenty_nine.is_hot_lead);

        assert!(!classify(today() + Duration::days(31), today()).is_hot_lead);
    }

    #[test]
    fn last_pickable_date_falls_outside_hot_window() {
        let window = crate::workflows::quote::validation::StartDateWindow::for_today(today());

        let first = classify(window.earliest, today());
        assert!(first.is_hot_lead);
        let last = classify(window.latest, today());
        assert_eq!(last.days_until_effective, HOT_LEAD_WINDOW_DAYS + 1);
        assert!(!last.is_hot_lead);
        assert!(classify(window.latest - Duration::days(1), today()).is_hot_lead);
    }

    #[test]
    fn past_dates_are_never_hot() {
        let yesterday = classify(today() - Duration::days(1), today());
        assert_eq!(yesterday.days_until_effective, 0);
        assert!(!yesterday.is_hot_lead);

        let last_month = classify(today() - Duration::days(40), today());
        assert!(last_month.days_until_effective < 0);
        assert!(!last_month.is_hot_lead);
    }

    #[test]
    fn five_days_out_counts_six() {
        let result = classify(today() + Duration::days(5), today());
        assert_eq!(result.days_until_effective, 6);
        assert!(result.is_hot_lead);
    }
}
