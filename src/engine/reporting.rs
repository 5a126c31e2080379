use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use crate::model::*;

/// The UTC calendar month containing `now` and the month before it.
pub fn month_windows(now: Ms) -> (Span, Span) {
    let today = to_datetime(now).date_naive();
    let current_start = first_of_month(today.year(), today.month());
    let (prev_year, prev_month) = step_month(today.year(), today.month(), -1);
    let (next_year, next_month) = step_month(today.year(), today.month(), 1);
    let previous_start = first_of_month(prev_year, prev_month);
    let next_start = first_of_month(next_year, next_month);
    (
        Span::new(current_start, next_start),
        Span::new(previous_start, current_start),
    )
}

fn step_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let zero_based = year * 12 + month as i32 - 1 + delta;
    (zero_based.div_euclid(12), zero_based.rem_euclid(12) as u32 + 1)
}

fn first_of_month(year: i32, month: u32) -> Ms {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}

/// Percent change from `previous` to `current`, two decimals.
/// With no prior data the change counts as 100% when anything happened
/// this period and 0% otherwise.
pub fn percentage_change(current: Decimal, previous: Decimal) -> (Decimal, bool) {
    if previous > Decimal::ZERO {
        let pct = current
            .saturating_sub(previous)
            .checked_div(previous)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::MAX);
        (pct.round_dp(2), false)
    } else if current > Decimal::ZERO {
        (Decimal::ONE_HUNDRED, true)
    } else {
        (Decimal::ZERO, true)
    }
}

pub fn count_change(current: usize, previous: usize) -> PeriodChange {
    let current = Decimal::from(current as u64);
    let previous = Decimal::from(previous as u64);
    let (pct, no_prior_data) = percentage_change(current, previous);
    let status = if pct > Decimal::ZERO {
        format!("Increased by {:.2}%", pct)
    } else if pct < Decimal::ZERO {
        format!("Decreased by {:.2}%", pct.abs())
    } else {
        "No change".to_string()
    };
    PeriodChange {
        current,
        previous,
        change: current - previous,
        percentage_change: pct,
        no_prior_data,
        status,
    }
}

pub fn amount_change(current: Decimal, previous: Decimal) -> PeriodChange {
    let change = current.saturating_sub(previous).round_dp(2);
    let (pct, no_prior_data) = percentage_change(current, previous);
    let status = if change > Decimal::ZERO {
        format!("Increased by ${:.2} ({:.2}%)", change, pct)
    } else if change < Decimal::ZERO {
        format!("Decreased by ${:.2} ({:.2}%)", change.abs(), pct.abs())
    } else {
        "No change".to_string()
    };
    PeriodChange {
        current: current.round_dp(2),
        previous: previous.round_dp(2),
        change,
        percentage_change: pct,
        no_prior_data,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(date: &str) -> Ms {
        parse_instant(date).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn windows_mid_month() {
        let (cur, prev) = month_windows(ms("2024-05-17T13:45:00Z"));
        assert_eq!(cur, Span::new(ms("2024-05-01"), ms("2024-06-01")));
        assert_eq!(prev, Span::new(ms("2024-04-01"), ms("2024-05-01")));
    }

    #[test]
    fn windows_wrap_year_boundaries() {
        let (cur, prev) = month_windows(ms("2024-01-03"));
        assert_eq!(prev, Span::new(ms("2023-12-01"), ms("2024-01-01")));
        assert_eq!(cur.end, ms("2024-02-01"));

        let (cur, _) = month_windows(ms("2023-12-31T23:59:59Z"));
        assert_eq!(cur, Span::new(ms("2023-12-01"), ms("2024-01-01")));
    }

    #[test]
    fn percentage_with_prior_data() {
        assert_eq!(percentage_change(dec("15"), dec("10")), (dec("50"), false));
        assert_eq!(percentage_change(dec("1"), dec("3")), (dec("-66.67"), false));
    }

    #[test]
    fn percentage_without_prior_data_is_flat() {
        assert_eq!(percentage_change(dec("7"), Decimal::ZERO), (Decimal::ONE_HUNDRED, true));
        assert_eq!(percentage_change(Decimal::ZERO, Decimal::ZERO), (Decimal::ZERO, true));
    }

    #[test]
    fn count_change_status_text() {
        assert_eq!(count_change(3, 2).status, "Increased by 50.00%");
        assert_eq!(count_change(1, 4).status, "Decreased by 75.00%");
        assert_eq!(count_change(2, 2).status, "No change");
        let fresh = count_change(2, 0);
        assert!(fresh.no_prior_data);
        assert_eq!(fresh.status, "Increased by 100.00%");
    }

    #[test]
    fn amount_change_status_text() {
        let up = amount_change(dec("440"), dec("400"));
        assert_eq!(up.change, dec("40"));
        assert_eq!(up.status, "Increased by $40.00 (10.00%)");

        let down = amount_change(dec("100"), dec("400"));
        assert_eq!(down.status, "Decreased by $300.00 (75.00%)");

        assert_eq!(amount_change(Decimal::ZERO, Decimal::ZERO).status, "No change");
    }

    #[test]
    fn extreme_amounts_saturate() {
        let (pct, no_prior) = percentage_change(Decimal::MAX, dec("0.01"));
        assert_eq!(pct, Decimal::MAX);
        assert!(!no_prior);
        let up = amount_change(Decimal::MAX, dec("0.01"));
        assert!(up.status.starts_with("Increased by $"));
    }
}
