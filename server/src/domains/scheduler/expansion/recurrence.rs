//! Pure recurrence math. No database access - every anchor and restriction
//! date is resolved by the repository layer and passed in here as plain
//! values, so this module is exhaustively unit-testable.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::HashSet;

use crate::domains::scheduler::models::template::DaySet;

/// The four situations an anchor/restriction table must distinguish
/// (never ran, edit mode, ran before with no instances remaining, and the
/// normal steady state), resolved by the repository layer from multi-week
/// tracking + instance history.
#[derive(Debug, Clone, Copy)]
pub struct WeeklyAnchor {
    pub anchor: NaiveDate,
    pub restriction_date: NaiveDate,
}

impl WeeklyAnchor {
    pub fn never_ran(start_date: NaiveDate, today: NaiveDate) -> Self {
        Self {
            anchor: start_date,
            restriction_date: today.pred_opt().unwrap_or(today),
        }
    }

    pub fn edit_mode(next_date: NaiveDate, today: NaiveDate) -> Self {
        Self {
            anchor: next_date,
            restriction_date: today,
        }
    }

    pub fn ran_before_no_instances_remain(start_date: NaiveDate) -> Self {
        Self {
            anchor: start_date,
            restriction_date: start_date.pred_opt().unwrap_or(start_date),
        }
    }

    pub fn normal(last_historical_match: NaiveDate, last_existing_instance: NaiveDate) -> Self {
        Self {
            anchor: last_historical_match,
            restriction_date: last_existing_instance,
        }
    }

    pub fn fallback(next_date: NaiveDate, last_existing_instance: NaiveDate) -> Self {
        Self {
            anchor: next_date,
            restriction_date: last_existing_instance,
        }
    }
}

/// Valid dates for a weekly/multi-week template over a window starting at
/// `window_start` and spanning `window_days` days (inclusive).
///
/// For `stride == 1` no cycle arithmetic applies: every matching
/// day-of-week in the window is valid. For `stride > 1`,
/// valid dates are the union over cycles `i in [0, floor(window_days /
/// (7*stride))]` of every day in the week starting at `anchor + 7*stride*i`
/// whose day-of-week is flagged and which is strictly after
/// `restriction_date`.
pub fn weekly_valid_dates(
    anchor: WeeklyAnchor,
    stride: i32,
    days: DaySet,
    window_start: NaiveDate,
    window_days: i64,
) -> HashSet<NaiveDate> {
    let window_end = window_start + Duration::days(window_days);

    if stride <= 1 {
        // No cycle arithmetic, and no restriction-date filtering either -
        // duplicates at already-materialized dates are caught by the dedup
        // index, not by this function.
        let mut set = HashSet::new();
        let mut d = window_start;
        while d <= window_end {
            if days.contains(d.weekday()) {
                set.insert(d);
            }
            d += Duration::days(1);
        }
        return set;
    }

    let cycle_len = 7 * stride as i64;
    let max_cycle = window_days / cycle_len;
    let mut set = HashSet::new();

    for i in 0..=max_cycle {
        let cycle_start = anchor.anchor + Duration::days(cycle_len * i);
        for offset in 0..7 {
            let d = cycle_start + Duration::days(offset);
            if days.contains(d.weekday()) && d > anchor.restriction_date {
                set.insert(d);
            }
        }
    }

    set
}

/// Monthly Nth-weekday algorithm.
///
/// Finds the first day in `[month_start, month_start+6]` matching
/// `target_dow`, then adds `7*n`. If that candidate's month differs from
/// `month_start`'s, subtracts 7 (overflow to the last occurrence). If it
/// still differs, returns `None` ("no date this month").
pub fn nth_weekday(month_start: NaiveDate, target_dow: Weekday, n: u32) -> Option<NaiveDate> {
    let first = (0..7)
        .map(|i| month_start + Duration::days(i))
        .find(|d| d.weekday() == target_dow)?;

    let candidate = first + Duration::days(7 * n as i64);
    if candidate.month() == month_start.month() && candidate.year() == month_start.year() {
        return Some(candidate);
    }

    let backed_off = candidate - Duration::days(7);
    if backed_off.month() == month_start.month() && backed_off.year() == month_start.year() {
        Some(backed_off)
    } else {
        None
    }
}

/// The last day of the month containing `date`.
pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let first_of_next = first_day_of_next_month(date);
    first_of_next.pred_opt().unwrap_or(date)
}

pub fn first_day_of_next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).expect("valid calendar month")
}
