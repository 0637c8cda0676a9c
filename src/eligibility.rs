//! Recurring award eligibility.
//!
//! Counts whole calendar-month periods between an anchor and "now". The
//! count is driven by the calendar month index (`year * 12 + month`), not by
//! elapsed duration, so existing accounts keep the payout schedule they were
//! accruing under.

use chrono::{Datelike, NaiveDate};

use crate::model::Timestamp;

/// Number of whole recurring award periods elapsed between `anchor` and `now`.
///
/// The month index difference is reduced by one while `now` has not yet
/// reached the anchor's day-of-month, except when the anchor sits on the last
/// day of its month: such anchors roll over at the next month boundary.
/// Returns 0 when `now` precedes `anchor`.
pub fn periods_elapsed(anchor: Timestamp, now: Timestamp) -> u32 {
    if now < anchor {
        return 0;
    }

    let anchor_date = anchor.date_naive();
    let now_date = now.date_naive();

    let mut months = month_index(now_date) - month_index(anchor_date);
    if now_date.day() < anchor_date.day() && !is_last_day_of_month(anchor_date) {
        months -= 1;
    }

    u32::try_from(months.max(0)).unwrap_or(u32::MAX)
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn is_last_day_of_month(date: NaiveDate) -> bool {
    date.succ_opt()
        .map_or(true, |next| next.month() != date.month())
}
