//! NYSE trading calendar: weekends and exchange holidays.
//!
//! Covers the full-day closures observed since 2022 (Juneteenth included).
//! Saturday holidays are observed the preceding Friday, Sunday holidays the
//! following Monday; New Year's Day falling on a Saturday is not observed.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    nth_weekday(year, month, weekday, 5).or_else(|| nth_weekday(year, month, weekday, 4))
}

/// Easter Sunday (anonymous Gregorian algorithm).
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// Full-day NYSE closures in `year`.
#[must_use]
pub fn holidays(year: i32) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(10);

    if let Some(new_year) = NaiveDate::from_ymd_opt(year, 1, 1) {
        if new_year.weekday() != Weekday::Sat {
            days.push(observed(new_year));
        }
    }
    days.extend(nth_weekday(year, 1, Weekday::Mon, 3));
    days.extend(nth_weekday(year, 2, Weekday::Mon, 3));
    days.extend(easter_sunday(year).map(|easter| easter - Duration::days(2)));
    days.extend(last_weekday(year, 5, Weekday::Mon));
    if year >= 2022 {
        days.extend(NaiveDate::from_ymd_opt(year, 6, 19).map(observed));
    }
    days.extend(NaiveDate::from_ymd_opt(year, 7, 4).map(observed));
    days.extend(nth_weekday(year, 9, Weekday::Mon, 1));
    days.extend(nth_weekday(year, 11, Weekday::Thu, 4));
    days.extend(NaiveDate::from_ymd_opt(year, 12, 25).map(observed));

    days
}

#[must_use]
pub fn is_trading_day(date: NaiveDate) -> bool {
    if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    !holidays(date.year()).contains(&date)
}

/// First day of a lookback of `trading_days` sessions ending at `end`.
///
/// `end` itself counts when it is a trading day. A lookback of 0 or 1 returns
/// the most recent trading day on or before `end`.
#[must_use]
pub fn lookback_start(end: NaiveDate, trading_days: u32) -> NaiveDate {
    let mut remaining = trading_days.max(1);
    let mut date = end;
    loop {
        if is_trading_day(date) {
            remaining -= 1;
            if remaining == 0 {
                return date;
            }
        }
        date -= Duration::days(1);
    }
}
