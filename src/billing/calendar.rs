//! Month arithmetic on calendar dates

use chrono::{Datelike, Duration, NaiveDate};

/// Number of days in a month
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = next_month(year, month);
    match (
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
        NaiveDate::from_ymd_opt(year, month, 1),
    ) {
        (Some(first_next), Some(first)) => (first_next - first).num_days() as u32,
        _ => 28,
    }
}

/// The date at `day` in the month, clamped to the month length
pub fn clamped_date(year: i32, month: u32, day: u32) -> NaiveDate {
    let day = day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// (year, month) following the given one
pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// (year, month) preceding the given one
pub fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

/// Move (year, month) by a signed number of months
pub fn add_months(year: i32, month: u32, months: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + months;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// Same day `months` later, clamped to the target month length
pub fn shift_date(date: NaiveDate, months: i32) -> NaiveDate {
    let (year, month) = add_months(date.year(), date.month(), months);
    clamped_date(year, month, date.day())
}

/// First day of the date's month
pub fn month_start(date: NaiveDate) -> NaiveDate {
    clamped_date(date.year(), date.month(), 1)
}

/// Absolute distance in days between two dates
pub fn days_apart(a: NaiveDate, b: NaiveDate) -> i64 {
    (a - b).num_days().abs()
}

pub fn next_day(date: NaiveDate) -> NaiveDate {
    date + Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 12), 31);
        assert_eq!(days_in_month(2024, 4), 30);
    }

    #[test]
    fn test_add_months_wraps_years() {
        assert_eq!(add_months(2024, 11, 3), (2025, 2));
        assert_eq!(add_months(2024, 1, -1), (2023, 12));
        assert_eq!(add_months(2024, 6, -18), (2022, 12));
        assert_eq!(previous_month(2024, 1), (2023, 12));
        assert_eq!(next_month(2024, 12), (2025, 1));
    }

    #[test]
    fn test_shift_date_clamps_day() {
        assert_eq!(shift_date(date(2024, 1, 31), 1), date(2024, 2, 29));
        assert_eq!(shift_date(date(2024, 3, 31), -1), date(2024, 2, 29));
        assert_eq!(clamped_date(2023, 2, 30), date(2023, 2, 28));
    }
}
