//! Billing period boundaries

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::billing::calendar;
use crate::types::BillingCycle;

/// Closing and due date of one billing month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBoundary {
    pub year: i32,
    pub month: u32,
    pub closing_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// Compute the boundary of a month from the card's cycle
///
/// The closing falls on the closing day clamped to the month length. The due
/// date falls in the same month unless the due day is on or before the
/// closing day, in which case it rolls into the next month.
pub fn period_boundary(year: i32, month: u32, cycle: BillingCycle) -> PeriodBoundary {
    let closing_date = calendar::clamped_date(year, month, cycle.closing_day);
    let (due_year, due_month) = if cycle.due_day <= cycle.closing_day {
        calendar::next_month(year, month)
    } else {
        (year, month)
    };
    PeriodBoundary {
        year,
        month,
        closing_date,
        due_date: calendar::clamped_date(due_year, due_month, cycle.due_day),
    }
}

/// The (year, month) of the period a charge dated `date` is billed in
pub fn period_month_for(date: NaiveDate, cycle: BillingCycle) -> (i32, u32) {
    let closing = calendar::clamped_date(date.year(), date.month(), cycle.closing_day);
    if date <= closing {
        (date.year(), date.month())
    } else {
        calendar::next_month(date.year(), date.month())
    }
}

/// Dates an entry must fall in to belong to a period
///
/// The primary window is (previous closing, closing]. The month-start to
/// closing range is scanned as well and merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodWindow {
    pub previous_closing: NaiveDate,
    pub month_start: NaiveDate,
    pub closing: NaiveDate,
}

impl PeriodWindow {
    pub fn new(previous_closing: NaiveDate, closing: NaiveDate) -> Self {
        Self {
            previous_closing,
            month_start: calendar::month_start(closing),
            closing,
        }
    }

    /// First day of the primary window
    pub fn start(&self) -> NaiveDate {
        calendar::next_day(self.previous_closing)
    }

    pub fn in_primary(&self, date: NaiveDate) -> bool {
        date > self.previous_closing && date <= self.closing
    }

    pub fn in_month_range(&self, date: NaiveDate) -> bool {
        date >= self.month_start && date <= self.closing
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.in_primary(date) || self.in_month_range(date)
    }

    /// Earliest date either range covers
    pub fn scan_start(&self) -> NaiveDate {
        self.start().min(self.month_start)
    }
}
