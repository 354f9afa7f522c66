//! Traits for storage abstraction

use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

use crate::types::*;

/// Storage abstraction for accounts, entries and billing periods
///
/// The engines only ever talk to this trait, so any backend (PostgreSQL,
/// SQLite, in-memory, etc.) can sit underneath. Multi-row operations are
/// bracketed by [`begin`](LedgerStorage::begin) and
/// [`commit`](LedgerStorage::commit) / [`rollback`](LedgerStorage::rollback);
/// a backend must make everything in between all-or-nothing.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Open a unit of work that must finish within `timeout`
    async fn begin(&mut self, timeout: Duration) -> LedgerResult<()>;

    /// Make every write since `begin` durable
    async fn commit(&mut self) -> LedgerResult<()>;

    /// Discard every write since `begin`
    async fn rollback(&mut self) -> LedgerResult<()>;

    /// Save an account to storage
    async fn save_account(&mut self, account: &Account) -> LedgerResult<()>;

    /// Get an account by ID
    async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>>;

    /// Update an account
    async fn update_account(&mut self, account: &Account) -> LedgerResult<()>;

    /// Save a ledger entry
    async fn save_entry(&mut self, entry: &LedgerEntry) -> LedgerResult<()>;

    /// Get a ledger entry by ID
    async fn get_entry(&self, entry_id: &str) -> LedgerResult<Option<LedgerEntry>>;

    /// Update a ledger entry
    async fn update_entry(&mut self, entry: &LedgerEntry) -> LedgerResult<()>;

    /// Delete a ledger entry
    async fn delete_entry(&mut self, entry_id: &str) -> LedgerResult<()>;

    /// Entries touching an account with `start <= date <= end`, ordered by date
    async fn get_account_entries(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<LedgerEntry>>;

    /// Save a new billing period
    async fn save_period(&mut self, period: &BillingPeriod) -> LedgerResult<()>;

    /// Get a billing period by ID
    async fn get_period(&self, period_id: &str) -> LedgerResult<Option<BillingPeriod>>;

    /// Get the period of an account for a calendar month
    async fn find_period(
        &self,
        account_id: &str,
        year: i32,
        month: u32,
    ) -> LedgerResult<Option<BillingPeriod>>;

    /// All periods of an account, oldest first
    async fn list_periods(&self, account_id: &str) -> LedgerResult<Vec<BillingPeriod>>;

    /// Update a period and return it with its new version
    ///
    /// Fails with [`LedgerError::StateConflict`] when `period.version` no
    /// longer matches the stored version.
    async fn update_period(&mut self, period: &BillingPeriod) -> LedgerResult<BillingPeriod>;

    /// Save a line item; a second item for the same (period, entry) is rejected
    async fn save_line_item(&mut self, item: &PeriodLineItem) -> LedgerResult<()>;

    /// Line items of a period
    async fn get_line_items(&self, period_id: &str) -> LedgerResult<Vec<PeriodLineItem>>;

    /// Update a line item
    async fn update_line_item(&mut self, item: &PeriodLineItem) -> LedgerResult<()>;

    /// Delete a line item
    async fn delete_line_item(&mut self, item_id: &str) -> LedgerResult<()>;

    /// Save an adjustment
    async fn save_adjustment(&mut self, adjustment: &Adjustment) -> LedgerResult<()>;

    /// Get an adjustment by ID
    async fn get_adjustment(&self, adjustment_id: &str) -> LedgerResult<Option<Adjustment>>;

    /// Adjustments of a period
    async fn get_adjustments(&self, period_id: &str) -> LedgerResult<Vec<Adjustment>>;

    /// Delete an adjustment
    async fn delete_adjustment(&mut self, adjustment_id: &str) -> LedgerResult<()>;
}
