//! In-memory storage implementation for testing

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::traits::*;
use crate::types::*;

#[derive(Debug, Clone, Default)]
struct State {
    accounts: HashMap<String, Account>,
    entries: HashMap<String, LedgerEntry>,
    periods: HashMap<String, BillingPeriod>,
    line_items: HashMap<String, PeriodLineItem>,
    adjustments: HashMap<String, Adjustment>,
}

/// In-memory storage implementation for testing and development
///
/// Clones share the same underlying data. A unit of work snapshots the data
/// on `begin` and restores the snapshot on `rollback`.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    state: Arc<RwLock<State>>,
    snapshot: Arc<RwLock<Option<State>>>,
    writes: Arc<AtomicU64>,
    failing_description: Arc<RwLock<Option<String>>>,
    failing_period: Arc<RwLock<Option<(i32, u32)>>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            snapshot: Arc::new(RwLock::new(None)),
            writes: Arc::new(AtomicU64::new(0)),
            failing_description: Arc::new(RwLock::new(None)),
            failing_period: Arc::new(RwLock::new(None)),
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> LedgerResult<()> {
        *self.write()? = State::default();
        self.writes.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Number of mutating calls served so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every later `save_entry` fail for entries whose description
    /// contains `needle` (useful for exercising partial failures)
    pub fn fail_entries_containing(&self, needle: Option<&str>) -> LedgerResult<()> {
        let mut failing = self
            .failing_description
            .write()
            .map_err(|_| poisoned())?;
        *failing = needle.map(str::to_string);
        Ok(())
    }

    /// Make every later period save or update for `(year, month)` fail
    pub fn fail_periods_for(&self, month: Option<(i32, u32)>) -> LedgerResult<()> {
        *self.failing_period.write().map_err(|_| poisoned())? = month;
        Ok(())
    }

    /// Number of entries currently stored
    pub fn entry_count(&self) -> LedgerResult<usize> {
        Ok(self.read()?.entries.len())
    }

    fn check_period_writable(&self, period: &BillingPeriod) -> LedgerResult<()> {
        let failing = *self.failing_period.read().map_err(|_| poisoned())?;
        if failing == Some((period.year, period.month)) {
            return Err(LedgerError::Storage(format!(
                "refused to write period {}-{:02}",
                period.year, period.month
            )));
        }
        Ok(())
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| poisoned())
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, State>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.state.write().map_err(|_| poisoned())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> LedgerError {
    LedgerError::Storage("memory storage lock poisoned".to_string())
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn begin(&mut self, _timeout: Duration) -> LedgerResult<()> {
        let mut snapshot = self.snapshot.write().map_err(|_| poisoned())?;
        if snapshot.is_some() {
            return Err(LedgerError::Storage(
                "a unit of work is already open".to_string(),
            ));
        }
        *snapshot = Some(self.read()?.clone());
        Ok(())
    }

    async fn commit(&mut self) -> LedgerResult<()> {
        let mut snapshot = self.snapshot.write().map_err(|_| poisoned())?;
        if snapshot.take().is_none() {
            return Err(LedgerError::Storage("no open unit of work".to_string()));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> LedgerResult<()> {
        let restored = self
            .snapshot
            .write()
            .map_err(|_| poisoned())?
            .take()
            .ok_or_else(|| LedgerError::Storage("no open unit of work".to_string()))?;
        *self.state.write().map_err(|_| poisoned())? = restored;
        Ok(())
    }

    async fn save_account(&mut self, account: &Account) -> LedgerResult<()> {
        self.write()?
            .accounts
            .insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        Ok(self.read()?.accounts.get(account_id).cloned())
    }

    async fn update_account(&mut self, account: &Account) -> LedgerResult<()> {
        let mut state = self.write()?;
        if !state.accounts.contains_key(&account.id) {
            return Err(LedgerError::AccountNotFound(account.id.clone()));
        }
        state.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn save_entry(&mut self, entry: &LedgerEntry) -> LedgerResult<()> {
        if let Some(needle) = self
            .failing_description
            .read()
            .map_err(|_| poisoned())?
            .as_deref()
        {
            if entry.description.contains(needle) {
                return Err(LedgerError::Storage(format!(
                    "refused to save entry '{}'",
                    entry.description
                )));
            }
        }
        self.write()?
            .entries
            .insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn get_entry(&self, entry_id: &str) -> LedgerResult<Option<LedgerEntry>> {
        Ok(self.read()?.entries.get(entry_id).cloned())
    }

    async fn update_entry(&mut self, entry: &LedgerEntry) -> LedgerResult<()> {
        let mut state = self.write()?;
        if !state.entries.contains_key(&entry.id) {
            return Err(LedgerError::EntryNotFound(entry.id.clone()));
        }
        state.entries.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn delete_entry(&mut self, entry_id: &str) -> LedgerResult<()> {
        match self.write()?.entries.remove(entry_id) {
            Some(_) => Ok(()),
            None => Err(LedgerError::EntryNotFound(entry_id.to_string())),
        }
    }

    async fn get_account_entries(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let state = self.read()?;
        let mut filtered: Vec<LedgerEntry> = state
            .entries
            .values()
            .filter(|entry| {
                entry.touches(account_id)
                    && start_date.is_none_or(|start| entry.date >= start)
                    && end_date.is_none_or(|end| entry.date <= end)
            })
            .cloned()
            .collect();
        filtered.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(filtered)
    }

    async fn save_period(&mut self, period: &BillingPeriod) -> LedgerResult<()> {
        self.check_period_writable(period)?;
        let mut state = self.write()?;
        let duplicate = state.periods.values().any(|p| {
            p.account_id == period.account_id && p.year == period.year && p.month == period.month
        });
        if duplicate {
            return Err(LedgerError::StateConflict(format!(
                "period {}-{:02} already exists for account {}",
                period.year, period.month, period.account_id
            )));
        }
        state.periods.insert(period.id.clone(), period.clone());
        Ok(())
    }

    async fn get_period(&self, period_id: &str) -> LedgerResult<Option<BillingPeriod>> {
        Ok(self.read()?.periods.get(period_id).cloned())
    }

    async fn find_period(
        &self,
        account_id: &str,
        year: i32,
        month: u32,
    ) -> LedgerResult<Option<BillingPeriod>> {
        Ok(self
            .read()?
            .periods
            .values()
            .find(|p| p.account_id == account_id && p.year == year && p.month == month)
            .cloned())
    }

    async fn list_periods(&self, account_id: &str) -> LedgerResult<Vec<BillingPeriod>> {
        let mut periods: Vec<BillingPeriod> = self
            .read()?
            .periods
            .values()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect();
        periods.sort_by_key(|p| (p.year, p.month));
        Ok(periods)
    }

    async fn update_period(&mut self, period: &BillingPeriod) -> LedgerResult<BillingPeriod> {
        self.check_period_writable(period)?;
        let mut state = self.write()?;
        let stored = state
            .periods
            .get(&period.id)
            .ok_or_else(|| LedgerError::PeriodNotFound(period.id.clone()))?;
        if stored.version != period.version {
            return Err(LedgerError::StateConflict(format!(
                "period {} was modified concurrently (version {} != {})",
                period.id, period.version, stored.version
            )));
        }
        let mut updated = period.clone();
        updated.version += 1;
        state.periods.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    async fn save_line_item(&mut self, item: &PeriodLineItem) -> LedgerResult<()> {
        let mut state = self.write()?;
        let duplicate = state
            .line_items
            .values()
            .any(|i| i.period_id == item.period_id && i.entry_id == item.entry_id);
        if duplicate {
            return Err(LedgerError::StateConflict(format!(
                "entry {} is already linked to period {}",
                item.entry_id, item.period_id
            )));
        }
        state.line_items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_line_items(&self, period_id: &str) -> LedgerResult<Vec<PeriodLineItem>> {
        let mut items: Vec<PeriodLineItem> = self
            .read()?
            .line_items
            .values()
            .filter(|i| i.period_id == period_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn update_line_item(&mut self, item: &PeriodLineItem) -> LedgerResult<()> {
        let mut state = self.write()?;
        if !state.line_items.contains_key(&item.id) {
            return Err(LedgerError::Storage(format!(
                "line item {} does not exist",
                item.id
            )));
        }
        state.line_items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn delete_line_item(&mut self, item_id: &str) -> LedgerResult<()> {
        match self.write()?.line_items.remove(item_id) {
            Some(_) => Ok(()),
            None => Err(LedgerError::Storage(format!(
                "line item {} does not exist",
                item_id
            ))),
        }
    }

    async fn save_adjustment(&mut self, adjustment: &Adjustment) -> LedgerResult<()> {
        self.write()?
            .adjustments
            .insert(adjustment.id.clone(), adjustment.clone());
        Ok(())
    }

    async fn get_adjustment(&self, adjustment_id: &str) -> LedgerResult<Option<Adjustment>> {
        Ok(self.read()?.adjustments.get(adjustment_id).cloned())
    }

    async fn get_adjustments(&self, period_id: &str) -> LedgerResult<Vec<Adjustment>> {
        let mut adjustments: Vec<Adjustment> = self
            .read()?
            .adjustments
            .values()
            .filter(|a| a.period_id == period_id)
            .cloned()
            .collect();
        adjustments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(adjustments)
    }

    async fn delete_adjustment(&mut self, adjustment_id: &str) -> LedgerResult<()> {
        match self.write()?.adjustments.remove(adjustment_id) {
            Some(_) => Ok(()),
            None => Err(LedgerError::AdjustmentNotFound(adjustment_id.to_string())),
        }
    }
}
