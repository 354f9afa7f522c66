//! Persisting a reconciled statement: missing entries, links, adjustments, next period

use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::billing::boundary::PeriodWindow;
use crate::billing::calendar;
use crate::billing::cycle::BillingCycleEngine;
use crate::config::EngineConfig;
use crate::reconciliation::engine::{ReconciliationItem, ReconciliationResult};
use crate::reconciliation::rules::MatchType;
use crate::reconciliation::similarity::strip_installment_marker;
use crate::statement::{ParsedStatement, ParsedTransaction};
use crate::traits::LedgerStorage;
use crate::types::*;
use crate::utils::validation::validate_credit_card;

/// What the user chose for one reconciliation verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Accept,
    Reject,
    CreateNew,
}

/// Which verdict a decision refers to, by statement index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTarget {
    Transaction(usize),
    Adjustment(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDecision {
    pub target: DecisionTarget,
    pub action: DecisionAction,
}

impl ImportDecision {
    pub fn transaction(index: usize, action: DecisionAction) -> Self {
        Self {
            target: DecisionTarget::Transaction(index),
            action,
        }
    }

    pub fn adjustment(index: usize, action: DecisionAction) -> Self {
        Self {
            target: DecisionTarget::Adjustment(index),
            action,
        }
    }
}

/// Summary of an applied import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOutcome {
    /// Statement period after the import committed
    pub period: BillingPeriod,
    /// Ids of every entry created, future installments included
    pub created_entry_ids: Vec<String>,
    pub created_adjustments: usize,
    pub linked_entries: usize,
    /// Placeholder for the following month, when the statement announced it
    pub next_period: Option<BillingPeriod>,
    /// Row-level failures that did not stop the import
    pub errors: Vec<String>,
}

impl ImportOutcome {
    pub fn created_entries(&self) -> usize {
        self.created_entry_ids.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemPlan {
    Link,
    Create,
    Skip,
}

/// Dates the statement bills: (previous closing, closing]
fn statement_window(statement: &ParsedStatement) -> PeriodWindow {
    let previous_closing = statement
        .previous_closing_date
        .unwrap_or_else(|| calendar::shift_date(statement.closing_date, -1));
    PeriodWindow::new(previous_closing, statement.closing_date)
}

fn plan_item(
    item: &ReconciliationItem,
    action: Option<DecisionAction>,
    create_missing: bool,
) -> ItemPlan {
    match (item.match_type, action) {
        (_, Some(DecisionAction::Reject)) => ItemPlan::Skip,
        (_, Some(DecisionAction::CreateNew)) => ItemPlan::Create,
        (MatchType::NotFound, _) if create_missing => ItemPlan::Create,
        (MatchType::NotFound, _) => ItemPlan::Skip,
        (_, _) if item.matched_entry.is_some() => ItemPlan::Link,
        _ => ItemPlan::Skip,
    }
}

/// A line turned into ledger entries: the billed one and its future installments
#[derive(Debug, Clone)]
struct CreatedRow {
    index: usize,
    entry: LedgerEntry,
    future: Vec<LedgerEntry>,
}

/// Build the entries for a statement line that has no ledger counterpart
///
/// The billed entry keeps the line's date when it falls inside the statement
/// window and is dated at the closing otherwise, so recomputing the period
/// keeps it. Installment lines are always billed at the closing and get one
/// pending entry per remaining position, dated at the closing day of each
/// following month.
fn entries_for_line(
    account: &Account,
    line: &ParsedTransaction,
    window: &PeriodWindow,
    closing_day: u32,
) -> (LedgerEntry, Vec<LedgerEntry>) {
    let closing_date = window.closing;
    let billed_on = if line.is_installment() || !window.contains(line.date) {
        closing_date
    } else {
        line.date
    };
    let amount = line.amount.abs();
    let mut entry = if line.amount < BigDecimal::from(0) {
        LedgerEntry::new(
            EntryKind::Income,
            amount.clone(),
            line.currency.clone(),
            billed_on,
            line.description.clone(),
        )
        .to_account(&account.id)
    } else {
        LedgerEntry::expense(
            &account.id,
            amount.clone(),
            line.currency.clone(),
            billed_on,
            line.description.clone(),
        )
    };
    entry.plan_z = line.is_plan_z;

    let (Some(current), Some(total)) = (line.installment_current, line.installment_total) else {
        return (entry, Vec::new());
    };
    if !line.is_installment() {
        return (entry, Vec::new());
    }

    let group_id = uuid::Uuid::new_v4().to_string();
    entry = entry.with_installment(group_id.clone(), current, total);

    let base = strip_installment_marker(&line.description);
    let future = line
        .remaining_installments()
        .map(|position| {
            let (year, month) = calendar::add_months(
                closing_date.year(),
                closing_date.month(),
                (position - current) as i32,
            );
            LedgerEntry::expense(
                &account.id,
                amount.clone(),
                line.currency.clone(),
                calendar::clamped_date(year, month, closing_day),
                format!("{} ({}/{})", base, position, total),
            )
            .with_installment(group_id.clone(), position, total)
            .with_status(EntryStatus::Pending)
        })
        .collect();

    (entry, future)
}

/// Applies a [`ReconciliationResult`] to the ledger
pub struct ImportApplier<S: LedgerStorage + Clone> {
    storage: S,
    cycle: BillingCycleEngine<S>,
    config: EngineConfig,
}

impl<S: LedgerStorage + Clone> ImportApplier<S> {
    pub fn new(storage: S, config: EngineConfig) -> Self {
        Self {
            cycle: BillingCycleEngine::new(storage.clone(), config.clone()),
            storage,
            config,
        }
    }

    /// Persist the outcome of a reconciliation
    ///
    /// Rows are created one by one and failures are collected. Linking,
    /// adjustments and period updates then run as one unit of work: if any
    /// of them fails nothing of that unit is kept and the whole call fails.
    pub async fn apply_import(
        &mut self,
        result: &ReconciliationResult,
        decisions: &[ImportDecision],
        create_missing: bool,
    ) -> LedgerResult<ImportOutcome> {
        let account = self
            .storage
            .get_account(&result.account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(result.account_id.clone()))?;
        let cycle = validate_credit_card(&account)?;

        if let Some(period) = self
            .storage
            .find_period(&account.id, result.year, result.month)
            .await?
        {
            if period.is_frozen() {
                return Err(LedgerError::StateConflict(format!(
                    "Period {}-{:02} is {:?}; the statement cannot be imported into it",
                    period.year, period.month, period.status
                )));
            }
        }

        let actions: HashMap<DecisionTarget, DecisionAction> =
            decisions.iter().map(|d| (d.target, d.action)).collect();

        let mut links = Vec::new();
        let mut to_create = Vec::new();
        for item in &result.items {
            let action = actions.get(&DecisionTarget::Transaction(item.index)).copied();
            match plan_item(item, action, create_missing) {
                ItemPlan::Link => links.push(item),
                ItemPlan::Create => to_create.push(item),
                ItemPlan::Skip => {}
            }
        }

        let mut errors = Vec::new();
        let mut created_rows = Vec::new();
        for item in to_create {
            match self.create_row(&account, result, cycle.closing_day, item).await {
                Ok(row) => created_rows.push(row),
                Err(e) => {
                    warn!(
                        account_id = %account.id,
                        index = item.index,
                        error = %e,
                        "Statement row could not be created"
                    );
                    errors.push(
                        LedgerError::PartialImport(format!(
                            "line {} '{}': {}",
                            item.index + 1,
                            item.transaction.description,
                            e
                        ))
                        .to_string(),
                    );
                }
            }
        }

        self.storage.begin(self.config.extended_timeout()).await?;
        let core = self
            .apply_core(&account, result, &actions, &links, &created_rows)
            .await;
        let (period, next_period, linked_entries, created_adjustments) = match core {
            Ok(applied) => {
                self.storage.commit().await?;
                applied
            }
            Err(e) => {
                self.storage.rollback().await?;
                warn!(account_id = %account.id, error = %e, "Statement import rolled back");
                return Err(e);
            }
        };

        let (next_year, next_month) = calendar::next_month(result.year, result.month);
        if let Err(e) = self
            .cycle
            .generate_period(&account.id, next_year, next_month)
            .await
        {
            warn!(
                account_id = %account.id,
                year = next_year,
                month = next_month,
                error = %e,
                "Following period could not be recomputed after import"
            );
        }

        let created_entry_ids: Vec<String> = created_rows
            .iter()
            .flat_map(|row| std::iter::once(&row.entry).chain(row.future.iter()))
            .map(|e| e.id.clone())
            .collect();

        info!(
            account_id = %account.id,
            period_id = %period.id,
            created_entries = created_entry_ids.len(),
            created_adjustments,
            linked_entries,
            errors = errors.len(),
            total = %period.total_amount,
            "Statement imported"
        );

        Ok(ImportOutcome {
            period,
            created_entry_ids,
            created_adjustments,
            linked_entries,
            next_period,
            errors,
        })
    }

    /// Create one row and its future installments in their own unit of work
    async fn create_row(
        &mut self,
        account: &Account,
        result: &ReconciliationResult,
        closing_day: u32,
        item: &ReconciliationItem,
    ) -> LedgerResult<CreatedRow> {
        let line = &item.transaction;
        if !line.currency.eq_ignore_ascii_case(&account.currency) {
            return Err(LedgerError::Validation(format!(
                "Line currency {} does not match card '{}' ({})",
                line.currency, account.id, account.currency
            )));
        }

        let window = statement_window(&result.statement);
        let (entry, future) = entries_for_line(account, line, &window, closing_day);

        self.storage.begin(self.config.default_timeout()).await?;
        match self.save_row_in_unit(&account.id, &entry, &future).await {
            Ok(()) => {
                self.storage.commit().await?;
                debug!(
                    entry_id = %entry.id,
                    future_installments = future.len(),
                    "Statement row created"
                );
                Ok(CreatedRow {
                    index: item.index,
                    entry,
                    future,
                })
            }
            Err(e) => {
                self.storage.rollback().await?;
                Err(e)
            }
        }
    }

    /// Store a row and move the card balance for its completed entries
    async fn save_row_in_unit(
        &mut self,
        card_id: &str,
        entry: &LedgerEntry,
        future: &[LedgerEntry],
    ) -> LedgerResult<()> {
        for e in std::iter::once(entry).chain(future.iter()) {
            self.storage.save_entry(e).await?;
        }

        let completed = std::iter::once(entry)
            .chain(future.iter())
            .filter(|e| e.status == EntryStatus::Completed);
        let mut delta = BigDecimal::from(0);
        for e in completed {
            match e.kind {
                EntryKind::Income => delta += &e.amount,
                _ => delta -= &e.amount,
            }
        }
        if delta == BigDecimal::from(0) {
            return Ok(());
        }

        // Re-read: earlier rows of the same import already moved the balance.
        let mut card = self
            .storage
            .get_account(card_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(card_id.to_string()))?;
        card.adjust_balance(&delta);
        self.storage.update_account(&card).await
    }

    async fn apply_core(
        &mut self,
        account: &Account,
        result: &ReconciliationResult,
        actions: &HashMap<DecisionTarget, DecisionAction>,
        links: &[&ReconciliationItem],
        created: &[CreatedRow],
    ) -> LedgerResult<(BillingPeriod, Option<BillingPeriod>, usize, usize)> {
        let statement = &result.statement;

        let mut period = match self
            .storage
            .find_period(&account.id, result.year, result.month)
            .await?
        {
            Some(period) => period,
            None => {
                let period = BillingPeriod::new(
                    account.id.clone(),
                    result.year,
                    result.month,
                    statement.closing_date,
                    statement.due_date,
                );
                self.storage.save_period(&period).await?;
                period
            }
        };
        period.closing_date = statement.closing_date;
        period.due_date = statement.due_date;

        let mut linked: HashSet<String> = self
            .storage
            .get_line_items(&period.id)
            .await?
            .into_iter()
            .map(|i| i.entry_id)
            .collect();

        let mut linked_entries = 0;
        for item in links {
            let Some(entry) = &item.matched_entry else {
                continue;
            };
            if !linked.insert(entry.id.clone()) {
                continue;
            }
            let line_item = match item.match_type {
                MatchType::Exact => PeriodLineItem::new(&period.id, entry).reconciled(),
                _ => PeriodLineItem::new(&period.id, entry).with_discrepancy(Some(format!(
                    "Statement shows {} '{}' ({:?}, confidence {})",
                    item.transaction.amount,
                    item.transaction.description,
                    item.match_type,
                    item.confidence
                ))),
            };
            self.storage.save_line_item(&line_item).await?;
            linked_entries += 1;
        }

        // Only the billed entry of each row belongs to this period; future
        // installments are picked up by later periods.
        for row in created {
            if !row.entry.is_card_charge(&account.id) || !linked.insert(row.entry.id.clone()) {
                continue;
            }
            let line_item = PeriodLineItem::new(&period.id, &row.entry).reconciled();
            self.storage.save_line_item(&line_item).await?;
            linked_entries += 1;
            debug!(index = row.index, entry_id = %row.entry.id, "Created entry linked");
        }

        let mut created_adjustments = 0;
        for verdict in &result.adjustment_items {
            let action = actions
                .get(&DecisionTarget::Adjustment(verdict.index))
                .copied();
            let apply = match action {
                Some(DecisionAction::Reject) => false,
                Some(DecisionAction::CreateNew) => true,
                _ => verdict.should_apply,
            };
            if !apply {
                continue;
            }
            let adjustment = Adjustment::new(
                &period.id,
                verdict.adjustment.adjustment_type,
                verdict.adjustment.description.clone(),
                &verdict.adjustment.amount,
            );
            self.storage.save_adjustment(&adjustment).await?;
            created_adjustments += 1;
        }

        let items = self.storage.get_line_items(&period.id).await?;
        let adjustments = self.storage.get_adjustments(&period.id).await?;
        period.calculated_amount = items.iter().map(|i| i.amount.clone()).sum();
        period.adjustments_amount = adjustments.iter().map(|a| a.amount.clone()).sum();
        // The bank's figure wins; it may carry rounding the entries cannot reproduce.
        period.total_amount = statement.totals.home_total.clone();
        period.touch();
        let period = self.storage.update_period(&period).await?;

        let next_period = self.seed_next_period(account, result).await?;

        Ok((period, next_period, linked_entries, created_adjustments))
    }

    /// Create or refresh next month's placeholder from the statement's announced dates
    async fn seed_next_period(
        &mut self,
        account: &Account,
        result: &ReconciliationResult,
    ) -> LedgerResult<Option<BillingPeriod>> {
        let statement = &result.statement;
        let Some(next_closing) = statement.next_closing_date else {
            return Ok(None);
        };
        let (year, month) = calendar::next_month(result.year, result.month);
        let next_due = statement.next_due_date.unwrap_or_else(|| {
            calendar::shift_date(statement.due_date, 1)
        });

        let period = match self.storage.find_period(&account.id, year, month).await? {
            Some(mut existing) if existing.is_draft() => {
                existing.closing_date = next_closing;
                existing.due_date = next_due;
                existing.touch();
                self.storage.update_period(&existing).await?
            }
            Some(frozen) => frozen,
            None => {
                let period =
                    BillingPeriod::new(account.id.clone(), year, month, next_closing, next_due);
                self.storage.save_period(&period).await?;
                period
            }
        };

        // Re-read: rows created by this import moved the balance.
        let mut updated = self
            .storage
            .get_account(&account.id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account.id.clone()))?;
        let previous_cycle = updated.billing_cycle;
        updated.billing_cycle = Some(BillingCycle {
            closing_day: next_closing.day(),
            due_day: next_due.day(),
        });
        if updated.billing_cycle != previous_cycle {
            updated.updated_at = chrono::Utc::now().naive_utc();
            self.storage.update_account(&updated).await?;
            debug!(
                account_id = %account.id,
                closing_day = next_closing.day(),
                due_day = next_due.day(),
                "Estimated billing cycle updated"
            );
        }

        Ok(Some(period))
    }
}
