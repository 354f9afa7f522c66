//! Billing period lifecycle: generate, recompute, close, pay, reset, project

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::billing::assignment::{assign_entries, diff_line_items, PeriodTotals};
use crate::billing::boundary::{period_boundary, period_month_for, PeriodWindow};
use crate::billing::calendar;
use crate::billing::plan_z::{split_plan_z, PlanZSplit};
use crate::config::EngineConfig;
use crate::traits::LedgerStorage;
use crate::types::*;
use crate::utils::validation::*;

const PAYMENT_CATEGORY: &str = "card_payment";
const ADJUSTMENT_CATEGORY: &str = "card_adjustment";

/// A period together with everything linked to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodDetail {
    pub period: BillingPeriod,
    pub line_items: Vec<PeriodLineItem>,
    pub adjustments: Vec<Adjustment>,
}

/// What a successful payment produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub period: BillingPeriod,
    pub payment_entry: LedgerEntry,
    pub amount_paid: BigDecimal,
    pub plan_z_splits: Vec<PlanZSplit>,
    pub adjustment_entries: Vec<LedgerEntry>,
}

/// Forecast of one future period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPeriod {
    pub year: i32,
    pub month: u32,
    pub closing_date: NaiveDate,
    pub due_date: NaiveDate,
    pub amount: BigDecimal,
    pub entry_count: usize,
}

/// Owns the DRAFT -> CLOSED -> PAID state machine of card billing periods
pub struct BillingCycleEngine<S: LedgerStorage> {
    storage: S,
    config: EngineConfig,
}

impl<S: LedgerStorage> BillingCycleEngine<S> {
    pub fn new(storage: S, config: EngineConfig) -> Self {
        Self { storage, config }
    }

    async fn card_account(&self, account_id: &str) -> LedgerResult<(Account, BillingCycle)> {
        let account = self
            .storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
        let cycle = validate_credit_card(&account)?;
        Ok((account, cycle))
    }

    async fn period_required(&self, period_id: &str) -> LedgerResult<BillingPeriod> {
        self.storage
            .get_period(period_id)
            .await?
            .ok_or_else(|| LedgerError::PeriodNotFound(period_id.to_string()))
    }

    async fn account_required(&self, account_id: &str) -> LedgerResult<Account> {
        self.storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    /// Window of a period, using the stored previous period's closing when there is one
    async fn window_for(
        &self,
        account_id: &str,
        cycle: BillingCycle,
        year: i32,
        month: u32,
        closing: NaiveDate,
    ) -> LedgerResult<PeriodWindow> {
        let (prev_year, prev_month) = calendar::previous_month(year, month);
        let previous_closing = match self
            .storage
            .find_period(account_id, prev_year, prev_month)
            .await?
        {
            Some(previous) => previous.closing_date,
            None => period_boundary(prev_year, prev_month, cycle).closing_date,
        };
        Ok(PeriodWindow::new(previous_closing, closing))
    }

    async fn entries_in_window(
        &self,
        account_id: &str,
        window: &PeriodWindow,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let mut entries = self
            .storage
            .get_account_entries(account_id, Some(window.start()), Some(window.closing))
            .await?;
        let redundant = self
            .storage
            .get_account_entries(account_id, Some(window.month_start), Some(window.closing))
            .await?;
        entries.extend(redundant);
        Ok(entries)
    }

    /// Create the period if absent, recompute it if still a draft
    ///
    /// Running it twice with no ledger change in between writes nothing the
    /// second time.
    pub async fn generate_period(
        &mut self,
        account_id: &str,
        year: i32,
        month: u32,
    ) -> LedgerResult<BillingPeriod> {
        if !(1..=12).contains(&month) {
            return Err(LedgerError::Validation(format!("Invalid month {}", month)));
        }
        let (account, cycle) = self.card_account(account_id).await?;

        let existing = self.storage.find_period(&account.id, year, month).await?;
        if let Some(period) = &existing {
            if period.is_frozen() {
                debug!(
                    period_id = %period.id,
                    status = ?period.status,
                    "Period frozen, not recomputed"
                );
                return Ok(period.clone());
            }
        }

        self.storage.begin(self.config.default_timeout()).await?;
        match self.generate_in_unit(&account, cycle, existing, year, month).await {
            Ok(period) => {
                self.storage.commit().await?;
                Ok(period)
            }
            Err(e) => {
                self.storage.rollback().await?;
                Err(e)
            }
        }
    }

    async fn generate_in_unit(
        &mut self,
        account: &Account,
        cycle: BillingCycle,
        existing: Option<BillingPeriod>,
        year: i32,
        month: u32,
    ) -> LedgerResult<BillingPeriod> {
        let period = match existing {
            Some(period) => period,
            None => {
                let boundary = period_boundary(year, month, cycle);
                let period = BillingPeriod::new(
                    account.id.clone(),
                    year,
                    month,
                    boundary.closing_date,
                    boundary.due_date,
                );
                self.storage.save_period(&period).await?;
                info!(
                    account_id = %account.id,
                    period_id = %period.id,
                    year,
                    month,
                    "Billing period created"
                );
                period
            }
        };
        self.recompute_draft(account, cycle, period).await
    }

    /// Bring a draft period's line items and totals in line with the ledger
    async fn recompute_draft(
        &mut self,
        account: &Account,
        cycle: BillingCycle,
        mut period: BillingPeriod,
    ) -> LedgerResult<BillingPeriod> {
        let window = self
            .window_for(&account.id, cycle, period.year, period.month, period.closing_date)
            .await?;
        let entries = self.entries_in_window(&account.id, &window).await?;
        let matching = assign_entries(&account.id, &window, &entries);

        let current = self.storage.get_line_items(&period.id).await?;
        let diff = diff_line_items(&current, &matching);

        for entry in &diff.to_add {
            self.storage
                .save_line_item(&PeriodLineItem::new(&period.id, entry))
                .await?;
        }
        for item in &diff.to_remove {
            self.storage.delete_line_item(&item.id).await?;
        }
        for item in &diff.to_update {
            self.storage.update_line_item(item).await?;
        }

        let adjustments = self.storage.get_adjustments(&period.id).await?;
        let totals = PeriodTotals::compute(&matching, &adjustments);

        if diff.is_empty() && totals.matches(&period) {
            debug!(period_id = %period.id, "Period already up to date");
            return Ok(period);
        }

        totals.apply_to(&mut period);
        period.touch();
        let period = self.storage.update_period(&period).await?;
        info!(
            period_id = %period.id,
            added = diff.to_add.len(),
            removed = diff.to_remove.len(),
            updated = diff.to_update.len(),
            total = %period.total_amount,
            "Draft period recomputed"
        );
        Ok(period)
    }

    /// Set a period's totals from its adjustments and its stored line items
    async fn refresh_totals(&mut self, mut period: BillingPeriod) -> LedgerResult<BillingPeriod> {
        let items = self.storage.get_line_items(&period.id).await?;
        let adjustments = self.storage.get_adjustments(&period.id).await?;
        period.calculated_amount = items.iter().map(|i| i.amount.clone()).sum();
        period.adjustments_amount = adjustments.iter().map(|a| a.amount.clone()).sum();
        period.total_amount = &period.calculated_amount + &period.adjustments_amount;
        period.touch();
        self.storage.update_period(&period).await
    }

    /// DRAFT -> CLOSED, optionally overriding the final total
    pub async fn close_period(
        &mut self,
        period_id: &str,
        final_total: Option<BigDecimal>,
    ) -> LedgerResult<BillingPeriod> {
        let mut period = self.period_required(period_id).await?;
        if !period.is_draft() {
            return Err(LedgerError::StateConflict(format!(
                "Period {} is {:?} and cannot be closed",
                period.id, period.status
            )));
        }
        if let Some(total) = final_total {
            if total < BigDecimal::from(0) {
                return Err(LedgerError::Validation(
                    "Final total cannot be negative".to_string(),
                ));
            }
            period.total_amount = total;
        }

        period.status = PeriodStatus::Closed;
        period.touch();
        let period = self.storage.update_period(&period).await?;
        info!(period_id = %period.id, total = %period.total_amount, "Billing period closed");
        Ok(period)
    }

    /// Pay a period from a liquid account, splitting Plan-Z charges first
    pub async fn pay_period(
        &mut self,
        period_id: &str,
        from_account_id: &str,
        date: Option<NaiveDate>,
    ) -> LedgerResult<PaymentReceipt> {
        let period = self.period_required(period_id).await?;
        if period.status == PeriodStatus::Paid {
            return Err(LedgerError::StateConflict(format!(
                "Period {} is already paid",
                period.id
            )));
        }

        let card = self.account_required(&period.account_id).await?;
        let source = self.account_required(from_account_id).await?;
        validate_liquidity_account(&source)?;
        validate_same_currency(&source, &card)?;

        let items = self.storage.get_line_items(&period.id).await?;
        let mut splits = Vec::new();
        for item in &items {
            if let Some(entry) = self.storage.get_entry(&item.entry_id).await? {
                if entry.plan_z && entry.installment.is_none() {
                    splits.push(split_plan_z(&entry, self.config.plan_z_installments));
                }
            }
        }

        let reduction: BigDecimal = splits.iter().map(|s| s.reduction.clone()).sum();
        let amount = &period.total_amount - &reduction;
        validate_positive_amount(&amount)?;
        validate_sufficient_balance(&source, &amount)?;

        let date = date.unwrap_or_else(|| chrono::Utc::now().date_naive());

        self.storage.begin(self.config.extended_timeout()).await?;
        let outcome = self
            .pay_in_unit(period, &items, card, source, splits, reduction, amount, date)
            .await;
        match outcome {
            Ok(receipt) => {
                self.storage.commit().await?;
                info!(
                    period_id = %receipt.period.id,
                    from_account_id,
                    amount = %receipt.amount_paid,
                    plan_z_splits = receipt.plan_z_splits.len(),
                    "Billing period paid"
                );
                Ok(receipt)
            }
            Err(e) => {
                self.storage.rollback().await?;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn pay_in_unit(
        &mut self,
        mut period: BillingPeriod,
        items: &[PeriodLineItem],
        mut card: Account,
        mut source: Account,
        splits: Vec<PlanZSplit>,
        reduction: BigDecimal,
        amount: BigDecimal,
        date: NaiveDate,
    ) -> LedgerResult<PaymentReceipt> {
        for split in &splits {
            let original_item = items.iter().find(|i| i.entry_id == split.original.id);
            if let Some(item) = original_item {
                self.storage.delete_line_item(&item.id).await?;
            }
            self.storage.delete_entry(&split.original.id).await?;

            for installment in &split.installments {
                self.storage.save_entry(installment).await?;
            }
            if let Some(first) = split.first() {
                let mut item = PeriodLineItem::new(&period.id, first);
                if let Some(original) = original_item {
                    item.is_reconciled = original.is_reconciled;
                }
                item.note = Some(format!(
                    "Plan Z: {} split into {} installments",
                    split.original.amount,
                    split.installments.len()
                ));
                self.storage.save_line_item(&item).await?;
            }
        }
        period.calculated_amount = &period.calculated_amount - &reduction;
        period.total_amount = amount.clone();

        let mut payment = LedgerEntry::transfer(
            &source.id,
            &card.id,
            amount.clone(),
            card.currency.clone(),
            date,
            format!("Payment {} {}-{:02}", card.name, period.year, period.month),
        )
        .with_category(PAYMENT_CATEGORY);
        payment.status = EntryStatus::Completed;
        self.storage.save_entry(&payment).await?;

        source.adjust_balance(&-amount.clone());
        card.adjust_balance(&amount);
        self.storage.update_account(&source).await?;

        // Credits are not materialized as entries.
        let mut adjustment_entries = Vec::new();
        for adjustment in self.storage.get_adjustments(&period.id).await? {
            if adjustment.amount <= BigDecimal::from(0) {
                continue;
            }
            let mut entry = LedgerEntry::expense(
                &card.id,
                adjustment.amount.clone(),
                card.currency.clone(),
                date,
                adjustment.description.clone(),
            )
            .with_category(ADJUSTMENT_CATEGORY);
            entry.adjustment_id = Some(adjustment.id.clone());
            self.storage.save_entry(&entry).await?;
            card.adjust_balance(&-entry.amount.clone());
            adjustment_entries.push(entry);
        }
        self.storage.update_account(&card).await?;

        period.status = PeriodStatus::Paid;
        period.paid_date = Some(date);
        period.paying_account_id = Some(source.id.clone());
        period.payment_entry_id = Some(payment.id.clone());
        period.touch();
        let period = self.storage.update_period(&period).await?;

        Ok(PaymentReceipt {
            period,
            payment_entry: payment,
            amount_paid: amount,
            plan_z_splits: splits,
            adjustment_entries,
        })
    }

    /// Wipe a period that is not yet paid back to an empty draft
    pub async fn reset_period(&mut self, period_id: &str) -> LedgerResult<BillingPeriod> {
        let period = self.period_required(period_id).await?;
        if period.status == PeriodStatus::Paid {
            return Err(LedgerError::StateConflict(format!(
                "Period {} is paid and cannot be reset",
                period.id
            )));
        }

        self.storage.begin(self.config.default_timeout()).await?;
        match self.reset_in_unit(period).await {
            Ok(period) => {
                self.storage.commit().await?;
                info!(period_id = %period.id, "Billing period reset");
                Ok(period)
            }
            Err(e) => {
                self.storage.rollback().await?;
                Err(e)
            }
        }
    }

    async fn reset_in_unit(&mut self, mut period: BillingPeriod) -> LedgerResult<BillingPeriod> {
        for item in self.storage.get_line_items(&period.id).await? {
            self.storage.delete_line_item(&item.id).await?;
        }
        for adjustment in self.storage.get_adjustments(&period.id).await? {
            self.storage.delete_adjustment(&adjustment.id).await?;
        }
        period.calculated_amount = BigDecimal::from(0);
        period.adjustments_amount = BigDecimal::from(0);
        period.total_amount = BigDecimal::from(0);
        period.status = PeriodStatus::Draft;
        period.touch();
        self.storage.update_period(&period).await
    }

    /// Add a statement charge or credit to a draft period
    pub async fn add_adjustment(
        &mut self,
        period_id: &str,
        adjustment_type: AdjustmentType,
        description: &str,
        amount: &BigDecimal,
    ) -> LedgerResult<Adjustment> {
        let period = self.period_required(period_id).await?;
        ensure_editable(&period)?;
        validate_positive_amount(&amount.abs())?;

        let adjustment =
            Adjustment::new(&period.id, adjustment_type, description.to_string(), amount);
        self.storage.begin(self.config.default_timeout()).await?;
        match self.save_adjustment_in_unit(&adjustment, period).await {
            Ok(period) => {
                self.storage.commit().await?;
                info!(
                    period_id = %period.id,
                    adjustment_id = %adjustment.id,
                    amount = %adjustment.amount,
                    "Adjustment added"
                );
                Ok(adjustment)
            }
            Err(e) => {
                self.storage.rollback().await?;
                Err(e)
            }
        }
    }

    async fn save_adjustment_in_unit(
        &mut self,
        adjustment: &Adjustment,
        period: BillingPeriod,
    ) -> LedgerResult<BillingPeriod> {
        self.storage.save_adjustment(adjustment).await?;
        self.refresh_totals(period).await
    }

    /// Remove an adjustment from its draft period
    pub async fn remove_adjustment(&mut self, adjustment_id: &str) -> LedgerResult<BillingPeriod> {
        let adjustment = self
            .storage
            .get_adjustment(adjustment_id)
            .await?
            .ok_or_else(|| LedgerError::AdjustmentNotFound(adjustment_id.to_string()))?;
        let period = self.period_required(&adjustment.period_id).await?;
        ensure_editable(&period)?;

        self.storage.begin(self.config.default_timeout()).await?;
        match self.delete_adjustment_in_unit(&adjustment.id, period).await {
            Ok(period) => {
                self.storage.commit().await?;
                info!(period_id = %period.id, adjustment_id, "Adjustment removed");
                Ok(period)
            }
            Err(e) => {
                self.storage.rollback().await?;
                Err(e)
            }
        }
    }

    async fn delete_adjustment_in_unit(
        &mut self,
        adjustment_id: &str,
        period: BillingPeriod,
    ) -> LedgerResult<BillingPeriod> {
        self.storage.delete_adjustment(adjustment_id).await?;
        self.refresh_totals(period).await
    }

    /// A period with its line items and adjustments
    pub async fn period_detail(&self, period_id: &str) -> LedgerResult<PeriodDetail> {
        let period = self.period_required(period_id).await?;
        let line_items = self.storage.get_line_items(&period.id).await?;
        let adjustments = self.storage.get_adjustments(&period.id).await?;
        Ok(PeriodDetail {
            period,
            line_items,
            adjustments,
        })
    }

    /// Forecast the next `months_ahead` periods from today
    pub async fn project_periods(
        &self,
        account_id: &str,
        months_ahead: u32,
    ) -> LedgerResult<Vec<ProjectedPeriod>> {
        let today = chrono::Utc::now().date_naive();
        self.project_periods_from(account_id, today, months_ahead)
            .await
    }

    /// Forecast the periods following the one `reference` is billed in
    ///
    /// Read-only: sums the already-known entries that fall in each window.
    pub async fn project_periods_from(
        &self,
        account_id: &str,
        reference: NaiveDate,
        months_ahead: u32,
    ) -> LedgerResult<Vec<ProjectedPeriod>> {
        let (account, cycle) = self.card_account(account_id).await?;
        let (year, month) = period_month_for(reference, cycle);

        let mut projections = Vec::with_capacity(months_ahead as usize);
        for offset in 1..=months_ahead as i32 {
            let (y, m) = calendar::add_months(year, month, offset);
            let (closing_date, due_date) =
                match self.storage.find_period(&account.id, y, m).await? {
                    Some(stored) => (stored.closing_date, stored.due_date),
                    None => {
                        let boundary = period_boundary(y, m, cycle);
                        (boundary.closing_date, boundary.due_date)
                    }
                };
            let window = self.window_for(&account.id, cycle, y, m, closing_date).await?;
            let entries = self.entries_in_window(&account.id, &window).await?;
            let matching = assign_entries(&account.id, &window, &entries);

            projections.push(ProjectedPeriod {
                year: y,
                month: m,
                closing_date,
                due_date,
                amount: matching.iter().map(|e| e.amount.clone()).sum(),
                entry_count: matching.len(),
            });
        }

        debug!(
            account_id = %account.id,
            months = projections.len(),
            "Periods projected"
        );
        Ok(projections)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

fn ensure_editable(period: &BillingPeriod) -> LedgerResult<()> {
    if period.is_frozen() {
        return Err(LedgerError::StateConflict(format!(
            "Period {} is {:?}; adjustments can no longer change",
            period.id, period.status
        )));
    }
    Ok(())
}
