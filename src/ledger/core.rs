//! Main ledger facade that coordinates accounts, entries, statements and billing periods

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use tracing::warn;

use crate::billing::cycle::{BillingCycleEngine, PaymentReceipt, PeriodDetail, ProjectedPeriod};
use crate::config::EngineConfig;
use crate::import::{ImportApplier, ImportDecision, ImportOutcome};
use crate::ledger::{AccountManager, EntryRecorder};
use crate::reconciliation::engine::{ReconciliationEngine, ReconciliationResult};
use crate::statement::ParsedStatement;
use crate::traits::*;
use crate::types::*;

/// Entry point for request handlers
///
/// Every operation runs as its own unit of work and reports through an
/// [`OperationOutcome`] instead of an error.
pub struct CardLedger<S: LedgerStorage + Clone> {
    account_manager: AccountManager<S>,
    entry_recorder: EntryRecorder<S>,
    reconciler: ReconciliationEngine<S>,
    applier: ImportApplier<S>,
    cycle: BillingCycleEngine<S>,
}

impl<S: LedgerStorage + Clone> CardLedger<S> {
    /// Create a ledger with the default engine configuration
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, EngineConfig::default())
    }

    /// Create a ledger with a custom engine configuration
    pub fn with_config(storage: S, config: EngineConfig) -> Self {
        Self {
            account_manager: AccountManager::new(storage.clone()),
            entry_recorder: EntryRecorder::new(storage.clone(), config.clone()),
            reconciler: ReconciliationEngine::new(storage.clone(), config.clone()),
            applier: ImportApplier::new(storage.clone(), config.clone()),
            cycle: BillingCycleEngine::new(storage, config),
        }
    }

    // Account and entry operations
    pub async fn create_account(&mut self, account: Account) -> OperationOutcome<Account> {
        outcome("create_account", self.account_manager.create_account(account).await)
    }

    pub async fn get_account(&self, account_id: &str) -> OperationOutcome<Account> {
        outcome(
            "get_account",
            self.account_manager.get_account_required(account_id).await,
        )
    }

    pub async fn record_entry(&mut self, entry: LedgerEntry) -> OperationOutcome<LedgerEntry> {
        outcome("record_entry", self.entry_recorder.record_entry(entry).await)
    }

    pub async fn record_entries(
        &mut self,
        entries: Vec<LedgerEntry>,
    ) -> OperationOutcome<Vec<LedgerEntry>> {
        outcome(
            "record_entries",
            self.entry_recorder.record_entries(entries).await,
        )
    }

    pub async fn delete_entry(&mut self, entry_id: &str) -> OperationOutcome<()> {
        outcome("delete_entry", self.entry_recorder.delete_entry(entry_id).await)
    }

    pub async fn account_entries(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> OperationOutcome<Vec<LedgerEntry>> {
        outcome(
            "account_entries",
            self.entry_recorder
                .account_entries(account_id, start_date, end_date)
                .await,
        )
    }

    // Statement operations
    /// Match a parsed statement against the card's recorded entries
    pub async fn reconcile(
        &self,
        statement: &ParsedStatement,
        account_id: &str,
    ) -> OperationOutcome<ReconciliationResult> {
        outcome(
            "reconcile",
            self.reconciler.reconcile(statement, account_id).await,
        )
    }

    /// Persist a reconciliation, honouring per-item decisions
    pub async fn apply_import(
        &mut self,
        result: &ReconciliationResult,
        decisions: &[ImportDecision],
        create_missing: bool,
    ) -> OperationOutcome<ImportOutcome> {
        outcome(
            "apply_import",
            self.applier
                .apply_import(result, decisions, create_missing)
                .await,
        )
    }

    // Billing period operations
    pub async fn generate_period(
        &mut self,
        account_id: &str,
        year: i32,
        month: u32,
    ) -> OperationOutcome<BillingPeriod> {
        outcome(
            "generate_period",
            self.cycle.generate_period(account_id, year, month).await,
        )
    }

    pub async fn close_period(
        &mut self,
        period_id: &str,
        final_total: Option<BigDecimal>,
    ) -> OperationOutcome<BillingPeriod> {
        outcome(
            "close_period",
            self.cycle.close_period(period_id, final_total).await,
        )
    }

    pub async fn pay_period(
        &mut self,
        period_id: &str,
        from_account_id: &str,
        date: Option<NaiveDate>,
    ) -> OperationOutcome<PaymentReceipt> {
        outcome(
            "pay_period",
            self.cycle.pay_period(period_id, from_account_id, date).await,
        )
    }

    pub async fn reset_period(&mut self, period_id: &str) -> OperationOutcome<BillingPeriod> {
        outcome("reset_period", self.cycle.reset_period(period_id).await)
    }

    pub async fn add_adjustment(
        &mut self,
        period_id: &str,
        adjustment_type: AdjustmentType,
        description: &str,
        amount: &BigDecimal,
    ) -> OperationOutcome<Adjustment> {
        outcome(
            "add_adjustment",
            self.cycle
                .add_adjustment(period_id, adjustment_type, description, amount)
                .await,
        )
    }

    pub async fn remove_adjustment(
        &mut self,
        adjustment_id: &str,
    ) -> OperationOutcome<BillingPeriod> {
        outcome(
            "remove_adjustment",
            self.cycle.remove_adjustment(adjustment_id).await,
        )
    }

    pub async fn period_detail(&self, period_id: &str) -> OperationOutcome<PeriodDetail> {
        outcome("period_detail", self.cycle.period_detail(period_id).await)
    }

    /// Forecast the periods following today's
    pub async fn project_periods(
        &self,
        account_id: &str,
        months_ahead: u32,
    ) -> OperationOutcome<Vec<ProjectedPeriod>> {
        outcome(
            "project_periods",
            self.cycle.project_periods(account_id, months_ahead).await,
        )
    }

    /// Forecast the periods following the one `reference` is billed in
    pub async fn project_periods_from(
        &self,
        account_id: &str,
        reference: NaiveDate,
        months_ahead: u32,
    ) -> OperationOutcome<Vec<ProjectedPeriod>> {
        outcome(
            "project_periods",
            self.cycle
                .project_periods_from(account_id, reference, months_ahead)
                .await,
        )
    }
}

fn outcome<T>(operation: &'static str, result: LedgerResult<T>) -> OperationOutcome<T> {
    if let Err(e) = &result {
        warn!(operation, error_kind = ?e.kind(), error = %e, "Operation failed");
    }
    result.into()
}
