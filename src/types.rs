//! Core types and data structures for accounts, ledger entries and billing periods

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Kinds of accounts a person can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    /// Physical cash or wallet
    Cash,
    /// Checking or savings account
    Bank,
    /// Revolving credit card; the only kind that owns billing periods
    CreditCard,
    /// Loan or other installment debt
    Loan,
}

impl AccountKind {
    /// Whether money can be drawn from this account to pay a card
    pub fn is_liquid(&self) -> bool {
        matches!(self, AccountKind::Cash | AccountKind::Bank)
    }

    /// Whether this kind of account is billed in monthly periods
    pub fn owns_billing_periods(&self) -> bool {
        matches!(self, AccountKind::CreditCard)
    }
}

/// Day-of-month parameters of a credit card's billing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCycle {
    /// Day of the month the statement closes (clamped to month length)
    pub closing_day: u32,
    /// Day of the month the payment is due
    pub due_day: u32,
}

/// A financial account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for the account
    pub id: String,
    /// Human-readable account name
    pub name: String,
    /// Kind of account (cash, bank, card, loan)
    pub kind: AccountKind,
    /// ISO currency code the account is held in
    pub currency: String,
    /// Current balance of the account
    pub balance: BigDecimal,
    /// Billing cycle, only meaningful for credit cards
    pub billing_cycle: Option<BillingCycle>,
    /// Credit limit, only meaningful for credit cards and loans
    pub credit_limit: Option<BigDecimal>,
    /// Tag identifying this physical card inside consolidated statements
    pub card_tag: Option<String>,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Account {
    /// Create a new account with a zero balance
    pub fn new(id: String, name: String, kind: AccountKind, currency: String) -> Self {
        let now = now();
        Self {
            id,
            name,
            kind,
            currency,
            balance: BigDecimal::from(0),
            billing_cycle: None,
            credit_limit: None,
            card_tag: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a credit card account closing and falling due on the given days
    pub fn credit_card(
        id: String,
        name: String,
        currency: String,
        closing_day: u32,
        due_day: u32,
    ) -> Self {
        let mut account = Self::new(id, name, AccountKind::CreditCard, currency);
        account.billing_cycle = Some(BillingCycle {
            closing_day,
            due_day,
        });
        account
    }

    pub fn with_balance(mut self, balance: BigDecimal) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_card_tag(mut self, tag: impl Into<String>) -> Self {
        self.card_tag = Some(tag.into());
        self
    }

    pub fn with_credit_limit(mut self, limit: BigDecimal) -> Self {
        self.credit_limit = Some(limit);
        self
    }

    /// Move the balance by a signed amount
    pub fn adjust_balance(&mut self, delta: &BigDecimal) {
        self.balance += delta;
        self.updated_at = now();
    }
}

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Income,
    Expense,
    Transfer,
}

/// Settlement status of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryStatus {
    /// Scheduled but not yet charged (future installments)
    Pending,
    /// Charged or settled
    Completed,
}

/// Membership of an entry in an installment group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    /// Shared by every entry of one purchase
    pub group_id: String,
    /// 1-based position inside the group
    pub position: u32,
    /// Number of installments in the group
    pub total: u32,
}

/// A recorded income, expense or transfer against one or two accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    /// Always positive; the kind and account references give the direction
    pub amount: BigDecimal,
    pub currency: String,
    pub date: NaiveDate,
    pub description: String,
    pub kind: EntryKind,
    pub category: Option<String>,
    /// Account the money leaves (the card for card expenses)
    pub source_account_id: Option<String>,
    /// Account the money arrives at
    pub destination_account_id: Option<String>,
    pub installment: Option<Installment>,
    /// Deferred-financing flag, split into installments at payment time
    pub plan_z: bool,
    pub status: EntryStatus,
    /// Set on entries materialized from a period adjustment at payment time
    pub adjustment_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl LedgerEntry {
    /// Create a completed entry with a fresh id
    pub fn new(
        kind: EntryKind,
        amount: BigDecimal,
        currency: String,
        date: NaiveDate,
        description: String,
    ) -> Self {
        let now = now();
        Self {
            id: new_id(),
            amount,
            currency,
            date,
            description,
            kind,
            category: None,
            source_account_id: None,
            destination_account_id: None,
            installment: None,
            plan_z: false,
            status: EntryStatus::Completed,
            adjustment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// An expense charged to `account_id`
    pub fn expense(
        account_id: &str,
        amount: BigDecimal,
        currency: String,
        date: NaiveDate,
        description: String,
    ) -> Self {
        Self::new(EntryKind::Expense, amount, currency, date, description).from_account(account_id)
    }

    /// A transfer moving money from `source` to `destination`
    pub fn transfer(
        source: &str,
        destination: &str,
        amount: BigDecimal,
        currency: String,
        date: NaiveDate,
        description: String,
    ) -> Self {
        Self::new(EntryKind::Transfer, amount, currency, date, description)
            .from_account(source)
            .to_account(destination)
    }

    pub fn from_account(mut self, account_id: &str) -> Self {
        self.source_account_id = Some(account_id.to_string());
        self
    }

    pub fn to_account(mut self, account_id: &str) -> Self {
        self.destination_account_id = Some(account_id.to_string());
        self
    }

    pub fn with_installment(mut self, group_id: String, position: u32, total: u32) -> Self {
        self.installment = Some(Installment {
            group_id,
            position,
            total,
        });
        self
    }

    pub fn with_status(mut self, status: EntryStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_plan_z(mut self, plan_z: bool) -> Self {
        self.plan_z = plan_z;
        self
    }

    /// Whether the entry references the account on either side
    pub fn touches(&self, account_id: &str) -> bool {
        self.source_account_id.as_deref() == Some(account_id)
            || self.destination_account_id.as_deref() == Some(account_id)
    }

    /// Whether the entry is a charge billed on the given card
    pub fn is_card_charge(&self, card_id: &str) -> bool {
        self.kind == EntryKind::Expense
            && self.source_account_id.as_deref() == Some(card_id)
            && self.adjustment_id.is_none()
    }

    pub fn installment_position(&self) -> Option<u32> {
        self.installment.as_ref().map(|i| i.position)
    }
}

/// Lifecycle of a billing period; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodStatus {
    Draft,
    Closed,
    Paid,
}

/// Monthly aggregation window of a credit card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub id: String,
    pub account_id: String,
    pub year: i32,
    pub month: u32,
    pub closing_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Sum of the linked charges
    pub calculated_amount: BigDecimal,
    /// Sum of the period adjustments (credits negative)
    pub adjustments_amount: BigDecimal,
    /// Amount owed for the period
    pub total_amount: BigDecimal,
    pub status: PeriodStatus,
    pub paid_date: Option<NaiveDate>,
    pub paying_account_id: Option<String>,
    pub payment_entry_id: Option<String>,
    /// Optimistic-concurrency token, bumped by storage on every update
    pub version: u64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl BillingPeriod {
    /// Create an empty draft period
    pub fn new(
        account_id: String,
        year: i32,
        month: u32,
        closing_date: NaiveDate,
        due_date: NaiveDate,
    ) -> Self {
        let now = now();
        Self {
            id: new_id(),
            account_id,
            year,
            month,
            closing_date,
            due_date,
            calculated_amount: BigDecimal::from(0),
            adjustments_amount: BigDecimal::from(0),
            total_amount: BigDecimal::from(0),
            status: PeriodStatus::Draft,
            paid_date: None,
            paying_account_id: None,
            payment_entry_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.status == PeriodStatus::Draft
    }

    /// Closed and paid periods never change their figures again
    pub fn is_frozen(&self) -> bool {
        !self.is_draft()
    }

    pub fn touch(&mut self) {
        self.updated_at = now();
    }
}

/// Link between one ledger entry and one billing period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodLineItem {
    pub id: String,
    pub period_id: String,
    pub entry_id: String,
    /// Entry amount as of the last recompute
    pub amount: BigDecimal,
    pub is_reconciled: bool,
    pub has_discrepancy: bool,
    pub note: Option<String>,
}

impl PeriodLineItem {
    pub fn new(period_id: &str, entry: &LedgerEntry) -> Self {
        Self {
            id: new_id(),
            period_id: period_id.to_string(),
            entry_id: entry.id.clone(),
            amount: entry.amount.clone(),
            is_reconciled: false,
            has_discrepancy: false,
            note: None,
        }
    }

    pub fn reconciled(mut self) -> Self {
        self.is_reconciled = true;
        self
    }

    pub fn with_discrepancy(mut self, note: Option<String>) -> Self {
        self.has_discrepancy = true;
        self.note = note;
        self
    }
}

/// Kind of charge or credit a bank adds to a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType {
    Tax,
    Interest,
    Commission,
    Insurance,
    Credit,
    Other,
}

impl AdjustmentType {
    /// Sign an amount for this type: credits reduce the bill, everything else adds
    pub fn signed_amount(&self, amount: &BigDecimal) -> BigDecimal {
        let magnitude = amount.abs();
        match self {
            AdjustmentType::Credit => -magnitude,
            _ => magnitude,
        }
    }
}

/// Statement-level charge or credit belonging to one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: String,
    pub period_id: String,
    pub adjustment_type: AdjustmentType,
    pub description: String,
    /// Signed; negative for credits
    pub amount: BigDecimal,
    pub created_at: NaiveDateTime,
}

impl Adjustment {
    /// Create an adjustment, normalizing the sign for its type
    pub fn new(
        period_id: &str,
        adjustment_type: AdjustmentType,
        description: String,
        amount: &BigDecimal,
    ) -> Self {
        Self {
            id: new_id(),
            period_id: period_id.to_string(),
            adjustment_type,
            description,
            amount: adjustment_type.signed_amount(amount),
            created_at: now(),
        }
    }
}

/// Error taxonomy exposed at the operation boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    NotFound,
    StateConflict,
    PartialImport,
    Storage,
}

/// Errors that can occur in the ledger system
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Billing period not found: {0}")]
    PeriodNotFound(String),
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(String),
    #[error("Adjustment not found: {0}")]
    AdjustmentNotFound(String),
    #[error("State conflict: {0}")]
    StateConflict(String),
    #[error("Import row failed: {0}")]
    PartialImport(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Storage(_) => ErrorKind::Storage,
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::AccountNotFound(_)
            | LedgerError::PeriodNotFound(_)
            | LedgerError::EntryNotFound(_)
            | LedgerError::AdjustmentNotFound(_) => ErrorKind::NotFound,
            LedgerError::StateConflict(_) => ErrorKind::StateConflict,
            LedgerError::PartialImport(_) => ErrorKind::PartialImport,
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// What every public operation hands back to request handlers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl<T> OperationOutcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error_kind: None,
        }
    }

    pub fn failed(error: &LedgerError) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    /// Unwrap into a plain result, keeping only the message on failure
    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(self
                .message
                .unwrap_or_else(|| "operation failed".to_string())),
        }
    }
}

impl<T> From<LedgerResult<T>> for OperationOutcome<T> {
    fn from(result: LedgerResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(error) => Self::failed(&error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_kind_liquidity() {
        assert!(AccountKind::Cash.is_liquid());
        assert!(AccountKind::Bank.is_liquid());
        assert!(!AccountKind::CreditCard.is_liquid());
        assert!(!AccountKind::Loan.is_liquid());
        assert!(AccountKind::CreditCard.owns_billing_periods());
    }

    #[test]
    fn test_adjustment_sign_normalization() {
        let credit = Adjustment::new(
            "p1",
            AdjustmentType::Credit,
            "Refund".to_string(),
            &BigDecimal::from(15),
        );
        assert_eq!(credit.amount, BigDecimal::from(-15));

        let tax = Adjustment::new(
            "p1",
            AdjustmentType::Tax,
            "Stamp tax".to_string(),
            &BigDecimal::from(-4),
        );
        assert_eq!(tax.amount, BigDecimal::from(4));
    }

    #[test]
    fn test_card_charge_excludes_adjustment_entries() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let mut entry = LedgerEntry::expense(
            "card",
            BigDecimal::from(10),
            "USD".to_string(),
            date,
            "Coffee".to_string(),
        );
        assert!(entry.is_card_charge("card"));
        assert!(!entry.is_card_charge("other"));

        entry.adjustment_id = Some("adj".to_string());
        assert!(!entry.is_card_charge("card"));
    }

    #[test]
    fn test_outcome_from_error_carries_kind() {
        let outcome: OperationOutcome<()> =
            LedgerResult::Err(LedgerError::PeriodNotFound("p9".to_string())).into();
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::NotFound));
        assert_eq!(
            outcome.into_result().unwrap_err(),
            "Billing period not found: p9"
        );
    }
}
