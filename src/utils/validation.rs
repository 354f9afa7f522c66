//! Validation utilities

use bigdecimal::BigDecimal;

use crate::types::*;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> LedgerResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(LedgerError::Validation(
            "Amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that an account ID is usable
pub fn validate_account_id(account_id: &str) -> LedgerResult<()> {
    if account_id.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account ID cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validate a day-of-month setting
pub fn validate_day_of_month(day: u32, label: &str) -> LedgerResult<()> {
    if !(1..=31).contains(&day) {
        return Err(LedgerError::Validation(format!(
            "{} must be between 1 and 31, got {}",
            label, day
        )));
    }
    Ok(())
}

/// Validate that an account is a credit card with a usable billing cycle
pub fn validate_credit_card(account: &Account) -> LedgerResult<BillingCycle> {
    if !account.kind.owns_billing_periods() {
        return Err(LedgerError::Validation(format!(
            "Account '{}' is not a credit card",
            account.id
        )));
    }

    let cycle = account.billing_cycle.ok_or_else(|| {
        LedgerError::Validation(format!(
            "Credit card '{}' has no closing/due day configured",
            account.id
        ))
    })?;
    validate_day_of_month(cycle.closing_day, "Closing day")?;
    validate_day_of_month(cycle.due_day, "Due day")?;

    Ok(cycle)
}

/// Validate that money can be drawn from an account
pub fn validate_liquidity_account(account: &Account) -> LedgerResult<()> {
    if !account.kind.is_liquid() {
        return Err(LedgerError::Validation(format!(
            "Account '{}' cannot be used to pay: {:?} accounts are not liquid",
            account.id, account.kind
        )));
    }
    Ok(())
}

/// Validate that two accounts share a currency
pub fn validate_same_currency(from: &Account, to: &Account) -> LedgerResult<()> {
    if !from.currency.eq_ignore_ascii_case(&to.currency) {
        return Err(LedgerError::Validation(format!(
            "Currency mismatch: '{}' holds {} but '{}' holds {}",
            from.id, from.currency, to.id, to.currency
        )));
    }
    Ok(())
}

/// Validate that an account holds at least `amount`
pub fn validate_sufficient_balance(account: &Account, amount: &BigDecimal) -> LedgerResult<()> {
    if account.balance < *amount {
        return Err(LedgerError::StateConflict(format!(
            "Insufficient balance in '{}': {} available, {} required",
            account.id, account.balance, amount
        )));
    }
    Ok(())
}
